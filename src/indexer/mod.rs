// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Index build orchestration. File-level chunking and extraction run in
//! parallel; graph and hierarchy updates happen afterwards under a single
//! writer. Embedding and store writes are batched, retried with backoff,
//! and idempotent keyed by fragment fingerprint.

pub mod change_tracker;
pub mod chunker;
pub mod languages;
pub mod metadata;

use anyhow::{anyhow, Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{project_data_dir, Config};
use crate::embedding::{self, count_tokens, EmbeddingProvider};
use crate::graph::hierarchy::HierarchicalIndex;
use crate::graph::CrossReferenceGraph;
use crate::lock::BuildLock;
use crate::state::ProjectState;
use crate::store::{LocalVectorStore, StoreEntry, StorePayload, VectorStore};

use change_tracker::{ChangeTracker, IndexRebuildDecision, RebuildMode};
use chunker::Fragment;
use metadata::FragmentMetadata;

/// Files chunked and extracted concurrently.
const EXTRACTION_CONCURRENCY: usize = 8;

/// Outcome of one build run, printed by the CLI.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
	pub mode: Option<RebuildMode>,
	pub files_processed: usize,
	pub files_removed: usize,
	pub fragments_created: usize,
	pub duplicates_skipped: usize,
	pub anchorless_fragments: usize,
	/// Files whose embedding batches exhausted retries
	pub unindexed_files: Vec<String>,
	/// Per-file extraction errors, aggregated instead of aborting
	pub file_errors: Vec<(String, String)>,
	pub elapsed: Duration,
}

impl BuildReport {
	pub fn had_errors(&self) -> bool {
		!self.file_errors.is_empty() || !self.unindexed_files.is_empty()
	}
}

/// Everything extracted from one file, before any shared state is touched.
struct FileExtraction {
	path: String,
	content_hash: String,
	fragments: Vec<(Fragment, FragmentMetadata)>,
}

/// Walk the project tree honoring .gitignore plus a `.noindex` overlay,
/// returning paths relative to the project root with forward slashes.
pub fn collect_source_files(project_dir: &Path, config: &Config) -> Vec<String> {
	let mut walker = ignore::WalkBuilder::new(project_dir);
	walker
		.hidden(true)
		.git_ignore(true)
		.git_exclude(true)
		.add_custom_ignore_filename(".noindex");

	let mut files = Vec::new();
	for entry in walker.build().flatten() {
		let path = entry.path();
		if !path.is_file() || !config.matches_extension(path) {
			continue;
		}
		if let Ok(relative) = path.strip_prefix(project_dir) {
			let normalized = relative
				.components()
				.map(|c| c.as_os_str().to_string_lossy())
				.collect::<Vec<_>>()
				.join("/");
			files.push(normalized);
		}
	}
	files.sort();
	files
}

/// Chunk and extract one file. Pure with respect to shared state.
fn extract_file(project_dir: &Path, relative: &str, config: &Config) -> Result<FileExtraction> {
	let absolute = project_dir.join(relative);
	let bytes = std::fs::read(&absolute)
		.with_context(|| format!("Failed to read {}", absolute.display()))?;
	let content_hash = embedding::content_hash(&bytes);
	let content = String::from_utf8_lossy(&bytes);

	let extension = Path::new(relative)
		.extension()
		.and_then(|e| e.to_str())
		.unwrap_or("");
	let language = languages::get_language_or_generic(extension);

	let mut fragments = chunker::chunk(relative, &content, language, &config.index);
	let pairs = fragments
		.drain(..)
		.map(|mut fragment| {
			fragment.fingerprint = embedding::fingerprint(&fragment.content);
			let meta = metadata::extract(&fragment.content, language);
			(fragment, meta)
		})
		.collect();

	Ok(FileExtraction {
		path: relative.to_string(),
		content_hash,
		fragments: pairs,
	})
}

/// Run an index build. Returns an error when another build holds the lock;
/// otherwise per-file problems are aggregated into the report.
pub async fn build(project_dir: &Path, config: &Config, force: bool) -> Result<BuildReport> {
	let mut lock = BuildLock::new(project_dir);
	if !lock.try_acquire()? {
		return Err(anyhow!(
			"Another index build is already running for this project"
		));
	}

	let started = Instant::now();
	let mut state = ProjectState::load(project_dir)?.unwrap_or_default();

	let live_store = LocalVectorStore::open(project_dir)?;
	let store_count = live_store.count().await?;

	let tracker = ChangeTracker::new(project_dir, config);
	let decision = tracker
		.decide_rebuild(Some(&state), store_count, force)
		.await;
	info!(
		mode = ?decision.mode,
		reason = ?decision.reason,
		affected = decision.affected_files.len(),
		"Rebuild decision"
	);

	if !decision.must_rebuild {
		return Ok(BuildReport {
			mode: Some(RebuildMode::None),
			elapsed: started.elapsed(),
			..Default::default()
		});
	}

	let provider = embedding::create_provider(&config.embedding)?;
	let identity = embedding::resolve_identity(provider.as_ref()).await?;

	let mut mode = decision.mode;
	if mode == RebuildMode::Incremental {
		if let Err(e) = state.check_embedding_identity(&identity) {
			// An incremental patch with a different model would mix vector
			// spaces; escalate to a full rebuild instead
			warn!("{e:#}; escalating to a full rebuild");
			mode = RebuildMode::Full;
		}
	}

	let report = match mode {
		RebuildMode::Full => {
			let staging = LocalVectorStore::staging(project_dir)?;
			let mut graph = CrossReferenceGraph::default();
			let mut fresh_state = ProjectState::default();
			fresh_state.embedding_identity = Some(identity);

			let files = collect_source_files(project_dir, config);
			let mut report = index_files(
				project_dir,
				config,
				&files,
				provider.as_ref(),
				&staging,
				&mut graph,
				&mut fresh_state,
			)
			.await?;

			fresh_state.last_commit = tracker.current_commit().await.ok();
			fresh_state.built_at = Some(chrono::Utc::now().to_rfc3339());

			rebuild_hierarchy(&staging, project_dir).await?;
			graph.save(project_dir)?;
			// The previous index answers queries until this rename lands
			staging.commit()?;
			fresh_state.save(project_dir)?;

			report.mode = Some(RebuildMode::Full);
			report
		}
		RebuildMode::Incremental => {
			let mut graph = CrossReferenceGraph::load(project_dir)?;
			let mut changed = Vec::new();
			let mut removed_files = 0usize;

			for path in &decision.affected_files {
				// Retract the file's old fragments before anything new
				// lands, deletions included
				let retracted = graph.remove_file(path);
				if !retracted.is_empty() {
					live_store.delete(&retracted).await?;
				}
				if project_dir.join(path).exists() {
					changed.push(path.clone());
				} else {
					state.forget_file(path);
					removed_files += 1;
				}
			}

			let mut report = index_files(
				project_dir,
				config,
				&changed,
				provider.as_ref(),
				&live_store,
				&mut graph,
				&mut state,
			)
			.await?;

			state.embedding_identity = Some(identity);
			state.last_commit = tracker.current_commit().await.ok();
			state.built_at = Some(chrono::Utc::now().to_rfc3339());

			rebuild_hierarchy(&live_store, project_dir).await?;
			graph.save(project_dir)?;
			state.save(project_dir)?;

			report.mode = Some(RebuildMode::Incremental);
			report.files_removed = removed_files;
			report
		}
		RebuildMode::None => unreachable!("must_rebuild was checked above"),
	};

	lock.release()?;
	Ok(BuildReport {
		elapsed: started.elapsed(),
		..report
	})
}

/// Chunk, extract, embed and register a set of files. Extraction runs in
/// parallel; the graph is mutated only on this single task, as each
/// embedding batch commits to the store.
async fn index_files(
	project_dir: &Path,
	config: &Config,
	files: &[String],
	provider: &dyn EmbeddingProvider,
	store: &LocalVectorStore,
	graph: &mut CrossReferenceGraph,
	state: &mut ProjectState,
) -> Result<BuildReport> {
	let mut report = BuildReport::default();
	let project_dir_owned = Arc::new(project_dir.to_path_buf());
	let config_owned = Arc::new(config.clone());

	let extractions: Vec<Result<FileExtraction>> = stream::iter(files.iter().cloned())
		.map(|path| {
			let project_dir = project_dir_owned.clone();
			let config = config_owned.clone();
			tokio::task::spawn_blocking(move || extract_file(&project_dir, &path, &config))
		})
		.buffered(EXTRACTION_CONCURRENCY)
		.map(|joined| match joined {
			Ok(result) => result,
			Err(e) => Err(anyhow!("Extraction task panicked: {e}")),
		})
		.collect()
		.await;

	let mut pending_fps: HashSet<String> = HashSet::new();
	let mut batch = PendingBatch::default();

	for (path, extraction) in files.iter().zip(extractions) {
		let extraction = match extraction {
			Ok(extraction) => extraction,
			Err(e) => {
				warn!("Failed to process {path}: {e:#}");
				report.file_errors.push((path.clone(), format!("{e:#}")));
				continue;
			}
		};

		for (fragment, meta) in extraction.fragments {
			// An already-stored fragment needs no new embedding, but this
			// file still becomes one of its owners in the graph
			if graph.has_fragment(&fragment.fingerprint) {
				report.duplicates_skipped += 1;
				graph.add_fragment(&fragment, &meta);
				continue;
			}
			if pending_fps.contains(&fragment.fingerprint) {
				report.duplicates_skipped += 1;
				batch.riders.push((fragment, meta));
				continue;
			}
			pending_fps.insert(fragment.fingerprint.clone());

			if !meta.has_semantic_anchors() {
				debug!(
					"Fragment without semantic anchors: {} ordinal {}",
					fragment.path, fragment.ordinal
				);
				report.anchorless_fragments += 1;
			}

			batch.tokens += count_tokens(&fragment.content);
			batch.items.push((fragment, meta));
			if batch.items.len() >= config.index.embeddings_batch_size
				|| batch.tokens >= config.index.embeddings_max_tokens_per_batch
			{
				flush_batch(config, provider, store, graph, &mut batch, &mut report).await;
				pending_fps.clear();
			}
		}

		state.record_file(&extraction.path, extraction.content_hash);
		report.files_processed += 1;
	}

	if !batch.items.is_empty() {
		flush_batch(config, provider, store, graph, &mut batch, &mut report).await;
	}

	// Unindexed files stay untracked so the next run picks them up again
	for file in &report.unindexed_files {
		state.forget_file(file);
	}

	Ok(report)
}

/// One embedding batch in flight. A rider is a duplicate of an item from
/// another file: it needs no vector of its own, but its graph facts must
/// land together with the item's store entry.
#[derive(Default)]
struct PendingBatch {
	items: Vec<(Fragment, FragmentMetadata)>,
	riders: Vec<(Fragment, FragmentMetadata)>,
	tokens: usize,
}

/// Embed and upsert one batch, retrying with exponential backoff. Graph
/// registration happens only once the store upsert lands, so graph and
/// status never claim fragments the store does not hold. When retries are
/// exhausted the batch's files are reported unindexed and the build moves
/// on; nothing previously committed is touched.
async fn flush_batch(
	config: &Config,
	provider: &dyn EmbeddingProvider,
	store: &LocalVectorStore,
	graph: &mut CrossReferenceGraph,
	batch: &mut PendingBatch,
	report: &mut BuildReport,
) {
	if batch.items.is_empty() {
		return;
	}
	let pending: Vec<(Fragment, FragmentMetadata)> = batch.items.drain(..).collect();
	let riders: Vec<(Fragment, FragmentMetadata)> = batch.riders.drain(..).collect();
	batch.tokens = 0;
	let texts: Vec<String> = pending
		.iter()
		.map(|(fragment, _)| fragment.embedding_text())
		.collect();

	let mut attempt = 0usize;
	loop {
		match provider.embed_batch(&texts).await {
			Ok(vectors) if vectors.len() == texts.len() => {
				let entries: Vec<StoreEntry> = pending
					.iter()
					.zip(vectors)
					.map(|((fragment, meta), vector)| StoreEntry {
						id: fragment.fingerprint.clone(),
						vector,
						payload: StorePayload {
							fragment: fragment.clone(),
							metadata: meta.clone(),
						},
					})
					.collect();
				match store.upsert(entries).await {
					Ok(()) => {
						for (fragment, meta) in pending.iter().chain(riders.iter()) {
							graph.add_fragment(fragment, meta);
						}
						report.fragments_created += pending.len();
						debug!("Committed batch of {} fragments", texts.len());
						return;
					}
					Err(e) => warn!("Store upsert failed: {e:#}"),
				}
			}
			Ok(vectors) => warn!(
				"Embedding batch size mismatch: {} texts, {} vectors",
				texts.len(),
				vectors.len()
			),
			Err(e) => warn!("Embedding batch failed: {e:#}"),
		}

		attempt += 1;
		if attempt >= config.index.batch_max_retries {
			let mut files: Vec<String> = pending
				.iter()
				.chain(riders.iter())
				.map(|(f, _)| f.path.clone())
				.collect();
			files.sort();
			files.dedup();
			warn!(
				"Batch failed after {attempt} attempts, marking {} files unindexed",
				files.len()
			);
			for file in files {
				if !report.unindexed_files.contains(&file) {
					report.unindexed_files.push(file);
				}
			}
			return;
		}
		let backoff = Duration::from_millis(250 * (1 << attempt.min(6)) as u64);
		tokio::time::sleep(backoff).await;
	}
}

/// The hierarchy is a derived view over the complete fragment set, so it
/// is rebuilt from the store after every change to that set.
async fn rebuild_hierarchy(store: &LocalVectorStore, project_dir: &Path) -> Result<()> {
	let payloads = store.all_payloads().await?;
	let pairs: Vec<(Fragment, FragmentMetadata)> = payloads
		.into_iter()
		.map(|p| (p.fragment, p.metadata))
		.collect();
	let hierarchy = HierarchicalIndex::build(&pairs);
	if hierarchy.anchorless_ratio() > 0.5 {
		warn!(
			"{:.0}% of fragments lack structural anchors; retrieval quality may suffer",
			hierarchy.anchorless_ratio() * 100.0
		);
	}
	hierarchy.save(project_dir)
}

/// Status snapshot for the CLI: lifecycle plus the decision a build would
/// make right now.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusReport {
	pub lifecycle: crate::state::IndexLifecycle,
	pub decision: IndexRebuildDecision,
	pub tracked_files: usize,
	pub fragment_count: usize,
	pub graph: crate::graph::GraphStatistics,
	pub embedding_model: Option<String>,
}

pub async fn status(project_dir: &Path, config: &Config) -> Result<StatusReport> {
	let state = ProjectState::load(project_dir)?;
	let store = LocalVectorStore::open(project_dir)?;
	let store_count = store.count().await?;

	let tracker = ChangeTracker::new(project_dir, config);
	let decision = tracker
		.decide_rebuild(state.as_ref(), store_count, false)
		.await;

	let lifecycle = if BuildLock::is_locked(project_dir) {
		crate::state::IndexLifecycle::Building
	} else if state.is_none() || store_count == 0 {
		crate::state::IndexLifecycle::NotBuilt
	} else if decision.must_rebuild {
		crate::state::IndexLifecycle::Stale
	} else {
		crate::state::IndexLifecycle::Ready
	};

	let graph = CrossReferenceGraph::load(project_dir)?;
	Ok(StatusReport {
		lifecycle,
		decision,
		tracked_files: state.as_ref().map(|s| s.files.len()).unwrap_or(0),
		fragment_count: store_count,
		graph: graph.statistics(),
		embedding_model: state
			.as_ref()
			.and_then(|s| s.embedding_identity.as_ref())
			.map(|i| i.model.clone()),
	})
}

/// Remove all index data for a project. Takes the build lock first.
pub fn clear(project_dir: &Path) -> Result<()> {
	let mut lock = BuildLock::new(project_dir);
	if !lock.try_acquire()? {
		return Err(anyhow!("An index build is running; not clearing"));
	}
	let dir = project_data_dir(project_dir);
	for name in ["store.json", "graph.json", "hierarchy.json", "state.json"] {
		let path = dir.join(name);
		if path.exists() {
			std::fs::remove_file(&path)
				.with_context(|| format!("Failed to remove {}", path.display()))?;
		}
	}
	lock.release()?;
	Ok(())
}
