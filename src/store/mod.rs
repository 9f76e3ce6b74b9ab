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

//! Vector store boundary. The pipeline only depends on the `VectorStore`
//! trait; the bundled implementation persists records per project and does
//! exact nearest-neighbor search. Upserts are keyed by fragment fingerprint
//! and idempotent, so replaying a batch after a partial failure is safe.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::project_data_dir;
use crate::indexer::chunker::Fragment;
use crate::indexer::metadata::FragmentMetadata;

const STORE_FILE: &str = "store.json";

/// What travels with each vector: the fragment and its structural facts,
/// everything reranking and context assembly need without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePayload {
	pub fragment: Fragment,
	pub metadata: FragmentMetadata,
}

/// One record to insert or replace, keyed by fragment fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
	pub id: String,
	pub vector: Vec<f32>,
	pub payload: StorePayload,
}

/// A nearest-neighbor match. Lower distance is closer.
#[derive(Debug, Clone)]
pub struct SearchHit {
	pub id: String,
	pub distance: f32,
	pub payload: StorePayload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
	/// Insert or replace records. Idempotent per id.
	async fn upsert(&self, entries: Vec<StoreEntry>) -> Result<()>;

	async fn delete(&self, ids: &[String]) -> Result<()>;

	/// Top-k nearest records by cosine distance to the query vector.
	async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

	async fn count(&self) -> Result<usize>;

	/// Every stored payload; used to rebuild derived views.
	async fn all_payloads(&self) -> Result<Vec<StorePayload>>;

	async fn clear(&self) -> Result<()>;
}

/// File-backed store with exact cosine search. A full rebuild writes into
/// a staging file and renames it over the live one on commit, so the
/// previous index stays intact until the new one fully lands.
pub struct LocalVectorStore {
	write_path: PathBuf,
	live_path: PathBuf,
	records: RwLock<BTreeMap<String, StoreEntry>>,
}

impl LocalVectorStore {
	/// Open the live store for a project, loading existing records.
	pub fn open(project_dir: &Path) -> Result<Self> {
		let live_path = project_data_dir(project_dir).join(STORE_FILE);
		let records = Self::load_records(&live_path)?;
		Ok(Self {
			write_path: live_path.clone(),
			live_path,
			records: RwLock::new(records),
		})
	}

	/// Open an empty staging store. Nothing is visible to readers of the
	/// live store until `commit` renames the staging file into place.
	pub fn staging(project_dir: &Path) -> Result<Self> {
		let live_path = project_data_dir(project_dir).join(STORE_FILE);
		let write_path = live_path.with_extension("json.staging");
		if write_path.exists() {
			fs::remove_file(&write_path).with_context(|| {
				format!("Failed to remove stale staging store: {}", write_path.display())
			})?;
		}
		Ok(Self {
			write_path,
			live_path,
			records: RwLock::new(BTreeMap::new()),
		})
	}

	/// Atomically promote a staging store to live. No-op when already live.
	pub fn commit(&self) -> Result<()> {
		if self.write_path != self.live_path {
			fs::rename(&self.write_path, &self.live_path).with_context(|| {
				format!(
					"Failed to promote staging store {} to {}",
					self.write_path.display(),
					self.live_path.display()
				)
			})?;
		}
		Ok(())
	}

	fn load_records(path: &Path) -> Result<BTreeMap<String, StoreEntry>> {
		if !path.exists() {
			return Ok(BTreeMap::new());
		}
		let contents = fs::read_to_string(path)
			.with_context(|| format!("Failed to read vector store: {}", path.display()))?;
		serde_json::from_str(&contents).context("Failed to parse vector store")
	}

	fn persist(&self) -> Result<()> {
		if let Some(parent) = self.write_path.parent() {
			fs::create_dir_all(parent)?;
		}
		let records = self.records.read();
		let contents = serde_json::to_string(&*records).context("Failed to serialize store")?;
		fs::write(&self.write_path, contents)
			.with_context(|| format!("Failed to write vector store: {}", self.write_path.display()))?;
		Ok(())
	}
}

/// Cosine distance in [0, 2]; 0 means identical direction.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 2.0;
	}
	let mut dot = 0.0f32;
	let mut norm_a = 0.0f32;
	let mut norm_b = 0.0f32;
	for (x, y) in a.iter().zip(b.iter()) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}
	if norm_a == 0.0 || norm_b == 0.0 {
		return 2.0;
	}
	1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorStore for LocalVectorStore {
	async fn upsert(&self, entries: Vec<StoreEntry>) -> Result<()> {
		{
			let mut records = self.records.write();
			for entry in entries {
				records.insert(entry.id.clone(), entry);
			}
		}
		self.persist()
	}

	async fn delete(&self, ids: &[String]) -> Result<()> {
		{
			let mut records = self.records.write();
			for id in ids {
				records.remove(id);
			}
		}
		self.persist()
	}

	async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		let records = self.records.read();
		let mut hits: Vec<SearchHit> = records
			.values()
			.map(|entry| SearchHit {
				id: entry.id.clone(),
				distance: cosine_distance(query, &entry.vector),
				payload: entry.payload.clone(),
			})
			.collect();
		hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
		hits.truncate(k);
		Ok(hits)
	}

	async fn count(&self) -> Result<usize> {
		Ok(self.records.read().len())
	}

	async fn all_payloads(&self) -> Result<Vec<StorePayload>> {
		Ok(self
			.records
			.read()
			.values()
			.map(|entry| entry.payload.clone())
			.collect())
	}

	async fn clear(&self) -> Result<()> {
		self.records.write().clear();
		self.persist()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(id: &str, vector: Vec<f32>) -> StoreEntry {
		StoreEntry {
			id: id.to_string(),
			vector,
			payload: StorePayload {
				fragment: Fragment {
					path: format!("{id}.py"),
					content: format!("content of {id}"),
					start_line: 0,
					end_line: 1,
					ordinal: 0,
					fingerprint: id.to_string(),
					semantic_score: 0.5,
					leading_context: String::new(),
					trailing_context: String::new(),
				},
				metadata: FragmentMetadata::default(),
			},
		}
	}

	fn temp_project(tag: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!(
			"codeatlas-store-test-{tag}-{}",
			std::process::id()
		));
		let _ = fs::remove_dir_all(&dir);
		fs::create_dir_all(&dir).unwrap();
		dir
	}

	#[tokio::test]
	async fn upsert_is_idempotent_per_id() {
		let project = temp_project("idem");
		let store = LocalVectorStore::open(&project).unwrap();
		store.upsert(vec![entry("a", vec![1.0, 0.0])]).await.unwrap();
		store.upsert(vec![entry("a", vec![1.0, 0.0])]).await.unwrap();
		assert_eq!(store.count().await.unwrap(), 1);
		let _ = fs::remove_dir_all(&project);
	}

	#[tokio::test]
	async fn search_orders_by_cosine_distance() {
		let project = temp_project("search");
		let store = LocalVectorStore::open(&project).unwrap();
		store
			.upsert(vec![
				entry("close", vec![1.0, 0.1]),
				entry("far", vec![-1.0, 0.0]),
				entry("mid", vec![0.3, 1.0]),
			])
			.await
			.unwrap();

		let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
		assert_eq!(hits.len(), 2);
		assert_eq!(hits[0].id, "close");
		assert!(hits[0].distance < hits[1].distance);
		let _ = fs::remove_dir_all(&project);
	}

	#[tokio::test]
	async fn records_survive_reopen() {
		let project = temp_project("persist");
		{
			let store = LocalVectorStore::open(&project).unwrap();
			store.upsert(vec![entry("a", vec![0.5, 0.5])]).await.unwrap();
		}
		let reopened = LocalVectorStore::open(&project).unwrap();
		assert_eq!(reopened.count().await.unwrap(), 1);
		let _ = fs::remove_dir_all(&project);
	}

	#[tokio::test]
	async fn staging_commit_replaces_live_store() {
		let project = temp_project("staging");
		{
			let live = LocalVectorStore::open(&project).unwrap();
			live.upsert(vec![entry("old", vec![1.0, 0.0])]).await.unwrap();
		}

		let staging = LocalVectorStore::staging(&project).unwrap();
		staging.upsert(vec![entry("new", vec![0.0, 1.0])]).await.unwrap();

		// Live store unchanged until commit
		let live = LocalVectorStore::open(&project).unwrap();
		assert_eq!(live.count().await.unwrap(), 1);
		assert_eq!(live.search(&[1.0, 0.0], 1).await.unwrap()[0].id, "old");

		staging.commit().unwrap();
		let promoted = LocalVectorStore::open(&project).unwrap();
		assert_eq!(promoted.count().await.unwrap(), 1);
		assert_eq!(promoted.search(&[0.0, 1.0], 1).await.unwrap()[0].id, "new");
		let _ = fs::remove_dir_all(&project);
	}

	#[test]
	fn cosine_distance_edge_cases() {
		assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
		assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
		// Mismatched dimensions never panic, they just rank last
		assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 2.0);
		assert_eq!(cosine_distance(&[], &[]), 2.0);
	}
}
