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

//! Retrieval with a three-strategy fallback ladder. Each strategy embeds
//! a different rendering of the question (rewritten keywords, the verbatim
//! question, extracted key terms) and the ladder stops at the first
//! strategy that yields enough results. Hits are reranked with
//! deterministic structural factors on top of vector distance.

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::query::intent::Intent;
use crate::query::rewrite;
use crate::store::{StorePayload, VectorStore};
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

// Structural reranking factors, applied to distance (lower = better)
const EXACT_PHRASE_FACTOR: f32 = 0.6;
const SYMBOL_MATCH_FACTOR: f32 = 0.6;
const PATH_MATCH_FACTOR: f32 = 0.8;
const WORD_MATCH_FLOOR: f32 = 0.8;
const WORD_MATCH_RANGE: f32 = 0.15;
const INTENT_TAG_FACTOR: f32 = 0.75;
const CALL_DENSITY_FACTOR: f32 = 0.7;
const SEMANTIC_SCORE_RANGE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
	RewrittenKeywords,
	OriginalQuestion,
	KeyTerms,
}

impl RetrievalStrategy {
	pub fn as_str(&self) -> &'static str {
		match self {
			RetrievalStrategy::RewrittenKeywords => "rewritten_keywords",
			RetrievalStrategy::OriginalQuestion => "original_question",
			RetrievalStrategy::KeyTerms => "key_terms",
		}
	}
}

#[derive(Debug, Clone)]
pub struct ScoredFragment {
	pub payload: StorePayload,
	/// Reranked distance, lower is better.
	pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
	pub hits: Vec<ScoredFragment>,
	pub strategy: Option<RetrievalStrategy>,
	/// True when even the last strategy produced fewer hits than the
	/// sufficiency threshold and the result is best-effort.
	pub insufficient: bool,
}

impl RetrievalResult {
	pub fn is_empty(&self) -> bool {
		self.hits.is_empty()
	}
}

pub struct Retriever<'a> {
	store: &'a dyn VectorStore,
	provider: &'a dyn EmbeddingProvider,
	config: &'a RetrievalConfig,
}

impl<'a> Retriever<'a> {
	pub fn new(
		store: &'a dyn VectorStore,
		provider: &'a dyn EmbeddingProvider,
		config: &'a RetrievalConfig,
	) -> Self {
		Self {
			store,
			provider,
			config,
		}
	}

	/// Run the fallback ladder. Returns the first sufficient strategy's
	/// hits, or the best non-empty attempt flagged insufficient, or an
	/// empty result when nothing matched at all.
	pub async fn retrieve(
		&self,
		question: &str,
		rewritten: &str,
		intent: Intent,
	) -> Result<RetrievalResult> {
		let key_terms = rewrite::extract_key_terms(question, self.config.max_key_terms).join(" ");
		let ladder = [
			(RetrievalStrategy::RewrittenKeywords, rewritten),
			(RetrievalStrategy::OriginalQuestion, question),
			(RetrievalStrategy::KeyTerms, key_terms.as_str()),
		];

		let mut best: Option<(RetrievalStrategy, Vec<ScoredFragment>)> = None;
		let mut tried = Vec::new();
		for (strategy, text) in ladder {
			let text = text.trim();
			if text.is_empty() || tried.contains(&text.to_string()) {
				continue;
			}
			tried.push(text.to_string());

			let hits = self.search_once(text, intent).await?;
			debug!(
				strategy = strategy.as_str(),
				hits = hits.len(),
				"retrieval strategy attempted"
			);
			if hits.len() >= self.config.sufficiency_threshold {
				info!(strategy = strategy.as_str(), hits = hits.len(), "retrieval succeeded");
				return Ok(RetrievalResult {
					hits,
					strategy: Some(strategy),
					insufficient: false,
				});
			}
			let better = best
				.as_ref()
				.map(|(_, b)| hits.len() > b.len())
				.unwrap_or(!hits.is_empty());
			if better {
				best = Some((strategy, hits));
			}
		}

		match best {
			Some((strategy, hits)) => Ok(RetrievalResult {
				hits,
				strategy: Some(strategy),
				insufficient: true,
			}),
			None => Ok(RetrievalResult {
				hits: Vec::new(),
				strategy: None,
				insufficient: true,
			}),
		}
	}

	async fn search_once(&self, query_text: &str, intent: Intent) -> Result<Vec<ScoredFragment>> {
		let vectors = self.provider.embed_batch(&[query_text.to_string()]).await?;
		let vector = vectors
			.into_iter()
			.next()
			.ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector for query"))?;
		let raw = self.store.search(&vector, self.config.top_k).await?;
		let hits = raw
			.into_iter()
			.map(|hit| {
				let distance = rerank_distance(hit.distance, &hit.payload, query_text, intent);
				ScoredFragment {
					payload: hit.payload,
					distance,
				}
			})
			.collect();
		Ok(sorted(hits))
	}
}

fn sorted(mut hits: Vec<ScoredFragment>) -> Vec<ScoredFragment> {
	hits.sort_by(|a, b| {
		a.distance
			.partial_cmp(&b.distance)
			.unwrap_or(std::cmp::Ordering::Equal)
	});
	hits
}

/// Deterministic structural reranking: start from the vector distance and
/// multiply in factors for text, symbol, and path matches plus an
/// intent-specific structural boost.
pub fn rerank_distance(
	distance: f32,
	payload: &StorePayload,
	query_text: &str,
	intent: Intent,
) -> f32 {
	let query_lower = query_text.to_lowercase();
	let mut score = distance.max(0.0);

	score *= text_match_factor(&payload.fragment.content, &query_lower);
	score *= symbol_match_factor(payload.metadata.symbol_names(), &query_lower);
	score *= path_match_factor(&payload.fragment.path, &query_lower);
	score *= intent_factor(payload, intent);
	// Fragments that open on a declaration boundary carry more signal
	score *= 1.0 - SEMANTIC_SCORE_RANGE * payload.fragment.semantic_score.clamp(0.0, 1.0);

	score
}

fn text_match_factor(content: &str, query_lower: &str) -> f32 {
	let content_lower = content.to_lowercase();
	if content_lower.contains(query_lower) {
		return EXACT_PHRASE_FACTOR;
	}

	let query_words: Vec<&str> = query_lower.split_whitespace().collect();
	if query_words.is_empty() {
		return 1.0;
	}
	let matches = query_words
		.iter()
		.filter(|w| content_lower.contains(*w))
		.count();
	if matches > 0 {
		let ratio = matches as f32 / query_words.len() as f32;
		return WORD_MATCH_FLOOR + (1.0 - ratio) * WORD_MATCH_RANGE;
	}
	1.0
}

fn symbol_match_factor<'s>(
	symbols: impl Iterator<Item = &'s String>,
	query_lower: &str,
) -> f32 {
	for symbol in symbols {
		let symbol_lower = symbol.to_lowercase();
		if query_lower.contains(&symbol_lower)
			|| query_lower
				.split_whitespace()
				.any(|w| symbol_lower.contains(w))
		{
			return SYMBOL_MATCH_FACTOR;
		}
	}
	1.0
}

fn path_match_factor(path: &str, query_lower: &str) -> f32 {
	let path_lower = path.to_lowercase();
	if query_lower
		.split_whitespace()
		.any(|w| w.len() > 2 && path_lower.contains(w))
	{
		return PATH_MATCH_FACTOR;
	}
	1.0
}

/// Intent-specific structural evidence: fragments whose metadata carries
/// the kind of structure the question is about rank higher.
fn intent_factor(payload: &StorePayload, intent: Intent) -> f32 {
	let meta = &payload.metadata;
	match intent {
		Intent::SemanticReasoning if !meta.design_patterns.is_empty() => INTENT_TAG_FACTOR,
		Intent::DeepArchitecture if meta.api_usage.len() >= 2 => INTENT_TAG_FACTOR,
		Intent::CodeRelationship if !meta.call_sites.is_empty() => {
			// Denser call graphs get a stronger boost
			let density = (meta.call_sites.len() as f32 / 10.0).min(1.0);
			1.0 - (1.0 - CALL_DENSITY_FACTOR) * density
		}
		Intent::BusinessLogic if !meta.business_logic.is_empty() => INTENT_TAG_FACTOR,
		Intent::UiFlow if !meta.ui_elements.is_empty() => INTENT_TAG_FACTOR,
		Intent::Validation if !meta.error_handling.is_empty() => INTENT_TAG_FACTOR,
		Intent::LocationUsage if !meta.class_names.is_empty() || !meta.function_names.is_empty() => {
			0.9
		}
		Intent::ImpactAnalysis if !meta.inheritance.is_empty() || meta.call_sites.len() >= 3 => {
			INTENT_TAG_FACTOR
		}
		Intent::Overview if !meta.class_names.is_empty() => 0.9,
		_ => 1.0,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RetrievalConfig;
	use crate::indexer::chunker::Fragment;
	use crate::indexer::metadata::FragmentMetadata;
	use crate::store::{LocalVectorStore, StoreEntry, VectorStore};
	use async_trait::async_trait;
	use std::sync::Mutex;

	fn payload(path: &str, content: &str) -> StorePayload {
		StorePayload {
			fragment: Fragment {
				path: path.to_string(),
				content: content.to_string(),
				start_line: 1,
				end_line: 5,
				ordinal: 0,
				fingerprint: format!("fp-{path}"),
				semantic_score: 0.5,
				leading_context: String::new(),
				trailing_context: String::new(),
			},
			metadata: FragmentMetadata::default(),
		}
	}

	struct FixedEmbedder {
		calls: Mutex<Vec<String>>,
	}

	#[async_trait]
	impl crate::embedding::EmbeddingProvider for FixedEmbedder {
		async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
			self.calls.lock().unwrap().extend(texts.iter().cloned());
			Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
		}

		fn model_id(&self) -> &str {
			"test:fixed"
		}
	}

	#[test]
	fn exact_phrase_match_lowers_distance() {
		let p = payload("src/auth.py", "def login(user):\n    check_password(user)");
		let base = 0.5;
		let reranked = rerank_distance(base, &p, "login", Intent::SemanticReasoning);
		assert!(reranked < base);
	}

	#[test]
	fn reranking_is_deterministic() {
		let p = payload("src/auth.py", "def login(user): pass");
		let a = rerank_distance(0.42, &p, "login user", Intent::LocationUsage);
		let b = rerank_distance(0.42, &p, "login user", Intent::LocationUsage);
		assert_eq!(a, b);
	}

	#[test]
	fn relationship_intent_prefers_call_dense_fragments() {
		let mut dense = payload("a.py", "run()");
		dense.metadata.call_sites = (0..8)
			.map(|i| crate::indexer::languages::CallSite {
				callee: format!("f{i}"),
				line: i + 1,
			})
			.collect();
		let sparse = payload("b.py", "run()");
		let d_dense = rerank_distance(0.5, &dense, "zzz", Intent::CodeRelationship);
		let d_sparse = rerank_distance(0.5, &sparse, "zzz", Intent::CodeRelationship);
		assert!(d_dense < d_sparse);
	}

	#[tokio::test]
	async fn ladder_stops_at_first_sufficient_strategy() {
		let dir = std::env::temp_dir().join(format!("atlas-retrieve-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let store = LocalVectorStore::open(&dir).unwrap();
		store
			.upsert(vec![
				StoreEntry {
					id: "1".into(),
					vector: vec![1.0, 0.0, 0.0],
					payload: payload("a.py", "session refresh"),
				},
				StoreEntry {
					id: "2".into(),
					vector: vec![0.9, 0.1, 0.0],
					payload: payload("b.py", "token cache"),
				},
			])
			.await
			.unwrap();
		let embedder = FixedEmbedder {
			calls: Mutex::new(Vec::new()),
		};
		let config = RetrievalConfig {
			top_k: 10,
			sufficiency_threshold: 2,
			max_key_terms: 6,
		};
		let retriever = Retriever::new(&store, &embedder, &config);
		let result = retriever
			.retrieve("How does session refresh work?", "session refresh", Intent::SemanticReasoning)
			.await
			.unwrap();
		assert_eq!(result.strategy, Some(RetrievalStrategy::RewrittenKeywords));
		assert!(!result.insufficient);
		// Later strategies were never embedded
		assert_eq!(embedder.calls.lock().unwrap().len(), 1);
		std::fs::remove_dir_all(&dir).ok();
	}

	#[tokio::test]
	async fn empty_store_yields_empty_result_not_error() {
		let dir = std::env::temp_dir().join(format!("atlas-retrieve-empty-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let store = LocalVectorStore::open(&dir).unwrap();
		let embedder = FixedEmbedder {
			calls: Mutex::new(Vec::new()),
		};
		let config = RetrievalConfig::default();
		let retriever = Retriever::new(&store, &embedder, &config);
		let result = retriever
			.retrieve("anything", "anything", Intent::Overview)
			.await
			.unwrap();
		assert!(result.is_empty());
		assert!(result.insufficient);
		assert_eq!(result.strategy, None);
		std::fs::remove_dir_all(&dir).ok();
	}

	#[tokio::test]
	async fn duplicate_ladder_rungs_are_embedded_once() {
		let dir = std::env::temp_dir().join(format!("atlas-retrieve-dup-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let store = LocalVectorStore::open(&dir).unwrap();
		let embedder = FixedEmbedder {
			calls: Mutex::new(Vec::new()),
		};
		let config = RetrievalConfig::default();
		let retriever = Retriever::new(&store, &embedder, &config);
		// Rewritten text identical to the question collapses two rungs
		retriever
			.retrieve("cache", "cache", Intent::Overview)
			.await
			.unwrap();
		assert_eq!(embedder.calls.lock().unwrap().len(), 1);
		std::fs::remove_dir_all(&dir).ok();
	}
}
