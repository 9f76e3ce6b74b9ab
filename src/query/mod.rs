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

//! The question answering pipeline: classify intent, rewrite the
//! question, retrieve fragments, assemble graph-aware context, generate
//! the answer, and validate it. Only index-missing and embedding
//! identity errors are fatal; everything past retrieval degrades to a
//! best-effort answer with a quality flag.

pub mod context;
pub mod intent;
pub mod retrieve;
pub mod rewrite;
pub mod validate;

use crate::config::Config;
use crate::embedding;
use crate::graph::hierarchy::HierarchicalIndex;
use crate::graph::CrossReferenceGraph;
use crate::llm::LlmClient;
use crate::query::context::{AssembledContext, ContextAssembler};
use crate::query::intent::Intent;
use crate::query::retrieve::{RetrievalStrategy, Retriever};
use crate::query::rewrite::QueryRewriter;
use crate::query::validate::{AnswerValidator, QualityReport};
use crate::store::{LocalVectorStore, VectorStore};
use crate::state::ProjectState;
use anyhow::{bail, Result};
use std::path::Path;
use tracing::{info, warn};

/// Returned verbatim when no strategy found any fragments; no LLM call
/// is made in that case.
pub const NO_RESULTS_ANSWER: &str = "No indexed code matched this question. \
The index may be out of date, or the question may be about code outside \
the indexed file types. Try `codeatlas index` and rephrase with concrete \
identifiers.";

#[derive(Debug)]
pub struct QueryOutcome {
	pub answer: String,
	pub intent: Intent,
	pub confidence: f32,
	pub rewritten: String,
	pub strategy: Option<RetrievalStrategy>,
	pub context: AssembledContext,
	pub report: QualityReport,
}

/// Answer a question against the built index.
pub async fn ask(project_dir: &Path, config: &Config, question: &str) -> Result<QueryOutcome> {
	let Some(state) = ProjectState::load(project_dir)? else {
		bail!("No index found for this project. Run `codeatlas index` first.");
	};
	let store = LocalVectorStore::open(project_dir)?;
	if store.count().await? == 0 {
		bail!("The index is empty. Run `codeatlas index` first.");
	}

	let provider = embedding::create_provider(&config.embedding)?;
	let identity = embedding::resolve_identity(provider.as_ref()).await?;
	state.check_embedding_identity(&identity)?;

	let graph = CrossReferenceGraph::load(project_dir)?;
	let hierarchy = HierarchicalIndex::load(project_dir)?;

	let (intent, confidence) = intent::classify(question);
	info!(intent = intent.as_str(), confidence, "question classified");

	let llm = match LlmClient::from_config(&config.llm) {
		Ok(client) => Some(client),
		Err(e) => {
			warn!("LLM unavailable, degrading to extractive answers: {e:#}");
			None
		}
	};

	let rewriter = QueryRewriter::new(llm.as_ref());
	let rewritten = rewriter.rewrite(question, intent).await;

	let retriever = Retriever::new(&store, provider.as_ref(), &config.retrieval);
	let retrieval = retriever.retrieve(question, &rewritten, intent).await?;

	if retrieval.is_empty() {
		info!("no fragments retrieved, skipping answer generation");
		return Ok(QueryOutcome {
			answer: NO_RESULTS_ANSWER.to_string(),
			intent,
			confidence,
			rewritten,
			strategy: None,
			context: AssembledContext {
				layers: Vec::new(),
				text: String::new(),
				truncated: false,
			},
			report: QualityReport::needs_improvement(),
		});
	}

	let assembler = ContextAssembler::new(&graph, &hierarchy, &config.context);
	let assembled = assembler.assemble(&retrieval, intent);

	let answer = match &llm {
		Some(client) => {
			let user = format!(
				"Context from the codebase:\n{}\n\nQuestion: {}",
				assembled.text, question
			);
			match client.complete(system_prompt(intent), &user).await {
				Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
				Ok(_) => {
					warn!("LLM returned an empty answer, degrading to extractive answer");
					extractive_answer(&retrieval)
				}
				Err(e) => {
					warn!("answer generation failed, degrading to extractive answer: {e:#}");
					extractive_answer(&retrieval)
				}
			}
		}
		None => extractive_answer(&retrieval),
	};

	let validator = AnswerValidator::new(&graph);
	let report = validator.validate(question, &rewritten, &answer, &assembled, &retrieval);

	Ok(QueryOutcome {
		answer,
		intent,
		confidence,
		rewritten,
		strategy: retrieval.strategy,
		context: assembled,
		report,
	})
}

/// Intent-specific generation instructions.
fn system_prompt(intent: Intent) -> &'static str {
	match intent {
		Intent::Overview => {
			"You answer questions about a codebase. Give a concise high-level summary \
			of what the code does, naming the main components. Use only the provided context."
		}
		Intent::LocationUsage => {
			"You answer questions about a codebase. State exactly which files and lines \
			contain the requested code, citing paths from the context. Use only the provided context."
		}
		Intent::CodeRelationship => {
			"You answer questions about a codebase. Describe how the named symbols call \
			and depend on each other, citing the call flow from the context. Use only the provided context."
		}
		Intent::DeepArchitecture => {
			"You answer questions about a codebase. Explain the structure and layering \
			of the code, grounded in the components and relations in the context. Use only the provided context."
		}
		Intent::Validation => {
			"You answer questions about a codebase. Assess correctness and error handling \
			based strictly on the code in the context, pointing at concrete lines."
		}
		Intent::UiFlow => {
			"You answer questions about a codebase. Walk through the user-facing flow, \
			naming the screens and handlers involved. Use only the provided context."
		}
		Intent::BusinessLogic => {
			"You answer questions about a codebase. Explain the business rule or \
			calculation exactly as the code implements it. Use only the provided context."
		}
		Intent::ImpactAnalysis => {
			"You answer questions about a codebase. List what would be affected by the \
			proposed change, based on the callers, subtypes, and usages in the context."
		}
		Intent::SemanticReasoning => {
			"You answer questions about a codebase. Explain the behavior and reasoning \
			behind the code in the context. If the context is insufficient, say so. \
			Use only the provided context."
		}
	}
}

/// Fallback answer when no LLM is reachable: point at the best fragments.
fn extractive_answer(retrieval: &crate::query::retrieve::RetrievalResult) -> String {
	let mut lines = vec![
		"Answer generation is unavailable; the most relevant code locations are:".to_string(),
	];
	for hit in retrieval.hits.iter().take(5) {
		let fragment = &hit.payload.fragment;
		let symbols: Vec<&str> = hit
			.payload
			.metadata
			.symbol_names()
			.map(|s| s.as_str())
			.collect();
		if symbols.is_empty() {
			lines.push(format!(
				"- {} (lines {}-{})",
				fragment.path, fragment.start_line, fragment.end_line
			));
		} else {
			lines.push(format!(
				"- {} (lines {}-{}): {}",
				fragment.path,
				fragment.start_line,
				fragment.end_line,
				symbols.join(", ")
			));
		}
	}
	lines.join("\n")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn ask_without_index_is_a_clear_error() {
		let dir = std::env::temp_dir().join(format!("atlas-ask-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let config = Config::default();
		let err = ask(&dir, &config, "what does this do").await.unwrap_err();
		assert!(err.to_string().contains("codeatlas index"));
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn every_intent_has_a_prompt() {
		for intent in [
			Intent::Overview,
			Intent::LocationUsage,
			Intent::CodeRelationship,
			Intent::SemanticReasoning,
			Intent::DeepArchitecture,
			Intent::Validation,
			Intent::UiFlow,
			Intent::BusinessLogic,
			Intent::ImpactAnalysis,
		] {
			assert!(system_prompt(intent).contains("context"));
		}
	}

	#[test]
	fn extractive_answer_names_paths_and_symbols() {
		use crate::indexer::chunker::Fragment;
		use crate::indexer::metadata::FragmentMetadata;
		use crate::query::retrieve::{RetrievalResult, ScoredFragment};
		use crate::store::StorePayload;

		let mut metadata = FragmentMetadata::default();
		metadata.function_names = vec!["refresh_token".to_string()];
		let retrieval = RetrievalResult {
			hits: vec![ScoredFragment {
				payload: StorePayload {
					fragment: Fragment {
						path: "src/auth.py".to_string(),
						content: "def refresh_token(): pass".to_string(),
						start_line: 10,
						end_line: 12,
						ordinal: 0,
						fingerprint: "fp".to_string(),
						semantic_score: 1.0,
						leading_context: String::new(),
						trailing_context: String::new(),
					},
					metadata,
				},
				distance: 0.1,
			}],
			strategy: Some(RetrievalStrategy::KeyTerms),
			insufficient: true,
		};
		let answer = extractive_answer(&retrieval);
		assert!(answer.contains("src/auth.py"));
		assert!(answer.contains("refresh_token"));
	}
}
