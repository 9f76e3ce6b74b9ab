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

//! Answer validation. Scores an answer against the question, the
//! assembled context, and the cross-reference graph, then diagnoses
//! which pipeline stage degraded a weak answer. All heuristics are
//! deterministic; no LLM call is made here.

use crate::graph::CrossReferenceGraph;
use crate::query::context::AssembledContext;
use crate::query::retrieve::RetrievalResult;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

const WEIGHT_RELEVANCY: f32 = 0.35;
const WEIGHT_COMPLETENESS: f32 = 0.25;
const WEIGHT_ACCURACY: f32 = 0.25;
const WEIGHT_CODE_QUALITY: f32 = 0.15;

const HIGH_QUALITY_THRESHOLD: f32 = 0.8;
const ACCEPTABLE_THRESHOLD: f32 = 0.6;

lazy_static! {
	// CamelCase, snake_case, dotted and call-shaped identifiers
	static ref CODE_REF_RE: Regex =
		Regex::new(r"\b([a-z][a-z0-9]*[A-Z]\w*|[A-Z][a-z0-9]+[A-Z]\w*|\w+_\w+|\w+\(\))\b")
			.unwrap();
	static ref FILE_REF_RE: Regex =
		Regex::new(r"\b[\w/.-]+\.(py|js|jsx|ts|tsx|java|kt|kts|rs)\b").unwrap();
	static ref WORD_RE: Regex = Regex::new(r"[A-Za-z0-9_]+").unwrap();
	static ref HEDGE_RE: Regex =
		Regex::new(r"(?i)\b(probably|maybe|might be|i think|i'm not sure|cannot determine)\b")
			.unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
	HighQuality,
	Acceptable,
	NeedsImprovement,
}

impl QualityFlag {
	pub fn as_str(&self) -> &'static str {
		match self {
			QualityFlag::HighQuality => "high_quality",
			QualityFlag::Acceptable => "acceptable",
			QualityFlag::NeedsImprovement => "needs_improvement",
		}
	}

	fn from_overall(overall: f32) -> Self {
		if overall >= HIGH_QUALITY_THRESHOLD {
			QualityFlag::HighQuality
		} else if overall >= ACCEPTABLE_THRESHOLD {
			QualityFlag::Acceptable
		} else {
			QualityFlag::NeedsImprovement
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
	pub relevancy: f32,
	pub completeness: f32,
	pub accuracy: f32,
	pub code_quality: f32,
	pub overall: f32,
	pub flag: QualityFlag,
	/// Fraction of question entities that survived query rewriting.
	pub entity_preservation: f32,
	/// Fraction of retrieved fragments that made it into the context.
	pub retrieval_coverage: f32,
	pub recommendations: Vec<String>,
}

impl QualityReport {
	pub fn needs_improvement() -> Self {
		Self {
			relevancy: 0.0,
			completeness: 0.0,
			accuracy: 0.0,
			code_quality: 0.0,
			overall: 0.0,
			flag: QualityFlag::NeedsImprovement,
			entity_preservation: 0.0,
			retrieval_coverage: 0.0,
			recommendations: vec!["No relevant code was found for this question".to_string()],
		}
	}
}

pub struct AnswerValidator<'a> {
	graph: &'a CrossReferenceGraph,
}

impl<'a> AnswerValidator<'a> {
	pub fn new(graph: &'a CrossReferenceGraph) -> Self {
		Self { graph }
	}

	pub fn validate(
		&self,
		question: &str,
		rewritten: &str,
		answer: &str,
		context: &AssembledContext,
		retrieval: &RetrievalResult,
	) -> QualityReport {
		let relevancy = relevancy_score(question, answer);
		let completeness = completeness_score(answer, context);
		let accuracy = self.accuracy_score(answer, context);
		let code_quality = code_quality_score(answer);
		let overall = WEIGHT_RELEVANCY * relevancy
			+ WEIGHT_COMPLETENESS * completeness
			+ WEIGHT_ACCURACY * accuracy
			+ WEIGHT_CODE_QUALITY * code_quality;
		let flag = QualityFlag::from_overall(overall);

		let entity_preservation = entity_preservation_rate(question, rewritten);
		let retrieval_coverage = coverage_rate(retrieval, context);
		let recommendations = diagnose(
			flag,
			entity_preservation,
			retrieval_coverage,
			accuracy,
			retrieval,
		);
		for recommendation in &recommendations {
			warn!("answer quality: {recommendation}");
		}
		debug!(
			"answer validated: relevancy={relevancy:.2} completeness={completeness:.2} accuracy={accuracy:.2} code_quality={code_quality:.2} overall={overall:.2}"
		);

		QualityReport {
			relevancy,
			completeness,
			accuracy,
			code_quality,
			overall,
			flag,
			entity_preservation,
			retrieval_coverage,
			recommendations,
		}
	}

	/// Fraction of code references in the answer that the index can
	/// actually confirm, via the graph or the assembled context. An answer
	/// without code references scores neutral.
	fn accuracy_score(&self, answer: &str, context: &AssembledContext) -> f32 {
		let refs: BTreeSet<&str> = CODE_REF_RE
			.find_iter(answer)
			.map(|m| m.as_str().trim_end_matches("()"))
			.filter(|r| r.len() > 2)
			.collect();
		if refs.is_empty() {
			return 0.5;
		}
		let confirmed = refs
			.iter()
			.filter(|r| self.graph.has_symbol(r) || context.text.contains(*r))
			.count();
		confirmed as f32 / refs.len() as f32
	}
}

fn content_words(text: &str) -> BTreeSet<String> {
	WORD_RE
		.find_iter(text)
		.map(|m| m.as_str().to_lowercase())
		.filter(|w| w.len() > 2)
		.collect()
}

/// Word overlap between the question and the answer.
fn relevancy_score(question: &str, answer: &str) -> f32 {
	let question_words = content_words(question);
	if question_words.is_empty() {
		return 0.5;
	}
	let answer_words = content_words(answer);
	let overlap = question_words.intersection(&answer_words).count();
	(overlap as f32 / question_words.len() as f32).min(1.0)
}

/// How much of the context's symbol vocabulary the answer engages with.
fn completeness_score(answer: &str, context: &AssembledContext) -> f32 {
	let context_refs: BTreeSet<&str> = CODE_REF_RE
		.find_iter(&context.text)
		.map(|m| m.as_str().trim_end_matches("()"))
		.filter(|r| r.len() > 2)
		.collect();
	if context_refs.is_empty() {
		return 0.5;
	}
	let mentioned = context_refs.iter().filter(|r| answer.contains(*r)).count();
	// Engaging with a third of the available symbols is already thorough
	(mentioned as f32 / context_refs.len() as f32 * 3.0).min(1.0)
}

/// Concrete answers cite files and symbols and avoid hedging.
fn code_quality_score(answer: &str) -> f32 {
	let mut score: f32 = 0.4;
	if FILE_REF_RE.is_match(answer) {
		score += 0.3;
	}
	if CODE_REF_RE.is_match(answer) {
		score += 0.3;
	}
	let hedges = HEDGE_RE.find_iter(answer).count();
	score -= 0.15 * hedges as f32;
	score.clamp(0.0, 1.0)
}

/// Entities are question tokens that look like code identifiers.
fn question_entities(question: &str) -> BTreeSet<String> {
	CODE_REF_RE
		.find_iter(question)
		.map(|m| m.as_str().trim_end_matches("()").to_string())
		.filter(|e| e.len() > 2)
		.collect()
}

fn entity_preservation_rate(question: &str, rewritten: &str) -> f32 {
	let entities = question_entities(question);
	if entities.is_empty() {
		return 1.0;
	}
	let preserved = entities.iter().filter(|e| rewritten.contains(*e)).count();
	preserved as f32 / entities.len() as f32
}

fn coverage_rate(retrieval: &RetrievalResult, context: &AssembledContext) -> f32 {
	if retrieval.hits.is_empty() {
		return 1.0;
	}
	let covered = retrieval
		.hits
		.iter()
		.filter(|hit| context.text.contains(&hit.payload.fragment.path))
		.count();
	covered as f32 / retrieval.hits.len() as f32
}

/// Point at the pipeline stage most likely responsible for a weak answer.
fn diagnose(
	flag: QualityFlag,
	entity_preservation: f32,
	retrieval_coverage: f32,
	accuracy: f32,
	retrieval: &RetrievalResult,
) -> Vec<String> {
	let mut recommendations = Vec::new();
	if flag == QualityFlag::HighQuality {
		return recommendations;
	}
	if entity_preservation < 0.5 {
		recommendations.push(
			"Query rewriting dropped code identifiers from the question; retrieval likely missed the target"
				.to_string(),
		);
	}
	if retrieval_coverage < 0.5 {
		recommendations
			.push("Less than half of the retrieved fragments fit into the context budget".to_string());
	}
	if retrieval.insufficient {
		recommendations.push(
			"Retrieval fell below the sufficiency threshold on every strategy; the index may be missing relevant files"
				.to_string(),
		);
	}
	if accuracy < 0.5 {
		recommendations
			.push("The answer references symbols the index cannot confirm".to_string());
	}
	recommendations
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::query::context::AssembledContext;
	use crate::query::retrieve::RetrievalStrategy;

	fn context_with(text: &str) -> AssembledContext {
		AssembledContext {
			layers: Vec::new(),
			text: text.to_string(),
			truncated: false,
		}
	}

	fn empty_retrieval() -> RetrievalResult {
		RetrievalResult {
			hits: Vec::new(),
			strategy: Some(RetrievalStrategy::OriginalQuestion),
			insufficient: false,
		}
	}

	#[test]
	fn overall_uses_fixed_weights() {
		let graph = CrossReferenceGraph::default();
		let validator = AnswerValidator::new(&graph);
		let report = validator.validate(
			"how does login work",
			"login work",
			"Login is handled by auth_handler in src/auth.py, which calls check_password.",
			&context_with("def auth_handler():\n    check_password()"),
			&empty_retrieval(),
		);
		let expected = 0.35 * report.relevancy
			+ 0.25 * report.completeness
			+ 0.25 * report.accuracy
			+ 0.15 * report.code_quality;
		assert!((report.overall - expected).abs() < 1e-6);
	}

	#[test]
	fn confirmed_references_score_full_accuracy() {
		let graph = CrossReferenceGraph::default();
		let validator = AnswerValidator::new(&graph);
		let context = context_with("def check_password(user):\n    pass");
		let report = validator.validate(
			"where is password checked",
			"password checked",
			"See check_password.",
			&context,
			&empty_retrieval(),
		);
		assert_eq!(report.accuracy, 1.0);
	}

	#[test]
	fn unconfirmed_references_drag_accuracy_down() {
		let graph = CrossReferenceGraph::default();
		let validator = AnswerValidator::new(&graph);
		let report = validator.validate(
			"where is password checked",
			"password checked",
			"See totally_fabricated_function.",
			&context_with("def something_else(): pass"),
			&empty_retrieval(),
		);
		assert_eq!(report.accuracy, 0.0);
		assert!(report
			.recommendations
			.iter()
			.any(|r| r.contains("cannot confirm")));
	}

	#[test]
	fn answer_without_code_references_is_neutral_accuracy() {
		let graph = CrossReferenceGraph::default();
		let validator = AnswerValidator::new(&graph);
		let report = validator.validate(
			"what is this",
			"what",
			"It is an app.",
			&context_with(""),
			&empty_retrieval(),
		);
		assert_eq!(report.accuracy, 0.5);
	}

	#[test]
	fn dropped_entities_are_diagnosed() {
		let graph = CrossReferenceGraph::default();
		let validator = AnswerValidator::new(&graph);
		let report = validator.validate(
			"Why does MainActivity crash in onCreate?",
			"crash startup",
			"Unclear.",
			&context_with(""),
			&empty_retrieval(),
		);
		assert!(report.entity_preservation < 0.5);
		assert!(report
			.recommendations
			.iter()
			.any(|r| r.contains("dropped code identifiers")));
	}

	#[test]
	fn flag_thresholds() {
		assert_eq!(QualityFlag::from_overall(0.85), QualityFlag::HighQuality);
		assert_eq!(QualityFlag::from_overall(0.8), QualityFlag::HighQuality);
		assert_eq!(QualityFlag::from_overall(0.7), QualityFlag::Acceptable);
		assert_eq!(QualityFlag::from_overall(0.6), QualityFlag::Acceptable);
		assert_eq!(
			QualityFlag::from_overall(0.59),
			QualityFlag::NeedsImprovement
		);
	}

	#[test]
	fn hedging_lowers_code_quality() {
		let confident = code_quality_score("The retry lives in backoff_loop in src/net.py.");
		let hedged = code_quality_score("It is probably somewhere, maybe in the network code.");
		assert!(confident > hedged);
	}
}
