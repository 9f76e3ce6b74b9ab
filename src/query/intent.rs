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

//! Pattern-priority intent classification. Tiers are evaluated in order
//! and the first matching tier wins; confidence is fixed per tier. An
//! unmatched question falls back to semantic reasoning at low confidence,
//! never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fallback confidence when nothing matches.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
	Overview,
	LocationUsage,
	CodeRelationship,
	SemanticReasoning,
	DeepArchitecture,
	Validation,
	UiFlow,
	BusinessLogic,
	ImpactAnalysis,
}

impl Intent {
	pub fn as_str(&self) -> &'static str {
		match self {
			Intent::Overview => "overview",
			Intent::LocationUsage => "location_usage",
			Intent::CodeRelationship => "code_relationship",
			Intent::SemanticReasoning => "semantic_reasoning",
			Intent::DeepArchitecture => "deep_architecture",
			Intent::Validation => "validation",
			Intent::UiFlow => "ui_flow",
			Intent::BusinessLogic => "business_logic",
			Intent::ImpactAnalysis => "impact_analysis",
		}
	}
}

impl fmt::Display for Intent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

struct Tier {
	intent: Intent,
	confidence: f32,
	patterns: Vec<Regex>,
}

fn tier(intent: Intent, confidence: f32, patterns: &[&str]) -> Tier {
	Tier {
		intent,
		confidence,
		patterns: patterns
			.iter()
			.map(|p| Regex::new(&format!("(?i){p}")).expect("intent pattern must compile"))
			.collect(),
	}
}

lazy_static::lazy_static! {
	static ref TIERS: Vec<Tier> = vec![
		// Whole-project questions outrank everything else
		tier(Intent::Overview, 0.95, &[
			r"what (does|is) (this|the) (app|project|codebase|system|application)",
			r"\boverall\b",
			r"\bhigh.?level\b",
			r"purpose of (this|the)",
			r"summar(y|ize|ise)",
		]),
		tier(Intent::Overview, 0.9, &[
			r"\boverview\b",
			r"main (components|modules|parts)",
			r"how is .* (organized|organised|structured)",
			r"structure of (this|the)",
		]),
		tier(Intent::ImpactAnalysis, 0.8, &[
			r"\bimpact\b",
			r"what (happens|breaks|would break) if",
			r"\baffect(s|ed)?\b",
			r"\bripple\b",
			r"side.?effects?",
			r"safe to (change|remove|delete|rename)",
		]),
		tier(Intent::CodeRelationship, 0.8, &[
			r"who calls",
			r"what calls",
			r"\bcallers?\b",
			r"\bcallees?\b",
			r"depends? on",
			r"dependenc(y|ies)",
			r"used by",
			r"\binteracts? with\b",
			r"relationship between",
		]),
		tier(Intent::LocationUsage, 0.8, &[
			r"where (is|are|does)",
			r"which (file|class|module|function)",
			r"\blocated?\b",
			r"find the (file|class|function|definition)",
			r"\bdefined\b",
		]),
		tier(Intent::UiFlow, 0.8, &[
			r"\bscreen\b",
			r"\bbutton\b",
			r"\bdialog\b",
			r"\bnavigat(e|ion)\b",
			r"user (flow|interface|journey)",
			r"\bclick(s|ed|ing)?\b",
			r"\bui\b",
		]),
		tier(Intent::BusinessLogic, 0.8, &[
			r"\bbusiness\b",
			r"\bpricing\b",
			r"\bcalculat(e|ion|ed)\b",
			r"\bworkflow\b",
			r"\brules?\b for",
			r"logic (for|behind)",
		]),
		tier(Intent::Validation, 0.8, &[
			r"\bvalidat(e|ion|ed)\b",
			r"\bverify\b",
			r"error handling",
			r"edge cases?",
			r"is (this|it|that) correct",
			r"\btested\b",
		]),
		tier(Intent::DeepArchitecture, 0.8, &[
			r"\barchitecture\b",
			r"\blayers?\b",
			r"\bcoupling\b",
			r"data flow",
			r"\blifecycle\b",
			r"design of (the|this)",
		]),
		tier(Intent::SemanticReasoning, 0.8, &[
			r"\bwhy\b",
			r"how does",
			r"\bexplain\b",
			r"\breason\b",
			r"\bmean(s|ing)?\b",
			r"design patterns?",
		]),
	];
}

/// Classify a question. Always succeeds: unmatched input gets the
/// semantic-reasoning fallback at low confidence.
pub fn classify(question: &str) -> (Intent, f32) {
	for tier in TIERS.iter() {
		if tier.patterns.iter().any(|re| re.is_match(question)) {
			return (tier.intent, tier.confidence);
		}
	}
	(Intent::SemanticReasoning, FALLBACK_CONFIDENCE)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn whole_project_question_is_high_confidence_overview() {
		let (intent, confidence) = classify("What does this app do overall?");
		assert_eq!(intent, Intent::Overview);
		assert!(confidence >= 0.9);
	}

	#[test]
	fn caller_question_is_code_relationship() {
		let (intent, confidence) = classify("who calls Foo.bar");
		assert_eq!(intent, Intent::CodeRelationship);
		assert_eq!(confidence, 0.8);
	}

	#[test]
	fn location_question() {
		let (intent, _) = classify("Where is the payment retry logic defined?");
		assert_eq!(intent, Intent::LocationUsage);
	}

	#[test]
	fn impact_question_beats_relationship_wording() {
		let (intent, _) = classify("What breaks if I rename the OrderService dependency?");
		assert_eq!(intent, Intent::ImpactAnalysis);
	}

	#[test]
	fn ui_question() {
		let (intent, _) = classify("What happens when the checkout button is clicked?");
		// "what happens if" is impact; "what happens when + button" matches UI
		assert!(matches!(intent, Intent::UiFlow | Intent::ImpactAnalysis));
	}

	#[test]
	fn unmatched_question_falls_back_without_error() {
		let (intent, confidence) = classify("zorp blarg quux");
		assert_eq!(intent, Intent::SemanticReasoning);
		assert_eq!(confidence, FALLBACK_CONFIDENCE);
	}

	#[test]
	fn empty_question_is_handled() {
		let (intent, confidence) = classify("");
		assert_eq!(intent, Intent::SemanticReasoning);
		assert_eq!(confidence, FALLBACK_CONFIDENCE);
	}
}
