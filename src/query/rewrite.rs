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

//! Question rewriting for embedding search. An LLM turns a natural
//! language question into bare search keywords; the output is sanitized
//! so a chatty model can never inject prose into the query. When the
//! LLM is unavailable the keywords are derived locally from the
//! question itself, which keeps code identifiers intact.

use crate::llm::LlmClient;
use crate::query::intent::Intent;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

/// Hard ceiling on rewritten keyword count.
pub const MAX_KEYWORDS: usize = 5;

const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "at", "be", "by", "can", "do", "does", "for", "from", "has", "have",
	"how", "i", "if", "in", "is", "it", "its", "me", "my", "of", "on", "or", "our", "should",
	"that", "the", "their", "them", "then", "there", "these", "this", "to", "was", "we", "what",
	"when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

lazy_static! {
	static ref QUOTED_RE: Regex = Regex::new(r#""([^"]+)"|'([^']+)'|`([^`]+)`"#).unwrap();
	static ref CODE_IDENT_RE: Regex =
		Regex::new(r"\b([a-z][a-z0-9]*[A-Z]\w*|[A-Z][a-z0-9]+[A-Z]\w*|\w+_\w+|\w+\.\w+\(?\)?)\b")
			.unwrap();
	static ref WORD_RE: Regex = Regex::new(r"[A-Za-z0-9_.]+").unwrap();
	// Filler a model prepends when it ignores the output format
	static ref PREAMBLE_RE: Regex =
		Regex::new(r"(?i)^(here (are|is)|keywords?|sure|the|output)[:,]?\s*").unwrap();
}

const REWRITE_SYSTEM_PROMPT: &str = "You convert questions about a codebase into search keywords. \
Respond with 3 to 5 bare keywords separated by single spaces. \
Keep code identifiers exactly as written. \
No punctuation, no numbering, no explanation, no quotes.";

pub struct QueryRewriter<'a> {
	llm: Option<&'a LlmClient>,
}

impl<'a> QueryRewriter<'a> {
	pub fn new(llm: Option<&'a LlmClient>) -> Self {
		Self { llm }
	}

	/// Rewrite a question into at most [`MAX_KEYWORDS`] search keywords.
	/// Never fails and never returns prose: a bad or missing LLM response
	/// degrades to keywords extracted from the question itself.
	pub async fn rewrite(&self, question: &str, intent: Intent) -> String {
		if let Some(llm) = self.llm {
			let user = format!("Question ({} search): {}", intent.as_str(), question);
			match llm.complete(REWRITE_SYSTEM_PROMPT, &user).await {
				Ok(raw) => {
					let cleaned = sanitize(&raw);
					if !cleaned.is_empty() {
						debug!(rewritten = %cleaned, "query rewritten");
						return cleaned;
					}
					warn!("rewriter returned no usable keywords, using local extraction");
				}
				Err(e) => {
					warn!("query rewrite failed, using local extraction: {e:#}");
				}
			}
		}
		let local = sanitize(question);
		if local.is_empty() {
			question.trim().to_string()
		} else {
			local
		}
	}
}

/// Reduce raw model output (or a raw question) to bare keywords:
/// strip preamble and punctuation, drop stop words, dedupe, cap at
/// [`MAX_KEYWORDS`] tokens.
pub fn sanitize(raw: &str) -> String {
	let first_line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
	let mut stripped = first_line.trim().to_string();
	loop {
		let next = PREAMBLE_RE.replace(&stripped, "").into_owned();
		if next == stripped {
			break;
		}
		stripped = next;
	}
	let mut keywords: Vec<String> = Vec::new();
	for m in WORD_RE.find_iter(&stripped) {
		let token = m.as_str().trim_matches('.');
		if token.is_empty() || STOP_WORDS.contains(&token.to_lowercase().as_str()) {
			continue;
		}
		if keywords.iter().any(|k| k.eq_ignore_ascii_case(token)) {
			continue;
		}
		keywords.push(token.to_string());
		if keywords.len() == MAX_KEYWORDS {
			break;
		}
	}
	keywords.join(" ")
}

/// Extract up to `max` key terms from a question for the last-resort
/// retrieval strategy. Quoted strings and code-shaped identifiers are
/// taken first, then remaining non-stop-word tokens.
pub fn extract_key_terms(question: &str, max: usize) -> Vec<String> {
	fn push(terms: &mut Vec<String>, term: &str) {
		let term = term.trim().trim_matches('.');
		if term.is_empty() || STOP_WORDS.contains(&term.to_lowercase().as_str()) {
			return;
		}
		if !terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
			terms.push(term.to_string());
		}
	}

	let mut terms: Vec<String> = Vec::new();
	for caps in QUOTED_RE.captures_iter(question) {
		for i in 1..=3 {
			if let Some(m) = caps.get(i) {
				push(&mut terms, m.as_str());
			}
		}
	}
	for m in CODE_IDENT_RE.find_iter(question) {
		push(&mut terms, m.as_str());
	}
	for m in WORD_RE.find_iter(question) {
		if terms.len() >= max {
			break;
		}
		push(&mut terms, m.as_str());
	}
	terms.truncate(max);
	terms
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sanitize_caps_tokens_and_strips_punctuation() {
		let out = sanitize("Why does MainActivity crash on rotation, and how do I fix it?");
		assert!(out.split_whitespace().count() <= MAX_KEYWORDS);
		assert!(!out.contains('?'));
		assert!(!out.contains(','));
		assert!(out.contains("MainActivity"));
		assert!(out.contains("rotation"));
	}

	#[test]
	fn sanitize_strips_model_preamble() {
		let out = sanitize("Here are the keywords: payment retry backoff");
		assert_eq!(out, "payment retry backoff");
	}

	#[test]
	fn sanitize_uses_only_first_nonempty_line() {
		let out = sanitize("\nuser session token\nThese keywords cover the question.");
		assert_eq!(out, "user session token");
	}

	#[test]
	fn sanitize_deduplicates() {
		let out = sanitize("cache cache Cache eviction");
		assert_eq!(out, "cache eviction");
	}

	#[test]
	fn key_terms_prefer_quoted_and_code_identifiers() {
		let terms =
			extract_key_terms("Where does 'session timeout' get set by AuthManager.refresh()?", 6);
		assert_eq!(terms[0], "session timeout");
		assert!(terms.iter().any(|t| t.contains("AuthManager")));
	}

	#[test]
	fn key_terms_respect_cap() {
		let terms = extract_key_terms(
			"alpha beta gamma delta epsilon zeta eta theta iota kappa",
			6,
		);
		assert_eq!(terms.len(), 6);
	}

	#[test]
	fn key_terms_skip_stop_words() {
		let terms = extract_key_terms("where is the config loaded", 6);
		assert!(!terms.iter().any(|t| t == "the" || t == "is" || t == "where"));
		assert!(terms.iter().any(|t| t == "config"));
	}

	#[tokio::test]
	async fn rewrite_without_llm_extracts_locally() {
		let rewriter = QueryRewriter::new(None);
		let out = rewriter
			.rewrite("Why does MainActivity crash on rotation?", Intent::SemanticReasoning)
			.await;
		assert!(out.contains("MainActivity"));
		assert!(out.contains("rotation"));
		assert!(out.split_whitespace().count() <= MAX_KEYWORDS);
		assert!(!out.ends_with('?'));
	}
}
