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

//! Boundary-aware chunking: files split into fragments at language
//! boundaries, undersized fragments merge into their predecessor, adjacent
//! fragments share a small overlap window for retrieval continuity.

use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::indexer::languages::Language;

/// One semantically coherent slice of a source file. The retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
	pub path: String,
	pub content: String,
	/// 0-based inclusive line span within the source file
	pub start_line: usize,
	pub end_line: usize,
	/// Deterministic position of this fragment within its file
	pub ordinal: usize,
	/// Content hash, assigned after chunking; empty until then
	#[serde(default)]
	pub fingerprint: String,
	/// Heuristic 0..1 measure of how much declared structure the slice holds
	pub semantic_score: f32,
	/// Tail of the previous sibling, carried for continuity (not hashed)
	#[serde(default)]
	pub leading_context: String,
	/// Head of the next sibling, carried for continuity (not hashed)
	#[serde(default)]
	pub trailing_context: String,
}

impl Fragment {
	/// Text sent to the embedding provider: overlap windows included so
	/// adjacent matches surface each other.
	pub fn embedding_text(&self) -> String {
		let mut text = String::new();
		if !self.leading_context.is_empty() {
			text.push_str(&self.leading_context);
			text.push('\n');
		}
		text.push_str(&self.content);
		if !self.trailing_context.is_empty() {
			text.push('\n');
			text.push_str(&self.trailing_context);
		}
		text
	}
}

/// Split file content into fragments at the language's semantic boundaries.
/// Deterministic: the same content and rules always produce the same
/// fragment sequence and ordinals.
pub fn chunk(path: &str, content: &str, language: &dyn Language, config: &IndexConfig) -> Vec<Fragment> {
	let lines: Vec<&str> = content.lines().collect();
	if lines.is_empty() {
		return Vec::new();
	}

	// Pass 1: cut at boundary lines, force-cut at the size ceiling
	let mut spans: Vec<(usize, usize)> = Vec::new();
	let mut start = 0usize;
	let mut current_len = 0usize;
	for (i, line) in lines.iter().enumerate() {
		let at_boundary = i > start
			&& language
				.boundary_patterns()
				.iter()
				.any(|re| re.is_match(line));
		let over_budget = current_len + line.len() > config.chunk_max_chars && i > start;
		if at_boundary || over_budget {
			spans.push((start, i - 1));
			start = i;
			current_len = 0;
		}
		current_len += line.len() + 1;
	}
	spans.push((start, lines.len() - 1));

	// Pass 2: merge undersized spans into their predecessor
	let mut merged: Vec<(usize, usize)> = Vec::new();
	for (span_start, span_end) in spans {
		let text_len: usize = lines[span_start..=span_end]
			.iter()
			.map(|l| l.len() + 1)
			.sum();
		match merged.last_mut() {
			Some(prev) if text_len < config.chunk_min_chars => {
				prev.1 = span_end;
			}
			_ => merged.push((span_start, span_end)),
		}
	}

	// Drop a leading span that stayed under the minimum with nothing to
	// merge into, unless it is the only span
	if merged.len() > 1 {
		let (s, e) = merged[0];
		let first_len: usize = lines[s..=e].iter().map(|l| l.len() + 1).sum();
		if first_len < config.chunk_min_chars {
			let second = merged[1];
			merged[1] = (s, second.1);
			merged.remove(0);
		}
	}

	// Pass 3: materialize with overlap windows
	let mut fragments: Vec<Fragment> = Vec::new();
	for (idx, &(span_start, span_end)) in merged.iter().enumerate() {
		let text = lines[span_start..=span_end].join("\n");
		if text.trim().is_empty() {
			continue;
		}
		let leading_context = if idx > 0 {
			let (prev_start, prev_end) = merged[idx - 1];
			tail_chars(&lines[prev_start..=prev_end].join("\n"), config.chunk_overlap_chars)
		} else {
			String::new()
		};
		let trailing_context = if idx + 1 < merged.len() {
			let (next_start, next_end) = merged[idx + 1];
			head_chars(&lines[next_start..=next_end].join("\n"), config.chunk_overlap_chars)
		} else {
			String::new()
		};
		let semantic_score = semantic_score(&text, language);
		fragments.push(Fragment {
			path: path.to_string(),
			content: text,
			start_line: span_start,
			end_line: span_end,
			ordinal: fragments.len(),
			fingerprint: String::new(),
			semantic_score,
			leading_context,
			trailing_context,
		});
	}
	fragments
}

/// Fraction of lines carrying declared structure, floored when any symbol
/// is present at all.
fn semantic_score(text: &str, language: &dyn Language) -> f32 {
	let line_count = text.lines().count().max(1);
	let boundary_lines = text
		.lines()
		.filter(|line| {
			language
				.boundary_patterns()
				.iter()
				.any(|re| re.is_match(line))
		})
		.count();
	let symbol_count = language.extract_symbols(text).len();
	let ratio = boundary_lines as f32 / line_count as f32;
	let base = if symbol_count > 0 { 0.4 } else { 0.0 };
	(base + ratio).min(1.0)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
	while index > 0 && !text.is_char_boundary(index) {
		index -= 1;
	}
	index
}

fn tail_chars(text: &str, max: usize) -> String {
	if text.len() <= max {
		return text.to_string();
	}
	let start = floor_char_boundary(text, text.len() - max);
	// Snap to a line start so the window never opens mid-line
	match text[start..].find('\n') {
		Some(offset) => text[start + offset + 1..].to_string(),
		None => text[start..].to_string(),
	}
}

fn head_chars(text: &str, max: usize) -> String {
	if text.len() <= max {
		return text.to_string();
	}
	let cut = floor_char_boundary(text, max);
	match text[..cut].rfind('\n') {
		Some(offset) => text[..offset].to_string(),
		None => text[..cut].to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::indexer::languages::get_language_or_generic;

	fn test_config() -> IndexConfig {
		IndexConfig {
			chunk_max_chars: 400,
			chunk_min_chars: 40,
			chunk_overlap_chars: 60,
			..IndexConfig::default()
		}
	}

	const PY_SOURCE: &str = r#"import os
import sys

class Alpha:
    def one(self):
        return 1

    def two(self):
        return 2

def standalone():
    helper_value = os.getenv("X")
    return helper_value

def another():
    platform_name = sys.platform
    return platform_name.upper()
"#;

	#[test]
	fn splits_at_class_and_function_boundaries() {
		let lang = get_language_or_generic("py");
		let fragments = chunk("a.py", PY_SOURCE, lang, &test_config());
		assert!(fragments.len() >= 3);
		assert!(fragments.iter().any(|f| f.content.contains("class Alpha")));
		assert!(fragments
			.iter()
			.any(|f| f.content.contains("def standalone")));
		assert!(fragments
			.iter()
			.any(|f| f.content.starts_with("def another")));
	}

	#[test]
	fn ordinals_are_dense_and_deterministic() {
		let lang = get_language_or_generic("py");
		let first = chunk("a.py", PY_SOURCE, lang, &test_config());
		let second = chunk("a.py", PY_SOURCE, lang, &test_config());
		for (i, fragment) in first.iter().enumerate() {
			assert_eq!(fragment.ordinal, i);
		}
		let lhs: Vec<&str> = first.iter().map(|f| f.content.as_str()).collect();
		let rhs: Vec<&str> = second.iter().map(|f| f.content.as_str()).collect();
		assert_eq!(lhs, rhs);
	}

	#[test]
	fn undersized_fragments_merge_into_predecessor() {
		let lang = get_language_or_generic("py");
		let config = IndexConfig {
			chunk_min_chars: 200,
			..test_config()
		};
		let fragments = chunk("a.py", PY_SOURCE, lang, &config);
		for fragment in &fragments[..fragments.len().saturating_sub(1)] {
			assert!(fragment.content.len() >= 100 || fragments.len() == 1);
		}
	}

	#[test]
	fn oversized_blocks_are_force_split() {
		let lang = get_language_or_generic("py");
		let big_body: String = (0..200)
			.map(|i| format!("    value_{i} = compute({i})\n"))
			.collect();
		let source = format!("def big():\n{}", big_body);
		let config = test_config();
		let fragments = chunk("big.py", &source, lang, &config);
		assert!(fragments.len() > 1);
		for fragment in &fragments {
			assert!(fragment.content.len() <= config.chunk_max_chars + 80);
		}
	}

	#[test]
	fn overlap_windows_connect_neighbors() {
		let lang = get_language_or_generic("py");
		let fragments = chunk("a.py", PY_SOURCE, lang, &test_config());
		if fragments.len() >= 2 {
			assert!(fragments[0].leading_context.is_empty());
			assert!(!fragments[1].leading_context.is_empty());
			assert!(fragments[0]
				.content
				.contains(fragments[1].leading_context.lines().next().unwrap_or("")));
		}
	}

	#[test]
	fn overlap_windows_respect_char_boundaries() {
		let lang = get_language_or_generic("py");
		let accented = "é".repeat(80);
		let source = format!(
			"def first():\n    a = \"{accented}\"\n\ndef second():\n    b = \"{accented}\"\n"
		);
		let config = IndexConfig {
			chunk_overlap_chars: 61,
			..test_config()
		};
		let fragments = chunk("u.py", &source, lang, &config);
		assert!(fragments.len() >= 2);
		assert!(fragments[0].trailing_context.contains("def second"));
	}

	#[test]
	fn empty_file_yields_no_fragments() {
		let lang = get_language_or_generic("py");
		assert!(chunk("e.py", "", lang, &test_config()).is_empty());
	}

	#[test]
	fn semantic_score_higher_for_declarations() {
		let lang = get_language_or_generic("py");
		let declared = semantic_score("def foo():\n    pass", lang);
		let plain = semantic_score("x = 1\ny = 2\nz = 3", lang);
		assert!(declared > plain);
	}
}
