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

//! Language-specific structural rules: where semantic boundaries fall and
//! how symbols, signatures, call sites and inheritance edges are recognized.
//! Pattern based and partial-tolerant: malformed source yields fewer facts,
//! never an error.

pub mod java;
pub mod javascript;
pub mod kotlin;
pub mod python;
pub mod rust_lang;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
	Class,
	Interface,
	Function,
	Object,
}

impl SymbolKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			SymbolKind::Class => "class",
			SymbolKind::Interface => "interface",
			SymbolKind::Function => "function",
			SymbolKind::Object => "object",
		}
	}
}

/// A named declaration found in a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDef {
	pub name: String,
	pub kind: SymbolKind,
	/// 0-based line offset within the scanned text
	pub line: usize,
}

/// A call expression: the callee name and where it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
	pub callee: String,
	pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceKind {
	Extends,
	Implements,
}

/// A subtype -> supertype declaration edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceEdge {
	pub subtype: String,
	pub supertype: String,
	pub kind: InheritanceKind,
}

/// Structural rules for one language family.
pub trait Language: Send + Sync {
	fn name(&self) -> &'static str;
	fn file_extensions(&self) -> &'static [&'static str];

	/// Patterns whose match starts a new semantic unit (function, class,
	/// import block). The chunker splits immediately before these.
	fn boundary_patterns(&self) -> &'static [Regex];

	/// Named declarations (classes, functions) in the text.
	fn extract_symbols(&self, content: &str) -> Vec<SymbolDef>;

	/// Full declaration lines usable as method signatures.
	fn extract_signatures(&self, content: &str) -> Vec<String>;

	/// Call expressions, language keywords filtered out.
	fn extract_call_sites(&self, content: &str) -> Vec<CallSite>;

	/// Inheritance and interface-implementation edges.
	fn extract_inheritance(&self, content: &str) -> Vec<InheritanceEdge>;

	/// Imported module/type names.
	fn extract_imports(&self, content: &str) -> Vec<String>;
}

static JAVA: java::Java = java::Java;
static JAVASCRIPT: javascript::JavaScript = javascript::JavaScript;
static KOTLIN: kotlin::Kotlin = kotlin::Kotlin;
static PYTHON: python::Python = python::Python;
static RUST: rust_lang::RustLang = rust_lang::RustLang;
static GENERIC: Generic = Generic;

/// Resolve the language implementation for a file extension.
pub fn get_language(extension: &str) -> Option<&'static dyn Language> {
	let all: [&'static dyn Language; 5] = [&PYTHON, &JAVASCRIPT, &JAVA, &KOTLIN, &RUST];
	all.into_iter()
		.find(|lang| lang.file_extensions().contains(&extension))
}

/// Resolve a language, falling back to generic line-oriented rules so
/// unknown files still chunk and index.
pub fn get_language_or_generic(extension: &str) -> &'static dyn Language {
	get_language(extension).unwrap_or(&GENERIC)
}

/// Fallback rules for files outside the supported families: top-level
/// line boundaries only, no structural extraction.
pub struct Generic;

lazy_static::lazy_static! {
	static ref GENERIC_BOUNDARIES: Vec<Regex> = vec![
		Regex::new(r"^\S").unwrap(),
	];
}

impl Language for Generic {
	fn name(&self) -> &'static str {
		"generic"
	}

	fn file_extensions(&self) -> &'static [&'static str] {
		&[]
	}

	fn boundary_patterns(&self) -> &'static [Regex] {
		&GENERIC_BOUNDARIES
	}

	fn extract_symbols(&self, _content: &str) -> Vec<SymbolDef> {
		Vec::new()
	}

	fn extract_signatures(&self, _content: &str) -> Vec<String> {
		Vec::new()
	}

	fn extract_call_sites(&self, _content: &str) -> Vec<CallSite> {
		Vec::new()
	}

	fn extract_inheritance(&self, _content: &str) -> Vec<InheritanceEdge> {
		Vec::new()
	}

	fn extract_imports(&self, _content: &str) -> Vec<String> {
		Vec::new()
	}
}

/// Shared call-site scanner: every `name(` occurrence whose name is not a
/// language keyword. Line numbers are 0-based offsets into the text.
pub(crate) fn scan_call_sites(content: &str, call_re: &Regex, keywords: &[&str]) -> Vec<CallSite> {
	let mut sites = Vec::new();
	for (line_no, line) in content.lines().enumerate() {
		for captures in call_re.captures_iter(line) {
			if let Some(name) = captures.get(1) {
				let callee = name.as_str();
				if keywords.contains(&callee) {
					continue;
				}
				sites.push(CallSite {
					callee: callee.to_string(),
					line: line_no,
				});
			}
		}
	}
	sites
}

/// Shared symbol scanner over (pattern, kind) pairs, deduplicated by name
/// keeping the first occurrence.
pub(crate) fn scan_symbols(content: &str, patterns: &[(&Regex, SymbolKind)]) -> Vec<SymbolDef> {
	let mut symbols: Vec<SymbolDef> = Vec::new();
	for (line_no, line) in content.lines().enumerate() {
		for (re, kind) in patterns {
			if let Some(captures) = re.captures(line) {
				if let Some(name) = captures.get(1) {
					symbols.push(SymbolDef {
						name: name.as_str().to_string(),
						kind: *kind,
						line: line_no,
					});
				}
			}
		}
	}
	deduplicate_symbols(symbols)
}

/// Keep the first definition per symbol name, preserving order.
pub(crate) fn deduplicate_symbols(symbols: Vec<SymbolDef>) -> Vec<SymbolDef> {
	let mut seen = std::collections::HashSet::new();
	symbols
		.into_iter()
		.filter(|s| seen.insert(s.name.clone()))
		.collect()
}

/// Collect trimmed lines matching a signature pattern.
pub(crate) fn scan_signatures(content: &str, re: &Regex) -> Vec<String> {
	content
		.lines()
		.filter(|line| re.is_match(line))
		.map(|line| line.trim().to_string())
		.collect()
}
