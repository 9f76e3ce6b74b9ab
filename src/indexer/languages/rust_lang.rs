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

use regex::Regex;

use super::{
	scan_call_sites, scan_signatures, scan_symbols, CallSite, InheritanceEdge, InheritanceKind,
	Language, SymbolDef, SymbolKind,
};

pub struct RustLang;

const KEYWORDS: &[&str] = &[
	"if", "for", "while", "match", "return", "Some", "None", "Ok", "Err", "Box", "Vec", "String",
	"println", "eprintln", "format", "vec", "assert", "assert_eq", "panic", "unwrap",
];

lazy_static::lazy_static! {
	static ref BOUNDARIES: Vec<Regex> = vec![
		Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(unsafe\s+)?fn\s+\w+").unwrap(),
		Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?struct\s+\w+").unwrap(),
		Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?enum\s+\w+").unwrap(),
		Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?trait\s+\w+").unwrap(),
		Regex::new(r"^\s*impl(\s*<[^>]*>)?\s+").unwrap(),
		Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?mod\s+\w+").unwrap(),
		Regex::new(r"^use\s+").unwrap(),
	];
	static ref STRUCT_RE: Regex = Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+(\w+)").unwrap();
	static ref ENUM_RE: Regex = Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+(\w+)").unwrap();
	static ref TRAIT_RE: Regex = Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+(\w+)").unwrap();
	static ref FN_RE: Regex = Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(\w+)").unwrap();
	static ref SIGNATURE_RE: Regex = Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+\w+").unwrap();
	static ref CALL_RE: Regex = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*(?:::<[^>]*>)?\(").unwrap();
	static ref IMPL_TRAIT_RE: Regex = Regex::new(r"impl(?:\s*<[^>]*>)?\s+([\w:]+)(?:<[^>]*>)?\s+for\s+([\w:]+)").unwrap();
	static ref TRAIT_BOUND_RE: Regex = Regex::new(r"trait\s+(\w+)\s*:\s*([^{\n]+)").unwrap();
	static ref USE_RE: Regex = Regex::new(r"^\s*use\s+([\w:]+)").unwrap();
}

impl Language for RustLang {
	fn name(&self) -> &'static str {
		"rust"
	}

	fn file_extensions(&self) -> &'static [&'static str] {
		&["rs"]
	}

	fn boundary_patterns(&self) -> &'static [Regex] {
		&BOUNDARIES
	}

	fn extract_symbols(&self, content: &str) -> Vec<SymbolDef> {
		scan_symbols(
			content,
			&[
				(&STRUCT_RE, SymbolKind::Class),
				(&ENUM_RE, SymbolKind::Class),
				(&TRAIT_RE, SymbolKind::Interface),
				(&FN_RE, SymbolKind::Function),
			],
		)
	}

	fn extract_signatures(&self, content: &str) -> Vec<String> {
		scan_signatures(content, &SIGNATURE_RE)
	}

	fn extract_call_sites(&self, content: &str) -> Vec<CallSite> {
		scan_call_sites(content, &CALL_RE, KEYWORDS)
	}

	fn extract_inheritance(&self, content: &str) -> Vec<InheritanceEdge> {
		let mut edges = Vec::new();
		// `impl Trait for Type` reads as Type implements Trait
		for captures in IMPL_TRAIT_RE.captures_iter(content) {
			edges.push(InheritanceEdge {
				subtype: captures[2].to_string(),
				supertype: captures[1].to_string(),
				kind: InheritanceKind::Implements,
			});
		}
		for captures in TRAIT_BOUND_RE.captures_iter(content) {
			let subtype = captures[1].to_string();
			for supertrait in captures[2].split('+') {
				let name = supertrait.trim().split('<').next().unwrap_or("").trim();
				if name.is_empty() || name == "Sized" {
					continue;
				}
				edges.push(InheritanceEdge {
					subtype: subtype.clone(),
					supertype: name.to_string(),
					kind: InheritanceKind::Extends,
				});
			}
		}
		edges
	}

	fn extract_imports(&self, content: &str) -> Vec<String> {
		content
			.lines()
			.filter_map(|line| USE_RE.captures(line).map(|c| c[1].to_string()))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
use std::collections::HashMap;

pub trait Storage: Send {
	fn put(&mut self, key: String, value: Vec<u8>);
}

pub struct MemoryStorage {
	entries: HashMap<String, Vec<u8>>,
}

impl Storage for MemoryStorage {
	fn put(&mut self, key: String, value: Vec<u8>) {
		self.entries.insert(key, value);
	}
}
"#;

	#[test]
	fn structs_traits_and_fns_are_symbols() {
		let symbols = RustLang.extract_symbols(SAMPLE);
		let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
		assert!(names.contains(&"Storage"));
		assert!(names.contains(&"MemoryStorage"));
		assert!(names.contains(&"put"));
	}

	#[test]
	fn impl_trait_for_type_yields_implements_edge() {
		let edges = RustLang.extract_inheritance(SAMPLE);
		assert!(edges.iter().any(|e| e.subtype == "MemoryStorage"
			&& e.supertype == "Storage"
			&& e.kind == InheritanceKind::Implements));
	}

	#[test]
	fn supertrait_bounds_yield_extends_edges() {
		let edges = RustLang.extract_inheritance(SAMPLE);
		assert!(edges.iter().any(|e| e.subtype == "Storage"
			&& e.supertype == "Send"
			&& e.kind == InheritanceKind::Extends));
	}
}
