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

//! Covers JavaScript, TypeScript and JSX/TSX — the declaration grammar the
//! patterns target is shared across the family.

use regex::Regex;

use super::{
	scan_call_sites, scan_signatures, scan_symbols, CallSite, InheritanceEdge, InheritanceKind,
	Language, SymbolDef, SymbolKind,
};

pub struct JavaScript;

const KEYWORDS: &[&str] = &[
	"if", "for", "while", "switch", "catch", "return", "function", "typeof", "new", "await",
	"require", "console", "super", "constructor", "Promise", "Array", "Object", "String", "Number",
];

lazy_static::lazy_static! {
	static ref BOUNDARIES: Vec<Regex> = vec![
		Regex::new(r"^(export\s+)?(default\s+)?(async\s+)?function\s*\*?\s*\w*").unwrap(),
		Regex::new(r"^(export\s+)?(abstract\s+)?class\s+\w+").unwrap(),
		Regex::new(r"^(export\s+)?interface\s+\w+").unwrap(),
		Regex::new(r"^(export\s+)?(const|let|var)\s+\w+\s*=\s*(async\s*)?(\(|function)").unwrap(),
		Regex::new(r"^import\s+").unwrap(),
	];
	static ref CLASS_RE: Regex = Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(\w+)").unwrap();
	static ref INTERFACE_RE: Regex = Regex::new(r"^\s*(?:export\s+)?interface\s+(\w+)").unwrap();
	static ref FUNCTION_RE: Regex = Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)").unwrap();
	static ref ARROW_RE: Regex = Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s*)?(?:\([^)]*\)|\w+)\s*=>").unwrap();
	static ref SIGNATURE_RE: Regex = Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*\w+\s*\(").unwrap();
	static ref CALL_RE: Regex = Regex::new(r"\b([A-Za-z_$][A-Za-z0-9_$]*)\s*\(").unwrap();
	static ref EXTENDS_RE: Regex = Regex::new(r"class\s+(\w+)\s+extends\s+([\w.]+)").unwrap();
	static ref IMPLEMENTS_RE: Regex = Regex::new(r"class\s+(\w+)(?:\s+extends\s+[\w.]+)?\s+implements\s+([\w,\s]+)").unwrap();
	static ref IMPORT_RE: Regex = Regex::new(r#"^\s*import\s+.*?from\s+['"]([^'"]+)['"]"#).unwrap();
	static ref REQUIRE_RE: Regex = Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap();
}

impl Language for JavaScript {
	fn name(&self) -> &'static str {
		"javascript"
	}

	fn file_extensions(&self) -> &'static [&'static str] {
		&["js", "jsx", "ts", "tsx", "mjs", "cjs"]
	}

	fn boundary_patterns(&self) -> &'static [Regex] {
		&BOUNDARIES
	}

	fn extract_symbols(&self, content: &str) -> Vec<SymbolDef> {
		scan_symbols(
			content,
			&[
				(&CLASS_RE, SymbolKind::Class),
				(&INTERFACE_RE, SymbolKind::Interface),
				(&FUNCTION_RE, SymbolKind::Function),
				(&ARROW_RE, SymbolKind::Function),
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
		for captures in EXTENDS_RE.captures_iter(content) {
			edges.push(InheritanceEdge {
				subtype: captures[1].to_string(),
				supertype: captures[2].to_string(),
				kind: InheritanceKind::Extends,
			});
		}
		for captures in IMPLEMENTS_RE.captures_iter(content) {
			let subtype = captures[1].to_string();
			for iface in captures[2].split(',') {
				let iface = iface.trim();
				if iface.is_empty() {
					continue;
				}
				edges.push(InheritanceEdge {
					subtype: subtype.clone(),
					supertype: iface.to_string(),
					kind: InheritanceKind::Implements,
				});
			}
		}
		edges
	}

	fn extract_imports(&self, content: &str) -> Vec<String> {
		let mut imports: Vec<String> = content
			.lines()
			.filter_map(|line| IMPORT_RE.captures(line).map(|c| c[1].to_string()))
			.collect();
		imports.extend(
			REQUIRE_RE
				.captures_iter(content)
				.map(|c| c[1].to_string()),
		);
		imports
	}
}
