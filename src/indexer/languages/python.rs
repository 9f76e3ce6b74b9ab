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

pub struct Python;

const KEYWORDS: &[&str] = &[
	"if", "elif", "while", "for", "with", "return", "print", "len", "range", "isinstance", "super",
	"str", "int", "float", "list", "dict", "set", "tuple", "type", "assert", "lambda", "yield",
];

lazy_static::lazy_static! {
	static ref BOUNDARIES: Vec<Regex> = vec![
		Regex::new(r"^(async\s+)?def\s+\w+").unwrap(),
		Regex::new(r"^class\s+\w+").unwrap(),
		Regex::new(r"^(from\s+\S+\s+)?import\s+").unwrap(),
		Regex::new(r"^@\w+").unwrap(),
	];
	static ref CLASS_RE: Regex = Regex::new(r"^\s*class\s+(\w+)").unwrap();
	static ref DEF_RE: Regex = Regex::new(r"^\s*(?:async\s+)?def\s+(\w+)").unwrap();
	static ref SIGNATURE_RE: Regex = Regex::new(r"^\s*(?:async\s+)?def\s+\w+\s*\(").unwrap();
	static ref CALL_RE: Regex = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap();
	static ref BASES_RE: Regex = Regex::new(r"(?m)^\s*class\s+(\w+)\s*\(([^)]*)\)").unwrap();
	static ref IMPORT_RE: Regex = Regex::new(r"^\s*(?:from\s+([\w.]+)\s+import|import\s+([\w.]+))").unwrap();
}

impl Language for Python {
	fn name(&self) -> &'static str {
		"python"
	}

	fn file_extensions(&self) -> &'static [&'static str] {
		&["py", "pyi"]
	}

	fn boundary_patterns(&self) -> &'static [Regex] {
		&BOUNDARIES
	}

	fn extract_symbols(&self, content: &str) -> Vec<SymbolDef> {
		scan_symbols(
			content,
			&[
				(&CLASS_RE, SymbolKind::Class),
				(&DEF_RE, SymbolKind::Function),
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
		for captures in BASES_RE.captures_iter(content) {
			let subtype = captures[1].to_string();
			for base in captures[2].split(',') {
				// Strip metaclass kwargs and generics
				let base = base.trim().split('[').next().unwrap_or("").trim();
				if base.is_empty() || base.contains('=') || base == "object" {
					continue;
				}
				edges.push(InheritanceEdge {
					subtype: subtype.clone(),
					supertype: base.to_string(),
					kind: InheritanceKind::Extends,
				});
			}
		}
		edges
	}

	fn extract_imports(&self, content: &str) -> Vec<String> {
		content
			.lines()
			.filter_map(|line| {
				IMPORT_RE.captures(line).and_then(|c| {
					c.get(1)
						.or_else(|| c.get(2))
						.map(|m| m.as_str().to_string())
				})
			})
			.collect()
	}
}
