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

pub struct Java;

const KEYWORDS: &[&str] = &[
	"if", "for", "while", "switch", "catch", "return", "new", "super", "this", "assert", "throw",
	"synchronized", "System", "String", "Integer", "Long", "Boolean", "Optional", "List", "Map",
];

lazy_static::lazy_static! {
	static ref BOUNDARIES: Vec<Regex> = vec![
		Regex::new(r"^\s*(public|protected|private)?\s*(static\s+)?(final\s+)?(abstract\s+)?class\s+\w+").unwrap(),
		Regex::new(r"^\s*(public|protected|private)?\s*interface\s+\w+").unwrap(),
		Regex::new(r"^\s*(public|protected|private)\s+[\w<>\[\],\s]+\s+\w+\s*\(").unwrap(),
		Regex::new(r"^import\s+").unwrap(),
		Regex::new(r"^\s*@\w+").unwrap(),
	];
	static ref CLASS_RE: Regex = Regex::new(r"^\s*(?:public\s+|protected\s+|private\s+)?(?:static\s+)?(?:final\s+)?(?:abstract\s+)?class\s+(\w+)").unwrap();
	static ref INTERFACE_RE: Regex = Regex::new(r"^\s*(?:public\s+|protected\s+|private\s+)?interface\s+(\w+)").unwrap();
	static ref METHOD_RE: Regex = Regex::new(r"^\s*(?:public|protected|private)\s+(?:static\s+)?(?:final\s+)?[\w<>\[\],\s]+\s+(\w+)\s*\(").unwrap();
	static ref SIGNATURE_RE: Regex = Regex::new(r"^\s*(?:public|protected|private)\s+(?:static\s+)?(?:final\s+)?[\w<>\[\],\s]+\s+\w+\s*\(").unwrap();
	static ref CALL_RE: Regex = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap();
	static ref EXTENDS_RE: Regex = Regex::new(r"(?:class|interface)\s+(\w+)(?:<[^>]*>)?\s+extends\s+([\w.]+)").unwrap();
	static ref IMPLEMENTS_RE: Regex = Regex::new(r"class\s+(\w+)(?:<[^>]*>)?(?:\s+extends\s+[\w.<>]+)?\s+implements\s+([\w,.\s]+?)\s*\{").unwrap();
	static ref IMPORT_RE: Regex = Regex::new(r"^\s*import\s+(?:static\s+)?([\w.]+)\s*;").unwrap();
}

impl Language for Java {
	fn name(&self) -> &'static str {
		"java"
	}

	fn file_extensions(&self) -> &'static [&'static str] {
		&["java"]
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
				(&METHOD_RE, SymbolKind::Function),
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
				// Drop generic parameters on the interface name
				let iface = iface.trim().split('<').next().unwrap_or("").trim();
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
		content
			.lines()
			.filter_map(|line| IMPORT_RE.captures(line).map(|c| c[1].to_string()))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
import java.util.List;
import com.example.audit.Auditable;

public class InvoiceService extends AbstractService implements Auditable, Closeable {
    private final Repository repo;

    public Invoice createInvoice(Order order) {
        validate(order);
        return repo.save(Invoice.from(order));
    }
}
"#;

	#[test]
	fn class_and_method_symbols() {
		let symbols = Java.extract_symbols(SAMPLE);
		let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
		assert!(names.contains(&"InvoiceService"));
		assert!(names.contains(&"createInvoice"));
	}

	#[test]
	fn inheritance_covers_extends_and_implements_list() {
		let edges = Java.extract_inheritance(SAMPLE);
		assert!(edges.iter().any(|e| e.supertype == "AbstractService"
			&& e.kind == InheritanceKind::Extends));
		assert!(edges.iter().any(|e| e.supertype == "Auditable"
			&& e.kind == InheritanceKind::Implements));
		assert!(edges.iter().any(|e| e.supertype == "Closeable"
			&& e.kind == InheritanceKind::Implements));
	}

	#[test]
	fn imports_strip_trailing_semicolon() {
		let imports = Java.extract_imports(SAMPLE);
		assert!(imports.contains(&"java.util.List".to_string()));
		assert!(imports.contains(&"com.example.audit.Auditable".to_string()));
	}
}
