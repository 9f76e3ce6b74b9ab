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

pub struct Kotlin;

const KEYWORDS: &[&str] = &[
	"if", "for", "while", "when", "catch", "return", "listOf", "mapOf", "setOf", "mutableListOf",
	"println", "require", "check", "let", "run", "apply", "also", "with", "lazy", "super",
];

lazy_static::lazy_static! {
	static ref BOUNDARIES: Vec<Regex> = vec![
		Regex::new(r"^\s*(private\s+|internal\s+|public\s+)?(abstract\s+|open\s+|data\s+|sealed\s+)*class\s+\w+").unwrap(),
		Regex::new(r"^\s*(private\s+|internal\s+|public\s+)?interface\s+\w+").unwrap(),
		Regex::new(r"^\s*(private\s+|internal\s+|public\s+)?object\s+\w+").unwrap(),
		Regex::new(r"^\s*(private\s+|internal\s+|public\s+)?(suspend\s+)?fun\s+").unwrap(),
		Regex::new(r"^import\s+").unwrap(),
		Regex::new(r"^\s*@\w+").unwrap(),
	];
	static ref CLASS_RE: Regex = Regex::new(r"^\s*(?:private\s+|internal\s+|public\s+)?(?:abstract\s+|open\s+|data\s+|sealed\s+)*class\s+(\w+)").unwrap();
	static ref INTERFACE_RE: Regex = Regex::new(r"^\s*(?:private\s+|internal\s+|public\s+)?interface\s+(\w+)").unwrap();
	static ref OBJECT_RE: Regex = Regex::new(r"^\s*(?:private\s+|internal\s+|public\s+)?object\s+(\w+)").unwrap();
	static ref FUN_RE: Regex = Regex::new(r"^\s*(?:private\s+|internal\s+|public\s+)?(?:suspend\s+)?fun\s+(?:<[^>]*>\s+)?(?:[\w.]+\.)?(\w+)\s*\(").unwrap();
	static ref SIGNATURE_RE: Regex = Regex::new(r"^\s*(?:private\s+|internal\s+|public\s+)?(?:suspend\s+)?fun\s+").unwrap();
	static ref CALL_RE: Regex = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*[({]").unwrap();
	static ref SUPERTYPES_RE: Regex = Regex::new(r"(?:class|object)\s+(\w+)(?:<[^>]*>)?(?:\s*\([^)]*\))?\s*:\s*([^{\n]+)").unwrap();
	static ref IMPORT_RE: Regex = Regex::new(r"^\s*import\s+([\w.]+)").unwrap();
}

impl Language for Kotlin {
	fn name(&self) -> &'static str {
		"kotlin"
	}

	fn file_extensions(&self) -> &'static [&'static str] {
		&["kt", "kts"]
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
				(&OBJECT_RE, SymbolKind::Object),
				(&FUN_RE, SymbolKind::Function),
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
		for captures in SUPERTYPES_RE.captures_iter(content) {
			let subtype = captures[1].to_string();
			for supertype in captures[2].split(',') {
				// "Base(args)" marks the superclass; bare names are interfaces
				let raw = supertype.trim();
				if raw.is_empty() {
					continue;
				}
				let is_constructor_call = raw.contains('(');
				let name = raw
					.split('(')
					.next()
					.unwrap_or("")
					.split('<')
					.next()
					.unwrap_or("")
					.trim();
				if name.is_empty() || name.chars().next().is_some_and(|c| c.is_lowercase()) {
					continue;
				}
				edges.push(InheritanceEdge {
					subtype: subtype.clone(),
					supertype: name.to_string(),
					kind: if is_constructor_call {
						InheritanceKind::Extends
					} else {
						InheritanceKind::Implements
					},
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
import androidx.lifecycle.ViewModel
import com.example.audit.Auditable

class CheckoutViewModel(private val repo: CartRepository) : ViewModel(), Auditable {
    fun placeOrder(cart: Cart) {
        validateCart(cart)
        repo.submit(cart.toOrder())
    }
}

object RetryPolicy {
    fun backoff(attempt: Int): Long = 100L shl attempt
}
"#;

	#[test]
	fn symbols_cover_class_object_and_functions() {
		let symbols = Kotlin.extract_symbols(SAMPLE);
		let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
		assert!(names.contains(&"CheckoutViewModel"));
		assert!(names.contains(&"RetryPolicy"));
		assert!(names.contains(&"placeOrder"));
		assert!(names.contains(&"backoff"));
	}

	#[test]
	fn constructor_call_means_superclass_bare_name_means_interface() {
		let edges = Kotlin.extract_inheritance(SAMPLE);
		assert!(edges.iter().any(|e| e.subtype == "CheckoutViewModel"
			&& e.supertype == "ViewModel"
			&& e.kind == InheritanceKind::Extends));
		assert!(edges.iter().any(|e| e.subtype == "CheckoutViewModel"
			&& e.supertype == "Auditable"
			&& e.kind == InheritanceKind::Implements));
	}

	#[test]
	fn lowercase_supertype_tokens_are_ignored() {
		// A constructor parameter list before the colon must not leak
		// property types into the supertype list
		let edges = Kotlin.extract_inheritance("class A : by lazy {\n");
		assert!(edges.is_empty());
	}
}
