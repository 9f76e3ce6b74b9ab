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

//! Per-fragment structural facts. Extraction is a pure function of the
//! fragment text: malformed input degrades to empty fields, never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::indexer::languages::{CallSite, InheritanceEdge, Language, SymbolKind};

/// Call sites kept per fragment; beyond this the list stops carrying signal.
const MAX_CALL_SITES: usize = 10;

/// Structural facts for one fragment, attached 1:1 and read-only after
/// extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FragmentMetadata {
	pub language: String,
	pub class_names: Vec<String>,
	pub function_names: Vec<String>,
	pub signatures: Vec<String>,
	pub call_sites: Vec<CallSite>,
	pub inheritance: Vec<InheritanceEdge>,
	pub imports: Vec<String>,
	pub design_patterns: Vec<String>,
	pub error_handling: Vec<String>,
	pub api_usage: Vec<String>,
	pub business_logic: Vec<String>,
	pub ui_elements: Vec<String>,
}

impl FragmentMetadata {
	/// A fragment without any of these anchors cannot be placed in the
	/// hierarchical index and is surfaced as a data-quality signal.
	pub fn has_semantic_anchors(&self) -> bool {
		!self.class_names.is_empty()
			|| !self.function_names.is_empty()
			|| !self.ui_elements.is_empty()
	}

	/// All declared symbol names, classes first.
	pub fn symbol_names(&self) -> impl Iterator<Item = &String> {
		self.class_names.iter().chain(self.function_names.iter())
	}
}

/// Extract structural metadata from fragment text using the language's
/// rules plus the language-agnostic tag tables below.
pub fn extract(content: &str, language: &dyn Language) -> FragmentMetadata {
	let symbols = language.extract_symbols(content);
	let mut class_names = Vec::new();
	let mut function_names = Vec::new();
	for symbol in symbols {
		match symbol.kind {
			SymbolKind::Class | SymbolKind::Interface | SymbolKind::Object => {
				class_names.push(symbol.name)
			}
			SymbolKind::Function => function_names.push(symbol.name),
		}
	}

	let mut call_sites = language.extract_call_sites(content);
	call_sites.truncate(MAX_CALL_SITES);

	FragmentMetadata {
		language: language.name().to_string(),
		class_names,
		function_names,
		signatures: language.extract_signatures(content),
		call_sites,
		inheritance: language.extract_inheritance(content),
		imports: language.extract_imports(content),
		design_patterns: matched_tags(content, &DESIGN_PATTERNS),
		error_handling: matched_tags(content, &ERROR_HANDLING),
		api_usage: matched_tags(content, &API_USAGE),
		business_logic: matched_tags(content, &BUSINESS_LOGIC),
		ui_elements: matched_tags(content, &UI_ELEMENTS),
	}
}

fn matched_tags(content: &str, table: &[(&'static str, &Regex)]) -> Vec<String> {
	table
		.iter()
		.filter(|(_, re)| re.is_match(content))
		.map(|(tag, _)| tag.to_string())
		.collect()
}

lazy_static::lazy_static! {
	static ref SINGLETON_RE: Regex =
		Regex::new(r"getInstance|get_instance|\b_instance\b|\bINSTANCE\b|private constructor").unwrap();
	static ref FACTORY_RE: Regex =
		Regex::new(r"\bcreate[A-Z_]\w*\s*\(|\w+Factory\b|\bfactory\b").unwrap();
	static ref OBSERVER_RE: Regex =
		Regex::new(r"addListener|addEventListener|\bsubscribe\b|\bnotify\w*\s*\(|\bObserver\b|\bemit\s*\(").unwrap();
	static ref BUILDER_RE: Regex =
		Regex::new(r"\w+Builder\b|\.build\s*\(\s*\)").unwrap();
	static ref ADAPTER_RE: Regex =
		Regex::new(r"\w+Adapter\b|\w+Wrapper\b|\bwrap\s*\(").unwrap();

	static ref DESIGN_PATTERNS: Vec<(&'static str, &'static Regex)> = vec![
		("singleton", &*SINGLETON_RE),
		("factory", &*FACTORY_RE),
		("observer", &*OBSERVER_RE),
		("builder", &*BUILDER_RE),
		("adapter", &*ADAPTER_RE),
	];

	static ref TRY_CATCH_RE: Regex =
		Regex::new(r"\btry\s*\{|\btry:|\bcatch\s*[({]|\bexcept\b").unwrap();
	static ref THROWING_RE: Regex =
		Regex::new(r"\bthrow\b|\braise\b|\bpanic!").unwrap();
	static ref FINALLY_RE: Regex =
		Regex::new(r"\bfinally\b").unwrap();
	static ref OPTIONAL_RE: Regex =
		Regex::new(r"\bOptional\b|\?\.|\bunwrap_or\b|is None\b|== null|!= null|=== null").unwrap();
	static ref RESILIENCE_RE: Regex =
		Regex::new(r"(?i)\bretry\b|\bbackoff\b|circuit.?breaker|\btimeout\b|\bfallback\b").unwrap();

	static ref ERROR_HANDLING: Vec<(&'static str, &'static Regex)> = vec![
		("try_catch", &*TRY_CATCH_RE),
		("exception_throwing", &*THROWING_RE),
		("finally_block", &*FINALLY_RE),
		("optional_handling", &*OPTIONAL_RE),
		("resilience_pattern", &*RESILIENCE_RE),
	];

	static ref HTTP_RE: Regex =
		Regex::new(r"(?i)httpclient|\bfetch\s*\(|axios|requests\.|reqwest|urlopen|okhttp").unwrap();
	static ref DATABASE_RE: Regex =
		Regex::new(r"(?i)\bselect\s+\w+.*\bfrom\b|insert\s+into|\bcursor\b|\brepository\b|\bdao\b|\bexecute(sql|query)\b|session\.query").unwrap();
	static ref REST_RE: Regex =
		Regex::new(r#"(?i)@(get|post|put|delete|request)mapping|@app\.route|app\.(get|post|put|delete)\s*\(|router\.|/api/"#).unwrap();

	static ref API_USAGE: Vec<(&'static str, &'static Regex)> = vec![
		("http_client", &*HTTP_RE),
		("database", &*DATABASE_RE),
		("rest_api", &*REST_RE),
	];

	static ref CALCULATION_RE: Regex =
		Regex::new(r"(?i)calculat|\bcomput|\btotal\b|\bsum\s*\(|\bprice\b|\bamount\b|\btax\b").unwrap();
	static ref VALIDATION_RE: Regex =
		Regex::new(r"(?i)\bvalidat|\bverify\b|\bsanitize\b|\bis_valid\b|\bisvalid\b").unwrap();
	static ref WORKFLOW_RE: Regex =
		Regex::new(r"(?i)\bworkflow\b|\bpipeline\b|state.?machine|\btransition\b|\borchestrat").unwrap();
	static ref AUTHORIZATION_RE: Regex =
		Regex::new(r"(?i)\bauthoriz|\bauthent|\bpermission\b|\brole\b|\bcredential|\baccess.?token\b").unwrap();

	static ref BUSINESS_LOGIC: Vec<(&'static str, &'static Regex)> = vec![
		("calculation", &*CALCULATION_RE),
		("validation_logic", &*VALIDATION_RE),
		("workflow", &*WORKFLOW_RE),
		("authorization", &*AUTHORIZATION_RE),
	];

	static ref BUTTON_RE: Regex =
		Regex::new(r"(?i)\bbutton\b|onclick|onpressed").unwrap();
	static ref DIALOG_RE: Regex =
		Regex::new(r"(?i)\bdialog\b|\bmodal\b|\balert\s*\(").unwrap();
	static ref SCREEN_RE: Regex =
		Regex::new(r"(?i)\bscreen\b|\bactivity\b|\bpage\b|\bnavigat").unwrap();
	static ref VIEW_RE: Regex =
		Regex::new(r"(?i)\brender\b|\bview\b|\blayout\b|\bwidget\b|\bcomponent\b").unwrap();
	static ref FORM_RE: Regex =
		Regex::new(r"(?i)\bform\b|\binput\b|\btextfield\b|\bedittext\b").unwrap();

	static ref UI_ELEMENTS: Vec<(&'static str, &'static Regex)> = vec![
		("button", &*BUTTON_RE),
		("dialog", &*DIALOG_RE),
		("screen", &*SCREEN_RE),
		("view", &*VIEW_RE),
		("form", &*FORM_RE),
	];
}
