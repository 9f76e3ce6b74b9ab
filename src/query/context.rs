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

//! Context assembly. Retrieved fragments are enriched with layers walked
//! out of the cross-reference graph and the hierarchical index, ranked by
//! relevance for the question's intent, and concatenated under a hard
//! character budget. When the budget is exceeded the lowest-ranked layer
//! loses content first.

use crate::config::ContextConfig;
use crate::graph::hierarchy::HierarchicalIndex;
use crate::graph::CrossReferenceGraph;
use crate::query::intent::Intent;
use crate::query::retrieve::RetrievalResult;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::debug;

const BASE_HIERARCHICAL: f32 = 1.0;
const BASE_IMPACT: f32 = 0.95;
const BASE_CALL_FLOW: f32 = 0.9;
const BASE_INHERITANCE: f32 = 0.85;
const BASE_PROJECT_STRUCTURE: f32 = 0.8;
// Weight applied to the layer an intent is primarily about; small enough
// that retrieved code always outranks derived layers
const PRIMARY_WEIGHT: f32 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
	Hierarchical,
	ProjectStructure,
	CallFlow,
	Inheritance,
	Impact,
}

impl LayerKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			LayerKind::Hierarchical => "code",
			LayerKind::ProjectStructure => "project structure",
			LayerKind::CallFlow => "call flow",
			LayerKind::Inheritance => "type hierarchy",
			LayerKind::Impact => "impact surface",
		}
	}

	fn base_relevance(&self) -> f32 {
		match self {
			LayerKind::Hierarchical => BASE_HIERARCHICAL,
			LayerKind::Impact => BASE_IMPACT,
			LayerKind::CallFlow => BASE_CALL_FLOW,
			LayerKind::Inheritance => BASE_INHERITANCE,
			LayerKind::ProjectStructure => BASE_PROJECT_STRUCTURE,
		}
	}
}

#[derive(Debug, Clone)]
pub struct ContextLayer {
	pub kind: LayerKind,
	pub relevance: f32,
	pub text: String,
}

#[derive(Debug, Clone)]
pub struct AssembledContext {
	pub layers: Vec<ContextLayer>,
	pub text: String,
	pub truncated: bool,
}

impl AssembledContext {
	pub fn is_empty(&self) -> bool {
		self.text.trim().is_empty()
	}
}

/// Which layers to build per intent, beyond the always-present code layer.
/// The first entry is the intent's primary structural layer.
fn layer_plan(intent: Intent) -> &'static [LayerKind] {
	match intent {
		Intent::Overview => &[LayerKind::ProjectStructure],
		Intent::LocationUsage => &[LayerKind::ProjectStructure, LayerKind::CallFlow],
		Intent::CodeRelationship => &[LayerKind::CallFlow],
		Intent::SemanticReasoning => &[LayerKind::Inheritance],
		Intent::DeepArchitecture => &[
			LayerKind::ProjectStructure,
			LayerKind::Inheritance,
			LayerKind::CallFlow,
		],
		Intent::Validation => &[LayerKind::CallFlow],
		Intent::UiFlow => &[LayerKind::ProjectStructure, LayerKind::CallFlow],
		Intent::BusinessLogic => &[LayerKind::CallFlow],
		Intent::ImpactAnalysis => &[LayerKind::Impact, LayerKind::CallFlow],
	}
}

pub struct ContextAssembler<'a> {
	graph: &'a CrossReferenceGraph,
	hierarchy: &'a HierarchicalIndex,
	config: &'a ContextConfig,
}

impl<'a> ContextAssembler<'a> {
	pub fn new(
		graph: &'a CrossReferenceGraph,
		hierarchy: &'a HierarchicalIndex,
		config: &'a ContextConfig,
	) -> Self {
		Self {
			graph,
			hierarchy,
			config,
		}
	}

	pub fn assemble(&self, retrieval: &RetrievalResult, intent: Intent) -> AssembledContext {
		let seeds = seed_symbols(retrieval);

		let mut layers = Vec::new();
		let code = self.code_layer(retrieval);
		if !code.is_empty() {
			layers.push(ContextLayer {
				kind: LayerKind::Hierarchical,
				relevance: LayerKind::Hierarchical.base_relevance(),
				text: code,
			});
		}
		for (rank, kind) in layer_plan(intent).iter().enumerate() {
			let text = match kind {
				LayerKind::ProjectStructure => self.project_structure_layer(),
				LayerKind::CallFlow => self.call_flow_layer(&seeds),
				LayerKind::Inheritance => self.inheritance_layer(&seeds),
				LayerKind::Impact => self.impact_layer(&seeds),
				LayerKind::Hierarchical => continue,
			};
			if text.is_empty() {
				continue;
			}
			let weight = if rank == 0 { PRIMARY_WEIGHT } else { 1.0 };
			layers.push(ContextLayer {
				kind: *kind,
				relevance: kind.base_relevance() * weight,
				text,
			});
		}

		layers.sort_by(|a, b| {
			b.relevance
				.partial_cmp(&a.relevance)
				.unwrap_or(std::cmp::Ordering::Equal)
		});
		let (text, truncated) = self.render(&mut layers);
		debug!(
			layers = layers.len(),
			chars = text.len(),
			truncated,
			"context assembled"
		);
		AssembledContext {
			layers,
			text,
			truncated,
		}
	}

	/// Retrieved fragment bodies with file and line headers, in rank order.
	fn code_layer(&self, retrieval: &RetrievalResult) -> String {
		let mut out = String::new();
		for hit in &retrieval.hits {
			let fragment = &hit.payload.fragment;
			let _ = writeln!(
				out,
				"// {} (lines {}-{})",
				fragment.path, fragment.start_line, fragment.end_line
			);
			out.push_str(fragment.content.trim_end());
			out.push_str("\n\n");
		}
		out.trim_end().to_string()
	}

	fn project_structure_layer(&self) -> String {
		let mut out = String::new();
		for (name, entry) in &self.hierarchy.components {
			let _ = writeln!(
				out,
				"{} {} ({} fragments)",
				entry.kind,
				name,
				entry.fragments.len()
			);
		}
		for (name, fragments) in &self.hierarchy.business {
			let _ = writeln!(out, "business: {} ({} fragments)", name, fragments.len());
		}
		for (path, fragments) in &self.hierarchy.files {
			let _ = writeln!(out, "file: {} ({} fragments)", path, fragments.len());
		}
		out.trim_end().to_string()
	}

	/// Callers and callees of the seed symbols, expanded hop by hop.
	fn call_flow_layer(&self, seeds: &BTreeSet<String>) -> String {
		let mut out = String::new();
		let mut frontier: BTreeSet<String> = seeds.clone();
		let mut visited: BTreeSet<String> = BTreeSet::new();
		for _ in 0..self.config.graph_hops.max(1) {
			let mut next = BTreeSet::new();
			for symbol in &frontier {
				if !visited.insert(symbol.clone()) {
					continue;
				}
				let callers = self.graph.callers_of(symbol);
				let callees = self.graph.callees_of(symbol);
				if !callers.is_empty() {
					let _ = writeln!(out, "{} is called by: {}", symbol, callers.join(", "));
				}
				if !callees.is_empty() {
					let _ = writeln!(out, "{} calls: {}", symbol, callees.join(", "));
				}
				next.extend(callers.iter().map(|s| s.to_string()));
				next.extend(callees.iter().map(|s| s.to_string()));
			}
			frontier = next;
		}
		out.trim_end().to_string()
	}

	fn inheritance_layer(&self, seeds: &BTreeSet<String>) -> String {
		let mut out = String::new();
		for symbol in seeds {
			for (supertype, kind) in self.graph.supertypes_of(symbol) {
				let _ = writeln!(out, "{} {} {}", symbol, kind.as_str(), supertype);
			}
			for (subtype, kind) in self.graph.subtypes_of(symbol) {
				let _ = writeln!(out, "{} {} {}", subtype, kind.as_str(), symbol);
			}
		}
		for instance in self.graph.pattern_instances() {
			if instance.symbols.iter().any(|s| seeds.contains(s)) {
				let _ = writeln!(
					out,
					"pattern {}: {} in {}",
					instance.pattern,
					instance.symbols.join(", "),
					instance.file
				);
			}
		}
		out.trim_end().to_string()
	}

	/// What depends on the seed symbols: usage counts, callers, subtypes.
	fn impact_layer(&self, seeds: &BTreeSet<String>) -> String {
		let mut out = String::new();
		for symbol in seeds {
			let usages = self.graph.usage_count(symbol);
			if usages > 0 {
				let _ = writeln!(out, "{} is referenced {} time(s)", symbol, usages);
			}
			let callers = self.graph.callers_of(symbol);
			if !callers.is_empty() {
				let _ = writeln!(
					out,
					"changing {} affects callers: {}",
					symbol,
					callers.join(", ")
				);
			}
			let subtypes = self.graph.subtypes_of(symbol);
			if !subtypes.is_empty() {
				let names: Vec<&str> = subtypes.iter().map(|(s, _)| *s).collect();
				let _ = writeln!(
					out,
					"changing {} affects subtypes: {}",
					symbol,
					names.join(", ")
				);
			}
		}
		out.trim_end().to_string()
	}

	/// Concatenate layers highest relevance first, enforcing the character
	/// budget by shrinking from the lowest-ranked layer upward.
	fn render(&self, layers: &mut Vec<ContextLayer>) -> (String, bool) {
		let budget = self.config.max_chars;
		let mut truncated = false;
		loop {
			let text = render_text(layers);
			if text.len() <= budget {
				return (text, truncated);
			}
			truncated = true;
			let overflow = text.len() - budget;
			let Some(last) = layers.last_mut() else {
				return (String::new(), truncated);
			};
			if last.text.len() > overflow {
				let keep = floor_char_boundary(&last.text, last.text.len() - overflow);
				last.text.truncate(keep);
			} else {
				layers.pop();
			}
		}
	}
}

fn render_text(layers: &[ContextLayer]) -> String {
	let mut out = String::new();
	for layer in layers {
		if layer.text.is_empty() {
			continue;
		}
		let _ = writeln!(out, "=== {} ===", layer.kind.as_str());
		out.push_str(&layer.text);
		out.push_str("\n\n");
	}
	out.trim_end().to_string()
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
	while index > 0 && !s.is_char_boundary(index) {
		index -= 1;
	}
	index
}

/// Symbols declared by the retrieved fragments, used as graph-walk seeds.
fn seed_symbols(retrieval: &RetrievalResult) -> BTreeSet<String> {
	retrieval
		.hits
		.iter()
		.flat_map(|hit| hit.payload.metadata.symbol_names())
		.cloned()
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::ContextConfig;
	use crate::indexer::chunker::Fragment;
	use crate::indexer::metadata::FragmentMetadata;
	use crate::query::retrieve::{RetrievalResult, RetrievalStrategy, ScoredFragment};
	use crate::store::StorePayload;

	fn hit(path: &str, content: &str, functions: &[&str]) -> ScoredFragment {
		let mut metadata = FragmentMetadata::default();
		metadata.function_names = functions.iter().map(|s| s.to_string()).collect();
		ScoredFragment {
			payload: StorePayload {
				fragment: Fragment {
					path: path.to_string(),
					content: content.to_string(),
					start_line: 1,
					end_line: 3,
					ordinal: 0,
					fingerprint: format!("fp-{path}"),
					semantic_score: 0.5,
					leading_context: String::new(),
					trailing_context: String::new(),
				},
				metadata,
			},
			distance: 0.1,
		}
	}

	fn retrieval(hits: Vec<ScoredFragment>) -> RetrievalResult {
		RetrievalResult {
			hits,
			strategy: Some(RetrievalStrategy::OriginalQuestion),
			insufficient: false,
		}
	}

	fn graph_with_call(caller: &str, callee: &str) -> CrossReferenceGraph {
		use crate::indexer::languages::CallSite;
		let fragment = Fragment {
			path: "src/a.py".to_string(),
			content: format!("def {caller}():\n    {callee}()"),
			start_line: 1,
			end_line: 2,
			ordinal: 0,
			fingerprint: "fp-call".to_string(),
			semantic_score: 1.0,
			leading_context: String::new(),
			trailing_context: String::new(),
		};
		let mut metadata = FragmentMetadata::default();
		metadata.function_names = vec![caller.to_string()];
		metadata.call_sites = vec![CallSite {
			callee: callee.to_string(),
			line: 2,
		}];
		let mut graph = CrossReferenceGraph::default();
		graph.add_fragment(&fragment, &metadata);
		graph
	}

	#[test]
	fn relationship_intent_includes_call_flow_layer() {
		let graph = graph_with_call("process_order", "charge_card");
		let hierarchy = HierarchicalIndex::default();
		let config = ContextConfig::default();
		let assembler = ContextAssembler::new(&graph, &hierarchy, &config);
		let result = retrieval(vec![hit(
			"src/a.py",
			"def process_order(): charge_card()",
			&["process_order"],
		)]);
		let context = assembler.assemble(&result, Intent::CodeRelationship);
		assert!(context.text.contains("call flow"));
		assert!(context.text.contains("process_order calls: charge_card"));
	}

	#[test]
	fn budget_is_enforced_and_lowest_layer_truncated_first() {
		let graph = graph_with_call("alpha", "beta");
		let hierarchy = HierarchicalIndex::default();
		let config = ContextConfig {
			max_chars: 120,
			graph_hops: 2,
		};
		let assembler = ContextAssembler::new(&graph, &hierarchy, &config);
		let long_body = "x = compute()\n".repeat(40);
		let result = retrieval(vec![hit("src/big.py", &long_body, &["alpha"])]);
		let context = assembler.assemble(&result, Intent::CodeRelationship);
		assert!(context.text.len() <= 120);
		assert!(context.truncated);
		// The highest-relevance layer survives at the front
		assert!(context.text.starts_with("=== "));
	}

	#[test]
	fn empty_retrieval_yields_empty_context_for_plain_intent() {
		let graph = CrossReferenceGraph::default();
		let hierarchy = HierarchicalIndex::default();
		let config = ContextConfig::default();
		let assembler = ContextAssembler::new(&graph, &hierarchy, &config);
		let context = assembler.assemble(&retrieval(Vec::new()), Intent::SemanticReasoning);
		assert!(context.is_empty());
		assert!(!context.truncated);
	}

	#[test]
	fn overview_intent_includes_project_structure() {
		let graph = CrossReferenceGraph::default();
		let mut hierarchy = HierarchicalIndex::default();
		hierarchy.components.insert(
			"OrderService".to_string(),
			crate::graph::hierarchy::LayerEntry {
				kind: "class".to_string(),
				fragments: ["fp1".to_string()].into_iter().collect(),
			},
		);
		let config = ContextConfig::default();
		let assembler = ContextAssembler::new(&graph, &hierarchy, &config);
		let context = assembler.assemble(&retrieval(Vec::new()), Intent::Overview);
		assert!(context.text.contains("project structure"));
		assert!(context.text.contains("OrderService"));
	}
}
