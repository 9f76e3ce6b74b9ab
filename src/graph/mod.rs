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

//! Project-wide cross-reference graph: symbol definitions, call edges,
//! inheritance edges, usage counts and design-pattern instances. Every fact
//! is keyed by the fingerprint and file of the fragment that justifies it,
//! which is what makes incremental removal exact: retracting a file's
//! fragments retracts precisely that file's contributions and nothing else,
//! even when another file carries identical content.

pub mod hierarchy;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::project_data_dir;
use crate::indexer::chunker::Fragment;
use crate::indexer::languages::{InheritanceKind, SymbolKind};
use crate::indexer::metadata::FragmentMetadata;

const GRAPH_FILE: &str = "graph.json";

/// Kinds of relationships tracked between symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
	Calls,
	Extends,
	Implements,
	Imports,
}

impl RelationKind {
	/// Relative weight when ranking graph context; calls and inheritance
	/// carry more signal than imports.
	pub fn importance_weight(&self) -> f32 {
		match self {
			RelationKind::Calls => 1.0,
			RelationKind::Extends => 0.9,
			RelationKind::Implements => 0.8,
			RelationKind::Imports => 0.3,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			RelationKind::Calls => "calls",
			RelationKind::Extends => "extends",
			RelationKind::Implements => "implements",
			RelationKind::Imports => "imports",
		}
	}
}

impl fmt::Display for RelationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Where a symbol is defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDefinition {
	pub name: String,
	pub kind: String,
	pub file: String,
	pub line: usize,
}

/// A directed relation between two symbols, justified by one or more
/// fragments. The edge survives as long as any origin survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
	pub from: String,
	pub to: String,
	pub kind: RelationKind,
	pub origins: BTreeSet<String>,
}

/// A detected design-pattern occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInstance {
	pub pattern: String,
	pub file: String,
	pub symbols: Vec<String>,
}

/// Aggregate counters surfaced by `status` and the build report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
	pub symbol_count: usize,
	pub edge_count: usize,
	pub call_edge_count: usize,
	pub inheritance_edge_count: usize,
	pub pattern_instance_count: usize,
	pub fragment_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossReferenceGraph {
	/// symbol -> origin key -> definition
	definitions: BTreeMap<String, BTreeMap<String, SymbolDefinition>>,
	edges: Vec<RelationEdge>,
	/// symbol -> origin key -> usage count within that fragment
	usages: BTreeMap<String, BTreeMap<String, usize>>,
	/// origin key -> pattern instances found there
	patterns: BTreeMap<String, Vec<PatternInstance>>,
	/// content fingerprint -> files currently containing that fragment.
	/// Identical content in several files shares one fingerprint, so the
	/// fragment is retired only when its last owning file retracts it.
	fragment_files: BTreeMap<String, BTreeSet<String>>,
}

/// A fact origin: one fragment in one file. Identical content in two files
/// yields two origins under the same fingerprint.
fn origin_key(fingerprint: &str, path: &str) -> String {
	format!("{fingerprint}@{path}")
}

impl CrossReferenceGraph {
	pub fn is_empty(&self) -> bool {
		self.fragment_files.is_empty()
	}

	pub fn fragment_count(&self) -> usize {
		self.fragment_files.len()
	}

	/// Register one fragment's facts. The caller symbol for call edges is
	/// the fragment's first declared function, falling back to its first
	/// class, then to the file path.
	pub fn add_fragment(&mut self, fragment: &Fragment, metadata: &FragmentMetadata) {
		let fp = fragment.fingerprint.clone();
		debug_assert!(!fp.is_empty(), "fragment must be fingerprinted");
		let origin = origin_key(&fp, &fragment.path);
		self.fragment_files
			.entry(fp)
			.or_default()
			.insert(fragment.path.clone());

		for name in &metadata.class_names {
			self.definitions.entry(name.clone()).or_default().insert(
				origin.clone(),
				SymbolDefinition {
					name: name.clone(),
					kind: SymbolKind::Class.as_str().to_string(),
					file: fragment.path.clone(),
					line: fragment.start_line,
				},
			);
		}
		for name in &metadata.function_names {
			self.definitions.entry(name.clone()).or_default().insert(
				origin.clone(),
				SymbolDefinition {
					name: name.clone(),
					kind: SymbolKind::Function.as_str().to_string(),
					file: fragment.path.clone(),
					line: fragment.start_line,
				},
			);
		}

		let caller = metadata
			.function_names
			.first()
			.or_else(|| metadata.class_names.first())
			.cloned()
			.unwrap_or_else(|| fragment.path.clone());

		for call in &metadata.call_sites {
			self.add_edge(&caller, &call.callee, RelationKind::Calls, &origin);
			*self
				.usages
				.entry(call.callee.clone())
				.or_default()
				.entry(origin.clone())
				.or_insert(0) += 1;
		}

		for edge in &metadata.inheritance {
			let kind = match edge.kind {
				InheritanceKind::Extends => RelationKind::Extends,
				InheritanceKind::Implements => RelationKind::Implements,
			};
			self.add_edge(&edge.subtype, &edge.supertype, kind, &origin);
			*self
				.usages
				.entry(edge.supertype.clone())
				.or_default()
				.entry(origin.clone())
				.or_insert(0) += 1;
		}

		for import in &metadata.imports {
			self.add_edge(&fragment.path, import, RelationKind::Imports, &origin);
		}

		if !metadata.design_patterns.is_empty() {
			let symbols: Vec<String> = metadata.symbol_names().cloned().collect();
			let instances = metadata
				.design_patterns
				.iter()
				.map(|pattern| PatternInstance {
					pattern: pattern.clone(),
					file: fragment.path.clone(),
					symbols: symbols.clone(),
				})
				.collect();
			self.patterns.insert(origin, instances);
		}
	}

	fn add_edge(&mut self, from: &str, to: &str, kind: RelationKind, origin: &str) {
		if from == to {
			return;
		}
		if let Some(edge) = self
			.edges
			.iter_mut()
			.find(|e| e.from == from && e.to == to && e.kind == kind)
		{
			edge.origins.insert(origin.to_string());
			return;
		}
		let mut origins = BTreeSet::new();
		origins.insert(origin.to_string());
		self.edges.push(RelationEdge {
			from: from.to_string(),
			to: to.to_string(),
			kind,
			origins,
		});
	}

	/// Retract the given fragments entirely, across every file that owns
	/// them. Facts still justified by surviving fragments are untouched.
	pub fn remove_fragments(&mut self, fingerprints: &[String]) {
		let mut origins = Vec::new();
		for fp in fingerprints {
			if let Some(owners) = self.fragment_files.remove(fp) {
				origins.extend(owners.iter().map(|owner| origin_key(fp, owner)));
			}
		}
		self.retract_origins(&origins);
	}

	fn retract_origins(&mut self, origins: &[String]) {
		for origin in origins {
			self.patterns.remove(origin);
		}
		self.definitions.retain(|_, defs| {
			for origin in origins {
				defs.remove(origin);
			}
			!defs.is_empty()
		});
		self.usages.retain(|_, counts| {
			for origin in origins {
				counts.remove(origin);
			}
			!counts.is_empty()
		});
		self.edges.retain_mut(|edge| {
			for origin in origins {
				edge.origins.remove(origin);
			}
			!edge.origins.is_empty()
		});
	}

	/// Whether any current fragment carries this fingerprint.
	pub fn has_fragment(&self, fingerprint: &str) -> bool {
		self.fragment_files.contains_key(fingerprint)
	}

	/// Fingerprints of all fragments currently attributed to a file.
	pub fn fragments_for_file(&self, path: &str) -> Vec<String> {
		self.fragment_files
			.iter()
			.filter(|(_, owners)| owners.contains(path))
			.map(|(fp, _)| fp.clone())
			.collect()
	}

	/// Retract one file's contribution to every fragment it owns. Returns
	/// the fingerprints left with no owner at all, so the caller can mirror
	/// exactly those deletions in the vector store; a fragment still present
	/// in another file survives both here and there.
	pub fn remove_file(&mut self, path: &str) -> Vec<String> {
		let owned = self.fragments_for_file(path);
		let origins: Vec<String> = owned.iter().map(|fp| origin_key(fp, path)).collect();
		self.retract_origins(&origins);

		let mut orphaned = Vec::new();
		for fp in owned {
			let emptied = match self.fragment_files.get_mut(&fp) {
				Some(owners) => {
					owners.remove(path);
					owners.is_empty()
				}
				None => false,
			};
			if emptied {
				self.fragment_files.remove(&fp);
				orphaned.push(fp);
			}
		}
		orphaned
	}

	pub fn definitions_of(&self, symbol: &str) -> Vec<&SymbolDefinition> {
		self.definitions
			.get(symbol)
			.map(|defs| defs.values().collect())
			.unwrap_or_default()
	}

	pub fn has_symbol(&self, symbol: &str) -> bool {
		self.definitions.contains_key(symbol)
	}

	pub fn symbols(&self) -> impl Iterator<Item = &String> {
		self.definitions.keys()
	}

	pub fn callers_of(&self, symbol: &str) -> Vec<&str> {
		self.edges
			.iter()
			.filter(|e| e.kind == RelationKind::Calls && e.to == symbol)
			.map(|e| e.from.as_str())
			.collect()
	}

	pub fn callees_of(&self, symbol: &str) -> Vec<&str> {
		self.edges
			.iter()
			.filter(|e| e.kind == RelationKind::Calls && e.from == symbol)
			.map(|e| e.to.as_str())
			.collect()
	}

	pub fn supertypes_of(&self, symbol: &str) -> Vec<(&str, RelationKind)> {
		self.edges
			.iter()
			.filter(|e| {
				matches!(e.kind, RelationKind::Extends | RelationKind::Implements)
					&& e.from == symbol
			})
			.map(|e| (e.to.as_str(), e.kind))
			.collect()
	}

	pub fn subtypes_of(&self, symbol: &str) -> Vec<(&str, RelationKind)> {
		self.edges
			.iter()
			.filter(|e| {
				matches!(e.kind, RelationKind::Extends | RelationKind::Implements)
					&& e.to == symbol
			})
			.map(|e| (e.from.as_str(), e.kind))
			.collect()
	}

	pub fn imports_of_file(&self, path: &str) -> Vec<&str> {
		self.edges
			.iter()
			.filter(|e| e.kind == RelationKind::Imports && e.from == path)
			.map(|e| e.to.as_str())
			.collect()
	}

	pub fn usage_count(&self, symbol: &str) -> usize {
		self.usages
			.get(symbol)
			.map(|counts| counts.values().sum())
			.unwrap_or(0)
	}

	pub fn pattern_instances(&self) -> Vec<&PatternInstance> {
		self.patterns.values().flatten().collect()
	}

	pub fn edges(&self) -> &[RelationEdge] {
		&self.edges
	}

	pub fn statistics(&self) -> GraphStatistics {
		GraphStatistics {
			symbol_count: self.definitions.len(),
			edge_count: self.edges.len(),
			call_edge_count: self
				.edges
				.iter()
				.filter(|e| e.kind == RelationKind::Calls)
				.count(),
			inheritance_edge_count: self
				.edges
				.iter()
				.filter(|e| {
					matches!(e.kind, RelationKind::Extends | RelationKind::Implements)
				})
				.count(),
			pattern_instance_count: self.patterns.values().map(|v| v.len()).sum(),
			fragment_count: self.fragment_files.len(),
		}
	}

	/// Sort edge storage so two graphs with the same content compare and
	/// serialize identically regardless of insertion order.
	pub fn normalize(&mut self) {
		self.edges
			.sort_by(|a, b| (&a.from, &a.to, a.kind).cmp(&(&b.from, &b.to, b.kind)));
	}

	pub fn load(project_dir: &Path) -> Result<Self> {
		let path = project_data_dir(project_dir).join(GRAPH_FILE);
		if !path.exists() {
			return Ok(Self::default());
		}
		let contents = fs::read_to_string(&path)
			.with_context(|| format!("Failed to read graph snapshot: {}", path.display()))?;
		let graph: CrossReferenceGraph =
			serde_json::from_str(&contents).context("Failed to parse graph snapshot")?;
		Ok(graph)
	}

	pub fn save(&mut self, project_dir: &Path) -> Result<()> {
		self.normalize();
		let dir = project_data_dir(project_dir);
		fs::create_dir_all(&dir)?;
		let path = dir.join(GRAPH_FILE);
		let contents =
			serde_json::to_string(self).context("Failed to serialize graph snapshot")?;
		fs::write(&path, contents)
			.with_context(|| format!("Failed to write graph snapshot: {}", path.display()))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::indexer::languages::{CallSite, InheritanceEdge, InheritanceKind};

	fn fragment(path: &str, fp: &str) -> Fragment {
		Fragment {
			path: path.to_string(),
			content: String::new(),
			start_line: 0,
			end_line: 10,
			ordinal: 0,
			fingerprint: fp.to_string(),
			semantic_score: 0.5,
			leading_context: String::new(),
			trailing_context: String::new(),
		}
	}

	fn metadata_with_call(function: &str, callee: &str) -> FragmentMetadata {
		FragmentMetadata {
			language: "python".to_string(),
			function_names: vec![function.to_string()],
			call_sites: vec![CallSite {
				callee: callee.to_string(),
				line: 3,
			}],
			..Default::default()
		}
	}

	#[test]
	fn call_edges_link_caller_to_callee() {
		let mut graph = CrossReferenceGraph::default();
		let meta_def = FragmentMetadata {
			language: "python".to_string(),
			class_names: vec!["Foo".to_string()],
			function_names: vec!["bar".to_string()],
			..Default::default()
		};
		graph.add_fragment(&fragment("A.py", "fp-a"), &meta_def);
		graph.add_fragment(&fragment("B.py", "fp-b"), &metadata_with_call("bar_caller", "bar"));

		assert_eq!(graph.callers_of("bar"), vec!["bar_caller"]);
		assert_eq!(graph.callees_of("bar_caller"), vec!["bar"]);
		assert_eq!(graph.usage_count("bar"), 1);
	}

	#[test]
	fn removal_keeps_edges_justified_by_survivors() {
		let mut graph = CrossReferenceGraph::default();
		graph.add_fragment(&fragment("B.py", "fp-1"), &metadata_with_call("caller_one", "shared"));
		graph.add_fragment(&fragment("C.py", "fp-2"), &metadata_with_call("caller_one", "shared"));

		// Same edge justified twice; removing one origin keeps it
		graph.remove_fragments(&["fp-1".to_string()]);
		assert_eq!(graph.callers_of("shared"), vec!["caller_one"]);

		graph.remove_fragments(&["fp-2".to_string()]);
		assert!(graph.callers_of("shared").is_empty());
		assert_eq!(graph.usage_count("shared"), 0);
	}

	#[test]
	fn remove_file_retracts_only_that_file() {
		let mut graph = CrossReferenceGraph::default();
		let meta_a = FragmentMetadata {
			class_names: vec!["Foo".to_string()],
			..Default::default()
		};
		graph.add_fragment(&fragment("A.py", "fp-a"), &meta_a);
		graph.add_fragment(&fragment("B.py", "fp-b"), &metadata_with_call("bar_caller", "bar"));

		let removed = graph.remove_file("B.py");
		assert_eq!(removed, vec!["fp-b".to_string()]);
		assert!(graph.has_symbol("Foo"));
		assert!(!graph.has_symbol("bar_caller"));
	}

	#[test]
	fn incremental_and_full_rebuild_converge() {
		let meta_a = FragmentMetadata {
			class_names: vec!["Foo".to_string()],
			..Default::default()
		};
		let meta_b_old = metadata_with_call("old_caller", "bar");
		let meta_b_new = metadata_with_call("new_caller", "bar");

		// Incremental: add old B, retract it, add new B
		let mut incremental = CrossReferenceGraph::default();
		incremental.add_fragment(&fragment("A.py", "fp-a"), &meta_a);
		incremental.add_fragment(&fragment("B.py", "fp-b-old"), &meta_b_old);
		incremental.remove_file("B.py");
		incremental.add_fragment(&fragment("B.py", "fp-b-new"), &meta_b_new);

		// Full: build the final state directly
		let mut full = CrossReferenceGraph::default();
		full.add_fragment(&fragment("A.py", "fp-a"), &meta_a);
		full.add_fragment(&fragment("B.py", "fp-b-new"), &meta_b_new);

		incremental.normalize();
		full.normalize();
		assert_eq!(incremental, full);
	}

	#[test]
	fn inheritance_edges_and_subtype_lookup() {
		let mut graph = CrossReferenceGraph::default();
		let meta = FragmentMetadata {
			class_names: vec!["Child".to_string()],
			inheritance: vec![InheritanceEdge {
				subtype: "Child".to_string(),
				supertype: "Base".to_string(),
				kind: InheritanceKind::Extends,
			}],
			..Default::default()
		};
		graph.add_fragment(&fragment("child.py", "fp-c"), &meta);

		assert_eq!(graph.supertypes_of("Child"), vec![("Base", RelationKind::Extends)]);
		assert_eq!(graph.subtypes_of("Base"), vec![("Child", RelationKind::Extends)]);
		assert_eq!(graph.statistics().inheritance_edge_count, 1);
	}

	#[test]
	fn self_edges_are_dropped() {
		let mut graph = CrossReferenceGraph::default();
		graph.add_fragment(&fragment("r.py", "fp-r"), &metadata_with_call("recurse", "recurse"));
		assert!(graph.callers_of("recurse").is_empty());
	}

	#[test]
	fn duplicate_content_tracks_every_owning_file() {
		let mut graph = CrossReferenceGraph::default();
		let meta = metadata_with_call("caller", "target");
		graph.add_fragment(&fragment("a.py", "fp-x"), &meta);
		graph.add_fragment(&fragment("b.py", "fp-x"), &meta);

		// The first owner retracts; the fragment and its facts survive
		let orphaned = graph.remove_file("a.py");
		assert!(orphaned.is_empty());
		assert!(graph.has_fragment("fp-x"));
		assert_eq!(graph.callers_of("target"), vec!["caller"]);

		// The last owner retracts; now the fragment is gone for good
		let orphaned = graph.remove_file("b.py");
		assert_eq!(orphaned, vec!["fp-x".to_string()]);
		assert!(!graph.has_fragment("fp-x"));
		assert!(graph.callers_of("target").is_empty());
	}

	#[test]
	fn editing_one_of_two_identical_files_converges_with_full_rebuild() {
		let meta = metadata_with_call("caller", "target");
		let meta_new = metadata_with_call("fresh_caller", "target");

		// Incremental: both files share content, then the first is edited
		let mut incremental = CrossReferenceGraph::default();
		incremental.add_fragment(&fragment("a.py", "fp-x"), &meta);
		incremental.add_fragment(&fragment("b.py", "fp-x"), &meta);
		incremental.remove_file("a.py");
		incremental.add_fragment(&fragment("a.py", "fp-y"), &meta_new);

		// Full: build the final tree directly
		let mut full = CrossReferenceGraph::default();
		full.add_fragment(&fragment("a.py", "fp-y"), &meta_new);
		full.add_fragment(&fragment("b.py", "fp-x"), &meta);

		incremental.normalize();
		full.normalize();
		assert_eq!(incremental, full);
	}
}
