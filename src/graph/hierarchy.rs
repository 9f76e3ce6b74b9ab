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

//! Layered views over the fragment set: component structure, business
//! rules, UI surface and API surface. Derived data, rebuilt whenever the
//! fragment set changes. Fragments with no structural anchor are tracked
//! rather than dropped, as a data-quality signal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::config::project_data_dir;
use crate::indexer::chunker::Fragment;
use crate::indexer::metadata::FragmentMetadata;

const HIERARCHY_FILE: &str = "hierarchy.json";

/// One named entry in a layer and the fragments that back it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEntry {
	pub kind: String,
	pub fragments: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchicalIndex {
	/// Symbol name -> defining fragments, tagged with the symbol kind
	pub components: BTreeMap<String, LayerEntry>,
	/// Business-logic tag -> fragments carrying it
	pub business: BTreeMap<String, BTreeSet<String>>,
	/// UI-element tag -> fragments carrying it
	pub ui: BTreeMap<String, BTreeSet<String>>,
	/// API-usage tag -> fragments carrying it
	pub api: BTreeMap<String, BTreeSet<String>>,
	/// File path -> its fragments, for project-structure context
	pub files: BTreeMap<String, BTreeSet<String>>,
	/// Fragments with no symbol and no tags; surfaced, never dropped
	pub anchorless: BTreeSet<String>,
}

impl HierarchicalIndex {
	/// Build all layers from the complete fragment set.
	pub fn build(fragments: &[(Fragment, FragmentMetadata)]) -> Self {
		let mut index = Self::default();
		for (fragment, metadata) in fragments {
			let fp = &fragment.fingerprint;
			index
				.files
				.entry(fragment.path.clone())
				.or_default()
				.insert(fp.clone());

			for name in &metadata.class_names {
				let entry = index.components.entry(name.clone()).or_insert_with(|| {
					LayerEntry {
						kind: "class".to_string(),
						fragments: BTreeSet::new(),
					}
				});
				entry.fragments.insert(fp.clone());
			}
			for name in &metadata.function_names {
				let entry = index.components.entry(name.clone()).or_insert_with(|| {
					LayerEntry {
						kind: "function".to_string(),
						fragments: BTreeSet::new(),
					}
				});
				entry.fragments.insert(fp.clone());
			}
			for tag in &metadata.business_logic {
				index
					.business
					.entry(tag.clone())
					.or_default()
					.insert(fp.clone());
			}
			for tag in &metadata.ui_elements {
				index.ui.entry(tag.clone()).or_default().insert(fp.clone());
			}
			for tag in &metadata.api_usage {
				index.api.entry(tag.clone()).or_default().insert(fp.clone());
			}

			if !metadata.has_semantic_anchors()
				&& metadata.business_logic.is_empty()
				&& metadata.api_usage.is_empty()
			{
				index.anchorless.insert(fp.clone());
			}
		}
		index
	}

	/// Share of fragments that could not be anchored anywhere.
	pub fn anchorless_ratio(&self) -> f32 {
		let total: usize = self.files.values().map(|s| s.len()).sum();
		if total == 0 {
			return 0.0;
		}
		self.anchorless.len() as f32 / total as f32
	}

	pub fn load(project_dir: &Path) -> Result<Self> {
		let path = project_data_dir(project_dir).join(HIERARCHY_FILE);
		if !path.exists() {
			return Ok(Self::default());
		}
		let contents = fs::read_to_string(&path)
			.with_context(|| format!("Failed to read hierarchy snapshot: {}", path.display()))?;
		serde_json::from_str(&contents).context("Failed to parse hierarchy snapshot")
	}

	pub fn save(&self, project_dir: &Path) -> Result<()> {
		let dir = project_data_dir(project_dir);
		fs::create_dir_all(&dir)?;
		let path = dir.join(HIERARCHY_FILE);
		let contents = serde_json::to_string(self).context("Failed to serialize hierarchy")?;
		fs::write(&path, contents)
			.with_context(|| format!("Failed to write hierarchy snapshot: {}", path.display()))?;
		Ok(())
	}
}
