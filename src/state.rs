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

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::project_data_dir;

const STATE_FILE: &str = "state.json";

/// Lifecycle of a project index as seen by the CLI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLifecycle {
	NotBuilt,
	Building,
	Ready,
	Stale,
}

impl IndexLifecycle {
	/// Whether queries may be answered in this state.
	pub fn can_query(&self) -> bool {
		matches!(self, IndexLifecycle::Ready | IndexLifecycle::Stale)
	}

	/// Whether a build may be started in this state.
	pub fn can_build(&self) -> bool {
		!matches!(self, IndexLifecycle::Building)
	}
}

/// Identity of the embedding model an index was built with. Mixing models
/// (or dimensions) across builds makes stored vectors unanswerable, so this
/// is checked before every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingIdentity {
	/// "provider:model" string
	pub model: String,
	pub dimension: usize,
}

/// Last-known facts about one tracked source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
	pub content_hash: String,
	pub indexed_at: String,
}

/// Persisted per-project index state: which files were indexed at which
/// content hash, the revision the last build saw, and the embedding model
/// the vectors belong to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectState {
	#[serde(default)]
	pub files: HashMap<String, FileRecord>,
	#[serde(default)]
	pub last_commit: Option<String>,
	#[serde(default)]
	pub embedding_identity: Option<EmbeddingIdentity>,
	#[serde(default)]
	pub built_at: Option<String>,
}

impl ProjectState {
	/// Load state from the project data directory. A missing file yields
	/// `None` so callers can distinguish "never built" from "empty".
	pub fn load(project_dir: &Path) -> Result<Option<Self>> {
		let path = project_data_dir(project_dir).join(STATE_FILE);
		if !path.exists() {
			return Ok(None);
		}
		let contents = fs::read_to_string(&path)
			.with_context(|| format!("Failed to read state file: {}", path.display()))?;
		let state: ProjectState = serde_json::from_str(&contents)
			.with_context(|| format!("Failed to parse state file: {}", path.display()))?;
		Ok(Some(state))
	}

	pub fn save(&self, project_dir: &Path) -> Result<()> {
		let dir = project_data_dir(project_dir);
		fs::create_dir_all(&dir)
			.with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
		let path = dir.join(STATE_FILE);
		let contents = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
		fs::write(&path, contents)
			.with_context(|| format!("Failed to write state file: {}", path.display()))?;
		Ok(())
	}

	/// Record a successfully indexed file at its current content hash.
	pub fn record_file(&mut self, path: &str, content_hash: String) {
		self.files.insert(
			path.to_string(),
			FileRecord {
				content_hash,
				indexed_at: chrono::Utc::now().to_rfc3339(),
			},
		);
	}

	pub fn forget_file(&mut self, path: &str) {
		self.files.remove(path);
	}

	/// Verify the stored embedding identity against the active provider.
	/// A mismatch is fatal for querying but never touches stored data.
	pub fn check_embedding_identity(&self, current: &EmbeddingIdentity) -> Result<()> {
		match &self.embedding_identity {
			Some(recorded) if recorded != current => Err(anyhow::anyhow!(
				"Embedding model mismatch: index was built with {} ({} dims) but the \
				 active provider is {} ({} dims). Rebuild the index before querying.",
				recorded.model,
				recorded.dimension,
				current.model,
				current.dimension
			)),
			_ => Ok(()),
		}
	}
}
