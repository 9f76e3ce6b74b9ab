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
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project data directory holding the index, state and logs.
pub const DATA_DIR_NAME: &str = ".codeatlas";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
	pub index: IndexConfig,
	pub embedding: EmbeddingConfig,
	pub llm: LlmConfig,
	pub retrieval: RetrievalConfig,
	pub context: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
	/// Maximum fragment size in characters before a forced split
	pub chunk_max_chars: usize,
	/// Fragments smaller than this are merged into the previous sibling
	pub chunk_min_chars: usize,
	/// Trailing/leading characters shared between adjacent fragments
	pub chunk_overlap_chars: usize,
	/// Number of fragments embedded per batch
	pub embeddings_batch_size: usize,
	/// Token budget per embedding batch
	pub embeddings_max_tokens_per_batch: usize,
	/// Retry attempts for a failed embedding/store batch
	pub batch_max_retries: usize,
	/// File extensions considered source code
	pub extensions: Vec<String>,
}

impl Default for IndexConfig {
	fn default() -> Self {
		Self {
			chunk_max_chars: 1500,
			chunk_min_chars: 100,
			chunk_overlap_chars: 100,
			embeddings_batch_size: 16,
			embeddings_max_tokens_per_batch: 20000,
			batch_max_retries: 3,
			extensions: [
				"py", "js", "jsx", "ts", "tsx", "java", "kt", "kts", "rs",
			]
			.iter()
			.map(|s| s.to_string())
			.collect(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
	/// Embedding model in "provider:model" form, e.g. "ollama:nomic-embed-text"
	pub model: String,
	/// Request timeout in seconds
	pub timeout_secs: u64,
	/// Base URL for the ollama provider
	pub ollama_base_url: String,
}

impl Default for EmbeddingConfig {
	fn default() -> Self {
		Self {
			model: "ollama:nomic-embed-text".to_string(),
			timeout_secs: 60,
			ollama_base_url: "http://localhost:11434".to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
	/// Completion model in "provider:model" form, e.g. "openai:gpt-4o-mini"
	pub model: String,
	pub temperature: f32,
	pub max_tokens: usize,
	/// Request timeout in seconds
	pub timeout_secs: u64,
	/// Base URL for the ollama provider
	pub ollama_base_url: String,
}

impl Default for LlmConfig {
	fn default() -> Self {
		Self {
			model: "ollama:qwen2.5-coder".to_string(),
			temperature: 0.2,
			max_tokens: 2048,
			timeout_secs: 120,
			ollama_base_url: "http://localhost:11434".to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
	/// Nearest neighbors requested per strategy
	pub top_k: usize,
	/// Minimum result count before the next fallback strategy fires
	pub sufficiency_threshold: usize,
	/// Upper bound on extracted key terms for the last-resort strategy
	pub max_key_terms: usize,
}

impl Default for RetrievalConfig {
	fn default() -> Self {
		Self {
			top_k: 10,
			sufficiency_threshold: 2,
			max_key_terms: 6,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
	/// Character budget for the assembled context block
	pub max_chars: usize,
	/// Graph traversal depth when expanding retrieved symbols
	pub graph_hops: usize,
}

impl Default for ContextConfig {
	fn default() -> Self {
		Self {
			max_chars: 10000,
			graph_hops: 2,
		}
	}
}

impl Config {
	/// Load configuration for a project, checking the project-local file
	/// first, then the user-level file, finally falling back to defaults.
	pub fn load(project_dir: &Path) -> Result<Self> {
		let local = project_data_dir(project_dir).join("config.toml");
		if local.exists() {
			return Self::load_from(&local);
		}

		if let Some(config_dir) = dirs::config_dir() {
			let global = config_dir.join("codeatlas").join("config.toml");
			if global.exists() {
				return Self::load_from(&global);
			}
		}

		Ok(Self::default())
	}

	fn load_from(path: &Path) -> Result<Self> {
		let contents = fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let config: Config = toml::from_str(&contents)
			.with_context(|| format!("Failed to parse config file: {}", path.display()))?;
		Ok(config)
	}

	/// True when `path` has one of the configured source extensions.
	pub fn matches_extension(&self, path: &Path) -> bool {
		path.extension()
			.and_then(|e| e.to_str())
			.map(|ext| self.index.extensions.iter().any(|e| e == ext))
			.unwrap_or(false)
	}
}

/// Per-project data directory (index, graph snapshots, tracking state, logs).
pub fn project_data_dir(project_dir: &Path) -> PathBuf {
	project_dir.join(DATA_DIR_NAME)
}

/// Logs subdirectory inside the project data directory.
pub fn project_logs_dir(project_dir: &Path) -> PathBuf {
	project_data_dir(project_dir).join("logs")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_sane() {
		let config = Config::default();
		assert!(config.index.chunk_max_chars > config.index.chunk_min_chars);
		assert!(config.index.chunk_overlap_chars < config.index.chunk_min_chars * 2);
		assert!(config.retrieval.sufficiency_threshold <= config.retrieval.top_k);
		assert!(config.context.max_chars > 0);
	}

	#[test]
	fn partial_toml_fills_defaults() {
		let config: Config = toml::from_str(
			r#"
[index]
chunk_max_chars = 900

[retrieval]
top_k = 5
"#,
		)
		.unwrap();
		assert_eq!(config.index.chunk_max_chars, 900);
		assert_eq!(config.index.chunk_min_chars, 100);
		assert_eq!(config.retrieval.top_k, 5);
		assert_eq!(config.retrieval.sufficiency_threshold, 2);
	}

	#[test]
	fn extension_matching() {
		let config = Config::default();
		assert!(config.matches_extension(Path::new("src/main.rs")));
		assert!(config.matches_extension(Path::new("app/Main.kt")));
		assert!(!config.matches_extension(Path::new("README.md")));
		assert!(!config.matches_extension(Path::new("Makefile")));
	}
}
