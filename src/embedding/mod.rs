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

//! Embedding providers behind a common trait, plus the content-hash
//! helpers used for fragment fingerprints and change tracking. Providers
//! are addressed as "provider:model" strings.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::state::EmbeddingIdentity;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
	/// Embed a batch of texts; one vector per input, same order.
	async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

	/// The "provider:model" string this provider answers for.
	fn model_id(&self) -> &str;
}

/// Split a "provider:model" string into its parts.
pub fn parse_model_id(model_id: &str) -> Result<(&str, &str)> {
	model_id
		.split_once(':')
		.filter(|(provider, model)| !provider.is_empty() && !model.is_empty())
		.ok_or_else(|| {
			anyhow!("Invalid embedding model '{model_id}', expected 'provider:model' format")
		})
}

/// Build the provider named in the config.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
	let (provider, model) = parse_model_id(&config.model)?;
	let timeout = Duration::from_secs(config.timeout_secs);
	match provider {
		"ollama" => Ok(Box::new(OllamaEmbedding::new(
			&config.ollama_base_url,
			model,
			&config.model,
			timeout,
		)?)),
		"openai" => Ok(Box::new(OpenAiEmbedding::new(model, &config.model, timeout)?)),
		other => Err(anyhow!("Unsupported embedding provider: {other}")),
	}
}

/// Resolve the identity (model + dimension) of the active provider by
/// embedding a probe text. The dimension is part of the identity because
/// vectors from different dimensions can never be compared.
pub async fn resolve_identity(provider: &dyn EmbeddingProvider) -> Result<EmbeddingIdentity> {
	let probe = provider
		.embed_batch(&["dimension probe".to_string()])
		.await
		.context("Embedding provider is unreachable")?;
	let dimension = probe
		.first()
		.map(|v| v.len())
		.ok_or_else(|| anyhow!("Embedding provider returned no vector for probe"))?;
	Ok(EmbeddingIdentity {
		model: provider.model_id().to_string(),
		dimension,
	})
}

pub struct OllamaEmbedding {
	client: reqwest::Client,
	base_url: String,
	model: String,
	model_id: String,
}

impl OllamaEmbedding {
	pub fn new(base_url: &str, model: &str, model_id: &str, timeout: Duration) -> Result<Self> {
		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(timeout)
				.build()
				.context("Failed to build HTTP client")?,
			base_url: base_url.trim_end_matches('/').to_string(),
			model: model.to_string(),
			model_id: model_id.to_string(),
		})
	}
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
	async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let url = format!("{}/api/embed", self.base_url);
		let response = self
			.client
			.post(&url)
			.json(&json!({ "model": self.model, "input": texts }))
			.send()
			.await
			.with_context(|| format!("Embedding request to {url} failed"))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(anyhow!("Embedding request failed with {status}: {body}"));
		}

		let body: Value = response
			.json()
			.await
			.context("Failed to parse embedding response")?;
		parse_embedding_rows(&body["embeddings"], texts.len())
	}

	fn model_id(&self) -> &str {
		&self.model_id
	}
}

pub struct OpenAiEmbedding {
	client: reqwest::Client,
	model: String,
	model_id: String,
}

impl OpenAiEmbedding {
	pub fn new(model: &str, model_id: &str, timeout: Duration) -> Result<Self> {
		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(timeout)
				.build()
				.context("Failed to build HTTP client")?,
			model: model.to_string(),
			model_id: model_id.to_string(),
		})
	}
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
	async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let api_key = std::env::var("OPENAI_API_KEY")
			.context("OPENAI_API_KEY is required for the openai embedding provider")?;
		let response = self
			.client
			.post("https://api.openai.com/v1/embeddings")
			.bearer_auth(api_key)
			.json(&json!({ "model": self.model, "input": texts }))
			.send()
			.await
			.context("Embedding request to OpenAI failed")?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(anyhow!("Embedding request failed with {status}: {body}"));
		}

		let body: Value = response
			.json()
			.await
			.context("Failed to parse embedding response")?;
		let rows: Vec<&Value> = body["data"]
			.as_array()
			.map(|data| data.iter().map(|item| &item["embedding"]).collect())
			.unwrap_or_default();
		if rows.len() != texts.len() {
			return Err(anyhow!(
				"Embedding count mismatch: sent {} texts, got {} vectors",
				texts.len(),
				rows.len()
			));
		}
		rows.into_iter()
			.map(|row| parse_vector(row))
			.collect::<Result<Vec<_>>>()
	}

	fn model_id(&self) -> &str {
		&self.model_id
	}
}

fn parse_embedding_rows(rows: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
	let rows = rows
		.as_array()
		.ok_or_else(|| anyhow!("Embedding response missing vector array"))?;
	if rows.len() != expected {
		return Err(anyhow!(
			"Embedding count mismatch: sent {} texts, got {} vectors",
			expected,
			rows.len()
		));
	}
	rows.iter().map(parse_vector).collect()
}

fn parse_vector(row: &Value) -> Result<Vec<f32>> {
	row.as_array()
		.ok_or_else(|| anyhow!("Embedding vector is not an array"))?
		.iter()
		.map(|v| {
			v.as_f64()
				.map(|f| f as f32)
				.ok_or_else(|| anyhow!("Embedding vector holds a non-numeric value"))
		})
		.collect()
}

/// Fragment fingerprint: SHA-256 over whitespace-normalized content, so
/// formatting-only differences (trailing spaces, CRLF) do not defeat
/// deduplication. Independent of the fragment's position in its file.
pub fn fingerprint(content: &str) -> String {
	let normalized: String = content
		.lines()
		.map(|line| line.trim_end())
		.collect::<Vec<_>>()
		.join("\n");
	let mut hasher = Sha256::new();
	hasher.update(normalized.trim().as_bytes());
	format!("{:x}", hasher.finalize())
}

/// Raw content hash for file-level change tracking.
pub fn content_hash(content: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(content);
	format!("{:x}", hasher.finalize())
}

/// Approximate token count used to bound embedding batches.
pub fn count_tokens(text: &str) -> usize {
	lazy_static::lazy_static! {
		static ref BPE: tiktoken_rs::CoreBPE =
			tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary is bundled");
	}
	BPE.encode_with_special_tokens(text).len()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn model_id_parsing() {
		assert_eq!(
			parse_model_id("ollama:nomic-embed-text").unwrap(),
			("ollama", "nomic-embed-text")
		);
		assert!(parse_model_id("no-separator").is_err());
		assert!(parse_model_id(":model").is_err());
		assert!(parse_model_id("provider:").is_err());
	}

	#[test]
	fn fingerprint_ignores_trailing_whitespace_and_line_endings() {
		let a = "def foo():\n    return 1\n";
		let b = "def foo():   \r\n    return 1   \r\n\n";
		assert_eq!(fingerprint(a), fingerprint(b));
	}

	#[test]
	fn fingerprint_is_position_independent() {
		// Identical content hashes identically wherever it appears
		let content = "class Foo:\n    pass";
		assert_eq!(fingerprint(content), fingerprint(content));
		assert_ne!(fingerprint(content), fingerprint("class Bar:\n    pass"));
	}

	#[test]
	fn vector_parsing_rejects_mismatched_counts() {
		let rows = serde_json::json!([[0.1, 0.2]]);
		assert!(parse_embedding_rows(&rows, 2).is_err());
		assert_eq!(
			parse_embedding_rows(&rows, 1).unwrap(),
			vec![vec![0.1f32, 0.2f32]]
		);
	}

	#[test]
	fn token_counting_is_monotonic() {
		let short = count_tokens("hello");
		let long = count_tokens("hello world, this is a longer sentence about code indexing");
		assert!(long > short);
	}
}
