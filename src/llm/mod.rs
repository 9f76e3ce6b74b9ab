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

//! LLM access behind a provider trait. Used for query rewriting and answer
//! generation; every call is bounded by the configured timeout and callers
//! are expected to have a deterministic fallback when a call fails.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::embedding::parse_model_id;

#[async_trait]
pub trait AiProvider: Send + Sync {
	async fn chat_completion(
		&self,
		system: &str,
		user: &str,
		temperature: f32,
		max_tokens: usize,
	) -> Result<String>;
}

/// Client bound to one configured model.
pub struct LlmClient {
	provider: Box<dyn AiProvider>,
	model_id: String,
	temperature: f32,
	max_tokens: usize,
}

impl LlmClient {
	pub fn from_config(config: &LlmConfig) -> Result<Self> {
		let (provider_name, model) = parse_model_id(&config.model)?;
		let timeout = Duration::from_secs(config.timeout_secs);
		let provider: Box<dyn AiProvider> = match provider_name {
			"ollama" => Box::new(OllamaChat::new(&config.ollama_base_url, model, timeout)?),
			"openai" => Box::new(OpenAiChat::new(model, timeout)?),
			other => return Err(anyhow!("Unsupported LLM provider: {other}")),
		};
		Ok(Self {
			provider,
			model_id: config.model.clone(),
			temperature: config.temperature,
			max_tokens: config.max_tokens,
		})
	}

	pub fn model_id(&self) -> &str {
		&self.model_id
	}

	pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
		self.provider
			.chat_completion(system, user, self.temperature, self.max_tokens)
			.await
	}
}

pub struct OllamaChat {
	client: reqwest::Client,
	base_url: String,
	model: String,
}

impl OllamaChat {
	pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(timeout)
				.build()
				.context("Failed to build HTTP client")?,
			base_url: base_url.trim_end_matches('/').to_string(),
			model: model.to_string(),
		})
	}
}

#[async_trait]
impl AiProvider for OllamaChat {
	async fn chat_completion(
		&self,
		system: &str,
		user: &str,
		temperature: f32,
		max_tokens: usize,
	) -> Result<String> {
		let url = format!("{}/api/chat", self.base_url);
		let response = self
			.client
			.post(&url)
			.json(&json!({
				"model": self.model,
				"stream": false,
				"messages": [
					{ "role": "system", "content": system },
					{ "role": "user", "content": user },
				],
				"options": { "temperature": temperature, "num_predict": max_tokens },
			}))
			.send()
			.await
			.with_context(|| format!("Chat request to {url} failed"))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(anyhow!("Chat request failed with {status}: {body}"));
		}

		let body: Value = response.json().await.context("Failed to parse chat response")?;
		body["message"]["content"]
			.as_str()
			.map(|s| s.to_string())
			.ok_or_else(|| anyhow!("Chat response missing message content"))
	}
}

pub struct OpenAiChat {
	client: reqwest::Client,
	model: String,
}

impl OpenAiChat {
	pub fn new(model: &str, timeout: Duration) -> Result<Self> {
		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(timeout)
				.build()
				.context("Failed to build HTTP client")?,
			model: model.to_string(),
		})
	}
}

#[async_trait]
impl AiProvider for OpenAiChat {
	async fn chat_completion(
		&self,
		system: &str,
		user: &str,
		temperature: f32,
		max_tokens: usize,
	) -> Result<String> {
		let api_key = std::env::var("OPENAI_API_KEY")
			.context("OPENAI_API_KEY is required for the openai LLM provider")?;
		let response = self
			.client
			.post("https://api.openai.com/v1/chat/completions")
			.bearer_auth(api_key)
			.json(&json!({
				"model": self.model,
				"temperature": temperature,
				"max_tokens": max_tokens,
				"messages": [
					{ "role": "system", "content": system },
					{ "role": "user", "content": user },
				],
			}))
			.send()
			.await
			.context("Chat request to OpenAI failed")?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(anyhow!("Chat request failed with {status}: {body}"));
		}

		let body: Value = response.json().await.context("Failed to parse chat response")?;
		body["choices"][0]["message"]["content"]
			.as_str()
			.map(|s| s.to_string())
			.ok_or_else(|| anyhow!("Chat response missing message content"))
	}
}
