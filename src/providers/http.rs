// omem Providers — HTTP Embedder & Generator
//
// Calls Ollama or OpenAI-compatible APIs to produce embeddings and text.
// Tries the Ollama-native endpoint first, then falls back to the
// OpenAI-compatible route, so one base URL works against Ollama,
// llama.cpp, vLLM, or any gateway speaking either dialect.

use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::providers::{Embedder, Generator};

/// Per-request timeout for embedding calls.
const EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request timeout for generation calls.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Embedding client — Ollama native with OpenAI-compatible fallback.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        HttpEmbedder {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        }
    }

    /// Ollama: POST /api/embed { model, input } → { embeddings: [[f32…]] }
    async fn embed_ollama(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(EMBED_TIMEOUT)
            .send()
            .await
            .map_err(|e| MemoryError::dependency("embedder", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MemoryError::dependency(
                "embedder",
                format!("ollama embed: HTTP {}", resp.status()),
            ));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| MemoryError::dependency("embedder", e.to_string()))?;
        let vec = v["embeddings"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|e| e.as_array())
            .map(|arr| arr.iter().filter_map(|x| x.as_f64().map(|f| f as f32)).collect::<Vec<f32>>())
            .ok_or_else(|| MemoryError::dependency("embedder", "ollama embed: no embeddings in reply"))?;
        Ok(vec)
    }

    /// OpenAI-compatible: POST /v1/embeddings { model, input } →
    /// { data: [{ embedding: [f32…] }] }
    async fn embed_openai(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(EMBED_TIMEOUT)
            .send()
            .await
            .map_err(|e| MemoryError::dependency("embedder", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MemoryError::dependency(
                "embedder",
                format!("openai embed: HTTP {}", resp.status()),
            ));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| MemoryError::dependency("embedder", e.to_string()))?;
        let vec = v["data"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|d| d["embedding"].as_array())
            .map(|arr| arr.iter().filter_map(|x| x.as_f64().map(|f| f as f32)).collect::<Vec<f32>>())
            .ok_or_else(|| MemoryError::dependency("embedder", "openai embed: no data in reply"))?;
        Ok(vec)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let ollama_err = match self.embed_ollama(text).await {
            Ok(vec) => {
                check_dimension(&vec, self.dimension)?;
                return Ok(vec);
            }
            Err(e) => e,
        };

        match self.embed_openai(text).await {
            Ok(vec) => {
                check_dimension(&vec, self.dimension)?;
                Ok(vec)
            }
            Err(openai_err) => Err(MemoryError::dependency(
                "embedder",
                format!("ollama: {ollama_err} | openai: {openai_err}"),
            )),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn check_dimension(vec: &[f32], expected: usize) -> MemoryResult<()> {
    if vec.len() != expected {
        warn!(
            "[providers] Embedding dimension mismatch: got {}, expected {expected}",
            vec.len()
        );
        return Err(MemoryError::dependency(
            "embedder",
            format!("dimension mismatch: {} != {expected}", vec.len()),
        ));
    }
    Ok(())
}

/// Generation client — Ollama native with OpenAI-compatible fallback.
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        HttpGenerator {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Ollama: POST /api/generate { model, prompt, stream: false } →
    /// { response: "…" }
    async fn generate_ollama(&self, prompt: &str) -> MemoryResult<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model, "prompt": prompt, "stream": false });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(GENERATE_TIMEOUT)
            .send()
            .await
            .map_err(|e| MemoryError::dependency("generator", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MemoryError::dependency(
                "generator",
                format!("ollama generate: HTTP {}", resp.status()),
            ));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| MemoryError::dependency("generator", e.to_string()))?;
        v["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MemoryError::dependency("generator", "ollama generate: no response field"))
    }

    /// OpenAI-compatible: POST /v1/chat/completions →
    /// { choices: [{ message: { content } }] }
    async fn generate_openai(&self, prompt: &str) -> MemoryResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(GENERATE_TIMEOUT)
            .send()
            .await
            .map_err(|e| MemoryError::dependency("generator", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MemoryError::dependency(
                "generator",
                format!("openai generate: HTTP {}", resp.status()),
            ));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| MemoryError::dependency("generator", e.to_string()))?;
        v["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|c| c["message"]["content"].as_str())
            .map(str::to_string)
            .ok_or_else(|| MemoryError::dependency("generator", "openai generate: no choices in reply"))
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> MemoryResult<String> {
        let ollama_err = match self.generate_ollama(prompt).await {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };
        match self.generate_openai(prompt).await {
            Ok(reply) => Ok(reply),
            Err(openai_err) => Err(MemoryError::dependency(
                "generator",
                format!("ollama: {ollama_err} | openai: {openai_err}"),
            )),
        }
    }
}
