//! OpenAI-compatible embedding client (`POST {endpoint}/embeddings`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use knowdb_core::config::EmbeddingSettings;
use knowdb_core::traits::Embedder;
use knowdb_core::{Error, Result};

use crate::preprocess::{blank_vector, prepare_for_embedding};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    dims: usize,
    max_input_chars: usize,
}

impl OpenAiEmbedder {
    /// Reads the bearer credential from the env var named by `api_key_env`.
    /// A missing key only fails once an embedding is actually requested.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).ok().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %settings.api_key_env, "embedding API key not set");
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: settings.api_key_env.clone(),
            model: settings.model.clone(),
            dims: settings.dimensions,
            max_input_chars: settings.max_input_chars,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn id(&self) -> String {
        format!("openai:{}:d{}", self.model, self.dims)
    }

    fn dim(&self) -> usize {
        self.dims
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// Blank inputs are not sent; they get `blank_vector` like the hashing
    /// backend gives token-free text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let prepared: Vec<String> = texts.iter().map(|t| prepare_for_embedding(t, self.max_input_chars)).collect();
        let sent: Vec<usize> = (0..prepared.len()).filter(|&i| !prepared[i].is_empty()).collect();
        let mut vectors: Vec<Vec<f32>> = prepared.iter().map(|_| blank_vector(self.dims)).collect();
        if sent.len() < prepared.len() {
            tracing::debug!(blank = prepared.len() - sent.len(), "skipping blank embedding inputs");
        }
        if sent.is_empty() {
            return Ok(vectors);
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Operation(format!("{} is not set", self.api_key_env)))?;
        let url = format!("{}/embeddings", self.endpoint);
        let request = EmbeddingRequest {
            model: &self.model,
            input: sent.iter().map(|&i| prepared[i].clone()).collect(),
            dimensions: self.dims,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(Error::operation)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Operation(format!("embedding API error {status}: {body}")));
        }

        let mut result: EmbeddingResponse = response.json().await.map_err(Error::operation)?;
        result.data.sort_by_key(|d| d.index);
        tracing::debug!(inputs = sent.len(), outputs = result.data.len(), "embedding batch returned");
        if result.data.len() != sent.len() {
            return Err(Error::Operation(format!(
                "embedding API returned {} vectors for {} inputs",
                result.data.len(),
                sent.len()
            )));
        }
        for (i, d) in sent.into_iter().zip(result.data) {
            vectors[i] = d.embedding;
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_settings() -> EmbeddingSettings {
        EmbeddingSettings {
            api_key_env: "KNOWDB_TEST_UNSET_API_KEY".into(),
            endpoint: "http://127.0.0.1:9".into(),
            ..EmbeddingSettings::default()
        }
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let embedder = OpenAiEmbedder::from_settings(&offline_settings()).unwrap();
        assert_eq!(embedder.id(), "openai:text-embedding-3-large:d3072");
        let err = embedder.embed_batch(&["hi".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Operation(msg) if msg.contains("KNOWDB_TEST_UNSET_API_KEY")));
    }

    #[tokio::test]
    async fn blank_inputs_never_reach_the_endpoint() {
        let settings = EmbeddingSettings { dimensions: 4, ..offline_settings() };
        let embedder = OpenAiEmbedder::from_settings(&settings).unwrap();
        let vectors = embedder.embed_batch(&[" \n\t ".to_string(), String::new()]).await.unwrap();
        assert_eq!(vectors, vec![blank_vector(4), blank_vector(4)]);

        // one real input still needs the request (and so the key)
        let err = embedder.embed_batch(&["  ".to_string(), "Pump".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Operation(_)));
    }
}
