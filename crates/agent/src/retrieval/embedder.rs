use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tellr_core::config::EmbeddingConfig;
use tellr_core::errors::CollaboratorError;

use crate::retrieval::Embedder;
use crate::slots::normalize_text;

const COLLABORATOR: &str = "embedder";

/// Deterministic feature-hashing embedder: word unigrams plus character trigrams, hashed with
/// blake3 into a fixed number of signed buckets and L2-normalized. Needs no network, so the
/// CLI, local runs and tests can build an index offline.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(8) }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let normalized = normalize_text(text);

        for word in normalized.split_whitespace() {
            self.add_feature(&mut vector, word.as_bytes(), 1.0);
            let characters: Vec<char> = format!("#{word}#").chars().collect();
            for window in characters.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes(), 0.5);
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = blake3::hash(feature);
        let bytes = hash.as_bytes();
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        Ok(self.embed_text(text))
    }
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint (OpenAI, Ollama).
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    dimensions: usize,
    timeout_ms: u64,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, config: &EmbeddingConfig, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            CollaboratorError::Unavailable {
                collaborator: COLLABORATOR,
                message: format!("failed to build HTTP client: {error}"),
            }
        })?;
        let trimmed = base_url.trim().trim_end_matches('/');
        let endpoint = if trimmed.ends_with("/v1") {
            format!("{trimmed}/embeddings")
        } else {
            format!("{trimmed}/v1/embeddings")
        };
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimensions: config.dimensions,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let mut request =
            self.client.post(&self.endpoint).json(&EmbeddingRequest { model: &self.model, input: text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                CollaboratorError::Timeout { collaborator: COLLABORATOR, after_ms: self.timeout_ms }
            } else {
                CollaboratorError::Unavailable { collaborator: COLLABORATOR, message: error.to_string() }
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let message = format!("http status {}", status.as_u16());
            return Err(if status.is_server_error() {
                CollaboratorError::Unavailable { collaborator: COLLABORATOR, message }
            } else {
                CollaboratorError::Rejected { collaborator: COLLABORATOR, message }
            });
        }

        let parsed = response.json::<EmbeddingResponse>().await.map_err(|error| {
            CollaboratorError::InvalidResponse {
                collaborator: COLLABORATOR,
                message: format!("failed to parse embedding response: {error}"),
            }
        })?;
        first_embedding(parsed, self.dimensions)
    }
}

fn first_embedding(response: EmbeddingResponse, dimensions: usize) -> Result<Vec<f32>, CollaboratorError> {
    let vector = response.data.into_iter().next().map(|item| item.embedding).ok_or_else(|| {
        CollaboratorError::InvalidResponse {
            collaborator: COLLABORATOR,
            message: "embedding response carried no vectors".to_string(),
        }
    })?;
    if vector.len() != dimensions {
        return Err(CollaboratorError::InvalidResponse {
            collaborator: COLLABORATOR,
            message: format!("expected {dimensions} dimensions, got {}", vector.len()),
        });
    }
    Ok(vector)
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tellr_core::config::AppConfig;
    use tellr_core::errors::CollaboratorError;

    use super::{first_embedding, EmbeddingResponse, HashingEmbedder, HttpEmbedder};

    fn cosine(left: &[f32], right: &[f32]) -> f32 {
        left.iter().zip(right).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(256);
        let first = embedder.embed_text("Home loan interest rate");
        let second = embedder.embed_text("home   LOAN interest rate!");
        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn related_text_scores_higher() {
        let embedder = HashingEmbedder::new(512);
        let query = embedder.embed_text("home loan interest rate");
        let related = embedder.embed_text("Interest rates for home loans start at 8.5%");
        let unrelated = embedder.embed_text("Recurring deposit tenure options");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn http_embedder_validates_dimensions() {
        let mut config = AppConfig::default().embedding;
        config.dimensions = 3;
        let embedder = HttpEmbedder::new("http://localhost:11434/", &config, Duration::from_secs(5))
            .expect("build embedder");
        assert_eq!(embedder.endpoint(), "http://localhost:11434/v1/embeddings");

        let ok: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[0.1,0.2,0.3]}]}"#).expect("parse");
        assert_eq!(first_embedding(ok, 3).expect("vector").len(), 3);

        let wrong: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[0.1]}]}"#).expect("parse");
        assert!(matches!(first_embedding(wrong, 3), Err(CollaboratorError::InvalidResponse { .. })));
    }
}
