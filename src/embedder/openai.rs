//! OpenAI-compatible `/embeddings` client.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::Embedder;

/// Default base URL for the hosted API.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Blocking embeddings client with retry on throttling and server errors.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a client for `model`, asking the API for `dimension`-long vectors.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        anyhow::ensure!(dimension > 0, "embedding dimension must be positive");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embeddings HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimension,
            max_retries: 4,
            batch_size: 64,
        })
    }

    /// Overrides how many attempts a batch gets before failing.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Overrides the largest batch sent in one request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn request_once(&self, inputs: &[&str]) -> Result<Attempt> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimension,
        };
        let resp = match self.client.post(&self.endpoint).json(&request).send() {
            Ok(resp) => resp,
            Err(err) if is_retryable_error(&err) => return Ok(Attempt::Retry(err.to_string())),
            Err(err) => return Err(err.into()),
        };
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            if should_retry(status) {
                return Ok(Attempt::Retry(format!("{status}: {body}")));
            }
            anyhow::bail!("embeddings request failed ({status}): {body}");
        }
        let mut parsed: EmbeddingResponse = resp
            .json()
            .context("failed to parse embeddings response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            parsed.data.len() == inputs.len(),
            "embeddings API returned {} vectors for {} inputs",
            parsed.data.len(),
            inputs.len()
        );
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|e| e.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            anyhow::bail!(
                "embeddings API returned {} dimensions, expected {}",
                bad.len(),
                self.dimension
            );
        }
        Ok(Attempt::Done(vectors))
    }
}

enum Attempt {
    Done(Vec<Vec<f32>>),
    Retry(String),
}

impl Embedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            inputs.len() <= self.batch_size,
            "batch of {} exceeds configured max {}",
            inputs.len(),
            self.batch_size
        );
        let mut attempt = 0usize;
        loop {
            match self.request_once(inputs)? {
                Attempt::Done(vectors) => return Ok(vectors),
                Attempt::Retry(reason) if attempt + 1 < self.max_retries => {
                    attempt += 1;
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(attempt, ?backoff, %reason, "retrying embeddings batch");
                    thread::sleep(backoff);
                }
                Attempt::Retry(reason) => {
                    anyhow::bail!("embeddings request gave up after {} attempts: {reason}", attempt + 1)
                }
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
