//! Qdrant REST backend.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{CollectionSpec, IndexError, IndexedVector, Metric, ScoredChunk, VectorIndex};

/// Blocking client for a Qdrant cluster's HTTP API.
#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: String,
}

impl QdrantIndex {
    /// Connects to `base_url`, sending `api_key` in the `api-key` header when given.
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "Qdrant URL must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key).context("invalid Qdrant API key")?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, name: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, name, suffix)
    }

    fn call<T: DeserializeOwned>(&self, operation: &'static str, request: RequestBuilder) -> Result<T, IndexError> {
        let run = || -> Result<T> {
            let resp = request.send().with_context(|| format!("{operation} request"))?;
            let envelope: Envelope<T> = checked(resp)?
                .json()
                .with_context(|| format!("failed to parse Qdrant {operation} response"))?;
            Ok(envelope.result)
        };
        run().map_err(|source| IndexError::backend(operation, source))
    }
}

fn checked(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    anyhow::bail!("Qdrant returned {status}: {body}")
}

fn distance(metric: Metric) -> &'static str {
    match metric {
        Metric::Cosine => "Cosine",
        Metric::Dot => "Dot",
        Metric::Euclid => "Euclid",
    }
}

impl VectorIndex for QdrantIndex {
    fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        let resp = self
            .client
            .get(self.collection_url(name, ""))
            .send()
            .map_err(|err| IndexError::backend("describe collection", err.into()))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => checked(resp)
                .map(|_| true)
                .map_err(|err| IndexError::backend("describe collection", err)),
        }
    }

    fn create_collection(&self, spec: &CollectionSpec) -> Result<(), IndexError> {
        let body = json!({
            "vectors": { "size": spec.dimension, "distance": distance(spec.metric) }
        });
        let _: bool = self.call(
            "create collection",
            self.client.put(self.collection_url(&spec.name, "")).json(&body),
        )?;
        Ok(())
    }

    fn count(&self, name: &str) -> Result<u64, IndexError> {
        let resp = self
            .client
            .post(self.collection_url(name, "/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .map_err(|err| IndexError::backend("count", err.into()))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(IndexError::MissingCollection(name.to_string()));
        }
        let result: CountResult = checked(resp)
            .and_then(|resp| {
                resp.json::<Envelope<CountResult>>()
                    .context("failed to parse Qdrant count response")
            })
            .map(|envelope| envelope.result)
            .map_err(|err| IndexError::backend("count", err))?;
        Ok(result.count)
    }

    fn upsert(&self, name: &str, points: &[IndexedVector]) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = UpsertRequest {
            points: points
                .iter()
                .map(|point| PointStruct {
                    id: point.id.to_string(),
                    vector: &point.embedding,
                    payload: Payload {
                        text: point.chunk_text.clone(),
                        source_url: point.source_url.clone(),
                    },
                })
                .collect(),
        };
        let _: serde_json::Value = self.call(
            "upsert",
            self.client
                .put(self.collection_url(name, "/points?wait=true"))
                .json(&body),
        )?;
        Ok(())
    }

    fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        let hits: Vec<SearchHit> = self.call(
            "search",
            self.client
                .post(self.collection_url(name, "/points/search"))
                .json(&body),
        )?;
        Ok(hits
            .into_iter()
            .map(|hit| ScoredChunk {
                text: hit.payload.text,
                source_url: hit.payload.source_url,
                score: hit.score,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: Vec<PointStruct<'a>>,
}

#[derive(Serialize)]
struct PointStruct<'a> {
    id: String,
    vector: &'a [f32],
    payload: Payload,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Payload {
    #[serde(default)]
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    score: f32,
    #[serde(default)]
    payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_url() {
        assert!(QdrantIndex::new("localhost:6333", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn builds_collection_paths() {
        let index = QdrantIndex::new("http://localhost:6333/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            index.collection_url("site", "/points/search"),
            "http://localhost:6333/collections/site/points/search"
        );
    }

    #[test]
    fn parses_search_envelope() {
        let raw = r#"{"result":[{"id":"a","score":0.91,"payload":{"text":"Revnix was founded in 2020.","source_url":"https://revnix.com/about"}}],"status":"ok","time":0.001}"#;
        let parsed: Envelope<Vec<SearchHit>> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.result.len(), 1);
        assert_eq!(parsed.result[0].payload.text, "Revnix was founded in 2020.");
        assert_eq!(
            parsed.result[0].payload.source_url.as_deref(),
            Some("https://revnix.com/about")
        );
    }
}
