//! Domain-scoped web search fallback.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{Tool, ToolError, ToolKind, ToolOutput, MAX_SOURCES};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// One web result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Page URL.
    pub url: String,
    /// Snippet relevant to the query.
    pub content: String,
}

/// External web search backend.
pub trait SearchProvider: Send + Sync {
    /// Returns up to `max_results` hits restricted to `include_domains`.
    fn search(
        &self,
        query: &str,
        max_results: usize,
        include_domains: &[String],
    ) -> Result<Vec<SearchHit>>;
}

/// Blocking Tavily API client.
pub struct TavilyClient {
    api_key: String,
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    max_results: usize,
    include_domains: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyClient {
    /// Builds a client; the key must be non-blank.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Tavily API key");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Tavily HTTP client")?;
        Ok(Self {
            api_key: api_key.trim().to_string(),
            client,
            endpoint: TAVILY_ENDPOINT.to_string(),
        })
    }
}

impl SearchProvider for TavilyClient {
    fn search(
        &self,
        query: &str,
        max_results: usize,
        include_domains: &[String],
    ) -> Result<Vec<SearchHit>> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: "basic",
            max_results,
            include_domains,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .context("failed to send Tavily search request")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            anyhow::bail!("Tavily API error {status}: {body}");
        }
        let parsed: TavilyResponse = resp.json().context("failed to parse Tavily response")?;
        Ok(parsed
            .results
            .into_iter()
            .map(SearchHit::from)
            .collect())
    }
}

impl From<TavilyResult> for SearchHit {
    fn from(result: TavilyResult) -> Self {
        Self {
            url: result.url,
            content: result.content,
        }
    }
}

/// Web search restricted to one site, used only after retrieval comes up empty.
pub struct WebSearchTool {
    provider: Box<dyn SearchProvider>,
    domain: String,
}

impl WebSearchTool {
    /// Scopes `provider` to `domain` (a bare host such as `revnix.com`).
    pub fn new(provider: Box<dyn SearchProvider>, domain: impl Into<String>) -> Self {
        Self {
            provider,
            domain: domain.into(),
        }
    }

    /// Domain results are restricted to.
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Tool for WebSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    fn description(&self) -> String {
        format!(
            "Searches ONLY the {} website on the live web. Use it only when the knowledge base returned nothing relevant.",
            self.domain
        )
    }

    fn run(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let hits = self
            .provider
            .search(query, MAX_SOURCES, std::slice::from_ref(&self.domain))
            .map_err(ToolError::Search)?;
        tracing::debug!(hits = hits.len(), domain = %self.domain, "web search finished");
        Ok(ToolOutput::from_ranked(
            hits.into_iter().map(|hit| (hit.content, Some(hit.url))),
        ))
    }

    fn empty_message(&self) -> String {
        format!("No relevant information found on the {} website.", self.domain)
    }

    fn error_message(&self, err: &ToolError) -> String {
        format!("Error during web search: {err}")
    }

    fn cites_urls(&self) -> bool {
        true
    }
}
