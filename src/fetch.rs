//! Page fetching behind a small trait so the crawl engine can run without a network.

use reqwest::blocking::Client;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default identity sent with every crawl request.
pub const DEFAULT_USER_AGENT: &str = "SiteSageKnowledgeBot/1.0";

/// Raw page body plus the status it was served with.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the body was served from, after redirects; links resolve against it.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Decoded response body.
    pub body: String,
}

impl FetchedPage {
    /// True for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failures; HTTP error statuses are reported through [`FetchedPage::status`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body read failure.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// URL being fetched.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// No page is known for the URL (in-memory fetchers only).
    #[error("no page registered for {0}")]
    NotFound(String),
}

/// Anything that can turn a URL into a page body.
pub trait PageFetcher {
    /// Fetches one page; non-2xx statuses are returned, not raised.
    fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// Blocking HTTP fetcher with a fixed timeout and a bounded redirect chain.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds the underlying client.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url.as_str()).send().map_err(transport)?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response.text().map_err(transport)?;
        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }
}

/// Fixed map of canonical URL to `(status, body)`, for tests and offline replays.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, (u16, String)>,
}

impl StaticFetcher {
    /// Creates an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a 200 response.
    pub fn with_page(self, url: &str, body: impl Into<String>) -> Self {
        self.with_status(url, 200, body)
    }

    /// Registers a response with an explicit status.
    pub fn with_status(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.pages
            .insert(crate::canonical::canonicalize(url), (status, body.into()));
        self
    }
}

impl PageFetcher for StaticFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let key = crate::canonical::from_url(url);
        let (status, body) = self
            .pages
            .get(&key)
            .ok_or_else(|| FetchError::NotFound(key.clone()))?;
        Ok(FetchedPage {
            url: url.clone(),
            status: *status,
            body: body.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_fetcher_matches_canonical_form() {
        let fetcher = StaticFetcher::new()
            .with_page("https://x.com/about/", "<p>about</p>")
            .with_status("https://x.com/gone", 404, "");
        let about = fetcher
            .fetch(&Url::parse("https://x.com/about").unwrap())
            .expect("registered page");
        assert!(about.is_success());
        let gone = fetcher
            .fetch(&Url::parse("https://x.com/gone").unwrap())
            .expect("registered page");
        assert!(!gone.is_success());
        assert!(matches!(
            fetcher.fetch(&Url::parse("https://x.com/missing").unwrap()),
            Err(FetchError::NotFound(_))
        ));
    }
}
