//! Crawl throttle and scope controls plus the command-line surface that builds them.

use crate::fetch::DEFAULT_USER_AGENT;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Tunable knobs that bound one crawl run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlControls {
    start_url: Url,
    politeness_delay: Duration,
    request_timeout: Duration,
    max_pages: Option<usize>,
    user_agent: String,
}

impl CrawlControls {
    /// Controls for crawling the site rooted at `start_url`, with default pacing.
    pub fn new(start_url: Url) -> Self {
        Self {
            start_url,
            politeness_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(15),
            max_pages: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Overrides the pause taken after each written page.
    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    /// Overrides the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Caps the number of pages marked visited.
    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Overrides the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Seed URL; its host defines which links are internal.
    pub fn start_url(&self) -> &Url {
        &self.start_url
    }

    /// Time to wait after each successfully processed page.
    pub fn politeness_delay(&self) -> Duration {
        self.politeness_delay
    }

    /// Bound on a single fetch.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Optional safety cap on visited pages.
    pub fn max_pages(&self) -> Option<usize> {
        self.max_pages
    }

    /// User-Agent sent with each request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Crawl flags shared by binaries that run the crawl engine.
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Root URL of the site to crawl
    #[arg(long, env = "SITESAGE_START_URL")]
    pub start_url: Url,

    /// Corpus file written by the crawl
    #[arg(long, env = "SITESAGE_CORPUS", default_value = "site_corpus.txt")]
    pub output: PathBuf,

    /// Milliseconds to pause after each written page
    #[arg(long, env = "SITESAGE_POLITENESS_MS", default_value_t = 1000)]
    pub politeness_ms: u64,

    /// Seconds before a page fetch is abandoned
    #[arg(long, env = "SITESAGE_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Stop after visiting this many pages
    #[arg(long, env = "SITESAGE_MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// User-Agent header sent with each request
    #[arg(long, env = "SITESAGE_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl CrawlArgs {
    /// Converts the parsed flags into `CrawlControls`.
    pub fn build_controls(&self) -> CrawlControls {
        CrawlControls::new(self.start_url.clone())
            .with_politeness_delay(Duration::from_millis(self.politeness_ms))
            .with_request_timeout(Duration::from_secs(self.timeout_secs.max(1)))
            .with_max_pages(self.max_pages.filter(|max| *max > 0))
            .with_user_agent(self.user_agent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        crawl: CrawlArgs,
    }

    #[test]
    fn builds_controls_from_flags() {
        let harness = Harness::parse_from([
            "crawl",
            "--start-url",
            "https://revnix.com",
            "--politeness-ms",
            "0",
            "--max-pages",
            "0",
        ]);
        let controls = harness.crawl.build_controls();
        assert_eq!(controls.start_url().as_str(), "https://revnix.com/");
        assert_eq!(controls.politeness_delay(), Duration::ZERO);
        assert_eq!(controls.request_timeout(), Duration::from_secs(15));
        assert_eq!(controls.max_pages(), None);
        assert_eq!(controls.user_agent(), DEFAULT_USER_AGENT);
    }
}
