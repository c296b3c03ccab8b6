//! Breadth-first, single-site crawl engine.
//!
//! The engine owns no mutable state of its own: every run threads a [`CrawlState`] through
//! [`Crawler::step`], which processes exactly one queued URL. A page that fails to fetch,
//! extracts to nothing, or duplicates earlier content is skipped and the crawl moves on.

use crate::canonical::{self, canonicalize};
use crate::controls::CrawlControls;
use crate::corpus::{ContentDigest, CorpusError, CorpusWriter, PageRecord};
use crate::extract::ContentExtractor;
use crate::fetch::{FetchedPage, PageFetcher};
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Mutable bookkeeping for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlState {
    visited: HashSet<String>,
    visit_order: Vec<String>,
    queue: VecDeque<String>,
    seen_hashes: HashSet<ContentDigest>,
}

impl CrawlState {
    /// Fresh state with only the start URL queued.
    pub fn new(start_url: &Url) -> Self {
        Self {
            visited: HashSet::new(),
            visit_order: Vec::new(),
            queue: VecDeque::from([start_url.to_string()]),
            seen_hashes: HashSet::new(),
        }
    }

    /// Canonical URLs in the order they were first processed.
    pub fn visit_order(&self) -> &[String] {
        &self.visit_order
    }

    /// True when `canonical_url` has already been processed.
    pub fn is_visited(&self, canonical_url: &str) -> bool {
        self.visited.contains(canonical_url)
    }

    /// Number of URLs waiting in the queue (duplicates included).
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of distinct page texts written so far.
    pub fn unique_hashes(&self) -> usize {
        self.seen_hashes.len()
    }

    /// True once the queue is drained.
    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Why a dequeued URL produced no corpus record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Canonical form was already processed.
    AlreadyVisited,
    /// Tag/category archive or a URL with a query string.
    Noise,
    /// Canonical form is not an absolute URL.
    Unparseable,
    /// The page cap was reached; the remaining queue is dropped.
    PageCapReached,
    /// Transport failure or timeout.
    FetchFailed,
    /// Non-2xx response.
    HttpStatus(u16),
    /// Extraction yielded no text.
    EmptyContent,
    /// Normalized text matches a page already written.
    DuplicateContent,
}

/// Result of one engine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The queue is empty; the crawl is finished.
    Idle,
    /// The URL was consumed without writing a record.
    Skipped {
        /// Raw URL as dequeued.
        url: String,
        /// Why it was skipped.
        reason: SkipReason,
    },
    /// A record was appended for the page.
    Written {
        /// Canonical URL of the record.
        url: String,
        /// Internal links queued from the page.
        queued_links: usize,
    },
}

/// Aggregate counters for a finished crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Distinct canonical URLs processed.
    pub pages_visited: usize,
    /// Distinct page texts seen.
    pub unique_hashes: usize,
    /// Records appended to the corpus.
    pub records_written: usize,
    /// Transport failures and non-2xx responses.
    pub fetch_failures: usize,
    /// Pages with nothing worth extracting.
    pub empty_pages: usize,
    /// Pages dropped because their text was already written.
    pub duplicate_pages: usize,
    /// Noise URLs skipped before fetching.
    pub noise_skips: usize,
    /// Dequeued URLs that were already visited.
    pub revisits_skipped: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl CrawlReport {
    fn record(&mut self, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Idle => {}
            StepOutcome::Written { .. } => self.records_written += 1,
            StepOutcome::Skipped { reason, .. } => match reason {
                SkipReason::AlreadyVisited => self.revisits_skipped += 1,
                SkipReason::Noise | SkipReason::Unparseable => self.noise_skips += 1,
                SkipReason::FetchFailed | SkipReason::HttpStatus(_) => self.fetch_failures += 1,
                SkipReason::EmptyContent => self.empty_pages += 1,
                SkipReason::DuplicateContent => self.duplicate_pages += 1,
                SkipReason::PageCapReached => {}
            },
        }
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- crawl report ({:.2}s) ---", self.elapsed.as_secs_f32())?;
        writeln!(f, "total unique pages: {}", self.pages_visited)?;
        writeln!(f, "total unique knowledge blocks: {}", self.unique_hashes)?;
        writeln!(f, "records written: {}", self.records_written)?;
        writeln!(f, "fetch failures: {}", self.fetch_failures)?;
        writeln!(f, "empty pages: {}", self.empty_pages)?;
        writeln!(f, "duplicate content skips: {}", self.duplicate_pages)?;
        writeln!(f, "noise skips: {}", self.noise_skips)?;
        write!(f, "revisit skips: {}", self.revisits_skipped)
    }
}

/// Crawl engine bound to one site and one fetcher.
pub struct Crawler<F> {
    fetcher: F,
    controls: CrawlControls,
    extractor: ContentExtractor,
    links: Selector,
}

impl<F: PageFetcher> Crawler<F> {
    /// Builds an engine for the site described by `controls`.
    pub fn new(fetcher: F, controls: CrawlControls) -> Self {
        Self {
            fetcher,
            controls,
            extractor: ContentExtractor::new(),
            links: Selector::parse("a[href]").expect("anchor selector"),
        }
    }

    /// Controls this engine was built with.
    pub fn controls(&self) -> &CrawlControls {
        &self.controls
    }

    /// Crawls until the queue drains, appending each unique page to `corpus`.
    pub fn run<W: Write>(&self, corpus: &mut CorpusWriter<W>) -> Result<CrawlReport, CorpusError> {
        let mut state = CrawlState::new(self.controls.start_url());
        self.run_with(&mut state, corpus)
    }

    /// Same as [`Self::run`], driving caller-owned state.
    pub fn run_with<W: Write>(
        &self,
        state: &mut CrawlState,
        corpus: &mut CorpusWriter<W>,
    ) -> Result<CrawlReport, CorpusError> {
        let started = Instant::now();
        let mut report = CrawlReport::default();
        loop {
            let outcome = self.step(state, corpus)?;
            if outcome == StepOutcome::Idle {
                break;
            }
            report.record(&outcome);
        }
        report.pages_visited = state.visited.len();
        report.unique_hashes = state.seen_hashes.len();
        report.elapsed = started.elapsed();
        info!(
            pages = report.pages_visited,
            records = report.records_written,
            failures = report.fetch_failures,
            "crawl finished"
        );
        Ok(report)
    }

    /// Processes the URL at the front of the queue.
    ///
    /// Only corpus I/O errors are returned; every per-page problem becomes a skip.
    pub fn step<W: Write>(
        &self,
        state: &mut CrawlState,
        corpus: &mut CorpusWriter<W>,
    ) -> Result<StepOutcome, CorpusError> {
        let Some(raw) = state.queue.pop_front() else {
            return Ok(StepOutcome::Idle);
        };
        let skip = |reason| {
            Ok(StepOutcome::Skipped {
                url: raw.clone(),
                reason,
            })
        };

        let canonical = canonicalize(&raw);
        if state.visited.contains(&canonical) {
            return skip(SkipReason::AlreadyVisited);
        }
        if canonical::is_noise(&raw) || canonical::is_noise(&canonical) {
            debug!(url = %raw, "skipping noise page");
            return skip(SkipReason::Noise);
        }
        let Ok(url) = Url::parse(&canonical) else {
            debug!(url = %raw, "skipping unparseable url");
            return skip(SkipReason::Unparseable);
        };
        if let Some(max) = self.controls.max_pages() {
            if state.visited.len() >= max {
                info!(max, dropped = state.queue.len(), "page cap reached");
                state.queue.clear();
                return skip(SkipReason::PageCapReached);
            }
        }

        state.visited.insert(canonical.clone());
        state.visit_order.push(canonical.clone());
        info!(url = %canonical, "scraping");

        let page = match self.fetcher.fetch(&url) {
            Ok(page) => page,
            Err(err) => {
                warn!(url = %canonical, error = %err, "fetch failed");
                return skip(SkipReason::FetchFailed);
            }
        };
        if !page.is_success() {
            warn!(url = %canonical, status = page.status, "non-success status");
            return skip(SkipReason::HttpStatus(page.status));
        }

        let document = Html::parse_document(&page.body);
        let text = self.extractor.document_blocks(&document).join("\n");
        if text.is_empty() {
            debug!(url = %canonical, "no extractable content");
            return skip(SkipReason::EmptyContent);
        }
        let record = PageRecord::new(canonical.clone(), text);
        if !state.seen_hashes.insert(record.content_hash) {
            debug!(url = %canonical, hash = %record.content_hash, "duplicate content");
            return skip(SkipReason::DuplicateContent);
        }
        corpus.append(&record)?;

        let mut queued_links = 0;
        for link in self.internal_links(&document, &page) {
            if !state.visited.contains(&canonical::from_url(&link)) {
                state.queue.push_back(link.into());
                queued_links += 1;
            }
        }
        debug!(url = %canonical, queued_links, "page written");

        let delay = self.controls.politeness_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(StepOutcome::Written {
            url: canonical,
            queued_links,
        })
    }

    /// Same-site links in document order, resolved against the page URL.
    fn internal_links(&self, document: &Html, page: &FetchedPage) -> Vec<Url> {
        let site = self.controls.start_url();
        document
            .select(&self.links)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter_map(|href| page.url.join(href.trim()).ok())
            .filter(|candidate| canonical::is_internal(candidate, site))
            .collect()
    }
}
