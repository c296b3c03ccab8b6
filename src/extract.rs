//! HTML to plain-text extraction for the knowledge corpus.
//!
//! Two paths exist. Pages with job-listing containers are reduced to the listings only;
//! every other page keeps headings, paragraphs and list items long enough to carry content.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Blocks at or below this many characters are treated as navigation noise.
pub const MIN_BLOCK_CHARS: usize = 25;

/// Prefix emitted in front of a job container's heading.
pub const JOB_TITLE_PREFIX: &str = "Job Title: ";

const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "header", "footer", "nav",
];

const SCRIPT_TAGS: &[&str] = &["script", "style", "noscript"];

/// Stateless HTML extractor; cheap to clone and reuse across pages.
#[derive(Clone)]
pub struct ContentExtractor {
    selectors: ExtractSelectors,
}

impl ContentExtractor {
    /// Builds an extractor with its selectors compiled once.
    pub fn new() -> Self {
        Self {
            selectors: ExtractSelectors::new(),
        }
    }

    /// Returns the cleaned text of `html`, blocks joined by newlines. Empty means "skip".
    pub fn extract(&self, html: &str) -> String {
        self.extract_blocks(html).join("\n")
    }

    /// Returns the ordered text blocks of `html`.
    pub fn extract_blocks(&self, html: &str) -> Vec<String> {
        self.document_blocks(&Html::parse_document(html))
    }

    /// Same as [`Self::extract_blocks`] for a document the caller already parsed.
    pub fn document_blocks(&self, document: &Html) -> Vec<String> {
        let jobs = self.job_blocks(document);
        if !jobs.is_empty() {
            return jobs;
        }
        self.generic_blocks(document)
    }

    fn job_blocks(&self, document: &Html) -> Vec<String> {
        let mut blocks = Vec::new();
        for container in document.select(&self.selectors.containers) {
            if !is_job_container(&container) {
                continue;
            }
            if let Some(title) = container.select(&self.selectors.job_heading).next() {
                let text = visible_text(&title, SCRIPT_TAGS);
                if !text.is_empty() {
                    blocks.push(format!("{JOB_TITLE_PREFIX}{text}"));
                }
            }
            for selector in [&self.selectors.paragraph, &self.selectors.list_item] {
                blocks.extend(
                    container
                        .select(selector)
                        .map(|element| visible_text(&element, SCRIPT_TAGS))
                        .filter(|text| !text.is_empty()),
                );
            }
        }
        blocks
    }

    fn generic_blocks(&self, document: &Html) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut blocks = Vec::new();
        for element in document.select(&self.selectors.content) {
            if inside_non_content(&element) {
                continue;
            }
            let text = visible_text(&element, NON_CONTENT_TAGS);
            if text.chars().count() <= MIN_BLOCK_CHARS {
                continue;
            }
            if seen.insert(normalize_for_dedup(&text)) {
                blocks.push(text);
            }
        }
        blocks
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct ExtractSelectors {
    containers: Selector,
    job_heading: Selector,
    paragraph: Selector,
    list_item: Selector,
    content: Selector,
}

impl ExtractSelectors {
    fn new() -> Self {
        Self {
            containers: Selector::parse("div, section").expect("container selector"),
            job_heading: Selector::parse("h2, h3, h4").expect("job heading selector"),
            paragraph: Selector::parse("p").expect("paragraph selector"),
            list_item: Selector::parse("li").expect("list item selector"),
            content: Selector::parse("h1, h2, h3, h4, p, li").expect("content selector"),
        }
    }
}

fn is_job_container(element: &ElementRef<'_>) -> bool {
    element
        .value()
        .classes()
        .any(|class| class.to_lowercase().contains("job"))
}

fn inside_non_content(element: &ElementRef<'_>) -> bool {
    NON_CONTENT_TAGS.contains(&element.value().name())
        || element.ancestors().any(|node| {
            node.value()
                .as_element()
                .is_some_and(|el| NON_CONTENT_TAGS.contains(&el.name()))
        })
}

/// Text of `element`, leaving out anything nested under one of `hidden_tags`.
fn visible_text(element: &ElementRef<'_>, hidden_tags: &[&str]) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| hidden_tags.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        raw.push(' ');
        raw.push_str(text);
    }
    collapse_whitespace(&raw)
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, whitespace-collapsed form used for block and page deduplication.
pub fn normalize_for_dedup(text: &str) -> String {
    collapse_whitespace(&text.to_lowercase())
}
