//! Tools the answering loop may call, and the text it observes from them.
//!
//! Tools return structured results; only [`Tool::search`] collapses them into the
//! observation string the language model sees.

use crate::index::IndexError;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod retriever;
mod web_search;

pub use retriever::{RetrieverTool, RETRIEVER_EMPTY};
pub use web_search::{SearchHit, SearchProvider, TavilyClient, WebSearchTool};

/// Most sources any tool reports.
pub const MAX_SOURCES: usize = 3;

/// Closed set of tools the agent can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Similarity search over the crawled corpus.
    Retriever,
    /// Web search scoped to the site's domain.
    WebSearch,
}

impl ToolKind {
    /// Every tool, in the order the prompt lists them.
    pub const ALL: [ToolKind; 2] = [ToolKind::Retriever, ToolKind::WebSearch];

    /// Name the model uses in `Action:` lines.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Retriever => "retrieve_site_info",
            ToolKind::WebSearch => "site_web_search",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Action named a tool that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not a valid tool")]
pub struct UnknownTool(pub String);

impl FromStr for ToolKind {
    type Err = UnknownTool;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw
            .trim()
            .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '[' | ']' | '*'))
            .trim();
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownTool(name.to_string()))
    }
}

/// One labeled result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// 1-based position, best first.
    pub rank: usize,
    /// Result text.
    pub text_excerpt: String,
    /// Where the text came from, when known.
    pub origin_url: Option<String>,
}

/// Successful tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// At least one result.
    Sources(Vec<Source>),
    /// The tool ran and found nothing.
    Empty,
}

impl ToolOutput {
    /// Ranks `excerpts` from 1, keeping at most [`MAX_SOURCES`].
    pub fn from_ranked<I>(excerpts: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let sources: Vec<Source> = excerpts
            .into_iter()
            .filter(|(text, _)| !text.trim().is_empty())
            .take(MAX_SOURCES)
            .enumerate()
            .map(|(idx, (text_excerpt, origin_url))| Source {
                rank: idx + 1,
                text_excerpt,
                origin_url,
            })
            .collect();
        if sources.is_empty() {
            ToolOutput::Empty
        } else {
            ToolOutput::Sources(sources)
        }
    }
}

/// Tool failures, reported to the agent as observations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Index lookup failed.
    #[error(transparent)]
    Retrieval(#[from] IndexError),
    /// Search provider failed.
    #[error("{0:#}")]
    Search(#[source] anyhow::Error),
}

/// A callable tool.
pub trait Tool: Send + Sync {
    /// Which tool this is.
    fn kind(&self) -> ToolKind;

    /// One-line description shown in the prompt.
    fn description(&self) -> String;

    /// Runs the tool.
    fn run(&self, query: &str) -> Result<ToolOutput, ToolError>;

    /// Observation used when the tool finds nothing.
    fn empty_message(&self) -> String;

    /// Observation used when the tool fails; always starts with `Error`.
    fn error_message(&self, err: &ToolError) -> String {
        format!("Error: {err}")
    }

    /// Whether rendered sources include their URL.
    fn cites_urls(&self) -> bool {
        false
    }

    /// Renders a result as the text the model observes.
    fn render(&self, result: &Result<ToolOutput, ToolError>) -> String {
        match result {
            Ok(ToolOutput::Sources(sources)) => render_sources(sources, self.cites_urls()),
            Ok(ToolOutput::Empty) => self.empty_message(),
            Err(err) => self.error_message(err),
        }
    }

    /// Runs the tool and renders the outcome; never fails.
    fn search(&self, query: &str) -> String {
        self.render(&self.run(query))
    }
}

/// `[Source i]:` blocks separated by blank lines.
pub fn render_sources(sources: &[Source], with_urls: bool) -> String {
    sources
        .iter()
        .map(|source| {
            let mut block = format!("[Source {}]:\n{}\n", source.rank, source.text_excerpt);
            if let (true, Some(url)) = (with_urls, source.origin_url.as_deref()) {
                block.push_str(&format!("URL: {url}\n"));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tool_names_round_trip_loosely() {
        assert_eq!("retrieve_site_info".parse(), Ok(ToolKind::Retriever));
        assert_eq!(" `Site_Web_Search` ".parse(), Ok(ToolKind::WebSearch));
        assert_eq!(
            "[retrieve_site_info]".parse::<ToolKind>(),
            Ok(ToolKind::Retriever)
        );
        assert_eq!(
            "google".parse::<ToolKind>(),
            Err(UnknownTool("google".into()))
        );
    }

    #[test]
    fn ranks_from_one_and_caps() {
        let output = ToolOutput::from_ranked(
            ["a", "b", " ", "c", "d"]
                .into_iter()
                .map(|t| (t.to_string(), None)),
        );
        let ToolOutput::Sources(sources) = output else {
            panic!("expected sources");
        };
        let ranks: Vec<(usize, &str)> = sources
            .iter()
            .map(|s| (s.rank, s.text_excerpt.as_str()))
            .collect();
        assert_eq!(ranks, vec![(1, "a"), (2, "b"), (3, "c")]);
    }

    #[test]
    fn nothing_ranked_is_empty() {
        assert_eq!(ToolOutput::from_ranked(Vec::new()), ToolOutput::Empty);
    }

    #[test]
    fn renders_labeled_blocks() {
        let sources = vec![
            Source {
                rank: 1,
                text_excerpt: "first".into(),
                origin_url: Some("https://x.com/a".into()),
            },
            Source {
                rank: 2,
                text_excerpt: "second".into(),
                origin_url: None,
            },
        ];
        assert_eq!(
            render_sources(&sources, false),
            "[Source 1]:\nfirst\n\n[Source 2]:\nsecond\n"
        );
        assert_eq!(
            render_sources(&sources, true),
            "[Source 1]:\nfirst\nURL: https://x.com/a\n\n[Source 2]:\nsecond\n"
        );
    }
}
