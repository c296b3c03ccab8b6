//! Knowledge-base retrieval tool.

use super::{Tool, ToolError, ToolKind, ToolOutput, MAX_SOURCES};
use crate::index::IndexStore;

/// Observation returned when the index has nothing for the query.
pub const RETRIEVER_EMPTY: &str = "No relevant information found in the knowledge base.";

/// Top-k similarity search over the indexed corpus.
pub struct RetrieverTool {
    store: IndexStore,
    top_k: usize,
    site_name: String,
}

impl RetrieverTool {
    /// Wraps `store`, returning at most `top_k` (capped at three) chunks per query.
    pub fn new(store: IndexStore, top_k: usize, site_name: impl Into<String>) -> Self {
        Self {
            store,
            top_k: top_k.clamp(1, MAX_SOURCES),
            site_name: site_name.into(),
        }
    }

    /// Backing store.
    pub fn store(&self) -> &IndexStore {
        &self.store
    }
}

impl Tool for RetrieverTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Retriever
    }

    fn description(&self) -> String {
        format!(
            "Searches the {} knowledge base built from the crawled website. \
             Use it first for any question about the company, its products, services, team or careers.",
            self.site_name
        )
    }

    fn run(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let hits = self.store.query(query, self.top_k)?;
        tracing::debug!(hits = hits.len(), "retriever query finished");
        Ok(ToolOutput::from_ranked(
            hits.into_iter().map(|hit| (hit.text, hit.source_url)),
        ))
    }

    fn empty_message(&self) -> String {
        RETRIEVER_EMPTY.to_string()
    }

    fn error_message(&self, err: &ToolError) -> String {
        format!("Error retrieving information: {err}")
    }
}
