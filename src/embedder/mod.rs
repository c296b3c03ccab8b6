//! Text embedding backends.

use anyhow::Result;

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::{OpenAiEmbedder, DEFAULT_OPENAI_BASE_URL};

/// Maps text to fixed-length vectors.
///
/// Implementations must return exactly one vector per input, in input order, each of
/// length [`Embedder::dimension`].
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Largest batch accepted by [`Embedder::embed_batch`].
    fn batch_size(&self) -> usize;

    /// Embeds a batch of inputs.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single query string.
    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[query])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for the query"))
    }
}
