//! Vector index store: one collection, populated once, queried by similarity.
//!
//! [`IndexStore`] owns an [`Embedder`] and a [`VectorIndex`] backend. Ingestion is guarded
//! at the collection level: if the collection already holds any points, the whole batch is
//! skipped. That guard is a population probe followed by a bulk write and is not safe
//! against two initializers racing on an empty collection.

use crate::chunker::Chunk;
use crate::embedder::Embedder;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod qdrant;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "site-assistant-index";

/// Similarity metric configured on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum Metric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Raw dot product.
    Dot,
    /// Euclidean distance.
    Euclid,
}

impl Metric {
    /// Relevance of `candidate` to `query`; larger is always better.
    ///
    /// Euclidean distance is negated so every metric sorts the same way.
    pub fn relevance(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Metric::Dot => dot(query, candidate),
            Metric::Cosine => {
                let denom = norm(query) * norm(candidate);
                if denom == 0.0 {
                    0.0
                } else {
                    dot(query, candidate) / denom
                }
            }
            Metric::Euclid => -query
                .iter()
                .zip(candidate)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Name, vector size and metric of the backing collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,
    /// Vector dimension.
    pub dimension: usize,
    /// Similarity metric.
    pub metric: Metric,
}

/// One stored chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    /// Random id assigned at ingestion.
    pub id: Uuid,
    /// Chunk embedding.
    pub embedding: Vec<f32>,
    /// Original chunk text.
    pub chunk_text: String,
    /// Page the chunk came from, if known.
    pub source_url: Option<String>,
}

/// Query hit, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Original chunk text.
    pub text: String,
    /// Page the chunk came from, if known.
    pub source_url: Option<String>,
    /// Backend relevance score.
    pub score: f32,
}

/// Index failures. None are retried.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Turning text into vectors failed.
    #[error("embedding failed: {0:#}")]
    Embedding(#[source] anyhow::Error),
    /// The vector backend rejected or failed a request.
    #[error("vector index {operation} failed: {source:#}")]
    Backend {
        /// Backend call that failed.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
    /// A vector did not match the collection dimension.
    #[error("vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch {
        /// Collection dimension.
        expected: usize,
        /// Offending vector length.
        actual: usize,
    },
    /// The named collection does not exist.
    #[error("collection {0} does not exist")]
    MissingCollection(String),
}

impl IndexError {
    pub(crate) fn backend(operation: &'static str, source: anyhow::Error) -> Self {
        IndexError::Backend { operation, source }
    }
}

/// Nearest-neighbour store holding named collections.
pub trait VectorIndex: Send + Sync {
    /// True if the collection exists.
    fn collection_exists(&self, name: &str) -> Result<bool, IndexError>;
    /// Creates the collection; callers check existence first.
    fn create_collection(&self, spec: &CollectionSpec) -> Result<(), IndexError>;
    /// Exact number of stored points.
    fn count(&self, name: &str) -> Result<u64, IndexError>;
    /// Writes points and waits until they are searchable.
    fn upsert(&self, name: &str, points: &[IndexedVector]) -> Result<(), IndexError>;
    /// Returns up to `limit` nearest points, best first.
    fn search(&self, name: &str, vector: &[f32], limit: usize)
        -> Result<Vec<ScoredChunk>, IndexError>;
}

/// Result of [`IndexStore::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestReport {
    /// The collection was already populated; nothing was written.
    Skipped {
        /// Points found in the collection.
        existing: u64,
    },
    /// Chunks were embedded and written.
    Inserted {
        /// Points written.
        count: usize,
    },
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestReport::Skipped { existing } => {
                write!(f, "index already populated with {existing} vectors; ingestion skipped")
            }
            IngestReport::Inserted { count } => write!(f, "indexed {count} chunks"),
        }
    }
}

const MAX_UPSERT_BATCH: usize = 128;

/// Embedder plus backend bound to one collection.
pub struct IndexStore {
    backend: Box<dyn VectorIndex>,
    embedder: Box<dyn Embedder>,
    collection: CollectionSpec,
}

impl IndexStore {
    /// Binds `backend` and `embedder` to collection `name`; the dimension comes from the embedder.
    pub fn new(
        backend: Box<dyn VectorIndex>,
        embedder: Box<dyn Embedder>,
        name: impl Into<String>,
        metric: Metric,
    ) -> Self {
        let collection = CollectionSpec {
            name: name.into(),
            dimension: embedder.dimension(),
            metric,
        };
        Self {
            backend,
            embedder,
            collection,
        }
    }

    /// Collection this store reads and writes.
    pub fn collection(&self) -> &CollectionSpec {
        &self.collection
    }

    /// Creates the collection if it is absent. Safe to call repeatedly.
    pub fn ensure_collection(&self) -> Result<(), IndexError> {
        if self.backend.collection_exists(&self.collection.name)? {
            tracing::debug!(collection = %self.collection.name, "collection already exists");
            return Ok(());
        }
        tracing::info!(
            collection = %self.collection.name,
            dimension = self.collection.dimension,
            metric = ?self.collection.metric,
            "creating collection"
        );
        self.backend.create_collection(&self.collection)
    }

    /// Number of vectors currently stored.
    pub fn count(&self) -> Result<u64, IndexError> {
        self.backend.count(&self.collection.name)
    }

    /// Embeds and writes every chunk, unless the collection already holds any points.
    pub fn ingest(&self, chunks: &[Chunk]) -> Result<IngestReport, IndexError> {
        let existing = self.count()?;
        if existing > 0 {
            tracing::info!(existing, "collection already populated, skipping ingestion");
            return Ok(IngestReport::Skipped { existing });
        }
        let batch_size = self.embedder.batch_size().clamp(1, MAX_UPSERT_BATCH);
        let mut written = 0usize;
        for batch in chunks.chunks(batch_size) {
            let inputs: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&inputs)
                .map_err(IndexError::Embedding)?;
            let points = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    self.check_dimension(&embedding)?;
                    Ok(IndexedVector {
                        id: Uuid::new_v4(),
                        embedding,
                        chunk_text: chunk.text.clone(),
                        source_url: chunk.source_metadata.source_url.clone(),
                    })
                })
                .collect::<Result<Vec<_>, IndexError>>()?;
            self.backend.upsert(&self.collection.name, &points)?;
            written += points.len();
            tracing::debug!(written, total = chunks.len(), "upserted batch");
        }
        tracing::info!(count = written, collection = %self.collection.name, "ingestion complete");
        Ok(IngestReport::Inserted { count: written })
    }

    /// Returns the `k` chunks nearest to `text`, best first.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self
            .embedder
            .embed_query(text)
            .map_err(IndexError::Embedding)?;
        self.check_dimension(&vector)?;
        self.backend.search(&self.collection.name, &vector, k)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() == self.collection.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.collection.dimension,
                actual: vector.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkMetadata;
    use crate::embedder::HashingEmbedder;
    use pretty_assertions::assert_eq;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_metadata: ChunkMetadata::default(),
        }
    }

    fn store() -> IndexStore {
        IndexStore::new(
            Box::new(MemoryIndex::new()),
            Box::new(HashingEmbedder::new(64)),
            "test",
            Metric::Cosine,
        )
    }

    #[test]
    fn ensure_collection_is_idempotent() {
        let store = store();
        store.ensure_collection().unwrap();
        store.ensure_collection().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn second_ingest_is_skipped() {
        let store = store();
        store.ensure_collection().unwrap();
        let first = store
            .ingest(&[chunk("alpha beta"), chunk("gamma delta")])
            .unwrap();
        assert_eq!(first, IngestReport::Inserted { count: 2 });
        let second = store.ingest(&[chunk("epsilon")]).unwrap();
        assert_eq!(second, IngestReport::Skipped { existing: 2 });
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn query_before_collection_exists_fails() {
        let err = store().query("anything", 3).unwrap_err();
        assert!(matches!(err, IndexError::MissingCollection(_)));
    }

    #[test]
    fn euclid_prefers_closer_vectors() {
        let near = Metric::Euclid.relevance(&[0.0, 0.0], &[0.1, 0.0]);
        let far = Metric::Euclid.relevance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!(near > far);
        assert_eq!(far, -5.0);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(Metric::Cosine.relevance(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
