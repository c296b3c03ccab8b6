//! Brute-force in-process index.

use super::{CollectionSpec, IndexError, IndexedVector, ScoredChunk, VectorIndex};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

struct Collection {
    spec: CollectionSpec,
    points: Vec<IndexedVector>,
    positions: HashMap<Uuid, usize>,
}

/// Exhaustive-scan index kept in memory; contents vanish with the process.
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    /// Creates an index with no collections.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> IndexError {
    IndexError::backend("lock", anyhow::anyhow!("memory index lock poisoned"))
}

impl VectorIndex for MemoryIndex {
    fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.collections.read().map_err(|_| poisoned())?.contains_key(name))
    }

    fn create_collection(&self, spec: &CollectionSpec) -> Result<(), IndexError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections
            .entry(spec.name.clone())
            .or_insert_with(|| Collection {
                spec: spec.clone(),
                points: Vec::new(),
                positions: HashMap::new(),
            });
        Ok(())
    }

    fn count(&self, name: &str) -> Result<u64, IndexError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        collections
            .get(name)
            .map(|c| c.points.len() as u64)
            .ok_or_else(|| IndexError::MissingCollection(name.to_string()))
    }

    fn upsert(&self, name: &str, points: &[IndexedVector]) -> Result<(), IndexError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::MissingCollection(name.to_string()))?;
        for point in points {
            if point.embedding.len() != collection.spec.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: collection.spec.dimension,
                    actual: point.embedding.len(),
                });
            }
            match collection.positions.get(&point.id) {
                Some(&slot) => collection.points[slot] = point.clone(),
                None => {
                    collection.positions.insert(point.id, collection.points.len());
                    collection.points.push(point.clone());
                }
            }
        }
        Ok(())
    }

    fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::MissingCollection(name.to_string()))?;
        let metric = collection.spec.metric;
        let mut hits: Vec<ScoredChunk> = collection
            .points
            .iter()
            .map(|point| ScoredChunk {
                text: point.chunk_text.clone(),
                source_url: point.source_url.clone(),
                score: metric.relevance(vector, &point.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}
