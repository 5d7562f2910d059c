//! Vector index abstraction and in-memory implementation.
//!
//! The [`VectorIndex`] trait defines the storage operations the
//! retrieval pipeline needs: upsert by chunk id, filtered
//! nearest-neighbor query, and filtered delete. Implementations must be
//! `Send + Sync` and atomic at the batch level — a concurrent query may
//! observe a document's entries before or after an `add`/`delete`, but
//! never a partially written or partially deleted document.
//!
//! Every filter carries a mandatory `user_id`, which makes cross-user
//! leakage structurally impossible: there is no way to construct a
//! query or delete that spans users.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::Chunk;

/// One indexed chunk: vector plus the metadata needed for scoping and
/// citation building. Lifetime is tied to the chunk's — both are
/// replaced or deleted together.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub user_id: String,
    pub vector: Vec<f32>,
}

/// Conjunctive access filter: `user_id` equality always applies; the
/// optional doc id set can only narrow the scope further.
#[derive(Debug, Clone)]
pub struct IndexFilter {
    pub user_id: String,
    pub doc_ids: Option<Vec<String>>,
}

impl IndexFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            doc_ids: None,
        }
    }

    pub fn for_docs(user_id: impl Into<String>, doc_ids: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            doc_ids: Some(doc_ids),
        }
    }

    fn matches(&self, entry: &IndexEntry) -> bool {
        if entry.user_id != self.user_id {
            return false;
        }
        match &self.doc_ids {
            Some(ids) => ids.iter().any(|d| d == &entry.chunk.doc_id),
            None => true,
        }
    }
}

/// A query hit: the matching entry and its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub score: f32,
}

/// Storage backend for chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert entries by chunk id. Re-adding an existing chunk id
    /// replaces its vector and metadata; it never duplicates. The whole
    /// batch is applied atomically with respect to concurrent queries.
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Return at most `fetch_k` nearest neighbors by cosine similarity,
    /// restricted to entries matching `filter`, best first.
    async fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        fetch_k: usize,
    ) -> Result<Vec<ScoredEntry>>;

    /// Remove all entries matching `filter`, returning the count
    /// removed. Fully synchronous with subsequent queries: no query
    /// issued after `delete` returns may observe a deleted entry.
    async fn delete(&self, filter: &IndexFilter) -> Result<usize>;

    /// Number of live entries matching `filter`.
    async fn count(&self, filter: &IndexFilter) -> Result<usize>;
}

/// Brute-force in-memory index.
///
/// A single `RwLock` over the chunk-id map gives batch atomicity for
/// free: `add` and `delete` hold the write lock for the whole batch,
/// queries hold the read lock.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| RagError::Index("index lock poisoned".into()))?;
        for entry in entries {
            map.insert(entry.chunk.id.clone(), entry);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        fetch_k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let map = self
            .entries
            .read()
            .map_err(|_| RagError::Index("index lock poisoned".into()))?;

        let mut hits: Vec<ScoredEntry> = map
            .values()
            .filter(|e| filter.matches(e))
            .map(|e| ScoredEntry {
                score: cosine_similarity(vector, &e.vector),
                entry: e.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(fetch_k);
        Ok(hits)
    }

    async fn delete(&self, filter: &IndexFilter) -> Result<usize> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| RagError::Index("index lock poisoned".into()))?;
        let before = map.len();
        map.retain(|_, e| !filter.matches(e));
        Ok(before - map.len())
    }

    async fn count(&self, filter: &IndexFilter) -> Result<usize> {
        let map = self
            .entries
            .read()
            .map_err(|_| RagError::Index("index lock poisoned".into()))?;
        Ok(map.values().filter(|e| filter.matches(e)).count())
    }
}
