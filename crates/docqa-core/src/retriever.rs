//! Diversity-aware retrieval over a [`VectorIndex`].
//!
//! Fetches a candidate pool larger than the requested result count and
//! re-ranks it with Maximal Marginal Relevance:
//!
//! ```text
//! MMR(c) = λ × sim(query, c) − (1−λ) × max(sim(c, selected))
//! ```
//!
//! λ = 1.0 is pure relevance, λ = 0.0 pure diversity. Candidates are
//! selected greedily until `k` are chosen or the pool is exhausted;
//! returning fewer than `k` is not an error.
//!
//! The filter handed to the index always carries the requesting
//! `user_id`; a caller-supplied `doc_ids` set can only narrow that
//! scope, never replace it.

use std::sync::Arc;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::index::{IndexFilter, ScoredEntry, VectorIndex};

/// Retrieval tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetrieverConfig {
    /// Candidate pool multiplier: `fetch_k = k × fetch_factor`.
    pub fetch_factor: usize,
    /// MMR balance, clamped into `[0.0, 1.0]` at use.
    pub mmr_lambda: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            fetch_factor: 3,
            mmr_lambda: 0.5,
        }
    }
}

/// Retrieves the `k` most relevant, mutually diverse chunks for a
/// query vector within one user's scope.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, config: RetrieverConfig) -> Self {
        Self { index, config }
    }

    /// Fetch `k × fetch_factor` candidates, MMR re-rank, return top `k`.
    ///
    /// Scores on the returned entries are the query-candidate cosine
    /// similarities; MMR affects selection order only.
    pub async fn retrieve(
        &self,
        query_vec: &[f32],
        user_id: &str,
        doc_ids: Option<Vec<String>>,
        k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let filter = match doc_ids {
            Some(ids) => IndexFilter::for_docs(user_id, ids),
            None => IndexFilter::for_user(user_id),
        };

        let fetch_k = k.saturating_mul(self.config.fetch_factor.max(1));
        let candidates = self.index.query(query_vec, &filter, fetch_k).await?;

        Ok(mmr_rerank(query_vec, candidates, k, self.config.mmr_lambda))
    }
}

/// Greedy MMR selection over a relevance-ranked candidate pool.
pub fn mmr_rerank(
    query: &[f32],
    candidates: Vec<ScoredEntry>,
    k: usize,
    lambda: f32,
) -> Vec<ScoredEntry> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());

    let mut selected: Vec<ScoredEntry> = Vec::with_capacity(k);
    let mut remaining = candidates;

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let relevance = cosine_similarity(query, &candidate.entry.vector);
            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(&candidate.entry.vector, &s.entry.vector))
                .fold(0.0f32, f32::max);
            let mmr = lambda * relevance - (1.0 - lambda) * redundancy;

            if mmr > best_score {
                best_score = mmr;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}
