//! Retrieval scoring: ranks memory nodes against a focal query by
//! recency, importance, and relevance, each min-max normalized over the
//! candidate set and combined under fixed global weights.
//!
//! Scoring is pure and the final ordering is fully deterministic; the
//! only concession to scale is an optional worker pool that fans the
//! per-node scoring out before the serial sort.

use contracts::ConceptKind;
use rayon::prelude::*;

use crate::memory::{EmbeddingCache, MemoryStore};

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Per-position recency decay; closer to 1.0 flattens the axis.
    pub decay: f64,
    pub recency_weight: f64,
    pub relevance_weight: f64,
    pub importance_weight: f64,
    /// Outer weights applied to (recency, relevance, importance).
    /// Importance dominates, then relevance, then recency.
    pub global_weights: [f64; 3],
    pub top_n: usize,
    /// Candidate count below which scoring stays on the calling thread.
    pub parallel_threshold: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            decay: 0.995,
            recency_weight: 1.0,
            relevance_weight: 1.0,
            importance_weight: 1.0,
            global_weights: [0.5, 2.0, 3.0],
            top_n: 30,
            parallel_threshold: 256,
        }
    }
}

/// One candidate with its normalized axis scores, for inspection and
/// tests; `retrieve` is a thin ranking layer over this.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub node_id: u64,
    /// Index in insertion order among the candidates.
    pub position: usize,
    pub recency: f64,
    pub relevance: f64,
    pub importance: f64,
    pub score: f64,
}

#[derive(Debug)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
    pool: Option<rayon::ThreadPool>,
}

impl RetrievalEngine {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config, pool: None }
    }

    /// Attach a worker pool for scoring large candidate sets. Pool build
    /// failure falls back to serial scoring.
    pub fn with_worker_threads(config: RetrievalConfig, threads: usize) -> Self {
        let pool = if threads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .ok()
        } else {
            None
        };
        Self { config, pool }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rank every non-idle event/thought node against the focal query and
    /// return the top-N ids, best first, marking each returned node as
    /// accessed at `now`. Ties resolve to earlier insertion.
    pub fn retrieve(
        &self,
        store: &mut MemoryStore,
        cache: &EmbeddingCache,
        focal: &str,
        now: u64,
    ) -> Vec<u64> {
        let mut scored = self.scored(store, cache, focal);
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.position.cmp(&b.position))
        });
        scored.truncate(self.config.top_n);
        let ids = scored.into_iter().map(|c| c.node_id).collect::<Vec<_>>();
        for id in &ids {
            store.touch(*id, now);
        }
        ids
    }

    /// Normalized axis scores for every candidate, in insertion order.
    pub fn scored(
        &self,
        store: &MemoryStore,
        cache: &EmbeddingCache,
        focal: &str,
    ) -> Vec<ScoredCandidate> {
        let candidates = store
            .nodes_in_order()
            .filter(|node| matches!(node.kind, ConceptKind::Event | ConceptKind::Thought))
            .filter(|node| !node.is_idle())
            .map(|node| (node.node_id, node.poignancy, node.embedding_key.clone()))
            .collect::<Vec<_>>();
        let count = candidates.len();
        if count == 0 {
            return Vec::new();
        }

        let query_embedding = cache.get(focal);
        let relevance_of = |embedding_key: &str| -> f64 {
            match (query_embedding, cache.get(embedding_key)) {
                (Some(query), Some(node)) => cosine_similarity(query, node),
                // A missing vector contributes the axis floor; with no
                // query vector at all the whole axis ties to the midpoint.
                _ => 0.0,
            }
        };

        let relevance_raw = match &self.pool {
            Some(pool) if count >= self.config.parallel_threshold => pool.install(|| {
                candidates
                    .par_iter()
                    .map(|(_, _, key)| relevance_of(key))
                    .collect::<Vec<_>>()
            }),
            _ => candidates
                .iter()
                .map(|(_, _, key)| relevance_of(key))
                .collect(),
        };

        let recency_raw = (0..count)
            .map(|position| self.config.decay.powi((count - position) as i32))
            .collect::<Vec<_>>();
        let importance_raw = candidates
            .iter()
            .map(|(_, poignancy, _)| *poignancy as f64)
            .collect::<Vec<_>>();

        let recency = min_max_normalize(&recency_raw);
        let relevance = min_max_normalize(&relevance_raw);
        let importance = min_max_normalize(&importance_raw);

        let [gw_recency, gw_relevance, gw_importance] = self.config.global_weights;
        candidates
            .into_iter()
            .enumerate()
            .map(|(position, (node_id, _, _))| {
                let score = self.config.recency_weight * gw_recency * recency[position]
                    + self.config.relevance_weight * gw_relevance * relevance[position]
                    + self.config.importance_weight * gw_importance * importance[position];
                ScoredCandidate {
                    node_id,
                    position,
                    recency: recency[position],
                    relevance: relevance[position],
                    importance: importance[position],
                    score,
                }
            })
            .collect()
    }
}

/// Min-max normalize into [0, 1]; a flat axis maps every value to the
/// midpoint instead of dividing by zero.
fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values {
        min = min.min(*value);
        max = max.max(*value);
    }
    let span = max - min;
    if !span.is_finite() || span <= f64::EPSILON {
        return vec![0.5; values.len()];
    }
    values.iter().map(|value| (value - min) / span).collect()
}

/// Cosine similarity with f64 accumulation. Mismatched lengths or a zero
/// norm score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
