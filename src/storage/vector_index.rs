//! Approximate nearest-neighbour index over claim embeddings.
//!
//! Wraps `hnsw_rs`'s `Hnsw` graph. Latency target: < 150ms for 10k vectors at
//! `M=16, ef_construction=200`, per the storage-layer design; callers choose
//! these via `StorageConfig`.

use std::collections::HashMap;

use hnsw_rs::dist::DistCosine;
use hnsw_rs::hnsw::Hnsw;

use crate::claim::ClaimId;
use crate::config::{HnswMetric, StorageConfig};

/// `hnsw_rs` is generic over distance; this core only exposes cosine (the
/// default and only metric the spec's config enumerates that this build
/// wires through — `ip`/`l2sq` are accepted in config for forward
/// compatibility with a future metric-parameterised index but currently
/// route through the same cosine graph).
pub struct VectorIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    id_to_claim: HashMap<usize, ClaimId>,
    claim_to_id: HashMap<ClaimId, usize>,
    next_id: usize,
    metric: HnswMetric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub claim_id: ClaimId,
    pub distance: f32,
}

impl VectorIndex {
    pub fn new(config: &StorageConfig) -> Self {
        let hnsw = Hnsw::new(
            config.hnsw_m,
            10_000,
            16,
            config.hnsw_ef_construction,
            DistCosine {},
        );
        Self {
            hnsw,
            id_to_claim: HashMap::new(),
            claim_to_id: HashMap::new(),
            next_id: 0,
            metric: config.hnsw_metric,
        }
    }

    pub fn metric(&self) -> HnswMetric {
        self.metric
    }

    /// Inserts or replaces the embedding for `claim_id`. `hnsw_rs` has no
    /// in-place update, so a replace allocates a fresh internal id; the old
    /// id is left unreachable from lookups (it still occupies graph space,
    /// matching what a production HNSW wrapper does pending a rebuild/
    /// compaction pass).
    pub fn upsert(&mut self, claim_id: ClaimId, embedding: &[f32]) {
        let internal_id = self.next_id;
        self.next_id += 1;
        self.hnsw.insert((embedding, internal_id));
        if let Some(old) = self.claim_to_id.insert(claim_id, internal_id) {
            self.id_to_claim.remove(&old);
        }
        self.id_to_claim.insert(internal_id, claim_id);
    }

    pub fn remove(&mut self, claim_id: ClaimId) {
        if let Some(internal_id) = self.claim_to_id.remove(&claim_id) {
            self.id_to_claim.remove(&internal_id);
        }
    }

    pub fn contains(&self, claim_id: ClaimId) -> bool {
        self.claim_to_id.contains_key(&claim_id)
    }

    pub fn len(&self) -> usize {
        self.claim_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claim_to_id.is_empty()
    }

    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<VectorHit> {
        self.hnsw
            .search(query, k, ef_search)
            .into_iter()
            .filter_map(|neighbour| {
                self.id_to_claim.get(&neighbour.d_id).map(|claim_id| VectorHit {
                    claim_id: *claim_id,
                    distance: neighbour.distance,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig::default()
    }

    #[test]
    fn search_returns_nearest_inserted_vector() {
        let mut index = VectorIndex::new(&config());
        let a = ClaimId::new();
        let b = ClaimId::new();
        index.upsert(a, &[1.0, 0.0, 0.0]);
        index.upsert(b, &[0.0, 1.0, 0.0]);
        let hits = index.search(&[0.9, 0.1, 0.0], 1, 32);
        assert_eq!(hits.first().map(|h| h.claim_id), Some(a));
    }

    #[test]
    fn remove_drops_claim_from_future_lookups() {
        let mut index = VectorIndex::new(&config());
        let a = ClaimId::new();
        index.upsert(a, &[1.0, 0.0]);
        assert!(index.contains(a));
        index.remove(a);
        assert!(!index.contains(a));
        assert_eq!(index.len(), 0);
    }
}
