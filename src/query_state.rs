//! `QueryState`: the per-query mutable aggregate owned by the Orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::claim::{Claim, ClaimId};
use crate::error::ErrorKind;
use crate::metrics::Metrics;
use crate::reasoning::ReActTrace;
use crate::task_graph::TaskGraph;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub component: String,
    pub message: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Snapshot form of [`QueryState`]: plain data, safe to serialise and to
/// reconstruct a fresh `QueryState` from (locks are reinitialised, never
/// shared across snapshots).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryStateSnapshot {
    pub query: String,
    pub loop_index: u32,
    pub primus_index: usize,
    pub claims: Vec<(ClaimId, Claim)>,
    pub messages: Vec<Message>,
    pub errors: Vec<RecordedError>,
    pub react_log: ReActTrace,
}

/// Per-query mutable aggregate. Agents receive a read-only snapshot; only
/// the Orchestrator's merge step mutates this directly.
pub struct QueryState {
    pub query: String,
    pub loop_index: u32,
    pub primus_index: usize,
    /// Insertion-ordered map: iteration order is reproducible.
    claims: Vec<ClaimId>,
    claims_by_id: BTreeMap<ClaimId, Claim>,
    pub messages: Vec<Message>,
    pub errors: Vec<RecordedError>,
    pub metrics: Metrics,
    pub task_graph: Option<TaskGraph>,
    /// Append-only ReAct trace of the agent dispatch that produced this
    /// state's claims; pushed to by the Orchestrator's group-execution loop.
    pub react_log: ReActTrace,
}

impl QueryState {
    pub fn new(query: impl Into<String>, primus_index: usize, metrics: Metrics) -> Self {
        Self {
            query: query.into(),
            loop_index: 0,
            primus_index,
            claims: Vec::new(),
            claims_by_id: BTreeMap::new(),
            messages: Vec::new(),
            errors: Vec::new(),
            metrics,
            task_graph: None,
            react_log: ReActTrace::default(),
        }
    }

    /// Inserts or replaces a claim, preserving first-seen insertion order.
    pub fn upsert_claim(&mut self, claim: Claim) {
        if !self.claims_by_id.contains_key(&claim.id) {
            self.claims.push(claim.id);
        }
        self.claims_by_id.insert(claim.id, claim);
    }

    /// Set-union merge of claims produced by a parallel group. Associative
    /// and commutative in `id`, so completion order of groups never changes
    /// the resulting set (P5).
    pub fn merge_claims(&mut self, claims: Vec<Claim>) {
        for claim in claims {
            self.upsert_claim(claim);
        }
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter().map(move |id| &self.claims_by_id[id])
    }

    pub fn claim(&self, id: ClaimId) -> Option<&Claim> {
        self.claims_by_id.get(&id)
    }

    pub fn claim_mut(&mut self, id: ClaimId) -> Option<&mut Claim> {
        self.claims_by_id.get_mut(&id)
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    pub fn record_error(&mut self, kind: ErrorKind, component: impl Into<String>, message: impl Into<String>) {
        let component = component.into();
        let message = message.into();
        self.metrics.record_error(kind);
        if let Some(existing) = self
            .errors
            .iter_mut()
            .find(|e| e.kind == kind && e.component == component && e.message == message)
        {
            existing.count += 1;
        } else {
            self.errors.push(RecordedError {
                kind,
                component,
                message,
                count: 1,
            });
        }
    }

    /// Deep-clones into a plain snapshot. The `Metrics` handle and any
    /// internal locks are NOT carried — a restored `QueryState` gets a fresh
    /// `Metrics::new()`, matching the "clones rebuild internal locks"
    /// concurrency invariant.
    pub fn snapshot(&self) -> QueryStateSnapshot {
        QueryStateSnapshot {
            query: self.query.clone(),
            loop_index: self.loop_index,
            primus_index: self.primus_index,
            claims: self
                .claims
                .iter()
                .map(|id| (*id, self.claims_by_id[id].clone()))
                .collect(),
            messages: self.messages.clone(),
            errors: self.errors.clone(),
            react_log: self.react_log.clone(),
        }
    }

    pub fn restore(snapshot: QueryStateSnapshot) -> Self {
        let mut state = Self::new(snapshot.query, snapshot.primus_index, Metrics::new());
        state.loop_index = snapshot.loop_index;
        for (_, claim) in snapshot.claims {
            state.upsert_claim(claim);
        }
        state.messages = snapshot.messages;
        state.errors = snapshot.errors;
        state.react_log = snapshot.react_log;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimKind;

    #[test]
    fn claims_preserve_insertion_order() {
        let mut state = QueryState::new("q", 0, Metrics::new());
        let a = Claim::new("a", ClaimKind::Thesis);
        let b = Claim::new("b", ClaimKind::Thesis);
        let ids = (a.id, b.id);
        state.upsert_claim(a);
        state.upsert_claim(b);
        let order: Vec<_> = state.claims().map(|c| c.id).collect();
        assert_eq!(order, vec![ids.0, ids.1]);
    }

    #[test]
    fn merge_is_commutative_in_resulting_set() {
        let c1 = Claim::new("a", ClaimKind::Thesis);
        let c2 = Claim::new("b", ClaimKind::Thesis);
        let mut s1 = QueryState::new("q", 0, Metrics::new());
        s1.merge_claims(vec![c1.clone(), c2.clone()]);
        let mut s2 = QueryState::new("q", 0, Metrics::new());
        s2.merge_claims(vec![c2, c1]);
        let mut ids1: Vec<_> = s1.claims().map(|c| c.id).collect();
        let mut ids2: Vec<_> = s2.claims().map(|c| c.id).collect();
        ids1.sort();
        ids2.sort();
        assert_eq!(ids1, ids2);
    }

    #[test]
    fn snapshot_round_trip_preserves_claims() {
        let mut state = QueryState::new("q", 0, Metrics::new());
        let claim = Claim::new("a", ClaimKind::Thesis);
        let id = claim.id;
        state.upsert_claim(claim);
        state.loop_index = 2;
        let snap = state.snapshot();
        let restored = QueryState::restore(snap);
        assert_eq!(restored.loop_index, 2);
        assert!(restored.claim(id).is_some());
    }
}
