//! Thread-safe counters, histograms, and per-agent token ledgers.
//!
//! `Metrics` is cloned cheaply (it's an `Arc` of interior-mutable state) and
//! handed to every component that needs to record an observation. The scalar
//! counters (retries, cache hits/misses, claims persisted, evictions) are
//! lock-free atomics; `errors_by_kind`, the token ledger, the latency
//! histogram, and the gate-decision record use a mutex because they carry
//! structured, non-additive data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::gate::GateDecision;

/// Per-agent prompt/completion token accounting, broken down by loop index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    pub entries: Vec<TokenLedgerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedgerEntry {
    pub agent: String,
    pub loop_index: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenLedger {
    pub fn record(&mut self, agent: impl Into<String>, loop_index: u32, prompt: u64, completion: u64) {
        self.entries.push(TokenLedgerEntry {
            agent: agent.into(),
            loop_index,
            prompt_tokens: prompt,
            completion_tokens: completion,
        });
    }

    pub fn total_tokens(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.prompt_tokens + e.completion_tokens)
            .sum()
    }

    pub fn for_agent(&self, agent: &str) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.agent == agent)
            .map(|e| e.prompt_tokens + e.completion_tokens)
            .sum()
    }
}

#[derive(Debug, Default)]
struct ErrorCounters {
    by_kind: HashMap<ErrorKind, u64>,
}

/// Snapshot of [`Metrics`] suitable for embedding in a `QueryResponse`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub errors_by_kind: HashMap<String, u64>,
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub claims_persisted: u64,
    pub evictions: u64,
    pub token_ledger: TokenLedger,
    pub gate_decision: Option<GateDecision>,
}

/// Cloneable handle shared across the orchestrator, agents, search engine,
/// and claim store for one query.
#[derive(Clone, Default)]
pub struct Metrics {
    errors: Arc<Mutex<ErrorCounters>>,
    retries: Arc<AtomicU64>,
    cache_hits: Arc<AtomicU64>,
    cache_misses: Arc<AtomicU64>,
    claims_persisted: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    token_ledger: Arc<Mutex<TokenLedger>>,
    latency_histogram_ns: Arc<Mutex<Vec<u64>>>,
    gate_decision: Arc<Mutex<Option<GateDecision>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self, kind: ErrorKind) {
        let mut c = self.errors.lock().expect("metrics mutex poisoned");
        *c.by_kind.entry(kind).or_insert(0) += 1;
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim_persisted(&self) {
        self.claims_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, nanos: u64) {
        self.latency_histogram_ns
            .lock()
            .expect("metrics mutex poisoned")
            .push(nanos);
    }

    pub fn record_tokens(&self, agent: impl Into<String>, loop_index: u32, prompt: u64, completion: u64) {
        self.token_ledger
            .lock()
            .expect("metrics mutex poisoned")
            .record(agent, loop_index, prompt, completion);
    }

    pub fn record_gate_decision(&self, decision: GateDecision) {
        *self.gate_decision.lock().expect("metrics mutex poisoned") = Some(decision);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let errors = self.errors.lock().expect("metrics mutex poisoned");
        let ledger = self.token_ledger.lock().expect("metrics mutex poisoned").clone();
        let gate = self.gate_decision.lock().expect("metrics mutex poisoned").clone();
        MetricsSnapshot {
            errors_by_kind: errors
                .by_kind
                .iter()
                .map(|(k, v)| (format!("{k:?}").to_lowercase(), *v))
                .collect(),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            claims_persisted: self.claims_persisted.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            token_ledger: ledger,
            gate_decision: gate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ledger_aggregates_per_agent() {
        let mut ledger = TokenLedger::default();
        ledger.record("Synthesizer", 0, 100, 50);
        ledger.record("Synthesizer", 1, 20, 10);
        ledger.record("Contrarian", 0, 30, 5);
        assert_eq!(ledger.for_agent("Synthesizer"), 180);
        assert_eq!(ledger.total_tokens(), 215);
    }

    #[test]
    fn metrics_snapshot_reflects_recorded_events() {
        let metrics = Metrics::new();
        metrics.record_error(ErrorKind::Transient);
        metrics.record_error(ErrorKind::Transient);
        metrics.record_retry();
        metrics.record_cache_hit();
        let snap = metrics.snapshot();
        assert_eq!(snap.errors_by_kind.get("transient"), Some(&2));
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.cache_hits, 1);
    }
}
