//! Validated runtime configuration consumed by the orchestration core.
//!
//! The core never parses config files or environment variables itself — a
//! host builds a [`RuntimeConfig`] (from a file, environment, or CLI flags)
//! and passes it in. Every sub-config follows the small `Default`-able
//! struct-with-builder convention used throughout this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    Direct,
    Dialectical,
    ChainOfThought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    Lru,
    Score,
    Hybrid,
    Adaptive,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HnswMetric {
    Ip,
    Cosine,
    L2sq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub backends: Vec<String>,
    pub hybrid_query: bool,
    pub semantic_similarity_weight: f64,
    pub bm25_weight: f64,
    pub source_credibility_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backends: vec!["default".to_string()],
            hybrid_query: true,
            semantic_similarity_weight: 0.4,
            bm25_weight: 0.4,
            source_credibility_weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub ram_budget_mb: u64,
    pub eviction_policy: EvictionPolicy,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_metric: HnswMetric,
    pub hnsw_ef_search: usize,
    pub minimum_deterministic_resident_nodes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ram_budget_mb: 256,
            eviction_policy: EvictionPolicy::Hybrid,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_metric: HnswMetric::Cosine,
            hnsw_ef_search: 64,
            minimum_deterministic_resident_nodes: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeMode {
    None,
    Annotate,
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub max_retry_results: u32,
    pub hedge_mode: HedgeMode,
    pub require_human_ack: bool,
    pub operator_timeout_s: u64,
    pub explain_conflicts: bool,
    /// When false, audit retries draw from a pool separate from the scout
    /// pass's token budget; see `DESIGN.md` for the rationale.
    pub share_scout_budget: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_retry_results: 3,
            hedge_mode: HedgeMode::Annotate,
            require_human_ack: false,
            operator_timeout_s: 30,
            explain_conflicts: true,
            share_scout_budget: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub overlap_threshold: f64,
    pub conflict_threshold: f64,
    pub complexity_threshold: f64,
    pub enabled: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.75,
            conflict_threshold: 1.0,
            complexity_threshold: 0.6,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub backend: String,
    pub llm_backend: Option<String>,
    pub agents: Vec<String>,
    /// Optional explicit partition of `agents` into parallel groups (agents
    /// within a group run sequentially in declaration order; groups run in
    /// parallel). `None` means every agent is its own singleton group —
    /// the common case, and what direct/dialectical mode scenarios assume.
    pub agent_groups: Option<Vec<Vec<String>>>,
    pub primus_start: usize,
    pub reasoning_mode: ReasoningMode,
    pub loops: u32,
    pub token_budget: u64,
    pub adaptive_max_factor: f64,
    pub adaptive_min_buffer: u64,
    pub circuit_breaker_threshold: f32,
    pub circuit_breaker_cooldown_ms: u64,
    pub max_errors: u32,
    pub max_retries: u32,
    pub model_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    pub gate: GateConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            llm_backend: None,
            agents: vec![
                "Synthesizer".to_string(),
                "Contrarian".to_string(),
                "FactChecker".to_string(),
            ],
            agent_groups: None,
            primus_start: 0,
            reasoning_mode: ReasoningMode::Dialectical,
            loops: 2,
            token_budget: 8_000,
            adaptive_max_factor: 4.0,
            adaptive_min_buffer: 256,
            circuit_breaker_threshold: 3.0,
            circuit_breaker_cooldown_ms: 30_000,
            max_errors: 10,
            max_retries: 3,
            model_timeout_ms: 30_000,
            query_timeout_ms: 120_000,
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Returns the effective LLM backend name, falling back to `backend`.
    pub fn effective_llm_backend(&self) -> &str {
        self.llm_backend.as_deref().unwrap_or(&self.backend)
    }

    /// Validates cross-field invariants the orchestrator relies on; callers
    /// (typically a config-parsing host) should run this before use.
    pub fn validate(&self) -> Result<()> {
        use crate::error::Error;
        if self.loops == 0 {
            return Err(Error::Config("loops must be >= 1".into()));
        }
        if self.token_budget == 0 {
            return Err(Error::Config("token_budget must be > 0".into()));
        }
        if self.adaptive_max_factor <= 1.0 {
            return Err(Error::Config("adaptive_max_factor must be > 1".into()));
        }
        if self.circuit_breaker_threshold <= 0.0 {
            return Err(Error::Config("circuit_breaker_threshold must be > 0".into()));
        }
        Ok(())
    }
}

/// Capability for observing hot-reloaded configuration without a process-wide
/// mutable singleton. The orchestrator samples this only at loop boundaries
/// so a reload never changes behaviour mid-agent.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn current(&self) -> Result<RuntimeConfig>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_llm_backend_falls_back_to_backend() {
        let mut cfg = RuntimeConfig::default();
        cfg.backend = "local".into();
        cfg.llm_backend = None;
        assert_eq!(cfg.effective_llm_backend(), "local");
        cfg.llm_backend = Some("openai".into());
        assert_eq!(cfg.effective_llm_backend(), "openai");
    }

    #[test]
    fn validate_rejects_zero_loops() {
        let mut cfg = RuntimeConfig::default();
        cfg.loops = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }
}
