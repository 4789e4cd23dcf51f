//! # autoresearch-core
//!
//! Local-first multi-agent research assistant core: an orchestration kernel,
//! hybrid search and ranking engine, hybrid storage layer, and an adaptive
//! gate/audit loop, driven entirely through [`RuntimeConfig`] with no file or
//! environment parsing inside the crate.
//!
//! ## Core Components
//!
//! - **Orchestrator**: drives the scout pass, gate decision, agent rotation,
//!   and audit loop for one query
//! - **Search**: multi-backend dispatch, BM25/semantic/credibility fusion
//! - **Storage**: hybrid graph + tabular (FTS5) + RDF + vector-index claim
//!   store with RAM-budget eviction
//! - **Claim/QueryState**: the research data model and per-query aggregate
//!
//! ## Example
//!
//! ```rust,ignore
//! use autoresearch_core::{Orchestrator, RuntimeConfig};
//!
//! let response = orchestrator.run_query("what changed in the 4.2 release?", &RuntimeConfig::default()).await?;
//! println!("{:?}", response.answer);
//! ```

extern crate self as autoresearch_core;

pub mod agent;
pub mod audit;
pub mod budgeter;
pub mod circuit_breaker;
pub mod claim;
pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod orchestrator;
pub mod query_state;
pub mod reasoning;
pub mod search;
pub mod storage;
pub mod task_graph;

pub use agent::{Agent, AgentRegistry, AgentResult, AgentView};
pub use audit::{AuditLoop, AuditOutcome, AuditStrategy, OperatorAck};
pub use budgeter::TokenBudgeter;
pub use circuit_breaker::{BreakerState, CircuitBreakerRegistry, CircuitBreakerState, Outcome};
pub use claim::{Claim, ClaimId, ClaimKind, ClaimInvariantError, RelationKind, Source};
pub use config::{
    AuditConfig, EvictionPolicy, GateConfig, HedgeMode, HnswMetric, ReasoningMode, RuntimeConfig,
    SearchConfig, StorageConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use gate::{GateBranch, GateDecision, GatePolicy, ScoutSignals};
pub use metrics::{Metrics, MetricsSnapshot, TokenLedger};
pub use orchestrator::{Citation, Orchestrator, QueryResponse};
pub use query_state::{QueryState, QueryStateSnapshot};
pub use reasoning::{to_graphml, to_json, ReActStep, ReActStepKind, ReActTrace};
pub use search::{SearchBackend, SearchCache, SearchEngine, SearchResult, Weights};
pub use storage::{ClaimPatch, ClaimStore, VectorHit, VectorIndex};
pub use task_graph::{Planner, TaskGraph, TaskId, TaskNode};
