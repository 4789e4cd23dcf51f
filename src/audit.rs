//! Per-claim re-verification with retries and hedging.
//!
//! Mirrors the strategy-trait shape used for adversarial validation:
//! verification heuristics are pluggable [`AuditStrategy`] implementations
//! rather than hard-coded branches in the loop driver.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::claim::{AuditStatus, Claim, ClaimId};
use crate::config::{AuditConfig, HedgeMode};
use crate::error::Result;
use crate::metrics::Metrics;
use crate::search::{SearchEngine, SearchResult};

/// Structured provenance for a single re-verification attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAttempt {
    pub claim_id: ClaimId,
    pub attempt_index: u32,
    pub tool_used: String,
    pub evidence_delta: i32,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOutcome {
    pub claim_id: ClaimId,
    pub new_status: AuditStatus,
    pub attempts: Vec<AuditAttempt>,
}

/// A pluggable re-verification heuristic: given a claim and fresh retrieval
/// evidence, decides a support delta (positive = more supported).
#[async_trait]
pub trait AuditStrategy: Send + Sync {
    fn name(&self) -> &str;
    async fn score(&self, claim: &Claim, evidence: &[SearchResult]) -> i32;
}

/// Counts sources returned by targeted retrieval as support evidence.
pub struct RetrievalCountStrategy;

#[async_trait]
impl AuditStrategy for RetrievalCountStrategy {
    fn name(&self) -> &str {
        "retrieval_count"
    }

    async fn score(&self, _claim: &Claim, evidence: &[SearchResult]) -> i32 {
        evidence.len() as i32 - 1
    }
}

/// Flags claims whose text contains hedging language as weaker support,
/// counterbalancing a high retrieval count.
pub struct ContradictionScanStrategy;

#[async_trait]
impl AuditStrategy for ContradictionScanStrategy {
    fn name(&self) -> &str {
        "contradiction_scan"
    }

    async fn score(&self, claim: &Claim, _evidence: &[SearchResult]) -> i32 {
        let lowered = claim.text.to_lowercase();
        if lowered.contains("however") || lowered.contains("but ") || lowered.contains("unclear") {
            -1
        } else {
            0
        }
    }
}

/// Capability the host may supply to gate on an operator acknowledgement
/// before marking a claim `unsupported`.
#[async_trait]
pub trait OperatorAck: Send + Sync {
    async fn wait(&self, timeout_s: u64) -> bool;
}

pub struct AuditLoop<'a> {
    config: AuditConfig,
    search: &'a SearchEngine,
    search_config: crate::config::SearchConfig,
    strategies: Vec<Box<dyn AuditStrategy>>,
    operator_ack: Option<&'a (dyn OperatorAck)>,
    metrics: &'a Metrics,
}

impl<'a> AuditLoop<'a> {
    pub fn new(
        config: AuditConfig,
        search: &'a SearchEngine,
        search_config: crate::config::SearchConfig,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            config,
            search,
            search_config,
            strategies: vec![Box::new(RetrievalCountStrategy), Box::new(ContradictionScanStrategy)],
            operator_ack: None,
            metrics,
        }
    }

    pub fn with_operator_ack(mut self, ack: &'a dyn OperatorAck) -> Self {
        self.operator_ack = Some(ack);
        self
    }

    /// Re-verifies every claim whose status is `unverified`, returning one
    /// [`AuditOutcome`] per such claim. Callers persist the result via
    /// `ClaimStore.update_claim`.
    pub async fn run(&self, claims: &[Claim]) -> Result<Vec<AuditOutcome>> {
        let mut outcomes = Vec::new();
        for claim in claims.iter().filter(|c| c.audit_status == AuditStatus::Unverified) {
            outcomes.push(self.audit_one(claim).await?);
        }
        Ok(outcomes)
    }

    async fn audit_one(&self, claim: &Claim) -> Result<AuditOutcome> {
        let mut attempts = Vec::new();
        let mut total_delta = 0i32;

        for attempt_index in 0..self.config.max_retry_results {
            let evidence = self
                .search
                .external_lookup(&claim.text, &self.search_config, self.metrics)
                .await?;
            let mut delta = 0;
            for strategy in &self.strategies {
                delta += strategy.score(claim, &evidence).await;
            }
            total_delta += delta;
            attempts.push(AuditAttempt {
                claim_id: claim.id,
                attempt_index,
                tool_used: "search_engine".to_string(),
                evidence_delta: delta,
                timed_out: false,
            });
            if total_delta > 0 {
                break;
            }
        }

        let mut new_status = if total_delta > 0 {
            AuditStatus::Supported
        } else if total_delta == 0 {
            match self.config.hedge_mode {
                HedgeMode::None => AuditStatus::Unsupported,
                HedgeMode::Annotate | HedgeMode::Suppress => AuditStatus::Hedged,
            }
        } else {
            AuditStatus::Unsupported
        };

        if new_status == AuditStatus::Unsupported && self.config.require_human_ack {
            let acked = match self.operator_ack {
                Some(ack) => ack.wait(self.config.operator_timeout_s).await,
                None => false,
            };
            if !acked {
                attempts.push(AuditAttempt {
                    claim_id: claim.id,
                    attempt_index: attempts.len() as u32,
                    tool_used: "operator_ack".to_string(),
                    evidence_delta: 0,
                    timed_out: true,
                });
                new_status = AuditStatus::Unsupported;
            }
        }

        Ok(AuditOutcome {
            claim_id: claim.id,
            new_status,
            attempts,
        })
    }
}

/// A fixed clock marker used by callers wanting to timestamp an audit run;
/// exposed here rather than reaching for `Utc::now()` ad hoc elsewhere.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}
