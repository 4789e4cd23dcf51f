//! Scout-pass heuristics deciding dialectical debate depth.

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;

/// Signals gathered from a single cheap-model scout pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoutSignals {
    pub retrieval_overlap: f64,
    pub conflict_score: f64,
    pub complexity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "branch")]
pub enum GateBranch {
    DirectAnswer,
    ShortDebate,
    FullDebate,
}

/// A decision record suitable for embedding in metrics for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub signals: ScoutSignals,
    pub branch: GateBranch,
    pub loops: u32,
    pub operator_override: bool,
}

/// Deterministic scout→debate-depth policy.
#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    config: GateConfig,
}

impl GatePolicy {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Evaluates the gate. `operator_override`, when set, takes precedence
    /// over the computed branch but the signals are still recorded.
    pub fn decide(
        &self,
        signals: ScoutSignals,
        configured_loops: u32,
        operator_override: Option<GateBranch>,
    ) -> GateDecision {
        if !self.config.enabled {
            return GateDecision {
                signals,
                branch: GateBranch::FullDebate,
                loops: configured_loops,
                operator_override: false,
            };
        }

        if let Some(branch) = operator_override {
            let loops = match branch {
                GateBranch::DirectAnswer => 1,
                GateBranch::ShortDebate => 1,
                GateBranch::FullDebate => configured_loops,
            };
            return GateDecision {
                signals,
                branch,
                loops,
                operator_override: true,
            };
        }

        let branch = if signals.retrieval_overlap >= self.config.overlap_threshold
            && signals.conflict_score == 0.0
            && signals.complexity <= low_complexity_bound(&self.config)
        {
            GateBranch::DirectAnswer
        } else if signals.conflict_score >= self.config.conflict_threshold
            || signals.complexity >= self.config.complexity_threshold
        {
            GateBranch::FullDebate
        } else {
            GateBranch::ShortDebate
        };

        let loops = match branch {
            GateBranch::DirectAnswer => 1,
            GateBranch::ShortDebate => 1,
            GateBranch::FullDebate => configured_loops,
        };

        GateDecision {
            signals,
            branch,
            loops,
            operator_override: false,
        }
    }
}

/// The "low" complexity bound used for the `DirectAnswer` branch is the
/// gate's low-complexity threshold; separated out so the struct doesn't need
/// an extra config field while keeping the decision rule legible.
fn low_complexity_bound(config: &GateConfig) -> f64 {
    config.complexity_threshold * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> GatePolicy {
        GatePolicy::new(GateConfig {
            overlap_threshold: 0.75,
            conflict_threshold: 1.0,
            complexity_threshold: 0.6,
            enabled: true,
        })
    }

    #[test]
    fn high_overlap_no_conflict_low_complexity_is_direct() {
        let decision = policy().decide(
            ScoutSignals {
                retrieval_overlap: 0.9,
                conflict_score: 0.0,
                complexity: 0.1,
            },
            3,
            None,
        );
        assert_eq!(decision.branch, GateBranch::DirectAnswer);
        assert_eq!(decision.loops, 1);
    }

    #[test]
    fn high_conflict_forces_full_debate() {
        let decision = policy().decide(
            ScoutSignals {
                retrieval_overlap: 0.9,
                conflict_score: 2.0,
                complexity: 0.1,
            },
            3,
            None,
        );
        assert_eq!(decision.branch, GateBranch::FullDebate);
        assert_eq!(decision.loops, 3);
    }

    #[test]
    fn middling_signals_yield_short_debate() {
        let decision = policy().decide(
            ScoutSignals {
                retrieval_overlap: 0.5,
                conflict_score: 0.2,
                complexity: 0.3,
            },
            3,
            None,
        );
        assert_eq!(decision.branch, GateBranch::ShortDebate);
        assert_eq!(decision.loops, 1);
    }

    #[test]
    fn operator_override_takes_precedence() {
        let decision = policy().decide(
            ScoutSignals {
                retrieval_overlap: 0.0,
                conflict_score: 5.0,
                complexity: 0.9,
            },
            3,
            Some(GateBranch::DirectAnswer),
        );
        assert_eq!(decision.branch, GateBranch::DirectAnswer);
        assert!(decision.operator_override);
    }

    #[test]
    fn decision_is_deterministic_given_same_inputs() {
        let signals = ScoutSignals {
            retrieval_overlap: 0.4,
            conflict_score: 0.3,
            complexity: 0.4,
        };
        let a = policy().decide(signals, 2, None);
        let b = policy().decide(signals, 2, None);
        assert_eq!(a.branch, b.branch);
    }
}
