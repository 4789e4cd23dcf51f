//! The `Claim` data model: an immutable-by-identity research finding that
//! accrues sources, relations, and an audit status over its lifecycle.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique claim identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Thesis,
    Antithesis,
    Synthesis,
    Evidence,
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Unverified,
    Supported,
    Unsupported,
    Hedged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub backend: String,
    pub credibility: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Supports,
    Contradicts,
    Refines,
    Cites,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub target: ClaimId,
}

/// Research finding produced by an [`Agent`](crate::agent::Agent) and
/// tracked by the [`ClaimStore`](crate::storage::ClaimStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub text: String,
    pub kind: ClaimKind,
    pub sources: Vec<Source>,
    pub embedding: Option<Vec<f32>>,
    pub relations: Vec<Relation>,
    pub confidence: f32,
    pub audit_status: AuditStatus,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Error returned when a claim violates a data-model invariant.
#[derive(Debug, thiserror::Error)]
pub enum ClaimInvariantError {
    #[error("claim {0} is not inference-kind but has no sources and confidence >= 0.2")]
    MissingSourceEvidence(ClaimId),
}

impl Claim {
    pub fn new(text: impl Into<String>, kind: ClaimKind) -> Self {
        let now = Utc::now();
        Self {
            id: ClaimId::new(),
            text: text.into(),
            kind,
            sources: Vec::new(),
            embedding: None,
            relations: Vec::new(),
            confidence: 0.0,
            audit_status: AuditStatus::Unverified,
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Enforces "every non-`inference` claim has >=1 source or
    /// `confidence<0.2`".
    pub fn check_invariants(&self) -> Result<(), ClaimInvariantError> {
        if self.kind != ClaimKind::Inference && self.sources.is_empty() && self.confidence >= 0.2 {
            return Err(ClaimInvariantError::MissingSourceEvidence(self.id));
        }
        Ok(())
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    /// Adds a `contradicts` relation to both this claim and `other`'s side,
    /// preserving the "contradicts edges are symmetric" invariant at the
    /// call site (callers persisting through `ClaimStore` get this for
    /// free; this helper exists for in-memory construction and tests).
    pub fn add_contradicts(&mut self, other: ClaimId) {
        if !self
            .relations
            .iter()
            .any(|r| r.kind == RelationKind::Contradicts && r.target == other)
        {
            self.relations.push(Relation {
                kind: RelationKind::Contradicts,
                target: other,
            });
        }
    }

    pub fn relation_targets(&self, kind: RelationKind) -> BTreeSet<ClaimId> {
        self.relations
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.target)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_claims_are_exempt_from_source_invariant() {
        let claim = Claim::new("derived", ClaimKind::Inference);
        assert!(claim.check_invariants().is_ok());
    }

    #[test]
    fn low_confidence_claims_are_exempt() {
        let mut claim = Claim::new("weak guess", ClaimKind::Thesis);
        claim.confidence = 0.1;
        assert!(claim.check_invariants().is_ok());
    }

    #[test]
    fn unsourced_confident_claim_violates_invariant() {
        let mut claim = Claim::new("strong claim", ClaimKind::Thesis);
        claim.confidence = 0.8;
        assert!(claim.check_invariants().is_err());
    }

    #[test]
    fn contradicts_relation_is_not_duplicated() {
        let mut claim = Claim::new("a", ClaimKind::Thesis);
        let other = ClaimId::new();
        claim.add_contradicts(other);
        claim.add_contradicts(other);
        assert_eq!(claim.relation_targets(RelationKind::Contradicts).len(), 1);
    }
}
