//! Minimal in-memory triple store for the claim graph's semantic-query
//! surface. Out of scope: a full OWL reasoner — this only records and
//! queries triples; inference is left to an optional external reasoner
//! plugin (see the open question on `contradicts` transitivity).

use std::collections::BTreeSet;

use crate::claim::{Claim, ClaimId, RelationKind};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Append-only quad/triple store keyed by claim id for fast bulk removal on
/// eviction-from-durable-delete paths (none today — durable rows are never
/// deleted, only the in-memory graph shrinks — but claim updates replace a
/// claim's triples wholesale).
#[derive(Debug, Default)]
pub struct RdfStore {
    triples: BTreeSet<Triple>,
}

fn relation_predicate(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::Supports => "supports",
        RelationKind::Contradicts => "contradicts",
        RelationKind::Refines => "refines",
        RelationKind::Cites => "cites",
    }
}

impl RdfStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn subject_uri(id: ClaimId) -> String {
        format!("urn:claim:{id}")
    }

    /// Replaces all triples for `claim.id` with triples derived from its
    /// current kind/confidence/relations.
    pub fn upsert_claim(&mut self, claim: &Claim) {
        self.remove_claim(claim.id);
        let subject = Self::subject_uri(claim.id);
        self.triples.insert(Triple {
            subject: subject.clone(),
            predicate: "kind".to_string(),
            object: format!("{:?}", claim.kind),
        });
        self.triples.insert(Triple {
            subject: subject.clone(),
            predicate: "confidence".to_string(),
            object: claim.confidence.to_string(),
        });
        for relation in &claim.relations {
            self.triples.insert(Triple {
                subject: subject.clone(),
                predicate: relation_predicate(relation.kind).to_string(),
                object: Self::subject_uri(relation.target),
            });
        }
    }

    pub fn remove_claim(&mut self, id: ClaimId) {
        let subject = Self::subject_uri(id);
        self.triples.retain(|t| t.subject != subject);
    }

    pub fn triples_for(&self, id: ClaimId) -> Vec<Triple> {
        let subject = Self::subject_uri(id);
        self.triples
            .iter()
            .filter(|t| t.subject == subject)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimKind;

    #[test]
    fn upsert_replaces_prior_triples() {
        let mut store = RdfStore::new();
        let mut claim = Claim::new("a", ClaimKind::Thesis);
        claim.confidence = 0.5;
        store.upsert_claim(&claim);
        let first_len = store.triples_for(claim.id).len();
        claim.confidence = 0.9;
        store.upsert_claim(&claim);
        assert_eq!(store.triples_for(claim.id).len(), first_len);
    }
}
