//! Result type and weighted-fusion ranking.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub backend: String,
    pub bm25: f64,
    pub semantic_similarity: f64,
    pub credibility: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub bm25: f64,
    pub semantic: f64,
    pub credibility: f64,
}

impl Weights {
    /// Validates and normalises per P2: `s > 1` is rejected; `s = 0` rebases
    /// to an even split; `s in (0,1]` normalises proportionally.
    pub fn normalized(bm25: f64, semantic: f64, credibility: f64) -> Result<Self> {
        if bm25 < 0.0 || semantic < 0.0 || credibility < 0.0 {
            return Err(Error::Config("search weights must be non-negative".into()));
        }
        let sum = bm25 + semantic + credibility;
        if sum > 1.0 + 1e-9 {
            return Err(Error::Config(format!(
                "search weights sum to {sum}, which exceeds 1.0"
            )));
        }
        if sum <= 1e-9 {
            return Ok(Self {
                bm25: 1.0 / 3.0,
                semantic: 1.0 / 3.0,
                credibility: 1.0 / 3.0,
            });
        }
        Ok(Self {
            bm25: bm25 / sum,
            semantic: semantic / sum,
            credibility: credibility / sum,
        })
    }

    pub fn combine(&self, bm25_norm: f64, sem_sim: f64, cred: f64) -> f64 {
        self.bm25 * bm25_norm + self.semantic * sem_sim + self.credibility * cred
    }
}

/// Min-max normalises BM25 raw scores to `[0,1]` across the local candidate
/// set (a single-element or all-equal set normalises to `1.0` for every
/// entry, matching "no useful discrimination" rather than producing NaN).
pub fn normalize_bm25(raw: &[f64]) -> Vec<f64> {
    let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() || (max - min).abs() < 1e-12 {
        return raw.iter().map(|_| 1.0).collect();
    }
    raw.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Sorts results by `final_score` descending, breaking ties by insertion
/// (stable sort preserves original order among equal scores).
pub fn sort_ranked(results: &mut Vec<SearchResult>) {
    results.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_sum_weights_rebase_to_even_split() {
        let w = Weights::normalized(0.0, 0.0, 0.0).unwrap();
        assert!((w.bm25 - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn sum_over_one_is_rejected() {
        assert!(Weights::normalized(0.5, 0.4, 0.3).is_err());
    }

    #[test]
    fn partial_sum_normalises_proportionally() {
        let w = Weights::normalized(0.3, 0.3, 0.0).unwrap();
        assert!((w.bm25 - 0.5).abs() < 1e-9);
        assert!((w.semantic - 0.5).abs() < 1e-9);
    }

    #[test]
    fn scenario_s6_ranking_correctness() {
        let weights = Weights {
            bm25: 0.3,
            semantic: 0.6,
            credibility: 0.1,
        };
        let mut results = vec![
            SearchResult {
                title: "r1".into(),
                url: "u1".into(),
                snippet: "".into(),
                backend: "b".into(),
                bm25: 0.9,
                semantic_similarity: 0.1,
                credibility: 0.5,
                final_score: weights.combine(0.9, 0.1, 0.5),
            },
            SearchResult {
                title: "r2".into(),
                url: "u2".into(),
                snippet: "".into(),
                backend: "b".into(),
                bm25: 0.1,
                semantic_similarity: 0.9,
                credibility: 0.5,
                final_score: weights.combine(0.1, 0.9, 0.5),
            },
            SearchResult {
                title: "r3".into(),
                url: "u3".into(),
                snippet: "".into(),
                backend: "b".into(),
                bm25: 0.5,
                semantic_similarity: 0.5,
                credibility: 0.9,
                final_score: weights.combine(0.5, 0.5, 0.9),
            },
        ];
        sort_ranked(&mut results);
        assert_eq!(results[0].title, "r2");
        assert_eq!(results[1].title, "r3");
        assert_eq!(results[2].title, "r1");
        assert!((results[0].final_score - 0.62).abs() < 1e-6);
        assert!((results[1].final_score - 0.39).abs() < 1e-6);
        assert!((results[2].final_score - 0.37).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn ranked_lists_are_non_increasing(
            scores in proptest::collection::vec(0.0f64..1.0, 1..20),
        ) {
            let mut results: Vec<SearchResult> = scores
                .into_iter()
                .map(|s| SearchResult {
                    title: "t".into(),
                    url: "u".into(),
                    snippet: "".into(),
                    backend: "b".into(),
                    bm25: s,
                    semantic_similarity: s,
                    credibility: s,
                    final_score: s,
                })
                .collect();
            sort_ranked(&mut results);
            for w in results.windows(2) {
                prop_assert!(w[0].final_score >= w[1].final_score);
            }
        }
    }
}
