//! Adaptive per-query and per-loop token budget computation.

use serde::{Deserialize, Serialize};

/// Computes per-loop and per-group token allocations from a query's token
/// budget, honoring the lower bound (query tokens plus buffer) and the
/// upper bound (query tokens times the adaptive factor).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudgeter {
    pub total_budget: u64,
    pub query_tokens: u64,
    pub loops: u32,
    pub adaptive_max_factor: f64,
    pub adaptive_min_buffer: u64,
}

impl TokenBudgeter {
    pub fn new(
        total_budget: u64,
        query_tokens: u64,
        loops: u32,
        adaptive_max_factor: f64,
        adaptive_min_buffer: u64,
    ) -> Self {
        Self {
            total_budget,
            query_tokens,
            loops: loops.max(1),
            adaptive_max_factor,
            adaptive_min_buffer,
        }
    }

    fn lower_bound(&self) -> u64 {
        self.query_tokens + self.adaptive_min_buffer
    }

    fn upper_bound(&self) -> u64 {
        ((self.query_tokens as f64) * self.adaptive_max_factor).round() as u64
    }

    /// `per_loop = clamp(b / max(1,l), lower, upper)`.
    pub fn per_loop(&self) -> u64 {
        let even_share = self.total_budget / self.loops as u64;
        let lower = self.lower_bound();
        let upper = self.upper_bound().max(lower);
        even_share.clamp(lower, upper)
    }

    /// Fair per-group shares of a loop's budget: `per_loop() / group_count`
    /// plus the remainder distributed one token at a time to the first
    /// `per_loop() % group_count` groups, so `sum(per_group_shares()) ==
    /// per_loop()` exactly regardless of `group_count` (P3).
    pub fn per_group_shares(&self, group_count: usize) -> Vec<u64> {
        let group_count = group_count.max(1);
        let total = self.per_loop();
        let base = total / group_count as u64;
        let remainder = (total % group_count as u64) as usize;
        (0..group_count)
            .map(|i| base + if i < remainder { 1 } else { 0 })
            .collect()
    }

    /// Fair per-group share for a single group index, see
    /// [`TokenBudgeter::per_group_shares`].
    pub fn per_group(&self, group_index: usize, group_count: usize) -> u64 {
        self.per_group_shares(group_count)[group_index.min(group_count.max(1) - 1)]
    }

    pub fn total_for_query(&self) -> u64 {
        self.per_loop() * self.loops as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamps_to_lower_bound_when_budget_too_small() {
        let b = TokenBudgeter::new(100, 500, 2, 4.0, 50);
        assert_eq!(b.per_loop(), 550);
    }

    #[test]
    fn clamps_to_upper_bound_when_budget_too_large() {
        let b = TokenBudgeter::new(1_000_000, 500, 1, 4.0, 50);
        assert_eq!(b.per_loop(), 2000);
    }

    #[test]
    fn group_share_divides_evenly() {
        let b = TokenBudgeter::new(4000, 100, 1, 4.0, 0);
        assert_eq!(b.per_group(0, 4), b.per_loop() / 4);
    }

    #[test]
    fn group_shares_sum_exactly_to_per_loop_with_uneven_split() {
        let b = TokenBudgeter::new(4003, 100, 1, 4.0, 0);
        let shares = b.per_group_shares(3);
        assert_eq!(shares.len(), 3);
        assert_eq!(shares.iter().sum::<u64>(), b.per_loop());
    }

    proptest! {
        #[test]
        fn budget_monotonicity(
            b1 in 1_000u64..5_000,
            delta in 0u64..5_000,
            q in 10u64..1_000,
            loops in 1u32..6,
        ) {
            let low = TokenBudgeter::new(b1, q, loops, 4.0, 50);
            let high = TokenBudgeter::new(b1 + delta, q, loops, 4.0, 50);
            prop_assert!(high.per_loop() >= low.per_loop());
        }

        #[test]
        fn loop_monotonicity_on_total(
            b in 2_000u64..20_000,
            q in 10u64..500,
            loops in 1u32..8,
        ) {
            let a = TokenBudgeter::new(b, q, loops, 4.0, 50);
            let more_loops = TokenBudgeter::new(b, q, loops + 1, 4.0, 50);
            prop_assert!(more_loops.total_for_query() >= a.total_for_query() || more_loops.per_loop() == more_loops.upper_bound());
        }
    }
}
