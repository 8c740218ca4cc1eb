//! Target allocation with per-asset caps and iterative redistribution.

use super::scorer::AssetSummary;
use crate::config::AllocationConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

/// Tolerance when checking that allocations sum to one.
const SUM_TOLERANCE: Decimal = dec!(0.000000001);

/// Result of capping.
#[derive(Debug, Clone)]
pub struct CapOutcome {
    /// Input summaries with `raw_allocation` and `capped_allocation` filled in
    pub summaries: Vec<AssetSummary>,
    /// Rounds executed
    pub rounds: u32,
    /// False when the round bound was hit or the caps cannot sum to one
    pub converged: bool,
}

/// Allocations produced by [`AllocationCapper::cap_weights`].
#[derive(Debug, Clone, PartialEq)]
pub struct CappedWeights {
    pub raw: Vec<Decimal>,
    pub capped: Vec<Decimal>,
    pub rounds: u32,
    pub converged: bool,
}

/// Converts scores into capped portfolio fractions.
pub struct AllocationCapper {
    default_cap: Decimal,
    max_rounds: u32,
}

impl AllocationCapper {
    pub fn new(default_cap: Decimal, max_rounds: u32) -> Self {
        Self {
            default_cap,
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn from_config(config: &AllocationConfig) -> Self {
        Self::new(config.default_max_allocation, config.max_rounds)
    }

    /// Cap the summaries' allocations, weighting by `vol_to_liquidity`.
    pub fn cap(&self, mut summaries: Vec<AssetSummary>) -> CapOutcome {
        let weights: Vec<(Decimal, Decimal)> = summaries
            .iter()
            .map(|s| (s.vol_to_liquidity, s.cap(self.default_cap)))
            .collect();

        let result = self.cap_weights(&weights);
        for (i, summary) in summaries.iter_mut().enumerate() {
            summary.raw_allocation = result.raw[i];
            summary.capped_allocation = result.capped[i];
        }

        if !result.converged {
            let caps: Decimal = weights.iter().map(|(_, cap)| *cap).sum();
            warn!(
                rounds = result.rounds,
                sum_of_caps = %caps,
                allocated = %result.capped.iter().copied().sum::<Decimal>(),
                "Allocation capping did not converge"
            );
        }

        CapOutcome {
            summaries,
            rounds: result.rounds,
            converged: result.converged,
        }
    }

    /// Core capping over `(weight, cap)` pairs.
    ///
    /// Each round finalizes every remaining entry at or above its cap and
    /// renormalizes the rest to fill `1 - finalized`. Stops when a round finalizes
    /// nothing, when nothing remains, or after `max_rounds`.
    pub fn cap_weights(&self, weights: &[(Decimal, Decimal)]) -> CappedWeights {
        let n = weights.len();
        if n == 0 {
            return CappedWeights {
                raw: Vec::new(),
                capped: Vec::new(),
                rounds: 0,
                converged: true,
            };
        }

        let total: Decimal = weights.iter().map(|(w, _)| (*w).max(Decimal::ZERO)).sum();
        let raw: Vec<Decimal> = if total > Decimal::ZERO {
            weights
                .iter()
                .map(|(w, _)| (*w).max(Decimal::ZERO) / total)
                .collect()
        } else {
            vec![Decimal::ONE / Decimal::from(n); n]
        };

        let mut alloc = raw.clone();
        let mut finalized = vec![false; n];
        let mut rounds = 0;
        let mut settled = false;

        while rounds < self.max_rounds {
            rounds += 1;

            let newly: Vec<usize> = (0..n)
                .filter(|&i| !finalized[i] && alloc[i] >= weights[i].1)
                .collect();
            if newly.is_empty() {
                settled = true;
                break;
            }
            for &i in &newly {
                alloc[i] = weights[i].1;
                finalized[i] = true;
            }

            let remaining: Vec<usize> = (0..n).filter(|&i| !finalized[i]).collect();
            if remaining.is_empty() {
                settled = true;
                break;
            }

            let budget = Decimal::ONE
                - (0..n)
                    .filter(|&i| finalized[i])
                    .map(|i| alloc[i])
                    .sum::<Decimal>();
            let pool: Decimal = remaining.iter().map(|&i| alloc[i]).sum();
            for &i in &remaining {
                alloc[i] = if pool > Decimal::ZERO {
                    alloc[i] * budget / pool
                } else {
                    budget / Decimal::from(remaining.len())
                };
            }

            debug!(round = rounds, finalized = newly.len(), %budget, "Capping round");
        }

        let sum: Decimal = alloc.iter().copied().sum();
        let converged = settled && (sum - Decimal::ONE).abs() <= SUM_TOLERANCE;

        CappedWeights {
            raw,
            capped: alloc,
            rounds,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    fn summary(asset: &str, ratio: Decimal, cap: Option<Decimal>) -> AssetSummary {
        AssetSummary {
            max_allocation: cap,
            ..AssetSummary::new(asset, 6, ratio)
        }
    }

    fn assert_sums_to_one(values: &[Decimal]) {
        let sum: Decimal = values.iter().copied().sum();
        assert!((sum - Decimal::ONE).abs() <= SUM_TOLERANCE, "sum was {sum}");
    }

    // =========================================================================
    // Scenario Tests
    // =========================================================================

    #[test]
    fn test_capped_asset_excess_redistributed() {
        let capper = AllocationCapper::new(dec!(0.3), 5);
        let outcome = capper.cap(vec![
            summary("A", dec!(2.0), Some(dec!(0.15))),
            summary("B", dec!(1.0), Some(dec!(0.5))),
            summary("C", dec!(1.0), Some(dec!(0.5))),
        ]);

        assert_eq!(outcome.summaries[0].raw_allocation, dec!(0.5));
        assert_eq!(outcome.summaries[0].capped_allocation, dec!(0.15));
        assert_eq!(outcome.summaries[1].capped_allocation, dec!(0.425));
        assert_eq!(outcome.summaries[2].capped_allocation, dec!(0.425));
        assert_eq!(outcome.rounds, 2);
        assert!(outcome.converged);
    }

    #[test]
    fn test_cascading_caps() {
        let capper = AllocationCapper::new(dec!(0.3), 5);
        let weights = vec![
            (dec!(5), dec!(0.3)),
            (dec!(2), dec!(0.3)),
            (dec!(1), dec!(0.3)),
            (dec!(1), dec!(0.3)),
            (dec!(1), dec!(0.3)),
        ];
        let result = capper.cap_weights(&weights);

        assert_sums_to_one(&result.capped);
        for (alloc, (_, cap)) in result.capped.iter().zip(&weights) {
            assert!(*alloc <= *cap + SUM_TOLERANCE);
        }
        assert!(result.converged);
    }

    #[test]
    fn test_capping_is_idempotent() {
        let capper = AllocationCapper::new(dec!(0.3), 5);
        let caps = [dec!(0.15), dec!(0.5), dec!(0.5)];
        let first = capper.cap_weights(&[
            (dec!(2), caps[0]),
            (dec!(1), caps[1]),
            (dec!(1), caps[2]),
        ]);

        let again_input: Vec<(Decimal, Decimal)> =
            first.capped.iter().copied().zip(caps.iter().copied()).collect();
        let second = capper.cap_weights(&again_input);

        assert_eq!(first.capped, second.capped);
    }

    // =========================================================================
    // Edge Case Tests
    // =========================================================================

    #[test]
    fn test_empty_input() {
        let outcome = AllocationCapper::new(dec!(0.15), 5).cap(Vec::new());
        assert!(outcome.summaries.is_empty());
        assert!(outcome.converged);
    }

    #[test]
    fn test_zero_weights_split_equally() {
        let capper = AllocationCapper::new(dec!(0.5), 5);
        let result = capper.cap_weights(&[(Decimal::ZERO, dec!(0.5)), (Decimal::ZERO, dec!(0.5))]);
        assert_eq!(result.raw, vec![dec!(0.5), dec!(0.5)]);
        assert_eq!(result.capped, vec![dec!(0.5), dec!(0.5)]);
    }

    #[test]
    fn test_infeasible_caps_flagged_not_corrected() {
        let capper = AllocationCapper::new(dec!(0.15), 5);
        let outcome = capper.cap(vec![
            summary("A", dec!(1), None),
            summary("B", dec!(1), None),
        ]);

        assert_eq!(outcome.summaries[0].capped_allocation, dec!(0.15));
        assert_eq!(outcome.summaries[1].capped_allocation, dec!(0.15));
        assert!(!outcome.converged);
    }

    #[test]
    fn test_single_uncapped_asset_takes_everything() {
        let capper = AllocationCapper::new(Decimal::ONE, 5);
        let result = capper.cap_weights(&[(dec!(3), Decimal::ONE)]);
        assert_eq!(result.capped, vec![Decimal::ONE]);
        assert_eq!(result.rounds, 1);
        assert!(result.converged);
    }

    #[test]
    fn test_round_bound_respected() {
        let capper = AllocationCapper::new(dec!(0.3), 1);
        let result = capper.cap_weights(&[
            (dec!(5), dec!(0.3)),
            (dec!(2), dec!(0.3)),
            (dec!(1), dec!(0.3)),
            (dec!(1), dec!(0.3)),
            (dec!(1), dec!(0.3)),
        ]);
        assert_eq!(result.rounds, 1);
        assert!(!result.converged);
    }
}
