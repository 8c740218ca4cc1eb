//! Aggregate in-band AMM liquidity per asset.
//!
//! Only liquidity near the current price is useful to a trader, so each
//! position's USD value is prorated by how much of its tick range overlaps a
//! volatility band around the latest price.

use super::bands::volatility_band;
use crate::config::Config;
use crate::exchange::{AmmVenue, MarketDescriptor, PoolDescriptor, PoolState, PositionRecord, PriceHistory, TickRange};
use crate::utils::clmm;
use crate::utils::decimal::{from_f64, to_f64};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// USD value of `position` inside `band` (pool ticks), at the pool's current price.
///
/// `price_a` and `price_b` are USD prices of the pool's tokens.
pub fn position_in_band_value(
    position: &PositionRecord,
    band: TickRange,
    pool: &PoolState,
    price_a: Decimal,
    price_b: Decimal,
) -> Decimal {
    let width = position.tick_upper - position.tick_lower;
    if position.liquidity == 0 || width <= 0 {
        return Decimal::ZERO;
    }
    let overlap = position.tick_upper.min(band.upper) - position.tick_lower.max(band.lower);
    if overlap <= 0 {
        return Decimal::ZERO;
    }

    let (raw_a, raw_b) = clmm::token_amounts_from_liquidity(
        position.liquidity,
        clmm::sqrt_price_from_x64(pool.sqrt_price_x64),
        clmm::tick_to_sqrt_price(position.tick_lower),
        clmm::tick_to_sqrt_price(position.tick_upper),
    );
    let value = raw_a / 10f64.powi(pool.decimals_a as i32) * to_f64(price_a)
        + raw_b / 10f64.powi(pool.decimals_b as i32) * to_f64(price_b);
    let share = overlap as f64 / width as f64;

    from_f64(value * share).unwrap_or(Decimal::ZERO)
}

/// Sums in-band liquidity across every pool pairing a tracked asset with the quote.
pub struct LiquidityEstimator<'a> {
    config: &'a Config,
    history: &'a dyn PriceHistory,
    amm: &'a dyn AmmVenue,
}

impl<'a> LiquidityEstimator<'a> {
    pub fn new(config: &'a Config, history: &'a dyn PriceHistory, amm: &'a dyn AmmVenue) -> Self {
        Self { config, history, amm }
    }

    /// In-band USD liquidity keyed by asset id. Pools that fail any lookup are
    /// skipped.
    #[instrument(skip_all, fields(pools = pools.len()))]
    pub async fn estimate(
        &self,
        tracked: &HashSet<String>,
        prices: &HashMap<String, Decimal>,
        pools: &[PoolDescriptor],
        markets: &[MarketDescriptor],
    ) -> HashMap<String, Decimal> {
        let quote = self.config.quote.asset_id.as_str();
        let mut totals: HashMap<String, Decimal> = HashMap::new();

        for pool in pools {
            let Some(asset) = tracked_asset(pool, quote, tracked) else {
                continue;
            };
            let (Some(&price_a), Some(&price_b)) =
                (prices.get(&pool.token_a), prices.get(&pool.token_b))
            else {
                debug!(pool = %pool.address, "Skipping pool without prices");
                continue;
            };
            if self.config.liquidity.skip_if_no_orderbook
                && !markets.iter().any(|m| m.base_asset == asset && m.quote_asset == quote)
            {
                debug!(pool = %pool.address, %asset, "Skipping pool without order-book market");
                continue;
            }

            match self.pool_value(pool, price_a, price_b).await {
                Ok(value) if value > Decimal::ZERO => {
                    *totals.entry(pool.token_a.clone()).or_default() += value;
                    *totals.entry(pool.token_b.clone()).or_default() += value;
                }
                Ok(_) => {}
                Err(e) => debug!(pool = %pool.address, error = %e, "Skipping pool"),
            }
        }

        info!(assets = totals.len(), "Liquidity estimated");
        totals
    }

    async fn pool_value(&self, pool: &PoolDescriptor, price_a: Decimal, price_b: Decimal) -> Result<Decimal> {
        let stats = self
            .history
            .price_stats(&pool.token_a, &pool.token_b, self.config.bands.interval_hours)
            .await?
            .with_context(|| format!("No price history for {}/{}", pool.token_a, pool.token_b))?;
        let state = self.amm.pool_state(&pool.address).await?;
        if state.sqrt_price_x64 == 0 {
            anyhow::bail!("Pool {} has no price", pool.address);
        }

        let band = volatility_band(&stats, &self.config.bands);
        let band_ticks = TickRange {
            lower: clmm::price_to_tick(to_f64(band.lower), state.decimals_a, state.decimals_b),
            upper: clmm::price_to_tick(to_f64(band.upper), state.decimals_a, state.decimals_b),
        };

        let positions = self.amm.positions(&pool.address).await?;
        let value: Decimal = positions
            .iter()
            .map(|p| position_in_band_value(p, band_ticks, &state, price_a, price_b))
            .sum();

        debug!(
            pool = %pool.address,
            positions = positions.len(),
            band_lower = %band.lower,
            band_upper = %band.upper,
            in_band_usd = %value,
            "Pool liquidity"
        );
        Ok(value)
    }
}

/// The tracked non-quote token of a pool that pairs it with the quote asset.
fn tracked_asset<'p>(pool: &'p PoolDescriptor, quote: &str, tracked: &HashSet<String>) -> Option<&'p str> {
    let other = if pool.token_a == quote {
        &pool.token_b
    } else if pool.token_b == quote {
        &pool.token_a
    } else {
        return None;
    };
    tracked.contains(other).then_some(other.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockPriceHistory, PaperVenue, PriceStats};
    use rust_decimal_macros::dec;

    fn sol_state() -> PoolState {
        PoolState {
            address: "pool-sol".to_string(),
            token_a: "SOL".to_string(),
            token_b: "USDC".to_string(),
            decimals_a: 9,
            decimals_b: 6,
            sqrt_price_x64: clmm::price_to_sqrt_price_x64(150.0, 9, 6),
            tick_current: clmm::price_to_tick(150.0, 9, 6),
            tick_spacing: 64,
        }
    }

    fn position(lower: i32, upper: i32, liquidity: u128) -> PositionRecord {
        PositionRecord {
            position_id: "p".to_string(),
            pool: "pool-sol".to_string(),
            owner: "lp".to_string(),
            tick_lower: lower,
            tick_upper: upper,
            liquidity,
        }
    }

    // =========================================================================
    // Proration Tests
    // =========================================================================

    /// USD value of the whole position, straight from the token amounts.
    fn whole_value(p: &PositionRecord, pool: &PoolState) -> Decimal {
        let (raw_a, raw_b) = clmm::token_amounts_from_liquidity(
            p.liquidity,
            clmm::sqrt_price_from_x64(pool.sqrt_price_x64),
            clmm::tick_to_sqrt_price(p.tick_lower),
            clmm::tick_to_sqrt_price(p.tick_upper),
        );
        let usd = raw_a / 1e9 * 150.0 + raw_b / 1e6;
        from_f64(usd).unwrap()
    }

    #[test]
    fn test_position_fully_inside_band_counts_whole_value() {
        let pool = sol_state();
        let t = pool.tick_current;
        let p = position(t - 640, t + 640, 1_000_000_000);
        let expected = whole_value(&p, &pool);
        assert!(expected > Decimal::ZERO);

        let wide = TickRange { lower: t - 6400, upper: t + 6400 };
        let inside = position_in_band_value(&p, wide, &pool, dec!(150), Decimal::ONE);
        assert!((inside - expected).abs() < dec!(0.000001), "inside {inside} expected {expected}");
    }

    #[test]
    fn test_band_covering_part_of_position_prorates_whole_value() {
        let pool = sol_state();
        let t = pool.tick_current;
        let p = position(t - 640, t + 640, 1_000_000_000);
        let expected = whole_value(&p, &pool) * dec!(0.75);

        // overlap 960 of 1280 ticks
        let band = TickRange { lower: t - 6400, upper: t + 320 };
        let partial = position_in_band_value(&p, band, &pool, dec!(150), Decimal::ONE);
        assert!((partial - expected).abs() < dec!(0.000001), "partial {partial} expected {expected}");
    }

    #[test]
    fn test_position_outside_band_counts_nothing() {
        let pool = sol_state();
        let t = pool.tick_current;
        let p = position(t + 1000, t + 2000, 1_000_000_000);
        let band = TickRange { lower: t - 500, upper: t + 500 };

        assert_eq!(position_in_band_value(&p, band, &pool, dec!(150), Decimal::ONE), Decimal::ZERO);
    }

    #[test]
    fn test_partial_overlap_is_prorated() {
        let pool = sol_state();
        let t = pool.tick_current;
        let p = position(t - 1000, t + 1000, 1_000_000_000);
        let full = position_in_band_value(&p, TickRange { lower: t - 1000, upper: t + 1000 }, &pool, dec!(150), Decimal::ONE);
        let half = position_in_band_value(&p, TickRange { lower: t, upper: t + 5000 }, &pool, dec!(150), Decimal::ONE);

        let diff = (full / dec!(2) - half).abs();
        assert!(diff < dec!(0.000001), "full {full} half {half}");
    }

    #[test]
    fn test_empty_positions_skipped() {
        let pool = sol_state();
        let band = TickRange { lower: -100_000, upper: 100_000 };
        assert_eq!(position_in_band_value(&position(0, 100, 0), band, &pool, dec!(150), Decimal::ONE), Decimal::ZERO);
        assert_eq!(position_in_band_value(&position(100, 100, 1000), band, &pool, dec!(150), Decimal::ONE), Decimal::ZERO);
    }

    // =========================================================================
    // Estimator Tests
    // =========================================================================

    async fn venue() -> PaperVenue {
        let venue = PaperVenue::new(dec!(0.05));
        venue.add_asset("SOL", 9, dec!(150)).await;
        venue.add_asset("USDC", 6, Decimal::ONE).await;
        venue.add_pool(&descriptor(), 150.0).await.unwrap();
        let t = sol_state().tick_current;
        venue
            .add_position("lp", "pool-sol", TickRange { lower: t - 128, upper: t + 128 }, 5_000_000_000)
            .await;
        venue
    }

    fn descriptor() -> PoolDescriptor {
        PoolDescriptor {
            address: "pool-sol".to_string(),
            token_a: "SOL".to_string(),
            token_b: "USDC".to_string(),
            tick_spacing: 64,
            fee_rate: dec!(0.003),
            approved: true,
        }
    }

    fn market() -> MarketDescriptor {
        MarketDescriptor {
            address: "mkt-sol".to_string(),
            base_asset: "SOL".to_string(),
            quote_asset: "USDC".to_string(),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.quote.asset_id = "USDC".to_string();
        config
    }

    fn prices() -> HashMap<String, Decimal> {
        HashMap::from([("SOL".to_string(), dec!(150)), ("USDC".to_string(), Decimal::ONE)])
    }

    fn history() -> MockPriceHistory {
        let mut history = MockPriceHistory::new();
        history
            .expect_price_stats()
            .returning(|_, _, _| Ok(PriceStats::from_series(&[dec!(140), dec!(160), dec!(150)])));
        history
    }

    #[tokio::test]
    async fn test_pool_total_credited_to_both_tokens() {
        let venue = venue().await;
        let history = history();
        let config = config();
        let estimator = LiquidityEstimator::new(&config, &history, &venue);

        let tracked = HashSet::from(["SOL".to_string()]);
        let totals = estimator
            .estimate(&tracked, &prices(), &[descriptor()], &[market()])
            .await;

        let sol = totals["SOL"];
        assert!(sol > Decimal::ZERO);
        assert_eq!(totals["USDC"], sol);
    }

    #[tokio::test]
    async fn test_pool_without_market_skipped() {
        let venue = venue().await;
        let history = history();
        let config = config();
        let estimator = LiquidityEstimator::new(&config, &history, &venue);

        let tracked = HashSet::from(["SOL".to_string()]);
        let totals = estimator.estimate(&tracked, &prices(), &[descriptor()], &[]).await;
        assert!(totals.is_empty());
    }

    #[tokio::test]
    async fn test_failed_statistics_skipped() {
        let venue = venue().await;
        let mut history = MockPriceHistory::new();
        history
            .expect_price_stats()
            .returning(|_, _, _| Err(anyhow::anyhow!("database locked")));
        let config = config();
        let estimator = LiquidityEstimator::new(&config, &history, &venue);

        let tracked = HashSet::from(["SOL".to_string()]);
        let totals = estimator
            .estimate(&tracked, &prices(), &[descriptor()], &[market()])
            .await;
        assert!(totals.is_empty());
    }
}
