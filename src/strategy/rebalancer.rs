//! The rebalance cycle: flatten, score, cap, measure, size, execute.

use super::allocator::AllocationCapper;
use super::error::RebalanceError;
use super::executor::{ActionExecutor, ExecutionReport};
use super::holdings::{drift, measure_holdings, total_over_allocation, PortfolioSnapshot};
use super::liquidity::LiquidityEstimator;
use super::scorer::{score_assets, AssetSummary};
use super::sizing::{AllocationAction, SizingInput, VenueSizer};
use crate::config::Config;
use crate::exchange::{
    BookAccountState, ExecutionContext, MarketDataSource, MarketDescriptor, PoolDescriptor,
    PriceHistory,
};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What happened while closing out the previous cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlattenReport {
    pub positions_closed: usize,
    pub orders_cancelled: usize,
    pub events_cranked: usize,
    pub markets_settled: usize,
    /// False if any phase was still pending after the last poll
    pub confirmed: bool,
}

/// Per-asset result of a cycle.
#[derive(Debug)]
pub enum AssetOutcome {
    /// Excluded before capping
    Untradable(RebalanceError),
    /// Sizing failed
    Failed(RebalanceError),
    Executed {
        action: AllocationAction,
        report: ExecutionReport,
    },
}

#[derive(Debug)]
pub struct AssetResult {
    pub asset_id: String,
    pub outcome: AssetOutcome,
}

/// Summary of one `run_rebalance_cycle` call.
#[derive(Debug)]
pub struct CycleReport {
    pub flatten: FlattenReport,
    /// Assets that passed the volume threshold and approval
    pub scored: usize,
    pub capping_rounds: u32,
    pub capping_converged: bool,
    pub snapshot: PortfolioSnapshot,
    /// Sum of positive `current - capped` drifts before execution
    pub over_allocation: Decimal,
    pub summaries: Vec<AssetSummary>,
    pub results: Vec<AssetResult>,
}

impl CycleReport {
    pub fn executed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, AssetOutcome::Executed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, AssetOutcome::Failed(_)))
            .count()
    }

    /// Sizing failures caused by a venue call rather than missing data.
    pub fn venue_failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(&r.outcome, AssetOutcome::Failed(e) if !e.is_data_gap()))
            .count()
    }
}

/// Drives rebalance cycles for one configuration.
pub struct Rebalancer {
    config: Config,
    history: Arc<dyn PriceHistory>,
    data: Arc<dyn MarketDataSource>,
    executor: ActionExecutor,
}

impl Rebalancer {
    pub fn new(config: Config, history: Arc<dyn PriceHistory>, data: Arc<dyn MarketDataSource>) -> Self {
        Self {
            config,
            history,
            data,
            executor: ActionExecutor::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one full cycle for `ctx.owner`.
    ///
    /// Fails only when the cycle inputs cannot be loaded. Per-asset problems are
    /// reported in [`CycleReport::results`].
    #[instrument(skip_all, fields(owner = %ctx.owner))]
    pub async fn run_rebalance_cycle(&self, ctx: &ExecutionContext) -> Result<CycleReport> {
        let config = &self.config;
        let quote = config.quote.asset_id.as_str();

        let markets = self
            .data
            .orderbook_markets()
            .await
            .context("Failed to load order-book markets")?;
        let flatten = self.flatten(ctx, &markets).await;

        let mut volumes = self
            .data
            .recent_volumes(config.volume.window_hours, config.volume.min_volume_usd)
            .await
            .context("Failed to load volumes")?;
        volumes.remove(quote);
        for excluded in &config.volume.excluded_assets {
            volumes.remove(excluded);
        }
        let assets = self
            .data
            .approved_assets()
            .await
            .context("Failed to load approved assets")?;
        let prices = self
            .data
            .latest_prices()
            .await
            .context("Failed to load prices")?;
        let pools = self.data.amm_pools().await.context("Failed to load AMM pools")?;

        let tracked: HashSet<String> = volumes.keys().cloned().collect();
        let liquidity = LiquidityEstimator::new(config, self.history.as_ref(), ctx.amm.as_ref())
            .estimate(&tracked, &prices, &pools, &markets)
            .await;

        let scored = score_assets(&volumes, &liquidity, &assets, &config.allocation);
        let scored_count = scored.len();

        let mut results = Vec::new();
        let mut tradable = Vec::with_capacity(scored.len());
        for summary in scored {
            match tradability(&summary.asset_id, quote, &pools, &markets, &prices) {
                Ok(()) => tradable.push(summary),
                Err(e) => {
                    warn!(asset = %summary.asset_id, reason = %e, "Asset not tradable, skipping");
                    results.push(AssetResult {
                        asset_id: summary.asset_id,
                        outcome: AssetOutcome::Untradable(e),
                    });
                }
            }
        }

        let capped = AllocationCapper::from_config(&config.allocation).cap(tradable);
        let mut summaries = capped.summaries;

        let snapshot = measure_holdings(
            ctx.balances.as_ref(),
            &ctx.owner,
            &mut summaries,
            &prices,
            quote,
            config.quote.decimals,
        )
        .await;
        let over_allocation = total_over_allocation(&summaries);

        let sizer = VenueSizer::new(config, self.history.as_ref(), ctx.amm.as_ref());
        let quote_price = prices.get(quote).copied().unwrap_or(Decimal::ONE);

        for summary in &summaries {
            let asset = summary.asset_id.as_str();
            let (Some(pool), Some(market)) = (
                approved_pool(&pools, asset, quote),
                markets.iter().find(|m| m.base_asset == asset && m.quote_asset == quote),
            ) else {
                continue;
            };

            let input = SizingInput {
                summary,
                pool,
                market,
                asset_price: prices.get(asset).copied().unwrap_or(Decimal::ZERO),
                quote_price,
                total_value_usd: snapshot.total_value_usd,
            };

            debug!(%asset, drift = %drift(summary), "Sizing asset");
            let outcome = match sizer.size_asset(&input).await {
                Ok(action) => {
                    let report = self.executor.execute(ctx, &action).await;
                    AssetOutcome::Executed { action, report }
                }
                Err(e) if e.is_data_gap() => {
                    info!(%asset, reason = %e, "Missing data, skipping asset");
                    AssetOutcome::Failed(e)
                }
                Err(e) => {
                    warn!(%asset, error = %e, "Venue call failed while sizing, skipping asset");
                    AssetOutcome::Failed(e)
                }
            };
            results.push(AssetResult {
                asset_id: asset.to_string(),
                outcome,
            });
        }

        let report = CycleReport {
            flatten,
            scored: scored_count,
            capping_rounds: capped.rounds,
            capping_converged: capped.converged,
            snapshot,
            over_allocation,
            summaries,
            results,
        };

        info!(
            scored = report.scored,
            allocated = report.summaries.len(),
            executed = report.executed(),
            failed = report.failed(),
            venue_failures = report.venue_failures(),
            over_allocation = %report.over_allocation,
            total_value_usd = %report.snapshot.total_value_usd,
            "Rebalance cycle complete"
        );

        Ok(report)
    }

    /// Close positions, cancel orders, crank and settle every market, confirming
    /// each phase by polling venue state.
    #[instrument(skip_all)]
    async fn flatten(&self, ctx: &ExecutionContext, markets: &[MarketDescriptor]) -> FlattenReport {
        let owner = ctx.owner.as_str();
        let mut report = FlattenReport::default();

        match ctx.amm.close_all_positions(owner).await {
            Ok(n) => report.positions_closed = n,
            Err(e) => warn!(error = %e, "Failed to close AMM positions"),
        }
        let positions_clear = self
            .wait_until("positions closed", || async move {
                Ok::<_, anyhow::Error>(ctx.amm.owned_position_count(owner).await? == 0)
            })
            .await;

        for market in markets {
            match ctx.book.cancel_orders(owner, &market.address).await {
                Ok(n) => report.orders_cancelled += n,
                Err(e) => warn!(market = %market.address, error = %e, "Failed to cancel orders"),
            }
        }
        let orders_clear = self
            .wait_until("orders cancelled", || {
                all_markets(ctx, markets, |s| s.open_orders == 0)
            })
            .await;

        for market in markets {
            match ctx.book.crank(&market.address).await {
                Ok(n) => report.events_cranked += n,
                Err(e) => warn!(market = %market.address, error = %e, "Failed to crank market"),
            }
        }
        let events_clear = self
            .wait_until("events cranked", || {
                all_markets(ctx, markets, |s| s.pending_events == 0)
            })
            .await;

        for market in markets {
            if self.settle_with_retries(ctx, market).await {
                report.markets_settled += 1;
            }
        }
        let funds_clear = self
            .wait_until("accounts flat", || all_markets(ctx, markets, BookAccountState::is_flat))
            .await;

        report.confirmed = positions_clear && orders_clear && events_clear && funds_clear;
        info!(
            positions_closed = report.positions_closed,
            orders_cancelled = report.orders_cancelled,
            events_cranked = report.events_cranked,
            markets_settled = report.markets_settled,
            confirmed = report.confirmed,
            "Flattened"
        );
        report
    }

    async fn settle_with_retries(&self, ctx: &ExecutionContext, market: &MarketDescriptor) -> bool {
        let settlement = &self.config.settlement;
        let retries = settlement.settle_retries.max(1);

        for attempt in 1..=retries {
            match ctx.book.settle_funds(&ctx.owner, &market.address).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        market = %market.address,
                        attempt,
                        retries,
                        error = %e,
                        "Settle failed, retrying"
                    );
                    if attempt < retries {
                        if let Err(e) = ctx.book.crank(&market.address).await {
                            debug!(market = %market.address, error = %e, "Crank before retry failed");
                        }
                        tokio::time::sleep(Duration::from_millis(settlement.poll_interval_ms)).await;
                    }
                }
            }
        }
        false
    }

    /// Poll `check` until it reports true, up to `max_polls` times. A failed
    /// check counts as not yet done.
    async fn wait_until<F, Fut>(&self, phase: &str, check: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let settlement = &self.config.settlement;
        for poll in 1..=settlement.max_polls.max(1) {
            match check().await {
                Ok(true) => return true,
                Ok(false) => debug!(phase, poll, "Waiting on venue state"),
                Err(e) => debug!(phase, poll, error = %e, "Venue state check failed"),
            }
            if poll < settlement.max_polls {
                tokio::time::sleep(Duration::from_millis(settlement.poll_interval_ms)).await;
            }
        }
        warn!(phase, polls = settlement.max_polls, "Venue state not confirmed, proceeding");
        false
    }
}

/// True if `pred` holds for the owner's account on every market.
async fn all_markets(
    ctx: &ExecutionContext,
    markets: &[MarketDescriptor],
    pred: fn(&BookAccountState) -> bool,
) -> Result<bool> {
    for market in markets {
        let state = ctx.book.account_state(&ctx.owner, &market.address).await?;
        if !pred(&state) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn approved_pool<'p>(pools: &'p [PoolDescriptor], asset: &str, quote: &str) -> Option<&'p PoolDescriptor> {
    pools.iter().find(|p| p.approved && p.pairs(asset, quote))
}

/// An asset is tradable with an approved pool, an order-book market and a price.
fn tradability(
    asset: &str,
    quote: &str,
    pools: &[PoolDescriptor],
    markets: &[MarketDescriptor],
    prices: &HashMap<String, Decimal>,
) -> Result<(), RebalanceError> {
    if approved_pool(pools, asset, quote).is_none() {
        return Err(RebalanceError::MissingPool(asset.to_string()));
    }
    if !markets.iter().any(|m| m.base_asset == asset && m.quote_asset == quote) {
        return Err(RebalanceError::MissingMarket(asset.to_string()));
    }
    match prices.get(asset) {
        Some(p) if *p > Decimal::ZERO => Ok(()),
        _ => Err(RebalanceError::MissingPrice(asset.to_string())),
    }
}
