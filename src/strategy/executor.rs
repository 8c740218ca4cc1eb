//! Action execution against the venues.

use super::sizing::{AllocationAction, AmmDeposit, MarketOrder};
use crate::exchange::{ExecutionContext, LimitOrder, OrderSide, SwapFill};
use crate::utils::decimal::{ceil_to_tick, floor_to_tick, round_down_to_lot};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{error, info};

/// Which venue call an execution step made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStep {
    OpenPosition,
    MarketOrder,
    RestingOrder,
}

/// Result of executing one asset's action.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub asset_id: String,
    pub position_id: Option<String>,
    pub fill: Option<SwapFill>,
    pub order_id: Option<String>,
    /// The order as submitted, after tick and lot rounding
    pub placed_order: Option<LimitOrder>,
    pub failures: Vec<(ExecutionStep, String)>,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Turns sized actions into venue calls. Every step runs independently; a failed
/// step is logged and recorded without stopping the others.
#[derive(Debug, Default)]
pub struct ActionExecutor;

impl ActionExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, ctx: &ExecutionContext, action: &AllocationAction) -> ExecutionReport {
        let asset = action.asset_id.as_str();
        let mut report = ExecutionReport {
            asset_id: asset.to_string(),
            ..Default::default()
        };

        if let Some(deposit) = &action.amm_deposit {
            match self.open_position(ctx, deposit).await {
                Ok(position_id) => {
                    info!(
                        %asset,
                        %position_id,
                        pool = %deposit.pool,
                        tick_lower = deposit.range.lower,
                        tick_upper = deposit.range.upper,
                        liquidity = deposit.quote.liquidity,
                        "AMM position opened"
                    );
                    report.position_id = Some(position_id);
                }
                Err(e) => {
                    error!(%asset, pool = %deposit.pool, error = %e, "Failed to open AMM position");
                    report.failures.push((ExecutionStep::OpenPosition, e.to_string()));
                }
            }
        }

        if let Some(market_order) = &action.market_order {
            match self.market_order(ctx, market_order).await {
                Ok(Some(fill)) => {
                    info!(
                        %asset,
                        input = %fill.input_asset,
                        output = %fill.output_asset,
                        amount_in = fill.amount_in,
                        amount_out = fill.amount_out,
                        "Market order filled"
                    );
                    report.fill = Some(fill);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(%asset, error = %e, "Market order failed");
                    report.failures.push((ExecutionStep::MarketOrder, e.to_string()));
                }
            }
        }

        if let Some(order) = &action.resting_order {
            match self.place_resting_order(ctx, order).await {
                Ok(Some((order_id, placed))) => {
                    info!(
                        %asset,
                        %order_id,
                        market = %placed.market,
                        side = %placed.side,
                        price = %placed.price,
                        size = %placed.size_base,
                        "Resting order placed"
                    );
                    report.order_id = Some(order_id);
                    report.placed_order = Some(placed);
                }
                Ok(None) => {
                    info!(%asset, market = %order.market, "Resting order rounds to zero size, skipped");
                }
                Err(e) => {
                    error!(%asset, market = %order.market, error = %e, "Failed to place resting order");
                    report.failures.push((ExecutionStep::RestingOrder, e.to_string()));
                }
            }
        }

        report
    }

    async fn open_position(&self, ctx: &ExecutionContext, deposit: &AmmDeposit) -> Result<String> {
        ctx.amm
            .open_position(&ctx.owner, &deposit.pool, deposit.range, &deposit.quote)
            .await
    }

    async fn market_order(&self, ctx: &ExecutionContext, order: &MarketOrder) -> Result<Option<SwapFill>> {
        if order.amount_raw == 0 {
            return Ok(None);
        }
        let fill = ctx
            .router
            .market_order(&ctx.owner, &order.input_asset, &order.output_asset, order.amount_raw)
            .await?;
        Ok(Some(fill))
    }

    /// Round to the market's constraints and submit. `None` when the size rounds
    /// to zero lots.
    async fn place_resting_order(
        &self,
        ctx: &ExecutionContext,
        order: &LimitOrder,
    ) -> Result<Option<(String, LimitOrder)>> {
        let info = ctx
            .book
            .market_info(&order.market)
            .await
            .with_context(|| format!("Failed to load market {}", order.market))?;

        let price = match order.side {
            OrderSide::Buy => floor_to_tick(order.price, info.tick_size),
            OrderSide::Sell => ceil_to_tick(order.price, info.tick_size),
        };
        let size_base = round_down_to_lot(order.size_base, info.base_lot_size);
        if size_base <= Decimal::ZERO || price <= Decimal::ZERO {
            return Ok(None);
        }

        let rounded = LimitOrder {
            market: order.market.clone(),
            side: order.side,
            price,
            size_base,
        };
        let order_id = ctx.book.place_order(&ctx.owner, &rounded).await?;
        Ok(Some((order_id, rounded)))
    }
}
