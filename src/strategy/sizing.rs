//! Venue sizing: how much of an asset's target goes into a new AMM position and
//! how much drift is corrected with resting order-book orders.

use super::bands::{inside_band, outside_band, PriceBand};
use super::error::{RebalanceError, RebalanceResult};
use super::scorer::AssetSummary;
use crate::config::{Config, SizingConfig};
use crate::exchange::{
    AmmVenue, DepositQuote, LimitOrder, MarketDescriptor, OrderSide, PoolDescriptor, PoolState,
    PriceHistory, TickRange,
};
use crate::utils::clmm;
use crate::utils::decimal::{from_f64, raw_to_readable, readable_to_raw, safe_div, to_f64};
use rust_decimal::Decimal;
use std::fmt;
use tracing::{debug, instrument};

/// Which side limits the new AMM position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationBranch {
    /// Enough base on hand; sized from the quote budget
    QuoteLimited,
    /// Short of base; sized from base holdings
    BaseLimited,
    /// Holding more than the target
    OverAllocated,
}

impl fmt::Display for AllocationBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationBranch::QuoteLimited => write!(f, "quote-limited"),
            AllocationBranch::BaseLimited => write!(f, "base-limited"),
            AllocationBranch::OverAllocated => write!(f, "over-allocated"),
        }
    }
}

/// Pure split of an asset's target between the AMM sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPlan {
    pub branch: AllocationBranch,
    pub ratio_base_of_total: Decimal,
    pub total_allocation_usd: Decimal,
    pub max_base_deployment_usd: Decimal,
    /// Positive = base-heavy, negative = quote-heavy
    pub delta_usd: Decimal,
    pub amm_quote_usd: Decimal,
    pub amm_base_usd: Decimal,
}

/// A deposit ready to open.
#[derive(Debug, Clone, PartialEq)]
pub struct AmmDeposit {
    pub pool: String,
    pub range: TickRange,
    pub input_asset: String,
    pub input_amount_raw: u64,
    pub quote: DepositQuote,
}

/// Immediate swap seeding the resting order's direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrder {
    pub input_asset: String,
    pub output_asset: String,
    pub amount_raw: u64,
}

/// Everything the cycle decided for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationAction {
    pub asset_id: String,
    pub plan: SplitPlan,
    pub amm_deposit: Option<AmmDeposit>,
    /// `None` when drift is under the order threshold
    pub resting_order: Option<LimitOrder>,
    pub market_order: Option<MarketOrder>,
}

/// Base share of a probe deposit: `base_usd / (probe_usd + base_usd)`.
pub fn probe_ratio(base_usd: Decimal, probe_usd: Decimal) -> Decimal {
    safe_div(base_usd, probe_usd + base_usd)
}

/// Split the target allocation between the AMM's quote and base sides.
pub fn plan_split(
    ratio_base_of_total: Decimal,
    current_allocation: Decimal,
    capped_allocation: Decimal,
    holdings_usd: Decimal,
    total_value_usd: Decimal,
    config: &SizingConfig,
) -> SplitPlan {
    let fudge = config.fudge_factor;
    let ratio = ratio_base_of_total;
    let quote_share = Decimal::ONE - ratio;

    let total_allocation_usd = capped_allocation * total_value_usd;
    let max_base_deployment_usd = ratio * total_allocation_usd;
    let delta_usd = holdings_usd - max_base_deployment_usd;
    let over_allocated = current_allocation > capped_allocation;

    let (branch, quote, base) = if over_allocated {
        let base = (holdings_usd - delta_usd) * fudge;
        (AllocationBranch::OverAllocated, base * quote_share, base)
    } else if delta_usd >= Decimal::ZERO {
        let mut quote = (total_allocation_usd - holdings_usd) * fudge;
        let mut base = ratio * quote;
        let floor = config.forgiveness_factor * total_allocation_usd;
        if quote < floor {
            quote = floor * fudge;
            base = safe_div(quote, quote_share);
            if base > max_base_deployment_usd {
                base = max_base_deployment_usd * fudge;
                quote = base * quote_share;
            }
        }
        (
            AllocationBranch::QuoteLimited,
            quote,
            base.min(max_base_deployment_usd),
        )
    } else {
        let base = holdings_usd * fudge;
        (AllocationBranch::BaseLimited, base * quote_share, base)
    };

    SplitPlan {
        branch,
        ratio_base_of_total: ratio,
        total_allocation_usd,
        max_base_deployment_usd,
        delta_usd,
        amm_quote_usd: quote.max(Decimal::ZERO),
        amm_base_usd: base.max(Decimal::ZERO),
    }
}

/// Resting order (and its seeding market order) correcting `delta_usd`.
///
/// Base-heavy drift sells at the band's upper edge; quote-heavy drift buys at
/// the lower edge. Nothing is emitted while `|delta_usd|` is within the threshold.
pub fn plan_orders(
    delta_usd: Decimal,
    quote_price: Decimal,
    band: &PriceBand,
    market: &MarketDescriptor,
    asset_decimals: u8,
    quote_decimals: u8,
    config: &SizingConfig,
) -> (Option<LimitOrder>, Option<MarketOrder>) {
    if delta_usd.abs() <= config.min_order_usd || quote_price <= Decimal::ZERO {
        return (None, None);
    }

    let quote_amount = delta_usd.abs() / quote_price;
    let (side, price) = if delta_usd > Decimal::ZERO {
        (OrderSide::Sell, band.upper)
    } else {
        (OrderSide::Buy, band.lower)
    };
    if price <= Decimal::ZERO {
        return (None, None);
    }

    let size_base = (quote_amount / price).round_dp(asset_decimals as u32);
    if size_base <= Decimal::ZERO {
        return (None, None);
    }

    let market_order = match side {
        OrderSide::Sell => MarketOrder {
            input_asset: market.base_asset.clone(),
            output_asset: market.quote_asset.clone(),
            amount_raw: readable_to_raw(size_base * config.market_order_proportion, asset_decimals),
        },
        OrderSide::Buy => MarketOrder {
            input_asset: market.quote_asset.clone(),
            output_asset: market.base_asset.clone(),
            amount_raw: readable_to_raw(quote_amount * config.market_order_proportion, quote_decimals),
        },
    };

    let order = LimitOrder {
        market: market.address.clone(),
        side,
        price,
        size_base,
    };
    (Some(order), (market_order.amount_raw > 0).then_some(market_order))
}

/// Tick range covering `band` (pool orientation), snapped to the spacing grid.
pub fn amm_tick_range(pool: &PoolState, band: &PriceBand) -> TickRange {
    let spacing = pool.tick_spacing.max(1);
    let snap = |price: Decimal| {
        clmm::initializable_tick(
            clmm::price_to_tick(to_f64(price), pool.decimals_a, pool.decimals_b),
            spacing,
        )
    };

    let lower = snap(band.lower);
    let mut upper = snap(band.upper);
    if upper <= lower {
        upper = lower + spacing as i32;
    }
    TickRange { lower, upper }
}

/// Inputs for sizing one asset.
#[derive(Debug, Clone, Copy)]
pub struct SizingInput<'a> {
    pub summary: &'a AssetSummary,
    pub pool: &'a PoolDescriptor,
    pub market: &'a MarketDescriptor,
    pub asset_price: Decimal,
    pub quote_price: Decimal,
    pub total_value_usd: Decimal,
}

/// Sizes assets against live pool state and price history.
pub struct VenueSizer<'a> {
    config: &'a Config,
    history: &'a dyn PriceHistory,
    amm: &'a dyn AmmVenue,
}

impl<'a> VenueSizer<'a> {
    pub fn new(config: &'a Config, history: &'a dyn PriceHistory, amm: &'a dyn AmmVenue) -> Self {
        Self { config, history, amm }
    }

    /// Decide the AMM deposit and order-book orders for one asset.
    #[instrument(skip(self, input), fields(asset = %input.summary.asset_id))]
    pub async fn size_asset(&self, input: &SizingInput<'_>) -> RebalanceResult<AllocationAction> {
        let asset = input.summary.asset_id.as_str();
        let quote_asset = self.config.quote.asset_id.as_str();
        let window = self.config.bands.interval_hours;

        if input.asset_price <= Decimal::ZERO {
            return Err(RebalanceError::MissingPrice(asset.to_string()));
        }
        if input.quote_price <= Decimal::ZERO {
            return Err(RebalanceError::MissingPrice(quote_asset.to_string()));
        }
        if input.market.base_asset != asset || input.market.quote_asset != quote_asset {
            return Err(RebalanceError::PolarityMismatch(format!(
                "market {} trades {}/{}",
                input.market.address, input.market.base_asset, input.market.quote_asset
            )));
        }

        let pool = self
            .amm
            .pool_state(&input.pool.address)
            .await
            .map_err(|e| RebalanceError::venue("pool_state", e))?;
        if pool.sqrt_price_x64 == 0 || pool.tick_spacing == 0 {
            return Err(RebalanceError::InvalidPoolState(format!(
                "pool {} has sqrt price {} and tick spacing {}",
                pool.address, pool.sqrt_price_x64, pool.tick_spacing
            )));
        }
        let asset_is_a = if pool.token_a == asset && pool.token_b == quote_asset {
            true
        } else if pool.token_a == quote_asset && pool.token_b == asset {
            false
        } else {
            return Err(RebalanceError::PolarityMismatch(format!(
                "pool {} holds {}/{}",
                pool.address, pool.token_a, pool.token_b
            )));
        };

        // Order-book band in quote per asset
        let book_stats = self
            .history
            .price_stats(asset, quote_asset, window)
            .await
            .map_err(|e| RebalanceError::venue("price_stats", e))?
            .ok_or_else(|| RebalanceError::NoPriceHistory(format!("{asset}/{quote_asset}")))?;
        let book_band = inside_band(&book_stats, &self.config.bands);

        // AMM band in pool orientation (token B per token A)
        let pool_stats = self
            .history
            .price_stats(&pool.token_a, &pool.token_b, window)
            .await
            .map_err(|e| RebalanceError::venue("price_stats", e))?
            .ok_or_else(|| {
                RebalanceError::NoPriceHistory(format!("{}/{}", pool.token_a, pool.token_b))
            })?;
        let spot = from_f64(clmm::sqrt_price_x64_to_price(
            pool.sqrt_price_x64,
            pool.decimals_a,
            pool.decimals_b,
        ));
        let amm_band = outside_band(&pool_stats, spot, &self.config.bands);
        let range = amm_tick_range(&pool, &amm_band);

        let (asset_decimals, quote_decimals) = if asset_is_a {
            (pool.decimals_a, pool.decimals_b)
        } else {
            (pool.decimals_b, pool.decimals_a)
        };

        let sizing = &self.config.sizing;
        let probe_raw = readable_to_raw(sizing.probe_quote_usd / input.quote_price, quote_decimals);
        let probe = self
            .amm
            .quote_deposit(&pool.address, range, quote_asset, probe_raw)
            .await
            .map_err(|e| RebalanceError::venue("quote_deposit", e))?;
        let probe_base_raw = if asset_is_a { probe.est_a } else { probe.est_b };
        let probe_base_usd = raw_to_readable(probe_base_raw, asset_decimals) * input.asset_price;
        let ratio = probe_ratio(probe_base_usd, sizing.probe_quote_usd);

        let plan = plan_split(
            ratio,
            input.summary.current_allocation,
            input.summary.capped_allocation,
            input.summary.holdings_usd,
            input.total_value_usd,
            sizing,
        );

        debug!(
            branch = %plan.branch,
            ratio = %plan.ratio_base_of_total,
            total_allocation_usd = %plan.total_allocation_usd,
            max_base_deployment_usd = %plan.max_base_deployment_usd,
            delta_usd = %plan.delta_usd,
            amm_quote_usd = %plan.amm_quote_usd,
            amm_base_usd = %plan.amm_base_usd,
            tick_lower = range.lower,
            tick_upper = range.upper,
            "Sized asset"
        );

        let amm_deposit = if plan.amm_quote_usd + plan.amm_base_usd > sizing.min_position_usd {
            let (input_asset, amount_raw) = match plan.branch {
                AllocationBranch::QuoteLimited => (
                    quote_asset,
                    readable_to_raw(plan.amm_quote_usd / input.quote_price, quote_decimals),
                ),
                AllocationBranch::BaseLimited | AllocationBranch::OverAllocated => (
                    asset,
                    readable_to_raw(plan.amm_base_usd / input.asset_price, asset_decimals),
                ),
            };

            if amount_raw == 0 {
                None
            } else {
                let quote = self
                    .amm
                    .quote_deposit(&pool.address, range, input_asset, amount_raw)
                    .await
                    .map_err(|e| RebalanceError::venue("quote_deposit", e))?;
                (quote.liquidity > 0).then(|| AmmDeposit {
                    pool: pool.address.clone(),
                    range,
                    input_asset: input_asset.to_string(),
                    input_amount_raw: amount_raw,
                    quote,
                })
            }
        } else {
            None
        };

        let (resting_order, market_order) = plan_orders(
            plan.delta_usd,
            input.quote_price,
            &book_band,
            input.market,
            asset_decimals,
            quote_decimals,
            sizing,
        );

        Ok(AllocationAction {
            asset_id: asset.to_string(),
            plan,
            amm_deposit,
            resting_order,
            market_order,
        })
    }
}
