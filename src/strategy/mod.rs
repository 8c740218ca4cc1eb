//! Rebalancing strategy.
//!
//! Contains the core logic for:
//! - Scoring assets by trailing volume against in-band AMM liquidity
//! - Capping target allocations and redistributing the excess
//! - Measuring holdings and drift
//! - Sizing AMM positions and resting order-book orders per asset
//! - Running the full flatten-and-redeploy cycle

mod allocator;
mod bands;
mod error;
mod executor;
mod holdings;
mod liquidity;
mod rebalancer;
mod scorer;
mod sizing;

pub use allocator::{AllocationCapper, CapOutcome, CappedWeights};
pub use bands::{inside_band, outside_band, price_band, volatility_band, BandKind, PriceBand};
pub use error::{RebalanceError, RebalanceResult};
pub use executor::{ActionExecutor, ExecutionReport, ExecutionStep};
pub use holdings::{drift, measure_holdings, total_over_allocation, PortfolioSnapshot};
pub use liquidity::{position_in_band_value, LiquidityEstimator};
pub use rebalancer::{AssetOutcome, AssetResult, CycleReport, FlattenReport, Rebalancer};
pub use scorer::{score_assets, vol_to_liquidity_ratio, AssetSummary};
pub use sizing::{
    amm_tick_range, plan_orders, plan_split, probe_ratio, AllocationAction, AllocationBranch,
    AmmDeposit, MarketOrder, SizingInput, SplitPlan, VenueSizer,
};
