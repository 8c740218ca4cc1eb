//! Venue-agnostic traits for the rebalancer's collaborators.
//!
//! The engine never talks to a concrete venue. It is handed implementations of:
//! - `PriceHistory` / `MarketDataSource` for statistics and market listings
//! - `AmmVenue` and `OrderBookVenue` for the two trading venues
//! - `SwapRouter` for immediate market orders
//! - `BalanceSource` for wallet balances

use super::types::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Price statistics for a token pair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Statistics of `price(asset_a) / price(asset_b)` over the last `window_hours`.
    ///
    /// Returns `Ok(None)` when the window holds no aligned samples.
    async fn price_stats(
        &self,
        asset_a: &str,
        asset_b: &str,
        window_hours: u32,
    ) -> anyhow::Result<Option<PriceStats>>;
}

/// Listings, volumes and prices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Trailing swap volume in USD per asset, dropping assets under `min_usd`.
    async fn recent_volumes(
        &self,
        window_hours: u32,
        min_usd: Decimal,
    ) -> anyhow::Result<HashMap<String, Decimal>>;

    /// Approved assets keyed by asset id.
    async fn approved_assets(&self) -> anyhow::Result<HashMap<String, AssetInfo>>;

    /// Latest USD price per asset.
    async fn latest_prices(&self) -> anyhow::Result<HashMap<String, Decimal>>;

    async fn amm_pools(&self) -> anyhow::Result<Vec<PoolDescriptor>>;

    async fn orderbook_markets(&self) -> anyhow::Result<Vec<MarketDescriptor>>;
}

/// Concentrated-liquidity AMM.
#[async_trait]
pub trait AmmVenue: Send + Sync {
    async fn pool_state(&self, pool: &str) -> anyhow::Result<PoolState>;

    /// Every position in the pool, regardless of owner.
    async fn positions(&self, pool: &str) -> anyhow::Result<Vec<PositionRecord>>;

    /// Quote a deposit of `amount_raw` of `input_asset` over `range`.
    async fn quote_deposit(
        &self,
        pool: &str,
        range: TickRange,
        input_asset: &str,
        amount_raw: u64,
    ) -> anyhow::Result<DepositQuote>;

    /// Open a position from a previous quote. Returns the position id.
    async fn open_position(
        &self,
        owner: &str,
        pool: &str,
        range: TickRange,
        quote: &DepositQuote,
    ) -> anyhow::Result<String>;

    /// Withdraw and close every position held by `owner`. Returns the number closed.
    async fn close_all_positions(&self, owner: &str) -> anyhow::Result<usize>;

    async fn owned_position_count(&self, owner: &str) -> anyhow::Result<usize>;
}

/// Limit-order book exchange.
#[async_trait]
pub trait OrderBookVenue: Send + Sync {
    async fn market_info(&self, market: &str) -> anyhow::Result<MarketInfo>;

    /// Place a post-only limit order. Returns the order id.
    async fn place_order(&self, owner: &str, order: &LimitOrder) -> anyhow::Result<String>;

    /// Cancel all of `owner`'s orders on `market`. Returns the number cancelled.
    async fn cancel_orders(&self, owner: &str, market: &str) -> anyhow::Result<usize>;

    /// Process queued events on `market`. Returns the number processed.
    async fn crank(&self, market: &str) -> anyhow::Result<usize>;

    /// Move `owner`'s unsettled proceeds on `market` into the wallet.
    async fn settle_funds(&self, owner: &str, market: &str) -> anyhow::Result<()>;

    async fn account_state(&self, owner: &str, market: &str) -> anyhow::Result<BookAccountState>;
}

/// Immediate swaps through an aggregator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn market_order(
        &self,
        owner: &str,
        input_asset: &str,
        output_asset: &str,
        amount_raw: u64,
    ) -> anyhow::Result<SwapFill>;
}

/// Wallet balances in raw token units.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn token_balance(&self, owner: &str, asset: &str) -> anyhow::Result<u64>;
}

/// Account and venue handles passed to every cycle operation.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Account the cycle trades for
    pub owner: String,
    pub amm: Arc<dyn AmmVenue>,
    pub book: Arc<dyn OrderBookVenue>,
    pub router: Arc<dyn SwapRouter>,
    pub balances: Arc<dyn BalanceSource>,
}

impl ExecutionContext {
    /// Build a context where one value provides every venue, as the paper venue does.
    pub fn from_venue<V>(owner: impl Into<String>, venue: Arc<V>) -> Self
    where
        V: AmmVenue + OrderBookVenue + SwapRouter + BalanceSource + 'static,
    {
        Self {
            owner: owner.into(),
            amm: venue.clone(),
            book: venue.clone(),
            router: venue.clone(),
            balances: venue,
        }
    }

    /// Replace the swap router.
    pub fn with_router(mut self, router: Arc<dyn SwapRouter>) -> Self {
        self.router = router;
        self
    }
}
