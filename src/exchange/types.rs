//! Type definitions shared by the venue adapters and the strategy.

use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token metadata from the approved-asset list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub asset_id: String,
    /// Display symbol (may be empty for unknown tokens)
    #[serde(default)]
    pub symbol: String,
    pub decimals: u8,
    /// Whether the asset may be traded at all
    #[serde(default = "default_approved")]
    pub approved: bool,
    /// Per-asset cap on the portfolio fraction, overriding the global default
    #[serde(default)]
    pub max_allocation: Option<Decimal>,
}

fn default_approved() -> bool {
    true
}

impl AssetInfo {
    /// Create approved asset metadata without a cap override.
    pub fn new(asset_id: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            asset_id: asset_id.into(),
            symbol: symbol.into(),
            decimals,
            approved: true,
            max_allocation: None,
        }
    }

    /// Set the per-asset cap.
    pub fn with_max_allocation(mut self, cap: Decimal) -> Self {
        self.max_allocation = Some(cap);
        self
    }
}

/// Statistics of the price ratio `price_a / price_b` over a lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub min: Decimal,
    pub max: Decimal,
    pub mean: Decimal,
    pub std_dev: Decimal,
    pub latest: Decimal,
    pub samples: usize,
}

impl PriceStats {
    /// Summarize a chronologically ordered series (oldest first).
    ///
    /// The standard deviation is the population deviation. Returns `None` for an
    /// empty series.
    pub fn from_series(series: &[Decimal]) -> Option<Self> {
        let latest = *series.last()?;
        let n = Decimal::from(series.len());

        let mut min = latest;
        let mut max = latest;
        let mut sum = Decimal::ZERO;
        for &price in series {
            min = min.min(price);
            max = max.max(price);
            sum += price;
        }
        let mean = sum / n;

        let variance = series
            .iter()
            .map(|p| (*p - mean) * (*p - mean))
            .sum::<Decimal>()
            / n;
        let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);

        Some(Self {
            min,
            max,
            mean,
            std_dev,
            latest,
            samples: series.len(),
        })
    }
}

/// An AMM pool as listed by the market-data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub address: String,
    pub token_a: String,
    pub token_b: String,
    pub tick_spacing: u16,
    /// Fee as a fraction (0.003 = 30 bps)
    #[serde(default)]
    pub fee_rate: Decimal,
    /// Only approved pools receive new positions
    #[serde(default)]
    pub approved: bool,
}

impl PoolDescriptor {
    /// True if the pool pairs `asset` with `quote` in either token order.
    pub fn pairs(&self, asset: &str, quote: &str) -> bool {
        (self.token_a == asset && self.token_b == quote)
            || (self.token_a == quote && self.token_b == asset)
    }
}

/// An order-book market as listed by the market-data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDescriptor {
    pub address: String,
    pub base_asset: String,
    pub quote_asset: String,
}

/// Live state of an AMM pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolState {
    pub address: String,
    pub token_a: String,
    pub token_b: String,
    pub decimals_a: u8,
    pub decimals_b: u8,
    /// Q64.64 square root of the raw price (token B per token A)
    pub sqrt_price_x64: u128,
    pub tick_current: i32,
    pub tick_spacing: u16,
}

/// A liquidity position in an AMM pool (any owner).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub position_id: String,
    pub pool: String,
    pub owner: String,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

/// Half-open tick interval `[lower, upper)` for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    pub fn width(&self) -> i32 {
        self.upper - self.lower
    }
}

/// The AMM's answer to "what would this deposit take".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositQuote {
    pub est_a: u64,
    pub est_b: u64,
    /// Estimates widened by the slippage tolerance
    pub max_a: u64,
    pub max_b: u64,
    pub liquidity: u128,
}

/// Order side on the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A post-only limit order to rest on the book.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitOrder {
    pub market: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size_base: Decimal,
}

/// Order-book trading constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketInfo {
    pub tick_size: Decimal,
    pub base_lot_size: Decimal,
}

/// Per-owner state of one order-book market, used to confirm settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookAccountState {
    pub open_orders: usize,
    /// Match events queued but not yet cranked
    pub pending_events: usize,
    pub unsettled_base: u64,
    pub unsettled_quote: u64,
}

impl BookAccountState {
    pub fn is_flat(&self) -> bool {
        self.open_orders == 0
            && self.pending_events == 0
            && self.unsettled_base == 0
            && self.unsettled_quote == 0
    }
}

/// Result of an immediate swap through the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapFill {
    pub input_asset: String,
    pub output_asset: String,
    pub amount_in: u64,
    pub amount_out: u64,
}

/// One leg of a recorded swap, already normalized to readable token amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub tx_id: String,
    pub leg_index: u32,
    /// Unix seconds
    pub timestamp: i64,
    pub asset_in: String,
    pub amount_in: Decimal,
    pub asset_out: String,
    pub amount_out: Decimal,
    /// Decimals of the tokens, when the feed reports them
    #[serde(default)]
    pub decimals_in: Option<u8>,
    #[serde(default)]
    pub decimals_out: Option<u8>,
}
