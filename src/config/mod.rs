//! Configuration management for the rebalancer.
//!
//! Loads settings from an optional config file and `DVR__*` environment variables.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// The common quote asset every pair is priced against
    #[serde(default)]
    pub quote: QuoteConfig,
    /// Target allocation and capping
    #[serde(default)]
    pub allocation: AllocationConfig,
    /// Price band fractions and lookback
    #[serde(default)]
    pub bands: BandConfig,
    /// AMM / order-book sizing parameters
    #[serde(default)]
    pub sizing: SizingConfig,
    /// Volume window used for scoring
    #[serde(default)]
    pub volume: VolumeConfig,
    /// In-band liquidity estimation
    #[serde(default)]
    pub liquidity: LiquidityConfig,
    /// Flatten-phase settlement polling
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Cycle cadence for the `run` loop
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Paper venue seeding
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Token identifier of the quote asset
    #[serde(default = "default_quote_asset")]
    pub asset_id: String,
    #[serde(default = "default_quote_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Cap on any single asset's portfolio fraction unless overridden per asset
    #[serde(default = "default_max_allocation")]
    pub default_max_allocation: Decimal,
    /// Ratio used when volume / liquidity is undefined
    #[serde(default = "default_vol_to_liq")]
    pub default_vol_to_liq: Decimal,
    /// Upper clamp on volume / liquidity
    #[serde(default = "default_max_vol_to_liq")]
    pub max_vol_to_liq: Decimal,
    /// Bound on capping rounds
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    /// Fraction of (max - min) to shrink (inside) or widen (outside) the band by
    #[serde(default = "default_range_adjustment")]
    pub range_adjustment: Decimal,
    /// Minimum distance of either band edge from the latest price
    #[serde(default = "default_min_percent_away")]
    pub min_percent_away_from_latest: Decimal,
    /// Statistics lookback in hours
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Safety margin applied to every sized amount (< 1)
    #[serde(default = "default_fudge_factor")]
    pub fudge_factor: Decimal,
    /// Minimum quote budget as a fraction of the asset's total allocation
    #[serde(default = "default_forgiveness_factor")]
    pub forgiveness_factor: Decimal,
    /// Smallest AMM position worth opening, in USD
    #[serde(default = "default_min_position_usd")]
    pub min_position_usd: Decimal,
    /// Smallest drift worth a resting order, in USD
    #[serde(default = "default_min_order_usd")]
    pub min_order_usd: Decimal,
    /// Market order size as a fraction of the resting order
    #[serde(default = "default_market_order_proportion")]
    pub market_order_proportion: Decimal,
    /// Quote amount of the ratio probe, in USD
    #[serde(default = "default_probe_quote_usd")]
    pub probe_quote_usd: Decimal,
    /// Deposit slippage tolerance (0.0-1.0)
    #[serde(default = "default_slippage_tolerance")]
    pub slippage_tolerance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_volume_window_hours")]
    pub window_hours: u32,
    /// Assets under this trailing volume are not scored
    #[serde(default = "default_min_volume_usd")]
    pub min_volume_usd: Decimal,
    /// Assets never scored (stablecoins, liquid staking tokens, wrapped native)
    #[serde(default)]
    pub excluded_assets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityConfig {
    /// Ignore pools whose asset has no order-book market
    #[serde(default = "default_skip_if_no_orderbook")]
    pub skip_if_no_orderbook: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Delay between venue-state polls during the flatten phase
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Polls per flatten phase before giving up with a warning
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Settle attempts per market
    #[serde(default = "default_settle_retries")]
    pub settle_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between the end of one cycle and the start of the next
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Account identifier the paper venue trades for
    #[serde(default = "default_paper_owner")]
    pub owner: String,
    /// Quote balance credited at startup, in readable units
    #[serde(default = "default_initial_quote_balance")]
    pub initial_quote_balance: Decimal,
}

// Default value functions
fn default_quote_asset() -> String {
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string() // USDC mint
}

fn default_quote_decimals() -> u8 {
    6
}

fn default_max_allocation() -> Decimal {
    Decimal::new(15, 2) // 0.15
}

fn default_vol_to_liq() -> Decimal {
    Decimal::ONE
}

fn default_max_vol_to_liq() -> Decimal {
    Decimal::new(50, 0)
}

fn default_max_rounds() -> u32 {
    5
}

fn default_range_adjustment() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_min_percent_away() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_interval_hours() -> u32 {
    720 // 30 days
}

fn default_fudge_factor() -> Decimal {
    Decimal::new(75, 2) // 0.75
}

fn default_forgiveness_factor() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_min_position_usd() -> Decimal {
    Decimal::new(50, 0)
}

fn default_min_order_usd() -> Decimal {
    Decimal::new(50, 0)
}

fn default_market_order_proportion() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_probe_quote_usd() -> Decimal {
    Decimal::new(100, 0)
}

fn default_slippage_tolerance() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_volume_window_hours() -> u32 {
    24
}

fn default_min_volume_usd() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_skip_if_no_orderbook() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_polls() -> u32 {
    5
}

fn default_settle_retries() -> u32 {
    3
}

fn default_interval_secs() -> u64 {
    3_600
}

fn default_paper_owner() -> String {
    "paper-wallet".to_string()
}

fn default_initial_quote_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

impl Config {
    /// Load configuration from `.env`, an optional config file and environment variables.
    ///
    /// Without an explicit path, `config.{toml,yaml,json}` in the working directory
    /// is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name("config").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::default().separator("__").prefix("DVR"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let fraction = |v: Decimal| v > Decimal::ZERO && v <= Decimal::ONE;

        anyhow::ensure!(!self.quote.asset_id.is_empty(), "quote.asset_id must be set");

        anyhow::ensure!(
            fraction(self.allocation.default_max_allocation),
            "default_max_allocation must be between 0 and 1"
        );
        anyhow::ensure!(
            self.allocation.default_vol_to_liq >= Decimal::ZERO
                && self.allocation.max_vol_to_liq > Decimal::ZERO,
            "vol_to_liq defaults must be non-negative and max_vol_to_liq positive"
        );
        anyhow::ensure!(self.allocation.max_rounds >= 1, "max_rounds must be >= 1");

        anyhow::ensure!(
            self.bands.range_adjustment >= Decimal::ZERO && self.bands.range_adjustment < Decimal::ONE,
            "range_adjustment must be in [0, 1)"
        );
        anyhow::ensure!(
            self.bands.min_percent_away_from_latest >= Decimal::ZERO
                && self.bands.min_percent_away_from_latest < Decimal::ONE,
            "min_percent_away_from_latest must be in [0, 1)"
        );
        anyhow::ensure!(self.bands.interval_hours > 0, "bands.interval_hours must be positive");

        anyhow::ensure!(
            self.sizing.fudge_factor > Decimal::ZERO && self.sizing.fudge_factor < Decimal::ONE,
            "fudge_factor must be between 0 and 1 (exclusive)"
        );
        anyhow::ensure!(
            fraction(self.sizing.forgiveness_factor),
            "forgiveness_factor must be between 0 and 1"
        );
        anyhow::ensure!(
            fraction(self.sizing.market_order_proportion),
            "market_order_proportion must be between 0 and 1"
        );
        anyhow::ensure!(
            fraction(self.sizing.slippage_tolerance),
            "slippage_tolerance must be between 0 and 1"
        );
        anyhow::ensure!(
            self.sizing.min_position_usd > Decimal::ZERO
                && self.sizing.min_order_usd > Decimal::ZERO
                && self.sizing.probe_quote_usd > Decimal::ZERO,
            "sizing thresholds must be positive"
        );

        anyhow::ensure!(self.volume.window_hours > 0, "volume.window_hours must be positive");
        anyhow::ensure!(
            self.settlement.settle_retries >= 1,
            "settle_retries must be >= 1"
        );

        Ok(())
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            asset_id: default_quote_asset(),
            decimals: default_quote_decimals(),
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            default_max_allocation: default_max_allocation(),
            default_vol_to_liq: default_vol_to_liq(),
            max_vol_to_liq: default_max_vol_to_liq(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            range_adjustment: default_range_adjustment(),
            min_percent_away_from_latest: default_min_percent_away(),
            interval_hours: default_interval_hours(),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            fudge_factor: default_fudge_factor(),
            forgiveness_factor: default_forgiveness_factor(),
            min_position_usd: default_min_position_usd(),
            min_order_usd: default_min_order_usd(),
            market_order_proportion: default_market_order_proportion(),
            probe_quote_usd: default_probe_quote_usd(),
            slippage_tolerance: default_slippage_tolerance(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            window_hours: default_volume_window_hours(),
            min_volume_usd: default_min_volume_usd(),
            excluded_assets: Vec::new(),
        }
    }
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            skip_if_no_orderbook: default_skip_if_no_orderbook(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            settle_retries: default_settle_retries(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            owner: default_paper_owner(),
            initial_quote_balance: default_initial_quote_balance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.allocation.default_max_allocation, dec!(0.15));
        assert_eq!(config.sizing.fudge_factor, dec!(0.75));
        assert_eq!(config.bands.interval_hours, 720);
        assert_eq!(config.settlement.settle_retries, 3);
    }

    #[test]
    fn test_fudge_factor_must_be_below_one() {
        let mut config = Config::default();
        config.sizing.fudge_factor = dec!(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_rounds_must_be_positive() {
        let mut config = Config::default();
        config.allocation.max_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"sizing": {"fudge_factor": "0.5"}}"#).unwrap();
        assert_eq!(parsed.sizing.fudge_factor, dec!(0.5));
        assert_eq!(parsed.sizing.forgiveness_factor, dec!(0.1));
        assert_eq!(parsed.volume.window_hours, 24);
        assert!(parsed.liquidity.skip_if_no_orderbook);
    }
}
