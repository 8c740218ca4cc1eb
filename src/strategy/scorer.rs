//! Volume-to-liquidity scoring of approved assets.

use crate::config::AllocationConfig;
use crate::exchange::AssetInfo;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Per-asset state carried through one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSummary {
    pub asset_id: String,
    pub symbol: String,
    pub decimals: u8,
    /// Trailing swap volume in USD
    pub volume_usd: Decimal,
    /// Estimated in-band AMM liquidity in USD
    pub liquidity_usd: Decimal,
    pub vol_to_liquidity: Decimal,
    /// Per-asset cap override
    pub max_allocation: Option<Decimal>,
    pub raw_allocation: Decimal,
    pub capped_allocation: Decimal,
    pub balance_raw: u64,
    pub holdings_usd: Decimal,
    pub current_allocation: Decimal,
}

impl AssetSummary {
    pub fn new(asset_id: impl Into<String>, decimals: u8, vol_to_liquidity: Decimal) -> Self {
        let asset_id = asset_id.into();
        Self {
            symbol: asset_id.clone(),
            asset_id,
            decimals,
            volume_usd: Decimal::ZERO,
            liquidity_usd: Decimal::ZERO,
            vol_to_liquidity,
            max_allocation: None,
            raw_allocation: Decimal::ZERO,
            capped_allocation: Decimal::ZERO,
            balance_raw: 0,
            holdings_usd: Decimal::ZERO,
            current_allocation: Decimal::ZERO,
        }
    }

    /// The asset's cap: its override, else `default_cap`.
    pub fn cap(&self, default_cap: Decimal) -> Decimal {
        self.max_allocation.unwrap_or(default_cap)
    }

    /// Display label (symbol when known).
    pub fn label(&self) -> &str {
        if self.symbol.is_empty() {
            &self.asset_id
        } else {
            &self.symbol
        }
    }
}

/// `volume / liquidity` clamped to `max_ratio`; `default_ratio` when undefined.
pub fn vol_to_liquidity_ratio(
    volume_usd: Decimal,
    liquidity_usd: Decimal,
    default_ratio: Decimal,
    max_ratio: Decimal,
) -> Decimal {
    if liquidity_usd <= Decimal::ZERO {
        return default_ratio;
    }
    match volume_usd.checked_div(liquidity_usd) {
        Some(ratio) if ratio >= Decimal::ZERO => ratio.min(max_ratio),
        _ => default_ratio,
    }
}

/// Score every approved asset that has volume.
///
/// Assets missing from `liquidity` count as zero liquidity. Output is sorted by
/// `vol_to_liquidity` descending, ties by asset id.
pub fn score_assets(
    volumes: &HashMap<String, Decimal>,
    liquidity: &HashMap<String, Decimal>,
    assets: &HashMap<String, AssetInfo>,
    config: &AllocationConfig,
) -> Vec<AssetSummary> {
    let mut summaries: Vec<AssetSummary> = volumes
        .iter()
        .filter_map(|(asset_id, &volume_usd)| {
            let info = assets.get(asset_id).filter(|a| a.approved)?;
            let liquidity_usd = liquidity.get(asset_id).copied().unwrap_or(Decimal::ZERO);
            let ratio = vol_to_liquidity_ratio(
                volume_usd,
                liquidity_usd,
                config.default_vol_to_liq,
                config.max_vol_to_liq,
            );

            debug!(
                asset = %asset_id,
                %volume_usd,
                %liquidity_usd,
                vol_to_liquidity = %ratio,
                "Scored asset"
            );

            Some(AssetSummary {
                symbol: info.symbol.clone(),
                volume_usd,
                liquidity_usd,
                max_allocation: info.max_allocation,
                ..AssetSummary::new(asset_id.clone(), info.decimals, ratio)
            })
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.vol_to_liquidity
            .cmp(&a.vol_to_liquidity)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> AllocationConfig {
        AllocationConfig::default()
    }

    #[test]
    fn test_ratio_zero_volume_is_zero() {
        assert_eq!(
            vol_to_liquidity_ratio(Decimal::ZERO, dec!(1000), dec!(1), dec!(50)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_ratio_zero_liquidity_is_default() {
        assert_eq!(vol_to_liquidity_ratio(dec!(5000), Decimal::ZERO, dec!(1), dec!(50)), dec!(1));
        assert_eq!(vol_to_liquidity_ratio(Decimal::ZERO, Decimal::ZERO, dec!(1), dec!(50)), dec!(1));
    }

    #[test]
    fn test_ratio_clamped_to_max() {
        assert_eq!(vol_to_liquidity_ratio(dec!(1000000), dec!(10), dec!(1), dec!(50)), dec!(50));
        assert_eq!(vol_to_liquidity_ratio(dec!(300), dec!(100), dec!(1), dec!(50)), dec!(3));
    }

    #[test]
    fn test_only_approved_assets_with_volume_are_scored() {
        let volumes = HashMap::from([
            ("SOL".to_string(), dec!(20000)),
            ("JUP".to_string(), dec!(9000)),
            ("SCAM".to_string(), dec!(1000000)),
        ]);
        let liquidity = HashMap::from([("SOL".to_string(), dec!(10000)), ("JUP".to_string(), dec!(1000))]);
        let mut scam = AssetInfo::new("SCAM", "SCAM", 6);
        scam.approved = false;
        let assets = HashMap::from([
            ("SOL".to_string(), AssetInfo::new("SOL", "SOL", 9)),
            ("JUP".to_string(), AssetInfo::new("JUP", "JUP", 6).with_max_allocation(dec!(0.2))),
            ("BONK".to_string(), AssetInfo::new("BONK", "BONK", 5)),
            ("SCAM".to_string(), scam),
        ]);

        let scored = score_assets(&volumes, &liquidity, &assets, &config());

        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].asset_id, "JUP");
        assert_eq!(scored[0].vol_to_liquidity, dec!(9));
        assert_eq!(scored[0].max_allocation, Some(dec!(0.2)));
        assert_eq!(scored[1].asset_id, "SOL");
        assert_eq!(scored[1].vol_to_liquidity, dec!(2));
    }

    #[test]
    fn test_missing_liquidity_uses_default() {
        let volumes = HashMap::from([("SOL".to_string(), dec!(20000))]);
        let assets = HashMap::from([("SOL".to_string(), AssetInfo::new("SOL", "SOL", 9))]);

        let scored = score_assets(&volumes, &HashMap::new(), &assets, &config());
        assert_eq!(scored[0].vol_to_liquidity, config().default_vol_to_liq);
        assert_eq!(scored[0].liquidity_usd, Decimal::ZERO);
    }

    #[test]
    fn test_ties_sorted_by_asset_id() {
        let volumes = HashMap::from([("B".to_string(), dec!(1)), ("A".to_string(), dec!(1))]);
        let assets = HashMap::from([
            ("A".to_string(), AssetInfo::new("A", "A", 6)),
            ("B".to_string(), AssetInfo::new("B", "B", 6)),
        ]);
        let scored = score_assets(&volumes, &HashMap::new(), &assets, &config());
        assert_eq!(scored[0].asset_id, "A");
        assert_eq!(scored[1].asset_id, "B");
    }
}
