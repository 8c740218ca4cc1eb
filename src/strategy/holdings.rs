//! Wallet holdings, current allocations and drift from target.

use super::scorer::AssetSummary;
use crate::exchange::BalanceSource;
use crate::utils::decimal::{raw_to_readable, safe_div};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Portfolio valuation at the start of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub quote_balance_raw: u64,
    pub quote_holdings_usd: Decimal,
    /// Sum of asset holdings plus the quote holdings
    pub total_value_usd: Decimal,
}

/// Query balances for every asset and the quote asset, then fill in
/// `balance_raw`, `holdings_usd` and `current_allocation`.
///
/// Balance queries run concurrently. A failed query counts as zero holdings.
pub async fn measure_holdings(
    balances: &dyn BalanceSource,
    owner: &str,
    summaries: &mut [AssetSummary],
    prices: &HashMap<String, Decimal>,
    quote_asset: &str,
    quote_decimals: u8,
) -> PortfolioSnapshot {
    let queries = summaries
        .iter()
        .map(|s| balances.token_balance(owner, &s.asset_id));
    let (asset_balances, quote_balance) =
        futures_util::join!(join_all(queries), balances.token_balance(owner, quote_asset));

    for (summary, balance) in summaries.iter_mut().zip(asset_balances) {
        summary.balance_raw = balance.unwrap_or_else(|e| {
            warn!(asset = %summary.asset_id, error = %e, "Balance query failed, counting as zero");
            0
        });
        let price = prices.get(&summary.asset_id).copied().unwrap_or(Decimal::ZERO);
        summary.holdings_usd = raw_to_readable(summary.balance_raw, summary.decimals) * price;
    }

    let quote_balance_raw = quote_balance.unwrap_or_else(|e| {
        warn!(asset = %quote_asset, error = %e, "Quote balance query failed, counting as zero");
        0
    });
    let quote_price = prices.get(quote_asset).copied().unwrap_or(Decimal::ONE);
    let quote_holdings_usd = raw_to_readable(quote_balance_raw, quote_decimals) * quote_price;

    let total_value_usd =
        summaries.iter().map(|s| s.holdings_usd).sum::<Decimal>() + quote_holdings_usd;
    for summary in summaries.iter_mut() {
        summary.current_allocation = safe_div(summary.holdings_usd, total_value_usd);
    }

    info!(
        assets = summaries.len(),
        %quote_holdings_usd,
        %total_value_usd,
        "Portfolio measured"
    );

    PortfolioSnapshot {
        quote_balance_raw,
        quote_holdings_usd,
        total_value_usd,
    }
}

/// `current - capped` per asset (positive = over target).
pub fn drift(summary: &AssetSummary) -> Decimal {
    summary.current_allocation - summary.capped_allocation
}

/// Sum of positive drifts across assets.
pub fn total_over_allocation(summaries: &[AssetSummary]) -> Decimal {
    summaries
        .iter()
        .map(|s| drift(s).max(Decimal::ZERO))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockBalanceSource;
    use rust_decimal_macros::dec;

    fn prices() -> HashMap<String, Decimal> {
        HashMap::from([
            ("SOL".to_string(), dec!(150)),
            ("JUP".to_string(), dec!(0.5)),
            ("USDC".to_string(), Decimal::ONE),
        ])
    }

    #[tokio::test]
    async fn test_holdings_and_current_allocation() {
        let mut balances = MockBalanceSource::new();
        balances.expect_token_balance().returning(|_, asset| {
            Ok(match asset {
                "SOL" => 2_000_000_000,  // 2 SOL = 300 USD
                "JUP" => 400_000_000,    // 400 JUP = 200 USD
                "USDC" => 500_000_000,   // 500 USD
                _ => 0,
            })
        });

        let mut summaries = vec![
            AssetSummary::new("SOL", 9, dec!(1)),
            AssetSummary::new("JUP", 6, dec!(1)),
        ];
        let snapshot = measure_holdings(&balances, "owner", &mut summaries, &prices(), "USDC", 6).await;

        assert_eq!(snapshot.quote_holdings_usd, dec!(500));
        assert_eq!(snapshot.total_value_usd, dec!(1000));
        assert_eq!(summaries[0].holdings_usd, dec!(300));
        assert_eq!(summaries[0].current_allocation, dec!(0.3));
        assert_eq!(summaries[1].current_allocation, dec!(0.2));
    }

    #[tokio::test]
    async fn test_failed_balance_counts_as_zero() {
        let mut balances = MockBalanceSource::new();
        balances.expect_token_balance().returning(|_, asset| {
            if asset == "SOL" {
                Err(anyhow::anyhow!("rpc timeout"))
            } else {
                Ok(1_000_000)
            }
        });

        let mut summaries = vec![AssetSummary::new("SOL", 9, dec!(1))];
        let snapshot = measure_holdings(&balances, "owner", &mut summaries, &prices(), "USDC", 6).await;

        assert_eq!(summaries[0].balance_raw, 0);
        assert_eq!(summaries[0].current_allocation, Decimal::ZERO);
        assert_eq!(snapshot.total_value_usd, dec!(1));
    }

    #[tokio::test]
    async fn test_empty_wallet_has_zero_allocations() {
        let mut balances = MockBalanceSource::new();
        balances.expect_token_balance().returning(|_, _| Ok(0));

        let mut summaries = vec![AssetSummary::new("SOL", 9, dec!(1))];
        let snapshot = measure_holdings(&balances, "owner", &mut summaries, &prices(), "USDC", 6).await;

        assert_eq!(snapshot.total_value_usd, Decimal::ZERO);
        assert_eq!(summaries[0].current_allocation, Decimal::ZERO);
    }

    #[test]
    fn test_total_over_allocation() {
        let mut a = AssetSummary::new("A", 6, dec!(1));
        a.current_allocation = dec!(0.3);
        a.capped_allocation = dec!(0.2);
        let mut b = AssetSummary::new("B", 6, dec!(1));
        b.current_allocation = dec!(0.1);
        b.capped_allocation = dec!(0.4);

        assert_eq!(drift(&b), dec!(-0.3));
        assert_eq!(total_over_allocation(&[a, b]), dec!(0.1));
    }
}
