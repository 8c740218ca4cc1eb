//! SQLite history store for prices, swaps and venue listings.
//!
//! Backs the statistics and market-data traits:
//! - Asset metadata and approval flags
//! - Per-minute USD prices
//! - Swap legs with their USD volume
//! - AMM pool and order-book market listings

use crate::exchange::{
    AssetInfo, MarketDataSource, MarketDescriptor, PoolDescriptor, PriceHistory, PriceStats,
    SwapRecord,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Row counts for the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub assets: usize,
    pub approved_assets: usize,
    pub pools: usize,
    pub markets: usize,
    pub swaps: usize,
    pub prices: usize,
}

/// Venue listings as accepted by `import-venues`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenueListing {
    #[serde(default)]
    pub assets: Vec<AssetInfo>,
    #[serde(default)]
    pub pools: Vec<PoolDescriptor>,
    #[serde(default)]
    pub markets: Vec<MarketDescriptor>,
}

/// SQLite-based history store.
pub struct HistoryStore {
    conn: Mutex<Connection>,
    /// Asset priced at exactly 1 USD
    quote_asset: String,
}

/// Decimal stored as TEXT. Unparseable text is a conversion error, not zero.
fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => Decimal::from_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

impl HistoryStore {
    /// Open (or create) the database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, quote_asset: &str) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let store = Self {
            conn: Mutex::new(conn),
            quote_asset: quote_asset.to_string(),
        };
        store.init_schema()?;

        info!("History store opened at {:?}", db_path.as_ref());
        Ok(store)
    }

    /// In-memory store (tests and dry runs).
    pub fn open_in_memory(quote_asset: &str) -> Result<Self> {
        Self::open(":memory:", quote_asset)
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("History store connection lock poisoned"))
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS assets (
                asset_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL DEFAULT '',
                decimals INTEGER NOT NULL,
                approved INTEGER NOT NULL DEFAULT 0,
                max_allocation TEXT
            );

            -- Per-minute USD prices
            CREATE TABLE IF NOT EXISTS prices (
                asset_id TEXT NOT NULL,
                epoch_minute INTEGER NOT NULL,
                price TEXT NOT NULL,
                PRIMARY KEY (asset_id, epoch_minute)
            );

            CREATE TABLE IF NOT EXISTS swaps (
                tx_id TEXT NOT NULL,
                leg_index INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                asset_in TEXT NOT NULL,
                amount_in TEXT NOT NULL,
                asset_out TEXT NOT NULL,
                amount_out TEXT NOT NULL,
                volume_usd TEXT,
                PRIMARY KEY (tx_id, leg_index)
            );
            CREATE INDEX IF NOT EXISTS idx_swaps_timestamp ON swaps(timestamp);

            CREATE TABLE IF NOT EXISTS amm_pools (
                address TEXT PRIMARY KEY,
                token_a TEXT NOT NULL,
                token_b TEXT NOT NULL,
                tick_spacing INTEGER NOT NULL,
                fee_rate TEXT NOT NULL,
                approved INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS orderbook_markets (
                address TEXT PRIMARY KEY,
                base_asset TEXT NOT NULL,
                quote_asset TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Insert or replace asset metadata.
    pub fn upsert_asset(&self, asset: &AssetInfo) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO assets (asset_id, symbol, decimals, approved, max_allocation)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(asset_id) DO UPDATE SET
                symbol = ?2,
                decimals = ?3,
                approved = ?4,
                max_allocation = ?5
            "#,
            params![
                asset.asset_id,
                asset.symbol,
                asset.decimals,
                asset.approved,
                asset.max_allocation.map(|m| m.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn add_pool(&self, pool: &PoolDescriptor) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO amm_pools (address, token_a, token_b, tick_spacing, fee_rate, approved)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                pool.address,
                pool.token_a,
                pool.token_b,
                pool.tick_spacing,
                pool.fee_rate.to_string(),
                pool.approved,
            ],
        )?;
        Ok(())
    }

    pub fn add_market(&self, market: &MarketDescriptor) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO orderbook_markets (address, base_asset, quote_asset)
            VALUES (?1, ?2, ?3)
            "#,
            params![market.address, market.base_asset, market.quote_asset],
        )?;
        Ok(())
    }

    /// Store `(epoch_minute, price)` samples for an asset, replacing existing minutes.
    pub fn add_prices(&self, asset_id: &str, samples: &[(i64, Decimal)]) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        for (minute, price) in samples {
            tx.execute(
                "INSERT OR REPLACE INTO prices (asset_id, epoch_minute, price) VALUES (?1, ?2, ?3)",
                params![asset_id, minute, price.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record swap legs, deriving USD volume and per-minute prices.
    ///
    /// Returns the number of new legs; legs already stored are ignored.
    pub fn record_swaps(&self, records: &[SwapRecord]) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;

        for record in records {
            for (asset, decimals) in [
                (&record.asset_in, record.decimals_in),
                (&record.asset_out, record.decimals_out),
            ] {
                if let Some(decimals) = decimals {
                    tx.execute(
                        "INSERT OR IGNORE INTO assets (asset_id, decimals) VALUES (?1, ?2)",
                        params![asset, decimals],
                    )?;
                }
            }

            // quote per unit of the other leg
            let implied = if record.asset_in == self.quote_asset && !record.amount_out.is_zero() {
                Some((&record.asset_out, record.amount_in.checked_div(record.amount_out)))
            } else if record.asset_out == self.quote_asset && !record.amount_in.is_zero() {
                Some((&record.asset_in, record.amount_out.checked_div(record.amount_in)))
            } else {
                None
            };
            match implied {
                Some((_, None)) => {
                    warn!(tx = %record.tx_id, leg = record.leg_index, "Swap leg price out of range, skipping");
                    continue;
                }
                Some((asset, Some(price))) => {
                    tx.execute(
                        "INSERT OR REPLACE INTO prices (asset_id, epoch_minute, price) VALUES (?1, ?2, ?3)",
                        params![asset, record.timestamp.div_euclid(60), price.to_string()],
                    )?;
                }
                None => {}
            }

            let volume_usd = match latest_price(&tx, &self.quote_asset, &record.asset_in)? {
                Some(price) => Some(record.amount_in.checked_mul(price)),
                None => latest_price(&tx, &self.quote_asset, &record.asset_out)?
                    .map(|price| record.amount_out.checked_mul(price)),
            };
            let volume_usd = match volume_usd {
                Some(None) => {
                    warn!(tx = %record.tx_id, leg = record.leg_index, "Swap leg volume out of range, skipping");
                    continue;
                }
                Some(Some(v)) => Some(v),
                None => None,
            };

            inserted += tx.execute(
                r#"
                INSERT OR IGNORE INTO swaps (tx_id, leg_index, timestamp, asset_in, amount_in,
                                             asset_out, amount_out, volume_usd)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.tx_id,
                    record.leg_index,
                    record.timestamp,
                    record.asset_in,
                    record.amount_in.to_string(),
                    record.asset_out,
                    record.amount_out.to_string(),
                    volume_usd.map(|v| v.to_string()),
                ],
            )?;
        }

        tx.commit()?;
        debug!(received = records.len(), inserted, "Swaps recorded");
        Ok(inserted)
    }

    /// USD volume per asset since `since` (unix seconds), counting both legs.
    pub fn volumes_since(&self, since: i64) -> Result<HashMap<String, Decimal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT asset_in, asset_out, volume_usd
            FROM swaps
            WHERE timestamp >= ?1 AND volume_usd IS NOT NULL
            "#,
        )?;

        let mut volumes: HashMap<String, Decimal> = HashMap::new();
        let rows = stmt
            .query_map([since], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    decimal_column(row, 2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read swap volumes")?;
        for (asset_in, asset_out, volume) in rows {
            *volumes.entry(asset_in).or_default() += volume;
            *volumes.entry(asset_out).or_default() += volume;
        }

        Ok(volumes)
    }

    /// Minute → price series of an asset since `since_minute`.
    fn price_series(&self, asset_id: &str, since_minute: i64) -> Result<BTreeMap<i64, Decimal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT epoch_minute, price
            FROM prices
            WHERE asset_id = ?1 AND epoch_minute >= ?2
            ORDER BY epoch_minute
            "#,
        )?;

        let series = stmt
            .query_map(params![asset_id, since_minute], |row| {
                Ok((row.get::<_, i64>(0)?, decimal_column(row, 1)?))
            })?
            .collect::<rusqlite::Result<_>>()
            .with_context(|| format!("Failed to read price series for {asset_id}"))?;

        Ok(series)
    }

    /// Ratio statistics `price_a / price_b` over minutes where both are known.
    pub fn pair_stats(&self, asset_a: &str, asset_b: &str, since_minute: i64) -> Result<Option<PriceStats>> {
        let a_is_quote = asset_a == self.quote_asset;
        let b_is_quote = asset_b == self.quote_asset;

        let series_a = if a_is_quote {
            BTreeMap::new()
        } else {
            self.price_series(asset_a, since_minute)?
        };
        let series_b = if b_is_quote {
            BTreeMap::new()
        } else {
            self.price_series(asset_b, since_minute)?
        };

        let minutes: Vec<i64> = match (a_is_quote, b_is_quote) {
            (true, true) => return Ok(None),
            (true, false) => series_b.keys().copied().collect(),
            (false, true) => series_a.keys().copied().collect(),
            (false, false) => series_a
                .keys()
                .filter(|m| series_b.contains_key(m))
                .copied()
                .collect(),
        };

        let ratios: Vec<Decimal> = minutes
            .iter()
            .filter_map(|m| {
                let pa = if a_is_quote { Decimal::ONE } else { *series_a.get(m)? };
                let pb = if b_is_quote { Decimal::ONE } else { *series_b.get(m)? };
                (!pb.is_zero()).then(|| pa / pb)
            })
            .collect();

        Ok(PriceStats::from_series(&ratios))
    }

    /// Upsert every asset, pool and market in `listing`.
    pub fn import_listing(&self, listing: &VenueListing) -> Result<()> {
        for asset in &listing.assets {
            self.upsert_asset(asset)
                .with_context(|| format!("Failed to store asset {}", asset.asset_id))?;
        }
        for pool in &listing.pools {
            self.add_pool(pool)
                .with_context(|| format!("Failed to store pool {}", pool.address))?;
        }
        for market in &listing.markets {
            self.add_market(market)
                .with_context(|| format!("Failed to store market {}", market.address))?;
        }

        info!(
            assets = listing.assets.len(),
            pools = listing.pools.len(),
            markets = listing.markets.len(),
            "Venue listing imported"
        );
        Ok(())
    }

    /// Row counts per table.
    pub fn summary(&self) -> Result<StoreSummary> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreSummary {
            assets: count("SELECT COUNT(*) FROM assets")?,
            approved_assets: count("SELECT COUNT(*) FROM assets WHERE approved != 0")?,
            pools: count("SELECT COUNT(*) FROM amm_pools")?,
            markets: count("SELECT COUNT(*) FROM orderbook_markets")?,
            swaps: count("SELECT COUNT(*) FROM swaps")?,
            prices: count("SELECT COUNT(*) FROM prices")?,
        })
    }
}

/// Latest stored USD price of an asset; the quote asset is always 1.
fn latest_price(conn: &Connection, quote_asset: &str, asset_id: &str) -> Result<Option<Decimal>> {
    if asset_id == quote_asset {
        return Ok(Some(Decimal::ONE));
    }
    let price: Option<Decimal> = conn
        .query_row(
            "SELECT price FROM prices WHERE asset_id = ?1 ORDER BY epoch_minute DESC LIMIT 1",
            [asset_id],
            |row| decimal_column(row, 0),
        )
        .optional()?;
    Ok(price)
}

#[async_trait]
impl PriceHistory for HistoryStore {
    async fn price_stats(
        &self,
        asset_a: &str,
        asset_b: &str,
        window_hours: u32,
    ) -> Result<Option<PriceStats>> {
        let since_minute = Utc::now().timestamp() / 60 - i64::from(window_hours) * 60;
        self.pair_stats(asset_a, asset_b, since_minute)
    }
}

#[async_trait]
impl MarketDataSource for HistoryStore {
    async fn recent_volumes(
        &self,
        window_hours: u32,
        min_usd: Decimal,
    ) -> Result<HashMap<String, Decimal>> {
        let since = Utc::now().timestamp() - i64::from(window_hours) * 3600;
        let mut volumes = self.volumes_since(since)?;
        volumes.retain(|_, v| *v >= min_usd);
        Ok(volumes)
    }

    async fn approved_assets(&self) -> Result<HashMap<String, AssetInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT asset_id, symbol, decimals, max_allocation
            FROM assets
            WHERE approved != 0
            "#,
        )?;

        let assets = stmt
            .query_map([], |row| {
                let asset_id: String = row.get(0)?;
                let max_allocation = optional_decimal_column(row, 3)?;
                Ok((
                    asset_id.clone(),
                    AssetInfo {
                        asset_id,
                        symbol: row.get(1)?,
                        decimals: row.get(2)?,
                        approved: true,
                        max_allocation,
                    },
                ))
            })?
            .collect::<rusqlite::Result<_>>()
            .context("Failed to read approved assets")?;

        Ok(assets)
    }

    async fn latest_prices(&self) -> Result<HashMap<String, Decimal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT p.asset_id, p.price
            FROM prices p
            JOIN (SELECT asset_id, MAX(epoch_minute) AS latest FROM prices GROUP BY asset_id) l
              ON p.asset_id = l.asset_id AND p.epoch_minute = l.latest
            "#,
        )?;

        let mut prices: HashMap<String, Decimal> = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, decimal_column(row, 1)?))
            })?
            .collect::<rusqlite::Result<_>>()
            .context("Failed to read latest prices")?;
        prices.insert(self.quote_asset.clone(), Decimal::ONE);

        Ok(prices)
    }

    async fn amm_pools(&self) -> Result<Vec<PoolDescriptor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT address, token_a, token_b, tick_spacing, fee_rate, approved FROM amm_pools ORDER BY address",
        )?;

        let pools = stmt
            .query_map([], |row| {
                Ok(PoolDescriptor {
                    address: row.get(0)?,
                    token_a: row.get(1)?,
                    token_b: row.get(2)?,
                    tick_spacing: row.get(3)?,
                    fee_rate: decimal_column(row, 4)?,
                    approved: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()
            .context("Failed to read AMM pools")?;

        Ok(pools)
    }

    async fn orderbook_markets(&self) -> Result<Vec<MarketDescriptor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT address, base_asset, quote_asset FROM orderbook_markets ORDER BY address",
        )?;

        let markets = stmt
            .query_map([], |row| {
                Ok(MarketDescriptor {
                    address: row.get(0)?,
                    base_asset: row.get(1)?,
                    quote_asset: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()
            .context("Failed to read order-book markets")?;

        Ok(markets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const USDC: &str = "USDC";

    fn swap(tx: &str, ts: i64, asset_in: &str, amount_in: Decimal, asset_out: &str, amount_out: Decimal) -> SwapRecord {
        SwapRecord {
            tx_id: tx.to_string(),
            leg_index: 0,
            timestamp: ts,
            asset_in: asset_in.to_string(),
            amount_in,
            asset_out: asset_out.to_string(),
            amount_out,
            decimals_in: Some(6),
            decimals_out: Some(9),
        }
    }

    #[test]
    fn test_record_swaps_derives_price_and_volume() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        let now = Utc::now().timestamp();

        let inserted = store
            .record_swaps(&[swap("tx1", now, USDC, dec!(300), "SOL", dec!(2))])
            .unwrap();
        assert_eq!(inserted, 1);

        let volumes = store.volumes_since(now - 60).unwrap();
        assert_eq!(volumes["SOL"], dec!(300));
        assert_eq!(volumes[USDC], dec!(300));

        // duplicate leg ignored
        let again = store
            .record_swaps(&[swap("tx1", now, USDC, dec!(300), "SOL", dec!(2))])
            .unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn test_out_of_range_swap_legs_skipped() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        let now = Utc::now().timestamp();

        let inserted = store
            .record_swaps(&[
                swap("ok", now, USDC, dec!(300), "SOL", dec!(2)),
                // implied price overflows
                swap("huge-price", now, USDC, Decimal::MAX, "JUP", dec!(0.0000001)),
                // SOL is priced at 150, so the USD volume overflows
                swap("huge-volume", now, "SOL", Decimal::MAX, "BONK", dec!(1)),
            ])
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(store.summary().unwrap().swaps, 1);
        assert_eq!(store.volumes_since(now - 60).unwrap()["SOL"], dec!(300));
    }

    #[tokio::test]
    async fn test_corrupt_decimal_is_an_error() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        store.add_prices("SOL", &[(10, dec!(150))]).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO prices (asset_id, epoch_minute, price) VALUES ('SOL', 11, 'garbage')",
                [],
            )
            .unwrap();

        assert!(store.latest_prices().await.is_err());
        assert!(store.pair_stats("SOL", USDC, 0).is_err());
    }

    #[tokio::test]
    async fn test_latest_prices_include_quote() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        store.add_prices("SOL", &[(100, dec!(140)), (101, dec!(150))]).unwrap();

        let prices = store.latest_prices().await.unwrap();
        assert_eq!(prices["SOL"], dec!(150));
        assert_eq!(prices[USDC], Decimal::ONE);
    }

    #[tokio::test]
    async fn test_recent_volumes_threshold_and_window() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        let now = Utc::now().timestamp();
        store
            .record_swaps(&[
                swap("a", now - 60, USDC, dec!(20000), "SOL", dec!(100)),
                swap("b", now - 60, USDC, dec!(500), "BONK", dec!(1000000)),
                swap("c", now - 3 * 86_400, USDC, dec!(90000), "JUP", dec!(100000)),
            ])
            .unwrap();

        let volumes = store.recent_volumes(24, dec!(10000)).await.unwrap();
        assert_eq!(volumes.get("SOL"), Some(&dec!(20000)));
        assert!(!volumes.contains_key("BONK"));
        assert!(!volumes.contains_key("JUP"));
    }

    #[tokio::test]
    async fn test_approved_assets_only() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        store
            .upsert_asset(&AssetInfo::new("SOL", "SOL", 9).with_max_allocation(dec!(0.3)))
            .unwrap();
        store
            .record_swaps(&[swap("tx", Utc::now().timestamp(), USDC, dec!(1), "RANDOM", dec!(1))])
            .unwrap();

        let assets = store.approved_assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets["SOL"].max_allocation, Some(dec!(0.3)));
        assert_eq!(store.summary().unwrap().assets, 3);
    }

    #[test]
    fn test_pair_stats_aligns_minutes() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        store
            .add_prices("SOL", &[(10, dec!(100)), (11, dec!(200)), (12, dec!(150))])
            .unwrap();
        store.add_prices("JUP", &[(11, dec!(2)), (12, dec!(1.5))]).unwrap();

        let vs_quote = store.pair_stats("SOL", USDC, 0).unwrap().unwrap();
        assert_eq!(vs_quote.min, dec!(100));
        assert_eq!(vs_quote.max, dec!(200));
        assert_eq!(vs_quote.latest, dec!(150));
        assert_eq!(vs_quote.samples, 3);

        let cross = store.pair_stats("SOL", "JUP", 0).unwrap().unwrap();
        assert_eq!(cross.samples, 2);
        assert_eq!(cross.min, dec!(100));
        assert_eq!(cross.latest, dec!(100));

        let inverse = store.pair_stats(USDC, "SOL", 0).unwrap().unwrap();
        assert_eq!(inverse.max, dec!(0.01));
    }

    #[test]
    fn test_pair_stats_without_history() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        assert!(store.pair_stats("SOL", USDC, 0).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_venue_listings() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        store
            .add_pool(&PoolDescriptor {
                address: "pool".to_string(),
                token_a: "SOL".to_string(),
                token_b: USDC.to_string(),
                tick_spacing: 64,
                fee_rate: dec!(0.003),
                approved: true,
            })
            .unwrap();
        store
            .add_market(&MarketDescriptor {
                address: "mkt".to_string(),
                base_asset: "SOL".to_string(),
                quote_asset: USDC.to_string(),
            })
            .unwrap();

        let pools = store.amm_pools().await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].tick_spacing, 64);
        assert!(pools[0].approved);
        assert_eq!(store.orderbook_markets().await.unwrap()[0].base_asset, "SOL");
    }

    #[tokio::test]
    async fn test_import_listing_from_json() {
        let store = HistoryStore::open_in_memory(USDC).unwrap();
        let listing: VenueListing = serde_json::from_str(
            r#"{
                "assets": [{"asset_id": "SOL", "symbol": "SOL", "decimals": 9, "max_allocation": "0.25"}],
                "pools": [{"address": "pool", "token_a": "SOL", "token_b": "USDC", "tick_spacing": 64, "approved": true}],
                "markets": [{"address": "mkt", "base_asset": "SOL", "quote_asset": "USDC"}]
            }"#,
        )
        .unwrap();

        store.import_listing(&listing).unwrap();

        let assets = store.approved_assets().await.unwrap();
        assert!(assets["SOL"].approved);
        assert_eq!(assets["SOL"].max_allocation, Some(dec!(0.25)));
        let summary = store.summary().unwrap();
        assert_eq!((summary.pools, summary.markets), (1, 1));
    }
}
