//! In-memory paper venue: AMM pools, order-book markets, swap router and wallet.
//!
//! Pool math uses the same concentrated-liquidity formulas as the live pools, so
//! deposit quotes and withdrawals move the balances a real venue would. The order
//! book has no counterparties; orders rest until cancelled, and cancelled funds go
//! through the usual cancel → crank → settle sequence before reaching the wallet.

use super::traits::{AmmVenue, BalanceSource, MarketDataSource, OrderBookVenue, SwapRouter};
use super::types::*;
use crate::utils::clmm::{self, PoolToken};
use crate::utils::decimal::{pow10, raw_to_readable, readable_to_raw, to_f64};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Token known to the paper venue.
#[derive(Debug, Clone, Copy)]
pub struct PaperAsset {
    pub decimals: u8,
    /// USD price used by the swap router
    pub price_usd: Decimal,
}

/// A resting order and the funds it locks.
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub order_id: String,
    pub owner: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size_base: Decimal,
    /// Base (sell) or quote (buy) raw units held by the order
    pub locked_raw: u64,
}

#[derive(Debug, Clone)]
pub struct PaperMarket {
    pub descriptor: MarketDescriptor,
    pub info: MarketInfo,
    pub orders: Vec<PaperOrder>,
    pub pending_events: usize,
    /// owner -> (base, quote) raw amounts awaiting settlement
    pub unsettled: HashMap<String, (u64, u64)>,
}

/// Complete simulated venue state.
#[derive(Debug, Default)]
pub struct PaperState {
    pub assets: HashMap<String, PaperAsset>,
    pub pools: HashMap<String, PoolState>,
    pub positions: Vec<PositionRecord>,
    pub markets: HashMap<String, PaperMarket>,
    /// owner -> asset -> raw balance
    pub balances: HashMap<String, HashMap<String, u64>>,
}

impl PaperState {
    fn balance(&self, owner: &str, asset: &str) -> u64 {
        self.balances
            .get(owner)
            .and_then(|b| b.get(asset))
            .copied()
            .unwrap_or(0)
    }

    fn credit(&mut self, owner: &str, asset: &str, amount: u64) {
        let entry = self
            .balances
            .entry(owner.to_string())
            .or_default()
            .entry(asset.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    fn debit(&mut self, owner: &str, asset: &str, amount: u64) -> Result<()> {
        let available = self.balance(owner, asset);
        if available < amount {
            bail!("Insufficient {asset} balance: need {amount}, have {available}");
        }
        self.set_balance(owner, asset, available - amount);
        Ok(())
    }

    fn set_balance(&mut self, owner: &str, asset: &str, new_balance: u64) {
        self.balances
            .entry(owner.to_string())
            .or_default()
            .insert(asset.to_string(), new_balance);
    }

    fn asset(&self, asset: &str) -> Result<PaperAsset> {
        self.assets
            .get(asset)
            .copied()
            .with_context(|| format!("Unknown asset {asset}"))
    }
}

/// Paper implementation of every venue trait.
pub struct PaperVenue {
    state: Arc<RwLock<PaperState>>,
    id_counter: AtomicU64,
    /// Widening applied to deposit estimates
    slippage: Decimal,
}

impl PaperVenue {
    /// Create an empty venue with the given deposit slippage tolerance.
    pub fn new(slippage: Decimal) -> Self {
        Self {
            state: Arc::new(RwLock::new(PaperState::default())),
            id_counter: AtomicU64::new(1),
            slippage,
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.id_counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a token with its decimals and USD price.
    pub async fn add_asset(&self, asset_id: &str, decimals: u8, price_usd: Decimal) {
        self.state
            .write()
            .await
            .assets
            .insert(asset_id.to_string(), PaperAsset { decimals, price_usd });
    }

    /// Create a pool at `price` (token B per token A, human units).
    ///
    /// Both tokens must already be registered.
    pub async fn add_pool(&self, descriptor: &PoolDescriptor, price: f64) -> Result<()> {
        let mut state = self.state.write().await;
        let a = state.asset(&descriptor.token_a)?;
        let b = state.asset(&descriptor.token_b)?;

        let sqrt_price_x64 = clmm::price_to_sqrt_price_x64(price, a.decimals, b.decimals);
        if sqrt_price_x64 == 0 {
            bail!("Invalid pool price {price} for {}", descriptor.address);
        }

        state.pools.insert(
            descriptor.address.clone(),
            PoolState {
                address: descriptor.address.clone(),
                token_a: descriptor.token_a.clone(),
                token_b: descriptor.token_b.clone(),
                decimals_a: a.decimals,
                decimals_b: b.decimals,
                sqrt_price_x64,
                tick_current: clmm::price_to_tick(price, a.decimals, b.decimals),
                tick_spacing: descriptor.tick_spacing,
            },
        );
        Ok(())
    }

    pub async fn add_market(&self, descriptor: &MarketDescriptor, info: MarketInfo) {
        self.state.write().await.markets.insert(
            descriptor.address.clone(),
            PaperMarket {
                descriptor: descriptor.clone(),
                info,
                orders: Vec::new(),
                pending_events: 0,
                unsettled: HashMap::new(),
            },
        );
    }

    /// Seed a position directly (liquidity from other participants).
    pub async fn add_position(
        &self,
        owner: &str,
        pool: &str,
        range: TickRange,
        liquidity: u128,
    ) -> String {
        let position_id = self.next_id("pos");
        self.state.write().await.positions.push(PositionRecord {
            position_id: position_id.clone(),
            pool: pool.to_string(),
            owner: owner.to_string(),
            tick_lower: range.lower,
            tick_upper: range.upper,
            liquidity,
        });
        position_id
    }

    /// Add raw units to a wallet.
    pub async fn credit(&self, owner: &str, asset: &str, amount_raw: u64) {
        self.state.write().await.credit(owner, asset, amount_raw);
    }

    /// Resting orders on a market (all owners).
    pub async fn open_orders(&self, market: &str) -> Vec<PaperOrder> {
        self.state
            .read()
            .await
            .markets
            .get(market)
            .map(|m| m.orders.clone())
            .unwrap_or_default()
    }

    /// Register every priced asset, pool and market the data source lists, and fund
    /// `owner` with `quote_balance` of the quote asset.
    pub async fn seed_from(
        &self,
        data: &dyn MarketDataSource,
        quote_asset: &str,
        quote_decimals: u8,
        owner: &str,
        quote_balance: Decimal,
    ) -> Result<()> {
        let assets = data.approved_assets().await.context("Failed to load assets")?;
        let prices = data.latest_prices().await.context("Failed to load prices")?;

        self.add_asset(quote_asset, quote_decimals, Decimal::ONE).await;
        for (asset_id, info) in &assets {
            if asset_id == quote_asset {
                continue;
            }
            if let Some(&price) = prices.get(asset_id) {
                self.add_asset(asset_id, info.decimals, price).await;
            }
        }

        let mut pools = 0;
        for pool in data.amm_pools().await.context("Failed to load pools")? {
            let (Some(pa), Some(pb)) = (prices.get(&pool.token_a), prices.get(&pool.token_b)) else {
                debug!(pool = %pool.address, "Skipping unpriced pool");
                continue;
            };
            if pb.is_zero() {
                continue;
            }
            match self.add_pool(&pool, to_f64(*pa / *pb)).await {
                Ok(()) => pools += 1,
                Err(e) => debug!(pool = %pool.address, error = %e, "Skipping pool"),
            }
        }

        let mut markets = 0;
        for market in data.orderbook_markets().await.context("Failed to load markets")? {
            let base_decimals = assets.get(&market.base_asset).map(|a| a.decimals).unwrap_or(0);
            let info = MarketInfo {
                tick_size: Decimal::ONE / pow10(quote_decimals.min(4)),
                base_lot_size: Decimal::ONE / pow10(base_decimals),
            };
            self.add_market(&market, info).await;
            markets += 1;
        }

        self.credit(owner, quote_asset, readable_to_raw(quote_balance, quote_decimals))
            .await;

        info!(
            assets = assets.len(),
            pools,
            markets,
            %quote_balance,
            "Paper venue seeded"
        );
        Ok(())
    }

    fn widen(&self, estimate: u64) -> u64 {
        let extra = (Decimal::from(estimate) * self.slippage).ceil();
        estimate.saturating_add(extra.to_u64().unwrap_or(0))
    }
}

#[async_trait]
impl AmmVenue for PaperVenue {
    async fn pool_state(&self, pool: &str) -> Result<PoolState> {
        self.state
            .read()
            .await
            .pools
            .get(pool)
            .cloned()
            .with_context(|| format!("Unknown pool {pool}"))
    }

    async fn positions(&self, pool: &str) -> Result<Vec<PositionRecord>> {
        let state = self.state.read().await;
        if !state.pools.contains_key(pool) {
            bail!("Unknown pool {pool}");
        }
        Ok(state
            .positions
            .iter()
            .filter(|p| p.pool == pool)
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn quote_deposit(
        &self,
        pool: &str,
        range: TickRange,
        input_asset: &str,
        amount_raw: u64,
    ) -> Result<DepositQuote> {
        let state = self.state.read().await;
        let pool_state = state
            .pools
            .get(pool)
            .with_context(|| format!("Unknown pool {pool}"))?;

        if range.width() <= 0 {
            bail!("Empty tick range [{}, {})", range.lower, range.upper);
        }
        let input = if input_asset == pool_state.token_a {
            PoolToken::A
        } else if input_asset == pool_state.token_b {
            PoolToken::B
        } else {
            bail!("{input_asset} is not a token of pool {pool}");
        };

        let estimate = clmm::estimate_deposit(
            pool_state.sqrt_price_x64,
            range.lower,
            range.upper,
            input,
            amount_raw,
        );

        Ok(DepositQuote {
            est_a: estimate.amount_a,
            est_b: estimate.amount_b,
            max_a: self.widen(estimate.amount_a),
            max_b: self.widen(estimate.amount_b),
            liquidity: estimate.liquidity,
        })
    }

    #[instrument(skip(self, quote))]
    async fn open_position(
        &self,
        owner: &str,
        pool: &str,
        range: TickRange,
        quote: &DepositQuote,
    ) -> Result<String> {
        if quote.liquidity == 0 {
            bail!("Deposit quote carries no liquidity");
        }
        let position_id = self.next_id("pos");

        let mut state = self.state.write().await;
        let (token_a, token_b) = {
            let p = state
                .pools
                .get(pool)
                .with_context(|| format!("Unknown pool {pool}"))?;
            (p.token_a.clone(), p.token_b.clone())
        };

        if state.balance(owner, &token_a) < quote.est_a || state.balance(owner, &token_b) < quote.est_b {
            bail!(
                "Insufficient balance for deposit: need {} {token_a} and {} {token_b}",
                quote.est_a,
                quote.est_b
            );
        }
        state.debit(owner, &token_a, quote.est_a)?;
        state.debit(owner, &token_b, quote.est_b)?;

        state.positions.push(PositionRecord {
            position_id: position_id.clone(),
            pool: pool.to_string(),
            owner: owner.to_string(),
            tick_lower: range.lower,
            tick_upper: range.upper,
            liquidity: quote.liquidity,
        });

        info!(
            %position_id,
            %pool,
            tick_lower = range.lower,
            tick_upper = range.upper,
            amount_a = quote.est_a,
            amount_b = quote.est_b,
            "Paper position opened"
        );
        Ok(position_id)
    }

    #[instrument(skip(self))]
    async fn close_all_positions(&self, owner: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let (owned, others): (Vec<_>, Vec<_>) = std::mem::take(&mut state.positions)
            .into_iter()
            .partition(|p| p.owner == owner);
        state.positions = others;

        for position in &owned {
            let Some(pool) = state.pools.get(&position.pool).cloned() else {
                continue;
            };
            let (a, b) = clmm::token_amounts_from_liquidity(
                position.liquidity,
                clmm::sqrt_price_from_x64(pool.sqrt_price_x64),
                clmm::tick_to_sqrt_price(position.tick_lower),
                clmm::tick_to_sqrt_price(position.tick_upper),
            );
            state.credit(owner, &pool.token_a, a.floor() as u64);
            state.credit(owner, &pool.token_b, b.floor() as u64);
            debug!(position_id = %position.position_id, amount_a = a, amount_b = b, "Paper position closed");
        }

        Ok(owned.len())
    }

    async fn owned_position_count(&self, owner: &str) -> Result<usize> {
        Ok(self
            .state
            .read()
            .await
            .positions
            .iter()
            .filter(|p| p.owner == owner)
            .count())
    }
}

#[async_trait]
impl OrderBookVenue for PaperVenue {
    async fn market_info(&self, market: &str) -> Result<MarketInfo> {
        self.state
            .read()
            .await
            .markets
            .get(market)
            .map(|m| m.info)
            .with_context(|| format!("Unknown market {market}"))
    }

    #[instrument(skip(self, order), fields(market = %order.market, side = %order.side))]
    async fn place_order(&self, owner: &str, order: &LimitOrder) -> Result<String> {
        if order.price <= Decimal::ZERO || order.size_base <= Decimal::ZERO {
            bail!("Order price and size must be positive");
        }
        let order_id = self.next_id("ord");

        let mut state = self.state.write().await;
        let descriptor = state
            .markets
            .get(&order.market)
            .map(|m| m.descriptor.clone())
            .with_context(|| format!("Unknown market {}", order.market))?;

        let (lock_asset, locked_raw) = match order.side {
            OrderSide::Sell => {
                let base = state.asset(&descriptor.base_asset)?;
                (
                    descriptor.base_asset.clone(),
                    readable_to_raw(order.size_base, base.decimals),
                )
            }
            OrderSide::Buy => {
                let quote = state.asset(&descriptor.quote_asset)?;
                (
                    descriptor.quote_asset.clone(),
                    readable_to_raw(order.size_base * order.price, quote.decimals),
                )
            }
        };
        state.debit(owner, &lock_asset, locked_raw)?;

        if let Some(market) = state.markets.get_mut(&order.market) {
            market.orders.push(PaperOrder {
                order_id: order_id.clone(),
                owner: owner.to_string(),
                side: order.side,
                price: order.price,
                size_base: order.size_base,
                locked_raw,
            });
        }

        info!(
            %order_id,
            price = %order.price,
            size = %order.size_base,
            "Paper order resting"
        );
        Ok(order_id)
    }

    async fn cancel_orders(&self, owner: &str, market: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let book = state
            .markets
            .get_mut(market)
            .with_context(|| format!("Unknown market {market}"))?;

        let (cancelled, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut book.orders)
            .into_iter()
            .partition(|o| o.owner == owner);
        book.orders = kept;

        let unsettled = book.unsettled.entry(owner.to_string()).or_insert((0, 0));
        for order in &cancelled {
            match order.side {
                OrderSide::Sell => unsettled.0 += order.locked_raw,
                OrderSide::Buy => unsettled.1 += order.locked_raw,
            }
        }
        book.pending_events += cancelled.len();

        Ok(cancelled.len())
    }

    async fn crank(&self, market: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let book = state
            .markets
            .get_mut(market)
            .with_context(|| format!("Unknown market {market}"))?;
        Ok(std::mem::take(&mut book.pending_events))
    }

    async fn settle_funds(&self, owner: &str, market: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let book = state
            .markets
            .get_mut(market)
            .with_context(|| format!("Unknown market {market}"))?;

        if book.pending_events > 0 {
            bail!("Market {market} has {} uncranked events", book.pending_events);
        }
        let (base, quote) = book.unsettled.remove(owner).unwrap_or((0, 0));
        let base_asset = book.descriptor.base_asset.clone();
        let quote_asset = book.descriptor.quote_asset.clone();

        state.credit(owner, &base_asset, base);
        state.credit(owner, &quote_asset, quote);
        Ok(())
    }

    async fn account_state(&self, owner: &str, market: &str) -> Result<BookAccountState> {
        let state = self.state.read().await;
        let book = state
            .markets
            .get(market)
            .with_context(|| format!("Unknown market {market}"))?;
        let (unsettled_base, unsettled_quote) = book.unsettled.get(owner).copied().unwrap_or((0, 0));

        Ok(BookAccountState {
            open_orders: book.orders.iter().filter(|o| o.owner == owner).count(),
            pending_events: book.pending_events,
            unsettled_base,
            unsettled_quote,
        })
    }
}

#[async_trait]
impl SwapRouter for PaperVenue {
    #[instrument(skip(self))]
    async fn market_order(
        &self,
        owner: &str,
        input_asset: &str,
        output_asset: &str,
        amount_raw: u64,
    ) -> Result<SwapFill> {
        let mut state = self.state.write().await;
        let input = state.asset(input_asset)?;
        let output = state.asset(output_asset)?;
        if output.price_usd <= Decimal::ZERO {
            bail!("No price for {output_asset}");
        }

        let usd = raw_to_readable(amount_raw, input.decimals) * input.price_usd;
        let amount_out = readable_to_raw(usd / output.price_usd, output.decimals);

        state.debit(owner, input_asset, amount_raw)?;
        state.credit(owner, output_asset, amount_out);

        Ok(SwapFill {
            input_asset: input_asset.to_string(),
            output_asset: output_asset.to_string(),
            amount_in: amount_raw,
            amount_out,
        })
    }
}

#[async_trait]
impl BalanceSource for PaperVenue {
    async fn token_balance(&self, owner: &str, asset: &str) -> Result<u64> {
        Ok(self.state.read().await.balance(owner, asset))
    }
}
