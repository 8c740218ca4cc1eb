//! # Dual-Venue Rebalancer
//!
//! Allocates capital across assets by trailing volume against in-band
//! liquidity, and deploys each asset's target into a concentrated-liquidity AMM
//! position plus a resting order on a limit order book.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Venue traits, shared types and the paper venue
//! - `strategy`: Scoring, capping, sizing and the rebalance cycle
//! - `persistence`: SQLite history store for prices, swaps and listings
//! - `utils`: Decimal helpers and concentrated-liquidity math

pub mod config;
pub mod exchange;
pub mod persistence;
pub mod strategy;
pub mod utils;

pub use config::Config;
