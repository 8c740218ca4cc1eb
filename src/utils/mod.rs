//! Shared utilities: decimal helpers and concentrated-liquidity math.

pub mod clmm;
pub mod decimal;
