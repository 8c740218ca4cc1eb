//! Venue integrations for the rebalancer.
//!
//! ## Traits
//! Async collaborator interfaces for price history, market listings, the AMM,
//! the order book, the swap router and wallet balances.
//!
//! ## Paper venue
//! In-memory implementation of every venue trait for dry runs and tests.

pub mod paper;
pub mod traits;
mod types;

pub use paper::PaperVenue;
pub use traits::*;
pub use types::*;
