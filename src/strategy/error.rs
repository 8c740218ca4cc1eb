//! Per-asset error taxonomy for the rebalance cycle.

use thiserror::Error;

/// Why a single asset could not be sized. None of these abort the cycle.
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("No approved AMM pool pairs {0} with the quote asset")]
    MissingPool(String),

    #[error("No order-book market trades {0} against the quote asset")]
    MissingMarket(String),

    #[error("No price for {0}")]
    MissingPrice(String),

    #[error("Token order mismatch: {0}")]
    PolarityMismatch(String),

    #[error("No price history for {0}")]
    NoPriceHistory(String),

    #[error("Invalid pool state: {0}")]
    InvalidPoolState(String),

    #[error("Venue call {operation} failed: {source}")]
    Venue {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl RebalanceError {
    /// Wrap a venue failure with the name of the call that failed.
    pub fn venue(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Venue { operation, source }
    }

    /// True for missing data (as opposed to a failed venue call).
    pub fn is_data_gap(&self) -> bool {
        !matches!(self, Self::Venue { .. })
    }
}

pub type RebalanceResult<T> = Result<T, RebalanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RebalanceError::MissingPool("SOL".to_string());
        assert_eq!(
            err.to_string(),
            "No approved AMM pool pairs SOL with the quote asset"
        );
        assert!(err.is_data_gap());

        let err = RebalanceError::venue("quote_deposit", anyhow::anyhow!("timeout"));
        assert_eq!(err.to_string(), "Venue call quote_deposit failed: timeout");
        assert!(!err.is_data_gap());
    }
}
