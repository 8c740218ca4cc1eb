//! Price bands for the order book (inside) and the AMM (outside).
//!
//! Both variants start from a `{min, max, latest}` statistic. The inside band
//! shrinks the historical range by `range_adjustment`; the outside band widens it.
//! Either way the edges are then pushed out so they sit at least
//! `min_percent_away_from_latest` from the latest price.

use crate::config::BandConfig;
use crate::exchange::PriceStats;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BandKind {
    /// Tighter than history, for resting orders
    Inside,
    /// Wider than history, for passive AMM ranges
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBand {
    pub lower: Decimal,
    pub upper: Decimal,
    pub kind: BandKind,
}

/// Compute a band from raw statistics.
pub fn price_band(
    min: Decimal,
    max: Decimal,
    latest: Decimal,
    kind: BandKind,
    range_adjustment: Decimal,
    min_percent_away: Decimal,
) -> PriceBand {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    let adjustment = range_adjustment * (max - min);

    let (lower, upper) = match kind {
        BandKind::Inside => (min + adjustment, max - adjustment),
        BandKind::Outside => (min - adjustment, max + adjustment),
    };

    PriceBand {
        lower: lower.min(latest * (Decimal::ONE - min_percent_away)),
        upper: upper.max(latest * (Decimal::ONE + min_percent_away)),
        kind,
    }
}

/// Order-book band from statistics.
pub fn inside_band(stats: &PriceStats, config: &BandConfig) -> PriceBand {
    price_band(
        stats.min,
        stats.max,
        stats.latest,
        BandKind::Inside,
        config.range_adjustment,
        config.min_percent_away_from_latest,
    )
}

/// AMM band from statistics, with the historical range extended to include the
/// pool's spot price.
pub fn outside_band(stats: &PriceStats, spot: Option<Decimal>, config: &BandConfig) -> PriceBand {
    let (min, max) = match spot {
        Some(spot) if spot > Decimal::ZERO => (stats.min.min(spot), stats.max.max(spot)),
        _ => (stats.min, stats.max),
    };
    price_band(
        min,
        max,
        stats.latest,
        BandKind::Outside,
        config.range_adjustment,
        config.min_percent_away_from_latest,
    )
}

/// Inside band around `latest ± std_dev`, used to decide which liquidity counts
/// as in-band.
pub fn volatility_band(stats: &PriceStats, config: &BandConfig) -> PriceBand {
    price_band(
        stats.latest - stats.std_dev,
        stats.latest + stats.std_dev,
        stats.latest,
        BandKind::Inside,
        config.range_adjustment,
        config.min_percent_away_from_latest,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stats(min: Decimal, max: Decimal, latest: Decimal) -> PriceStats {
        PriceStats {
            min,
            max,
            mean: (min + max) / dec!(2),
            std_dev: Decimal::ZERO,
            latest,
            samples: 2,
        }
    }

    #[test]
    fn test_band_scenario() {
        let config = BandConfig::default();
        let s = stats(dec!(100), dec!(200), dec!(150));

        let inside = inside_band(&s, &config);
        assert_eq!((inside.lower, inside.upper), (dec!(110), dec!(190)));
        assert_eq!(inside.kind, BandKind::Inside);

        let outside = outside_band(&s, None, &config);
        assert_eq!((outside.lower, outside.upper), (dec!(90), dec!(210)));
    }

    #[test]
    fn test_flat_history_widened_around_latest() {
        let config = BandConfig::default();
        let s = stats(dec!(100), dec!(100), dec!(100));

        let inside = inside_band(&s, &config);
        assert_eq!(inside.lower, dec!(99));
        assert_eq!(inside.upper, dec!(101));
    }

    #[test]
    fn test_outside_contains_inside() {
        let config = BandConfig::default();
        let cases = [
            (dec!(100), dec!(200), dec!(150)),
            (dec!(1), dec!(1.02), dec!(1.05)),
            (dec!(0.00001), dec!(0.00003), dec!(0.00001)),
            (dec!(50), dec!(50), dec!(50)),
        ];
        for (min, max, latest) in cases {
            let s = stats(min, max, latest);
            let inside = inside_band(&s, &config);
            let outside = outside_band(&s, None, &config);

            assert!(inside.lower <= inside.upper);
            assert!(outside.lower <= inside.lower);
            assert!(outside.upper >= inside.upper);
            assert!(inside.lower <= latest * dec!(0.99));
            assert!(inside.upper >= latest * dec!(1.01));
        }
    }

    #[test]
    fn test_outside_band_includes_spot() {
        let config = BandConfig::default();
        let s = stats(dec!(100), dec!(200), dec!(150));

        let band = outside_band(&s, Some(dec!(250)), &config);
        assert_eq!(band.lower, dec!(85));
        assert_eq!(band.upper, dec!(265));
    }

    #[test]
    fn test_volatility_band() {
        let config = BandConfig::default();
        let s = PriceStats {
            std_dev: dec!(10),
            ..stats(dec!(100), dec!(200), dec!(150))
        };

        let band = volatility_band(&s, &config);
        assert_eq!(band.lower, dec!(142));
        assert_eq!(band.upper, dec!(158));
    }
}
