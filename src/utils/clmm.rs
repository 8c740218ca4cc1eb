//! Concentrated-liquidity math (tick/price conversion and liquidity sizing).
//!
//! Prices here are "token B per token A" in human units. Sqrt prices are in raw
//! token units, either as `f64` or as Q64.64 fixed point (`sqrt_price_x64`).
//! Floating point is used on purpose: ticks are logarithmic and the results are
//! rounded to integer ticks or raw token amounts immediately afterwards.

/// Lowest tick representable by the pool program.
pub const MIN_TICK: i32 = -443_636;
/// Highest tick representable by the pool program.
pub const MAX_TICK: i32 = 443_636;

const TICK_BASE: f64 = 1.0001;
const Q64: f64 = 18_446_744_073_709_551_616.0;

/// Which token of the pool a deposit is sized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolToken {
    A,
    B,
}

/// Liquidity and token amounts implied by a deposit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepositEstimate {
    pub liquidity: u128,
    pub amount_a: u64,
    pub amount_b: u64,
}

fn decimal_shift(decimals_a: u8, decimals_b: u8) -> f64 {
    10f64.powi(decimals_a as i32 - decimals_b as i32)
}

/// Q64.64 sqrt price to a human price.
pub fn sqrt_price_x64_to_price(sqrt_price_x64: u128, decimals_a: u8, decimals_b: u8) -> f64 {
    let sqrt = sqrt_price_x64 as f64 / Q64;
    sqrt * sqrt * decimal_shift(decimals_a, decimals_b)
}

/// Human price to Q64.64 sqrt price. Non-positive prices map to zero.
pub fn price_to_sqrt_price_x64(price: f64, decimals_a: u8, decimals_b: u8) -> u128 {
    if !(price > 0.0) || !price.is_finite() {
        return 0;
    }
    let raw = price / decimal_shift(decimals_a, decimals_b);
    (raw.sqrt() * Q64) as u128
}

/// Raw sqrt price from a Q64.64 value.
pub fn sqrt_price_from_x64(sqrt_price_x64: u128) -> f64 {
    sqrt_price_x64 as f64 / Q64
}

/// Raw sqrt price at a tick.
pub fn tick_to_sqrt_price(tick: i32) -> f64 {
    TICK_BASE.powf(tick as f64 / 2.0)
}

/// Human price at a tick.
pub fn tick_to_price(tick: i32, decimals_a: u8, decimals_b: u8) -> f64 {
    TICK_BASE.powi(tick) * decimal_shift(decimals_a, decimals_b)
}

/// The tick whose price range contains `price`, clamped to the valid tick range.
pub fn price_to_tick(price: f64, decimals_a: u8, decimals_b: u8) -> i32 {
    if !(price > 0.0) || !price.is_finite() {
        return MIN_TICK;
    }
    let raw = price / decimal_shift(decimals_a, decimals_b);
    let tick = (raw.ln() / TICK_BASE.ln()).floor();
    tick.clamp(MIN_TICK as f64, MAX_TICK as f64) as i32
}

/// Snap a tick onto the spacing grid, truncating toward zero.
pub fn initializable_tick(tick: i32, tick_spacing: u16) -> i32 {
    if tick_spacing == 0 {
        return tick;
    }
    let spacing = tick_spacing as i32;
    tick - tick % spacing
}

/// Token amounts (raw units, as floats) held by `liquidity` over a sqrt-price range.
pub fn token_amounts_from_liquidity(
    liquidity: u128,
    sqrt_current: f64,
    sqrt_lower: f64,
    sqrt_upper: f64,
) -> (f64, f64) {
    let l = liquidity as f64;
    if sqrt_upper <= sqrt_lower || l <= 0.0 {
        return (0.0, 0.0);
    }
    if sqrt_current <= sqrt_lower {
        (l * (sqrt_upper - sqrt_lower) / (sqrt_lower * sqrt_upper), 0.0)
    } else if sqrt_current >= sqrt_upper {
        (0.0, l * (sqrt_upper - sqrt_lower))
    } else {
        (
            l * (sqrt_upper - sqrt_current) / (sqrt_current * sqrt_upper),
            l * (sqrt_current - sqrt_lower),
        )
    }
}

/// Liquidity obtainable from `amount` of one token over a tick range at the
/// current sqrt price. Returns zero when the range cannot accept that token.
pub fn liquidity_for_input(
    input: PoolToken,
    amount: u64,
    sqrt_current: f64,
    sqrt_lower: f64,
    sqrt_upper: f64,
) -> u128 {
    if amount == 0 || sqrt_upper <= sqrt_lower {
        return 0;
    }
    let amount = amount as f64;
    let liquidity = match input {
        PoolToken::A => {
            if sqrt_current >= sqrt_upper {
                0.0
            } else {
                let lower = sqrt_current.max(sqrt_lower);
                amount * lower * sqrt_upper / (sqrt_upper - lower)
            }
        }
        PoolToken::B => {
            if sqrt_current <= sqrt_lower {
                0.0
            } else {
                let upper = sqrt_current.min(sqrt_upper);
                amount / (upper - sqrt_lower)
            }
        }
    };
    if liquidity.is_finite() && liquidity > 0.0 {
        liquidity as u128
    } else {
        0
    }
}

/// Size a deposit from one token's amount over `[tick_lower, tick_upper)`.
pub fn estimate_deposit(
    sqrt_price_x64: u128,
    tick_lower: i32,
    tick_upper: i32,
    input: PoolToken,
    amount: u64,
) -> DepositEstimate {
    let sqrt_current = sqrt_price_from_x64(sqrt_price_x64);
    let sqrt_lower = tick_to_sqrt_price(tick_lower);
    let sqrt_upper = tick_to_sqrt_price(tick_upper);

    let liquidity = liquidity_for_input(input, amount, sqrt_current, sqrt_lower, sqrt_upper);
    let (a, b) = token_amounts_from_liquidity(liquidity, sqrt_current, sqrt_lower, sqrt_upper);

    DepositEstimate {
        liquidity,
        amount_a: a.ceil() as u64,
        amount_b: b.ceil() as u64,
    }
}
