//! Fixed exchange rates.
//!
//! ## Overview
//!
//! An [`ExchangeRate`] `(x1, x2)` means "x1 units of token A trade for x2
//! units of token B". Both components are bounded to 128 bits, and all
//! conversions run on 256-bit integers, so no floating point is ever involved.
//!
//! ## Rounding
//!
//! Rounding always favours the pool:
//!
//! - `a_to_b(amount_a) = ceil(amount_a * x2 / x1)` (what the taker must pay)
//! - `b_to_a(amount_b) = floor(amount_b * x1 / x2)` (what the taker may take)
//!
//! Hence `a_to_b(b_to_a(b)) <= b` for every `b`.
//!
//! ## Example
//!
//! ```
//! use alloy_primitives::U256;
//! use grid_settlement::types::ExchangeRate;
//!
//! // 3 A for 2 B
//! let rate = ExchangeRate::new(3, 2);
//! assert_eq!(rate.a_to_b(U256::from(4)), Some(U256::from(3))); // ceil(8/3)
//! assert_eq!(rate.b_to_a(U256::from(3)), Some(U256::from(4))); // floor(9/2)
//! ```

use std::str::FromStr;

use alloy_primitives::{B256, U256};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::error::CodecError;

/// Ratio of token A units to token B units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExchangeRate {
    /// Units of token A.
    pub x1: u128,
    /// Units of token B.
    pub x2: u128,
}

impl ExchangeRate {
    /// The disabled rate.
    pub const ZERO: ExchangeRate = ExchangeRate { x1: 0, x2: 0 };

    pub const fn new(x1: u128, x2: u128) -> Self {
        Self { x1, x2 }
    }

    /// Build a rate from wide components, failing if either exceeds 128 bits.
    pub fn from_components(x1: U256, x2: U256) -> Result<Self, CodecError> {
        let x1 = u128::try_from(x1).map_err(|_| CodecError::RateComponentOutOfRange(x1))?;
        let x2 = u128::try_from(x2).map_err(|_| CodecError::RateComponentOutOfRange(x2))?;
        Ok(Self { x1, x2 })
    }

    /// A zero on either side disables trading in this direction.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.x1 != 0 && self.x2 != 0
    }

    // ========================================================================
    // Codec
    // ========================================================================

    /// Pack into one word: `x1` in the high 16 bytes, `x2` in the low 16.
    pub fn encode(&self) -> B256 {
        let mut word = [0u8; 32];
        word[..16].copy_from_slice(&self.x1.to_be_bytes());
        word[16..].copy_from_slice(&self.x2.to_be_bytes());
        B256::from(word)
    }

    /// Inverse of [`ExchangeRate::encode`]; every word is a valid rate.
    pub fn decode(word: B256) -> Self {
        let mut x1 = [0u8; 16];
        let mut x2 = [0u8; 16];
        x1.copy_from_slice(&word[..16]);
        x2.copy_from_slice(&word[16..]);
        Self {
            x1: u128::from_be_bytes(x1),
            x2: u128::from_be_bytes(x2),
        }
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Token B owed for `amount_a` of token A, rounded up.
    ///
    /// Returns `None` if the rate is inactive or the product overflows.
    pub fn a_to_b(&self, amount_a: U256) -> Option<U256> {
        if !self.is_active() {
            return None;
        }
        let numerator = amount_a.checked_mul(U256::from(self.x2))?;
        let x1 = U256::from(self.x1);
        let quotient = numerator / x1;
        if numerator % x1 == U256::ZERO {
            Some(quotient)
        } else {
            quotient.checked_add(U256::from(1u8))
        }
    }

    /// Token A obtainable for `amount_b` of token B, rounded down.
    ///
    /// Returns `None` if the rate is inactive or the product overflows.
    pub fn b_to_a(&self, amount_b: U256) -> Option<U256> {
        if !self.is_active() {
            return None;
        }
        let numerator = amount_b.checked_mul(U256::from(self.x1))?;
        Some(numerator / U256::from(self.x2))
    }

    // ========================================================================
    // Human-readable prices (using rust_decimal)
    // ========================================================================

    /// Build the exact rate for a decimal price quoted in token A per token B.
    ///
    /// ```
    /// use grid_settlement::types::ExchangeRate;
    ///
    /// // 1 B is worth 25,000 A
    /// assert_eq!(ExchangeRate::from_price_str("25000"), Some(ExchangeRate::new(25_000, 1)));
    /// // 1 B is worth 0.4 A
    /// assert_eq!(ExchangeRate::from_price_str("0.4"), Some(ExchangeRate::new(2, 5)));
    /// ```
    pub fn from_price(price: Decimal) -> Option<Self> {
        if price.is_sign_negative() || price.is_zero() {
            return None;
        }
        let price = price.normalize();
        let mantissa = u128::try_from(price.mantissa()).ok()?;
        let denominator = 10u128.checked_pow(price.scale())?;
        let divisor = gcd(mantissa, denominator);
        Some(Self::new(mantissa / divisor, denominator / divisor))
    }

    pub fn from_price_str(s: &str) -> Option<Self> {
        Self::from_price(Decimal::from_str(s).ok()?)
    }

    /// Token A per token B as a decimal, for display and logging.
    ///
    /// Returns `None` for inactive rates or ratios outside Decimal's range.
    pub fn price(&self) -> Option<Decimal> {
        if !self.is_active() {
            return None;
        }
        let x1 = Decimal::from_u128(self.x1)?;
        let x2 = Decimal::from_u128(self.x2)?;
        x1.checked_div(x2)
    }
}

impl std::fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.x1, self.x2)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

// ============================================================================
// Unit Tests
// ============================================================================
