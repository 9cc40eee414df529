//! Completion records for market orders and flash swaps.
//!
//! ## SSZ Serialization
//!
//! [`FillRecord`] is the fixed-size wire form of a [`Fill`]. Addresses are
//! left-padded to 32-byte words and amounts are big-endian 32-byte words, so
//! the encoding is deterministic and independent of platform endianness.

use alloy_primitives::{Address, U256};
use ssz_rs::prelude::*;

use crate::types::PoolId;

/// Result of one market order or flash swap against a trade request.
///
/// `amount_b_net + fee == amount_b_gross` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub pool_id: PoolId,
    pub token_a: Address,
    pub token_b: Address,
    /// Token A delivered to the taker.
    pub amount_a: U256,
    /// Token B collected from the taker.
    pub amount_b_gross: U256,
    /// Token B credited to the trade request's payout location.
    pub amount_b_net: U256,
    /// Token B credited to the fee receiver.
    pub fee: U256,
}

impl Fill {
    pub fn to_record(&self) -> FillRecord {
        FillRecord {
            pool_id: self.pool_id.raw(),
            token_a: self.token_a.into_word().0,
            token_b: self.token_b.into_word().0,
            amount_a: self.amount_a.to_be_bytes::<32>(),
            amount_b_gross: self.amount_b_gross.to_be_bytes::<32>(),
            amount_b_net: self.amount_b_net.to_be_bytes::<32>(),
        }
    }
}

/// SSZ form of a [`Fill`]: 8 + 5 * 32 = 168 bytes.
///
/// The fee is implied by `amount_b_gross - amount_b_net`.
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct FillRecord {
    pub pool_id: u64,
    pub token_a: [u8; 32],
    pub token_b: [u8; 32],
    pub amount_a: [u8; 32],
    pub amount_b_gross: [u8; 32],
    pub amount_b_net: [u8; 32],
}
