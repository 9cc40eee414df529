//! Pool identifiers and trade requests.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::types::{ExchangeRate, Location};

// ============================================================================
// PoolKind
// ============================================================================

/// The two kinds of resting order pool.
///
/// Represented as u8 inside a [`PoolId`]:
/// - Limit = 1
/// - Grid = 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolKind {
    /// A single trade request selling token A for token B.
    Limit,
    /// Up to one trade request per ordered pair of the pool's tokens.
    Grid,
}

impl PoolKind {
    pub fn to_u8(self) -> u8 {
        match self {
            PoolKind::Limit => 1,
            PoolKind::Grid => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PoolKind::Limit),
            2 => Some(PoolKind::Grid),
            _ => None,
        }
    }
}

// ============================================================================
// PoolId
// ============================================================================

/// Permanent pool identifier: a sequence number composed with the pool kind.
///
/// ```text
/// raw = sequence << 8 | kind
/// ```
///
/// Sequence numbers start at 1 and are never reused, so every id is positive.
///
/// ## Example
///
/// ```
/// use grid_settlement::types::{PoolId, PoolKind};
///
/// let id = PoolId::new(5, PoolKind::Grid).unwrap();
/// assert_eq!(id.sequence(), 5);
/// assert_eq!(id.kind(), PoolKind::Grid);
/// assert_eq!(PoolId::try_from(id.raw()), Ok(id));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PoolId(u64);

impl PoolId {
    const KIND_BITS: u32 = 8;

    /// Largest sequence number that fits beside the kind tag.
    pub const MAX_SEQUENCE: u64 = (1 << (64 - Self::KIND_BITS)) - 1;

    /// Compose an id, or `None` unless `1 <= sequence <= MAX_SEQUENCE`.
    pub fn new(sequence: u64, kind: PoolKind) -> Option<Self> {
        if sequence == 0 || sequence > Self::MAX_SEQUENCE {
            return None;
        }
        Some(PoolId((sequence << Self::KIND_BITS) | kind.to_u8() as u64))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn sequence(self) -> u64 {
        self.0 >> Self::KIND_BITS
    }

    #[inline]
    pub fn kind(self) -> PoolKind {
        // Every constructed id carries a valid tag.
        PoolKind::from_u8(self.0 as u8).unwrap_or(PoolKind::Limit)
    }
}

impl TryFrom<u64> for PoolId {
    type Error = String;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        if PoolKind::from_u8(raw as u8).is_none() {
            return Err(format!("pool id {raw:#x} has no valid kind tag"));
        }
        if raw >> Self::KIND_BITS == 0 {
            return Err(format!("pool id {raw:#x} has a zero sequence number"));
        }
        Ok(PoolId(raw))
    }
}

impl From<PoolId> for u64 {
    fn from(id: PoolId) -> Self {
        id.0
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind() {
            PoolKind::Limit => "limit",
            PoolKind::Grid => "grid",
        };
        write!(f, "{kind}#{}", self.sequence())
    }
}

// ============================================================================
// TradeRequest
// ============================================================================

/// A standing offer to sell `token_a` for `token_b` at a fixed ratio.
///
/// The request is inactive while its exchange rate is zero on either side.
/// Proceeds in `token_b` are credited to `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TradeRequest {
    pub token_a: Address,
    pub token_b: Address,
    pub exchange_rate: ExchangeRate,
    pub destination: Location,
}

impl TradeRequest {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.exchange_rate.is_active()
    }
}

/// A trade request together with the capacity it can currently sell.
///
/// For grid pools every request sharing `token_a` reports the same capacity,
/// because they all draw on the pool's single balance of that token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeRequestView {
    pub pool_id: PoolId,
    pub request: TradeRequest,
    pub capacity: U256,
}
