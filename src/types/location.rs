//! Locations: where tokens move from and to.
//!
//! ## Wire Form
//!
//! A location encodes into a single 32-byte word:
//!
//! ```text
//! byte 0        tag (0x01 external wallet, 0x02 internal wallet, 0x03 pool)
//! bytes 1..12   zero
//! bytes 12..32  wallet address            (wallet variants)
//! bytes 24..32  pool id, big-endian       (pool variant, bytes 12..24 zero)
//! ```
//!
//! Decoding rejects unknown tags and any non-zero padding, so
//! `decode(encode(l)) == l` and every accepted word has exactly one meaning.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::types::PoolId;

const TAG_EXTERNAL_WALLET: u8 = 0x01;
const TAG_INTERNAL_WALLET: u8 = 0x02;
const TAG_POOL: u8 = 0x03;

/// A concrete source or destination for a token movement.
///
/// Only `ExternalWallet` locations ever touch the external custodian;
/// `InternalWallet` and `Pool` balances live in the engine's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Location {
    /// A wallet held at the external custodian.
    ExternalWallet(Address),
    /// A prefunded balance held inside the engine on behalf of a wallet.
    InternalWallet(Address),
    /// The balance of a trading pool.
    Pool(PoolId),
}

impl Location {
    /// Encode into the canonical 32-byte word.
    pub fn encode(&self) -> B256 {
        let mut word = [0u8; 32];
        match self {
            Location::ExternalWallet(wallet) => {
                word[0] = TAG_EXTERNAL_WALLET;
                word[12..].copy_from_slice(wallet.as_slice());
            }
            Location::InternalWallet(wallet) => {
                word[0] = TAG_INTERNAL_WALLET;
                word[12..].copy_from_slice(wallet.as_slice());
            }
            Location::Pool(pool_id) => {
                word[0] = TAG_POOL;
                word[24..].copy_from_slice(&pool_id.raw().to_be_bytes());
            }
        }
        B256::from(word)
    }

    /// Decode a 32-byte word produced by [`Location::encode`].
    pub fn decode(word: B256) -> Result<Self, CodecError> {
        let bytes = word.as_slice();
        let tag = bytes[0];
        let padding_end = match tag {
            TAG_EXTERNAL_WALLET | TAG_INTERNAL_WALLET => 12,
            TAG_POOL => 24,
            other => return Err(CodecError::InvalidLocationTag(other)),
        };
        if bytes[1..padding_end].iter().any(|b| *b != 0) {
            return Err(CodecError::NonCanonicalLocation);
        }

        match tag {
            TAG_EXTERNAL_WALLET => Ok(Location::ExternalWallet(Address::from_slice(&bytes[12..]))),
            TAG_INTERNAL_WALLET => Ok(Location::InternalWallet(Address::from_slice(&bytes[12..]))),
            _ => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[24..]);
                PoolId::try_from(u64::from_be_bytes(raw))
                    .map(Location::Pool)
                    .map_err(|_| CodecError::NonCanonicalLocation)
            }
        }
    }

    /// The wallet address behind a wallet location.
    pub fn wallet(&self) -> Option<Address> {
        match self {
            Location::ExternalWallet(wallet) | Location::InternalWallet(wallet) => Some(*wallet),
            Location::Pool(_) => None,
        }
    }

    pub fn pool_id(&self) -> Option<PoolId> {
        match self {
            Location::Pool(pool_id) => Some(*pool_id),
            _ => None,
        }
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self, Location::ExternalWallet(_))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::ExternalWallet(wallet) => write!(f, "external:{wallet}"),
            Location::InternalWallet(wallet) => write!(f, "internal:{wallet}"),
            Location::Pool(pool_id) => write!(f, "pool:{pool_id}"),
        }
    }
}

/// A location as given by a caller, before it is resolved.
///
/// Besides concrete locations, callers may pass one of two flags:
///
/// - `ThisPool`: only valid as a pool's payout destination; resolves to the
///   pool being created or updated, so proceeds are reinvested as new
///   sell-side liquidity.
/// - `SenderWallet`: as a source, the caller's internal balance is consumed
///   first and only the shortfall is pulled from the external custodian; as a
///   destination, it is the caller's internal wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationRef {
    Fixed(Location),
    ThisPool,
    SenderWallet,
}

impl From<Location> for LocationRef {
    fn from(location: Location) -> Self {
        LocationRef::Fixed(location)
    }
}
