//! Error types for the settlement engine.
//!
//! Every failure aborts the whole operation (and, inside a batch, the whole
//! batch) with no partial mutation. Callers resubmit corrected parameters;
//! there is no retry inside the engine.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::types::{PoolId, PoolKind};

/// Failures of the location and exchange-rate codecs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown location tag {0:#04x}")]
    InvalidLocationTag(u8),

    #[error("location word has non-zero padding")]
    NonCanonicalLocation,

    #[error("exchange rate component {0} exceeds 128 bits")]
    RateComponentOutOfRange(U256),
}

/// Coarse classification of [`SettlementError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    Economic,
    ResourceLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    // Validation
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("location or token refers to the engine itself")]
    SelfReference,

    #[error("token A and token B are the same token {0}")]
    SameToken(Address),

    #[error("location type not allowed here")]
    InvalidLocationType,

    #[error("location resolves to the zero address")]
    AddressZero,

    #[error("source wallet {wallet} does not belong to caller {caller}")]
    TransferFromNotCaller { wallet: Address, caller: Address },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("pool {pool_id} cannot hold token {token}")]
    TokenNotInPool { pool_id: PoolId, token: Address },

    #[error("fee of {0} ppm exceeds 1_000_000")]
    FeeTooHigh(u32),

    // Authorization
    #[error("{caller} is not owner or operator of pool {pool_id}")]
    NotPoolOwner { pool_id: PoolId, caller: Address },

    #[error("{0} is not the fee administrator")]
    NotFeeAdmin(Address),

    // State
    #[error("pool {0} does not exist")]
    PoolDoesNotExist(PoolId),

    #[error("pool {0} is not a limit order pool")]
    NotALimitOrderPool(PoolId),

    #[error("pool {0} is not a grid order pool")]
    NotAGridOrderPool(PoolId),

    #[error("mutating call rejected while a flash swap callback is running")]
    ReentrantCall,

    // Economic
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: U256, available: U256 },

    #[error("custodian transfer of token {token} failed: {reason}")]
    TransferFailed { token: Address, reason: String },

    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: U256, available: U256 },

    #[error("exchange rate disagreement: expected net {expected}, got {actual}")]
    ExchangeRateDisagreement { expected: U256, actual: U256 },

    #[error("pool {pool_id} cannot trade {token_a} for {token_b}")]
    PoolCannotTradeTheseTokens {
        pool_id: PoolId,
        token_a: Address,
        token_b: Address,
    },

    #[error("pool {0} cannot trade against itself")]
    PoolCannotTradeAgainstItself(PoolId),

    // Resource limits
    #[error("maximum pool count {0} reached")]
    MaxPoolCountExceeded(usize),

    #[error("grid pool would exceed {0} tokens")]
    MaxTokensPerGridOrder(usize),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("batch call {index} failed: {source}")]
    BatchCallFailed {
        index: usize,
        source: Box<SettlementError>,
    },
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        use SettlementError::*;
        match self {
            Codec(_) | SelfReference | SameToken(_) | InvalidLocationType | AddressZero
            | TransferFromNotCaller { .. } | ZeroAmount | TokenNotInPool { .. }
            | FeeTooHigh(_) => ErrorKind::Validation,
            NotPoolOwner { .. } | NotFeeAdmin(_) => ErrorKind::Authorization,
            PoolDoesNotExist(_) | NotALimitOrderPool(_) | NotAGridOrderPool(_)
            | ReentrantCall => ErrorKind::State,
            InsufficientBalance { .. }
            | TransferFailed { .. }
            | InsufficientCapacity { .. }
            | ExchangeRateDisagreement { .. }
            | PoolCannotTradeTheseTokens { .. }
            | PoolCannotTradeAgainstItself(_) => ErrorKind::Economic,
            MaxPoolCountExceeded(_) | MaxTokensPerGridOrder(_) | ArithmeticOverflow => {
                ErrorKind::ResourceLimit
            }
            BatchCallFailed { source, .. } => source.kind(),
        }
    }

    /// Strips batch wrappers down to the error that actually failed.
    pub fn root_cause(&self) -> &SettlementError {
        match self {
            SettlementError::BatchCallFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The error raised when an operation needs a pool of the other kind.
    pub(crate) fn wrong_kind(pool_id: PoolId, wanted: PoolKind) -> Self {
        match wanted {
            PoolKind::Limit => SettlementError::NotALimitOrderPool(pool_id),
            PoolKind::Grid => SettlementError::NotAGridOrderPool(pool_id),
        }
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
