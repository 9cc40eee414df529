//! Core data types for the settlement engine
//!
//! All amounts and balances are `U256` token base units; nothing here uses
//! floating point.
//!
//! ## Types
//!
//! - [`Location`]: where tokens move from and to, with a 32-byte codec
//! - [`LocationRef`]: a caller-supplied location, possibly a flag
//! - [`ExchangeRate`]: fixed `x1:x2` ratio with pool-favouring rounding
//! - [`PoolId`] / [`PoolKind`]: permanent pool identity
//! - [`TradeRequest`]: a standing offer to sell token A for token B
//! - [`Fill`]: completion record of a market order or flash swap
//! - [`ExecutionReceipt`]: batch execution summary

mod fill;
mod location;
mod pool;
mod rate;
mod receipt;

pub use fill::{Fill, FillRecord};
pub use location::{Location, LocationRef};
pub use pool::{PoolId, PoolKind, TradeRequest, TradeRequestView};
pub use rate::ExchangeRate;
pub use receipt::ExecutionReceipt;
