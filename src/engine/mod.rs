//! Settlement engine for Grid Settlement.
//!
//! ## Design Principles
//!
//! The engine is designed for:
//!
//! 1. **Determinism**: Same calls against the same state give the same state root
//! 2. **Exact Integer Math**: Rates are integer ratios with fixed rounding rules
//! 3. **Synchronous Execution**: One operation at a time, no async
//! 4. **All-or-Nothing**: A failed operation leaves no partial effects
//!
//! ## Operations
//!
//! - **Pools**: create and update limit and grid pools ([`pools`])
//! - **Market orders**: buy from a trade request at its exact rate ([`market`])
//! - **Flash swaps**: receive first, pay after a callback ([`flash`])
//! - **Batches**: several calls as one atomic unit ([`batch`])
//! - **Transfers, ownership, fees**: account plumbing ([`admin`])
//!
//! Every mutating entry point takes the calling account explicitly as its
//! first argument; authorization is checked against it.

pub mod admin;
pub mod batch;
pub mod flash;
pub mod guard;
pub mod market;
pub mod pools;
pub mod settlement;

pub use batch::{BatchResult, CallOutcome, EngineCall};
pub use flash::{FlashSwapCallee, FlashSwapContext, FlashSwapInfo};
pub use guard::{GuardState, ReentrancyGuard};
pub use market::{MarketOrder, Quote};
pub use pools::{LimitOrderParams, TokenSource, TradeRequestParams};
pub use settlement::{Engine, PoolSnapshot};
