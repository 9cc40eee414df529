//! # Grid Settlement
//!
//! Non-custodial settlement engine for limit and grid order pools.
//!
//! ## Architecture
//!
//! The engine consists of:
//! - **Types**: Core data structures (Location, ExchangeRate, PoolId, Fill, ExecutionReceipt)
//! - **Ledger**: Per-(token, location) balances over an external custodian, plus fees
//! - **Registry**: Pool arena with slab-based storage and the ownership registry
//! - **Engine**: Pool lifecycle, market orders, flash swaps and batches
//!
//! ## Design Principles
//!
//! 1. **Determinism**: All operations produce identical results for identical inputs
//! 2. **No Floating Point**: Amounts are `U256` base units, rates are integer ratios
//! 3. **Atomicity**: Every operation (and every batch) applies fully or not at all
//! 4. **Conservation**: Ledger totals never exceed what the custodian holds
//!
//! ## Example
//!
//! ```
//! use alloy_primitives::{address, U256};
//! use grid_settlement::{Engine, EngineConfig, ExchangeRate, InMemoryCustodian, Location};
//! use grid_settlement::engine::{TokenSource, TradeRequestParams};
//! use grid_settlement::types::LocationRef;
//!
//! let engine_addr = address!("00000000000000000000000000000000000000ee");
//! let owner = address!("00000000000000000000000000000000000000a1");
//! let a = address!("0000000000000000000000000000000000000011");
//! let b = address!("0000000000000000000000000000000000000022");
//!
//! let mut custodian = InMemoryCustodian::new(engine_addr);
//! custodian.fund(a, owner, U256::from(500u64));
//! let config = EngineConfig::new(engine_addr, address!("00000000000000000000000000000000000000ad"));
//! let mut engine = Engine::new(config, custodian).unwrap();
//!
//! let pool = engine
//!     .create_grid_order_pool(
//!         owner,
//!         vec![TokenSource::new(a, U256::from(500u64), LocationRef::SenderWallet)],
//!         vec![TradeRequestParams::new(a, b, ExchangeRate::new(1, 1), LocationRef::ThisPool)],
//!         owner,
//!     )
//!     .unwrap();
//!
//! assert_eq!(engine.balance_of(a, Location::Pool(pool)), U256::from(500u64));
//! assert!(engine.check_conservation().is_ok());
//! ```

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: Location, ExchangeRate, PoolId, Fill, ExecutionReceipt
pub mod types;

/// Token ledger, custodian boundary and fee schedule
pub mod ledger;

/// Pool storage and ownership
pub mod registry;

/// Undo journals backing engine checkpoints
pub mod journal;

/// Settlement engine: pools, market orders, flash swaps, batches
pub mod engine;

/// Engine configuration (TOML)
pub mod config;

/// Error types
pub mod error;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineCall, FlashSwapCallee, FlashSwapContext, MarketOrder};
pub use error::{ErrorKind, Result, SettlementError};
pub use ledger::{Custodian, FeeRule, InMemoryCustodian};
pub use types::{ExchangeRate, ExecutionReceipt, Fill, Location, LocationRef, PoolId, PoolKind};
