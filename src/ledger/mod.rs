//! Token ledger, custodian boundary and fee schedule.
//!
//! ## Components
//!
//! - [`Ledger`]: per-(token, location) balances for internal wallets and
//!   pools, bridging to the custodian for external wallets
//! - [`Custodian`]: the external asset custodian interface, with the
//!   [`InMemoryCustodian`] implementation
//! - [`FeeSchedule`]: default and per-pair [`FeeRule`]s
//!
//! ## Conservation
//!
//! Every completed operation nets its credits and debits to zero, so for
//! every token the sum of ledger balances never exceeds what the custodian
//! holds for the engine, and no entry ever goes negative.

pub mod book;
pub mod custodian;
pub mod fees;

pub use book::{ConservationViolation, Ledger, LedgerCheckpoint, Source};
pub use custodian::{Custodian, CustodianError, InMemoryCustodian};
pub use fees::{FeeRule, FeeSchedule, PPM_DENOMINATOR};
