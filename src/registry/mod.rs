//! Pool registry.
//!
//! ## Components
//!
//! - [`Pool`]: a [`LimitPool`] or a [`GridPool`]
//! - [`PoolStore`]: slab arena with permanent, sequential ids
//! - [`OwnershipRegistry`]: who may mutate which pool
//!
//! Creation and update are the only structural mutators; pools are never
//! deleted, even at zero balance.

pub mod ownership;
pub mod pool;
pub mod store;

pub use ownership::OwnershipRegistry;
pub use pool::{GridPool, LimitPool, Pool};
pub use store::PoolStore;
