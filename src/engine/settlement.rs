//! The settlement engine: state, atomicity and location resolution.
//!
//! ## Atomicity
//!
//! Every public mutating operation runs through `Engine::atomically`. Each
//! component (ledger with its custodian, pools, ownership, fee schedule)
//! journals the slots it overwrites, and a checkpoint is the set of journal
//! positions plus the batch counter and the reentrancy guard. If the
//! operation returns an error or panics, the journals are unwound back to the
//! checkpoint, so a failed call leaves no trace and costs only what it
//! touched. Batches and nested flash swaps reuse the same mechanism at their
//! own scope; the journals are cleared once the outermost operation commits.
//!
//! ## Location Resolution
//!
//! Callers pass [`LocationRef`]s; the engine resolves them before moving any
//! tokens:
//!
//! | As source           | Rule                                             |
//! |---------------------|--------------------------------------------------|
//! | wallet              | must belong to the caller                        |
//! | pool                | caller must be its owner or an approved operator |
//! | `SenderWallet`      | caller's internal balance, then external wallet  |
//! | `ThisPool`          | rejected                                         |
//!
//! | As destination      | Rule                                             |
//! |---------------------|--------------------------------------------------|
//! | wallet              | any, except the zero address and the engine      |
//! | pool, token listed  | accepted                                         |
//! | grid pool, unlisted | appended under `max_grid_tokens` if the caller   |
//! |                     | owns or operates the pool, else `TokenNotInPool` |
//! | limit pool, unlisted| `TokenNotInPool`                                 |
//! | `SenderWallet`      | caller's internal wallet                         |
//! | `ThisPool`          | the pool being created or updated                |
//!
//! The pool rows apply to every path that sends a token into a pool:
//! transfers, market order and flash swap destinations, and trade request
//! payouts.

use std::panic::{self, AssertUnwindSafe};

use alloy_primitives::{Address, U256};
use tracing::warn;

use crate::config::{ConfigError, EngineConfig};
use crate::engine::guard::{GuardState, ReentrancyGuard};
use crate::error::{Result, SettlementError};
use crate::ledger::{
    ConservationViolation, Custodian, FeeRule, FeeSchedule, Ledger, LedgerCheckpoint, Source,
};
use crate::registry::{OwnershipRegistry, Pool, PoolStore};
use crate::types::{
    ExecutionReceipt, Location, LocationRef, PoolId, PoolKind, TradeRequest, TradeRequestView,
};

/// Everything a failed operation must roll back.
#[derive(Debug)]
pub(crate) struct EngineState<C> {
    pub(crate) ledger: Ledger<C>,
    pub(crate) pools: PoolStore,
    pub(crate) ownership: OwnershipRegistry,
    pub(crate) fees: FeeSchedule,
    pub(crate) batches: u64,
}

/// Journal positions taken when an operation starts.
#[derive(Debug, Clone, Copy)]
struct Checkpoint<K> {
    ledger: LedgerCheckpoint<K>,
    pools: usize,
    ownership: usize,
    fees: usize,
    batches: u64,
    guard: GuardState,
}

/// Read-only view of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub id: PoolId,
    pub kind: PoolKind,
    pub owner: Option<Address>,
    /// Balance of every token the pool may hold, in listing order.
    pub balances: Vec<(Address, U256)>,
    pub trade_requests: Vec<TradeRequest>,
}

#[derive(Debug)]
pub struct Engine<C> {
    pub(crate) config: EngineConfig,
    pub(crate) state: EngineState<C>,
    pub(crate) guard: ReentrancyGuard,
    /// Operations currently running inside `atomically`.
    open_checkpoints: u32,
}

impl<C: Custodian> Engine<C> {
    /// Create an engine over `custodian`.
    ///
    /// The custodian must hold assets under the configured engine address.
    pub fn new(config: EngineConfig, custodian: C) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        if custodian.engine() != config.engine_address {
            return Err(ConfigError::InvalidValue(
                "engine_address".to_string(),
                format!("custodian holds assets for {}", custodian.engine()),
            ));
        }

        let fees = FeeSchedule::new(config.default_fee_rule());
        let mut ledger = Ledger::new(custodian);
        ledger.commit();
        let state = EngineState {
            ledger,
            pools: PoolStore::with_capacity(config.max_pool_count),
            ownership: OwnershipRegistry::new(),
            fees,
            batches: 0,
        };

        Ok(Self {
            config,
            state,
            guard: ReentrancyGuard::new(),
            open_checkpoints: 0,
        })
    }

    // ========================================================================
    // Atomicity
    // ========================================================================

    /// Run `f`; if it fails or panics, restore the state from before the
    /// call. A panic is re-raised after the rollback.
    pub(crate) fn atomically<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let checkpoint = self.checkpoint();
        self.open_checkpoints += 1;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut *self)));
        self.open_checkpoints -= 1;

        match outcome {
            Ok(Ok(value)) => {
                if self.open_checkpoints == 0 {
                    self.commit();
                }
                Ok(value)
            }
            Ok(Err(error)) => {
                warn!(operation, %error, "operation rolled back");
                self.rollback(checkpoint);
                Err(error)
            }
            Err(payload) => {
                warn!(operation, "operation panicked, rolled back");
                self.rollback(checkpoint);
                panic::resume_unwind(payload)
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint<C::Checkpoint> {
        Checkpoint {
            ledger: self.state.ledger.checkpoint(),
            pools: self.state.pools.checkpoint(),
            ownership: self.state.ownership.checkpoint(),
            fees: self.state.fees.checkpoint(),
            batches: self.state.batches,
            guard: self.guard.state(),
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint<C::Checkpoint>) {
        self.state.ledger.rollback(checkpoint.ledger);
        self.state.pools.rollback(checkpoint.pools);
        self.state.ownership.rollback(checkpoint.ownership);
        self.state.fees.rollback(checkpoint.fees);
        self.state.batches = checkpoint.batches;
        self.guard.restore(checkpoint.guard);
    }

    fn commit(&mut self) {
        self.state.ledger.commit();
        self.state.pools.commit();
        self.state.ownership.commit();
        self.state.fees.commit();
    }

    // ========================================================================
    // Validation & resolution
    // ========================================================================

    pub(crate) fn validate_token(&self, token: Address) -> Result<()> {
        if token == self.config.engine_address {
            return Err(SettlementError::SelfReference);
        }
        if token.is_zero() {
            return Err(SettlementError::AddressZero);
        }
        Ok(())
    }

    pub(crate) fn validate_pair(&self, token_a: Address, token_b: Address) -> Result<()> {
        self.validate_token(token_a)?;
        self.validate_token(token_b)?;
        if token_a == token_b {
            return Err(SettlementError::SameToken(token_a));
        }
        Ok(())
    }

    /// Fails unless `caller` is the owner or an operator of an existing pool.
    pub(crate) fn authorize_pool(&self, caller: Address, pool_id: PoolId) -> Result<()> {
        self.state.pools.get(pool_id)?;
        if !self.state.ownership.is_owner_or_operator(pool_id, caller) {
            return Err(SettlementError::NotPoolOwner { pool_id, caller });
        }
        Ok(())
    }

    pub(crate) fn resolve_source(&self, caller: Address, source: LocationRef) -> Result<Source> {
        match source {
            LocationRef::SenderWallet => Ok(Source::SenderWallet(caller)),
            LocationRef::ThisPool => Err(SettlementError::InvalidLocationType),
            LocationRef::Fixed(location) => {
                match location {
                    Location::ExternalWallet(wallet) | Location::InternalWallet(wallet) => {
                        if wallet != caller {
                            return Err(SettlementError::TransferFromNotCaller { wallet, caller });
                        }
                    }
                    Location::Pool(pool_id) => self.authorize_pool(caller, pool_id)?,
                }
                Ok(Source::Location(location))
            }
        }
    }

    pub(crate) fn validate_destination(&self, location: Location) -> Result<()> {
        match location {
            Location::ExternalWallet(wallet) | Location::InternalWallet(wallet) => {
                if wallet.is_zero() {
                    return Err(SettlementError::AddressZero);
                }
                if wallet == self.config.engine_address {
                    return Err(SettlementError::SelfReference);
                }
                Ok(())
            }
            Location::Pool(pool_id) => self.state.pools.get(pool_id).map(|_| ()),
        }
    }

    /// Resolve a destination. `this_pool` is the pool being created or
    /// updated, if any; it need not exist yet.
    pub(crate) fn resolve_destination(
        &self,
        caller: Address,
        destination: LocationRef,
        this_pool: Option<PoolId>,
    ) -> Result<Location> {
        match destination {
            LocationRef::SenderWallet => {
                let location = Location::InternalWallet(caller);
                self.validate_destination(location)?;
                Ok(location)
            }
            LocationRef::ThisPool => this_pool
                .map(Location::Pool)
                .ok_or(SettlementError::InvalidLocationType),
            LocationRef::Fixed(location) if this_pool.is_some() && location.pool_id() == this_pool => {
                Ok(location)
            }
            LocationRef::Fixed(location) => {
                self.validate_destination(location)?;
                Ok(location)
            }
        }
    }

    /// A pool may only receive tokens it lists.
    pub(crate) fn ensure_can_receive(&self, token: Address, destination: Location) -> Result<()> {
        if let Location::Pool(pool_id) = destination {
            if !self.state.pools.get(pool_id)?.holds_token(token) {
                return Err(SettlementError::TokenNotInPool { pool_id, token });
            }
        }
        Ok(())
    }

    /// Make sure `destination` may receive `token` on behalf of `caller`.
    ///
    /// A grid pool the caller owns or operates lists an unlisted token on
    /// the spot, subject to `max_grid_tokens`; any other pool must already
    /// list it.
    pub(crate) fn admit_token(&mut self, caller: Address, token: Address, destination: Location) -> Result<()> {
        let Location::Pool(pool_id) = destination else {
            return Ok(());
        };
        let pool = self.state.pools.get(pool_id)?;
        if pool.holds_token(token) {
            return Ok(());
        }
        let is_grid = matches!(pool, Pool::Grid(_));
        if !is_grid || !self.state.ownership.is_owner_or_operator(pool_id, caller) {
            return Err(SettlementError::TokenNotInPool { pool_id, token });
        }
        let max_tokens = self.config.max_grid_tokens;
        if let Pool::Grid(grid) = self.state.pools.get_mut(pool_id)? {
            grid.add_token(token, max_tokens)?;
        }
        Ok(())
    }

    /// Deliver tokens the engine is holding for this operation.
    pub(crate) fn deliver(&mut self, token: Address, destination: Location, amount: U256) -> Result<()> {
        self.ensure_can_receive(token, destination)?;
        self.state.ledger.deliver(token, destination, amount)
    }

    pub(crate) fn validate_fee_receiver(&self, receiver: Location) -> Result<()> {
        if let Location::Pool(_) = receiver {
            return Err(SettlementError::InvalidLocationType);
        }
        self.validate_destination(receiver)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine_address(&self) -> Address {
        self.config.engine_address
    }

    /// Balance of `token` at `location`. External wallets report their
    /// balance at the custodian.
    pub fn balance_of(&self, token: Address, location: Location) -> U256 {
        self.state.ledger.balance_of(token, location)
    }

    pub fn custodian(&self) -> &C {
        self.state.ledger.custodian()
    }

    /// Direct access to the custodian, e.g. to fund wallets in tests.
    ///
    /// Only available while no callback is running.
    pub fn custodian_mut(&mut self) -> Result<&mut C> {
        self.guard.ensure_idle()?;
        Ok(self.state.ledger.custodian_mut())
    }

    pub fn pool_count(&self) -> usize {
        self.state.pools.len()
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.state.pools.iter().map(|(id, _)| id).collect()
    }

    pub fn owner_of(&self, pool_id: PoolId) -> Option<Address> {
        self.state.ownership.owner_of(pool_id)
    }

    pub fn is_operator(&self, owner: Address, operator: Address) -> bool {
        self.state.ownership.is_operator(owner, operator)
    }

    pub fn pool(&self, pool_id: PoolId) -> Result<PoolSnapshot> {
        let pool = self.state.pools.get(pool_id)?;
        let location = Location::Pool(pool_id);
        let balances = pool
            .tokens()
            .into_iter()
            .map(|token| (token, self.state.ledger.balance_of(token, location)))
            .collect();

        Ok(PoolSnapshot {
            id: pool_id,
            kind: pool.kind(),
            owner: self.state.ownership.owner_of(pool_id),
            balances,
            trade_requests: pool.trade_requests(),
        })
    }

    /// The request selling `token_a` for `token_b`, with its current
    /// capacity (the pool's balance of `token_a`).
    pub fn trade_request(
        &self,
        pool_id: PoolId,
        token_a: Address,
        token_b: Address,
    ) -> Result<TradeRequestView> {
        let pool = self.state.pools.get(pool_id)?;
        let request = pool
            .trade_request(token_a, token_b)
            .copied()
            .ok_or(SettlementError::PoolCannotTradeTheseTokens {
                pool_id,
                token_a,
                token_b,
            })?;

        Ok(TradeRequestView {
            pool_id,
            request,
            capacity: self.state.ledger.balance_of(token_a, Location::Pool(pool_id)),
        })
    }

    /// All requests of a pool with their capacities.
    pub fn trade_requests(&self, pool_id: PoolId) -> Result<Vec<TradeRequestView>> {
        let pool = self.state.pools.get(pool_id)?;
        Ok(pool
            .trade_requests()
            .into_iter()
            .map(|request| TradeRequestView {
                pool_id,
                request,
                capacity: self
                    .state
                    .ledger
                    .balance_of(request.token_a, Location::Pool(pool_id)),
            })
            .collect())
    }

    /// Fee rule applied to trades selling `token_a` for `token_b`.
    pub fn fee_for(&self, token_a: Address, token_b: Address) -> FeeRule {
        self.state.fees.lookup(token_a, token_b)
    }

    /// Number of batches committed so far.
    pub fn batches_committed(&self) -> u64 {
        self.state.batches
    }

    /// Check that no token's ledger total exceeds the engine's custodial
    /// holdings.
    pub fn check_conservation(&self) -> std::result::Result<(), ConservationViolation> {
        self.state.ledger.check_conservation()
    }

    /// SHA-256 over the ledger, pools, ownership and fee schedule.
    ///
    /// Every component is iterated in a fixed order, so equal states always
    /// produce equal roots.
    pub fn state_root(&self) -> [u8; 32] {
        let mut data = Vec::new();

        for (token, location, amount) in self.state.ledger.entries() {
            data.extend_from_slice(token.into_word().as_slice());
            data.extend_from_slice(location.encode().as_slice());
            data.extend_from_slice(&amount.to_be_bytes::<32>());
        }

        for (pool_id, pool) in self.state.pools.iter() {
            data.extend_from_slice(&pool_id.raw().to_be_bytes());
            for token in pool.tokens() {
                data.extend_from_slice(token.into_word().as_slice());
            }
            for request in pool.trade_requests() {
                data.extend_from_slice(request.token_a.into_word().as_slice());
                data.extend_from_slice(request.token_b.into_word().as_slice());
                data.extend_from_slice(request.exchange_rate.encode().as_slice());
                data.extend_from_slice(request.destination.encode().as_slice());
            }
        }

        for (pool_id, owner) in self.state.ownership.owners() {
            data.extend_from_slice(&pool_id.raw().to_be_bytes());
            data.extend_from_slice(owner.into_word().as_slice());
        }
        for (owner, operator) in self.state.ownership.operators() {
            data.extend_from_slice(owner.into_word().as_slice());
            data.extend_from_slice(operator.into_word().as_slice());
        }

        let default = self.state.fees.default_rule();
        data.extend_from_slice(&default.fee_ppm.to_be_bytes());
        data.extend_from_slice(default.receiver.encode().as_slice());
        for ((token_a, token_b), rule) in self.state.fees.overrides() {
            data.extend_from_slice(token_a.into_word().as_slice());
            data.extend_from_slice(token_b.into_word().as_slice());
            data.extend_from_slice(&rule.fee_ppm.to_be_bytes());
            data.extend_from_slice(rule.receiver.encode().as_slice());
        }

        ExecutionReceipt::compute_hash(&data)
    }

    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root())
    }
}
