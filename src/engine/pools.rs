//! Pool lifecycle: limit and grid pool creation and update.
//!
//! ## Funding
//!
//! Funding always moves tokens from a caller-designated source into
//! `Pool(id)` through the ledger. A grid pool's token sources are applied as
//! incremental deposits; tokens not yet listed are appended, up to
//! `max_grid_tokens`.
//!
//! ## Trade Requests
//!
//! A limit pool carries exactly one request. A grid pool carries at most one
//! per ordered pair of listed tokens; submitting a pair again replaces the
//! existing request in place. Setting a zero rate deactivates a request
//! without removing it.

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::engine::Engine;
use crate::error::{Result, SettlementError};
use crate::ledger::Custodian;
use crate::registry::{GridPool, LimitPool, Pool};
use crate::types::{ExchangeRate, Location, LocationRef, PoolId, PoolKind, TradeRequest};

/// Parameters of [`Engine::create_limit_order_pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOrderParams {
    pub token_a: Address,
    pub token_b: Address,
    /// Initial funding in `token_a`; may be zero.
    pub amount_a: U256,
    pub exchange_rate: ExchangeRate,
    pub source: LocationRef,
    /// Where proceeds in `token_b` are paid.
    pub destination: LocationRef,
    pub owner: Address,
}

/// An incremental deposit into a grid pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSource {
    pub token: Address,
    pub amount: U256,
    pub source: LocationRef,
}

impl TokenSource {
    pub fn new(token: Address, amount: U256, source: LocationRef) -> Self {
        Self {
            token,
            amount,
            source,
        }
    }
}

/// A trade request to upsert into a grid pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeRequestParams {
    pub token_a: Address,
    pub token_b: Address,
    pub exchange_rate: ExchangeRate,
    pub destination: LocationRef,
}

impl TradeRequestParams {
    pub fn new(
        token_a: Address,
        token_b: Address,
        exchange_rate: ExchangeRate,
        destination: LocationRef,
    ) -> Self {
        Self {
            token_a,
            token_b,
            exchange_rate,
            destination,
        }
    }
}

impl<C: Custodian> Engine<C> {
    // ========================================================================
    // Limit pools
    // ========================================================================

    /// Create a pool selling `token_a` for `token_b`, funded from `source`.
    pub fn create_limit_order_pool(
        &mut self,
        caller: Address,
        params: LimitOrderParams,
    ) -> Result<PoolId> {
        self.guard.ensure_idle()?;
        self.atomically("create_limit_order_pool", |engine| {
            engine.do_create_limit_order_pool(caller, params)
        })
    }

    pub(crate) fn do_create_limit_order_pool(
        &mut self,
        caller: Address,
        params: LimitOrderParams,
    ) -> Result<PoolId> {
        self.validate_pair(params.token_a, params.token_b)?;
        if params.owner.is_zero() {
            return Err(SettlementError::AddressZero);
        }
        let source = self.resolve_source(caller, params.source)?;

        let pool_id = self.state.pools.next_id(PoolKind::Limit)?;
        let destination = self.resolve_destination(caller, params.destination, Some(pool_id))?;
        let request = TradeRequest {
            token_a: params.token_a,
            token_b: params.token_b,
            exchange_rate: params.exchange_rate,
            destination,
        };

        self.state.pools.insert(Pool::Limit(LimitPool { request }))?;
        self.state.ownership.on_pool_created(pool_id, params.owner);
        self.admit_token(caller, params.token_b, destination)?;

        self.state.ledger.collect(params.token_a, source, params.amount_a)?;
        self.state
            .ledger
            .credit(params.token_a, Location::Pool(pool_id), params.amount_a)?;

        info!(
            pool = %pool_id,
            owner = %params.owner,
            token_a = %params.token_a,
            token_b = %params.token_b,
            amount_a = %params.amount_a,
            rate = %params.exchange_rate,
            "limit order pool created"
        );
        Ok(pool_id)
    }

    /// Replace the rate and payout destination of a limit pool's request.
    pub fn update_limit_order_pool(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        exchange_rate: ExchangeRate,
        destination: LocationRef,
    ) -> Result<()> {
        self.guard.ensure_idle()?;
        self.atomically("update_limit_order_pool", |engine| {
            engine.do_update_limit_order_pool(caller, pool_id, exchange_rate, destination)
        })
    }

    pub(crate) fn do_update_limit_order_pool(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        exchange_rate: ExchangeRate,
        destination: LocationRef,
    ) -> Result<()> {
        self.authorize_pool(caller, pool_id)?;
        let token_b = match self.state.pools.get(pool_id)? {
            Pool::Limit(limit) => limit.request.token_b,
            Pool::Grid(_) => return Err(SettlementError::wrong_kind(pool_id, PoolKind::Limit)),
        };
        let destination = self.resolve_destination(caller, destination, Some(pool_id))?;
        self.admit_token(caller, token_b, destination)?;

        if let Pool::Limit(limit) = self.state.pools.get_mut(pool_id)? {
            limit.request.exchange_rate = exchange_rate;
            limit.request.destination = destination;
        }

        info!(pool = %pool_id, rate = %exchange_rate, %destination, "limit order pool updated");
        Ok(())
    }

    // ========================================================================
    // Grid pools
    // ========================================================================

    /// Create a grid pool, apply `token_sources` as deposits and upsert
    /// `trade_requests`.
    pub fn create_grid_order_pool(
        &mut self,
        caller: Address,
        token_sources: Vec<TokenSource>,
        trade_requests: Vec<TradeRequestParams>,
        owner: Address,
    ) -> Result<PoolId> {
        self.guard.ensure_idle()?;
        self.atomically("create_grid_order_pool", |engine| {
            engine.do_create_grid_order_pool(caller, &token_sources, &trade_requests, owner)
        })
    }

    pub(crate) fn do_create_grid_order_pool(
        &mut self,
        caller: Address,
        token_sources: &[TokenSource],
        trade_requests: &[TradeRequestParams],
        owner: Address,
    ) -> Result<PoolId> {
        if owner.is_zero() {
            return Err(SettlementError::AddressZero);
        }
        let max_tokens = self.config.max_grid_tokens;
        let pool_id = self
            .state
            .pools
            .insert(Pool::Grid(GridPool::new(max_tokens)))?;
        self.state.ownership.on_pool_created(pool_id, owner);

        self.apply_grid_changes(caller, pool_id, token_sources, trade_requests)?;

        info!(
            pool = %pool_id,
            %owner,
            deposits = token_sources.len(),
            requests = trade_requests.len(),
            "grid order pool created"
        );
        Ok(pool_id)
    }

    /// Add funding to a grid pool and upsert its trade requests.
    pub fn update_grid_order_pool(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        token_sources: Vec<TokenSource>,
        trade_requests: Vec<TradeRequestParams>,
    ) -> Result<()> {
        self.guard.ensure_idle()?;
        self.atomically("update_grid_order_pool", |engine| {
            engine.do_update_grid_order_pool(caller, pool_id, &token_sources, &trade_requests)
        })
    }

    pub(crate) fn do_update_grid_order_pool(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        token_sources: &[TokenSource],
        trade_requests: &[TradeRequestParams],
    ) -> Result<()> {
        self.authorize_pool(caller, pool_id)?;
        if self.state.pools.get(pool_id)?.kind() != PoolKind::Grid {
            return Err(SettlementError::wrong_kind(pool_id, PoolKind::Grid));
        }

        self.apply_grid_changes(caller, pool_id, token_sources, trade_requests)?;

        info!(
            pool = %pool_id,
            deposits = token_sources.len(),
            requests = trade_requests.len(),
            "grid order pool updated"
        );
        Ok(())
    }

    fn apply_grid_changes(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        token_sources: &[TokenSource],
        trade_requests: &[TradeRequestParams],
    ) -> Result<()> {
        let max_tokens = self.config.max_grid_tokens;

        for deposit in token_sources {
            self.validate_token(deposit.token)?;
            let source = self.resolve_source(caller, deposit.source)?;
            self.grid_mut(pool_id)?.add_token(deposit.token, max_tokens)?;
            self.state.ledger.collect(deposit.token, source, deposit.amount)?;
            self.state
                .ledger
                .credit(deposit.token, Location::Pool(pool_id), deposit.amount)?;
        }

        for params in trade_requests {
            self.validate_pair(params.token_a, params.token_b)?;
            let destination = self.resolve_destination(caller, params.destination, Some(pool_id))?;
            let request = TradeRequest {
                token_a: params.token_a,
                token_b: params.token_b,
                exchange_rate: params.exchange_rate,
                destination,
            };
            self.grid_mut(pool_id)?.upsert(request, max_tokens)?;
            self.admit_token(caller, params.token_b, destination)?;
        }
        Ok(())
    }

    pub(crate) fn grid_mut(&mut self, pool_id: PoolId) -> Result<&mut GridPool> {
        match self.state.pools.get_mut(pool_id)? {
            Pool::Grid(grid) => Ok(grid),
            Pool::Limit(_) => Err(SettlementError::wrong_kind(pool_id, PoolKind::Grid)),
        }
    }
}
