//! Transfers between locations, pool ownership and fee administration.

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::engine::Engine;
use crate::error::{Result, SettlementError};
use crate::ledger::{Custodian, FeeRule};
use crate::types::{Location, LocationRef, PoolId};

impl<C: Custodian> Engine<C> {
    // ========================================================================
    // Transfers
    // ========================================================================

    /// Move `amount` of `token` from `source` to `destination`.
    ///
    /// Covers deposits into an internal wallet, withdrawals to an external
    /// wallet, and funding or draining a pool the caller owns or operates.
    /// A grid pool receiving an unlisted token appends it to its list.
    pub fn transfer(
        &mut self,
        caller: Address,
        token: Address,
        amount: U256,
        source: LocationRef,
        destination: LocationRef,
    ) -> Result<()> {
        self.guard.ensure_idle()?;
        self.atomically("transfer", |engine| {
            engine.do_transfer(caller, token, amount, source, destination)
        })
    }

    pub(crate) fn do_transfer(
        &mut self,
        caller: Address,
        token: Address,
        amount: U256,
        source: LocationRef,
        destination: LocationRef,
    ) -> Result<()> {
        self.validate_token(token)?;
        if amount.is_zero() {
            return Err(SettlementError::ZeroAmount);
        }
        let source = self.resolve_source(caller, source)?;
        let destination = self.resolve_destination(caller, destination, None)?;

        if let Location::Pool(pool_id) = destination {
            self.authorize_pool(caller, pool_id)?;
        }
        self.admit_token(caller, token, destination)?;

        self.state.ledger.collect(token, source, amount)?;
        self.deliver(token, destination, amount)
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Hand `pool_id` to `to`. The caller must be the owner or an operator.
    pub fn transfer_pool_ownership(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        to: Address,
    ) -> Result<()> {
        self.guard.ensure_idle()?;
        self.atomically("transfer_pool_ownership", |engine| {
            engine.do_transfer_pool_ownership(caller, pool_id, to)
        })
    }

    pub(crate) fn do_transfer_pool_ownership(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        to: Address,
    ) -> Result<()> {
        self.authorize_pool(caller, pool_id)?;
        let from = self
            .state
            .ownership
            .owner_of(pool_id)
            .ok_or(SettlementError::PoolDoesNotExist(pool_id))?;
        self.state.ownership.on_pool_transferred(pool_id, from, to)?;

        info!(pool = %pool_id, %from, %to, "pool ownership transferred");
        Ok(())
    }

    /// Approve or revoke `operator` for all of the caller's pools.
    pub fn set_operator(&mut self, caller: Address, operator: Address, approved: bool) -> Result<()> {
        self.guard.ensure_idle()?;
        self.atomically("set_operator", |engine| {
            engine.do_set_operator(caller, operator, approved)
        })
    }

    pub(crate) fn do_set_operator(
        &mut self,
        caller: Address,
        operator: Address,
        approved: bool,
    ) -> Result<()> {
        if operator.is_zero() {
            return Err(SettlementError::AddressZero);
        }
        if operator == self.config.engine_address {
            return Err(SettlementError::SelfReference);
        }
        self.state.ownership.set_operator(caller, operator, approved);
        info!(owner = %caller, %operator, approved, "operator approval set");
        Ok(())
    }

    // ========================================================================
    // Fee administration
    // ========================================================================

    fn ensure_fee_admin(&self, caller: Address) -> Result<()> {
        if caller != self.config.admin {
            return Err(SettlementError::NotFeeAdmin(caller));
        }
        Ok(())
    }

    fn checked_fee_rule(&self, fee_ppm: u32, receiver: Location) -> Result<FeeRule> {
        let rule = FeeRule::new(fee_ppm, receiver)?;
        self.validate_fee_receiver(receiver)?;
        Ok(rule)
    }

    /// Replace the rule used for pairs without an override.
    pub fn set_default_fee(&mut self, caller: Address, fee_ppm: u32, receiver: Location) -> Result<()> {
        self.guard.ensure_idle()?;
        self.ensure_fee_admin(caller)?;
        let rule = self.checked_fee_rule(fee_ppm, receiver)?;
        self.atomically("set_default_fee", |engine| {
            engine.state.fees.set_default(rule);
            Ok(())
        })?;
        info!(fee_ppm, %receiver, "default fee set");
        Ok(())
    }

    /// Override the fee for trades selling `token_a` for `token_b`.
    pub fn set_pair_fee(
        &mut self,
        caller: Address,
        token_a: Address,
        token_b: Address,
        fee_ppm: u32,
        receiver: Location,
    ) -> Result<()> {
        self.guard.ensure_idle()?;
        self.ensure_fee_admin(caller)?;
        self.validate_pair(token_a, token_b)?;
        let rule = self.checked_fee_rule(fee_ppm, receiver)?;
        self.atomically("set_pair_fee", |engine| {
            engine.state.fees.set_pair(token_a, token_b, rule);
            Ok(())
        })?;
        info!(%token_a, %token_b, fee_ppm, %receiver, "pair fee set");
        Ok(())
    }

    /// Drop a pair override; the default rule applies again.
    pub fn remove_pair_fee(
        &mut self,
        caller: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Option<FeeRule>> {
        self.guard.ensure_idle()?;
        self.ensure_fee_admin(caller)?;
        let removed = self.atomically("remove_pair_fee", |engine| {
            Ok(engine.state.fees.remove_pair(token_a, token_b))
        })?;
        if removed.is_some() {
            info!(%token_a, %token_b, "pair fee removed");
        }
        Ok(removed)
    }
}
