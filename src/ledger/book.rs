//! Per-(token, location) balance book.
//!
//! ## Design
//!
//! Internal wallet and pool balances live in a `BTreeMap` keyed by
//! `(token, location)`, so iteration order (and therefore the state root) is
//! deterministic. A per-token running total is kept alongside so
//! conservation can be checked without a scan:
//!
//! ```text
//! total(token) == sum of ledger entries for token <= custodian.holdings(token)
//! ```
//!
//! External wallet balances are never stored here; moving tokens to or from
//! an external wallet goes through the custodian.
//!
//! Every write to `balances` or `totals` records the slot's previous value
//! in a [`Journal`], so a failed operation is undone entry by entry.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use thiserror::Error;
use tracing::debug;

use crate::error::{Result, SettlementError};
use crate::journal::Journal;
use crate::ledger::Custodian;
use crate::types::Location;

/// Where the tokens for a collection come from, after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Exactly this location.
    Location(Location),
    /// The caller's internal balance first, then the caller's external
    /// wallet for the shortfall.
    SenderWallet(Address),
}

/// A token whose ledger total exceeds the engine's real holdings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("token {token}: ledger total {ledger_total} exceeds custodial holdings {holdings}")]
pub struct ConservationViolation {
    pub token: Address,
    pub ledger_total: U256,
    pub holdings: U256,
}

#[derive(Debug, Clone)]
enum LedgerUndo {
    Balance {
        key: (Address, Location),
        previous: Option<U256>,
    },
    Total {
        token: Address,
        previous: Option<U256>,
    },
}

/// Journal positions of the ledger and its custodian.
#[derive(Debug, Clone, Copy)]
pub struct LedgerCheckpoint<K> {
    entries: usize,
    custodian: K,
}

#[derive(Debug, Clone)]
pub struct Ledger<C> {
    balances: BTreeMap<(Address, Location), U256>,
    totals: BTreeMap<Address, U256>,
    custodian: C,
    journal: Journal<LedgerUndo>,
}

impl<C: Custodian> Ledger<C> {
    pub fn new(custodian: C) -> Self {
        Self {
            balances: BTreeMap::new(),
            totals: BTreeMap::new(),
            custodian,
            journal: Journal::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Balance of `token` at `location`.
    ///
    /// External wallets report their real balance at the custodian.
    pub fn balance_of(&self, token: Address, location: Location) -> U256 {
        match location {
            Location::ExternalWallet(wallet) => self.custodian.balance_of(token, wallet),
            _ => self
                .balances
                .get(&(token, location))
                .copied()
                .unwrap_or_default(),
        }
    }

    /// Sum of all internal and pool balances of `token`.
    pub fn total_of(&self, token: Address) -> U256 {
        self.totals.get(&token).copied().unwrap_or_default()
    }

    /// Tokens that have ever been credited.
    pub fn tokens(&self) -> impl Iterator<Item = Address> + '_ {
        self.totals.keys().copied()
    }

    /// Non-zero entries in deterministic order.
    pub fn entries(&self) -> impl Iterator<Item = (Address, Location, U256)> + '_ {
        self.balances
            .iter()
            .map(|((token, location), amount)| (*token, *location, *amount))
    }

    pub fn custodian(&self) -> &C {
        &self.custodian
    }

    pub fn custodian_mut(&mut self) -> &mut C {
        &mut self.custodian
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    pub fn checkpoint(&self) -> LedgerCheckpoint<C::Checkpoint> {
        LedgerCheckpoint {
            entries: self.journal.mark(),
            custodian: self.custodian.checkpoint(),
        }
    }

    /// Undo every balance change and custodian transfer since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: LedgerCheckpoint<C::Checkpoint>) {
        for undo in self.journal.unwind(checkpoint.entries) {
            match undo {
                LedgerUndo::Balance { key, previous } => match previous {
                    Some(amount) => self.balances.insert(key, amount),
                    None => self.balances.remove(&key),
                },
                LedgerUndo::Total { token, previous } => match previous {
                    Some(amount) => self.totals.insert(token, amount),
                    None => self.totals.remove(&token),
                },
            };
        }
        self.custodian.rollback(checkpoint.custodian);
    }

    pub fn commit(&mut self) {
        self.journal.clear();
        self.custodian.commit();
    }

    fn set_balance(&mut self, key: (Address, Location), amount: U256) {
        let previous = if amount.is_zero() {
            self.balances.remove(&key)
        } else {
            self.balances.insert(key, amount)
        };
        self.journal.record(LedgerUndo::Balance { key, previous });
    }

    fn set_total(&mut self, token: Address, total: U256) {
        let previous = self.totals.insert(token, total);
        self.journal.record(LedgerUndo::Total { token, previous });
    }

    // ========================================================================
    // Internal bookkeeping
    // ========================================================================

    /// Add `amount` to an internal or pool balance.
    pub fn credit(&mut self, token: Address, location: Location, amount: U256) -> Result<()> {
        if location.is_external() {
            return Err(SettlementError::InvalidLocationType);
        }
        if amount.is_zero() {
            return Ok(());
        }

        let total = self
            .total_of(token)
            .checked_add(amount)
            .ok_or(SettlementError::ArithmeticOverflow)?;
        let balance = self.balance_of(token, location) + amount;

        self.set_balance((token, location), balance);
        self.set_total(token, total);
        debug!(%token, %location, %amount, "ledger credit");
        Ok(())
    }

    /// Remove `amount` from an internal or pool balance.
    pub fn debit(&mut self, token: Address, location: Location, amount: U256) -> Result<()> {
        if location.is_external() {
            return Err(SettlementError::InvalidLocationType);
        }
        if amount.is_zero() {
            return Ok(());
        }

        let available = self.balance_of(token, location);
        if available < amount {
            return Err(SettlementError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        self.set_balance((token, location), available - amount);
        let total = self.total_of(token) - amount;
        self.set_total(token, total);
        debug!(%token, %location, %amount, "ledger debit");
        Ok(())
    }

    // ========================================================================
    // Custodian bridge
    // ========================================================================

    /// Pull `amount` from an external wallet into the engine's custody.
    ///
    /// The engine's holdings must rise by exactly `amount`; tokens that
    /// deliver less (fee-on-transfer, rebasing) are rejected.
    pub fn pull_from_external(&mut self, token: Address, wallet: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let before = self.custodian.holdings(token);
        self.custodian
            .try_transfer_in(token, wallet, amount)
            .map_err(|e| SettlementError::TransferFailed {
                token,
                reason: e.to_string(),
            })?;

        let received = self.custodian.holdings(token).saturating_sub(before);
        if received != amount {
            return Err(SettlementError::TransferFailed {
                token,
                reason: format!("received {received} of {amount}"),
            });
        }
        debug!(%token, %wallet, %amount, "pulled from custodian");
        Ok(())
    }

    /// Push `amount` from the engine's custody to an external wallet.
    pub fn push_to_external(&mut self, token: Address, wallet: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.custodian
            .transfer_out(token, wallet, amount)
            .map_err(|e| SettlementError::TransferFailed {
                token,
                reason: e.to_string(),
            })?;
        debug!(%token, %wallet, %amount, "pushed to custodian");
        Ok(())
    }

    // ========================================================================
    // Movements
    // ========================================================================

    /// Take `amount` of `token` from `source` into the engine.
    ///
    /// The tokens are not credited anywhere; the caller must follow up with
    /// [`Ledger::deliver`] calls that net to the same amount.
    pub fn collect(&mut self, token: Address, source: Source, amount: U256) -> Result<()> {
        match source {
            Source::Location(Location::ExternalWallet(wallet)) => {
                self.pull_from_external(token, wallet, amount)
            }
            Source::Location(location) => self.debit(token, location, amount),
            Source::SenderWallet(wallet) => {
                let internal = Location::InternalWallet(wallet);
                let from_internal = self.balance_of(token, internal).min(amount);
                self.debit(token, internal, from_internal)?;
                self.pull_from_external(token, wallet, amount - from_internal)
            }
        }
    }

    /// Hand `amount` of `token` held by the engine to `destination`.
    pub fn deliver(&mut self, token: Address, destination: Location, amount: U256) -> Result<()> {
        match destination {
            Location::ExternalWallet(wallet) => self.push_to_external(token, wallet, amount),
            location => self.credit(token, location, amount),
        }
    }

    /// Move `amount` directly between two locations.
    pub fn transfer(
        &mut self,
        token: Address,
        source: Source,
        destination: Location,
        amount: U256,
    ) -> Result<()> {
        self.collect(token, source, amount)?;
        self.deliver(token, destination, amount)
    }

    /// Check that no token's ledger total exceeds the engine's real holdings.
    pub fn check_conservation(&self) -> std::result::Result<(), ConservationViolation> {
        for (token, total) in &self.totals {
            let holdings = self.custodian.holdings(*token);
            if *total > holdings {
                return Err(ConservationViolation {
                    token: *token,
                    ledger_total: *total,
                    holdings,
                });
            }
        }
        Ok(())
    }
}
