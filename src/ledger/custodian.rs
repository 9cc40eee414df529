//! External custodian boundary.
//!
//! The custodian holds real token balances for external wallets and for the
//! engine itself. The engine only ever asks it to pull tokens from a wallet
//! into the engine's custody, or push tokens from custody out to a wallet.
//! Any failure signal is surfaced as `SettlementError::TransferFailed`.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::journal::Journal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodianError {
    #[error("allowance {allowance} below requested {requested}")]
    InsufficientAllowance { allowance: U256, requested: U256 },

    #[error("balance {balance} below requested {requested}")]
    InsufficientFunds { balance: U256, requested: U256 },

    #[error("token rejected the transfer: {0}")]
    Rejected(String),
}

/// Uniform interface over the external asset custodian.
///
/// The custodian takes part in the engine's checkpoints: a failed operation
/// must also undo the transfers it already made at the custodian.
pub trait Custodian {
    /// Opaque position in the custodian's own undo log.
    type Checkpoint: Copy + std::fmt::Debug;

    /// The engine's own address at this custodian.
    fn engine(&self) -> Address;

    /// Real balance of `holder` at the custodian.
    fn balance_of(&self, token: Address, holder: Address) -> U256;

    /// Move `amount` of `token` from `from` into the engine's custody.
    fn try_transfer_in(
        &mut self,
        token: Address,
        from: Address,
        amount: U256,
    ) -> Result<(), CustodianError>;

    /// Move `amount` of `token` from the engine's custody to `to`.
    fn transfer_out(&mut self, token: Address, to: Address, amount: U256)
        -> Result<(), CustodianError>;

    /// Tokens of `token` under the engine's custody.
    fn holdings(&self, token: Address) -> U256 {
        self.balance_of(token, self.engine())
    }

    fn checkpoint(&self) -> Self::Checkpoint;

    /// Undo every transfer made since `checkpoint`.
    fn rollback(&mut self, checkpoint: Self::Checkpoint);

    /// Make every transfer so far permanent.
    fn commit(&mut self);
}

/// Previous value of one custodian slot.
#[derive(Debug, Clone)]
enum CustodyUndo {
    Balance {
        key: (Address, Address),
        previous: Option<U256>,
    },
    Allowance {
        key: (Address, Address),
        previous: Option<U256>,
    },
}

// ============================================================================
// InMemoryCustodian
// ============================================================================

/// In-memory custodian with balances, allowances to the engine, and a few
/// of the non-uniform token behaviours seen in the wild.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustodian {
    engine: Address,
    balances: HashMap<(Address, Address), U256>,
    /// (token, owner) -> amount the engine may pull
    allowances: HashMap<(Address, Address), U256>,
    /// Tokens that reject every transfer.
    frozen: HashSet<Address>,
    /// Tokens that burn a share of every transfer, in ppm.
    transfer_fees: HashMap<Address, u32>,
    journal: Journal<CustodyUndo>,
}

impl InMemoryCustodian {
    pub fn new(engine: Address) -> Self {
        Self {
            engine,
            ..Default::default()
        }
    }

    /// Credit `amount` of `token` to `holder` out of thin air.
    pub fn mint(&mut self, token: Address, holder: Address, amount: U256) {
        let balance = self.balance_of(token, holder).saturating_add(amount);
        self.set_balance((token, holder), balance);
    }

    /// Allow the engine to pull up to `amount` of `token` from `owner`.
    pub fn approve(&mut self, token: Address, owner: Address, amount: U256) {
        let key = (token, owner);
        let previous = self.allowances.insert(key, amount);
        self.journal.record(CustodyUndo::Allowance { key, previous });
    }

    pub fn allowance(&self, token: Address, owner: Address) -> U256 {
        self.allowances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    /// Mint and approve in one step.
    pub fn fund(&mut self, token: Address, holder: Address, amount: U256) {
        self.mint(token, holder, amount);
        let allowance = self.allowance(token, holder).saturating_add(amount);
        self.approve(token, holder, allowance);
    }

    pub fn freeze(&mut self, token: Address) {
        self.frozen.insert(token);
    }

    pub fn set_transfer_fee(&mut self, token: Address, fee_ppm: u32) {
        self.transfer_fees.insert(token, fee_ppm);
    }

    fn set_balance(&mut self, key: (Address, Address), balance: U256) {
        let previous = self.balances.insert(key, balance);
        self.journal.record(CustodyUndo::Balance { key, previous });
    }

    fn move_balance(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CustodianError> {
        if self.frozen.contains(&token) {
            return Err(CustodianError::Rejected(format!("token {token} is frozen")));
        }
        let balance = self.balance_of(token, from);
        if balance < amount {
            return Err(CustodianError::InsufficientFunds {
                balance,
                requested: amount,
            });
        }
        let burned = match self.transfer_fees.get(&token) {
            Some(ppm) => amount * U256::from(*ppm) / U256::from(1_000_000u32),
            None => U256::ZERO,
        };

        self.set_balance((token, from), balance - amount);
        self.mint(token, to, amount - burned);
        Ok(())
    }
}

impl Custodian for InMemoryCustodian {
    type Checkpoint = usize;

    fn engine(&self) -> Address {
        self.engine
    }

    fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    fn try_transfer_in(
        &mut self,
        token: Address,
        from: Address,
        amount: U256,
    ) -> Result<(), CustodianError> {
        let allowance = self.allowance(token, from);
        if allowance < amount {
            return Err(CustodianError::InsufficientAllowance {
                allowance,
                requested: amount,
            });
        }
        let engine = self.engine;
        self.move_balance(token, from, engine, amount)?;
        self.approve(token, from, allowance - amount);
        Ok(())
    }

    fn transfer_out(
        &mut self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CustodianError> {
        let engine = self.engine;
        self.move_balance(token, engine, to, amount)
    }

    fn checkpoint(&self) -> usize {
        self.journal.mark()
    }

    fn rollback(&mut self, checkpoint: usize) {
        for undo in self.journal.unwind(checkpoint) {
            let (map, key, previous) = match undo {
                CustodyUndo::Balance { key, previous } => (&mut self.balances, key, previous),
                CustodyUndo::Allowance { key, previous } => (&mut self.allowances, key, previous),
            };
            match previous {
                Some(value) => map.insert(key, value),
                None => map.remove(&key),
            };
        }
    }

    fn commit(&mut self) {
        self.journal.clear();
    }
}
