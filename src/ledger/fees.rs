//! Protocol fee schedule.
//!
//! A fee rule is a rate in parts per million plus the location credited with
//! the fee. Lookups prefer an exact `(token_a, token_b)` override and fall
//! back to the default rule.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::Deserialize;

use crate::error::{Result, SettlementError};
use crate::journal::Journal;
use crate::types::Location;

/// Fee rates are expressed in parts per million.
pub const PPM_DENOMINATOR: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FeeRule {
    pub fee_ppm: u32,
    pub receiver: Location,
}

impl FeeRule {
    pub fn new(fee_ppm: u32, receiver: Location) -> Result<Self> {
        if fee_ppm > PPM_DENOMINATOR {
            return Err(SettlementError::FeeTooHigh(fee_ppm));
        }
        Ok(Self { fee_ppm, receiver })
    }

    /// Split a gross payment into `(fee, net)`, rounding the fee down.
    ///
    /// Fails with `ArithmeticOverflow` when `gross * fee_ppm` does not fit in
    /// 256 bits.
    ///
    /// ```
    /// use alloy_primitives::U256;
    /// use grid_settlement::ledger::FeeRule;
    /// use grid_settlement::types::Location;
    ///
    /// let rule = FeeRule::new(2_000, Location::InternalWallet(Default::default())).unwrap();
    /// let (fee, net) = rule.split(U256::from(1_999u64)).unwrap();
    /// assert_eq!(fee, U256::from(3u64)); // floor(3.998)
    /// assert_eq!(net, U256::from(1_996u64));
    /// ```
    pub fn split(&self, gross: U256) -> Result<(U256, U256)> {
        let fee = gross
            .checked_mul(U256::from(self.fee_ppm))
            .ok_or(SettlementError::ArithmeticOverflow)?
            / U256::from(PPM_DENOMINATOR);
        Ok((fee, gross - fee))
    }

    /// Smallest gross payment whose net part is exactly `net`.
    ///
    /// Returns `None` when no gross amount nets to `net` (a 100% fee with a
    /// non-zero `net`).
    pub fn gross_for_net(&self, net: U256) -> Option<U256> {
        if net.is_zero() {
            return Some(U256::ZERO);
        }
        let keep = PPM_DENOMINATOR - self.fee_ppm;
        if keep == 0 {
            return None;
        }

        // net(g) = g - floor(g * f / 1e6) = ceil(g * keep / 1e6), which grows
        // in steps of at most 1. The smallest g reaching `net` is therefore
        // floor((net - 1) * 1e6 / keep) + 1.
        let scaled = (net - U256::from(1u8)).checked_mul(U256::from(PPM_DENOMINATOR))?;
        let gross = scaled / U256::from(keep) + U256::from(1u8);
        let (_, exact) = self.split(gross).ok()?;
        (exact == net).then_some(gross)
    }
}

#[derive(Debug, Clone)]
enum FeeUndo {
    Default(FeeRule),
    Pair {
        pair: (Address, Address),
        previous: Option<FeeRule>,
    },
}

/// Default rule plus per-pair overrides.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    default: FeeRule,
    pairs: BTreeMap<(Address, Address), FeeRule>,
    journal: Journal<FeeUndo>,
}

impl FeeSchedule {
    pub fn new(default: FeeRule) -> Self {
        Self {
            default,
            pairs: BTreeMap::new(),
            journal: Journal::new(),
        }
    }

    pub fn lookup(&self, token_a: Address, token_b: Address) -> FeeRule {
        self.pairs
            .get(&(token_a, token_b))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_rule(&self) -> FeeRule {
        self.default
    }

    pub fn set_default(&mut self, rule: FeeRule) {
        let previous = std::mem::replace(&mut self.default, rule);
        self.journal.record(FeeUndo::Default(previous));
    }

    pub fn set_pair(&mut self, token_a: Address, token_b: Address, rule: FeeRule) {
        let pair = (token_a, token_b);
        let previous = self.pairs.insert(pair, rule);
        self.journal.record(FeeUndo::Pair { pair, previous });
    }

    pub fn remove_pair(&mut self, token_a: Address, token_b: Address) -> Option<FeeRule> {
        let pair = (token_a, token_b);
        let previous = self.pairs.remove(&pair);
        self.journal.record(FeeUndo::Pair { pair, previous });
        previous
    }

    pub fn checkpoint(&self) -> usize {
        self.journal.mark()
    }

    pub fn rollback(&mut self, checkpoint: usize) {
        for undo in self.journal.unwind(checkpoint) {
            match undo {
                FeeUndo::Default(rule) => self.default = rule,
                FeeUndo::Pair { pair, previous } => {
                    match previous {
                        Some(rule) => self.pairs.insert(pair, rule),
                        None => self.pairs.remove(&pair),
                    };
                }
            }
        }
    }

    pub fn commit(&mut self) {
        self.journal.clear();
    }

    /// Overrides in deterministic order.
    pub fn overrides(&self) -> impl Iterator<Item = (&(Address, Address), &FeeRule)> {
        self.pairs.iter()
    }
}
