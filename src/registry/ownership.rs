//! Pool ownership and operator approvals.
//!
//! The engine only consumes three things from here: whether a caller may
//! mutate a pool, and notifications when a pool is created or changes hands.

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::Address;

use crate::error::{Result, SettlementError};
use crate::journal::Journal;
use crate::types::PoolId;

#[derive(Debug, Clone)]
enum OwnershipUndo {
    Owner {
        pool_id: PoolId,
        previous: Option<Address>,
    },
    Operator {
        pair: (Address, Address),
        was_approved: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OwnershipRegistry {
    owners: BTreeMap<PoolId, Address>,
    /// (owner, operator) pairs approved for all of the owner's pools.
    operators: BTreeSet<(Address, Address)>,
    journal: Journal<OwnershipUndo>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_of(&self, pool_id: PoolId) -> Option<Address> {
        self.owners.get(&pool_id).copied()
    }

    pub fn is_owner_or_operator(&self, pool_id: PoolId, caller: Address) -> bool {
        match self.owner_of(pool_id) {
            Some(owner) => owner == caller || self.operators.contains(&(owner, caller)),
            None => false,
        }
    }

    pub fn on_pool_created(&mut self, pool_id: PoolId, owner: Address) {
        self.set_owner(pool_id, owner);
    }

    fn set_owner(&mut self, pool_id: PoolId, owner: Address) {
        let previous = self.owners.insert(pool_id, owner);
        self.journal.record(OwnershipUndo::Owner { pool_id, previous });
    }

    /// Move `pool_id` from `from` to `to`. `from` must be the current owner.
    pub fn on_pool_transferred(&mut self, pool_id: PoolId, from: Address, to: Address) -> Result<()> {
        if to.is_zero() {
            return Err(SettlementError::AddressZero);
        }
        match self.owner_of(pool_id) {
            Some(owner) if owner == from => {
                self.set_owner(pool_id, to);
                Ok(())
            }
            Some(_) => Err(SettlementError::NotPoolOwner {
                pool_id,
                caller: from,
            }),
            None => Err(SettlementError::PoolDoesNotExist(pool_id)),
        }
    }

    pub fn set_operator(&mut self, owner: Address, operator: Address, approved: bool) {
        let pair = (owner, operator);
        let was_approved = if approved {
            !self.operators.insert(pair)
        } else {
            self.operators.remove(&pair)
        };
        self.journal.record(OwnershipUndo::Operator { pair, was_approved });
    }

    pub fn is_operator(&self, owner: Address, operator: Address) -> bool {
        self.operators.contains(&(owner, operator))
    }

    /// Pools and their owners in id order.
    pub fn owners(&self) -> impl Iterator<Item = (PoolId, Address)> + '_ {
        self.owners.iter().map(|(pool, owner)| (*pool, *owner))
    }

    /// Approved (owner, operator) pairs in order.
    pub fn operators(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.operators.iter().copied()
    }

    pub fn checkpoint(&self) -> usize {
        self.journal.mark()
    }

    pub fn rollback(&mut self, checkpoint: usize) {
        for undo in self.journal.unwind(checkpoint) {
            match undo {
                OwnershipUndo::Owner { pool_id, previous } => {
                    match previous {
                        Some(owner) => self.owners.insert(pool_id, owner),
                        None => self.owners.remove(&pool_id),
                    };
                }
                OwnershipUndo::Operator { pair, was_approved } => {
                    if was_approved {
                        self.operators.insert(pair);
                    } else {
                        self.operators.remove(&pair);
                    }
                }
            }
        }
    }

    pub fn commit(&mut self) {
        self.journal.clear();
    }
}
