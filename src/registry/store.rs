//! Arena storage for pools.
//!
//! ## Memory Model
//!
//! Per slab docs (https://docs.rs/slab/0.4.11):
//! - Keys are `usize` values returned by `slab.insert()`
//! - Keys are only reused after `slab.remove()`
//!
//! Pools are never removed, so slab keys are handed out sequentially and a
//! pool's sequence number is simply `key + 1`. Ids stay permanent.
//!
//! The one exception is rollback: inserts are undone newest first, which
//! leaves the slab's free list in ascending key order, so the next insert
//! reuses the lowest rolled-back key and sequences stay gap-free.

use slab::Slab;

use crate::error::{Result, SettlementError};
use crate::journal::Journal;
use crate::registry::Pool;
use crate::types::{PoolId, PoolKind};

/// Upper bound on slots allocated up front.
const PREALLOCATED_POOLS: usize = 1_024;

#[derive(Debug, Clone)]
struct StoredPool {
    id: PoolId,
    pool: Pool,
}

#[derive(Debug, Clone)]
enum PoolUndo {
    Inserted(usize),
    /// The pool as it was before its first mutable borrow.
    Replaced { key: usize, previous: Pool },
}

#[derive(Debug, Clone)]
pub struct PoolStore {
    pools: Slab<StoredPool>,
    max_pools: usize,
    journal: Journal<PoolUndo>,
}

impl PoolStore {
    pub fn with_capacity(max_pools: usize) -> Self {
        Self {
            pools: Slab::with_capacity(max_pools.min(PREALLOCATED_POOLS)),
            max_pools,
            journal: Journal::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// The id the next inserted pool of `kind` will receive.
    pub fn next_id(&self, kind: PoolKind) -> Result<PoolId> {
        if self.pools.len() >= self.max_pools {
            return Err(SettlementError::MaxPoolCountExceeded(self.max_pools));
        }
        let sequence = self.pools.vacant_key() as u64 + 1;
        PoolId::new(sequence, kind).ok_or(SettlementError::MaxPoolCountExceeded(self.max_pools))
    }

    /// Store `pool` under the next sequence number.
    pub fn insert(&mut self, pool: Pool) -> Result<PoolId> {
        let id = self.next_id(pool.kind())?;
        let key = self.pools.insert(StoredPool { id, pool });
        self.journal.record(PoolUndo::Inserted(key));
        Ok(id)
    }

    fn key(id: PoolId) -> Option<usize> {
        id.sequence()
            .checked_sub(1)
            .and_then(|key| usize::try_from(key).ok())
    }

    pub fn get(&self, id: PoolId) -> Result<&Pool> {
        Self::key(id)
            .and_then(|key| self.pools.get(key))
            .filter(|stored| stored.id == id)
            .map(|stored| &stored.pool)
            .ok_or(SettlementError::PoolDoesNotExist(id))
    }

    /// Mutable access; the pool's current contents are journaled first.
    pub fn get_mut(&mut self, id: PoolId) -> Result<&mut Pool> {
        let key = Self::key(id)
            .filter(|key| self.pools.get(*key).is_some_and(|stored| stored.id == id))
            .ok_or(SettlementError::PoolDoesNotExist(id))?;
        let stored = &mut self.pools[key];
        self.journal.record(PoolUndo::Replaced {
            key,
            previous: stored.pool.clone(),
        });
        Ok(&mut stored.pool)
    }

    pub fn checkpoint(&self) -> usize {
        self.journal.mark()
    }

    /// Undo every insert and mutation since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: usize) {
        for undo in self.journal.unwind(checkpoint) {
            match undo {
                PoolUndo::Inserted(key) => {
                    self.pools.remove(key);
                }
                PoolUndo::Replaced { key, previous } => {
                    if let Some(stored) = self.pools.get_mut(key) {
                        stored.pool = previous;
                    }
                }
            }
        }
    }

    pub fn commit(&mut self) {
        self.journal.clear();
    }

    #[inline]
    pub fn contains(&self, id: PoolId) -> bool {
        self.get(id).is_ok()
    }

    /// Pools in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &Pool)> {
        self.pools.iter().map(|(_, stored)| (stored.id, &stored.pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{GridPool, LimitPool};
    use crate::types::{ExchangeRate, Location, PoolKind, TradeRequest};
    use alloy_primitives::{address, Address};

    const A: Address = address!("000000000000000000000000000000000000000a");
    const B: Address = address!("000000000000000000000000000000000000000b");

    fn limit() -> Pool {
        Pool::Limit(LimitPool {
            request: TradeRequest {
                token_a: A,
                token_b: B,
                exchange_rate: ExchangeRate::new(1, 1),
                destination: Location::InternalWallet(A),
            },
        })
    }

    #[test]
    fn test_ids_are_sequential_and_tagged() {
        let mut store = PoolStore::with_capacity(10);
        let first = store.insert(limit()).unwrap();
        let second = store.insert(Pool::Grid(GridPool::new(20))).unwrap();

        assert_eq!(first, PoolId::new(1, PoolKind::Limit).unwrap());
        assert_eq!(second, PoolId::new(2, PoolKind::Grid).unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_lookup_checks_kind() {
        let mut store = PoolStore::with_capacity(10);
        let id = store.insert(limit()).unwrap();
        assert!(store.get(id).is_ok());

        let wrong_kind = PoolId::new(id.sequence(), PoolKind::Grid).unwrap();
        assert_eq!(
            store.get(wrong_kind).unwrap_err(),
            SettlementError::PoolDoesNotExist(wrong_kind)
        );
        let missing = PoolId::new(9, PoolKind::Limit).unwrap();
        assert!(!store.contains(missing));
    }

    #[test]
    fn test_max_pool_count() {
        let mut store = PoolStore::with_capacity(2);
        store.insert(limit()).unwrap();
        store.insert(limit()).unwrap();
        assert_eq!(
            store.insert(limit()),
            Err(SettlementError::MaxPoolCountExceeded(2))
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_rollback_keeps_ids_sequential() {
        let mut store = PoolStore::with_capacity(10);
        let kept = store.insert(limit()).unwrap();
        store.commit();

        let checkpoint = store.checkpoint();
        store.insert(limit()).unwrap();
        store.insert(Pool::Grid(GridPool::new(20))).unwrap();
        if let Pool::Limit(pool) = store.get_mut(kept).unwrap() {
            pool.request.exchange_rate = ExchangeRate::new(7, 3);
        }
        store.rollback(checkpoint);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(kept).unwrap(), &limit());
        let next = store.insert(Pool::Grid(GridPool::new(20))).unwrap();
        assert_eq!(next, PoolId::new(2, PoolKind::Grid).unwrap());
        let after = store.insert(limit()).unwrap();
        assert_eq!(after, PoolId::new(3, PoolKind::Limit).unwrap());
    }

    #[test]
    fn test_iter_in_creation_order() {
        let mut store = PoolStore::with_capacity(10);
        let ids: Vec<_> = (0..5).map(|_| store.insert(limit()).unwrap()).collect();
        let seen: Vec<_> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, seen);
    }
}
