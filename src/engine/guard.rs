//! Reentrancy guard.
//!
//! While a flash swap callback runs, the engine is in the middle of a
//! settlement: token A has left the pool but token B has not arrived yet.
//! Only nested flash swaps (which settle completely before returning) and
//! read-only queries are allowed in that window. Every other mutating entry
//! point checks [`ReentrancyGuard::ensure_idle`] first.
//!
//! The guard is part of every engine checkpoint. A rollback, including the
//! one after a panicking callback, puts it back to where the failed
//! operation found it.

use crate::error::{Result, SettlementError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    #[default]
    Idle,
    /// Inside `depth` nested flash swap callbacks.
    InCallback(u32),
}

#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    state: GuardState,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> GuardState {
        self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == GuardState::Idle
    }

    pub fn depth(&self) -> u32 {
        match self.state {
            GuardState::Idle => 0,
            GuardState::InCallback(depth) => depth,
        }
    }

    /// Reject the call unless no callback is running.
    pub fn ensure_idle(&self) -> Result<()> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(SettlementError::ReentrantCall)
        }
    }

    pub fn enter(&mut self) {
        self.state = GuardState::InCallback(self.depth() + 1);
    }

    pub fn exit(&mut self) {
        self.state = match self.depth() {
            0 | 1 => GuardState::Idle,
            depth => GuardState::InCallback(depth - 1),
        };
    }

    pub fn restore(&mut self, state: GuardState) {
        self.state = state;
    }
}
