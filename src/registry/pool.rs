//! Limit and grid pool structures.
//!
//! Pools hold trade requests and their token list only; balances live in the
//! ledger under `Location::Pool(id)`. That is what makes grid capacity
//! shared: every request selling token A reads the same ledger entry.

use std::collections::BTreeMap;

use alloy_primitives::Address;

use crate::error::{Result, SettlementError};
use crate::types::{PoolKind, TradeRequest};

/// A single trade request selling `token_a` for `token_b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitPool {
    pub request: TradeRequest,
}

/// An append-only token list plus up to one trade request per ordered pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridPool {
    tokens: Vec<Address>,
    requests: BTreeMap<(Address, Address), TradeRequest>,
}

impl GridPool {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(max_tokens),
            requests: BTreeMap::new(),
        }
    }

    pub fn tokens(&self) -> &[Address] {
        &self.tokens
    }

    #[inline]
    pub fn holds_token(&self, token: Address) -> bool {
        self.tokens.contains(&token)
    }

    /// Append `token` unless already listed.
    ///
    /// Fails with `MaxTokensPerGridOrder` when the list is full.
    pub fn add_token(&mut self, token: Address, max_tokens: usize) -> Result<()> {
        if self.holds_token(token) {
            return Ok(());
        }
        if self.tokens.len() >= max_tokens {
            return Err(SettlementError::MaxTokensPerGridOrder(max_tokens));
        }
        self.tokens.push(token);
        Ok(())
    }

    /// Insert or replace the request for `(token_a, token_b)`, listing both
    /// tokens if they are new.
    pub fn upsert(&mut self, request: TradeRequest, max_tokens: usize) -> Result<()> {
        self.add_token(request.token_a, max_tokens)?;
        self.add_token(request.token_b, max_tokens)?;
        self.requests
            .insert((request.token_a, request.token_b), request);
        Ok(())
    }

    pub fn request(&self, token_a: Address, token_b: Address) -> Option<&TradeRequest> {
        self.requests.get(&(token_a, token_b))
    }

    pub fn requests(&self) -> impl Iterator<Item = &TradeRequest> {
        self.requests.values()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pool {
    Limit(LimitPool),
    Grid(GridPool),
}

impl Pool {
    pub fn kind(&self) -> PoolKind {
        match self {
            Pool::Limit(_) => PoolKind::Limit,
            Pool::Grid(_) => PoolKind::Grid,
        }
    }

    /// Tokens this pool may hold a balance of.
    pub fn tokens(&self) -> Vec<Address> {
        match self {
            Pool::Limit(limit) => vec![limit.request.token_a, limit.request.token_b],
            Pool::Grid(grid) => grid.tokens.clone(),
        }
    }

    pub fn holds_token(&self, token: Address) -> bool {
        match self {
            Pool::Limit(limit) => token == limit.request.token_a || token == limit.request.token_b,
            Pool::Grid(grid) => grid.holds_token(token),
        }
    }

    pub fn trade_request(&self, token_a: Address, token_b: Address) -> Option<&TradeRequest> {
        match self {
            Pool::Limit(limit) => {
                let request = &limit.request;
                (request.token_a == token_a && request.token_b == token_b).then_some(request)
            }
            Pool::Grid(grid) => grid.request(token_a, token_b),
        }
    }

    pub fn trade_requests(&self) -> Vec<TradeRequest> {
        match self {
            Pool::Limit(limit) => vec![limit.request],
            Pool::Grid(grid) => grid.requests().copied().collect(),
        }
    }
}
