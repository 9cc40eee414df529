//! Batch execution.
//!
//! A batch runs calls in order against the live state: each call sees the
//! effects of the calls before it. The first failure aborts the batch and
//! rolls every call back; the error is reported as `BatchCallFailed` with the
//! index of the failing call.
//!
//! A committed batch produces an [`ExecutionReceipt`] carrying the batch
//! sequence number and the state root after the last call.

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::engine::{
    Engine, FlashSwapCallee, LimitOrderParams, MarketOrder, TokenSource, TradeRequestParams,
};
use crate::error::{Result, SettlementError};
use crate::ledger::Custodian;
use crate::types::{ExchangeRate, ExecutionReceipt, Fill, LocationRef, PoolId};

/// One call inside a batch.
pub enum EngineCall<'a, C> {
    CreateLimitOrderPool(LimitOrderParams),
    UpdateLimitOrderPool {
        pool_id: PoolId,
        exchange_rate: ExchangeRate,
        destination: LocationRef,
    },
    CreateGridOrderPool {
        token_sources: Vec<TokenSource>,
        trade_requests: Vec<TradeRequestParams>,
        owner: Address,
    },
    UpdateGridOrderPool {
        pool_id: PoolId,
        token_sources: Vec<TokenSource>,
        trade_requests: Vec<TradeRequestParams>,
    },
    MarketOrder(MarketOrder),
    FlashSwap {
        order: MarketOrder,
        callee: Option<&'a mut dyn FlashSwapCallee<C>>,
        data: Vec<u8>,
    },
    Transfer {
        token: Address,
        amount: U256,
        source: LocationRef,
        destination: LocationRef,
    },
    TransferPoolOwnership {
        pool_id: PoolId,
        to: Address,
    },
    SetOperator {
        operator: Address,
        approved: bool,
    },
}

/// Result of one committed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    PoolCreated(PoolId),
    PoolUpdated(PoolId),
    Filled(Fill),
    Transferred,
    OwnershipTransferred(PoolId),
    OperatorSet,
}

impl CallOutcome {
    pub fn fill(&self) -> Option<&Fill> {
        match self {
            CallOutcome::Filled(fill) => Some(fill),
            _ => None,
        }
    }

    pub fn pool_id(&self) -> Option<PoolId> {
        match self {
            CallOutcome::PoolCreated(id)
            | CallOutcome::PoolUpdated(id)
            | CallOutcome::OwnershipTransferred(id) => Some(*id),
            CallOutcome::Filled(fill) => Some(fill.pool_id),
            CallOutcome::Transferred | CallOutcome::OperatorSet => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub outcomes: Vec<CallOutcome>,
    pub receipt: ExecutionReceipt,
}

impl<C: Custodian> Engine<C> {
    /// Run `calls` in order as one atomic unit.
    pub fn execute_batch(&mut self, caller: Address, calls: Vec<EngineCall<'_, C>>) -> Result<BatchResult> {
        self.guard.ensure_idle()?;
        self.atomically("execute_batch", |engine| {
            let total = calls.len();
            let mut outcomes = Vec::with_capacity(total);

            for (index, call) in calls.into_iter().enumerate() {
                let outcome = engine
                    .dispatch(caller, call)
                    .map_err(|source| SettlementError::BatchCallFailed {
                        index,
                        source: Box::new(source),
                    })?;
                outcomes.push(outcome);
            }

            engine.state.batches += 1;
            let fills = outcomes.iter().filter(|o| o.fill().is_some()).count();
            let receipt = ExecutionReceipt::new(
                engine.state.batches,
                total as u64,
                fills as u64,
                engine.state_root(),
            );

            info!(
                batch = receipt.batch_id,
                calls = receipt.calls_processed,
                fills = receipt.fills_executed,
                state_root = %receipt.state_root_hex(),
                "batch committed"
            );
            Ok(BatchResult { outcomes, receipt })
        })
    }

    fn dispatch(&mut self, caller: Address, call: EngineCall<'_, C>) -> Result<CallOutcome> {
        match call {
            EngineCall::CreateLimitOrderPool(params) => self
                .do_create_limit_order_pool(caller, params)
                .map(CallOutcome::PoolCreated),
            EngineCall::UpdateLimitOrderPool {
                pool_id,
                exchange_rate,
                destination,
            } => self
                .do_update_limit_order_pool(caller, pool_id, exchange_rate, destination)
                .map(|()| CallOutcome::PoolUpdated(pool_id)),
            EngineCall::CreateGridOrderPool {
                token_sources,
                trade_requests,
                owner,
            } => self
                .do_create_grid_order_pool(caller, &token_sources, &trade_requests, owner)
                .map(CallOutcome::PoolCreated),
            EngineCall::UpdateGridOrderPool {
                pool_id,
                token_sources,
                trade_requests,
            } => self
                .do_update_grid_order_pool(caller, pool_id, &token_sources, &trade_requests)
                .map(|()| CallOutcome::PoolUpdated(pool_id)),
            EngineCall::MarketOrder(order) => self
                .do_execute_market_order(caller, &order)
                .map(CallOutcome::Filled),
            EngineCall::FlashSwap {
                order,
                callee,
                data,
            } => self
                .do_execute_flash_swap(caller, &order, callee, &data)
                .map(CallOutcome::Filled),
            EngineCall::Transfer {
                token,
                amount,
                source,
                destination,
            } => self
                .do_transfer(caller, token, amount, source, destination)
                .map(|()| CallOutcome::Transferred),
            EngineCall::TransferPoolOwnership { pool_id, to } => self
                .do_transfer_pool_ownership(caller, pool_id, to)
                .map(|()| CallOutcome::OwnershipTransferred(pool_id)),
            EngineCall::SetOperator { operator, approved } => self
                .do_set_operator(caller, operator, approved)
                .map(|()| CallOutcome::OperatorSet),
        }
    }
}
