//! Flash swaps: receive token A first, pay token B after a callback.
//!
//! ## Ordering
//!
//! A flash swap validates exactly like a market order, then:
//!
//! 1. moves `amount_a` from the pool to the taker's destination
//! 2. engages the reentrancy guard and calls the callee, if any
//! 3. releases the guard and collects `amount_b` from the taker's source
//!
//! The callee may use the tokens it just received to source the payment,
//! for example by trading them in another pool. The payment obligation is
//! enforced the same way whatever the callee does; if it cannot be met, the
//! whole swap, including every nested swap the callee made, is rolled back.
//!
//! ## Re-entry
//!
//! The callee only ever sees a [`FlashSwapContext`], which offers nested
//! flash swaps and read-only access to the engine. Calling any other
//! mutating entry point while a callback is running fails with
//! `ReentrantCall`.

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use crate::engine::{Engine, MarketOrder};
use crate::error::Result;
use crate::ledger::Custodian;
use crate::types::{Fill, Location, PoolId};

/// What the callee is told about the swap it is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSwapInfo {
    pub pool_id: PoolId,
    pub token_a: Address,
    pub token_b: Address,
    /// Already delivered to `destination`.
    pub amount_a: U256,
    /// Owed once the callback returns.
    pub amount_b: U256,
    pub destination: Location,
    /// Number of flash swaps in progress, this one included.
    pub depth: u32,
}

/// Strategy invoked between delivery of token A and collection of token B.
pub trait FlashSwapCallee<C: Custodian> {
    fn on_flash_swap(
        &mut self,
        ctx: &mut FlashSwapContext<'_, C>,
        swap: &FlashSwapInfo,
        data: &[u8],
    ) -> Result<()>;
}

/// The engine surface available to a running callback.
///
/// Holds the reentrancy guard for as long as it lives; dropping it, on
/// return or while unwinding, releases one level.
pub struct FlashSwapContext<'a, C> {
    engine: &'a mut Engine<C>,
    caller: Address,
}

impl<'a, C> FlashSwapContext<'a, C> {
    fn enter(engine: &'a mut Engine<C>, caller: Address) -> Self {
        engine.guard.enter();
        Self { engine, caller }
    }
}

impl<C> Drop for FlashSwapContext<'_, C> {
    fn drop(&mut self) {
        self.engine.guard.exit();
    }
}

impl<C: Custodian> FlashSwapContext<'_, C> {
    /// The account that started the outermost flash swap.
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Read-only access to the engine.
    pub fn engine(&self) -> &Engine<C> {
        self.engine
    }

    pub fn depth(&self) -> u32 {
        self.engine.guard.depth()
    }

    /// Start a nested flash swap on behalf of the same caller.
    ///
    /// Settles completely before returning; a failure rolls back only the
    /// nested swap, and the callee may still decide how to proceed.
    pub fn execute_flash_swap(
        &mut self,
        order: MarketOrder,
        callee: Option<&mut dyn FlashSwapCallee<C>>,
        data: &[u8],
    ) -> Result<Fill> {
        let caller = self.caller;
        self.engine.atomically("nested_flash_swap", |engine| {
            engine.do_execute_flash_swap(caller, &order, callee, data)
        })
    }
}

impl<C: Custodian> Engine<C> {
    /// Execute `order` as a flash swap, calling `callee` (if any) after
    /// token A is delivered and before token B is collected.
    pub fn execute_flash_swap(
        &mut self,
        caller: Address,
        order: MarketOrder,
        callee: Option<&mut dyn FlashSwapCallee<C>>,
        data: &[u8],
    ) -> Result<Fill> {
        self.guard.ensure_idle()?;
        self.atomically("execute_flash_swap", |engine| {
            engine.do_execute_flash_swap(caller, &order, callee, data)
        })
    }

    pub(crate) fn do_execute_flash_swap(
        &mut self,
        caller: Address,
        order: &MarketOrder,
        callee: Option<&mut dyn FlashSwapCallee<C>>,
        data: &[u8],
    ) -> Result<Fill> {
        let trade = self.prepare_trade(caller, order)?;
        self.release_token_a(&trade)?;

        if let Some(callee) = callee {
            let mut ctx = FlashSwapContext::enter(self, caller);
            let info = FlashSwapInfo {
                pool_id: trade.pool_id,
                token_a: trade.request.token_a,
                token_b: trade.request.token_b,
                amount_a: trade.amount_a,
                amount_b: trade.amount_b_gross,
                destination: trade.destination,
                depth: ctx.depth(),
            };
            debug!(pool = %info.pool_id, depth = info.depth, "entering flash swap callback");

            let outcome = callee.on_flash_swap(&mut ctx, &info, data);
            drop(ctx);
            outcome?;
        }

        self.collect_token_b(&trade)?;

        let fill = trade.fill();
        info!(
            pool = %fill.pool_id,
            %caller,
            amount_a = %fill.amount_a,
            amount_b_gross = %fill.amount_b_gross,
            amount_b_net = %fill.amount_b_net,
            fee = %fill.fee,
            "flash swap settled"
        );
        Ok(fill)
    }
}
