//! Market orders against a pool's trade request.
//!
//! ## Algorithm
//!
//! 1. Resolve the active request selling `token_a` for `token_b`
//! 2. Reject trades whose source or destination is the pool itself
//! 3. Check `amount_a` against the pool's `token_a` balance (capacity)
//! 4. Split the taker's payment into `fee = floor(amount_b * ppm / 1e6)` and
//!    `net = amount_b - fee`
//! 5. Require `net == ceil(amount_a * x2 / x1)` exactly; there is no
//!    slippage in either direction
//! 6. Move `amount_a` from the pool to the taker's destination (a grid pool
//!    the taker runs lists `token_a` on arrival), collect
//!    `amount_b` from the taker's source, pay `net` to the request's payout
//!    location and `fee` to the fee receiver
//!
//! ## Example
//!
//! ```
//! use alloy_primitives::{address, U256};
//! use grid_settlement::config::EngineConfig;
//! use grid_settlement::engine::{Engine, LimitOrderParams, MarketOrder};
//! use grid_settlement::ledger::InMemoryCustodian;
//! use grid_settlement::types::{ExchangeRate, Location, LocationRef};
//!
//! let engine_addr = address!("00000000000000000000000000000000000000ee");
//! let maker = address!("00000000000000000000000000000000000000a1");
//! let taker = address!("00000000000000000000000000000000000000b0");
//! let x = address!("0000000000000000000000000000000000000011");
//! let y = address!("0000000000000000000000000000000000000022");
//!
//! let mut custodian = InMemoryCustodian::new(engine_addr);
//! custodian.fund(x, maker, U256::from(1_000u64));
//! custodian.fund(y, taker, U256::from(1_000u64));
//! let config = EngineConfig::new(engine_addr, address!("00000000000000000000000000000000000000ad"));
//! let mut engine = Engine::new(config, custodian).unwrap();
//!
//! // Sell X for Y at 2 Y per X.
//! let pool = engine
//!     .create_limit_order_pool(maker, LimitOrderParams {
//!         token_a: x,
//!         token_b: y,
//!         amount_a: U256::from(1_000u64),
//!         exchange_rate: ExchangeRate::new(1, 2),
//!         source: LocationRef::SenderWallet,
//!         destination: LocationRef::SenderWallet,
//!         owner: maker,
//!     })
//!     .unwrap();
//!
//! let fill = engine
//!     .execute_market_order(taker, MarketOrder {
//!         pool_id: pool,
//!         token_a: x,
//!         token_b: y,
//!         amount_a: U256::from(100u64),
//!         amount_b: U256::from(200u64),
//!         source: LocationRef::SenderWallet,
//!         destination: Location::ExternalWallet(taker).into(),
//!     })
//!     .unwrap();
//!
//! assert_eq!(fill.amount_b_net, U256::from(200u64));
//! assert_eq!(
//!     engine.trade_request(pool, x, y).unwrap().capacity,
//!     U256::from(900u64)
//! );
//! ```

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::engine::Engine;
use crate::error::{Result, SettlementError};
use crate::ledger::{Custodian, FeeRule, Source};
use crate::types::{Fill, Location, LocationRef, PoolId, TradeRequest};

/// A taker's order against one trade request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketOrder {
    pub pool_id: PoolId,
    /// Token the taker receives.
    pub token_a: Address,
    /// Token the taker pays.
    pub token_b: Address,
    pub amount_a: U256,
    /// Gross payment including the fee.
    pub amount_b: U256,
    pub source: LocationRef,
    pub destination: LocationRef,
}

/// Exact amounts that pass the agreement check for a given `amount_a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_a: U256,
    pub amount_b_gross: U256,
    pub amount_b_net: U256,
    pub fee: U256,
    pub fee_rule: FeeRule,
}

/// A validated trade, ready to move funds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PreparedTrade {
    pub(crate) caller: Address,
    pub(crate) pool_id: PoolId,
    pub(crate) request: TradeRequest,
    pub(crate) fee_rule: FeeRule,
    pub(crate) source: Source,
    pub(crate) destination: Location,
    pub(crate) amount_a: U256,
    pub(crate) amount_b_gross: U256,
    pub(crate) amount_b_net: U256,
    pub(crate) fee: U256,
}

impl PreparedTrade {
    pub(crate) fn fill(&self) -> Fill {
        Fill {
            pool_id: self.pool_id,
            token_a: self.request.token_a,
            token_b: self.request.token_b,
            amount_a: self.amount_a,
            amount_b_gross: self.amount_b_gross,
            amount_b_net: self.amount_b_net,
            fee: self.fee,
        }
    }
}

impl<C: Custodian> Engine<C> {
    // ========================================================================
    // Entry points
    // ========================================================================

    pub fn execute_market_order(&mut self, caller: Address, order: MarketOrder) -> Result<Fill> {
        self.guard.ensure_idle()?;
        self.atomically("execute_market_order", |engine| {
            engine.do_execute_market_order(caller, &order)
        })
    }

    /// Market order paid from the caller's wallets, with `token_a` sent to
    /// the caller's external wallet.
    pub fn execute_market_order_to_external(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        token_a: Address,
        token_b: Address,
        amount_a: U256,
        amount_b: U256,
    ) -> Result<Fill> {
        self.execute_market_order(
            caller,
            MarketOrder {
                pool_id,
                token_a,
                token_b,
                amount_a,
                amount_b,
                source: LocationRef::SenderWallet,
                destination: Location::ExternalWallet(caller).into(),
            },
        )
    }

    /// Market order paid from the caller's wallets, with `token_a` kept in
    /// the caller's internal wallet.
    pub fn execute_market_order_to_internal(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        token_a: Address,
        token_b: Address,
        amount_a: U256,
        amount_b: U256,
    ) -> Result<Fill> {
        self.execute_market_order(
            caller,
            MarketOrder {
                pool_id,
                token_a,
                token_b,
                amount_a,
                amount_b,
                source: LocationRef::SenderWallet,
                destination: LocationRef::SenderWallet,
            },
        )
    }

    pub(crate) fn do_execute_market_order(
        &mut self,
        caller: Address,
        order: &MarketOrder,
    ) -> Result<Fill> {
        let trade = self.prepare_trade(caller, order)?;
        self.release_token_a(&trade)?;
        self.collect_token_b(&trade)?;

        let fill = trade.fill();
        info!(
            pool = %fill.pool_id,
            %caller,
            amount_a = %fill.amount_a,
            amount_b_gross = %fill.amount_b_gross,
            amount_b_net = %fill.amount_b_net,
            fee = %fill.fee,
            "market order filled"
        );
        Ok(fill)
    }

    // ========================================================================
    // Quotes
    // ========================================================================

    /// Exact payment for buying `amount_a` from a request, using the
    /// smallest gross amount whose net part passes the agreement check.
    pub fn quote_market_order(
        &self,
        pool_id: PoolId,
        token_a: Address,
        token_b: Address,
        amount_a: U256,
    ) -> Result<Quote> {
        let request = self.active_request(pool_id, token_a, token_b)?;
        self.check_capacity(pool_id, token_a, amount_a)?;

        let fee_rule = self.state.fees.lookup(token_a, token_b);
        let amount_b_net = request
            .exchange_rate
            .a_to_b(amount_a)
            .ok_or(SettlementError::ArithmeticOverflow)?;
        let amount_b_gross = fee_rule
            .gross_for_net(amount_b_net)
            .ok_or(SettlementError::FeeTooHigh(fee_rule.fee_ppm))?;

        Ok(Quote {
            amount_a,
            amount_b_gross,
            amount_b_net,
            fee: amount_b_gross - amount_b_net,
            fee_rule,
        })
    }

    /// Quote for spending about `amount_b_gross` of `token_b`.
    ///
    /// The returned quote buys the most `token_a` the payment covers; its
    /// gross amount may be slightly below `amount_b_gross`.
    pub fn quote_for_payment(
        &self,
        pool_id: PoolId,
        token_a: Address,
        token_b: Address,
        amount_b_gross: U256,
    ) -> Result<Quote> {
        let request = self.active_request(pool_id, token_a, token_b)?;
        let (_, net) = self.state.fees.lookup(token_a, token_b).split(amount_b_gross)?;
        let amount_a = request
            .exchange_rate
            .b_to_a(net)
            .ok_or(SettlementError::ArithmeticOverflow)?;
        if amount_a.is_zero() {
            return Err(SettlementError::ZeroAmount);
        }
        self.quote_market_order(pool_id, token_a, token_b, amount_a)
    }

    // ========================================================================
    // Shared with flash swaps
    // ========================================================================

    fn active_request(
        &self,
        pool_id: PoolId,
        token_a: Address,
        token_b: Address,
    ) -> Result<TradeRequest> {
        self.state
            .pools
            .get(pool_id)?
            .trade_request(token_a, token_b)
            .filter(|request| request.is_active())
            .copied()
            .ok_or(SettlementError::PoolCannotTradeTheseTokens {
                pool_id,
                token_a,
                token_b,
            })
    }

    fn check_capacity(&self, pool_id: PoolId, token_a: Address, amount_a: U256) -> Result<()> {
        let capacity = self
            .state
            .ledger
            .balance_of(token_a, Location::Pool(pool_id));
        if amount_a > capacity {
            return Err(SettlementError::InsufficientCapacity {
                requested: amount_a,
                available: capacity,
            });
        }
        Ok(())
    }

    /// Validate an order without moving any funds.
    pub(crate) fn prepare_trade(&self, caller: Address, order: &MarketOrder) -> Result<PreparedTrade> {
        let request = self.active_request(order.pool_id, order.token_a, order.token_b)?;

        let this_pool = LocationRef::Fixed(Location::Pool(order.pool_id));
        if order.source == this_pool || order.destination == this_pool {
            return Err(SettlementError::PoolCannotTradeAgainstItself(order.pool_id));
        }
        let source = self.resolve_source(caller, order.source)?;
        let destination = self.resolve_destination(caller, order.destination, None)?;

        if order.amount_a.is_zero() {
            return Err(SettlementError::ZeroAmount);
        }
        self.check_capacity(order.pool_id, order.token_a, order.amount_a)?;

        let fee_rule = self.state.fees.lookup(order.token_a, order.token_b);
        let (fee, amount_b_net) = fee_rule.split(order.amount_b)?;
        let expected = request
            .exchange_rate
            .a_to_b(order.amount_a)
            .ok_or(SettlementError::ArithmeticOverflow)?;
        if amount_b_net != expected {
            return Err(SettlementError::ExchangeRateDisagreement {
                expected,
                actual: amount_b_net,
            });
        }

        Ok(PreparedTrade {
            caller,
            pool_id: order.pool_id,
            request,
            fee_rule,
            source,
            destination,
            amount_a: order.amount_a,
            amount_b_gross: order.amount_b,
            amount_b_net,
            fee,
        })
    }

    /// Move `amount_a` out of the pool to the taker.
    ///
    /// A grid pool destination run by the taker lists `token_a` if needed.
    pub(crate) fn release_token_a(&mut self, trade: &PreparedTrade) -> Result<()> {
        let token = trade.request.token_a;
        self.admit_token(trade.caller, token, trade.destination)?;
        self.state
            .ledger
            .debit(token, Location::Pool(trade.pool_id), trade.amount_a)?;
        self.deliver(token, trade.destination, trade.amount_a)
    }

    /// Collect the taker's payment and pay out the net amount and the fee.
    pub(crate) fn collect_token_b(&mut self, trade: &PreparedTrade) -> Result<()> {
        let token = trade.request.token_b;
        self.state
            .ledger
            .collect(token, trade.source, trade.amount_b_gross)?;
        self.deliver(token, trade.request.destination, trade.amount_b_net)?;
        self.deliver(token, trade.fee_rule.receiver, trade.fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{LimitOrderParams, TokenSource, TradeRequestParams};
    use crate::ledger::InMemoryCustodian;
    use crate::types::ExchangeRate;
    use alloy_primitives::address;

    const ENGINE: Address = address!("00000000000000000000000000000000000000ee");
    const ADMIN: Address = address!("00000000000000000000000000000000000000ad");
    const FEES: Address = address!("00000000000000000000000000000000000000fe");
    const MAKER: Address = address!("00000000000000000000000000000000000000a1");
    const TAKER: Address = address!("00000000000000000000000000000000000000b0");
    const TOKEN_X: Address = address!("0000000000000000000000000000000000000011");
    const TOKEN_Y: Address = address!("0000000000000000000000000000000000000022");
    const TOKEN_Z: Address = address!("0000000000000000000000000000000000000033");

    fn setup(fee_ppm: u32) -> (Engine<InMemoryCustodian>, PoolId) {
        let mut custodian = InMemoryCustodian::new(ENGINE);
        custodian.fund(TOKEN_X, MAKER, U256::from(10_000u64));
        custodian.fund(TOKEN_Y, TAKER, U256::from(10_000u64));
        let config = EngineConfig::new(ENGINE, ADMIN)
            .with_default_fee(fee_ppm, Location::InternalWallet(FEES));
        let mut engine = Engine::new(config, custodian).unwrap();

        // 3 X per 2 Y.
        let pool = engine
            .create_limit_order_pool(
                MAKER,
                LimitOrderParams {
                    token_a: TOKEN_X,
                    token_b: TOKEN_Y,
                    amount_a: U256::from(1_000u64),
                    exchange_rate: ExchangeRate::new(3, 2),
                    source: LocationRef::SenderWallet,
                    destination: LocationRef::SenderWallet,
                    owner: MAKER,
                },
            )
            .unwrap();
        (engine, pool)
    }

    fn order(pool_id: PoolId, amount_a: u64, amount_b: u64) -> MarketOrder {
        MarketOrder {
            pool_id,
            token_a: TOKEN_X,
            token_b: TOKEN_Y,
            amount_a: U256::from(amount_a),
            amount_b: U256::from(amount_b),
            source: LocationRef::SenderWallet,
            destination: LocationRef::SenderWallet,
        }
    }

    #[test]
    fn test_fill_moves_every_leg() {
        let (mut engine, pool) = setup(0);
        let fill = engine.execute_market_order(TAKER, order(pool, 300, 200)).unwrap();

        assert_eq!(fill.amount_a, U256::from(300));
        assert_eq!(fill.fee, U256::ZERO);
        assert_eq!(
            engine.balance_of(TOKEN_X, Location::InternalWallet(TAKER)),
            U256::from(300)
        );
        assert_eq!(
            engine.balance_of(TOKEN_Y, Location::InternalWallet(MAKER)),
            U256::from(200)
        );
        assert_eq!(
            engine.trade_request(pool, TOKEN_X, TOKEN_Y).unwrap().capacity,
            U256::from(700)
        );
        assert!(engine.check_conservation().is_ok());
    }

    #[test]
    fn test_ceil_rounding_in_agreement_check() {
        let (mut engine, pool) = setup(0);
        // ceil(100 * 2 / 3) = 67
        assert_eq!(
            engine.execute_market_order(TAKER, order(pool, 100, 66)),
            Err(SettlementError::ExchangeRateDisagreement {
                expected: U256::from(67),
                actual: U256::from(66)
            })
        );
        assert!(engine.execute_market_order(TAKER, order(pool, 100, 67)).is_ok());
    }

    #[test]
    fn test_fee_is_split_off_gross() {
        let (mut engine, pool) = setup(2_000);
        let quote = engine
            .quote_market_order(pool, TOKEN_X, TOKEN_Y, U256::from(900u64))
            .unwrap();
        // floor(601 * 0.002) = 1, so 601 gross nets exactly 600.
        assert_eq!(quote.amount_b_net, U256::from(600));
        assert_eq!(quote.amount_b_gross, U256::from(601));
        assert_eq!(quote.fee, U256::from(1));

        assert!(matches!(
            engine.execute_market_order(TAKER, order(pool, 900, 602)),
            Err(SettlementError::ExchangeRateDisagreement { .. })
        ));
        let fill = engine
            .execute_market_order(TAKER, order(pool, 900, 601))
            .unwrap();
        assert_eq!(fill.fee + fill.amount_b_net, fill.amount_b_gross);
        assert_eq!(
            engine.balance_of(TOKEN_Y, Location::InternalWallet(FEES)),
            U256::from(1)
        );
    }

    #[test]
    fn test_capacity_and_zero_amount() {
        let (mut engine, pool) = setup(0);
        assert_eq!(
            engine.execute_market_order(TAKER, order(pool, 1_003, 669)),
            Err(SettlementError::InsufficientCapacity {
                requested: U256::from(1_003),
                available: U256::from(1_000)
            })
        );
        assert_eq!(
            engine.execute_market_order(TAKER, order(pool, 0, 0)),
            Err(SettlementError::ZeroAmount)
        );
    }

    #[test]
    fn test_reverse_direction_and_inactive_request() {
        let (mut engine, pool) = setup(0);
        let mut reversed = order(pool, 2, 3);
        reversed.token_a = TOKEN_Y;
        reversed.token_b = TOKEN_X;
        assert!(matches!(
            engine.execute_market_order(TAKER, reversed),
            Err(SettlementError::PoolCannotTradeTheseTokens { .. })
        ));

        engine
            .update_limit_order_pool(MAKER, pool, ExchangeRate::ZERO, LocationRef::SenderWallet)
            .unwrap();
        assert!(matches!(
            engine.execute_market_order(TAKER, order(pool, 3, 2)),
            Err(SettlementError::PoolCannotTradeTheseTokens { .. })
        ));
    }

    #[test]
    fn test_self_trade_rejected() {
        let (mut engine, pool) = setup(0);
        let mut to_self = order(pool, 3, 2);
        to_self.destination = Location::Pool(pool).into();
        assert_eq!(
            engine.execute_market_order(MAKER, to_self),
            Err(SettlementError::PoolCannotTradeAgainstItself(pool))
        );

        let mut from_self = order(pool, 3, 2);
        from_self.source = Location::Pool(pool).into();
        assert_eq!(
            engine.execute_market_order(TAKER, from_self),
            Err(SettlementError::PoolCannotTradeAgainstItself(pool))
        );
    }

    #[test]
    fn test_failed_payment_rolls_back_release() {
        let (mut engine, pool) = setup(0);
        engine.custodian_mut().unwrap().freeze(TOKEN_Y);
        let root = engine.state_root();

        assert!(matches!(
            engine.execute_market_order(TAKER, order(pool, 3, 2)),
            Err(SettlementError::TransferFailed { .. })
        ));
        assert_eq!(engine.state_root(), root);
        assert!(engine
            .balance_of(TOKEN_X, Location::InternalWallet(TAKER))
            .is_zero());
    }

    #[test]
    fn test_convenience_variants() {
        let (mut engine, pool) = setup(0);
        engine
            .execute_market_order_to_external(TAKER, pool, TOKEN_X, TOKEN_Y, U256::from(3), U256::from(2))
            .unwrap();
        assert_eq!(
            engine.balance_of(TOKEN_X, Location::ExternalWallet(TAKER)),
            U256::from(3)
        );

        engine
            .execute_market_order_to_internal(TAKER, pool, TOKEN_X, TOKEN_Y, U256::from(3), U256::from(2))
            .unwrap();
        assert_eq!(
            engine.balance_of(TOKEN_X, Location::InternalWallet(TAKER)),
            U256::from(3)
        );
    }

    #[test]
    fn test_quote_for_payment() {
        let (engine, pool) = setup(0);
        let quote = engine
            .quote_for_payment(pool, TOKEN_X, TOKEN_Y, U256::from(10u64))
            .unwrap();
        // floor(10 * 3 / 2) = 15, and ceil(15 * 2 / 3) = 10.
        assert_eq!(quote.amount_a, U256::from(15));
        assert_eq!(quote.amount_b_gross, U256::from(10));
    }

    fn grid_owned_by(engine: &mut Engine<InMemoryCustodian>, owner: Address) -> PoolId {
        engine
            .create_grid_order_pool(
                owner,
                vec![],
                vec![TradeRequestParams::new(TOKEN_Y, TOKEN_Z, ExchangeRate::new(1, 1), LocationRef::ThisPool)],
                owner,
            )
            .unwrap()
    }

    #[test]
    fn test_destination_grid_lists_bought_token() {
        let (mut engine, pool) = setup(0);
        let grid = grid_owned_by(&mut engine, TAKER);
        assert!(!engine.pool(grid).unwrap().balances.iter().any(|(t, _)| *t == TOKEN_X));

        let mut into_grid = order(pool, 3, 2);
        into_grid.destination = Location::Pool(grid).into();
        engine.execute_market_order(TAKER, into_grid).unwrap();

        let snapshot = engine.pool(grid).unwrap();
        assert_eq!(snapshot.balances.last(), Some(&(TOKEN_X, U256::from(3))));
        assert!(engine.check_conservation().is_ok());
    }

    #[test]
    fn test_destination_grid_of_stranger_rejects_unlisted_token() {
        let (mut engine, pool) = setup(0);
        let grid = grid_owned_by(&mut engine, MAKER);
        let root = engine.state_root();

        let mut into_grid = order(pool, 3, 2);
        into_grid.destination = Location::Pool(grid).into();
        assert_eq!(
            engine.execute_market_order(TAKER, into_grid),
            Err(SettlementError::TokenNotInPool { pool_id: grid, token: TOKEN_X })
        );
        assert_eq!(engine.state_root(), root);
    }

    #[test]
    fn test_fee_overflow_is_reported() {
        let (mut engine, pool) = setup(2_000);
        assert_eq!(
            engine.execute_market_order(TAKER, MarketOrder { amount_b: U256::MAX, ..order(pool, 3, 2) }),
            Err(SettlementError::ArithmeticOverflow)
        );
        assert_eq!(
            engine.quote_for_payment(pool, TOKEN_X, TOKEN_Y, U256::MAX),
            Err(SettlementError::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_grid_pays_into_destination_pool() {
        let (mut engine, _) = setup(0);
        let grid = engine
            .create_grid_order_pool(
                MAKER,
                vec![TokenSource::new(TOKEN_X, U256::from(500u64), LocationRef::SenderWallet)],
                vec![
                    TradeRequestParams::new(TOKEN_X, TOKEN_Y, ExchangeRate::new(1, 1), LocationRef::ThisPool),
                    TradeRequestParams::new(TOKEN_X, TOKEN_Z, ExchangeRate::new(1, 1), LocationRef::ThisPool),
                ],
                MAKER,
            )
            .unwrap();

        engine.execute_market_order(TAKER, order(grid, 40, 40)).unwrap();

        assert_eq!(
            engine.balance_of(TOKEN_Y, Location::Pool(grid)),
            U256::from(40)
        );
        assert_eq!(
            engine.trade_request(grid, TOKEN_X, TOKEN_Z).unwrap().capacity,
            U256::from(460)
        );
    }
}
