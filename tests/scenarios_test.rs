//! End-to-end scenarios for the settlement engine.
//!
//! Each test drives the public API only: pools are created and funded
//! through the custodian, takers trade against them, and balances are read
//! back through `balance_of` and `trade_request`.
//!
//! ## Running
//!
//! ```bash
//! cargo test --test scenarios_test -- --nocapture
//! ```

use alloy_primitives::{address, Address, U256};

use grid_settlement::engine::{
    FlashSwapInfo, LimitOrderParams, TokenSource, TradeRequestParams,
};
use grid_settlement::{
    Engine, EngineCall, EngineConfig, ErrorKind, ExchangeRate, FlashSwapCallee, FlashSwapContext,
    InMemoryCustodian, Location, LocationRef, MarketOrder, PoolId, Result, SettlementError,
};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

const ENGINE: Address = address!("00000000000000000000000000000000000000ee");
const ADMIN: Address = address!("00000000000000000000000000000000000000ad");
const FEE_RECEIVER: Address = address!("00000000000000000000000000000000000000fe");
const MAKER: Address = address!("00000000000000000000000000000000000000a1");
const TAKER: Address = address!("00000000000000000000000000000000000000b0");
const STRANGER: Address = address!("00000000000000000000000000000000000000c0");

const TOKEN_X: Address = address!("0000000000000000000000000000000000000011");
const TOKEN_Y: Address = address!("0000000000000000000000000000000000000022");
const TOKEN_Z: Address = address!("0000000000000000000000000000000000000033");

/// 0.2%
const FEE_PPM: u32 = 2_000;

type TestEngine = Engine<InMemoryCustodian>;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// `n` whole tokens with 18 decimals.
fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

fn new_engine(fee_ppm: u32, max_grid_tokens: usize) -> TestEngine {
    let mut custodian = InMemoryCustodian::new(ENGINE);
    for token in [TOKEN_X, TOKEN_Y, TOKEN_Z] {
        custodian.fund(token, MAKER, units(1_000_000));
        custodian.fund(token, TAKER, units(1_000_000));
    }
    let config = EngineConfig::new(ENGINE, ADMIN)
        .with_default_fee(fee_ppm, Location::InternalWallet(FEE_RECEIVER))
        .with_limits(1_000, max_grid_tokens);
    Engine::new(config, custodian).unwrap()
}

fn limit_pool(engine: &mut TestEngine, token_a: Address, token_b: Address, amount_a: U256, rate: ExchangeRate) -> PoolId {
    engine
        .create_limit_order_pool(
            MAKER,
            LimitOrderParams {
                token_a,
                token_b,
                amount_a,
                exchange_rate: rate,
                source: LocationRef::SenderWallet,
                destination: LocationRef::SenderWallet,
                owner: MAKER,
            },
        )
        .unwrap()
}

fn order(pool_id: PoolId, token_a: Address, token_b: Address, amount_a: U256, amount_b: U256) -> MarketOrder {
    MarketOrder {
        pool_id,
        token_a,
        token_b,
        amount_a,
        amount_b,
        source: LocationRef::SenderWallet,
        destination: LocationRef::SenderWallet,
    }
}

fn capacity(engine: &TestEngine, pool: PoolId, token_a: Address, token_b: Address) -> U256 {
    engine.trade_request(pool, token_a, token_b).unwrap().capacity
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// Limit pool selling 10,000 X at 25,000 X per Y; a taker pays 0.1 Y gross
/// with a 0.2% fee.
#[test]
fn scenario_1_limit_order_with_fee() {
    let mut engine = new_engine(FEE_PPM, 20);
    let pool = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(10_000), ExchangeRate::new(25_000, 1));

    let amount_b = units(1) / U256::from(10u64);
    let quote = engine
        .quote_for_payment(pool, TOKEN_X, TOKEN_Y, amount_b)
        .unwrap();
    // fee = 0.1 * 0.002 = 0.0002 Y, net = 0.0998 Y, 0.0998 * 25,000 = 2,495 X
    assert_eq!(quote.amount_b_gross, amount_b);
    assert_eq!(quote.fee, U256::from(200_000_000_000_000u64));
    assert_eq!(quote.amount_b_net, U256::from(99_800_000_000_000_000u64));
    assert_eq!(quote.amount_a, units(2_495));

    let fill = engine
        .execute_market_order(TAKER, order(pool, TOKEN_X, TOKEN_Y, quote.amount_a, amount_b))
        .unwrap();

    assert_eq!(fill.fee + fill.amount_b_net, amount_b);
    assert_eq!(capacity(&engine, pool, TOKEN_X, TOKEN_Y), units(10_000) - units(2_495));
    assert_eq!(
        engine.balance_of(TOKEN_Y, Location::InternalWallet(FEE_RECEIVER)),
        fill.fee
    );
    assert_eq!(
        engine.balance_of(TOKEN_Y, Location::InternalWallet(MAKER)),
        fill.amount_b_net
    );
    assert_eq!(
        engine.balance_of(TOKEN_X, Location::InternalWallet(TAKER)),
        units(2_495)
    );
    assert!(engine.check_conservation().is_ok());
}

/// Grid pool over three tokens with all six directed requests: selling
/// against A->B also shrinks what A->C can sell.
#[test]
fn scenario_2_grid_capacity_is_shared() {
    let mut engine = new_engine(0, 20);
    let tokens = [TOKEN_X, TOKEN_Y, TOKEN_Z];
    let mut requests = Vec::new();
    for a in tokens {
        for b in tokens {
            if a != b {
                requests.push(TradeRequestParams::new(a, b, ExchangeRate::new(1, 1), LocationRef::ThisPool));
            }
        }
    }
    let sources = tokens
        .iter()
        .map(|token| TokenSource::new(*token, units(100), LocationRef::SenderWallet))
        .collect();
    let grid = engine
        .create_grid_order_pool(MAKER, sources, requests, MAKER)
        .unwrap();
    assert_eq!(engine.trade_requests(grid).unwrap().len(), 6);

    engine
        .execute_market_order(TAKER, order(grid, TOKEN_X, TOKEN_Y, units(30), units(30)))
        .unwrap();

    assert_eq!(capacity(&engine, grid, TOKEN_X, TOKEN_Y), units(70));
    assert_eq!(capacity(&engine, grid, TOKEN_X, TOKEN_Z), units(70));
    // Proceeds are reinvested: Y capacity grew by what the taker paid.
    assert_eq!(capacity(&engine, grid, TOKEN_Y, TOKEN_X), units(130));
    assert_eq!(capacity(&engine, grid, TOKEN_Y, TOKEN_Z), units(130));
}

/// Borrows X from pool 1 via a flash swap, sells it into pool 2 for Y from
/// inside the callback, then repays pool 1 in Y.
struct CrossPoolArbitrage {
    target: PoolId,
    buy_y: U256,
    pay_x: U256,
}

impl FlashSwapCallee<InMemoryCustodian> for CrossPoolArbitrage {
    fn on_flash_swap(
        &mut self,
        ctx: &mut FlashSwapContext<'_, InMemoryCustodian>,
        swap: &FlashSwapInfo,
        data: &[u8],
    ) -> Result<()> {
        assert_eq!(data, b"arb");
        assert_eq!(ctx.caller(), TAKER);
        // The borrowed X is already in the taker's internal wallet.
        assert!(ctx.engine().balance_of(TOKEN_X, swap.destination) >= swap.amount_a);

        ctx.execute_flash_swap(
            order(self.target, TOKEN_Y, TOKEN_X, self.buy_y, self.pay_x),
            None,
            &[],
        )?;
        Ok(())
    }
}

fn arbitrage_setup() -> (TestEngine, PoolId, PoolId) {
    let mut custodian = InMemoryCustodian::new(ENGINE);
    custodian.fund(TOKEN_X, MAKER, units(1_000));
    custodian.fund(TOKEN_Y, MAKER, units(1_000));
    let mut engine = Engine::new(EngineConfig::new(ENGINE, ADMIN), custodian).unwrap();

    // Pool 1 sells X cheaply (4 X per Y), pool 2 sells Y for 2 X.
    let cheap_x = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(1_000), ExchangeRate::new(4, 1));
    let dear_y = limit_pool(&mut engine, TOKEN_Y, TOKEN_X, units(1_000), ExchangeRate::new(1, 2));
    (engine, cheap_x, dear_y)
}

#[test]
fn scenario_3_flash_swap_arbitrage_settles() {
    let (mut engine, cheap_x, dear_y) = arbitrage_setup();
    let mut strategy = CrossPoolArbitrage {
        target: dear_y,
        buy_y: units(200),
        pay_x: units(400),
    };

    let fill = engine
        .execute_flash_swap(
            TAKER,
            order(cheap_x, TOKEN_X, TOKEN_Y, units(400), units(100)),
            Some(&mut strategy),
            b"arb",
        )
        .unwrap();

    assert_eq!(fill.amount_b_gross, units(100));
    // The taker started with nothing and keeps the spread.
    assert_eq!(
        engine.balance_of(TOKEN_Y, Location::InternalWallet(TAKER)),
        units(100)
    );
    assert!(engine
        .balance_of(TOKEN_X, Location::InternalWallet(TAKER))
        .is_zero());
    assert_eq!(capacity(&engine, cheap_x, TOKEN_X, TOKEN_Y), units(600));
    assert_eq!(capacity(&engine, dear_y, TOKEN_Y, TOKEN_X), units(800));
    assert!(engine.check_conservation().is_ok());
}

#[test]
fn scenario_3_underfunded_callback_reverts_both_pools() {
    let (mut engine, cheap_x, dear_y) = arbitrage_setup();
    let root = engine.state_root();
    // Only sells half the borrowed X, leaving 50 Y short.
    let mut strategy = CrossPoolArbitrage {
        target: dear_y,
        buy_y: units(50),
        pay_x: units(100),
    };

    let result = engine.execute_flash_swap(
        TAKER,
        order(cheap_x, TOKEN_X, TOKEN_Y, units(400), units(100)),
        Some(&mut strategy),
        b"arb",
    );

    assert!(matches!(result, Err(SettlementError::TransferFailed { .. })));
    assert_eq!(engine.state_root(), root);
    assert_eq!(capacity(&engine, cheap_x, TOKEN_X, TOKEN_Y), units(1_000));
    assert_eq!(capacity(&engine, dear_y, TOKEN_Y, TOKEN_X), units(1_000));
}

#[test]
fn scenario_4_grid_token_limit() {
    const MAX_TOKENS: usize = 20;
    let tokens: Vec<Address> = (1..=MAX_TOKENS as u8 + 1)
        .map(|i| Address::with_last_byte(0x40 + i))
        .collect();

    let mut custodian = InMemoryCustodian::new(ENGINE);
    for token in &tokens {
        custodian.fund(*token, MAKER, U256::from(10u64));
    }
    let mut engine = Engine::new(
        EngineConfig::new(ENGINE, ADMIN).with_limits(100, MAX_TOKENS),
        custodian,
    )
    .unwrap();

    let sources = |count: usize| -> Vec<TokenSource> {
        tokens[..count]
            .iter()
            .map(|token| TokenSource::new(*token, U256::from(1u64), LocationRef::SenderWallet))
            .collect()
    };

    let too_many = engine
        .create_grid_order_pool(MAKER, sources(MAX_TOKENS + 1), vec![], MAKER)
        .unwrap_err();
    assert_eq!(too_many, SettlementError::MaxTokensPerGridOrder(MAX_TOKENS));
    assert_eq!(too_many.kind(), ErrorKind::ResourceLimit);
    assert_eq!(engine.pool_count(), 0);

    let grid = engine
        .create_grid_order_pool(MAKER, sources(MAX_TOKENS), vec![], MAKER)
        .unwrap();
    assert_eq!(engine.pool(grid).unwrap().balances.len(), MAX_TOKENS);

    // A request naming an unlisted token would push the list past the cap.
    let extra = tokens[MAX_TOKENS];
    let result = engine.update_grid_order_pool(
        MAKER,
        grid,
        vec![],
        vec![TradeRequestParams::new(tokens[0], extra, ExchangeRate::new(1, 1), LocationRef::ThisPool)],
    );
    assert_eq!(result, Err(SettlementError::MaxTokensPerGridOrder(MAX_TOKENS)));
}

#[test]
fn scenario_5_update_authorization_and_visibility() {
    let mut engine = new_engine(0, 20);
    let pool = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(100), ExchangeRate::new(1, 1));

    let denied = engine
        .update_limit_order_pool(STRANGER, pool, ExchangeRate::new(1, 5), LocationRef::SenderWallet)
        .unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::Authorization);

    engine
        .update_limit_order_pool(MAKER, pool, ExchangeRate::new(1, 2), Location::ExternalWallet(MAKER).into())
        .unwrap();
    let view = engine.trade_request(pool, TOKEN_X, TOKEN_Y).unwrap();
    assert_eq!(view.request.exchange_rate, ExchangeRate::new(1, 2));

    // The old price no longer clears; the new one does and pays out externally.
    assert!(matches!(
        engine.execute_market_order(TAKER, order(pool, TOKEN_X, TOKEN_Y, units(10), units(10))),
        Err(SettlementError::ExchangeRateDisagreement { .. })
    ));
    let before = engine.balance_of(TOKEN_Y, Location::ExternalWallet(MAKER));
    engine
        .execute_market_order(TAKER, order(pool, TOKEN_X, TOKEN_Y, units(10), units(20)))
        .unwrap();
    assert_eq!(
        engine.balance_of(TOKEN_Y, Location::ExternalWallet(MAKER)),
        before + units(20)
    );
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn self_trade_is_rejected_everywhere() {
    let mut engine = new_engine(0, 20);
    let limit = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(100), ExchangeRate::new(1, 1));
    let grid = engine
        .create_grid_order_pool(
            MAKER,
            vec![TokenSource::new(TOKEN_X, units(100), LocationRef::SenderWallet)],
            vec![TradeRequestParams::new(TOKEN_X, TOKEN_Y, ExchangeRate::new(1, 1), LocationRef::ThisPool)],
            MAKER,
        )
        .unwrap();

    for pool in [limit, grid] {
        let mut into_self = order(pool, TOKEN_X, TOKEN_Y, units(1), units(1));
        into_self.destination = Location::Pool(pool).into();
        let mut from_self = order(pool, TOKEN_X, TOKEN_Y, units(1), units(1));
        from_self.source = Location::Pool(pool).into();

        for bad in [into_self, from_self] {
            assert_eq!(
                engine.execute_market_order(MAKER, bad),
                Err(SettlementError::PoolCannotTradeAgainstItself(pool))
            );
            assert_eq!(
                engine.execute_flash_swap(MAKER, bad, None, &[]),
                Err(SettlementError::PoolCannotTradeAgainstItself(pool))
            );
        }
    }
}

#[test]
fn fee_split_sums_to_gross() {
    for fee_ppm in [0u32, 1, 2_000, 30_000, 999_999] {
        let mut engine = new_engine(fee_ppm, 20);
        let pool = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(1_000), ExchangeRate::new(3, 7));

        let quote = engine
            .quote_market_order(pool, TOKEN_X, TOKEN_Y, U256::from(1_234_567u64))
            .unwrap();
        let fill = engine
            .execute_market_order(
                TAKER,
                order(pool, TOKEN_X, TOKEN_Y, quote.amount_a, quote.amount_b_gross),
            )
            .unwrap();

        let expected_fee = quote.amount_b_gross * U256::from(fee_ppm) / U256::from(1_000_000u64);
        assert_eq!(fill.fee, expected_fee, "fee_ppm={fee_ppm}");
        assert_eq!(fill.fee + fill.amount_b_net, fill.amount_b_gross);
        assert_eq!(
            engine.balance_of(TOKEN_Y, Location::InternalWallet(FEE_RECEIVER)),
            fill.fee
        );
    }
}

#[test]
fn pair_fee_override_applies() {
    let mut engine = new_engine(FEE_PPM, 20);
    engine
        .set_pair_fee(ADMIN, TOKEN_X, TOKEN_Y, 10_000, Location::ExternalWallet(FEE_RECEIVER))
        .unwrap();
    let pool = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(100), ExchangeRate::new(1, 1));

    let fill = engine
        .execute_market_order(TAKER, order(pool, TOKEN_X, TOKEN_Y, U256::from(990u64), U256::from(1_000u64)))
        .unwrap();
    assert_eq!(fill.fee, U256::from(10u64));
    assert_eq!(
        engine.balance_of(TOKEN_Y, Location::ExternalWallet(FEE_RECEIVER)),
        U256::from(10u64)
    );
}

#[test]
fn batch_is_all_or_nothing() {
    let mut engine = new_engine(0, 20);
    let pool = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(100), ExchangeRate::new(1, 1));
    let root = engine.state_root();

    let result = engine.execute_batch(
        TAKER,
        vec![
            EngineCall::MarketOrder(order(pool, TOKEN_X, TOKEN_Y, units(10), units(10))),
            EngineCall::MarketOrder(order(pool, TOKEN_X, TOKEN_Y, units(95), units(95))),
        ],
    );

    let error = result.unwrap_err();
    assert!(matches!(
        error,
        SettlementError::BatchCallFailed { index: 1, .. }
    ));
    assert!(matches!(
        error.root_cause(),
        SettlementError::InsufficientCapacity { .. }
    ));
    assert_eq!(error.kind(), ErrorKind::Economic);
    assert_eq!(engine.state_root(), root);
    assert_eq!(capacity(&engine, pool, TOKEN_X, TOKEN_Y), units(100));

    let committed = engine
        .execute_batch(
            TAKER,
            vec![
                EngineCall::MarketOrder(order(pool, TOKEN_X, TOKEN_Y, units(10), units(10))),
                EngineCall::MarketOrder(order(pool, TOKEN_X, TOKEN_Y, units(90), units(90))),
            ],
        )
        .unwrap();
    assert_eq!(committed.receipt.fills_executed, 2);
    assert!(capacity(&engine, pool, TOKEN_X, TOKEN_Y).is_zero());
}

/// Records the depth it was called at and recurses once into a second pool.
struct Nested {
    inner_pool: PoolId,
    depths: Vec<u32>,
}

impl FlashSwapCallee<InMemoryCustodian> for Nested {
    fn on_flash_swap(
        &mut self,
        ctx: &mut FlashSwapContext<'_, InMemoryCustodian>,
        swap: &FlashSwapInfo,
        _data: &[u8],
    ) -> Result<()> {
        self.depths.push(swap.depth);
        if swap.depth == 1 {
            let inner = order(self.inner_pool, TOKEN_X, TOKEN_Y, units(1), units(1));
            ctx.execute_flash_swap(inner, Some(self), &[])?;
        }
        Ok(())
    }
}

#[test]
fn nested_flash_swaps_run_inside_the_guard() {
    let mut engine = new_engine(0, 20);
    let outer = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(10), ExchangeRate::new(1, 1));
    let inner = limit_pool(&mut engine, TOKEN_X, TOKEN_Y, units(10), ExchangeRate::new(1, 1));

    let mut callee = Nested {
        inner_pool: inner,
        depths: Vec::new(),
    };
    engine
        .execute_flash_swap(
            TAKER,
            order(outer, TOKEN_X, TOKEN_Y, units(2), units(2)),
            Some(&mut callee),
            &[],
        )
        .unwrap();

    assert_eq!(callee.depths, vec![1, 2]);
    assert_eq!(
        engine.balance_of(TOKEN_X, Location::InternalWallet(TAKER)),
        units(3)
    );
    // Back to idle: ordinary calls work again.
    assert!(engine.custodian_mut().is_ok());
}

#[test]
fn short_delivering_token_is_rejected() {
    let mut engine = new_engine(0, 20);
    engine
        .custodian_mut()
        .unwrap()
        .set_transfer_fee(TOKEN_Z, 10_000);

    let result = engine.transfer(
        MAKER,
        TOKEN_Z,
        units(1),
        Location::ExternalWallet(MAKER).into(),
        LocationRef::SenderWallet,
    );
    assert!(matches!(result, Err(SettlementError::TransferFailed { .. })));
    assert!(engine
        .balance_of(TOKEN_Z, Location::InternalWallet(MAKER))
        .is_zero());
}
