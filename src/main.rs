//! Grid Settlement - Binary Entry Point
//!
//! Runs a scripted session against an in-memory custodian: a limit pool, a
//! grid pool, a few market orders and a flash swap that arbitrages between
//! the two, then prints the fills and the final state root.

use std::path::PathBuf;

use alloy_primitives::{address, Address, U256};
use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use grid_settlement::engine::{LimitOrderParams, TokenSource, TradeRequestParams};
use grid_settlement::{
    Engine, EngineConfig, ExchangeRate, FlashSwapCallee, FlashSwapContext, InMemoryCustodian,
    Location, LocationRef, MarketOrder, PoolId,
};

const ENGINE: Address = address!("00000000000000000000000000000000000000ee");
const ADMIN: Address = address!("00000000000000000000000000000000000000ad");
const FEE_RECEIVER: Address = address!("00000000000000000000000000000000000000fe");
const MAKER: Address = address!("00000000000000000000000000000000000000a1");
const TAKER: Address = address!("00000000000000000000000000000000000000b0");
const TOKEN_X: Address = address!("0000000000000000000000000000000000000011");
const TOKEN_Y: Address = address!("0000000000000000000000000000000000000022");
const TOKEN_Z: Address = address!("0000000000000000000000000000000000000033");

#[derive(Parser, Debug)]
#[command(version, about = "Scripted settlement session against an in-memory custodian")]
struct Args {
    /// Path to an engine config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of market orders to run against the limit pool
    #[arg(long, default_value = "3")]
    orders: u64,

    /// Fee in ppm when no config file is given
    #[arg(long, default_value = "2000")]
    fee_ppm: u32,
}

/// Sells the X borrowed from one pool into another for Y.
struct Arbitrage {
    target: PoolId,
    amount_y: U256,
    amount_x: U256,
}

impl FlashSwapCallee<InMemoryCustodian> for Arbitrage {
    fn on_flash_swap(
        &mut self,
        ctx: &mut FlashSwapContext<'_, InMemoryCustodian>,
        swap: &grid_settlement::engine::FlashSwapInfo,
        _data: &[u8],
    ) -> grid_settlement::Result<()> {
        info!(pool = %swap.pool_id, amount_a = %swap.amount_a, "arbitrage callback");
        ctx.execute_flash_swap(
            MarketOrder {
                pool_id: self.target,
                token_a: TOKEN_Y,
                token_b: TOKEN_X,
                amount_a: self.amount_y,
                amount_b: self.amount_x,
                source: LocationRef::SenderWallet,
                destination: LocationRef::SenderWallet,
            },
            None,
            &[],
        )?;
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let config = EngineConfig::new(ENGINE, ADMIN)
                .with_default_fee(args.fee_ppm, Location::InternalWallet(FEE_RECEIVER));
            config.validate().context("invalid default config")?;
            Ok(config)
        }
    }
}

fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let engine_address = config.engine_address;

    println!("===========================================");
    println!("  Grid Settlement - scripted session");
    println!("===========================================");
    println!();

    let mut custodian = InMemoryCustodian::new(engine_address);
    for token in [TOKEN_X, TOKEN_Y, TOKEN_Z] {
        custodian.fund(token, MAKER, units(1_000_000));
        custodian.fund(token, TAKER, units(1_000_000));
    }
    let mut engine = Engine::new(config, custodian).context("failed to start engine")?;

    // Limit pool: 100,000 X at 25,000 X per Y.
    let limit = engine.create_limit_order_pool(
        MAKER,
        LimitOrderParams {
            token_a: TOKEN_X,
            token_b: TOKEN_Y,
            amount_a: units(100_000),
            exchange_rate: ExchangeRate::new(25_000, 1),
            source: LocationRef::SenderWallet,
            destination: LocationRef::SenderWallet,
            owner: MAKER,
        },
    )?;

    // Grid pool over X, Y and Z, reinvesting its proceeds.
    let grid = engine.create_grid_order_pool(
        MAKER,
        vec![
            TokenSource::new(TOKEN_X, units(50_000), LocationRef::SenderWallet),
            TokenSource::new(TOKEN_Y, units(10), LocationRef::SenderWallet),
            TokenSource::new(TOKEN_Z, units(10), LocationRef::SenderWallet),
        ],
        vec![
            TradeRequestParams::new(TOKEN_Y, TOKEN_X, ExchangeRate::new(1, 20_000), LocationRef::ThisPool),
            TradeRequestParams::new(TOKEN_X, TOKEN_Y, ExchangeRate::new(30_000, 1), LocationRef::ThisPool),
            TradeRequestParams::new(TOKEN_Z, TOKEN_Y, ExchangeRate::new(1, 1), LocationRef::ThisPool),
            TradeRequestParams::new(TOKEN_Y, TOKEN_Z, ExchangeRate::new(1, 1), LocationRef::ThisPool),
        ],
        MAKER,
    )?;

    println!("Pools: {limit} (limit), {grid} (grid)");

    for i in 0..args.orders {
        let quote = engine.quote_for_payment(limit, TOKEN_X, TOKEN_Y, units(1) / U256::from(10u64))?;
        let fill = engine.execute_market_order_to_external(
            TAKER,
            limit,
            TOKEN_X,
            TOKEN_Y,
            quote.amount_a,
            quote.amount_b_gross,
        )?;
        println!(
            "  order {}: {} X for {} Y ({} net, {} fee)",
            i + 1,
            fill.amount_a,
            fill.amount_b_gross,
            fill.amount_b_net,
            fill.fee
        );
    }

    // The limit pool sells X at 25,000 per Y and the grid buys it back at
    // 20,000 per Y: borrow X, sell it to the grid, repay in Y.
    let quote = engine.quote_market_order(limit, TOKEN_X, TOKEN_Y, units(25_000))?;
    let resale = engine.quote_for_payment(grid, TOKEN_Y, TOKEN_X, quote.amount_a)?;
    if resale.amount_a <= quote.amount_b_gross {
        bail!("arbitrage would not repay the flash swap");
    }
    let mut strategy = Arbitrage {
        target: grid,
        amount_y: resale.amount_a,
        amount_x: resale.amount_b_gross,
    };
    let fill = engine.execute_flash_swap(
        TAKER,
        MarketOrder {
            pool_id: limit,
            token_a: TOKEN_X,
            token_b: TOKEN_Y,
            amount_a: quote.amount_a,
            amount_b: quote.amount_b_gross,
            source: LocationRef::SenderWallet,
            destination: LocationRef::SenderWallet,
        },
        Some(&mut strategy),
        b"arbitrage",
    )?;
    println!(
        "  flash swap: borrowed {} X, repaid {} Y",
        fill.amount_a, fill.amount_b_gross
    );

    println!();
    println!(
        "Taker internal balances: X={} Y={}",
        engine.balance_of(TOKEN_X, Location::InternalWallet(TAKER)),
        engine.balance_of(TOKEN_Y, Location::InternalWallet(TAKER))
    );
    for pool in [limit, grid] {
        let snapshot = engine.pool(pool)?;
        println!("Pool {pool}:");
        for (token, balance) in snapshot.balances {
            println!("  {token}: {balance}");
        }
    }

    engine
        .check_conservation()
        .context("ledger exceeds custodial holdings")?;
    println!();
    println!("State root: {}", engine.state_root_hex());
    Ok(())
}
