//! Vault-backed perps simulation.
//!
//! Walks the engine lifecycle: LP deposits, opens and closes against the vault, funding
//! accrual, keeper liquidations, fee routing and the solvency limits.
//! `RUST_LOG=vault_perps=debug` shows the engine's own trace.

use std::error::Error;
use std::sync::Arc;

use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;
use vault_perps::*;

type SimResult = Result<(), Box<dyn Error>>;

const ADMIN: AccountId = AccountId(1);
const BTC: InstrumentId = InstrumentId(1);

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Vault-Backed Perps Engine Simulation");
    println!("One LP vault, counterparty to every trade\n");

    scenario_1_vault_deposits()?;
    scenario_2_profitable_close()?;
    scenario_3_funding_accrual()?;
    scenario_4_liquidation_batch()?;
    scenario_5_fee_routing()?;
    scenario_6_solvency_limits()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

struct Sim {
    engine: Engine,
    prices: Arc<MockPriceFeed>,
}

fn setup(
    config: ExchangeConfig,
    collaborators: impl FnOnce(Collaborators) -> Collaborators,
) -> Result<Sim, Box<dyn Error>> {
    let prices = Arc::new(MockPriceFeed::new());
    prices.set_price(BTC, Price::from_decimal(dec!(50000)).ok_or("bad price")?);

    let mut engine = Engine::new(
        EngineConfig::default(),
        config,
        ADMIN,
        collaborators(Collaborators::new(prices.clone())),
    )?;
    engine.list_instrument(ADMIN, InstrumentConfig::btc_usd())?;
    Ok(Sim { engine, prices })
}

fn funded_account(engine: &mut Engine, units: u64) -> Result<AccountId, Box<dyn Error>> {
    let id = engine.create_account()?;
    engine.deposit_collateral(id, Amount::from_units(units))?;
    Ok(id)
}

fn set_btc(sim: &Sim, units: u64) -> SimResult {
    sim.prices.set_price(BTC, Price::from_units(units).ok_or("bad price")?);
    Ok(())
}

/// LPs stake, the share price moves with the vault balance.
fn scenario_1_vault_deposits() -> SimResult {
    println!("Scenario 1: Vault Deposits\n");

    let mut sim = setup(ExchangeConfig::development(), |c| c)?;
    let engine = &mut sim.engine;
    let alice = funded_account(engine, 100_000)?;
    let bob = funded_account(engine, 50_000)?;

    let alice_shares = engine.deposit_vault(alice, alice, Amount::from_units(100_000))?;
    let bob_shares = engine.deposit_vault(bob, bob, Amount::from_units(50_000))?;
    println!("  Alice stakes 100,000, minted {} shares", alice_shares);
    println!("  Bob stakes 50,000, minted {} shares", bob_shares);
    println!("  Vault balance: {}", engine.vault().balance);
    println!("  Share price: {:?}", engine.share_price());

    let out = engine.withdraw_vault(bob, bob, bob_shares / 2)?;
    println!("  Bob redeems half: paid {}, full={}", out.paid, out.full);
    println!("  Vault balance after: {}\n", engine.vault().balance);
    Ok(())
}

/// 1,000 margin at 10x, price up 100, closed in full.
fn scenario_2_profitable_close() -> SimResult {
    println!("Scenario 2: Profitable Close Paid By The Vault\n");

    let mut sim = setup(ExchangeConfig::development(), |c| c)?;
    let lp = funded_account(&mut sim.engine, 100_000)?;
    sim.engine.deposit_vault(lp, lp, Amount::from_units(100_000))?;
    let trader = funded_account(&mut sim.engine, 10_000)?;

    let open = sim.engine.open_position(
        trader,
        trader,
        BTC,
        Side::Long,
        Amount::from_units(1_000),
        Leverage::from_whole(10),
    )?;
    println!("  Trader opens 10x long, size {} @ {} (fee {})", open.size, open.execution_price, open.fee);
    println!("  Vault OI: {}", sim.engine.total_open_interest());

    set_btc(&sim, 50_100)?;
    let closed = sim
        .engine
        .close_position(trader, trader, BTC, Side::Long, Amount::from_units(1_000))?
        .ok_or("position vanished")?;
    println!("  Price moves to 50,100, close @ {}", closed.execution_price);
    println!("  PnL {}, fee {}, payout {}", closed.pnl, closed.fee, closed.payout);
    println!("  Vault balance: {}", sim.engine.vault().balance);
    println!("  Pending rewards: {:?}\n", sim.engine.pending_rewards());
    Ok(())
}

/// Skewed book accrues funding; longs pay.
fn scenario_3_funding_accrual() -> SimResult {
    println!("Scenario 3: Funding Accrual\n");

    let mut sim = setup(ExchangeConfig::development(), |c| c)?;
    let engine = &mut sim.engine;
    let lp = funded_account(engine, 1_000_000)?;
    engine.deposit_vault(lp, lp, Amount::from_units(1_000_000))?;
    let trader = funded_account(engine, 100_000)?;

    engine.open_position(trader, trader, BTC, Side::Long, Amount::from_units(20_000), Leverage::from_whole(10))?;
    let snapshot = engine.funding_snapshot(BTC)?;
    println!("  200k long vs 0 short, rate {} (scaled 1e12)", snapshot.rate);

    engine.advance_time(30 * 24 * 3_600);
    let snapshot = engine.funding_snapshot(BTC)?;
    println!("  After 30 days: index {}, projected {}", snapshot.cumulative, snapshot.projected);

    let key = PositionKey::new(trader, BTC, Side::Long);
    let health = engine.position_health(key)?;
    println!("  Funding owed by the long: {}", health.funding_cost);
    println!("  Net settlement: {}\n", health.net);
    Ok(())
}

/// Three keys in one batch, one of them healthy.
fn scenario_4_liquidation_batch() -> SimResult {
    println!("Scenario 4: Keeper Liquidation Batch\n");

    let mut sim = setup(ExchangeConfig::development(), |c| c)?;
    let lp = funded_account(&mut sim.engine, 1_000_000)?;
    sim.engine.deposit_vault(lp, lp, Amount::from_units(1_000_000))?;
    let keeper = sim.engine.create_account()?;
    sim.engine.grant_role(ADMIN, Role::Liquidator, keeper)?;

    let mut keys = Vec::new();
    for (side, leverage) in [(Side::Long, 50), (Side::Short, 5), (Side::Long, 40)] {
        let trader = funded_account(&mut sim.engine, 10_000)?;
        let open = sim.engine.open_position(
            trader,
            trader,
            BTC,
            side,
            Amount::from_units(1_000),
            Leverage::from_whole(leverage),
        )?;
        keys.push(open.key);
    }
    println!("  Opened: 50x long, 5x short, 40x long");

    set_btc(&sim, 49_000)?;
    println!("  Price drops 2% to 49,000");
    println!("  Liquidatable now: {}", sim.engine.liquidatable_positions()?.len());

    let report = sim.engine.liquidate_positions(keeper, &keys)?;
    for result in &report.liquidated {
        println!(
            "  Liquidated {}: net {}, keeper reward {}, vault credit {}",
            result.key, result.net, result.liquidator_reward, result.vault_credit
        );
    }
    for failure in &report.failures {
        println!("  Kept {}: {}", failure.key, failure.error);
    }
    let keeper_balance = sim.engine.get_account(keeper).map(|a| a.balance).unwrap_or_default();
    println!("  Keeper wallet: {}\n", keeper_balance);
    Ok(())
}

/// Referral rebates, reward pulls and compounding.
fn scenario_5_fee_routing() -> SimResult {
    println!("Scenario 5: Fee Routing\n");

    let referrals = Arc::new(ReferralBook::new());
    let registry = referrals.clone();
    let mut sim = setup(ExchangeConfig::development(), move |c| c.with_referrals(registry))?;
    let engine = &mut sim.engine;

    let lp = funded_account(engine, 500_000)?;
    engine.deposit_vault(lp, lp, Amount::from_units(500_000))?;
    let router = engine.create_account()?;
    engine.grant_role(ADMIN, Role::RewardRouter, router)?;
    let referrer = engine.create_account()?;
    let trader = funded_account(engine, 50_000)?;

    referrals.register(
        trader,
        ReferrerInfo {
            referrer,
            referrer_rebate: Bps::new(1_000),
            trader_rebate: Bps::new(500),
        },
    );

    let open = engine.open_position(trader, trader, BTC, Side::Short, Amount::from_units(10_000), Leverage::from_whole(20))?;
    println!("  Trader opens 20x short, fee {}", open.fee);
    println!("  Pending rewards: {:?}", engine.pending_rewards());

    let rebate = engine.claim_referral_rebate(referrer)?;
    println!("  Referrer claims {}", rebate);

    let vault_reward = engine.pull_vault_reward(router)?;
    let staking_reward = engine.pull_staking_reward(router)?;
    println!("  Router pulls {} (vault) and {} (staking)", vault_reward, staking_reward);

    let minted = engine.compound_into_vault(router, lp, vault_reward)?;
    println!("  Vault reward compounded for the LP: {} shares", minted);
    println!("  Share price: {:?}\n", engine.share_price());
    Ok(())
}

/// Opens beyond what the vault can back are refused and leave no trace.
fn scenario_6_solvency_limits() -> SimResult {
    println!("Scenario 6: Solvency Limits\n");

    let mut sim = setup(ExchangeConfig::development(), |c| c)?;
    let engine = &mut sim.engine;
    let lp = funded_account(engine, 10_000)?;
    engine.deposit_vault(lp, lp, Amount::from_units(10_000))?;
    let whale = funded_account(engine, 100_000)?;

    let before = engine.total_tokens();
    match engine.open_position(whale, whale, BTC, Side::Long, Amount::from_units(5_000), Leverage::from_whole(10)) {
        Ok(open) => println!("  Unexpected fill: {}", open.size),
        Err(err) => println!("  50k notional on a 10k vault rejected: {}", err),
    }
    println!("  Tokens conserved: {}", engine.total_tokens() == before);

    let open = engine.open_position(whale, whale, BTC, Side::Long, Amount::from_units(500), Leverage::from_whole(10))?;
    println!("  5k notional fills, OI {}", engine.total_open_interest());

    let lp_shares = engine.stake(lp).map(|s| s.shares).unwrap_or_default();
    match engine.withdraw_vault(lp, lp, lp_shares) {
        Ok(out) => println!("  Unexpected withdrawal: {}", out.paid),
        Err(err) => println!("  LP full exit blocked while OI is open: {}", err),
    }

    engine.set_trading_paused(ADMIN, true)?;
    let paused = engine.close_position(whale, whale, BTC, Side::Long, open.position.margin);
    println!("  Close while paused: {:?}", paused.err().map(|e| e.to_string()));

    let rejected = engine
        .recent_events(50)
        .into_iter()
        .filter(|e| matches!(e.payload, EventPayload::OperationRejected { .. }))
        .count();
    println!("  Rejections in the event log: {}", rejected);
    Ok(())
}
