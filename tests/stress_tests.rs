//! Stress tests
//!
//! Deterministic scenarios that push the engine through its settlement paths, its solvency
//! limits and its failure modes, and check the books afterwards.

use std::sync::Arc;

use rust_decimal_macros::dec;
use vault_perps::*;

const ADMIN: AccountId = AccountId(1);
const TEST: InstrumentId = InstrumentId(1);

fn units(v: u64) -> Amount {
    Amount::from_units(v)
}

fn lev(v: u64) -> Leverage {
    Leverage::from_whole(v)
}

/// Impact-free instrument so prices in assertions are exact.
fn flat_instrument(id: InstrumentId) -> InstrumentConfig {
    InstrumentConfig {
        id,
        name: format!("TEST-{}", id.0),
        reserve_depth: Amount::ZERO,
        ..InstrumentConfig::btc_usd()
    }
}

/// Listed alongside `TEST` so exposure is shared by weight.
fn weighted_instrument(id: InstrumentId, weight: u64) -> InstrumentConfig {
    InstrumentConfig {
        weight,
        ..flat_instrument(id)
    }
}

/// Neither side of any instrument may outrun the other by more than its max exposure.
fn assert_skew_backed(engine: &Engine) {
    for inst in engine.instruments_iter() {
        let limit = engine.max_exposure(inst.config.id).unwrap().raw();
        let (long, short) = (inst.open_interest_long.raw(), inst.open_interest_short.raw());
        assert!(long <= short + limit, "{}: long {} short {} limit {}", inst.config.name, long, short, limit);
        assert!(short <= long + limit, "{}: short {} long {} limit {}", inst.config.name, short, long, limit);
    }
}

struct Setup {
    engine: Engine,
    prices: Arc<MockPriceFeed>,
    orders: Arc<CloseOrderBook>,
    referrals: Arc<ReferralBook>,
    lp: AccountId,
}

impl Setup {
    fn new(config: ExchangeConfig, vault: u64) -> Self {
        let prices = Arc::new(MockPriceFeed::new());
        let orders = Arc::new(CloseOrderBook::new());
        let referrals = Arc::new(ReferralBook::new());
        prices.set_price(TEST, Price::from_units(100).unwrap());

        let collaborators = Collaborators::new(prices.clone())
            .with_orders(orders.clone())
            .with_referrals(referrals.clone());
        let mut engine = Engine::new(EngineConfig::default(), config, ADMIN, collaborators).unwrap();
        engine.list_instrument(ADMIN, flat_instrument(TEST)).unwrap();

        let lp = engine.create_account().unwrap();
        engine.deposit_collateral(lp, units(vault)).unwrap();
        engine.deposit_vault(lp, lp, units(vault)).unwrap();

        Self {
            engine,
            prices,
            orders,
            referrals,
            lp,
        }
    }

    fn dev(vault: u64) -> Self {
        Self::new(ExchangeConfig::development(), vault)
    }

    fn trader(&mut self, funds: u64) -> AccountId {
        let id = self.engine.create_account().unwrap();
        self.engine.deposit_collateral(id, units(funds)).unwrap();
        id
    }

    fn price(&self, value: rust_decimal::Decimal) {
        self.prices.set_price(TEST, Price::from_decimal(value).unwrap());
    }

    fn balance(&self, id: AccountId) -> Amount {
        self.engine.get_account(id).unwrap().balance
    }
}

/// Settlement paths of a user close.
mod settlement_tests {
    use super::*;

    #[test]
    fn round_trip_at_unchanged_price_costs_two_fees() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);

        let open = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10))
            .unwrap();
        assert_eq!(open.size, units(10_000));
        assert_eq!(open.execution_price, Price::from_units(100).unwrap());
        assert_eq!(open.fee, units(10));
        assert_eq!(s.balance(trader), units(8_990));

        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(1_000))
            .unwrap()
            .unwrap();
        assert_eq!(closed.pnl, SignedAmount::ZERO);
        assert_eq!(closed.funding_cost, SignedAmount::ZERO);
        assert_eq!(closed.payout, units(990));
        assert!(closed.full_close);

        assert_eq!(s.balance(trader), units(9_980));
        assert_eq!(s.engine.vault().balance, units(100_000));
        assert_eq!(s.engine.pending_rewards().vault, units(14));
        assert_eq!(s.engine.pending_rewards().staking, units(6));
        assert_eq!(s.engine.total_open_interest(), Amount::ZERO);
        assert!(s.engine.get_position(open.key).is_none());
    }

    #[test]
    fn profit_is_paid_by_the_vault() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();

        s.price(dec!(110));
        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(1_000))
            .unwrap()
            .unwrap();

        // 10% on 10,000 notional
        assert_eq!(closed.pnl, SignedAmount::new(units(1_000).raw() as i128));
        assert_eq!(closed.payout, units(1_990));
        assert_eq!(s.engine.vault().balance, units(100_000 - 1_000));
        assert_eq!(s.balance(trader), units(8_990 + 1_990));
    }

    #[test]
    fn partial_loss_returns_the_remainder() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Short, units(1_000), lev(10)).unwrap();

        s.price(dec!(103));
        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Short, units(1_000))
            .unwrap()
            .unwrap();

        // loss 300 plus fee 10
        assert_eq!(closed.payout, units(690));
        assert_eq!(closed.fee, units(10));
        assert_eq!(s.engine.vault().balance, units(100_300));
    }

    #[test]
    fn wiped_position_leaves_margin_in_the_vault() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();
        let pending_before = s.engine.pending_rewards().total();

        s.price(dec!(85));
        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(1_000))
            .unwrap()
            .unwrap();

        assert_eq!(closed.payout, Amount::ZERO);
        assert_eq!(closed.fee, Amount::ZERO);
        assert_eq!(s.engine.vault().balance, units(101_000));
        assert_eq!(s.engine.pending_rewards().total(), pending_before);
    }

    #[test]
    fn partial_close_keeps_the_rest_open() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        let open = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10))
            .unwrap();

        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(400))
            .unwrap()
            .unwrap();
        assert!(!closed.full_close);
        assert_eq!(closed.size, units(4_000));

        let rest = s.engine.get_position(open.key).unwrap();
        assert_eq!(rest.margin, units(600));
        assert_eq!(rest.leverage, lev(10));
        assert_eq!(s.engine.total_open_interest(), units(6_000));
    }

    #[test]
    fn second_open_merges_into_the_slot() {
        let mut s = Setup::dev(1_000_000);
        let trader = s.trader(10_000);
        let first = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10))
            .unwrap();
        assert!(!first.merged);
        assert_eq!(first.position.entry_funding, 0);

        s.engine.advance_time(86_400);
        let projected = s.engine.projected_funding_index(TEST).unwrap();
        assert!(projected > 0);

        s.price(dec!(110));
        let second = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(3_000), lev(5))
            .unwrap();
        assert!(second.merged);
        assert_eq!(second.key, first.key);
        assert_eq!(second.size, units(15_000));
        assert_eq!(second.fee, units(15));

        // legs weigh 10,000 and 15,000 notional
        let merged = s.engine.get_position(first.key).unwrap();
        assert_eq!(merged.margin, units(4_000));
        assert_eq!(merged.leverage, Leverage::from_decimal(dec!(6.25)).unwrap());
        assert_eq!(merged.entry_price, Price::from_units(106).unwrap());
        assert_eq!(merged.entry_funding, (projected * 3).div_euclid(5));
        assert_eq!(merged.timestamp, Timestamp::from_secs(86_400));

        assert_eq!(s.engine.funding_snapshot(TEST).unwrap().cumulative, projected);
        assert_eq!(s.engine.get_instrument(TEST).unwrap().open_interest_long, units(25_000));
        assert_eq!(s.engine.total_open_interest(), units(25_000));
        assert_eq!(s.balance(trader), units(10_000 - 1_010 - 3_015));
    }

    #[test]
    fn oversized_close_clamps_to_full() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();

        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(50_000))
            .unwrap()
            .unwrap();
        assert_eq!(closed.margin_closed, units(1_000));
        assert!(closed.full_close);
    }

    #[test]
    fn closing_an_empty_slot_only_touches_funding() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        assert_eq!(s.engine.get_instrument(TEST).unwrap().funding.last_update, None);

        let result = s.engine.close_position(trader, trader, TEST, Side::Long, units(1)).unwrap();
        assert!(result.is_none());

        let funding = &s.engine.get_instrument(TEST).unwrap().funding;
        assert_eq!(funding.last_update, Some(s.engine.time()));
        assert_eq!(funding.cumulative, 0);
        assert_eq!(s.balance(trader), units(10_000));
    }

    #[test]
    fn zero_margin_close_is_rejected() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        let err = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, Amount::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::ZeroAmount));
    }

    #[test]
    fn young_profit_is_withheld_until_price_or_time_allows() {
        let mut config = ExchangeConfig::development();
        config.risk.min_profit_time_secs = 600;
        let mut s = Setup::new(config, 100_000);
        let trader = s.trader(10_000);

        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();
        s.price(dec!(100.5));
        let early = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(500))
            .unwrap()
            .unwrap();
        assert!(early.profit_withheld);
        assert_eq!(early.net, SignedAmount::ZERO);
        assert_eq!(early.payout, units(495));

        // a 2% move clears the 1% trigger
        s.price(dec!(102));
        let moved = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(250))
            .unwrap()
            .unwrap();
        assert!(!moved.profit_withheld);
        assert!(moved.payout > units(250));

        s.price(dec!(100.5));
        s.engine.advance_time(601);
        let aged = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(250))
            .unwrap()
            .unwrap();
        assert!(!aged.profit_withheld);
    }
}

/// Solvency limits reject the whole operation.
mod limit_tests {
    use super::*;

    #[test]
    fn open_beyond_utilization_is_rejected() {
        let mut s = Setup::dev(10_000);
        let trader = s.trader(100_000);
        let before = s.engine.state().clone();

        let err = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(1_001), lev(10))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::UtilizationExceeded { .. } | EngineError::ExposureExceeded { .. }
        ));
        assert_eq!(s.engine.state(), &before);
    }

    #[test]
    fn exposure_is_shared_by_weight() {
        let mut s = Setup::dev(100_000);
        s.engine
            .list_instrument(ADMIN, flat_instrument(InstrumentId(2)))
            .unwrap();
        assert_eq!(s.engine.max_exposure(TEST).unwrap(), units(50_000));

        let trader = s.trader(100_000);
        let err = s
            .engine
            .open_position(trader, trader, TEST, Side::Short, units(5_001), lev(10))
            .unwrap_err();
        assert!(matches!(err, EngineError::ExposureExceeded { side: Side::Short, .. }));

        // the other side offsets the skew
        s.engine.open_position(trader, trader, TEST, Side::Long, units(3_000), lev(10)).unwrap();
        s.engine.open_position(trader, trader, TEST, Side::Short, units(5_001), lev(10)).unwrap();
    }

    #[test]
    fn lp_cannot_withdraw_backing_from_open_interest() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(5_000), lev(10)).unwrap();

        let shares = s.engine.stake(s.lp).unwrap().shares;
        let err = s.engine.withdraw_vault(s.lp, s.lp, shares).unwrap_err();
        assert!(matches!(err, EngineError::UtilizationExceeded { .. }));

        let half = s.engine.withdraw_vault(s.lp, s.lp, shares / 2).unwrap();
        assert_eq!(half.paid, units(50_000));
    }

    #[test]
    fn profit_larger_than_the_vault_is_refused() {
        let mut s = Setup::dev(10_000);
        let trader = s.trader(10_000);
        let open = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10))
            .unwrap();

        s.price(dec!(300));
        let err = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(1_000))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientVaultBalance { .. }));
        assert!(s.engine.get_position(open.key).is_some());
    }

    #[test]
    fn add_margin_floors_at_min_leverage() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(100_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();

        let topped = s.engine.add_margin(trader, trader, TEST, Side::Long, units(1_000)).unwrap();
        assert_eq!(topped.margin, units(2_000));
        assert_eq!(topped.leverage, lev(5));

        let err = s
            .engine
            .add_margin(trader, trader, TEST, Side::Long, units(20_000))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::LeverageOutOfRange { .. })
        ));
    }

    #[test]
    fn lp_withdrawal_keeps_every_skew_backed() {
        let mut s = Setup::dev(300_000);
        s.engine.list_instrument(ADMIN, weighted_instrument(InstrumentId(2), 2)).unwrap();
        assert_eq!(s.engine.max_exposure(TEST).unwrap(), units(100_000));

        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(9_000), lev(10)).unwrap();

        // half the vault would still back 90,000 of OI, but not a 90,000 skew on a third of it
        let shares = s.engine.stake(s.lp).unwrap().shares;
        let before = s.engine.state().clone();
        let err = s.engine.withdraw_vault(s.lp, s.lp, shares / 2).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExposureExceeded { instrument: TEST, side: Side::Long, .. }
        ));
        assert_eq!(s.engine.state(), &before);

        s.engine.withdraw_vault(s.lp, s.lp, shares / 10).unwrap();
        assert_eq!(s.engine.max_exposure(TEST).unwrap(), units(90_000));
        assert_skew_backed(&s.engine);
    }

    #[test]
    fn closing_the_lighter_side_cannot_unback_the_skew() {
        let mut s = Setup::dev(300_000);
        s.engine.list_instrument(ADMIN, weighted_instrument(InstrumentId(2), 2)).unwrap();
        let trader = s.trader(50_000);
        let short = s
            .engine
            .open_position(trader, trader, TEST, Side::Short, units(6_000), lev(10))
            .unwrap();
        s.engine.open_position(trader, trader, TEST, Side::Long, units(12_000), lev(10)).unwrap();

        let before = s.engine.state().clone();
        let err = s
            .engine
            .close_position(trader, trader, TEST, Side::Short, units(6_000))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExposureExceeded { instrument: TEST, side: Side::Long, .. }
        ));
        assert_eq!(s.engine.state(), &before);
        assert!(s.engine.get_position(short.key).is_some());

        // a partial exit fits, and once the heavier side shrinks the rest can go
        s.engine.close_position(trader, trader, TEST, Side::Short, units(2_000)).unwrap();
        s.engine.close_position(trader, trader, TEST, Side::Long, units(2_000)).unwrap();
        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Short, units(4_000))
            .unwrap()
            .unwrap();
        assert!(closed.full_close);

        let inst = s.engine.get_instrument(TEST).unwrap();
        assert_eq!(inst.open_interest_long, units(100_000));
        assert_eq!(inst.open_interest_short, Amount::ZERO);
        assert_skew_backed(&s.engine);
    }

    #[test]
    fn winning_close_waits_while_the_vault_is_fully_used() {
        let mut s = Setup::dev(10_000);
        let keeper = s.engine.create_account().unwrap();
        s.engine.grant_role(ADMIN, Role::Liquidator, keeper).unwrap();
        let winner = s.trader(10_000);
        let loser = s.trader(10_000);
        s.engine.open_position(winner, winner, TEST, Side::Long, units(500), lev(10)).unwrap();
        let short = s
            .engine
            .open_position(loser, loser, TEST, Side::Short, units(450), lev(10))
            .unwrap();

        // closing 1,000 of the long takes 2,000 from the vault: 8,500 of OI left on 8,000
        s.price(dec!(300));
        let err = s
            .engine
            .close_position(winner, winner, TEST, Side::Long, units(100))
            .unwrap_err();
        assert!(matches!(err, EngineError::UtilizationExceeded { .. }));

        // clearing the losing side frees the backing
        assert!(s.engine.liquidate_position(keeper, short.key).unwrap().is_some());
        let closed = s
            .engine
            .close_position(winner, winner, TEST, Side::Long, units(100))
            .unwrap()
            .unwrap();
        assert_eq!(closed.payout, units(2_099));
    }

    #[test]
    fn listing_cannot_shrink_a_live_skew() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(9_000), lev(10)).unwrap();

        let err = s
            .engine
            .list_instrument(ADMIN, flat_instrument(InstrumentId(2)))
            .unwrap_err();
        assert!(matches!(err, EngineError::ExposureExceeded { instrument: TEST, .. }));
        assert!(s.engine.get_instrument(InstrumentId(2)).is_none());

        let mut config = s.engine.exchange_config().clone();
        config.risk.exposure_multiplier = Bps::new(5_000);
        assert!(matches!(
            s.engine.update_config(ADMIN, config),
            Err(EngineError::ExposureExceeded { .. })
        ));
    }

    #[test]
    fn margin_band_is_half_open() {
        let mut config = ExchangeConfig::development();
        config.risk.max_margin = units(5_000);
        let mut s = Setup::new(config, 1_000_000);
        let trader = s.trader(100_000);

        let err = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(5_000), lev(2))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::MarginOutOfRange { .. })
        ));
        assert!(s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(4_999), lev(2))
            .is_ok());
    }
}

/// Keeper liquidations.
mod liquidation_tests {
    use super::*;

    fn three_positions(s: &mut Setup) -> Vec<PositionKey> {
        let mut keys = Vec::new();
        for (side, leverage) in [(Side::Long, 50), (Side::Short, 5), (Side::Long, 40)] {
            let trader = s.trader(10_000);
            let open = s
                .engine
                .open_position(trader, trader, TEST, side, units(1_000), lev(leverage))
                .unwrap();
            keys.push(open.key);
        }
        keys
    }

    #[test]
    fn batch_isolates_the_healthy_key() {
        let mut s = Setup::dev(1_000_000);
        let keeper = s.engine.create_account().unwrap();
        s.engine.grant_role(ADMIN, Role::Liquidator, keeper).unwrap();
        let keys = three_positions(&mut s);

        let now = s.engine.time();
        s.orders.place(keys[0], ConditionalType::StopLoss, Price::from_units(90).unwrap(), now);
        s.orders.place(keys[1], ConditionalType::TakeProfit, Price::from_units(90).unwrap(), now);

        s.price(dec!(98));
        assert_eq!(s.engine.liquidatable_positions().unwrap(), vec![keys[0], keys[2]]);

        let report = s.engine.liquidate_positions(keeper, &keys).unwrap();
        assert_eq!(report.liquidated.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, keys[1]);
        assert_eq!(report.failures[0].error, EngineError::NotLiquidatable(keys[1]));
        assert!(report.skipped.is_empty());

        // 50x: fee 50, keeper gets half of 950. 40x: fee 40, half of 960.
        assert_eq!(report.liquidated[0].liquidator_reward, units(475));
        assert_eq!(report.liquidated[0].vault_credit, units(475));
        assert_eq!(report.liquidated[1].liquidator_reward, units(480));
        assert_eq!(s.balance(keeper), units(955));

        assert!(s.engine.get_position(keys[0]).is_none());
        assert!(s.engine.get_position(keys[1]).is_some());
        assert!(s.engine.get_position(keys[2]).is_none());
        assert_eq!(s.engine.vault().balance, units(1_000_000 + 475 + 480));
        assert_eq!(s.engine.total_open_interest(), units(5_000));

        // dependent orders go only for the liquidated keys
        assert!(s.orders.orders_for(keys[0]).is_empty());
        assert_eq!(s.orders.orders_for(keys[1]).len(), 1);
        assert_eq!(s.orders.cancellations(), vec![(keys[0], 1), (keys[2], 0)]);
    }

    #[test]
    fn repeated_keys_are_skipped() {
        let mut s = Setup::dev(1_000_000);
        let keeper = s.engine.create_account().unwrap();
        s.engine.grant_role(ADMIN, Role::Liquidator, keeper).unwrap();
        let keys = three_positions(&mut s);

        s.price(dec!(98));
        let report = s.engine.liquidate_positions(keeper, &[keys[0], keys[0]]).unwrap();
        assert_eq!(report.liquidated.len(), 1);
        assert_eq!(report.skipped, vec![keys[0]]);
    }

    #[test]
    fn unauthorized_batch_changes_nothing() {
        let mut s = Setup::dev(1_000_000);
        let keys = three_positions(&mut s);
        let stranger = s.trader(1);
        s.price(dec!(98));
        let before = s.engine.state().clone();

        let err = s.engine.liquidate_positions(stranger, &keys).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { .. }));
        assert_eq!(s.engine.state(), &before);
        assert!(matches!(
            s.engine.recent_events(1)[0].payload,
            EventPayload::OperationRejected { .. }
        ));

        s.engine.set_public_liquidation(ADMIN, true).unwrap();
        let report = s.engine.liquidate_positions(stranger, &keys).unwrap();
        assert_eq!(report.liquidated.len(), 2);
    }

    #[test]
    fn liquidation_runs_while_trading_is_paused() {
        let mut s = Setup::dev(1_000_000);
        let keeper = s.engine.create_account().unwrap();
        s.engine.grant_role(ADMIN, Role::Liquidator, keeper).unwrap();
        let keys = three_positions(&mut s);
        s.engine.set_trading_paused(ADMIN, true).unwrap();

        let trader = keys[1].owner;
        let err = s
            .engine
            .close_position(trader, trader, TEST, Side::Short, units(1_000))
            .unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::TradingPaused));

        s.price(dec!(98));
        assert!(s.engine.liquidate_position(keeper, keys[0]).unwrap().is_some());
    }

    #[test]
    fn lighter_side_liquidation_waits_for_the_heavier_side() {
        let mut config = ExchangeConfig::development();
        config.risk.exposure_multiplier = Bps::new(5_000);
        let mut s = Setup::new(config, 100_000);
        let keeper = s.engine.create_account().unwrap();
        s.engine.grant_role(ADMIN, Role::Liquidator, keeper).unwrap();

        let bear = s.trader(10_000);
        let bull = s.trader(10_000);
        let short = s
            .engine
            .open_position(bear, bear, TEST, Side::Short, units(500), lev(50))
            .unwrap();
        s.engine.open_position(bull, bull, TEST, Side::Long, units(6_000), lev(10)).unwrap();

        // the short is wiped, but dropping it leaves 60,000 long against ~50,000 of exposure
        s.price(dec!(102));
        let report = s.engine.liquidate_positions(keeper, &[short.key]).unwrap();
        assert!(report.liquidated.is_empty());
        assert!(matches!(
            report.failures[0].error,
            EngineError::ExposureExceeded { side: Side::Long, .. }
        ));
        assert!(s.engine.get_position(short.key).is_some());
        assert!(s.orders.cancellations().is_empty());

        s.engine.close_position(bull, bull, TEST, Side::Long, units(2_000)).unwrap();
        let report = s.engine.liquidate_positions(keeper, &[short.key]).unwrap();
        assert_eq!(report.liquidated.len(), 1);
        assert_skew_backed(&s.engine);
    }

    #[test]
    fn scan_skips_instruments_without_a_price() {
        let mut s = Setup::dev(1_000_000);
        let other = InstrumentId(2);
        s.engine.list_instrument(ADMIN, flat_instrument(other)).unwrap();
        s.prices.set_price(other, Price::from_units(100).unwrap());
        let keys = three_positions(&mut s);
        let trader = s.trader(10_000);
        let stranded = s
            .engine
            .open_position(trader, trader, other, Side::Long, units(1_000), lev(50))
            .unwrap();

        s.prices.remove(other);
        s.price(dec!(98));
        assert!(s.engine.position_health(stranded.key).is_err());
        assert_eq!(s.engine.liquidatable_positions().unwrap(), vec![keys[0], keys[2]]);
    }

    #[test]
    fn health_report_matches_the_threshold() {
        let mut s = Setup::dev(1_000_000);
        let keys = three_positions(&mut s);
        s.price(dec!(98));

        let health = s.engine.position_health(keys[2]).unwrap();
        assert_eq!(health.net, SignedAmount::new(-(units(800).raw() as i128)));
        assert_eq!(health.threshold_loss, units(800));
        assert!(health.liquidatable);
        assert!(!s.engine.position_health(keys[1]).unwrap().liquidatable);
    }

    #[test]
    fn cascade_keeps_the_books_balanced() {
        let mut s = Setup::dev(5_000_000);
        let keeper = s.engine.create_account().unwrap();
        s.engine.grant_role(ADMIN, Role::Liquidator, keeper).unwrap();

        for i in 0..20u64 {
            let trader = s.trader(50_000);
            s.engine
                .open_position(trader, trader, TEST, Side::Long, units(1_000 + i * 100), lev(10 + i * 2))
                .unwrap();
        }
        let total = s.engine.total_tokens();

        for step in [dec!(97), dec!(94), dec!(90), dec!(85)] {
            s.price(step);
            let keys = s.engine.liquidatable_positions().unwrap();
            let report = s.engine.liquidate_positions(keeper, &keys).unwrap();
            assert!(report.failures.is_empty());
            assert_eq!(s.engine.total_tokens(), total);
        }

        assert_eq!(s.engine.positions_iter().count(), 0);
        assert_eq!(s.engine.total_open_interest(), Amount::ZERO);
        assert!(s.engine.vault().balance > units(5_000_000));
    }
}

/// Funding accrual through the engine clock.
mod funding_tests {
    use super::*;

    #[test]
    fn first_touch_initializes_without_accruing() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(100_000);
        s.engine.set_time(Timestamp::from_secs(1_000));

        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();
        let funding = &s.engine.get_instrument(TEST).unwrap().funding;
        assert_eq!(funding.cumulative, 0);
        assert_eq!(funding.last_update, Some(Timestamp::from_secs(1_000)));

        s.engine.advance_time(86_400);
        let projected = s.engine.projected_funding_index(TEST).unwrap();
        assert!(projected > 0);

        s.engine.open_position(trader, trader, TEST, Side::Short, units(100), lev(10)).unwrap();
        assert_eq!(s.engine.get_instrument(TEST).unwrap().funding.cumulative, projected);
    }

    #[test]
    fn longs_pay_when_heavier() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(100_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(2_000), lev(10)).unwrap();
        assert!(s.engine.funding_rate(TEST).unwrap() > 0);

        s.engine.advance_time(30 * 86_400);
        let closed = s
            .engine
            .close_position(trader, trader, TEST, Side::Long, units(2_000))
            .unwrap()
            .unwrap();
        assert!(closed.funding_cost.raw() > 0);
        assert_eq!(closed.net.raw(), closed.pnl.raw() - closed.funding_cost.raw());
    }

    #[test]
    fn multiplier_change_settles_at_the_old_rate() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(100_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(2_000), lev(10)).unwrap();
        s.engine.advance_time(86_400);
        let projected = s.engine.projected_funding_index(TEST).unwrap();

        s.engine.set_funding_multiplier(ADMIN, TEST, 0).unwrap();
        assert_eq!(s.engine.get_instrument(TEST).unwrap().funding.cumulative, projected);
        assert!(s.engine.set_funding_multiplier(ADMIN, TEST, -1).is_err());
    }
}

/// LP vault, rewards and referrals.
mod vault_tests {
    use super::*;

    #[test]
    fn lock_blocks_early_exit_and_compounding_keeps_it() {
        let mut s = Setup::new(ExchangeConfig::default(), 100_000);
        let shares = s.engine.stake(s.lp).unwrap().shares;
        let err = s.engine.withdraw_vault(s.lp, s.lp, shares).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::LockActive { .. })));

        let router = s.trader(1_000);
        assert!(matches!(
            s.engine.compound_into_vault(router, s.lp, units(100)),
            Err(EngineError::Unauthorized { .. })
        ));
        s.engine.grant_role(ADMIN, Role::RewardRouter, router).unwrap();

        s.engine.advance_time(3_000);
        s.engine.compound_into_vault(router, s.lp, units(100)).unwrap();
        assert_eq!(s.engine.stake(s.lp).unwrap().timestamp, Timestamp::from_secs(0));

        s.engine.advance_time(600);
        let out = s.engine.withdraw_vault(s.lp, s.lp, shares + 1).unwrap();
        assert_eq!(out.paid, units(100_100));
        assert!(out.full);
    }

    #[test]
    fn staking_switch_blocks_deposits() {
        let mut s = Setup::dev(100_000);
        s.engine.set_staking_enabled(ADMIN, false).unwrap();
        let err = s.engine.deposit_vault(s.lp, s.lp, units(1)).unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::StakingDisabled));
    }

    #[test]
    fn referral_rebates_route_and_claim() {
        let mut s = Setup::dev(100_000);
        let referrer = s.trader(1);
        let trader = s.trader(10_000);
        s.referrals.register(
            trader,
            ReferrerInfo {
                referrer,
                referrer_rebate: Bps::new(2_000),
                trader_rebate: Bps::new(1_000),
            },
        );

        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();
        assert_eq!(s.engine.get_account(referrer).unwrap().referral_rebates, units(2));
        assert_eq!(s.engine.get_account(trader).unwrap().referral_rebates, units(1));
        assert_eq!(s.engine.pending_rewards().total(), units(7));

        let claimed = s.engine.claim_referral_rebate(referrer).unwrap();
        assert_eq!(claimed, units(2));
        assert_eq!(s.engine.get_account(referrer).unwrap().referral_rebates, Amount::ZERO);
    }

    #[test]
    fn bad_referral_answer_aborts_the_open() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        s.referrals.register(
            trader,
            ReferrerInfo {
                referrer: s.lp,
                referrer_rebate: Bps::new(8_000),
                trader_rebate: Bps::new(4_000),
            },
        );

        let err = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10))
            .unwrap_err();
        assert!(matches!(err, EngineError::Referral(ReferralError::RebatesExceedFee { .. })));
        assert_eq!(s.balance(trader), units(10_000));
    }

    #[test]
    fn router_drains_reward_pools() {
        let mut s = Setup::dev(100_000);
        let router = s.trader(1);
        s.engine.grant_role(ADMIN, Role::RewardRouter, router).unwrap();
        let trader = s.trader(10_000);
        s.engine.open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10)).unwrap();

        assert_eq!(s.engine.pull_vault_reward(router).unwrap(), units(7));
        assert_eq!(s.engine.pull_staking_reward(router).unwrap(), units(3));
        assert_eq!(s.engine.pending_rewards().total(), Amount::ZERO);
        assert!(matches!(
            s.engine.pull_vault_reward(trader),
            Err(EngineError::Unauthorized { .. })
        ));
    }
}

/// Admin surface.
mod admin_tests {
    use super::*;

    #[test]
    fn only_admin_changes_parameters() {
        let mut s = Setup::dev(100_000);
        let outsider = s.trader(1);

        assert!(matches!(
            s.engine.list_instrument(outsider, flat_instrument(InstrumentId(9))),
            Err(EngineError::Unauthorized { .. })
        ));
        assert!(matches!(
            s.engine.set_trading_paused(outsider, true),
            Err(EngineError::Unauthorized { .. })
        ));
        assert!(matches!(
            s.engine.list_instrument(ADMIN, flat_instrument(TEST)),
            Err(EngineError::Validation(ValidationError::InstrumentAlreadyListed(_)))
        ));
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut s = Setup::dev(100_000);
        let mut config = s.engine.exchange_config().clone();
        config.risk.min_margin = Amount::ZERO;
        assert!(matches!(
            s.engine.update_config(ADMIN, config),
            Err(EngineError::Validation(ValidationError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn vault_limits_apply_to_new_deposits() {
        let mut s = Setup::dev(100_000);
        s.engine.set_vault_limits(ADMIN, units(100_500), 0).unwrap();
        assert_eq!(s.engine.vault().cap, units(100_500));

        let err = s.engine.deposit_vault(s.lp, s.lp, units(1_000)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::VaultCapExceeded { .. })
        ));
        s.engine.deposit_vault(s.lp, s.lp, units(500)).unwrap();
    }

    #[test]
    fn inactive_instrument_refuses_opens() {
        let mut s = Setup::dev(100_000);
        let trader = s.trader(10_000);
        let mut config = flat_instrument(TEST);
        config.active = false;
        s.engine.update_instrument(ADMIN, config).unwrap();

        let err = s
            .engine
            .open_position(trader, trader, TEST, Side::Long, units(1_000), lev(10))
            .unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::InstrumentInactive(TEST)));
    }

    #[test]
    fn managers_trade_for_owners() {
        let mut s = Setup::dev(100_000);
        let owner = s.trader(10_000);
        let manager = s.trader(1);

        assert!(matches!(
            s.engine.open_position(manager, owner, TEST, Side::Long, units(1_000), lev(10)),
            Err(EngineError::Unauthorized { .. })
        ));
        s.engine.grant_role(ADMIN, Role::Manager, manager).unwrap();
        let open = s
            .engine
            .open_position(manager, owner, TEST, Side::Long, units(1_000), lev(10))
            .unwrap();
        assert_eq!(open.key.owner, owner);
        assert_eq!(s.balance(owner), units(8_990));
    }
}
