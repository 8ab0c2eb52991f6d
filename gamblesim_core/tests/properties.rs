use gamblesim_core::{
    engine, stats, symbols::max_matching, OddsConfig, Outcome, OutcomeKind, Player,
    ProvablyFairRng, Symbol,
};
use proptest::prelude::*;

fn any_outcome() -> impl Strategy<Value = Outcome> {
    let symbol = (0u8..Symbol::ALL.len() as u8).prop_map(Symbol::from_index);
    ([symbol.clone(), symbol.clone(), symbol], any::<bool>(), 0i64..400).prop_map(
        |(symbols, win, payout)| {
            if win {
                Outcome {
                    symbols,
                    kind: OutcomeKind::SmallWin,
                    payout,
                }
            } else {
                let kind = if max_matching(&symbols) == 2 {
                    OutcomeKind::NearMiss
                } else {
                    OutcomeKind::Miss
                };
                Outcome {
                    symbols,
                    kind,
                    payout: 0,
                }
            }
        },
    )
}

proptest! {
    #[test]
    fn ledger_counters_stay_consistent(
        outcomes in prop::collection::vec((any_outcome(), 0u64..20_000), 1..60)
    ) {
        let mut p = Player::new("player_1", 1000, 0);
        let mut now = 0;
        let mut expected_near_misses = 0;
        for (outcome, gap) in &outcomes {
            now += gap;
            let before = p.spin_count();
            p.record_spin(outcome, 40, now).unwrap();
            if p.spin_count() > before
                && !outcome.is_win()
                && max_matching(&outcome.symbols) == 2
            {
                expected_near_misses += 1;
            }
            prop_assert_eq!(p.spin_count(), p.win_count() + p.loss_count());
            prop_assert!(p.balance() >= 0);
        }
        prop_assert_eq!(p.near_miss_count(), expected_near_misses);
        let history = p.balance_history();
        prop_assert_eq!(history[0].time, 0.0);
        prop_assert_eq!(history[0].balance, 1000);
        prop_assert!(history.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn interpolation_stays_within_sample_bounds(
        steps in prop::collection::vec((0u64..10_000, -100i64..100), 1..30),
        query in -10.0f64..400.0,
    ) {
        let mut p = Player::new("player_1", 1000, 0);
        let mut now = 0;
        let mut balance = 1000i64;
        for (gap, delta) in steps {
            now += gap;
            balance = (balance + delta).max(0);
            p.record_balance_sample(balance, gamblesim_core::BalanceEvent::Purchase, now);
        }
        let history = p.balance_history();
        let lo = history.iter().map(|s| s.balance).min().unwrap() as f64;
        let hi = history.iter().map(|s| s.balance).max().unwrap() as f64;
        let v = stats::interpolate_balance(history, query).unwrap();
        prop_assert!(v >= lo && v <= hi);
    }

    #[test]
    fn generated_outcomes_are_well_formed(
        seed in "[a-z0-9]{1,16}",
        spin_index in 0u64..50,
    ) {
        let odds = OddsConfig::default();
        let mut rng = ProvablyFairRng::new(seed, "session:player_1", spin_index);
        let out = engine::spin(spin_index, &odds, &mut rng);
        match out.kind {
            OutcomeKind::BigWin => {
                prop_assert_eq!(max_matching(&out.symbols), 3);
                prop_assert!(odds.paytable.big_win.contains(out.payout));
                prop_assert!(odds.symbols.premium.contains(&out.symbols[0]));
            }
            OutcomeKind::SmallWin => {
                prop_assert_eq!(max_matching(&out.symbols), 3);
                prop_assert!(odds.paytable.small_win.contains(out.payout));
                prop_assert!(odds.symbols.common.contains(&out.symbols[0]));
            }
            OutcomeKind::NearMiss => {
                prop_assert_eq!(max_matching(&out.symbols), 2);
                prop_assert_eq!(out.payout, 0);
            }
            OutcomeKind::Miss => {
                prop_assert_eq!(max_matching(&out.symbols), 1);
                prop_assert_eq!(out.payout, 0);
            }
        }
    }
}
