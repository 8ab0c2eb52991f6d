use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::OddsConfig,
    paytable::PayoutRange,
    rng::ProvablyFairRng,
    symbols::{max_matching, Symbol},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    BigWin,
    SmallWin,
    NearMiss,
    Miss,
}

impl OutcomeKind {
    pub fn is_win(self) -> bool {
        matches!(self, OutcomeKind::BigWin | OutcomeKind::SmallWin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub symbols: [Symbol; 3],
    pub kind: OutcomeKind,
    pub payout: i64,
}

impl Outcome {
    pub fn is_win(&self) -> bool {
        self.kind.is_win()
    }

    /// A losing triple with exactly two equal positions.
    pub fn is_near_miss(&self) -> bool {
        !self.is_win() && max_matching(&self.symbols) == 2
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, pool: &[Symbol]) -> Symbol {
    pool[rng.gen_range(0..pool.len())]
}

fn draw_payout<R: Rng + ?Sized>(rng: &mut R, range: PayoutRange) -> i64 {
    rng.gen_range(range.min..=range.max)
}

fn winning_line<R: Rng + ?Sized>(rng: &mut R, pool: &[Symbol]) -> [Symbol; 3] {
    let sym = pick(rng, pool);
    [sym, sym, sym]
}

fn near_miss_line<R: Rng + ?Sized>(rng: &mut R, all: &[Symbol]) -> [Symbol; 3] {
    let pair = pick(rng, all);
    let odd_slot = rng.gen_range(0..3);
    let rest: Vec<Symbol> = all.iter().copied().filter(|s| *s != pair).collect();
    let odd = pick(rng, &rest);
    let mut line = [pair; 3];
    line[odd_slot] = odd;
    line
}

fn miss_line<R: Rng + ?Sized>(rng: &mut R, all: &[Symbol]) -> [Symbol; 3] {
    if all.len() >= 3 {
        let mut remaining = all.to_vec();
        let mut line = [all[0]; 3];
        for slot in line.iter_mut() {
            let idx = rng.gen_range(0..remaining.len());
            *slot = remaining.remove(idx);
        }
        line
    } else {
        loop {
            let line = [pick(rng, all), pick(rng, all), pick(rng, all)];
            if max_matching(&line) < 3 {
                return line;
            }
        }
    }
}

/// Produce one outcome for the `spin_index`-th spin of a player (0-based).
///
/// The result depends only on `odds` and the values drawn from `rng`. The
/// config is expected to have passed [`OddsConfig::validate`].
pub fn spin<R: Rng + ?Sized>(spin_index: u64, odds: &OddsConfig, rng: &mut R) -> Outcome {
    let win_draw: f64 = rng.gen();
    if win_draw < odds.win_chance_for(spin_index) {
        let big = rng.gen::<f64>() < odds.big_win_chance_given_win;
        let (pool, range, kind) = if big {
            (
                odds.symbols.big_win_pool(),
                odds.paytable.big_win,
                OutcomeKind::BigWin,
            )
        } else {
            (
                odds.symbols.small_win_pool(),
                odds.paytable.small_win,
                OutcomeKind::SmallWin,
            )
        };
        let symbols = winning_line(rng, &pool);
        let payout = draw_payout(rng, range);
        return Outcome {
            symbols,
            kind,
            payout,
        };
    }

    let all = odds.symbols.all();
    if rng.gen::<f64>() < odds.near_miss_chance_given_loss {
        Outcome {
            symbols: near_miss_line(rng, &all),
            kind: OutcomeKind::NearMiss,
            payout: 0,
        }
    } else {
        Outcome {
            symbols: miss_line(rng, &all),
            kind: OutcomeKind::Miss,
            payout: 0,
        }
    }
}

/// Convenience: perform a spin creating the RNG from seeds.
pub fn spin_with_seeds(
    server_seed: &str,
    client_seed: &str,
    spin_index: u64,
    odds: &OddsConfig,
) -> Outcome {
    let mut rng = ProvablyFairRng::new(server_seed, client_seed, spin_index);
    spin(spin_index, odds, &mut rng)
}

/// Verify that a recorded outcome matches what the RNG would produce for the seeds.
pub fn verify_outcome(
    server_seed: &str,
    client_seed: &str,
    spin_index: u64,
    odds: &OddsConfig,
    expected: &Outcome,
) -> bool {
    spin_with_seeds(server_seed, client_seed, spin_index, odds) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolSet;
    use rand::{rngs::StdRng, SeedableRng};

    fn always_win(big: f64) -> OddsConfig {
        OddsConfig {
            early_win_chance: 1.0,
            normal_win_chance: 1.0,
            big_win_chance_given_win: big,
            ..OddsConfig::default()
        }
    }

    fn always_lose(near_miss: f64) -> OddsConfig {
        OddsConfig {
            early_win_chance: 0.0,
            normal_win_chance: 0.0,
            near_miss_chance_given_loss: near_miss,
            ..OddsConfig::default()
        }
    }

    #[test]
    fn test_spin_deterministic() {
        let odds = OddsConfig::default();
        let out1 = spin_with_seeds("server", "client", 1, &odds);
        let out2 = spin_with_seeds("server", "client", 1, &odds);
        assert_eq!(out1, out2);
    }

    #[test]
    fn big_wins_use_premium_symbols() {
        let odds = always_win(1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..200 {
            let out = spin(i, &odds, &mut rng);
            assert_eq!(out.kind, OutcomeKind::BigWin);
            assert!(odds.symbols.premium.contains(&out.symbols[0]));
            assert_eq!(max_matching(&out.symbols), 3);
            assert!(odds.paytable.big_win.contains(out.payout));
        }
    }

    #[test]
    fn small_wins_use_common_symbols() {
        let odds = always_win(0.0);
        let mut rng = StdRng::seed_from_u64(8);
        for i in 0..200 {
            let out = spin(i, &odds, &mut rng);
            assert_eq!(out.kind, OutcomeKind::SmallWin);
            assert!(odds.symbols.common.contains(&out.symbols[0]));
            assert!(odds.paytable.small_win.contains(out.payout));
        }
    }

    #[test]
    fn near_misses_have_exactly_one_odd_symbol() {
        let odds = always_lose(1.0);
        let mut rng = StdRng::seed_from_u64(9);
        let mut odd_slots = [0usize; 3];
        for i in 0..600 {
            let out = spin(i, &odds, &mut rng);
            assert_eq!(out.kind, OutcomeKind::NearMiss);
            assert_eq!(out.payout, 0);
            assert!(out.is_near_miss());
            let [a, b, c] = out.symbols;
            let slot = if a == b { 2 } else if a == c { 1 } else { 0 };
            odd_slots[slot] += 1;
        }
        // every slot gets picked, not just the first or last one
        assert!(odd_slots.iter().all(|n| *n > 100));
    }

    #[test]
    fn full_misses_never_match() {
        let odds = always_lose(0.0);
        let mut rng = StdRng::seed_from_u64(10);
        for i in 0..500 {
            let out = spin(i, &odds, &mut rng);
            assert_eq!(out.kind, OutcomeKind::Miss);
            assert_eq!(max_matching(&out.symbols), 1);
        }
    }

    #[test]
    fn two_symbol_set_rejects_lines() {
        let odds = OddsConfig {
            symbols: SymbolSet::unpartitioned(vec![Symbol::Cherry, Symbol::Lemon]),
            ..always_lose(0.0)
        };
        let mut rng = StdRng::seed_from_u64(11);
        for i in 0..200 {
            let out = spin(i, &odds, &mut rng);
            assert_eq!(out.kind, OutcomeKind::Miss);
            assert_eq!(max_matching(&out.symbols), 2);
        }
    }

    #[test]
    fn early_window_boosts_win_rate() {
        let odds = OddsConfig::default();
        let mut rng = StdRng::seed_from_u64(12);
        let n = 20_000;
        let early = (0..n).filter(|_| spin(0, &odds, &mut rng).is_win()).count();
        let late = (0..n).filter(|_| spin(10, &odds, &mut rng).is_win()).count();
        let early_rate = early as f64 / n as f64;
        let late_rate = late as f64 / n as f64;
        assert!((early_rate - 0.30).abs() < 0.02, "early rate {early_rate}");
        assert!((late_rate - 0.10).abs() < 0.02, "late rate {late_rate}");
    }

    #[test]
    fn verify_detects_tampering() {
        let odds = OddsConfig::default();
        let mut out = spin_with_seeds("server", "session:player_1", 3, &odds);
        assert!(verify_outcome("server", "session:player_1", 3, &odds, &out));
        out.payout += 1;
        assert!(!verify_outcome("server", "session:player_1", 3, &odds, &out));
    }
}
