//! Read-only summaries folded over the players of one session.

use serde::{Deserialize, Serialize};

use crate::{
    clock::Millis,
    ledger::{BalanceSample, Player},
    session::Session,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_players: usize,
    pub active_players: usize,
    pub total_spins: u64,
    pub avg_spins: f64,
    pub avg_coins_left: f64,
    /// `total_wins / total_spins`, 0 when nobody has spun.
    pub win_rate: f64,
    pub avg_play_time_secs: f64,
    pub total_near_misses: u64,
    pub avg_near_misses: f64,
    pub avg_wins: f64,
    pub avg_losses: f64,
    pub players_wanted_to_buy: usize,
    pub avg_net_profit: f64,
}

fn mean(total: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        total / n as f64
    }
}

pub fn aggregate(session: &Session, now_ms: Millis) -> AggregateStats {
    let n = session.player_count();
    let mut total_spins = 0u64;
    let mut total_wins = 0u64;
    let mut total_losses = 0u64;
    let mut total_near_misses = 0u64;
    let mut coins = 0i64;
    let mut play_time = 0.0;
    let mut net = 0i64;
    let mut wanted = 0usize;

    for p in session.players() {
        total_spins += p.spin_count();
        total_wins += p.win_count();
        total_losses += p.loss_count();
        total_near_misses += p.near_miss_count();
        coins += p.balance();
        play_time += p.play_time_secs(now_ms);
        net += p.net_profit();
        if p.wanted_to_buy_since_ms().is_some() {
            wanted += 1;
        }
    }

    AggregateStats {
        total_players: n,
        active_players: session.active_player_count(),
        total_spins,
        avg_spins: mean(total_spins as f64, n),
        avg_coins_left: mean(coins as f64, n),
        win_rate: if total_spins == 0 {
            0.0
        } else {
            total_wins as f64 / total_spins as f64
        },
        avg_play_time_secs: mean(play_time, n),
        total_near_misses,
        avg_near_misses: mean(total_near_misses as f64, n),
        avg_wins: mean(total_wins as f64, n),
        avg_losses: mean(total_losses as f64, n),
        players_wanted_to_buy: wanted,
        avg_net_profit: mean(net as f64, n),
    }
}

/// Balance at `time` by piecewise-linear interpolation over `history`.
///
/// Clamped to the first sample before it and to the last sample after it. On
/// an exact match the (last) sample at that time is returned unchanged.
pub fn interpolate_balance(history: &[BalanceSample], time: f64) -> Option<f64> {
    let first = history.first()?;
    let last = history.last()?;
    if time.is_nan() {
        return None;
    }
    if time < first.time {
        return Some(first.balance as f64);
    }
    if time >= last.time {
        return Some(last.balance as f64);
    }
    // index of the first sample strictly after `time`; >= 1 because first.time <= time
    let after_idx = history.partition_point(|s| s.time <= time);
    let before = &history[after_idx - 1];
    let after = &history[after_idx];
    if before.time == time {
        return Some(before.balance as f64);
    }
    let ratio = (time - before.time) / (after.time - before.time);
    Some(before.balance as f64 + ratio * (after.balance - before.balance) as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSeries {
    pub player_id: String,
    pub balances: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSeries {
    pub time_points: Vec<f64>,
    pub players: Vec<PlayerSeries>,
    pub average: Vec<f64>,
}

/// Upper bound on grid points and histogram buckets in one chart.
pub const MAX_CHART_POINTS: usize = 10_000;

const MIN_BROKE_SPAN_SECS: f64 = 300.0;

fn last_sample_time(p: &Player) -> f64 {
    p.balance_history().last().map_or(0.0, |s| s.time)
}

fn latest_sample_time(session: &Session) -> f64 {
    session
        .players()
        .map(last_sample_time)
        .fold(0.0_f64, f64::max)
}

fn usable_width(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}

/// Number of grid points `balance_over_time` produces for `step_secs`, or
/// `None` when the step is not a positive finite width.
pub fn balance_grid_len(session: &Session, step_secs: f64) -> Option<f64> {
    if !usable_width(step_secs) {
        return None;
    }
    Some((latest_sample_time(session) / step_secs + 1.0).floor() + 1.0)
}

/// Number of buckets `time_to_broke_histogram` produces for `bucket_secs`.
pub fn broke_bucket_count(session: &Session, spin_cost: i64, bucket_secs: f64) -> Option<f64> {
    if !usable_width(bucket_secs) {
        return None;
    }
    let max_time = session
        .players()
        .filter_map(|p| time_to_broke(p, spin_cost))
        .fold(MIN_BROKE_SPAN_SECS, f64::max);
    Some((max_time / bucket_secs).ceil().max(1.0))
}

/// Balance of every player on a regular time grid, plus the average line.
///
/// The average only counts players who have spun at least once and is empty
/// when nobody has. The grid stops at `MAX_CHART_POINTS`.
pub fn balance_over_time(session: &Session, step_secs: f64) -> BalanceSeries {
    if session.player_count() == 0 || !usable_width(step_secs) {
        return BalanceSeries::default();
    }
    let max_time = latest_sample_time(session);

    let mut time_points = Vec::new();
    let mut i = 0u64;
    while time_points.len() < MAX_CHART_POINTS {
        let t = i as f64 * step_secs;
        if t > max_time + step_secs {
            break;
        }
        time_points.push(t);
        i += 1;
    }

    let players: Vec<PlayerSeries> = session
        .players()
        .map(|p| PlayerSeries {
            player_id: p.id().to_string(),
            balances: time_points
                .iter()
                .filter_map(|t| interpolate_balance(p.balance_history(), *t))
                .collect(),
        })
        .collect();

    let spun: Vec<&PlayerSeries> = session
        .players()
        .zip(&players)
        .filter(|(p, _)| p.spin_count() > 0)
        .map(|(_, series)| series)
        .collect();
    let average = if spun.is_empty() {
        Vec::new()
    } else {
        (0..time_points.len())
            .map(|idx| {
                let total: f64 = spun.iter().map(|s| s.balances[idx]).sum();
                total / spun.len() as f64
            })
            .collect()
    };

    BalanceSeries {
        time_points,
        players,
        average,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    pub labels: Vec<String>,
    pub counts: Vec<u64>,
}

/// Seconds until a player's balance first dropped below `spin_cost`.
pub fn time_to_broke(player: &Player, spin_cost: i64) -> Option<f64> {
    if player.spin_count() == 0 {
        return None;
    }
    player
        .balance_history()
        .iter()
        .find(|s| s.balance < spin_cost)
        .map(|s| s.time)
}

/// Distribution of time-to-broke in `bucket_secs` buckets spanning at least
/// five minutes, capped at `MAX_CHART_POINTS` buckets.
pub fn time_to_broke_histogram(session: &Session, spin_cost: i64, bucket_secs: f64) -> Histogram {
    let Some(count) = broke_bucket_count(session, spin_cost, bucket_secs) else {
        return Histogram::default();
    };
    let buckets = count.min(MAX_CHART_POINTS as f64) as usize;

    let mut counts = vec![0u64; buckets];
    for t in session.players().filter_map(|p| time_to_broke(p, spin_cost)) {
        let idx = ((t / bucket_secs).floor() as usize).min(buckets - 1);
        counts[idx] += 1;
    }
    let labels = (0..buckets)
        .map(|i| {
            let start = i as f64 * bucket_secs;
            format!("{}-{}s", start, start + bucket_secs)
        })
        .collect();
    Histogram { labels, counts }
}

fn bucketed(values: impl Iterator<Item = f64>, edges: &[f64], open_last: bool) -> Histogram {
    let n = edges.len() - 1;
    let mut counts = vec![0u64; n];
    for v in values {
        if let Some(i) = (0..n).find(|&i| v >= edges[i] && v < edges[i + 1]) {
            counts[i] += 1;
        } else if open_last && v >= edges[n] {
            counts[n - 1] += 1;
        }
    }
    let labels = (0..n)
        .map(|i| {
            if open_last && i == n - 1 {
                format!("{}+", edges[i])
            } else {
                format!("{}-{}", edges[i], edges[i + 1])
            }
        })
        .collect();
    Histogram { labels, counts }
}

/// Seconds between consecutive spins across every player.
pub fn inter_spin_histogram(session: &Session) -> Histogram {
    const EDGES: [f64; 11] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 15.0, 20.0, 30.0, 60.0];
    let values = session
        .players()
        .flat_map(|p| p.inter_spin_secs().iter().copied());
    bucketed(values, &EDGES, true)
}

/// Current balances in 200-unit bands from 0 to 2000.
pub fn coins_left_distribution(session: &Session) -> Histogram {
    let edges: Vec<f64> = (0..=10).map(|i| f64::from(i * 200)).collect();
    bucketed(session.players().map(|p| p.balance() as f64), &edges, false)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinsLosses {
    pub player_id: String,
    pub wins: u64,
    pub losses: u64,
}

pub fn wins_losses(session: &Session, limit: usize) -> Vec<WinsLosses> {
    session
        .players()
        .take(limit)
        .map(|p| WinsLosses {
            player_id: p.id().to_string(),
            wins: p.win_count(),
            losses: p.loss_count(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub balance_over_time: BalanceSeries,
    pub time_to_broke: Histogram,
    pub inter_spin: Histogram,
    pub coins_left: Histogram,
    pub wins_losses: Vec<WinsLosses>,
}
