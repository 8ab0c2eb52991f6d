//! Per-player ledger: balance, counters and the append-only histories the
//! admin views are built from.

use serde::{Deserialize, Serialize};

use crate::{
    clock::{elapsed_secs, Millis},
    engine::{Outcome, OutcomeKind},
    error::LedgerError,
    symbols::Symbol,
};

pub type PlayerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceEvent {
    Start,
    Win,
    Loss,
    Purchase,
    End,
    Stopped,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSample {
    /// Seconds since the player joined.
    pub time: f64,
    pub balance: i64,
    pub event: BalanceEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinEntry {
    pub at_ms: Millis,
    pub spin_index: u64,
    pub symbols: [Symbol; 3],
    pub kind: OutcomeKind,
    pub payout: i64,
    pub balance_after: i64,
}

/// Result of offering a finished outcome to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Settled(SpinEntry),
    InsufficientBalance { balance: i64, spin_cost: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub(crate) id: PlayerId,
    pub(crate) balance: i64,
    pub(crate) spin_count: u64,
    pub(crate) win_count: u64,
    pub(crate) loss_count: u64,
    pub(crate) near_miss_count: u64,
    pub(crate) total_wagered: i64,
    pub(crate) total_payout: i64,
    pub(crate) total_topped_up: i64,
    pub(crate) balance_history: Vec<BalanceSample>,
    pub(crate) spin_history: Vec<SpinEntry>,
    pub(crate) inter_spin_secs: Vec<f64>,
    pub(crate) start_ms: Millis,
    pub(crate) end_ms: Option<Millis>,
    pub(crate) play_duration_secs: f64,
    pub(crate) cant_afford_since_ms: Option<Millis>,
    pub(crate) wanted_to_buy_since_ms: Option<Millis>,
    /// Played by `Registry::simulate`, not through the seeded stream.
    pub(crate) simulated: bool,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, starting_balance: i64, start_ms: Millis) -> Self {
        Self {
            id: id.into(),
            balance: starting_balance,
            spin_count: 0,
            win_count: 0,
            loss_count: 0,
            near_miss_count: 0,
            total_wagered: 0,
            total_payout: 0,
            total_topped_up: 0,
            balance_history: vec![BalanceSample {
                time: 0.0,
                balance: starting_balance,
                event: BalanceEvent::Start,
            }],
            spin_history: Vec::new(),
            inter_spin_secs: Vec::new(),
            start_ms,
            end_ms: None,
            play_duration_secs: 0.0,
            cant_afford_since_ms: None,
            wanted_to_buy_since_ms: None,
            simulated: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn spin_count(&self) -> u64 {
        self.spin_count
    }

    pub fn win_count(&self) -> u64 {
        self.win_count
    }

    pub fn loss_count(&self) -> u64 {
        self.loss_count
    }

    pub fn near_miss_count(&self) -> u64 {
        self.near_miss_count
    }

    pub fn total_wagered(&self) -> i64 {
        self.total_wagered
    }

    pub fn total_payout(&self) -> i64 {
        self.total_payout
    }

    pub fn total_topped_up(&self) -> i64 {
        self.total_topped_up
    }

    pub fn balance_history(&self) -> &[BalanceSample] {
        &self.balance_history
    }

    pub fn spin_history(&self) -> &[SpinEntry] {
        &self.spin_history
    }

    pub fn inter_spin_secs(&self) -> &[f64] {
        &self.inter_spin_secs
    }

    pub fn start_ms(&self) -> Millis {
        self.start_ms
    }

    pub fn end_ms(&self) -> Option<Millis> {
        self.end_ms
    }

    pub fn play_duration_secs(&self) -> f64 {
        self.play_duration_secs
    }

    pub fn cant_afford_since_ms(&self) -> Option<Millis> {
        self.cant_afford_since_ms
    }

    pub fn wanted_to_buy_since_ms(&self) -> Option<Millis> {
        self.wanted_to_buy_since_ms
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    pub fn is_active(&self) -> bool {
        self.end_ms.is_none()
    }

    pub fn can_afford(&self, spin_cost: i64) -> bool {
        self.balance >= spin_cost
    }

    /// Play time so far: the recorded duration once ended, elapsed time otherwise.
    pub fn play_time_secs(&self, now_ms: Millis) -> f64 {
        match self.end_ms {
            Some(_) => self.play_duration_secs,
            None => elapsed_secs(self.start_ms, now_ms),
        }
    }

    /// Winnings minus wagers. Top-ups are not winnings and do not count.
    pub fn net_profit(&self) -> i64 {
        self.total_payout - self.total_wagered
    }

    pub fn average_inter_spin_secs(&self) -> f64 {
        if self.inter_spin_secs.is_empty() {
            return 0.0;
        }
        self.inter_spin_secs.iter().sum::<f64>() / self.inter_spin_secs.len() as f64
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LedgerError::Ended(self.id.clone()))
        }
    }

    fn sample_time(&self, now_ms: Millis) -> f64 {
        let t = elapsed_secs(self.start_ms, now_ms);
        let last = self.balance_history.last().map_or(0.0, |s| s.time);
        t.max(last)
    }

    fn mark_cant_afford(&mut self, spin_cost: i64, now_ms: Millis) {
        if self.balance < spin_cost && self.cant_afford_since_ms.is_none() {
            self.cant_afford_since_ms = Some(now_ms);
        }
    }

    /// Settle a finished outcome: charge the spin, credit the payout, bump the
    /// counters and append one spin entry plus one balance sample.
    ///
    /// Nothing is deducted when the balance does not cover `spin_cost`.
    pub fn record_spin(
        &mut self,
        outcome: &Outcome,
        spin_cost: i64,
        now_ms: Millis,
    ) -> Result<Settlement, LedgerError> {
        self.ensure_active()?;
        if !self.can_afford(spin_cost) {
            self.mark_cant_afford(spin_cost, now_ms);
            return Ok(Settlement::InsufficientBalance {
                balance: self.balance,
                spin_cost,
            });
        }

        if let Some(last) = self.spin_history.last() {
            self.inter_spin_secs.push(elapsed_secs(last.at_ms, now_ms));
        }

        let spin_index = self.spin_count;
        self.balance = self.balance - spin_cost + outcome.payout;
        self.total_wagered += spin_cost;
        self.total_payout += outcome.payout;
        self.spin_count += 1;

        let event = if outcome.is_win() {
            self.win_count += 1;
            BalanceEvent::Win
        } else {
            self.loss_count += 1;
            if outcome.is_near_miss() {
                self.near_miss_count += 1;
            }
            BalanceEvent::Loss
        };

        let entry = SpinEntry {
            at_ms: now_ms,
            spin_index,
            symbols: outcome.symbols,
            kind: outcome.kind,
            payout: outcome.payout,
            balance_after: self.balance,
        };
        self.spin_history.push(entry.clone());
        self.record_balance_sample(self.balance, event, now_ms);
        self.mark_cant_afford(spin_cost, now_ms);

        Ok(Settlement::Settled(entry))
    }

    /// Generate and settle a spin in one step. `make_outcome` receives the
    /// 0-based spin index and is only called when the spin can be paid for.
    pub fn spin_with<F>(
        &mut self,
        spin_cost: i64,
        now_ms: Millis,
        make_outcome: F,
    ) -> Result<Settlement, LedgerError>
    where
        F: FnOnce(u64) -> Outcome,
    {
        self.ensure_active()?;
        if !self.can_afford(spin_cost) {
            self.mark_cant_afford(spin_cost, now_ms);
            return Ok(Settlement::InsufficientBalance {
                balance: self.balance,
                spin_cost,
            });
        }
        let outcome = make_outcome(self.spin_count);
        self.record_spin(&outcome, spin_cost, now_ms)
    }

    pub fn record_balance_sample(&mut self, balance: i64, event: BalanceEvent, now_ms: Millis) {
        let time = self.sample_time(now_ms);
        self.balance = balance;
        self.balance_history.push(BalanceSample {
            time,
            balance,
            event,
        });
    }

    pub fn record_want_to_buy(&mut self, now_ms: Millis) {
        if self.wanted_to_buy_since_ms.is_none() {
            self.wanted_to_buy_since_ms = Some(now_ms);
        }
    }

    /// Add `amount` to the balance ("buy more"). Returns the new balance.
    pub fn top_up(&mut self, amount: i64, now_ms: Millis) -> Result<i64, LedgerError> {
        self.ensure_active()?;
        self.record_want_to_buy(now_ms);
        self.total_topped_up += amount;
        self.record_balance_sample(self.balance + amount, BalanceEvent::Purchase, now_ms);
        Ok(self.balance)
    }

    pub fn end_session(&mut self, now_ms: Millis) -> bool {
        self.end_with(BalanceEvent::End, now_ms)
    }

    /// Close the player's session. Returns false if it was already closed.
    pub fn end_with(&mut self, event: BalanceEvent, now_ms: Millis) -> bool {
        if self.end_ms.is_some() {
            return false;
        }
        let end_ms = now_ms.max(self.start_ms);
        self.end_ms = Some(end_ms);
        self.play_duration_secs = elapsed_secs(self.start_ms, end_ms);

        let last_time = self.balance_history.last().map_or(0.0, |s| s.time);
        if last_time < self.play_duration_secs {
            self.balance_history.push(BalanceSample {
                time: self.play_duration_secs,
                balance: self.balance,
                event,
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Symbol::*;

    fn loss(symbols: [Symbol; 3]) -> Outcome {
        let kind = if crate::symbols::max_matching(&symbols) == 2 {
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

    fn win(payout: i64) -> Outcome {
        Outcome {
            symbols: [Cherry, Cherry, Cherry],
            kind: OutcomeKind::SmallWin,
            payout,
        }
    }

    #[test]
    fn new_player_starts_with_one_sample() {
        let p = Player::new("player_1", 1000, 5_000);
        assert_eq!(p.balance_history().len(), 1);
        assert_eq!(p.balance_history()[0].time, 0.0);
        assert_eq!(p.balance_history()[0].balance, 1000);
        assert!(p.is_active());
    }

    #[test]
    fn forced_loss_deducts_cost() {
        let mut p = Player::new("player_1", 1000, 0);
        let settled = p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 1_000).unwrap();
        assert!(matches!(settled, Settlement::Settled(_)));
        assert_eq!(p.balance(), 960);
        assert_eq!(p.spin_count(), 1);
        assert_eq!(p.loss_count(), 1);
        assert_eq!(p.win_count(), 0);
        assert_eq!(p.near_miss_count(), 0);
        assert_eq!(p.balance_history().len(), 2);
        assert_eq!(p.spin_history().len(), 1);
    }

    #[test]
    fn win_with_top_up_keeps_net_profit_clean() {
        let mut p = Player::new("player_1", 1000, 0);
        p.record_spin(&win(75), 40, 1_000).unwrap();
        assert_eq!(p.balance(), 1035);
        assert_eq!(p.net_profit(), 35);
        p.top_up(500, 2_000).unwrap();
        assert_eq!(p.balance(), 1535);
        assert_eq!(p.net_profit(), 35);
        assert_eq!(p.total_topped_up(), 500);
        assert!(p.wanted_to_buy_since_ms().is_some());
    }

    #[test]
    fn near_miss_only_counts_pairs_on_losses() {
        let mut p = Player::new("player_1", 1000, 0);
        p.record_spin(&loss([Cherry, Cherry, Lemon]), 40, 1).unwrap();
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 2).unwrap();
        p.record_spin(&win(60), 40, 3).unwrap();
        assert_eq!(p.near_miss_count(), 1);
        assert_eq!(p.spin_count(), p.win_count() + p.loss_count());
    }

    #[test]
    fn broke_player_is_not_charged() {
        let mut p = Player::new("player_1", 50, 0);
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 1_000).unwrap();
        assert_eq!(p.balance(), 10);
        assert_eq!(p.cant_afford_since_ms(), Some(1_000));
        let second = p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 2_000).unwrap();
        assert_eq!(
            second,
            Settlement::InsufficientBalance {
                balance: 10,
                spin_cost: 40
            }
        );
        assert_eq!(p.balance(), 10);
        assert_eq!(p.spin_count(), 1);
        assert_eq!(p.cant_afford_since_ms(), Some(1_000));
    }

    #[test]
    fn inter_spin_average() {
        let mut p = Player::new("player_1", 1000, 0);
        assert_eq!(p.average_inter_spin_secs(), 0.0);
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 1_000).unwrap();
        assert_eq!(p.average_inter_spin_secs(), 0.0);
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 3_000).unwrap();
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 7_000).unwrap();
        assert_eq!(p.inter_spin_secs(), &[2.0, 4.0]);
        assert_eq!(p.average_inter_spin_secs(), 3.0);
    }

    #[test]
    fn end_session_is_idempotent() {
        let mut p = Player::new("player_1", 1000, 0);
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 1_000).unwrap();
        assert!(p.end_session(10_000));
        let snapshot = (p.end_ms(), p.play_duration_secs(), p.balance_history().len());
        assert!(!p.end_session(20_000));
        assert_eq!(
            snapshot,
            (p.end_ms(), p.play_duration_secs(), p.balance_history().len())
        );
        assert_eq!(p.play_duration_secs(), 10.0);
        let last = p.balance_history().last().unwrap();
        assert_eq!(last.event, BalanceEvent::End);
        assert_eq!(last.time, 10.0);
    }

    #[test]
    fn end_at_last_sample_time_adds_nothing() {
        let mut p = Player::new("player_1", 1000, 0);
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 4_000).unwrap();
        p.end_session(4_000);
        assert_eq!(p.balance_history().len(), 2);
    }

    #[test]
    fn ended_player_rejects_writes() {
        let mut p = Player::new("player_1", 1000, 0);
        p.end_session(1);
        assert_eq!(
            p.record_spin(&win(60), 40, 2),
            Err(LedgerError::Ended("player_1".into()))
        );
        assert!(p.top_up(500, 2).is_err());
    }

    #[test]
    fn backwards_clock_keeps_history_ordered() {
        let mut p = Player::new("player_1", 1000, 10_000);
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 15_000).unwrap();
        p.record_spin(&loss([Cherry, Lemon, Grape]), 40, 12_000).unwrap();
        let times: Vec<f64> = p.balance_history().iter().map(|s| s.time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
