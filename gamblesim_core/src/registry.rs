use std::sync::Arc;

use indexmap::IndexMap;
use rand::Rng;
use tracing::{debug, info};

use crate::{
    clock::{Clock, Millis},
    config::GameConfig,
    engine,
    error::RegistryError,
    ledger::{BalanceEvent, Player, PlayerId, Settlement},
    rng::{player_client_seed, ProvablyFairRng},
    session::{Session, SessionId},
    stats::{self, AggregateStats, ChartData},
};

/// Owns every session and the players inside them.
///
/// All mutation goes through `&mut self`, so each operation is observed by
/// readers as a single step.
pub struct Registry {
    pub(crate) config: GameConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sessions: IndexMap<SessionId, Session>,
    pub(crate) current_session_id: SessionId,
    pub(crate) player_id_counter: u64,
    pub(crate) next_seq: u64,
}

impl Registry {
    /// A fresh registry holding one new, current session.
    pub fn new(config: GameConfig, clock: Arc<dyn Clock>) -> Self {
        let mut registry = Self {
            config,
            clock,
            sessions: IndexMap::new(),
            current_session_id: SessionId::new(),
            player_id_counter: 1,
            next_seq: 0,
        };
        registry.create_session();
        registry
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn now_ms(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn player_id_counter(&self) -> u64 {
        self.player_id_counter
    }

    // ── Sessions ───────────────────────────────────────────────

    pub fn create_session(&mut self) -> SessionId {
        let now = self.now_ms();
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), now, self.next_seq);
        self.next_seq += 1;
        self.sessions.insert(id.clone(), session);
        self.current_session_id = id.clone();
        info!(session = %id, "session created");
        self.enforce_retention();
        id
    }

    /// Drop the oldest sessions beyond `max_sessions`, never the current one.
    pub(crate) fn enforce_retention(&mut self) -> Vec<SessionId> {
        let mut evicted = Vec::new();
        while self.sessions.len() > self.config.max_sessions {
            let oldest = self
                .sessions
                .values()
                .filter(|s| s.id() != self.current_session_id)
                .fold(None::<&Session>, |oldest, s| match oldest {
                    Some(o) if s.is_newer_than(o) => Some(o),
                    _ => Some(s),
                })
                .map(|s| s.id().to_string());
            let Some(id) = oldest else { break };
            self.sessions.shift_remove(&id);
            info!(session = %id, "session evicted by retention");
            evicted.push(id);
        }
        evicted
    }

    /// Keep only the `max_sessions` newest sessions, whichever is current.
    pub(crate) fn retain_newest(&mut self) -> Vec<SessionId> {
        let evicted: Vec<SessionId> = self
            .sessions_newest_first()
            .into_iter()
            .skip(self.config.max_sessions)
            .map(|s| s.id().to_string())
            .collect();
        for id in &evicted {
            self.sessions.shift_remove(id);
            info!(session = %id, "session evicted by retention");
        }
        evicted
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn sessions_newest_first(&self) -> Vec<&Session> {
        let mut all: Vec<&Session> = self.sessions.values().collect();
        all.sort_by(|a, b| (b.created_at_ms(), b.seq()).cmp(&(a.created_at_ms(), a.seq())));
        all
    }

    pub fn session(&self, id: &str) -> Result<&Session, RegistryError> {
        self.sessions
            .get(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))
    }

    fn session_mut(&mut self, id: &str) -> Result<&mut Session, RegistryError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))
    }

    pub fn current_session_id(&self) -> &str {
        &self.current_session_id
    }

    pub fn current_session(&self) -> &Session {
        // current_session_id always names a live session
        &self.sessions[self.current_session_id.as_str()]
    }

    pub fn switch_session(&mut self, id: &str) -> Result<(), RegistryError> {
        self.session(id)?;
        self.current_session_id = id.to_string();
        Ok(())
    }

    /// Refuse new joins; players already in keep playing. Idempotent.
    pub fn stop_session(&mut self, id: &str) -> Result<(), RegistryError> {
        if self.session_mut(id)?.stop() {
            info!(session = %id, "session stopped");
        }
        Ok(())
    }

    /// Close the session and end every active player. Idempotent.
    pub fn terminate_session(&mut self, id: &str) -> Result<(), RegistryError> {
        let now = self.now_ms();
        let ended = self.session_mut(id)?.terminate(now);
        info!(session = %id, ended, "session terminated");
        Ok(())
    }

    /// Remove a session. Deleting the current session first creates and
    /// selects a replacement, so the current id never dangles.
    pub fn delete_session(&mut self, id: &str) -> Result<(), RegistryError> {
        self.session(id)?;
        self.sessions.shift_remove(id);
        if id == self.current_session_id {
            self.create_session();
        }
        info!(session = %id, current = %self.current_session_id, "session deleted");
        Ok(())
    }

    /// Wipe everything and start over with one new session.
    pub fn reset(&mut self) {
        self.sessions.clear();
        self.player_id_counter = 1;
        self.next_seq = 0;
        self.create_session();
        info!("registry reset");
    }

    // ── Players ────────────────────────────────────────────────

    pub fn add_player(&mut self, session_id: &str) -> Result<PlayerId, RegistryError> {
        let now = self.now_ms();
        self.add_player_at(session_id, now)
    }

    pub(crate) fn add_player_at(
        &mut self,
        session_id: &str,
        now: Millis,
    ) -> Result<PlayerId, RegistryError> {
        let starting_balance = self.config.starting_balance;
        let player_id = format!("player_{}", self.player_id_counter);
        let session = self.session_mut(session_id)?;
        if !session.accepts_players() {
            return Err(RegistryError::SessionClosed {
                id: session_id.to_string(),
                status: session.status(),
            });
        }
        session.insert_player(Player::new(player_id.clone(), starting_balance, now));
        self.player_id_counter += 1;
        info!(session = %session_id, player = %player_id, "player joined");
        Ok(player_id)
    }

    pub fn player(&self, session_id: &str, player_id: &str) -> Result<&Player, RegistryError> {
        self.session(session_id)?
            .player(player_id)
            .ok_or_else(|| RegistryError::PlayerNotFound(player_id.to_string()))
    }

    pub(crate) fn player_mut(
        &mut self,
        session_id: &str,
        player_id: &str,
    ) -> Result<&mut Player, RegistryError> {
        self.session_mut(session_id)?
            .player_mut(player_id)
            .ok_or_else(|| RegistryError::PlayerNotFound(player_id.to_string()))
    }

    pub fn spin<R: Rng + ?Sized>(
        &mut self,
        session_id: &str,
        player_id: &str,
        rng: &mut R,
    ) -> Result<Settlement, RegistryError> {
        let now = self.now_ms();
        self.spin_at(session_id, player_id, rng, now)
    }

    pub(crate) fn spin_at<R: Rng + ?Sized>(
        &mut self,
        session_id: &str,
        player_id: &str,
        rng: &mut R,
        now: Millis,
    ) -> Result<Settlement, RegistryError> {
        let config = &self.config;
        let player = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?
            .player_mut(player_id)
            .ok_or_else(|| RegistryError::PlayerNotFound(player_id.to_string()))?;
        let settlement = player.spin_with(config.spin_cost, now, |spin_index| {
            engine::spin(spin_index, &config.odds, rng)
        })?;
        if let Settlement::Settled(entry) = &settlement {
            debug!(
                session = %session_id,
                player = %player_id,
                kind = ?entry.kind,
                payout = entry.payout,
                balance = entry.balance_after,
                "spin settled"
            );
        }
        Ok(settlement)
    }

    /// Spin using the provably-fair stream for this player and spin index.
    pub fn spin_seeded(
        &mut self,
        session_id: &str,
        player_id: &str,
        server_seed: &str,
    ) -> Result<Settlement, RegistryError> {
        let nonce = self.player(session_id, player_id)?.spin_count();
        let mut rng = ProvablyFairRng::new(
            server_seed,
            player_client_seed(session_id, player_id),
            nonce,
        );
        self.spin(session_id, player_id, &mut rng)
    }

    /// "Buy more": credit the configured top-up. Returns the new balance.
    pub fn top_up(&mut self, session_id: &str, player_id: &str) -> Result<i64, RegistryError> {
        let now = self.now_ms();
        let amount = self.config.top_up_amount;
        let balance = self.player_mut(session_id, player_id)?.top_up(amount, now)?;
        info!(session = %session_id, player = %player_id, balance, "player topped up");
        Ok(balance)
    }

    pub fn record_want_to_buy(
        &mut self,
        session_id: &str,
        player_id: &str,
    ) -> Result<(), RegistryError> {
        let now = self.now_ms();
        self.player_mut(session_id, player_id)?
            .record_want_to_buy(now);
        Ok(())
    }

    /// Player leaves on their own. Returns false if they had already ended.
    pub fn end_player(&mut self, session_id: &str, player_id: &str) -> Result<bool, RegistryError> {
        self.close_player(session_id, player_id, BalanceEvent::End)
    }

    /// Admin stops a single player.
    pub fn stop_player(&mut self, session_id: &str, player_id: &str) -> Result<bool, RegistryError> {
        self.close_player(session_id, player_id, BalanceEvent::Stopped)
    }

    fn close_player(
        &mut self,
        session_id: &str,
        player_id: &str,
        event: BalanceEvent,
    ) -> Result<bool, RegistryError> {
        let now = self.now_ms();
        let ended = self.player_mut(session_id, player_id)?.end_with(event, now);
        if ended {
            info!(session = %session_id, player = %player_id, ?event, "player ended");
        }
        Ok(ended)
    }

    // ── Statistics ─────────────────────────────────────────────

    pub fn stats(&self, session_id: &str) -> Result<AggregateStats, RegistryError> {
        Ok(stats::aggregate(self.session(session_id)?, self.now_ms()))
    }

    pub fn charts(
        &self,
        session_id: &str,
        step_secs: f64,
        bucket_secs: f64,
    ) -> Result<ChartData, RegistryError> {
        let session = self.session(session_id)?;
        check_chart_width(
            stats::balance_grid_len(session, step_secs),
            "step_secs must be positive, finite and yield at most 10000 points",
        )?;
        check_chart_width(
            stats::broke_bucket_count(session, self.config.spin_cost, bucket_secs),
            "bucket_secs must be positive, finite and yield at most 10000 buckets",
        )?;
        Ok(ChartData {
            balance_over_time: stats::balance_over_time(session, step_secs),
            time_to_broke: stats::time_to_broke_histogram(
                session,
                self.config.spin_cost,
                bucket_secs,
            ),
            inter_spin: stats::inter_spin_histogram(session),
            coins_left: stats::coins_left_distribution(session),
            wins_losses: stats::wins_losses(session, 10),
        })
    }
}

fn check_chart_width(count: Option<f64>, why: &'static str) -> Result<(), RegistryError> {
    match count {
        Some(n) if n <= stats::MAX_CHART_POINTS as f64 => Ok(()),
        _ => Err(RegistryError::InvalidChart(why)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, error::LedgerError, session::SessionStatus};
    use rand::{rngs::StdRng, SeedableRng};

    fn registry() -> (Registry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (Registry::new(GameConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn starts_with_one_current_session() {
        let (reg, _) = registry();
        assert_eq!(reg.sessions().count(), 1);
        assert_eq!(reg.current_session().id(), reg.current_session_id());
    }

    #[test]
    fn stopped_session_refuses_joins_but_allows_spins() {
        let (mut reg, _) = registry();
        let sid = reg.current_session_id().to_string();
        let pid = reg.add_player(&sid).unwrap();
        reg.stop_session(&sid).unwrap();
        reg.stop_session(&sid).unwrap();
        assert!(matches!(
            reg.add_player(&sid),
            Err(RegistryError::SessionClosed {
                status: SessionStatus::Stopped,
                ..
            })
        ));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            reg.spin(&sid, &pid, &mut rng).unwrap(),
            Settlement::Settled(_)
        ));
    }

    #[test]
    fn terminate_ends_players_and_blocks_spins() {
        let (mut reg, clock) = registry();
        let sid = reg.current_session_id().to_string();
        let pid = reg.add_player(&sid).unwrap();
        clock.advance(3_000);
        reg.terminate_session(&sid).unwrap();
        reg.terminate_session(&sid).unwrap();
        let p = reg.player(&sid, &pid).unwrap();
        assert_eq!(p.end_ms(), Some(1_003_000));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            reg.spin(&sid, &pid, &mut rng),
            Err(RegistryError::Ledger(LedgerError::Ended(pid.clone())))
        );
    }

    #[test]
    fn unknown_ids_are_never_fabricated() {
        let (mut reg, _) = registry();
        let sid = reg.current_session_id().to_string();
        assert_eq!(
            reg.player(&sid, "player_99").unwrap_err(),
            RegistryError::PlayerNotFound("player_99".into())
        );
        assert_eq!(
            reg.add_player("nope").unwrap_err(),
            RegistryError::SessionNotFound("nope".into())
        );
        assert_eq!(reg.session(&sid).unwrap().player_count(), 0);
    }

    #[test]
    fn player_ids_count_up_across_sessions() {
        let (mut reg, _) = registry();
        let first = reg.current_session_id().to_string();
        assert_eq!(reg.add_player(&first).unwrap(), "player_1");
        let second = reg.create_session();
        assert_eq!(reg.add_player(&second).unwrap(), "player_2");
        assert_eq!(reg.player_id_counter(), 3);
    }

    #[test]
    fn delete_other_session_keeps_current() {
        let (mut reg, _) = registry();
        let old = reg.current_session_id().to_string();
        let current = reg.create_session();
        reg.delete_session(&old).unwrap();
        assert_eq!(reg.current_session_id(), current);
        assert_eq!(reg.sessions().count(), 1);
        assert!(reg.delete_session(&old).is_err());
    }

    #[test]
    fn seeded_spins_are_reproducible() {
        let (mut a, _) = registry();
        let (mut b, _) = registry();
        let sa = a.current_session_id().to_string();
        let pa = a.add_player(&sa).unwrap();
        // same ids on both sides so the seeds line up
        b.sessions.clear();
        b.sessions
            .insert(sa.clone(), Session::new(sa.clone(), 1_000_000, 0));
        b.current_session_id = sa.clone();
        let pb = b.add_player(&sa).unwrap();
        assert_eq!(pa, pb);
        for _ in 0..10 {
            assert_eq!(
                a.spin_seeded(&sa, &pa, "seed").unwrap(),
                b.spin_seeded(&sa, &pb, "seed").unwrap()
            );
        }
    }

    #[test]
    fn reset_starts_over() {
        let (mut reg, _) = registry();
        let sid = reg.current_session_id().to_string();
        reg.add_player(&sid).unwrap();
        reg.create_session();
        reg.reset();
        assert_eq!(reg.sessions().count(), 1);
        assert_eq!(reg.player_id_counter(), 1);
        assert_ne!(reg.current_session_id(), sid);
    }

    #[test]
    fn charts_reject_unbounded_widths() {
        let (mut reg, _) = registry();
        let sid = reg.current_session_id().to_string();
        reg.add_player(&sid).unwrap();
        for (step, bucket) in [(f64::INFINITY, 30.0), (5.0, 1e-300), (1e-300, 30.0), (5.0, f64::NAN)] {
            assert!(matches!(
                reg.charts(&sid, step, bucket),
                Err(RegistryError::InvalidChart(_))
            ));
        }
        assert!(reg.charts(&sid, 5.0, 30.0).is_ok());
    }
}
