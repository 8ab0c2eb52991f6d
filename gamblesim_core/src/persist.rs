//! The persisted snapshot: `{sessions, currentSessionId, playerIdCounter}`.
//!
//! Writing goes through plain serde records. Reading goes through `TryFrom`
//! so every player and session is rebuilt field by field and checked; a
//! malformed record is dropped with a warning instead of poisoning the rest.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    clock::{elapsed_secs, Clock, Millis},
    config::GameConfig,
    engine::OutcomeKind,
    error::RestoreError,
    ledger::{BalanceEvent, BalanceSample, Player, SpinEntry},
    registry::Registry,
    session::{Session, SessionStatus},
    symbols::Symbol,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState<S = SessionRecord> {
    pub sessions: IndexMap<String, S>,
    #[serde(default)]
    pub current_session_id: Option<String>,
    #[serde(default)]
    pub player_id_counter: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord<P = PlayerRecord> {
    pub id: String,
    pub created_at: Millis,
    #[serde(default)]
    pub seq: Option<u64>,
    pub status: SessionStatus,
    #[serde(default = "IndexMap::new")]
    pub players: IndexMap<String, P>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinRecord {
    pub at: Millis,
    pub spin_index: u64,
    pub symbols: [Symbol; 3],
    pub kind: OutcomeKind,
    pub payout: i64,
    pub balance_after: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub balance: i64,
    pub spin_count: u64,
    pub win_count: u64,
    pub loss_count: u64,
    pub near_miss_count: u64,
    pub total_wagered: i64,
    pub total_payout: i64,
    #[serde(default)]
    pub total_topped_up: i64,
    pub balance_history: Vec<BalanceSample>,
    #[serde(default)]
    pub spin_history: Vec<SpinRecord>,
    #[serde(default)]
    pub time_between_spins: Vec<f64>,
    pub start_time: Millis,
    #[serde(default)]
    pub end_time: Option<Millis>,
    #[serde(default)]
    pub play_duration: f64,
    #[serde(default)]
    pub cant_afford_since: Option<Millis>,
    #[serde(default)]
    pub wanted_to_buy_since: Option<Millis>,
    #[serde(default)]
    pub simulated: bool,
}

impl From<&SpinEntry> for SpinRecord {
    fn from(e: &SpinEntry) -> Self {
        Self {
            at: e.at_ms,
            spin_index: e.spin_index,
            symbols: e.symbols,
            kind: e.kind,
            payout: e.payout,
            balance_after: e.balance_after,
        }
    }
}

impl From<SpinRecord> for SpinEntry {
    fn from(r: SpinRecord) -> Self {
        Self {
            at_ms: r.at,
            spin_index: r.spin_index,
            symbols: r.symbols,
            kind: r.kind,
            payout: r.payout,
            balance_after: r.balance_after,
        }
    }
}

impl From<&Player> for PlayerRecord {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            balance: p.balance,
            spin_count: p.spin_count,
            win_count: p.win_count,
            loss_count: p.loss_count,
            near_miss_count: p.near_miss_count,
            total_wagered: p.total_wagered,
            total_payout: p.total_payout,
            total_topped_up: p.total_topped_up,
            balance_history: p.balance_history.clone(),
            spin_history: p.spin_history.iter().map(SpinRecord::from).collect(),
            time_between_spins: p.inter_spin_secs.clone(),
            start_time: p.start_ms,
            end_time: p.end_ms,
            play_duration: p.play_duration_secs,
            cant_afford_since: p.cant_afford_since_ms,
            wanted_to_buy_since: p.wanted_to_buy_since_ms,
            simulated: p.simulated,
        }
    }
}

impl TryFrom<PlayerRecord> for Player {
    type Error = RestoreError;

    fn try_from(r: PlayerRecord) -> Result<Self, Self::Error> {
        let bad = |why: &'static str| RestoreError::Player(r.id.clone(), why);

        if r.id.is_empty() {
            return Err(bad("empty id"));
        }
        let first = r.balance_history.first().ok_or_else(|| bad("empty balance history"))?;
        if first.time != 0.0 || first.event != BalanceEvent::Start {
            return Err(bad("history must open with a start sample at 0"));
        }
        if r.balance_history.iter().any(|s| !s.time.is_finite())
            || r.balance_history.windows(2).any(|w| w[0].time > w[1].time)
        {
            return Err(bad("balance history goes back in time"));
        }
        if r.spin_count != r.win_count + r.loss_count {
            return Err(bad("spin count does not equal wins plus losses"));
        }
        if r.near_miss_count > r.loss_count {
            return Err(bad("more near misses than losses"));
        }
        if r.spin_history.len() as u64 != r.spin_count {
            return Err(bad("spin history length does not match spin count"));
        }
        if r.time_between_spins.len() as u64 != r.spin_count.saturating_sub(1) {
            return Err(bad("inter-spin deltas do not match spin count"));
        }
        if r.balance_history.last().map(|s| s.balance) != Some(r.balance) {
            return Err(bad("balance differs from the last history sample"));
        }
        if r.balance < 0 || r.total_wagered < 0 || r.total_payout < 0 || r.total_topped_up < 0 {
            return Err(bad("negative amount"));
        }
        if r.end_time.is_some_and(|end| end < r.start_time) {
            return Err(bad("ended before it started"));
        }
        if r.time_between_spins.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(bad("invalid inter-spin delta"));
        }

        let play_duration_secs = match r.end_time {
            Some(end) => elapsed_secs(r.start_time, end),
            None => 0.0,
        };

        Ok(Player {
            id: r.id,
            balance: r.balance,
            spin_count: r.spin_count,
            win_count: r.win_count,
            loss_count: r.loss_count,
            near_miss_count: r.near_miss_count,
            total_wagered: r.total_wagered,
            total_payout: r.total_payout,
            total_topped_up: r.total_topped_up,
            balance_history: r.balance_history,
            spin_history: r.spin_history.into_iter().map(SpinEntry::from).collect(),
            inter_spin_secs: r.time_between_spins,
            start_ms: r.start_time,
            end_ms: r.end_time,
            play_duration_secs,
            cant_afford_since_ms: r.cant_afford_since,
            wanted_to_buy_since_ms: r.wanted_to_buy_since,
            simulated: r.simulated,
        })
    }
}

impl From<&Session> for SessionRecord {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            created_at: s.created_at_ms,
            seq: Some(s.seq),
            status: s.status,
            players: s
                .players
                .iter()
                .map(|(id, p)| (id.clone(), PlayerRecord::from(p)))
                .collect(),
        }
    }
}

/// A session whose players have already been rebuilt.
impl TryFrom<SessionRecord<Player>> for Session {
    type Error = RestoreError;

    fn try_from(r: SessionRecord<Player>) -> Result<Self, Self::Error> {
        if r.id.is_empty() {
            return Err(RestoreError::Session(r.id, "empty id"));
        }
        if let Some((key, p)) = r.players.iter().find(|(key, p)| key.as_str() != p.id()) {
            return Err(RestoreError::KeyMismatch {
                key: key.clone(),
                id: p.id().to_string(),
            });
        }
        if r.status == SessionStatus::Terminated && r.players.values().any(Player::is_active) {
            return Err(RestoreError::Session(
                r.id,
                "terminated with players still active",
            ));
        }
        Ok(Session {
            id: r.id,
            created_at_ms: r.created_at,
            seq: r.seq.unwrap_or(0),
            status: r.status,
            players: r.players,
        })
    }
}

/// Rebuild one session from raw JSON, dropping players that fail validation.
fn restore_session(key: &str, raw: serde_json::Value) -> Result<Session, RestoreError> {
    let record: SessionRecord<serde_json::Value> = serde_json::from_value(raw)?;
    if record.id != key {
        return Err(RestoreError::KeyMismatch {
            key: key.to_string(),
            id: record.id,
        });
    }

    let mut players = IndexMap::with_capacity(record.players.len());
    for (player_key, raw_player) in record.players {
        let restored = serde_json::from_value::<PlayerRecord>(raw_player)
            .map_err(RestoreError::from)
            .and_then(Player::try_from);
        match restored {
            Ok(player) => {
                players.insert(player_key, player);
            }
            Err(err) => {
                warn!(session = %key, player = %player_key, error = %err, "dropping malformed player");
            }
        }
    }

    Session::try_from(SessionRecord {
        id: record.id,
        created_at: record.created_at,
        seq: record.seq,
        status: record.status,
        players,
    })
}

/// Next free `player_<n>` number given what is already in use.
fn next_player_number(sessions: &IndexMap<String, Session>, stored: u64) -> u64 {
    sessions
        .values()
        .flat_map(|s| s.players.keys())
        .filter_map(|id| id.strip_prefix("player_")?.parse::<u64>().ok())
        .map(|n| n + 1)
        .fold(stored.max(1), u64::max)
}

impl Registry {
    pub fn to_state(&self) -> PersistedState {
        PersistedState {
            sessions: self
                .sessions
                .iter()
                .map(|(id, s)| (id.clone(), SessionRecord::from(s)))
                .collect(),
            current_session_id: Some(self.current_session_id.clone()),
            player_id_counter: self.player_id_counter,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_state())
    }

    /// Rebuild a registry from a persisted snapshot.
    ///
    /// Only an unreadable top level is an error. Malformed sessions and players
    /// are skipped and only the newest `max_sessions` survive. A current id
    /// that is missing, unknown or evicted falls back to the newest session.
    pub fn restore(
        json: &str,
        config: GameConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RestoreError> {
        let state: PersistedState<serde_json::Value> = serde_json::from_str(json)?;

        let mut sessions = IndexMap::with_capacity(state.sessions.len());
        for (key, raw) in state.sessions {
            match restore_session(&key, raw) {
                Ok(session) => {
                    sessions.insert(key, session);
                }
                Err(err) => warn!(session = %key, error = %err, "dropping malformed session"),
            }
        }

        // Renumber in creation order; stored position breaks remaining ties.
        let mut order: Vec<(Millis, u64, usize, String)> = sessions
            .values()
            .enumerate()
            .map(|(pos, s)| (s.created_at_ms, s.seq, pos, s.id.clone()))
            .collect();
        order.sort();
        let next_seq = order.len() as u64;
        for (seq, (.., id)) in order.into_iter().enumerate() {
            if let Some(session) = sessions.get_mut(&id) {
                session.seq = seq as u64;
            }
        }

        let player_id_counter = next_player_number(&sessions, state.player_id_counter);
        let mut registry = Self {
            config,
            clock,
            sessions,
            current_session_id: String::new(),
            player_id_counter,
            next_seq,
        };
        registry.retain_newest();

        let current = state
            .current_session_id
            .filter(|id| registry.sessions.contains_key(id))
            .or_else(|| {
                registry
                    .sessions_newest_first()
                    .first()
                    .map(|s| s.id().to_string())
            });
        match current {
            Some(id) => registry.current_session_id = id,
            None => {
                registry.create_session();
            }
        }

        info!(
            sessions = registry.sessions.len(),
            current = %registry.current_session_id,
            "registry restored"
        );
        Ok(registry)
    }

    /// Restore from `json` if present and readable, otherwise start fresh.
    pub fn restore_or_default(
        json: Option<&str>,
        config: GameConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        match json {
            Some(json) => match Self::restore(json, config.clone(), clock.clone()) {
                Ok(registry) => registry,
                Err(err) => {
                    warn!(error = %err, "stored state unreadable, starting fresh");
                    Self::new(config, clock)
                }
            },
            None => Self::new(config, clock),
        }
    }
}
