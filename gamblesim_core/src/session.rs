use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    clock::Millis,
    ledger::{BalanceEvent, Player, PlayerId},
};

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stopped,
    Terminated,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Terminated => "terminated",
        };
        f.pad(s)
    }
}

/// A group of players sharing one run of the demo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) created_at_ms: Millis,
    /// Creation order within the registry; breaks ties between equal timestamps.
    pub(crate) seq: u64,
    pub(crate) status: SessionStatus,
    pub(crate) players: IndexMap<PlayerId, Player>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, created_at_ms: Millis, seq: u64) -> Self {
        Self {
            id: id.into(),
            created_at_ms,
            seq,
            status: SessionStatus::Active,
            players: IndexMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at_ms(&self) -> Millis {
        self.created_at_ms
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn accepts_players(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub(crate) fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn active_player_count(&self) -> usize {
        self.players.values().filter(|p| p.is_active()).count()
    }

    pub(crate) fn insert_player(&mut self, player: Player) {
        self.players.insert(player.id().to_string(), player);
    }

    /// Block new joins. A terminated session stays terminated.
    pub(crate) fn stop(&mut self) -> bool {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Stopped;
            true
        } else {
            false
        }
    }

    /// Close the session and end every player still playing.
    pub(crate) fn terminate(&mut self, now_ms: Millis) -> usize {
        self.status = SessionStatus::Terminated;
        self.players
            .values_mut()
            .map(|p| p.end_with(BalanceEvent::Terminated, now_ms))
            .filter(|ended| *ended)
            .count()
    }

    pub(crate) fn is_newer_than(&self, other: &Session) -> bool {
        (self.created_at_ms, self.seq) > (other.created_at_ms, other.seq)
    }
}
