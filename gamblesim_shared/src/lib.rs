use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use gamblesim_core::{
    GameConfig, LinkError, Millis, OutcomeKind, Player, RegistryError, Session, SessionStatus,
    SpinEntry, Symbol,
};

pub mod store;

pub use store::{SqliteStore, StoreError};

pub fn timestamp(ms: Millis) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_default()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyResponse {
    pub server_seed_hash: String,
}

/// What a player's screen needs to render itself.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerView {
    pub session_id: String,
    pub player_id: String,
    pub balance: i64,
    pub spin_count: u64,
    pub win_count: u64,
    pub loss_count: u64,
    pub near_miss_count: u64,
    pub net_profit: i64,
    pub active: bool,
    pub can_afford_spin: bool,
    pub spin_cost: i64,
    pub top_up_amount: i64,
}

impl PlayerView {
    pub fn new(session_id: &str, player: &Player, config: &GameConfig) -> Self {
        Self {
            session_id: session_id.to_string(),
            player_id: player.id().to_string(),
            balance: player.balance(),
            spin_count: player.spin_count(),
            win_count: player.win_count(),
            loss_count: player.loss_count(),
            near_miss_count: player.near_miss_count(),
            net_profit: player.net_profit(),
            active: player.is_active(),
            can_afford_spin: player.can_afford(config.spin_cost),
            spin_cost: config.spin_cost,
            top_up_amount: config.top_up_amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JoinResponse {
    /// False when the link resumed an existing player.
    pub created: bool,
    pub player: PlayerView,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpinResponse {
    Settled {
        spin_index: u64,
        symbols: [Symbol; 3],
        glyphs: [String; 3],
        kind: OutcomeKind,
        near_miss: bool,
        payout: i64,
        balance: i64,
        server_seed_hash: String,
    },
    InsufficientBalance {
        balance: i64,
        spin_cost: i64,
    },
}

impl SpinResponse {
    pub fn settled(entry: &SpinEntry, server_seed_hash: String) -> Self {
        SpinResponse::Settled {
            spin_index: entry.spin_index,
            symbols: entry.symbols,
            glyphs: entry.symbols.map(|s| s.glyph().to_string()),
            kind: entry.kind,
            near_miss: entry.kind == OutcomeKind::NearMiss,
            payout: entry.payout,
            balance: entry.balance_after,
            server_seed_hash,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EndResponse {
    /// False when the player had already ended.
    pub ended: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub player_count: usize,
    pub active_player_count: usize,
    pub current: bool,
}

impl SessionSummary {
    pub fn new(session: &Session, current_id: &str) -> Self {
        Self {
            id: session.id().to_string(),
            created_at: timestamp(session.created_at_ms()),
            status: session.status(),
            player_count: session.player_count(),
            active_player_count: session.active_player_count(),
            current: session.id() == current_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionsResponse {
    pub current_session_id: String,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LinkResponse {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ChartsQuery {
    pub step_secs: Option<f64>,
    pub bucket_secs: Option<f64>,
}

/// One row of a session's spin log, as printed and exported by the CLI.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinLogEntry {
    pub session_id: String,
    pub player_id: String,
    pub spin_index: u64,
    pub ts: DateTime<Utc>,
    pub symbols: String,
    pub kind: OutcomeKind,
    pub payout: i64,
    pub balance_after: i64,
}

impl SpinLogEntry {
    pub fn new(session_id: &str, player_id: &str, entry: &SpinEntry) -> Self {
        Self {
            session_id: session_id.to_string(),
            player_id: player_id.to_string(),
            spin_index: entry.spin_index,
            ts: timestamp(entry.at_ms),
            symbols: entry
                .symbols
                .iter()
                .map(|s| s.glyph())
                .collect::<Vec<_>>()
                .join(" "),
            kind: entry.kind,
            payout: entry.payout,
            balance_after: entry.balance_after,
        }
    }
}

/// Every spin in `session`, oldest first.
pub fn spin_log(session: &Session) -> Vec<SpinLogEntry> {
    let mut rows: Vec<SpinLogEntry> = session
        .players()
        .flat_map(|p| {
            p.spin_history()
                .iter()
                .map(|e| SpinLogEntry::new(session.id(), p.id(), e))
        })
        .collect();
    rows.sort_by(|a, b| a.ts.cmp(&b.ts));
    rows
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("missing or invalid admin token")]
    Unauthorized,
    #[error("internal server error")]
    Internal,
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::SessionNotFound(_) | RegistryError::PlayerNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            RegistryError::SessionClosed { .. } | RegistryError::Ledger(_) => {
                ApiError::Conflict(err.to_string())
            }
            RegistryError::InvalidPlan(_) | RegistryError::InvalidChart(_) => {
                ApiError::Invalid(err.to_string())
            }
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        ApiError::Invalid(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
