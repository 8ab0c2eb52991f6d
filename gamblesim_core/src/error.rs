use crate::session::SessionStatus;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("payout range {0} must satisfy 0 <= min <= max")]
    PayoutRange(&'static str),
    #[error("symbol set needs at least 2 symbols, got {0}")]
    TooFewSymbols(usize),
    #[error("symbol set contains duplicates")]
    DuplicateSymbols,
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LedgerError {
    #[error("player {0} has already ended their session")]
    Ended(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid session: {0}")]
    SessionNotFound(String),
    #[error("invalid player: {0}")]
    PlayerNotFound(String),
    #[error("session {id} is {status} and does not accept new players")]
    SessionClosed { id: String, status: SessionStatus },
    #[error("invalid simulation plan: {0}")]
    InvalidPlan(&'static str),
    #[error("invalid chart request: {0}")]
    InvalidChart(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(thiserror::Error, Debug)]
pub enum RestoreError {
    #[error("unreadable state: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record {key} does not match its id {id}")]
    KeyMismatch { key: String, id: String },
    #[error("player {0}: {1}")]
    Player(String, &'static str),
    #[error("session {0}: {1}")]
    Session(String, &'static str),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LinkError {
    #[error("join link has no session parameter")]
    MissingSession,
}
