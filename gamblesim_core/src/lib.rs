pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod link;
pub mod paytable;
pub mod persist;
pub mod registry;
pub mod rng;
pub mod session;
pub mod simulate;
pub mod stats;
pub mod symbols;

pub use crate::clock::{Clock, ManualClock, Millis, SystemClock};
pub use crate::config::{GameConfig, OddsConfig};
pub use crate::engine::{spin, spin_with_seeds, verify_outcome, Outcome, OutcomeKind};
pub use crate::error::{ConfigError, LedgerError, LinkError, RegistryError, RestoreError};
pub use crate::ledger::{BalanceEvent, BalanceSample, Player, PlayerId, Settlement, SpinEntry};
pub use crate::link::JoinLink;
pub use crate::paytable::{Paytable, PayoutRange};
pub use crate::persist::PersistedState;
pub use crate::registry::Registry;
pub use crate::rng::{derive_hash_hex, generate_server_seed, player_client_seed, ProvablyFairRng};
pub use crate::session::{Session, SessionId, SessionStatus};
pub use crate::simulate::{SimulationPlan, SimulationReport};
pub use crate::stats::{AggregateStats, ChartData, Histogram};
pub use crate::symbols::{Symbol, SymbolSet};
