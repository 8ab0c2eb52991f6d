use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, paytable::Paytable, symbols::SymbolSet};

/// Probability table driving the outcome generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OddsConfig {
    /// Number of initial spins per player that use `early_win_chance`.
    pub early_window_size: u64,
    pub early_win_chance: f64,
    pub normal_win_chance: f64,
    pub big_win_chance_given_win: f64,
    pub near_miss_chance_given_loss: f64,
    pub paytable: Paytable,
    pub symbols: SymbolSet,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            early_window_size: 5,
            early_win_chance: 0.30,
            normal_win_chance: 0.10,
            big_win_chance_given_win: 0.08,
            near_miss_chance_given_loss: 0.30,
            paytable: Paytable::simple_default(),
            symbols: SymbolSet::default_reel(),
        }
    }
}

impl OddsConfig {
    pub fn win_chance_for(&self, spin_index: u64) -> f64 {
        if spin_index < self.early_window_size {
            self.early_win_chance
        } else {
            self.normal_win_chance
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("early_win_chance", self.early_win_chance),
            ("normal_win_chance", self.normal_win_chance),
            ("big_win_chance_given_win", self.big_win_chance_given_win),
            ("near_miss_chance_given_loss", self.near_miss_chance_given_loss),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Probability { name, value: p });
            }
        }
        if !self.paytable.small_win.is_valid() {
            return Err(ConfigError::PayoutRange("small_win"));
        }
        if !self.paytable.big_win.is_valid() {
            return Err(ConfigError::PayoutRange("big_win"));
        }
        if self.symbols.len() < 2 {
            return Err(ConfigError::TooFewSymbols(self.symbols.len()));
        }
        if self.symbols.has_duplicates() {
            return Err(ConfigError::DuplicateSymbols);
        }
        Ok(())
    }
}

/// Everything a registry needs to know about the game it hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub spin_cost: i64,
    pub starting_balance: i64,
    pub top_up_amount: i64,
    /// Sessions kept by the registry; older ones are discarded.
    pub max_sessions: usize,
    pub odds: OddsConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            spin_cost: 40,
            starting_balance: 1000,
            top_up_amount: 500,
            max_sessions: 5,
            odds: OddsConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spin_cost <= 0 {
            return Err(ConfigError::NonPositive("spin_cost"));
        }
        if self.starting_balance < 0 {
            return Err(ConfigError::NonPositive("starting_balance"));
        }
        if self.top_up_amount <= 0 {
            return Err(ConfigError::NonPositive("top_up_amount"));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::NonPositive("max_sessions"));
        }
        self.odds.validate()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
