use serde::{Deserialize, Serialize};

/// Inclusive payout range in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRange {
    pub min: i64,
    pub max: i64,
}

impl PayoutRange {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, amount: i64) -> bool {
        (self.min..=self.max).contains(&amount)
    }

    pub fn is_valid(&self) -> bool {
        self.min >= 0 && self.min <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paytable {
    pub small_win: PayoutRange,
    pub big_win: PayoutRange,
}

impl Paytable {
    pub fn simple_default() -> Self {
        Self {
            small_win: PayoutRange::new(60, 80),
            big_win: PayoutRange::new(250, 300),
        }
    }
}

impl Default for Paytable {
    fn default() -> Self {
        Self::simple_default()
    }
}
