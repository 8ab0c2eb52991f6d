use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Cherry,
    Lemon,
    Orange,
    Grape,
    Watermelon,
    Strawberry,
    Banana,
    Diamond,
    Seven,
    Jackpot,
}

impl Symbol {
    pub const ALL: [Symbol; 10] = [
        Symbol::Cherry,
        Symbol::Lemon,
        Symbol::Orange,
        Symbol::Grape,
        Symbol::Watermelon,
        Symbol::Strawberry,
        Symbol::Banana,
        Symbol::Diamond,
        Symbol::Seven,
        Symbol::Jackpot,
    ];

    pub fn glyph(self) -> &'static str {
        match self {
            Symbol::Cherry => "🍒",
            Symbol::Lemon => "🍋",
            Symbol::Orange => "🍊",
            Symbol::Grape => "🍇",
            Symbol::Watermelon => "🍉",
            Symbol::Strawberry => "🍓",
            Symbol::Banana => "🍌",
            Symbol::Diamond => "💎",
            Symbol::Seven => "7️⃣",
            Symbol::Jackpot => "🎰",
        }
    }

    pub fn from_index(i: u8) -> Self {
        Self::ALL[usize::from(i) % Self::ALL.len()]
    }

    pub fn to_index(self) -> u8 {
        match self {
            Symbol::Cherry => 0,
            Symbol::Lemon => 1,
            Symbol::Orange => 2,
            Symbol::Grape => 3,
            Symbol::Watermelon => 4,
            Symbol::Strawberry => 5,
            Symbol::Banana => 6,
            Symbol::Diamond => 7,
            Symbol::Seven => 8,
            Symbol::Jackpot => 9,
        }
    }
}

/// Reel symbols, optionally split into a common tier (small wins) and a
/// premium tier (big wins). An empty `premium` list means unpartitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSet {
    pub common: Vec<Symbol>,
    #[serde(default)]
    pub premium: Vec<Symbol>,
}

impl SymbolSet {
    pub fn default_reel() -> Self {
        Self {
            common: vec![
                Symbol::Cherry,
                Symbol::Lemon,
                Symbol::Orange,
                Symbol::Grape,
                Symbol::Watermelon,
            ],
            premium: vec![Symbol::Diamond, Symbol::Seven, Symbol::Jackpot],
        }
    }

    pub fn unpartitioned(symbols: Vec<Symbol>) -> Self {
        Self {
            common: symbols,
            premium: Vec::new(),
        }
    }

    pub fn is_partitioned(&self) -> bool {
        !self.common.is_empty() && !self.premium.is_empty()
    }

    /// Every symbol in reel order, common tier first.
    pub fn all(&self) -> Vec<Symbol> {
        self.common.iter().chain(self.premium.iter()).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.common.len() + self.premium.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn big_win_pool(&self) -> Vec<Symbol> {
        if self.is_partitioned() {
            self.premium.clone()
        } else {
            self.all()
        }
    }

    pub fn small_win_pool(&self) -> Vec<Symbol> {
        if self.is_partitioned() {
            self.common.clone()
        } else {
            self.all()
        }
    }

    pub fn has_duplicates(&self) -> bool {
        let all = self.all();
        all.iter()
            .enumerate()
            .any(|(i, s)| all[i + 1..].contains(s))
    }
}

impl Default for SymbolSet {
    fn default() -> Self {
        Self::default_reel()
    }
}

/// Count of matching reel positions: 3 for a line, 2 for a pair, 1 otherwise.
pub fn max_matching(symbols: &[Symbol; 3]) -> usize {
    let [a, b, c] = *symbols;
    if a == b && b == c {
        3
    } else if a == b || b == c || a == c {
        2
    } else {
        1
    }
}
