use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of faces on each reel.
pub const SYMBOL_COUNT: i64 = 4;
/// Number of reels in a combination.
pub const REEL_COUNT: usize = 3;
/// Smallest value the dice source may report.
pub const MIN_RAW_OUTCOME: i64 = 1;
/// Largest value the dice source may report (`SYMBOL_COUNT ^ REEL_COUNT`).
pub const MAX_RAW_OUTCOME: i64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Bar,
    Grapes,
    Lemon,
    Seven,
}

impl Symbol {
    /// Fixed digit table of the dice encoding. Never reorder: the dice source documents
    /// its values against this exact mapping.
    pub const DIGITS: [Symbol; 4] = [Symbol::Bar, Symbol::Grapes, Symbol::Lemon, Symbol::Seven];

    pub fn from_digit(digit: u8) -> Option<Self> {
        Self::DIGITS.get(usize::from(digit)).copied()
    }

    pub fn digit(self) -> u8 {
        match self {
            Self::Bar => 0,
            Self::Grapes => 1,
            Self::Lemon => 2,
            Self::Seven => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bar => "BAR",
            Self::Grapes => "grapes",
            Self::Lemon => "lemon",
            Self::Seven => "seven",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Symbols shown on the left, middle and right reel of one spin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination(pub [Symbol; REEL_COUNT]);

impl Combination {
    pub fn new(left: Symbol, middle: Symbol, right: Symbol) -> Self {
        Self([left, middle, right])
    }

    pub fn symbols(&self) -> &[Symbol; REEL_COUNT] {
        &self.0
    }

    pub fn count(&self, symbol: Symbol) -> usize {
        self.0.iter().filter(|candidate| **candidate == symbol).count()
    }

    pub fn all_same(&self) -> bool {
        let [left, middle, right] = self.0;
        left == middle && middle == right
    }

    /// Inverse of [`resolve`]: the dice value that produces this combination.
    pub fn raw_outcome(&self) -> i64 {
        self.0.iter().fold(0, |acc, symbol| acc * SYMBOL_COUNT + i64::from(symbol.digit()))
            + MIN_RAW_OUTCOME
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [left, middle, right] = self.0;
        write!(f, "{left}, {middle}, {right}")
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComboError {
    #[error("dice value {raw} is outside {MIN_RAW_OUTCOME}..={MAX_RAW_OUTCOME}")]
    OutOfRange { raw: i64 },
}

/// Decode a dice value into the reels it shows.
///
/// `raw - 1` is read as a three digit base-4 numeral, most significant digit on the left
/// reel. Values outside `1..=64` are reported, never clamped.
pub fn resolve(raw: i64) -> Result<Combination, ComboError> {
    if !(MIN_RAW_OUTCOME..=MAX_RAW_OUTCOME).contains(&raw) {
        return Err(ComboError::OutOfRange { raw });
    }

    let mut remainder = raw - MIN_RAW_OUTCOME;
    let mut reels = [Symbol::Bar; REEL_COUNT];
    for slot in reels.iter_mut().rev() {
        let digit = (remainder % SYMBOL_COUNT) as usize;
        *slot = Symbol::DIGITS[digit];
        remainder /= SYMBOL_COUNT;
    }

    Ok(Combination(reels))
}

/// Every combination the dice can show, indexed by `raw - 1`.
pub fn all_combinations() -> impl Iterator<Item = (i64, Combination)> {
    (MIN_RAW_OUTCOME..=MAX_RAW_OUTCOME).filter_map(|raw| resolve(raw).ok().map(|combo| (raw, combo)))
}
