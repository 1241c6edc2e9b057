use serde::{Deserialize, Serialize};

use super::combo::{Combination, Symbol};

/// Points every spin costs, win or lose.
pub const SPIN_COST: i64 = 1;
pub const TRIPLE_SEVEN_BONUS: i64 = 10;
pub const DOUBLE_SEVEN_BONUS: i64 = 5;
pub const TRIPLE_BONUS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutRule {
    TripleSeven,
    DoubleSeven,
    Triple,
    NoMatch,
}

impl PayoutRule {
    pub const ALL: [PayoutRule; 4] =
        [PayoutRule::TripleSeven, PayoutRule::DoubleSeven, PayoutRule::Triple, PayoutRule::NoMatch];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TripleSeven => "triple_seven",
            Self::DoubleSeven => "double_seven",
            Self::Triple => "triple",
            Self::NoMatch => "no_match",
        }
    }

    pub fn bonus(self) -> i64 {
        match self {
            Self::TripleSeven => TRIPLE_SEVEN_BONUS,
            Self::DoubleSeven => DOUBLE_SEVEN_BONUS,
            Self::Triple => TRIPLE_BONUS,
            Self::NoMatch => 0,
        }
    }

    pub fn is_win(self) -> bool {
        !matches!(self, Self::NoMatch)
    }

    /// Rule matched by `combo`. Rules overlap, so they are checked in payout order.
    pub fn classify(combo: &Combination) -> Self {
        match combo.count(Symbol::Seven) {
            3 => Self::TripleSeven,
            2 => Self::DoubleSeven,
            _ if combo.all_same() => Self::Triple,
            _ => Self::NoMatch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutResult {
    pub is_win: bool,
    /// Net score change, entry cost included.
    pub delta: i64,
}

pub fn evaluate(combo: &Combination) -> PayoutResult {
    let rule = PayoutRule::classify(combo);
    PayoutResult { is_win: rule.is_win(), delta: rule.bonus() - SPIN_COST }
}
