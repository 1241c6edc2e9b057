//! Slot-machine outcome engine.
//!
//! Both steps are pure: [`resolve`] decodes a dice value into reels, [`evaluate`] turns
//! reels into a score delta. Callers own randomness and score storage.

pub mod combo;
pub mod payout;

use serde::Serialize;

pub use combo::{all_combinations, resolve, ComboError, Combination, Symbol};
pub use payout::{evaluate, PayoutResult, PayoutRule, SPIN_COST};

/// One decoded and scored spin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SpinOutcome {
    pub raw: i64,
    pub combination: Combination,
    pub payout: PayoutResult,
}

pub fn play(raw: i64) -> Result<SpinOutcome, ComboError> {
    let combination = resolve(raw)?;
    Ok(SpinOutcome { raw, combination, payout: evaluate(&combination) })
}

/// Average delta per spin when every dice value is equally likely.
pub fn expected_delta() -> f64 {
    let (total, count) = all_combinations()
        .fold((0_i64, 0_i64), |(total, count), (_, combo)| (total + evaluate(&combo).delta, count + 1));
    total as f64 / count as f64
}
