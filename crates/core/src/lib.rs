pub mod config;
pub mod errors;
pub mod game;
pub mod session;
pub mod throttle;

pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use game::{
    evaluate, play, resolve, ComboError, Combination, PayoutResult, PayoutRule, SpinOutcome,
    Symbol,
};
pub use session::{InMemoryScoreStore, ScoreStore, StoreError, UserId};
pub use throttle::{
    ActionKey, ActionThrottle, Clock, CooldownTable, CooldownWindow, ManualClock, SystemClock,
    ThrottleDecision, ThrottleError, ThrottleKey,
};
