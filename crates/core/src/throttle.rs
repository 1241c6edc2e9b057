//! Per-user, per-action cooldown throttle.
//!
//! Every `(user, action)` pair owns one [`CooldownWindow`] holding the instant of its last
//! allowed call. A call is allowed once the action's cooldown has elapsed since then;
//! rejected calls leave the anchor untouched, so hammering a button never extends the wait.
//!
//! Windows live in a sharded [`DashMap`]. The check-and-update for a key runs under that
//! key's entry lock, which makes it atomic per key while unrelated users only share a shard
//! briefly. Nothing here sleeps or waits for a cooldown to expire.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::session::UserId;

/// Class of user action with its own cooldown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    /// Cheap command replies (`/start`, `/help`, ...).
    Default,
    /// Spins, which also simulate the reel animation delay.
    Spin,
}

impl ActionKey {
    pub const ALL: [ActionKey; 2] = [ActionKey::Default, ActionKey::Spin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Spin => "spin",
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKey {
    type Err = ThrottleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "spin" => Ok(Self::Spin),
            other => Err(ThrottleError::UnknownActionKey(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("unknown throttle action key `{0}` (expected default|spin)")]
    UnknownActionKey(String),
    #[error("no cooldown configured for throttle action key `{0}`")]
    MissingCooldown(ActionKey),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub user_id: UserId,
    pub action: ActionKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownWindow {
    pub last_allowed_at: Instant,
    /// Rejected attempts since `last_allowed_at`.
    pub suppressed: u32,
}

impl CooldownWindow {
    fn opened_at(now: Instant) -> Self {
        Self { last_allowed_at: now, suppressed: 0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// The window was created or moved to `now`; the action may run.
    Allowed,
    Throttled {
        /// Time left until the action would be allowed again.
        remaining: Duration,
        /// True only for the first rejection since the last allowed action. Callers use
        /// it to send one "slow down" notice per burst.
        first_in_burst: bool,
    },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Cooldown per action key. Can only be built with an entry for every key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownTable {
    default: Duration,
    spin: Duration,
}

impl Default for CooldownTable {
    fn default() -> Self {
        Self { default: Duration::from_millis(500), spin: Duration::from_millis(2_000) }
    }
}

impl CooldownTable {
    pub fn from_entries<I>(entries: I) -> Result<Self, ThrottleError>
    where
        I: IntoIterator<Item = (ActionKey, Duration)>,
    {
        let mut default = None;
        let mut spin = None;
        for (action, cooldown) in entries {
            match action {
                ActionKey::Default => default = Some(cooldown),
                ActionKey::Spin => spin = Some(cooldown),
            }
        }

        Ok(Self {
            default: default.ok_or(ThrottleError::MissingCooldown(ActionKey::Default))?,
            spin: spin.ok_or(ThrottleError::MissingCooldown(ActionKey::Spin))?,
        })
    }

    pub fn set(&mut self, action: ActionKey, cooldown: Duration) {
        match action {
            ActionKey::Default => self.default = cooldown,
            ActionKey::Spin => self.spin = cooldown,
        }
    }

    pub fn cooldown(&self, action: ActionKey) -> Duration {
        match action {
            ActionKey::Default => self.default,
            ActionKey::Spin => self.spin,
        }
    }

    pub fn longest(&self) -> Duration {
        self.default.max(self.spin)
    }

    pub fn entries(&self) -> impl Iterator<Item = (ActionKey, Duration)> + '_ {
        ActionKey::ALL.into_iter().map(|action| (action, self.cooldown(action)))
    }
}

pub struct ActionThrottle {
    cooldowns: CooldownTable,
    windows: DashMap<ThrottleKey, CooldownWindow>,
}

impl ActionThrottle {
    pub fn new(cooldowns: CooldownTable) -> Self {
        Self { cooldowns, windows: DashMap::new() }
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }

    /// Decide whether `user_id` may perform `action` at `now`, recording the call if so.
    pub fn try_acquire(&self, user_id: &UserId, action: ActionKey, now: Instant) -> ThrottleDecision {
        let cooldown = self.cooldowns.cooldown(action);
        let key = ThrottleKey { user_id: user_id.clone(), action };

        // The shard lock lives as long as the entry; it is released before logging.
        let (remaining, suppressed) = match self.windows.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(CooldownWindow::opened_at(now));
                return ThrottleDecision::Allowed;
            }
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                let elapsed = now.saturating_duration_since(window.last_allowed_at);
                if elapsed >= cooldown {
                    *window = CooldownWindow::opened_at(now);
                    return ThrottleDecision::Allowed;
                }

                window.suppressed = window.suppressed.saturating_add(1);
                (cooldown - elapsed, window.suppressed)
            }
        };

        debug!(
            event_name = "throttle.rejected",
            user_id = %user_id,
            action = %action,
            remaining_ms = remaining.as_millis() as u64,
            suppressed,
            "action throttled"
        );
        ThrottleDecision::Throttled { remaining, first_in_burst: suppressed == 1 }
    }

    /// Drop windows idle for longer than `stale_after`. A window is never dropped before
    /// its own cooldown has run out. Returns the number of windows removed.
    pub fn evict_stale(&self, now: Instant, stale_after: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|key, window| {
            let keep_for = stale_after.max(self.cooldowns.cooldown(key.action));
            now.saturating_duration_since(window.last_allowed_at) < keep_for
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(event_name = "throttle.evicted", removed, "stale cooldown windows evicted");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub fn window(&self, user_id: &UserId, action: ActionKey) -> Option<CooldownWindow> {
        let key = ThrottleKey { user_id: user_id.clone(), action };
        self.windows.get(&key).map(|window| *window)
    }
}

/// Source of `now` for throttle decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use dashmap::try_result::TryResult;
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::{
        ActionKey, ActionThrottle, Clock, CooldownTable, ManualClock, ThrottleDecision,
        ThrottleError, ThrottleKey,
    };
    use crate::session::UserId;

    /// Records, for every emitted event, whether the shard holding `key` was locked.
    struct ShardInspector {
        throttle: Arc<ActionThrottle>,
        key: ThrottleKey,
        locked_during_event: Arc<Mutex<Vec<bool>>>,
    }

    impl<S: Subscriber> Layer<S> for ShardInspector {
        fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
            let locked = matches!(self.throttle.windows.try_get(&self.key), TryResult::Locked);
            if let Ok(mut seen) = self.locked_during_event.lock() {
                seen.push(locked);
            }
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn throttle() -> ActionThrottle {
        ActionThrottle::new(CooldownTable::default())
    }

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    #[test]
    fn spin_cooldown_scenario() {
        let throttle = throttle();
        let t0 = Instant::now();

        assert_eq!(throttle.try_acquire(&user("u1"), ActionKey::Spin, t0), ThrottleDecision::Allowed);
        assert!(matches!(
            throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 + ms(1_000)),
            ThrottleDecision::Throttled { .. }
        ));
        assert_eq!(
            throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 + ms(2_000)),
            ThrottleDecision::Allowed
        );
        assert_eq!(
            throttle.try_acquire(&user("u2"), ActionKey::Spin, t0 + ms(1_000)),
            ThrottleDecision::Allowed
        );
    }

    #[test]
    fn throttled_reports_remaining_time() {
        let throttle = throttle();
        let t0 = Instant::now();
        throttle.try_acquire(&user("u1"), ActionKey::Spin, t0);

        let decision = throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 + ms(1_500));
        assert_eq!(decision, ThrottleDecision::Throttled { remaining: ms(500), first_in_burst: true });
    }

    #[test]
    fn rejected_attempts_do_not_extend_the_cooldown() {
        let throttle = throttle();
        let t0 = Instant::now();
        throttle.try_acquire(&user("u1"), ActionKey::Spin, t0);

        for offset in [100, 500, 1_000, 1_999] {
            assert!(!throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 + ms(offset)).is_allowed());
        }

        let window = throttle.window(&user("u1"), ActionKey::Spin).expect("window exists");
        assert_eq!(window.last_allowed_at, t0);
        assert_eq!(window.suppressed, 4);
        assert!(throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 + ms(2_000)).is_allowed());
    }

    #[test]
    fn only_the_first_rejection_of_a_burst_is_flagged() {
        let throttle = throttle();
        let t0 = Instant::now();
        throttle.try_acquire(&user("u1"), ActionKey::Default, t0);

        let first = throttle.try_acquire(&user("u1"), ActionKey::Default, t0 + ms(100));
        let second = throttle.try_acquire(&user("u1"), ActionKey::Default, t0 + ms(200));
        assert!(matches!(first, ThrottleDecision::Throttled { first_in_burst: true, .. }));
        assert!(matches!(second, ThrottleDecision::Throttled { first_in_burst: false, .. }));

        // A new allowed action starts a new burst.
        assert!(throttle.try_acquire(&user("u1"), ActionKey::Default, t0 + ms(500)).is_allowed());
        let next_burst = throttle.try_acquire(&user("u1"), ActionKey::Default, t0 + ms(600));
        assert!(matches!(next_burst, ThrottleDecision::Throttled { first_in_burst: true, .. }));
    }

    #[test]
    fn action_keys_have_independent_windows() {
        let throttle = throttle();
        let t0 = Instant::now();

        assert!(throttle.try_acquire(&user("u1"), ActionKey::Spin, t0).is_allowed());
        assert!(throttle.try_acquire(&user("u1"), ActionKey::Default, t0).is_allowed());
        assert!(throttle.try_acquire(&user("u1"), ActionKey::Default, t0 + ms(500)).is_allowed());
        assert!(!throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 + ms(500)).is_allowed());
        assert_eq!(throttle.tracked_keys(), 2);
    }

    #[test]
    fn backwards_clock_is_treated_as_no_time_elapsed() {
        let throttle = throttle();
        let t0 = Instant::now() + ms(10_000);
        throttle.try_acquire(&user("u1"), ActionKey::Spin, t0);

        let decision = throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 - ms(5_000));
        assert_eq!(decision, ThrottleDecision::Throttled { remaining: ms(2_000), first_in_burst: true });
    }

    #[test]
    fn concurrent_attempts_on_one_key_admit_exactly_one() {
        const ATTEMPTS: usize = 32;
        let throttle = Arc::new(throttle());
        let barrier = Arc::new(Barrier::new(ATTEMPTS));
        let now = Instant::now();

        let handles: Vec<_> = (0..ATTEMPTS)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    throttle.try_acquire(&UserId::from("racer"), ActionKey::Spin, now)
                })
            })
            .collect();

        let decisions: Vec<_> =
            handles.into_iter().map(|handle| handle.join().expect("thread panicked")).collect();
        let allowed = decisions.iter().filter(|decision| decision.is_allowed()).count();

        assert_eq!(allowed, 1);
        assert_eq!(decisions.len() - allowed, ATTEMPTS - 1);
    }

    #[test]
    fn concurrent_attempts_on_distinct_users_are_all_admitted() {
        const USERS: usize = 16;
        let throttle = Arc::new(throttle());
        let barrier = Arc::new(Barrier::new(USERS));
        let now = Instant::now();

        let handles: Vec<_> = (0..USERS)
            .map(|index| {
                let throttle = Arc::clone(&throttle);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    throttle.try_acquire(&UserId::from(format!("user-{index}")), ActionKey::Spin, now)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().expect("thread panicked").is_allowed());
        }
        assert_eq!(throttle.tracked_keys(), USERS);
    }

    #[test]
    fn evict_stale_removes_only_idle_windows() {
        let throttle = throttle();
        let t0 = Instant::now();
        throttle.try_acquire(&user("idle"), ActionKey::Default, t0);
        throttle.try_acquire(&user("active"), ActionKey::Default, t0 + ms(9_000));

        let removed = throttle.evict_stale(t0 + ms(10_000), ms(5_000));

        assert_eq!(removed, 1);
        assert!(throttle.window(&user("idle"), ActionKey::Default).is_none());
        assert!(throttle.window(&user("active"), ActionKey::Default).is_some());
    }

    #[test]
    fn evict_stale_never_cuts_a_running_cooldown_short() {
        let throttle = throttle();
        let t0 = Instant::now();
        throttle.try_acquire(&user("u1"), ActionKey::Spin, t0);

        assert_eq!(throttle.evict_stale(t0 + ms(1_000), Duration::ZERO), 0);
        assert!(!throttle.try_acquire(&user("u1"), ActionKey::Spin, t0 + ms(1_500)).is_allowed());
    }

    #[test]
    fn cooldown_table_requires_every_action_key() {
        let error = CooldownTable::from_entries([(ActionKey::Default, ms(100))])
            .expect_err("spin cooldown is missing");
        assert_eq!(error, ThrottleError::MissingCooldown(ActionKey::Spin));

        let table =
            CooldownTable::from_entries([(ActionKey::Spin, ms(3_000)), (ActionKey::Default, ms(100))])
                .expect("complete table");
        assert_eq!(table.cooldown(ActionKey::Spin), ms(3_000));
        assert_eq!(table.longest(), ms(3_000));
    }

    #[test]
    fn rejection_is_logged_after_the_shard_lock_is_released() {
        let throttle = Arc::new(throttle());
        let user = UserId::from("u1");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(ShardInspector {
            throttle: throttle.clone(),
            key: ThrottleKey { user_id: user.clone(), action: ActionKey::Spin },
            locked_during_event: seen.clone(),
        });
        let start = Instant::now();

        tracing::subscriber::with_default(subscriber, || {
            throttle.try_acquire(&user, ActionKey::Spin, start);
            throttle.try_acquire(&user, ActionKey::Spin, start + ms(100));
        });

        assert_eq!(*seen.lock().expect("seen"), vec![false]);
    }

    #[test]
    fn action_key_parsing_rejects_unknown_names() {
        assert_eq!(" Spin ".parse::<ActionKey>(), Ok(ActionKey::Spin));
        assert_eq!(
            "jackpot".parse::<ActionKey>(),
            Err(ThrottleError::UnknownActionKey("jackpot".to_owned()))
        );
    }

    #[test]
    fn manual_clock_advances_only_on_demand() {
        let start = Instant::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(ms(250));
        assert_eq!(clock.now(), start + ms(250));
    }
}
