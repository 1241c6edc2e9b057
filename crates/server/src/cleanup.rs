use std::sync::Arc;
use std::time::Duration;

use slotbot_core::{ActionThrottle, Clock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Periodically drops idle cooldown windows so the throttle map stays bounded.
pub fn spawn(
    throttle: Arc<ActionThrottle>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    stale_after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let removed = throttle.evict_stale(clock.now(), stale_after);
            if removed > 0 {
                info!(
                    event_name = "system.throttle.swept",
                    correlation_id = "throttle-cleanup",
                    removed,
                    remaining = throttle.tracked_keys(),
                    "idle cooldown windows swept"
                );
            }
        }
    })
}
