use std::sync::Arc;

use slotbot_core::{ActionKey, ActionThrottle, Clock, SystemClock, ThrottleDecision, UserId};
use tracing::info;

use crate::messages::{throttled_notice, MessageTemplate};

/// What the dispatcher should do with an event after the throttle has been consulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardVerdict {
    Proceed,
    /// First rejection of a burst; tell the user once.
    Notify(MessageTemplate),
    /// Later rejection in the same burst; stay quiet.
    Drop,
}

#[derive(Clone)]
pub struct ThrottleGuard {
    throttle: Arc<ActionThrottle>,
    clock: Arc<dyn Clock>,
}

impl ThrottleGuard {
    pub fn new(throttle: Arc<ActionThrottle>, clock: Arc<dyn Clock>) -> Self {
        Self { throttle, clock }
    }

    pub fn with_system_clock(throttle: Arc<ActionThrottle>) -> Self {
        Self::new(throttle, Arc::new(SystemClock))
    }

    pub fn throttle(&self) -> &Arc<ActionThrottle> {
        &self.throttle
    }

    pub fn check(&self, user_id: &UserId, action: ActionKey, correlation_id: &str) -> GuardVerdict {
        match self.throttle.try_acquire(user_id, action, self.clock.now()) {
            ThrottleDecision::Allowed => GuardVerdict::Proceed,
            ThrottleDecision::Throttled { remaining, first_in_burst: true } => {
                info!(
                    event_name = "chat.throttle.notified",
                    correlation_id,
                    user_id = %user_id,
                    action = %action,
                    remaining_ms = remaining.as_millis() as u64,
                    "throttled user notified"
                );
                GuardVerdict::Notify(throttled_notice(remaining))
            }
            ThrottleDecision::Throttled { first_in_burst: false, .. } => GuardVerdict::Drop,
        }
    }
}
