//! Restart policy for the supervisor.
//!
//! A [`RestartBreaker`] tracks how the last pipeline generations ended and decides how
//! long to wait before the next one. Generations that fail fast push it from `Healthy`
//! to `Degraded` and eventually into a `CoolingDown` pause; a generation that stayed up
//! for `healthy_after` resets it.

use crate::monitor::retry::RetryPolicy;
use std::time::Duration;
use tracing::{debug, warn};

/// State of the restart breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Restarts follow the backoff schedule
    Healthy,
    /// Repeated fast failures, still restarting
    Degraded,
    /// Too many fast failures, pausing for the cooldown
    CoolingDown,
}

/// Restart configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    /// Delay schedule between restarts; attempt caps are ignored
    pub backoff: RetryPolicy,
    /// A generation running at least this long counts as healthy
    pub healthy_after: Duration,
    /// Consecutive fast failures before degrading; 0 disables the breaker
    pub failure_threshold: u32,
    /// Minimum pause once the breaker opens
    pub cooldown: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            backoff: RetryPolicy::from_millis(500, 30_000, 0),
            healthy_after: Duration::from_secs(60),
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Restart at once, forever.
    pub fn immediate() -> Self {
        Self {
            backoff: RetryPolicy::Immediate,
            healthy_after: Duration::ZERO,
            failure_threshold: 0,
            cooldown: Duration::ZERO,
        }
    }
}

/// What to do after a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartDecision {
    pub delay: Duration,
    pub state: BreakerState,
    pub consecutive_failures: u32,
}

/// Failure bookkeeping across generations of one supervisor.
pub struct RestartBreaker {
    policy: RestartPolicy,
    state: BreakerState,
    consecutive_failures: u32,
    delays: Box<dyn Iterator<Item = Duration> + Send>,
}

impl RestartBreaker {
    pub fn new(policy: RestartPolicy) -> Self {
        let delays = policy.backoff.delays();
        Self {
            policy,
            state: BreakerState::Healthy,
            consecutive_failures: 0,
            delays,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a generation that ran for `ran_for` and failed.
    pub fn on_generation_ended(&mut self, ran_for: Duration) -> RestartDecision {
        if ran_for >= self.policy.healthy_after {
            if self.consecutive_failures > 0 {
                debug!(ran_for_ms = ran_for.as_millis() as u64, "generation ran healthy, resetting restart backoff");
            }
            self.reset();
        }

        self.consecutive_failures += 1;
        let mut delay = self.delays.next().unwrap_or_default();
        self.update_state();

        let decision_state = self.state;
        let failures = self.consecutive_failures;
        if self.state == BreakerState::CoolingDown {
            delay = delay.max(self.policy.cooldown);
            warn!(
                consecutive_failures = failures,
                cooldown_ms = delay.as_millis() as u64,
                "restart breaker open, cooling down"
            );
            // the cooldown is served by this delay; the next generation starts degraded
            self.state = BreakerState::Degraded;
            self.consecutive_failures = 0;
        }

        RestartDecision {
            delay,
            state: decision_state,
            consecutive_failures: failures,
        }
    }

    /// Back to `Healthy` with a fresh backoff schedule.
    pub fn reset(&mut self) {
        self.state = BreakerState::Healthy;
        self.consecutive_failures = 0;
        self.delays = self.policy.backoff.delays();
    }

    fn update_state(&mut self) {
        let threshold = self.policy.failure_threshold;
        if threshold == 0 {
            return;
        }
        match self.state {
            BreakerState::Healthy => {
                if self.consecutive_failures >= threshold {
                    self.state = BreakerState::Degraded;
                    debug!(consecutive_failures = self.consecutive_failures, "restart breaker degraded");
                }
            }
            BreakerState::Degraded => {
                if self.consecutive_failures >= threshold * 2 {
                    self.state = BreakerState::CoolingDown;
                }
            }
            BreakerState::CoolingDown => {}
        }
    }
}
