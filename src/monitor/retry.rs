//! Retry and restart delay policies.
//!
//! Both the fetcher's rate-limit loop and the supervisor's restart loop ask a policy for
//! the next delay instead of recursing, so attempt counts stay visible and testable.

use std::time::Duration;
use tokio_retry::strategy::{ExponentialBackoff, FixedInterval};

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// Retry at once, forever
    Immediate,
    /// Constant delay, optionally capped
    Fixed {
        delay: Duration,
        max_attempts: Option<u32>,
    },
    /// Doubling delay from `initial` up to `max`, optionally capped
    Exponential {
        initial: Duration,
        max: Duration,
        max_attempts: Option<u32>,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Immediate
    }
}

impl RetryPolicy {
    /// Build a policy from millisecond settings; `max_attempts == 0` means unbounded.
    pub fn from_millis(initial_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        let max_attempts = (max_attempts > 0).then_some(max_attempts);
        if initial_ms == 0 && max_attempts.is_none() {
            RetryPolicy::Immediate
        } else if initial_ms == 0 || initial_ms >= max_ms {
            RetryPolicy::Fixed {
                delay: Duration::from_millis(initial_ms),
                max_attempts,
            }
        } else {
            RetryPolicy::Exponential {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
                max_attempts,
            }
        }
    }

    /// Fresh delay iterator. `None` from the iterator means: give up.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        match self {
            RetryPolicy::Immediate => Box::new(std::iter::repeat(Duration::ZERO)),
            RetryPolicy::Fixed { delay, max_attempts } => {
                let millis = delay.as_millis() as u64;
                let strategy = FixedInterval::from_millis(millis);
                capped(strategy, *max_attempts)
            }
            RetryPolicy::Exponential {
                initial,
                max,
                max_attempts,
            } => {
                // ExponentialBackoff starts at base * factor, so `initial` itself goes first
                let first = (*initial).min(*max);
                let doubled = ExponentialBackoff::from_millis(2)
                    .factor((first.as_millis() as u64).max(1))
                    .max_delay(*max);
                capped(std::iter::once(first).chain(doubled), *max_attempts)
            }
        }
    }
}

fn capped<I>(strategy: I, max_attempts: Option<u32>) -> Box<dyn Iterator<Item = Duration> + Send>
where
    I: Iterator<Item = Duration> + Send + 'static,
{
    match max_attempts {
        // The first attempt is not a retry
        Some(n) => Box::new(strategy.take(n.saturating_sub(1) as usize)),
        None => Box::new(strategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_is_unbounded_and_zero() {
        let delays: Vec<_> = RetryPolicy::Immediate.delays().take(1000).collect();
        assert_eq!(delays.len(), 1000);
        assert!(delays.iter().all(|d| d.is_zero()));
    }

    #[test]
    fn test_from_millis_selection() {
        assert_eq!(RetryPolicy::from_millis(0, 0, 0), RetryPolicy::Immediate);
        assert!(matches!(
            RetryPolicy::from_millis(0, 0, 5),
            RetryPolicy::Fixed { max_attempts: Some(5), .. }
        ));
        assert!(matches!(
            RetryPolicy::from_millis(100, 5_000, 0),
            RetryPolicy::Exponential { max_attempts: None, .. }
        ));
    }

    #[test]
    fn test_exponential_doubles_up_to_max() {
        let policy = RetryPolicy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            max_attempts: None,
        };
        let delays: Vec<_> = policy.delays().take(5).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[test]
    fn test_exponential_starts_at_odd_initial() {
        let policy = RetryPolicy::from_millis(3, 40, 0);
        let delays: Vec<_> = policy.delays().take(6).collect();
        let millis: Vec<u64> = delays.iter().map(|d| d.as_millis() as u64).collect();
        assert_eq!(millis, vec![3, 6, 12, 24, 40, 40]);

        let one = RetryPolicy::from_millis(1, 1_000, 3);
        let delays: Vec<_> = one.delays().collect();
        assert_eq!(delays, vec![Duration::from_millis(1), Duration::from_millis(2)]);
    }

    #[test]
    fn test_attempt_cap_counts_first_attempt() {
        let policy = RetryPolicy::Fixed {
            delay: Duration::from_millis(10),
            max_attempts: Some(3),
        };
        assert_eq!(policy.delays().count(), 2);
    }
}
