// crates/contract-rig-core/src/retry.rs
// ============================================================================
// Module: Bounded Retry
// Description: One polling primitive for every eventual-consistency wait.
// Purpose: Fixed interval, hard attempt cap, escalating log verbosity.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! [`retry_until`] calls a probe until it reports [`Probe::Ready`] or the
//! attempt cap is reached. It never loops unboundedly: the probe runs at most
//! `max_attempts` times and the loop sleeps `interval` between attempts.
//! [`Probe::Abandon`] ends the loop at once when the condition can no longer
//! hold.
//! Exhaustion returns [`RetryExhausted`]; callers attach their own
//! diagnostics (the on-exhaustion hook) when they map it into a domain error.

use std::future::Future;
use std::time::Duration;
use std::time::Instant;

use tokio::time::sleep;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Attempt budget for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Hard cap on probe invocations. Zero is treated as one.
    pub max_attempts: u32,
    /// Sleep between attempts.
    pub interval: Duration,
    /// Log at info level every N attempts; zero disables escalation.
    pub verbose_every: u32,
}

impl RetryPolicy {
    /// Builds a policy with escalation every ten attempts.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            verbose_every: 10,
        }
    }

    /// Upper bound on time spent sleeping between attempts.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The awaited condition holds.
    Ready(T),
    /// Not yet; the string describes what was observed.
    Pending(String),
    /// The condition can no longer hold; stop without further attempts.
    Abandon(String),
}

/// The attempt budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    /// Probe invocations made.
    pub attempts: u32,
    /// Time spent in the loop.
    pub elapsed: Duration,
    /// Observation reported by the final probe.
    pub last_observation: String,
    /// True when the loop stopped before the cap on [`Probe::Abandon`].
    pub abandoned: bool,
}

// ============================================================================
// SECTION: Loop
// ============================================================================

/// Polls `probe` until it is ready or `policy.max_attempts` is reached.
///
/// The probe receives the one-based attempt number.
///
/// # Errors
///
/// Returns [`RetryExhausted`] when every attempt reported [`Probe::Pending`],
/// or as soon as one reports [`Probe::Abandon`].
pub async fn retry_until<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut probe: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Probe<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let start = Instant::now();
    let mut last_observation = String::new();
    for attempt in 1 ..= max_attempts {
        match probe(attempt).await {
            Probe::Ready(value) => {
                debug!(label, attempt, elapsed_ms = start.elapsed().as_millis(), "probe ready");
                return Ok(value);
            }
            Probe::Pending(observation) => {
                let escalate = policy.verbose_every > 0 && attempt % policy.verbose_every == 0;
                if escalate {
                    info!(
                        label,
                        attempt,
                        max_attempts,
                        elapsed_ms = start.elapsed().as_millis(),
                        observation = %observation,
                        "still waiting"
                    );
                } else {
                    debug!(label, attempt, observation = %observation, "probe pending");
                }
                last_observation = observation;
            }
            Probe::Abandon(observation) => {
                info!(label, attempt, observation = %observation, "giving up early");
                return Err(RetryExhausted {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                    last_observation: observation,
                    abandoned: true,
                });
            }
        }
        if attempt < max_attempts {
            sleep(policy.interval).await;
        }
    }
    Err(RetryExhausted {
        attempts: max_attempts,
        elapsed: start.elapsed(),
        last_observation,
        abandoned: false,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::Probe;
    use super::RetryPolicy;
    use super::retry_until;

    #[tokio::test]
    async fn stops_at_first_ready_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(10, Duration::from_millis(1));
        let counter = Arc::clone(&calls);
        let result = retry_until(&policy, "test", move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 3 { Probe::Ready(attempt) } else { Probe::Pending("nope".into()) }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_exceeds_attempt_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(4, Duration::from_millis(1));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_until(&policy, "test", move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Probe::Pending(format!("attempt {attempt}")) }
        })
        .await;
        let exhausted = result.err().unwrap_or_else(|| unreachable!("probe never ready"));
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.last_observation, "attempt 4");
        assert!(!exhausted.abandoned);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn abandon_stops_before_the_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(50, Duration::from_secs(1));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_until(&policy, "test", move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 2 { Probe::Abandon("gone".into()) } else { Probe::Pending("wait".into()) }
            }
        })
        .await;
        let exhausted = result.err().unwrap_or_else(|| unreachable!("never ready"));
        assert!(exhausted.abandoned);
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.last_observation, "gone");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_attempts_still_probes_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        let result = retry_until(&policy, "test", |_| async { Probe::Ready("ok") }).await;
        assert_eq!(result, Ok("ok"));
    }

    #[test]
    fn budget_counts_sleeps_between_attempts() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.budget(), Duration::from_secs(8));
    }
}
