//! Backoff polling used wherever the core waits on a named object.
//!
//! Named events live in shared memory and have no wakeup channel, so waiting means checking
//! with a sleep in between. Each check is driven by a `backon` exponential schedule that starts
//! at `min_interval` and doubles up to `max_interval`, which keeps handshake latency in the
//! microsecond range without spinning for long-running waits.

use backon::ExponentialBuilder;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_micros(10),
            max_interval: Duration::from_millis(1),
        }
    }
}

impl PollConfig {
    /// Check schedule; the number of checks is bounded only by the caller's deadline
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::new()
            .with_factor(2.0)
            .with_min_delay(self.min_interval)
            .with_max_delay(self.max_interval.max(self.min_interval))
            .with_max_times(usize::MAX)
    }
}

/// Outcome of one check that did not find the condition met
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// Check again after the next delay
    Pending,
    /// The deadline has passed
    Expired,
}

#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.and_then(|t| Instant::now().checked_add(t)))
    }

    fn check(&self, ready: &mut impl FnMut() -> bool) -> Result<(), NotReady> {
        if ready() {
            return Ok(());
        }
        match self.0 {
            Some(deadline) if Instant::now() >= deadline => Err(NotReady::Expired),
            _ => Err(NotReady::Pending),
        }
    }

    /// Shorten `delay` so the last sleep ends at the deadline
    fn clamp(&self, delay: Duration) -> Duration {
        match self.0 {
            Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
            None => delay,
        }
    }
}

/// Block the current thread until `ready` returns true or `timeout` elapses.
///
/// `ready` is always evaluated at least once; `None` waits forever.
pub fn wait_until(
    timeout: Option<Duration>,
    poll: &PollConfig,
    mut ready: impl FnMut() -> bool,
) -> bool {
    use backon::BlockingRetryable;

    let deadline = Deadline::after(timeout);
    (|| deadline.check(&mut ready))
        .retry(poll.backoff())
        .sleep(move |delay| std::thread::sleep(deadline.clamp(delay)))
        .when(|e| *e == NotReady::Pending)
        .call()
        .is_ok()
}

/// Async twin of [`wait_until`], sleeping on the tokio timer instead of the thread
pub async fn wait_until_async(
    timeout: Option<Duration>,
    poll: &PollConfig,
    mut ready: impl FnMut() -> bool,
) -> bool {
    use backon::Retryable;

    let deadline = Deadline::after(timeout);
    (|| std::future::ready(deadline.check(&mut ready)))
        .retry(poll.backoff())
        .sleep(move |delay| tokio::time::sleep(deadline.clamp(delay)))
        .when(|e| *e == NotReady::Pending)
        .await
        .is_ok()
}
