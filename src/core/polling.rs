use crate::utils::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Fixed-interval polling bounded by an absolute deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    pub fn from_millis(interval_ms: u64, deadline_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(deadline_ms),
        )
    }

    /// Inventory polling used by a single scan.
    pub fn scan() -> Self {
        Self::from_millis(150, 5000)
    }

    /// EPC fallback used by the presence check.
    pub fn presence() -> Self {
        Self::from_millis(120, 2000)
    }

    /// Runs `attempt` until it yields a value or the deadline passes.
    ///
    /// Errors from `attempt` end the loop immediately. `Ok(None)` means the
    /// deadline elapsed without a value.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = Instant::now() + self.deadline;
        while Instant::now() < deadline {
            if let Some(value) = attempt().await? {
                return Ok(Some(value));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }
        Ok(None)
    }
}
