//! Minimum spacing between consecutive remote requests

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between the starts of successive requests
///
/// Callers `wait().await` before every request. The first call never waits.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Create a pacer; a zero interval disables waiting
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until `interval` has passed since the previous call returned
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tracing::trace!(
                    delay_ms = (ready_at - Instant::now()).as_millis(),
                    "pacing request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
