//! Retry logic with exponential backoff
//!
//! Used by [`HttpContentSource`](crate::source::HttpContentSource) to absorb
//! transient remote faults (timeouts, refused connections, HTTP 429 and 5xx)
//! before they surface to the fetcher. The fetcher itself never retries.
//!
//! # Example
//!
//! ```no_run
//! use imagefeed_dl::config::RetryConfig;
//! use imagefeed_dl::retry::with_retry;
//! use imagefeed_dl::Result;
//!
//! # async fn fetch_page() -> Result<Vec<u8>> { Ok(vec![]) }
//! # async fn example() -> Result<()> {
//! let page = with_retry(&RetryConfig::default(), || fetch_page()).await?;
//! # let _ = page;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

/// Classifies errors as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Returns true if the same request may succeed when repeated
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::Interrupted
            ),
            // the remote answered; asking again gets the same answer
            Error::Authentication(_) | Error::Resolution(_) | Error::Feed(_) => false,
            Error::Materialization(_)
            | Error::Config { .. }
            | Error::NotADirectory(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Delays between attempts, grown by `backoff_multiplier` and capped at `max_delay`
///
/// Yields exactly `max_attempts` delays, one per retry.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    remaining: u32,
}

impl Backoff {
    /// Schedule for `config`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay.min(config.max_delay),
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            remaining: config.max_attempts,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.next;
        self.next = scale(base, self.multiplier, self.max_delay).min(self.max_delay);

        Some(if self.jitter { add_jitter(base) } else { base })
    }
}

/// Run `operation`, repeating it on transient errors
///
/// Gives up with the last error on the first permanent error or once every
/// delay of the [`Backoff`] schedule has been spent.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut attempt: u32 = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::debug!(error = %error, "request failed with non-retryable error");
            return Err(error);
        }

        let Some(delay) = backoff.next() else {
            tracing::error!(error = %error, attempts = attempt, "giving up after retries");
            return Err(error);
        };

        tracing::warn!(
            error = %error,
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis(),
            "request failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// `delay * factor`, or `ceiling` when the product is not a representable duration
fn scale(delay: Duration, factor: f64, ceiling: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(ceiling)
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    scale(delay, factor, Duration::MAX)
}
