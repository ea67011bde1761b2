//! Bounded polling with exponential backoff and jitter.
//!
//! Used for eventual-consistency boundaries in the control plane, where a
//! freshly created resource may not be readable yet (IAM instance profiles
//! are the canonical case). The check distinguishes "not yet" from "failed":
//!
//! - `Ok(Some(value))` - condition met, polling stops with `value`
//! - `Ok(None)` - not visible yet, sleep and try again
//! - `Err(e)` - fatal, returned immediately without further attempts
//!
//! # Example
//!
//! ```ignore
//! use mqspec_common::retry::{poll_with_backoff, RetryConfig};
//!
//! let profile = poll_with_backoff(
//!     &RetryConfig::default(),
//!     "instance profile demo",
//!     || async { control_plane.get_instance_profile("demo").await },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error};

use crate::{Error, Result};

/// Backoff schedule for a bounded poll.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of reads before giving up (always at least one)
    pub max_attempts: u32,
    /// Delay after the first unsuccessful read
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

/// Poll `check` until it yields a value, backing off between reads.
///
/// Returns [`Error::PropagationTimeout`] naming `resource` once
/// `max_attempts` reads have all come back empty. Errors from `check`
/// are not retried.
pub async fn poll_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    resource: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if let Some(value) = check().await? {
            debug!(resource = %resource, attempt, "resource is ready");
            return Ok(value);
        }

        if attempt >= max_attempts {
            error!(
                resource = %resource,
                attempt,
                "resource still not visible, giving up"
            );
            return Err(Error::PropagationTimeout {
                resource: resource.to_string(),
                attempts: attempt,
            });
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        debug!(
            resource = %resource,
            attempt,
            delay_ms = jittered_delay.as_millis() as u64,
            "resource not visible yet, waiting"
        );

        tokio::time::sleep(jittered_delay).await;

        // Exponential backoff, capped at max_delay
        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
