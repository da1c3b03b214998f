//! Bounded exponential backoff with jitter.
//!
//! # References
//! - <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>

use std::ops::ControlFlow;
use std::time::Duration;

use rand::prelude::*;
use tracing::info;

/// Retry schedule used for bootstrap connects.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the initial attempt.
    pub retries: usize,

    /// Multiplier applied to the delay between consecutive attempts.
    pub factor: f64,

    /// Delay before the first retry.
    pub min_timeout: Duration,

    /// Upper bound for any delay.
    pub max_timeout: Duration,

    /// Multiply each delay by a random factor in `1.0..2.0`.
    pub randomize: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            factor: 2.,
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(60),
            randomize: true,
        }
    }
}

/// Consecutive calls to [`Backoff::next`] return the delay before the next
/// attempt, or `None` once the schedule is exhausted.
pub(crate) struct Backoff {
    config: RetryConfig,
    attempt: usize,
    rng: Option<Box<dyn RngCore + Sync + Send>>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("config", &self.config)
            .field("attempt", &self.attempt)
            .finish()
    }
}

impl Backoff {
    pub(crate) fn new(config: &RetryConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    /// Creates a new `Backoff` with the optional `rng`.
    ///
    /// Uses [`rand::thread_rng()`] if no rng is provided.
    pub(crate) fn new_with_rng(
        config: &RetryConfig,
        rng: Option<Box<dyn RngCore + Sync + Send>>,
    ) -> Self {
        Self {
            config: config.clone(),
            attempt: 0,
            rng,
        }
    }

    pub(crate) fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.retries {
            return None;
        }

        let exp = self.config.min_timeout.as_secs_f64() * self.config.factor.powi(self.attempt as i32);
        self.attempt += 1;

        let jitter = if self.config.randomize {
            match self.rng.as_mut() {
                Some(rng) => rng.gen_range(1.0..2.0),
                None => thread_rng().gen_range(1.0..2.0),
            }
        } else {
            1.0
        };

        let delay = (exp * jitter).min(self.config.max_timeout.as_secs_f64());
        Some(Duration::from_secs_f64(delay))
    }
}

/// Perform an async operation, retrying on `ControlFlow::Continue` until the
/// schedule is exhausted, in which case the last error is returned.
pub(crate) async fn retry_with_backoff<F, F1, B, E>(
    config: &RetryConfig,
    request_name: &str,
    do_stuff: F,
) -> Result<B, E>
where
    F: Fn() -> F1 + Send + Sync,
    F1: std::future::Future<Output = ControlFlow<Result<B, E>, E>> + Send,
    E: std::error::Error + Send,
{
    let mut backoff = Backoff::new(config);

    loop {
        let e = match do_stuff().await {
            ControlFlow::Break(r) => return r,
            ControlFlow::Continue(e) => e,
        };

        match backoff.next() {
            Some(delay) => {
                info!(
                    e=%e,
                    request_name,
                    backoff_ms = delay.as_millis() as u64,
                    "request encountered non-fatal error - backing off",
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                info!(e=%e, request_name, "retries exhausted");
                return Err(e);
            }
        }
    }
}
