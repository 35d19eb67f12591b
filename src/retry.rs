use std::time::Duration;

use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the uniform jitter added to each wait.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based):
    /// `base * 2^(attempt-1) + U[0, jitter)`.
    pub fn backoff<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let exp = self.base_delay.saturating_mul(factor);
        let jitter = self.jitter.mul_f64(rng.r#gen::<f64>());
        exp.saturating_add(jitter)
    }
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Outcome of a retried operation.
///
/// `Unavailable` means every attempt failed with a retryable error; the caller
/// decides whether that skips one unit of work or fails the whole run.
#[derive(Debug)]
pub enum Attempted<T, E> {
    Ready(T),
    Unavailable { attempts: u32, last_error: E },
    Fatal(E),
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made. `op` receives the 1-based
/// attempt number. There is no wait after the final attempt.
pub fn retry_with_backoff<T, E, F, C, S, R>(
    policy: &RetryPolicy,
    sleeper: &mut S,
    rng: &mut R,
    is_retryable: C,
    mut op: F,
) -> Attempted<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    C: Fn(&E) -> bool,
    S: Sleeper + ?Sized,
    R: Rng,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match op(attempt) {
            Ok(value) => return Attempted::Ready(value),
            Err(err) => err,
        };
        if !is_retryable(&err) {
            return Attempted::Fatal(err);
        }
        if attempt >= max_attempts {
            return Attempted::Unavailable {
                attempts: attempt,
                last_error: err,
            };
        }
        let wait = policy.backoff(attempt, rng);
        warn!(
            attempt,
            max_attempts,
            wait_secs = wait.as_secs_f64(),
            error = %err,
            "transient failure, backing off"
        );
        sleeper.sleep(wait);
        attempt += 1;
    }
}
