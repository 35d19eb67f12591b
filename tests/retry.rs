use std::cell::Cell;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use nba_medallion::error::FetchError;
use nba_medallion::retry::{Attempted, RetryPolicy, Sleeper, retry_with_backoff};

#[derive(Default)]
struct RecordingSleeper {
    waits: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.waits.push(duration);
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_secs(2),
        jitter: Duration::from_secs(1),
    }
}

fn timeout() -> FetchError {
    FetchError::Timeout("read timed out".to_string())
}

#[test]
fn succeeds_after_transient_failures() {
    let mut sleeper = RecordingSleeper::default();
    let mut rng = StdRng::seed_from_u64(42);
    let calls = Cell::new(0u32);

    let out = retry_with_backoff(
        &policy(),
        &mut sleeper,
        &mut rng,
        FetchError::is_transient,
        |attempt| {
            calls.set(attempt);
            if attempt <= 2 { Err(timeout()) } else { Ok(attempt) }
        },
    );

    assert!(matches!(out, Attempted::Ready(3)));
    assert_eq!(calls.get(), 3);
    assert_eq!(sleeper.waits.len(), 2);
    assert!(sleeper.waits[0] >= Duration::from_secs(2) && sleeper.waits[0] < Duration::from_secs(3));
    assert!(sleeper.waits[1] >= Duration::from_secs(4) && sleeper.waits[1] < Duration::from_secs(5));
}

#[test]
fn exhaustion_reports_the_last_error_without_a_final_wait() {
    let mut sleeper = RecordingSleeper::default();
    let mut rng = StdRng::seed_from_u64(42);

    let out: Attempted<(), FetchError> = retry_with_backoff(
        &policy(),
        &mut sleeper,
        &mut rng,
        FetchError::is_transient,
        |attempt| {
            Err(FetchError::Server {
                status: 503,
                body: format!("attempt {attempt}"),
            })
        },
    );

    match out {
        Attempted::Unavailable {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 4);
            assert!(last_error.to_string().contains("attempt 4"));
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(sleeper.waits.len(), 3);
}

#[test]
fn fatal_errors_are_not_retried() {
    let mut sleeper = RecordingSleeper::default();
    let mut rng = StdRng::seed_from_u64(42);
    let calls = Cell::new(0u32);

    let out: Attempted<(), FetchError> = retry_with_backoff(
        &policy(),
        &mut sleeper,
        &mut rng,
        FetchError::is_transient,
        |_| {
            calls.set(calls.get() + 1);
            Err(FetchError::Http {
                status: 400,
                body: "bad season".to_string(),
            })
        },
    );

    assert!(matches!(out, Attempted::Fatal(FetchError::Http { status: 400, .. })));
    assert_eq!(calls.get(), 1);
    assert!(sleeper.waits.is_empty());
}

#[test]
fn single_attempt_policy_never_sleeps() {
    let mut sleeper = RecordingSleeper::default();
    let mut rng = StdRng::seed_from_u64(1);
    let one = RetryPolicy {
        max_attempts: 1,
        ..policy()
    };

    let out: Attempted<(), FetchError> = retry_with_backoff(
        &one,
        &mut sleeper,
        &mut rng,
        FetchError::is_transient,
        |_| Err(timeout()),
    );

    assert!(matches!(out, Attempted::Unavailable { attempts: 1, .. }));
    assert!(sleeper.waits.is_empty());
}
