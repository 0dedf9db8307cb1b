//! Retry loop around a single physical driver call.
//!
//! Every failure is classified; recoverable ones are retried after the
//! dialect's backoff until the per-call budget is spent.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::DriverError;
use crate::failure::{FailureClassifier, FailureKind};
use crate::logging::SessionLog;

/// Maximum number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// Blocks the calling thread between attempts.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps without blocking.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Mutable attempt state owned by one gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    pub retry_count: u32,
    pub error_occurred: bool,
}

/// A failure the retry loop could not absorb.
#[derive(Debug, Clone)]
pub struct ClassifiedFailure {
    pub error: DriverError,
    /// The failure was recoverable but the retry budget ran out.
    pub exhausted_retries: bool,
    /// Physical attempts made, including the first.
    pub attempts: u32,
}

/// Outcome of one `RetryExecutor::run` call.
#[derive(Debug)]
pub enum Attempt<T> {
    Completed(T),
    /// Failed with a message on the ignore list.
    Ignored,
    /// Failed with a message that encodes a success, with the count it
    /// carries when one could be read.
    Interpreted(Option<u64>),
    GaveUp(ClassifiedFailure),
}

/// Runs driver operations with classification and bounded retries.
pub struct RetryExecutor {
    classifier: FailureClassifier,
    sleeper: Box<dyn Sleeper>,
    max_retries: u32,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("dialect", &self.classifier.dialect().name())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(classifier: FailureClassifier, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            classifier,
            sleeper,
            max_retries: MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    /// Calls `op` until it succeeds, fails non-recoverably, or the budget is
    /// spent. `state.retry_count` is zero again whenever this returns.
    pub fn run<T, F>(
        &self,
        state: &mut AttemptState,
        ignore: &[String],
        log: &SessionLog,
        mut op: F,
    ) -> Attempt<T>
    where
        F: FnMut() -> Result<T, DriverError>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let error = match op() {
                Ok(value) => {
                    state.retry_count = 0;
                    return Attempt::Completed(value);
                }
                Err(error) => error,
            };

            let kind = self.classifier.classify(error.message(), ignore);
            tracing::debug!(attempt = attempts, %kind, "Driver call failed");

            match kind {
                FailureKind::Ignored => {
                    state.retry_count = 0;
                    return Attempt::Ignored;
                }
                FailureKind::Interpretable(interpretation) => {
                    state.retry_count = 0;
                    return Attempt::Interpreted(interpretation.count());
                }
                FailureKind::Recoverable { backoff, .. } if state.retry_count < self.max_retries => {
                    state.retry_count += 1;
                    log.log(format!("Failed with recoverable error: {}", error.message()));
                    log.log(format!(
                        "Retry attempt {} will occur after {} seconds",
                        state.retry_count,
                        backoff.as_secs()
                    ));
                    self.sleeper.sleep(backoff);
                }
                FailureKind::Recoverable { .. } => {
                    state.retry_count = 0;
                    return Attempt::GaveUp(ClassifiedFailure {
                        error,
                        exhausted_retries: true,
                        attempts,
                    });
                }
                FailureKind::Fatal => {
                    state.retry_count = 0;
                    return Attempt::GaveUp(ClassifiedFailure {
                        error,
                        exhausted_retries: false,
                        attempts,
                    });
                }
            }
        }
    }
}
