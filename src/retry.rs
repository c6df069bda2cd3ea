// Retrying operation executor
// Runs one pipeline stage with exponential backoff, refreshing the session when the
// upstream trace expires

use crate::client::ApiError;
use crate::config::RetryConfig;
use crate::leg::LegStage;
use crate::matcher::{MatchError, SessionRefreshMatcher};
use crate::model::{Candidate, SearchContext, Session};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// Backoff sleeps go through this seam so tests can record delays instead of waiting
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    // Jitter spreads the delay around its nominal value; a zero factor keeps it exact
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let base_ms = delay.as_millis() as f64;
        let jitter = rand::random::<f64>() * self.jitter_factor * base_ms;
        let delay_ms = base_ms * (1.0 - self.jitter_factor / 2.0) + jitter;
        Duration::from_millis(delay_ms as u64)
    }
}

/// Doubling delay sequence, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    delay: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            delay: initial.min(max),
            max,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn next(self) -> Self {
        Self {
            delay: self.delay.saturating_mul(2).min(self.max),
            max: self.max,
        }
    }
}

// One attempt's inputs. Each retry builds a new record instead of mutating the last
#[derive(Debug, Clone)]
struct Attempt {
    number: u32,
    session: Session,
    backoff: Backoff,
}

impl Attempt {
    fn first(session: Session, backoff: Backoff) -> Self {
        Self {
            number: 1,
            session,
            backoff,
        }
    }

    fn next(self, session: Session) -> Self {
        Self {
            number: self.number + 1,
            session,
            backoff: self.backoff.next(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("session refresh failed: {0}")]
    SessionRefreshFailed(MatchError),

    #[error("gave up after {attempts} attempt(s): {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: ApiError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Executed<T> {
    pub value: T,
    // Session active when the operation succeeded; later stages must continue with it
    pub session: Session,
    pub attempts: u32,
}

pub struct RetryingExecutor {
    matcher: SessionRefreshMatcher,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(
        matcher: SessionRefreshMatcher,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            matcher,
            sleeper,
            policy,
        }
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    ///
    /// Any failure sleeps the current backoff delay before retrying. An expired
    /// session is first refreshed through the matcher using `original`, and the
    /// retry runs against the refreshed session. A failed refresh ends the stage
    /// immediately.
    pub async fn execute<T, F, Fut>(
        &self,
        stage: LegStage,
        session: Session,
        original: &Candidate,
        context: &SearchContext,
        mut op: F,
    ) -> Result<Executed<T>, ExecutionError>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = Attempt::first(
            session,
            Backoff::new(self.policy.initial_delay, self.policy.max_delay),
        );

        loop {
            debug!(
                stage = %stage,
                attempt = attempt.number,
                trace_id = %attempt.session.trace_id,
                result_ref = %attempt.session.result_ref,
                "running stage"
            );

            let error = match op(attempt.session.clone()).await {
                Ok(value) => {
                    return Ok(Executed {
                        value,
                        session: attempt.session,
                        attempts: attempt.number,
                    })
                }
                Err(error) => error,
            };

            if attempt.number >= self.policy.max_attempts {
                warn!(
                    stage = %stage,
                    attempts = attempt.number,
                    error = %error,
                    "attempts exhausted"
                );
                return Err(ExecutionError::AttemptsExhausted {
                    attempts: attempt.number,
                    last_error: error,
                });
            }

            let next_session = if error.is_session_expired() {
                warn!(
                    stage = %stage,
                    attempt = attempt.number,
                    trace_id = %attempt.session.trace_id,
                    "session expired, refreshing"
                );
                self.matcher
                    .refresh(original, context, &attempt.session)
                    .await
                    .map_err(ExecutionError::SessionRefreshFailed)?
            } else {
                warn!(
                    stage = %stage,
                    attempt = attempt.number,
                    error = %error,
                    "stage failed, retrying"
                );
                attempt.session.clone()
            };

            self.sleeper
                .sleep(self.policy.jittered(attempt.backoff.delay()))
                .await;
            attempt = attempt.next(next_session);
        }
    }
}
