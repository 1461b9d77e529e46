//! Long-running operation waiter.
//!
//! One generic poll loop for every resource kind: a probe function reads the
//! resource, a readiness predicate classifies the response, and the loop runs
//! until a terminal state, the deadline or caller cancellation.
//!
//! ```text
//! Pending -> Polling -> Ready | Absent | Failed | TimedOut | Cancelled
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ApiError, EngineError, Result};

/// Mutating operation that produced an operation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Terminal condition the operation waits for.
    pub fn expectation(self) -> Expect {
        match self {
            Operation::Create | Operation::Update => Expect::Ready,
            Operation::Delete => Expect::Absent,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Expected terminal condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Readable and reporting the ready marker.
    Ready,
    /// Unreadable with a not-found signal.
    Absent,
}

/// Classification of one probe response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending,
    /// Still readable but reporting itself deleted.
    Gone,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome<T> {
    Ready(T),
    Absent,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Poll `probe` until the resource reaches a terminal state.
///
/// Transient probe errors are retried until the deadline; any other error
/// ends the wait. During an `Absent` wait a not-found answer is the
/// terminal outcome, including on the first probe. During a `Ready` wait it
/// means the resource is not visible yet.
///
/// Returns `LroTimeout` once the deadline passes and `Cancelled` as soon as
/// `cancel` fires; in both cases the remote operation may still be running.
pub async fn wait<T, P, Fut, R>(
    config: WaitConfig,
    expect: Expect,
    cancel: &CancellationToken,
    label: &str,
    mut probe: P,
    readiness: R,
) -> Result<TerminalOutcome<T>>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ApiError>>,
    R: Fn(&T) -> Readiness,
{
    let deadline = Instant::now() + config.timeout;
    let mut attempt = 0u32;

    debug!(operation = %label, ?expect, timeout = ?config.timeout, "Waiting for operation");

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(operation = %label, attempt, "Wait cancelled by caller");
                return Err(EngineError::Cancelled);
            }
            r = timeout_at(deadline, probe()) => match r {
                Ok(r) => r,
                Err(_) => return Err(EngineError::LroTimeout(config.timeout)),
            },
        };

        match result {
            Ok(value) => match (expect, readiness(&value)) {
                (_, Readiness::Failed(cause)) => return Ok(TerminalOutcome::Failed(cause)),
                (_, Readiness::Gone) => return Ok(TerminalOutcome::Absent),
                (Expect::Ready, Readiness::Ready) => return Ok(TerminalOutcome::Ready(value)),
                _ => debug!(operation = %label, attempt, "Operation still in progress"),
            },
            Err(e) if e.is_not_found() => match expect {
                Expect::Absent => return Ok(TerminalOutcome::Absent),
                Expect::Ready => debug!(operation = %label, attempt, "Resource not visible yet"),
            },
            Err(e) if e.is_transient() => {
                warn!(
                    operation = %label,
                    attempt,
                    error = %e,
                    "Status probe failed, retrying"
                );
            }
            Err(e) => return Err(e.into()),
        }

        let next = (Instant::now() + config.interval).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(operation = %label, attempt, "Wait cancelled by caller");
                return Err(EngineError::Cancelled);
            }
            _ = sleep_until(next) => {}
        }

        if Instant::now() >= deadline {
            return Err(EngineError::LroTimeout(config.timeout));
        }
    }
}
