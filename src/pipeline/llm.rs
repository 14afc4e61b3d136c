//! Backend invocation shared by the extraction and synthesis stages.
//!
//! Wraps one [`InferenceBackend::complete`] call with the stage's deadline
//! and maps backend failures to [`DigestError::InferenceFailed`] tagged with
//! the request target ("page 2 of a.pdf", "review synthesis").
//!
//! ## Retry Strategy
//!
//! Off by default. When `max_retries > 0`, failed calls are retried with
//! exponential backoff (`backoff_ms * 2^attempt`): with 500 ms base and
//! 3 retries the waits are 500 ms → 1 s → 2 s. Only transport/backend
//! failures and timeouts are retried; whatever comes back is validated by the
//! caller, and a schema violation is never retried.

use crate::backend::{InferenceBackend, InferenceReply, InferenceRequest};
use crate::config::DigestConfig;
use crate::error::DigestError;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// How many times to retry a failed call, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff_ms: 0,
    };

    pub fn from_config(config: &DigestConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Send `request`, bounded by `deadline` per attempt.
pub async fn call_backend(
    backend: &dyn InferenceBackend,
    request: &InferenceRequest,
    deadline: Duration,
    retry: RetryPolicy,
    target: &str,
) -> Result<InferenceReply, DigestError> {
    let mut last_err = String::new();

    for attempt in 0..=retry.max_retries {
        if attempt > 0 {
            let wait = retry.backoff(attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                target,
                attempt,
                retry.max_retries,
                wait.as_millis()
            );
            sleep(wait).await;
        }

        let start = Instant::now();
        match tokio::time::timeout(deadline, backend.complete(request)).await {
            Ok(Ok(reply)) => {
                debug!(
                    "{}: {} via {} — {} input tokens, {} output tokens, {:?}",
                    target,
                    request.model,
                    backend.name(),
                    reply.prompt_tokens,
                    reply.completion_tokens,
                    start.elapsed()
                );
                return Ok(reply);
            }
            Ok(Err(e)) => last_err = e.to_string(),
            Err(_) => last_err = format!("timed out after {}s", deadline.as_secs()),
        }
        warn!("{}: attempt {} failed — {}", target, attempt + 1, last_err);
    }

    Err(DigestError::InferenceFailed {
        target: target.to_string(),
        detail: last_err,
    })
}
