//! Priority-ordered failover across equivalent endpoints.
//!
//! Every call walks the endpoint list primary-first and returns the first
//! success. A failure is logged and the next endpoint is tried; only when
//! all of them have failed does the caller see an error, and that error
//! keeps every per-endpoint cause.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// One handle in a failover set.
///
/// Handles are cloned into each attempt, so they should be cheap to clone
/// (typically an `Arc` around a connection).
pub trait Endpoint: Clone + Send + Sync {
    /// Stable identity used in logs and failure reports.
    fn id(&self) -> &str;
}

/// One endpoint rejected a call.
#[derive(Debug, Error)]
#[error("endpoint {endpoint} failed on attempt {attempt}: {source:#}")]
pub struct EndpointFailure {
    pub endpoint: String,
    /// Zero-based position in the priority order.
    pub attempt: usize,
    #[source]
    pub source: anyhow::Error,
}

/// Every endpoint rejected a call.
#[derive(Debug, Error)]
#[error("all {} endpoints failed for {operation}", failures.len())]
pub struct AllEndpointsFailed {
    pub operation: String,
    pub failures: Vec<EndpointFailure>,
}

impl AllEndpointsFailed {
    /// The error reported by the last endpoint tried.
    pub fn last_cause(&self) -> Option<&anyhow::Error> {
        self.failures.last().map(|f| &f.source)
    }
}

/// Delay inserted between endpoint attempts.
pub trait Backoff: Send + Sync + fmt::Debug {
    /// Delay before trying the endpoint after `failed_attempt`.
    fn delay(&self, failed_attempt: usize) -> Duration;
}

/// Move to the next endpoint immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn delay(&self, _failed_attempt: usize) -> Duration {
        Duration::ZERO
    }
}

/// Doubling delay, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, failed_attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(failed_attempt as u32).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Ordered set of interchangeable endpoints.
#[derive(Clone)]
pub struct FailoverClient<E> {
    endpoints: Vec<E>,
    backoff: Arc<dyn Backoff>,
}

impl<E: Endpoint> fmt::Debug for FailoverClient<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverClient")
            .field("endpoints", &self.endpoints.iter().map(|e| e.id()).collect::<Vec<_>>())
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<E: Endpoint> FailoverClient<E> {
    /// Create a client over `endpoints`, primary first.
    pub fn new(endpoints: Vec<E>) -> Self {
        Self {
            endpoints,
            backoff: Arc::new(NoBackoff),
        }
    }

    /// Set the delay policy between attempts.
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Endpoints in priority order.
    pub fn endpoints(&self) -> &[E] {
        &self.endpoints
    }

    /// Run `op` against each endpoint in order until one succeeds.
    ///
    /// Endpoints after the first success are never touched. For writes this
    /// means the chain stops as soon as the network accepts the payload.
    pub async fn call<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, AllEndpointsFailed>
    where
        F: Fn(E) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut failures = Vec::with_capacity(self.endpoints.len());

        for (attempt, endpoint) in self.endpoints.iter().enumerate() {
            if attempt > 0 {
                let delay = self.backoff.delay(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            match op(endpoint.clone()).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, endpoint = endpoint.id(), attempt, "Fallback endpoint succeeded");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        operation,
                        endpoint = endpoint.id(),
                        attempt,
                        error = %e,
                        "Endpoint call failed"
                    );
                    failures.push(EndpointFailure {
                        endpoint: endpoint.id().to_string(),
                        attempt,
                        source: e,
                    });
                }
            }
        }

        Err(AllEndpointsFailed {
            operation: operation.to_string(),
            failures,
        })
    }
}
