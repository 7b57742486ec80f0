//! Blocking poll until a remote resource converges, times out or is cancelled.
//!
//! Used both to wait for a resource to become ready after creation and to wait
//! for it to disappear after deletion. Every wait is bounded by a deadline and
//! honors a [`CancellationToken`] so a supervisor can abort it on shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClupError, Result};
use crate::remote::RemoteApi;
use crate::snapshot::Snapshot;
use crate::telemetry::metrics::{Metrics, result_label};

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total fetch attempts before a transient failure becomes fatal.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Polling interval, overall timeout and fetch retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60 * 60),
            retry: RetryConfig::default(),
        }
    }
}

type Predicate = Box<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// What the waiter is waiting for.
pub enum WaitCondition {
    /// A freshly fetched snapshot satisfies the predicate.
    Satisfied(Predicate),
    /// The resource no longer exists.
    Deleted,
}

impl WaitCondition {
    pub fn satisfied<F>(predicate: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        Self::Satisfied(Box::new(predicate))
    }

    /// Wait until the string attribute `name` equals `expected`.
    pub fn attribute_equals(name: &str, expected: &str) -> Self {
        let name = name.to_string();
        let expected = expected.to_string();
        Self::satisfied(move |snapshot| {
            snapshot
                .get(&name)
                .as_value()
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == expected)
        })
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Satisfied(_) => "ready",
            Self::Deleted => "deletion",
        }
    }
}

impl std::fmt::Debug for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How a successful wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Ready(Snapshot),
    Deleted,
}

/// Poll `fetch` until `condition` holds.
///
/// Transient fetch failures are retried with doubling backoff capped at
/// `retry.max_delay`; exhausting the attempts yields a `Fatal` error. No fetch
/// is issued once cancellation or the deadline has been observed.
pub async fn wait_until<F, Fut>(
    mut fetch: F,
    condition: &WaitCondition,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Snapshot>>,
{
    let operation = condition.label();
    let deadline = deadline_after(config.timeout);
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(operation));
        }

        polls += 1;
        let snapshot = match fetch_with_retry(&mut fetch, operation, config, deadline, cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_not_found() && matches!(condition, WaitCondition::Deleted) => {
                debug!(polls, "Resource is gone");
                return Ok(WaitOutcome::Deleted);
            }
            Err(e) => return Err(e),
        };

        if let WaitCondition::Satisfied(predicate) = condition
            && predicate(&snapshot)
        {
            debug!(polls, "Wait condition satisfied");
            return Ok(WaitOutcome::Ready(snapshot));
        }

        if cancel.is_cancelled() {
            return Err(cancelled(operation));
        }
        if Instant::now() >= deadline {
            return Err(timed_out(operation, config.timeout));
        }

        debug!(
            polls,
            interval_secs = config.interval.as_secs(),
            "Waiting for {}",
            operation
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(cancelled(operation)),
            () = sleep(config.interval) => {}
        }

        if Instant::now() >= deadline {
            return Err(timed_out(operation, config.timeout));
        }
    }
}

/// Call `fetch`, retrying transient failures without sleeping past the deadline.
///
/// Each call is raced against cancellation and the deadline, so a hung remote
/// call never outlives either.
async fn fetch_with_retry<F, Fut>(
    fetch: &mut F,
    operation: &str,
    config: &WaitConfig,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Snapshot>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Snapshot>>,
{
    let retry = &config.retry;
    let mut attempt = 0u32;
    let mut delay = retry.initial_delay;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(operation)),
            () = sleep_until(deadline) => return Err(timed_out(operation, config.timeout)),
            result = fetch() => result,
        };

        let err = match result {
            Err(e) if e.is_transient() => e,
            other => return other,
        };

        if attempt >= retry.max_attempts.max(1) {
            warn!(attempt, error = %err, "Fetch failed after max retries");
            return Err(ClupError::fatal(
                module_path!(),
                format!("giving up after {attempt} attempts: {err}"),
            ));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(operation, config.timeout));
        }
        let pause = delay.min(remaining);

        warn!(
            attempt,
            error = %err,
            delay_ms = pause.as_millis(),
            "Fetch failed, retrying"
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(cancelled(operation)),
            () = sleep(pause) => {}
        }

        if Instant::now() >= deadline {
            return Err(timed_out(operation, config.timeout));
        }

        delay = (delay * 2).min(retry.max_delay);
    }
}

/// Upper bound for deadlines, about 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

fn cancelled(operation: &str) -> ClupError {
    ClupError::Cancelled(format!("wait for {operation}"))
}

fn timed_out(operation: &str, timeout: Duration) -> ClupError {
    ClupError::Timeout {
        operation: operation.to_string(),
        seconds: timeout.as_secs(),
    }
}

/// Waits on a resource by id through the remote API.
pub struct ResourceWaiter<A> {
    api: Arc<A>,
    config: WaitConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<A: RemoteApi> ResourceWaiter<A> {
    pub const fn new(api: Arc<A>, config: WaitConfig) -> Self {
        Self {
            api,
            config,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub const fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Block until `condition` holds for resource `id`.
    pub async fn wait_until(
        &self,
        id: &str,
        condition: &WaitCondition,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        info!(
            resource = id,
            kind = condition.label(),
            timeout_secs = self.config.timeout.as_secs(),
            "Waiting for resource"
        );

        let started = Instant::now();
        let api = &self.api;
        let result = wait_until(|| api.get(id), condition, &self.config, cancel).await;

        match &result {
            Ok(_) => info!(
                resource = id,
                kind = condition.label(),
                elapsed_secs = started.elapsed().as_secs(),
                "Wait completed"
            ),
            Err(e) => warn!(resource = id, kind = condition.label(), error = %e, "Wait failed"),
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_wait(condition.label(), result_label(&result), started.elapsed());
        }

        result
    }

    /// Block until the resource satisfies `predicate` and return its snapshot.
    pub async fn wait_ready<F>(
        &self,
        id: &str,
        predicate: F,
        cancel: &CancellationToken,
    ) -> Result<Snapshot>
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        match self
            .wait_until(id, &WaitCondition::satisfied(predicate), cancel)
            .await?
        {
            WaitOutcome::Ready(snapshot) => Ok(snapshot),
            WaitOutcome::Deleted => Err(ClupError::NotFound(id.to_string())),
        }
    }

    /// Block until the resource returns `NotFound`.
    pub async fn wait_deleted(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        self.wait_until(id, &WaitCondition::Deleted, cancel)
            .await
            .map(|_| ())
    }
}
