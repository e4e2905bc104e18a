//! Polling-based lifecycle driver for remote resources.
//!
//! The driver creates a named resource (or reuses one matched by name), then
//! polls its status until the provider reports a terminal success, a
//! terminal failure, or the deadline elapses. Provider specifics live behind
//! the [`Provisioner`] capability; the driver owns no wire format.

mod error;
mod observer;
mod policy;
mod state;
mod status;
mod types;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use error::{LifecycleError, RemoteError};
pub use observer::{Progress, ProgressObserver, SilentObserver, TracingObserver};
pub use policy::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT, PolicyError, PollPolicy};
pub use state::{LifecycleState, TimeoutTransitionError, TransitionError};
pub use status::{StatusClass, StatusTable};
pub use types::{ResourceHandle, ResourceStatus};

/// Future returned by provisioner capabilities.
pub type LifecycleFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Capabilities the driver needs to bring one resource kind to a terminal
/// state.
pub trait Provisioner: Send + Sync {
    /// Provider specific error type.
    type Error: RemoteError;

    /// Vocabulary used to classify the strings returned by [`Self::status`].
    fn status_table(&self) -> &StatusTable;

    /// Looks up an existing resource by its human-readable name.
    fn find<'a>(&'a self, name: &'a str)
    -> LifecycleFuture<'a, Option<ResourceHandle>, Self::Error>;

    /// Creates a resource and returns the identifier the provider issued.
    fn create<'a>(&'a self, name: &'a str) -> LifecycleFuture<'a, ResourceHandle, Self::Error>;

    /// Reads the current provider status of a resource.
    fn status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> LifecycleFuture<'a, ResourceStatus, Self::Error>;
}

/// Summary of a successful poll loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollReport {
    /// Number of status calls issued.
    pub attempts: u32,
    /// Terminal success status reported on the final poll.
    pub status: ResourceStatus,
    /// Time spent from the first poll to the terminal observation.
    pub elapsed: Duration,
}

/// Drives resources through `ensure` and `poll_until_terminal`.
///
/// The driver keeps no per-resource state between calls, so one instance
/// can serve concurrent invocations for independent resources.
#[derive(Clone)]
pub struct LifecycleDriver {
    policy: PollPolicy,
    observer: Arc<dyn ProgressObserver>,
    cancellation: Option<CancellationToken>,
}

impl fmt::Debug for LifecycleDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleDriver")
            .field("policy", &self.policy)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for LifecycleDriver {
    fn default() -> Self {
        Self::new(PollPolicy::default())
    }
}

enum Pause {
    Elapsed,
    Cancelled,
}

impl LifecycleDriver {
    /// Creates a driver that reports progress through `tracing`.
    #[must_use]
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            observer: Arc::new(TracingObserver),
            cancellation: None,
        }
    }

    /// Replaces the progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Makes waits cancellable through `token`. The token is checked once
    /// per iteration and raced against the sleep; an in-flight status call
    /// is never interrupted.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the poll policy in use.
    #[must_use]
    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Finds the named resource or creates it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidRequest`] for an empty name,
    /// [`LifecycleError::CreationConflict`] when create reports the name is
    /// taken although find saw nothing, and [`LifecycleError::Remote`] for
    /// any other capability failure.
    pub async fn ensure<P>(
        &self,
        name: &str,
        provisioner: &P,
    ) -> Result<ResourceHandle, LifecycleError<P::Error>>
    where
        P: Provisioner + ?Sized,
    {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(LifecycleError::InvalidRequest {
                field: String::from("name"),
            });
        }
        let kind = provisioner.status_table().kind();

        if let Some(handle) = provisioner
            .find(trimmed)
            .await
            .map_err(LifecycleError::Remote)?
        {
            info!(kind, name = trimmed, %handle, "reusing existing resource");
            return Ok(handle);
        }

        match provisioner.create(trimmed).await {
            Ok(handle) => {
                info!(kind, name = trimmed, %handle, "created resource");
                Ok(handle)
            }
            Err(err) if err.is_name_conflict() => {
                debug!(kind, name = trimmed, error = %err, "create reported a name conflict");
                Err(LifecycleError::CreationConflict {
                    kind: kind.to_owned(),
                    name: trimmed.to_owned(),
                })
            }
            Err(err) => Err(LifecycleError::Remote(err)),
        }
    }

    /// Polls `handle` until it reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::RemoteFailed`] on the first failure status,
    /// [`LifecycleError::Timeout`] once the deadline passes while the
    /// resource is still in progress, [`LifecycleError::PollFailed`] when a
    /// status call errors, [`LifecycleError::UnexpectedState`] for unknown
    /// statuses or out-of-order transitions and
    /// [`LifecycleError::Cancelled`] when the cancellation token fires.
    pub async fn poll_until_terminal<P>(
        &self,
        handle: &ResourceHandle,
        provisioner: &P,
    ) -> Result<PollReport, LifecycleError<P::Error>>
    where
        P: Provisioner + ?Sized,
    {
        let table = provisioner.status_table();
        let kind = table.kind();
        let started = Instant::now();
        let mut state = LifecycleState::Unprovisioned.begin();
        let mut attempts: u32 = 0;

        loop {
            if self.is_cancelled() {
                return Err(cancelled(kind, handle));
            }

            let status = provisioner.status(handle).await.map_err(|source| {
                LifecycleError::PollFailed {
                    kind: kind.to_owned(),
                    handle: handle.clone(),
                    source,
                }
            })?;
            attempts = attempts.saturating_add(1);

            let Some(class) = table.classify(&status) else {
                return Err(unexpected(
                    kind,
                    handle,
                    format!("status '{status}' is not a known {kind} status"),
                ));
            };
            state = state
                .observe(class)
                .map_err(|err| unexpected(kind, handle, err.to_string()))?;
            let elapsed = started.elapsed();

            match state {
                LifecycleState::Active => {
                    debug!(kind, %handle, %status, attempts, "resource reached a terminal success");
                    return Ok(PollReport {
                        attempts,
                        status,
                        elapsed,
                    });
                }
                LifecycleState::Failed => {
                    return Err(LifecycleError::RemoteFailed {
                        kind: kind.to_owned(),
                        handle: handle.clone(),
                        status,
                    });
                }
                _ => {}
            }

            self.observer.on_in_progress(&Progress {
                kind,
                handle,
                status: &status,
                attempt: attempts,
                elapsed,
            });

            if elapsed >= self.policy.timeout() {
                state
                    .time_out()
                    .map_err(|err| unexpected(kind, handle, err.to_string()))?;
                return Err(LifecycleError::Timeout {
                    kind: kind.to_owned(),
                    handle: handle.clone(),
                    waited: elapsed,
                });
            }

            if matches!(self.pause().await, Pause::Cancelled) {
                return Err(cancelled(kind, handle));
            }
        }
    }

    /// Runs [`Self::ensure`] then [`Self::poll_until_terminal`], returning
    /// the handle only when the resource reached its success state.
    ///
    /// # Errors
    ///
    /// Propagates every error from the two underlying operations.
    pub async fn ensure_and_wait<P>(
        &self,
        name: &str,
        provisioner: &P,
    ) -> Result<ResourceHandle, LifecycleError<P::Error>>
    where
        P: Provisioner + ?Sized,
    {
        let handle = self.ensure(name, provisioner).await?;
        self.poll_until_terminal(&handle, provisioner).await?;
        Ok(handle)
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    async fn pause(&self) -> Pause {
        let Some(token) = self.cancellation.as_ref() else {
            sleep(self.policy.interval()).await;
            return Pause::Elapsed;
        };
        tokio::select! {
            () = token.cancelled() => Pause::Cancelled,
            () = sleep(self.policy.interval()) => Pause::Elapsed,
        }
    }
}

fn cancelled<E>(kind: &str, handle: &ResourceHandle) -> LifecycleError<E>
where
    E: std::error::Error + 'static,
{
    LifecycleError::Cancelled {
        kind: kind.to_owned(),
        handle: handle.clone(),
    }
}

fn unexpected<E>(kind: &str, handle: &ResourceHandle, message: String) -> LifecycleError<E>
where
    E: std::error::Error + 'static,
{
    LifecycleError::UnexpectedState {
        kind: kind.to_owned(),
        handle: handle.clone(),
        message,
    }
}

#[cfg(test)]
mod tests;
