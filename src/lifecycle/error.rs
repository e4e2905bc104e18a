//! Error types for the lifecycle driver.

use std::time::Duration;

use thiserror::Error;

use super::types::{ResourceHandle, ResourceStatus};

/// Errors raised by the capabilities a caller hands to the driver.
pub trait RemoteError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` when the remote system rejected a create call because
    /// the name is already taken.
    fn is_name_conflict(&self) -> bool {
        false
    }
}

/// Errors surfaced by [`LifecycleDriver`](super::LifecycleDriver).
#[derive(Debug, Error)]
pub enum LifecycleError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when a request is missing a required value.
    #[error("invalid lifecycle request: missing or empty {field}")]
    InvalidRequest {
        /// Name of the offending input.
        field: String,
    },
    /// Raised when create reports the name exists but find saw nothing.
    #[error("{kind} '{name}' already exists but could not be found; retry ensure")]
    CreationConflict {
        /// Resource kind.
        kind: String,
        /// Name passed to ensure.
        name: String,
    },
    /// Raised when the provider reports a failure status.
    #[error("{kind} {handle} ended with status {status}")]
    RemoteFailed {
        /// Resource kind.
        kind: String,
        /// Provider identifier.
        handle: ResourceHandle,
        /// Terminal status reported by the provider.
        status: ResourceStatus,
    },
    /// Raised when the deadline elapses while the resource is in progress.
    #[error("timed out after {waited:?} waiting for {kind} {handle}")]
    Timeout {
        /// Resource kind.
        kind: String,
        /// Provider identifier.
        handle: ResourceHandle,
        /// Time spent polling before giving up.
        waited: Duration,
    },
    /// Raised when the status capability itself fails.
    #[error("status check for {kind} {handle} failed: {source}")]
    PollFailed {
        /// Resource kind.
        kind: String,
        /// Provider identifier.
        handle: ResourceHandle,
        /// Error returned by the status capability.
        #[source]
        source: E,
    },
    /// Raised when the find or create capability fails.
    #[error("remote call failed: {0}")]
    Remote(#[source] E),
    /// Raised for statuses outside the table or out-of-order transitions.
    #[error("{kind} {handle} entered an unexpected state: {message}")]
    UnexpectedState {
        /// Resource kind.
        kind: String,
        /// Provider identifier.
        handle: ResourceHandle,
        /// Description of the violation.
        message: String,
    },
    /// Raised when the caller cancelled the wait.
    #[error("wait for {kind} {handle} was cancelled")]
    Cancelled {
        /// Resource kind.
        kind: String,
        /// Provider identifier.
        handle: ResourceHandle,
    },
}

impl<E> LifecycleError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` for errors a caller may resolve by waiting longer or
    /// retrying ensure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationConflict { .. } | Self::Timeout { .. })
    }
}
