//! Progress reporting hooks for the poll loop.

use std::time::Duration;

use tracing::info;

use super::types::{ResourceHandle, ResourceStatus};

/// Snapshot passed to observers after each in-progress observation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Progress<'a> {
    /// Resource kind from the status table.
    pub kind: &'a str,
    /// Resource being polled.
    pub handle: &'a ResourceHandle,
    /// Status just reported by the provider.
    pub status: &'a ResourceStatus,
    /// One-based poll counter.
    pub attempt: u32,
    /// Time since the first poll started.
    pub elapsed: Duration,
}

/// Receives in-progress notifications. Implementations must not block; the
/// driver ignores whatever they do.
pub trait ProgressObserver: Send + Sync {
    /// Called once per in-progress observation, before the deadline check.
    fn on_in_progress(&self, progress: &Progress<'_>);
}

/// Observer that emits an `info` event per in-progress poll.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_in_progress(&self, progress: &Progress<'_>) {
        info!(
            kind = progress.kind,
            handle = %progress.handle,
            status = %progress.status,
            attempt = progress.attempt,
            elapsed_secs = progress.elapsed.as_secs(),
            "resource still provisioning"
        );
    }
}

/// Observer that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn on_in_progress(&self, _progress: &Progress<'_>) {}
}
