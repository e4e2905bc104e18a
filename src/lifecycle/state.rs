//! Per-resource lifecycle state machine.

use std::fmt;

use thiserror::Error;

use super::status::StatusClass;

/// Where a single resource stands for one driver invocation.
///
/// `Active`, `Failed` and `TimedOut` are terminal. `TimedOut` is a
/// client-side give-up: the remote resource may still be provisioning.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LifecycleState {
    /// No resource exists yet.
    Unprovisioned,
    /// The resource exists and is still provisioning.
    Creating,
    /// The provider reported a success status.
    Active,
    /// The provider reported a failure status.
    Failed,
    /// The deadline elapsed while the resource was still provisioning.
    TimedOut,
}

/// Raised when a transition would break the monotonic status order.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("cannot move from {from} after observing a status that is {observed}")]
pub struct TransitionError {
    /// State held before the offending observation.
    pub from: LifecycleState,
    /// Class that was observed.
    pub observed: StatusClass,
}

/// Raised when a timeout is recorded for a resource not in flight.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("cannot time out a resource that is {from}")]
pub struct TimeoutTransitionError {
    /// State held when the timeout was recorded.
    pub from: LifecycleState,
}

impl LifecycleState {
    /// Returns `true` when no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Active | Self::Failed | Self::TimedOut)
    }

    /// Marks the resource as existing; used once creation or discovery
    /// produced a handle.
    #[must_use]
    pub const fn begin(self) -> Self {
        match self {
            Self::Unprovisioned => Self::Creating,
            other => other,
        }
    }

    /// Applies a status observation.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the resource is not in flight, which
    /// covers a terminal resource reverting to in-progress.
    pub const fn observe(self, class: StatusClass) -> Result<Self, TransitionError> {
        match (self, class) {
            (Self::Creating, StatusClass::InProgress) => Ok(Self::Creating),
            (Self::Creating, StatusClass::Succeeded) => Ok(Self::Active),
            (Self::Creating, StatusClass::Failed) => Ok(Self::Failed),
            (from, observed) => Err(TransitionError { from, observed }),
        }
    }

    /// Records that the caller gave up waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutTransitionError`] unless the resource is in flight.
    pub const fn time_out(self) -> Result<Self, TimeoutTransitionError> {
        match self {
            Self::Creating => Ok(Self::TimedOut),
            from => Err(TimeoutTransitionError { from }),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unprovisioned => "unprovisioned",
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
        };
        f.write_str(label)
    }
}
