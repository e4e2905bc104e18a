//! Status vocabularies and their classification into lifecycle classes.
//!
//! Every resource kind reports its own status strings. A [`StatusTable`]
//! maps those strings onto the three classes the driver understands, so the
//! same poll loop serves knowledge bases, ingestion jobs and guardrails.

use std::collections::BTreeMap;
use std::fmt;

use super::types::ResourceStatus;

/// Coarse class of a provider status.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusClass {
    /// The resource is still being provisioned.
    InProgress,
    /// The resource reached its usable terminal state.
    Succeeded,
    /// The provider declared the resource failed or stopped.
    Failed,
}

impl StatusClass {
    /// Returns `true` for classes no further transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InProgress => "in progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Mapping from provider status strings to [`StatusClass`] for one resource
/// kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusTable {
    kind: String,
    entries: BTreeMap<String, StatusClass>,
}

impl StatusTable {
    /// Starts an empty table for the named resource kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Registers statuses that mean provisioning is still under way.
    #[must_use]
    pub fn in_progress(self, statuses: &[&str]) -> Self {
        self.with_class(statuses, StatusClass::InProgress)
    }

    /// Registers statuses that mean the resource is ready.
    #[must_use]
    pub fn succeeded(self, statuses: &[&str]) -> Self {
        self.with_class(statuses, StatusClass::Succeeded)
    }

    /// Registers statuses that mean the provider gave up on the resource.
    #[must_use]
    pub fn failed(self, statuses: &[&str]) -> Self {
        self.with_class(statuses, StatusClass::Failed)
    }

    fn with_class(mut self, statuses: &[&str], class: StatusClass) -> Self {
        for status in statuses {
            self.entries.insert((*status).to_owned(), class);
        }
        self
    }

    /// Human-readable resource kind used in logs and errors.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Classifies a raw status. Returns `None` for strings the table does
    /// not know.
    #[must_use]
    pub fn classify(&self, status: &ResourceStatus) -> Option<StatusClass> {
        self.entries.get(status.trim()).copied()
    }

    /// Bedrock knowledge base vocabulary.
    #[must_use]
    pub fn knowledge_base() -> Self {
        Self::new("knowledge base")
            .in_progress(&["CREATING", "UPDATING"])
            .succeeded(&["ACTIVE"])
            .failed(&["FAILED", "DELETE_UNSUCCESSFUL", "DELETING"])
    }

    /// Bedrock knowledge base data source vocabulary. A data source is
    /// usable as soon as it exists, so nothing counts as in progress.
    #[must_use]
    pub fn data_source() -> Self {
        Self::new("data source")
            .succeeded(&["AVAILABLE"])
            .failed(&["DELETING", "DELETE_UNSUCCESSFUL"])
    }

    /// Bedrock ingestion job vocabulary.
    #[must_use]
    pub fn ingestion_job() -> Self {
        Self::new("ingestion job")
            .in_progress(&["STARTING", "IN_PROGRESS", "STOPPING"])
            .succeeded(&["COMPLETE"])
            .failed(&["FAILED", "STOPPED"])
    }

    /// S3 vector bucket and index vocabulary. The service has no status
    /// field; the adapter reports presence of the index instead.
    #[must_use]
    pub fn vector_store() -> Self {
        Self::new("vector store")
            .succeeded(&["AVAILABLE"])
            .failed(&["MISSING"])
    }

    /// Bedrock guardrail vocabulary.
    #[must_use]
    pub fn guardrail() -> Self {
        Self::new("guardrail")
            .in_progress(&["CREATING", "UPDATING", "VERSIONING"])
            .succeeded(&["READY"])
            .failed(&["FAILED", "DELETING"])
    }
}
