//! Deletes the resources `claimkb provision` and `claimkb guardrail` create.
//!
//! The sweep removes the named knowledge base, the vector index and bucket,
//! and every guardrail with the configured name, then re-lists them and
//! fails if anything remains. Knowledge bases already in `DELETING` count as
//! gone because Bedrock finishes removing them asynchronously.

use thiserror::Error;
use tracing::info;

use crate::aws::{
    AwsCli, AwsCliError, Guardrail, GuardrailSpec, KnowledgeBaseSummary, VectorStore,
    delete_knowledge_base, list_knowledge_bases,
};
use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::{ConfigError, PipelineConfig};

const DELETING: &str = "DELETING";

/// Names of the resources a sweep removes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownTargets {
    /// Knowledge base name.
    pub knowledge_base_name: String,
    /// Vector bucket name.
    pub vector_bucket: String,
    /// Vector index name inside the bucket.
    pub vector_index: String,
    /// Guardrail name.
    pub guardrail_name: String,
}

impl TeardownTargets {
    /// Collects the resource names from `config`.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            knowledge_base_name: config.knowledge_base_name.clone(),
            vector_bucket: config.vector_bucket.clone(),
            vector_index: config.vector_index.clone(),
            guardrail_name: config.guardrail_name.clone(),
        }
    }
}

/// Summary of teardown work.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownSummary {
    /// Number of knowledge bases whose deletion was requested.
    pub deleted_knowledge_bases: usize,
    /// Number of vector buckets deleted along with their index.
    pub deleted_vector_stores: usize,
    /// Number of guardrails deleted.
    pub deleted_guardrails: usize,
}

/// Errors returned by the teardown sweep.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// Raised when configuration is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when an `aws` call fails.
    #[error(transparent)]
    Aws(#[from] AwsCliError),
    /// Raised when resources remain after the sweep.
    #[error("resources remain after teardown: {message}")]
    NotClean {
        /// Human-readable description of what remains.
        message: String,
    },
}

/// Deletes the configured resources by shelling out to `aws`.
#[derive(Clone, Debug)]
pub struct Teardown<R: CommandRunner + Clone> {
    targets: TeardownTargets,
    cli: AwsCli<R>,
}

impl Teardown<ProcessCommandRunner> {
    /// Validates `config` and wires the sweep to the real `aws` binary.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError::Config`] when validation fails.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, TeardownError> {
        config.validate()?;
        Ok(Self::new(
            TeardownTargets::from_config(config),
            AwsCli::with_process_runner(config.aws_cli_config()?),
        ))
    }
}

impl<R: CommandRunner + Clone> Teardown<R> {
    /// Creates a sweep for `targets` using `cli`.
    #[must_use]
    pub const fn new(targets: TeardownTargets, cli: AwsCli<R>) -> Self {
        Self { targets, cli }
    }

    /// Deletes every target and verifies nothing remains.
    ///
    /// Knowledge bases go first because they hold the vector index open.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError::Aws`] when a list or delete call fails and
    /// [`TeardownError::NotClean`] when resources remain afterwards.
    pub async fn sweep(&self) -> Result<TeardownSummary, TeardownError> {
        let mut summary = TeardownSummary::default();

        for knowledge_base in self.live_knowledge_bases().await? {
            delete_knowledge_base(&self.cli, &knowledge_base.knowledge_base_id).await?;
            info!(knowledge_base = %knowledge_base.knowledge_base_id, "requested knowledge base deletion");
            summary.deleted_knowledge_bases = summary.deleted_knowledge_bases.saturating_add(1);
        }

        let store = self.vector_store();
        if self.vector_bucket_exists(&store).await? {
            store.delete(&self.targets.vector_bucket).await?;
            info!(bucket = %self.targets.vector_bucket, "deleted vector store");
            summary.deleted_vector_stores = 1;
        }

        let guardrail = self.guardrail();
        for id in guardrail.ids_named(&self.targets.guardrail_name).await? {
            guardrail.delete(&id).await?;
            info!(guardrail = %id, "deleted guardrail");
            summary.deleted_guardrails = summary.deleted_guardrails.saturating_add(1);
        }

        self.verify_clean(&store, &guardrail).await?;
        Ok(summary)
    }

    async fn verify_clean(
        &self,
        store: &VectorStore<R>,
        guardrail: &Guardrail<R>,
    ) -> Result<(), TeardownError> {
        let remaining_knowledge_bases = self.live_knowledge_bases().await?.len();
        let remaining_buckets = usize::from(self.vector_bucket_exists(store).await?);
        let remaining_guardrails = guardrail
            .ids_named(&self.targets.guardrail_name)
            .await?
            .len();

        if remaining_knowledge_bases > 0 || remaining_buckets > 0 || remaining_guardrails > 0 {
            let message = format!(
                "knowledge bases remaining: {remaining_knowledge_bases}, \
                 vector buckets remaining: {remaining_buckets}, \
                 guardrails remaining: {remaining_guardrails}"
            );
            return Err(TeardownError::NotClean { message });
        }
        Ok(())
    }

    async fn live_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSummary>, AwsCliError> {
        Ok(list_knowledge_bases(&self.cli)
            .await?
            .into_iter()
            .filter(|summary| summary.name == self.targets.knowledge_base_name)
            .filter(|summary| summary.status.as_deref() != Some(DELETING))
            .collect())
    }

    async fn vector_bucket_exists(&self, store: &VectorStore<R>) -> Result<bool, AwsCliError> {
        Ok(store
            .bucket_names()
            .await?
            .iter()
            .any(|name| *name == self.targets.vector_bucket))
    }

    fn vector_store(&self) -> VectorStore<R> {
        // Dimension only matters when creating the index.
        VectorStore::new(self.cli.clone(), self.targets.vector_index.as_str(), 0)
    }

    fn guardrail(&self) -> Guardrail<R> {
        Guardrail::new(self.cli.clone(), GuardrailSpec::default())
    }
}
