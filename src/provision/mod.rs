//! Knowledge base provisioning pipeline for `claimkb provision`.
//!
//! The pipeline uploads policy documents, ensures the vector store, the
//! knowledge base and its data source, then runs an ingestion job so the
//! knowledge base answers questions about the uploaded documents.

mod guardrail;

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{info, warn};

use crate::aws::{
    AwsCli, AwsCliError, DataSource, IngestionJob, KnowledgeBase, VectorStore,
};
use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::{ConfigError, PipelineConfig};
use crate::lifecycle::{LifecycleDriver, LifecycleError, Provisioner, ResourceHandle};

pub use guardrail::{GuardrailError, GuardrailOutcome, GuardrailWorkflow};

/// Lifecycle failure for an `aws`-backed resource, boxed to keep results small.
pub type StepError = Box<LifecycleError<AwsCliError>>;

/// Errors raised while provisioning the knowledge base.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raised when configuration is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when the local document directory is unusable.
    #[error("cannot read documents from {path}: {message}")]
    Documents {
        /// Directory passed to the pipeline.
        path: Utf8PathBuf,
        /// Description of the problem.
        message: String,
    },
    /// Raised when `aws s3 sync` fails.
    #[error("failed to upload documents: {0}")]
    Upload(#[source] AwsCliError),
    /// Raised when the vector bucket or index cannot be ensured.
    #[error("vector store step failed: {0}")]
    VectorStore(#[source] StepError),
    /// Raised when the vector store ARNs cannot be resolved.
    #[error("failed to resolve vector store ARNs: {0}")]
    VectorStoreArns(#[source] AwsCliError),
    /// Raised when the knowledge base does not become active.
    #[error("knowledge base step failed: {0}")]
    KnowledgeBase(#[source] StepError),
    /// Raised when the data source does not become available.
    #[error("data source step failed: {0}")]
    DataSource(#[source] StepError),
    /// Raised when the ingestion job does not complete.
    #[error("ingestion step failed: {0}")]
    Ingestion(#[source] StepError),
}

/// Identifiers produced by a successful pipeline run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineOutcome {
    /// Number of documents found in the uploaded directory, if any.
    pub uploaded_documents: Option<usize>,
    /// Vector bucket backing the knowledge base.
    pub vector_bucket: ResourceHandle,
    /// Active knowledge base.
    pub knowledge_base_id: ResourceHandle,
    /// Available data source.
    pub data_source_id: ResourceHandle,
    /// Completed ingestion job.
    pub ingestion_job_id: ResourceHandle,
}

/// Runs [`LifecycleDriver::ensure_and_wait`], retrying `ensure` once when a
/// concurrent creator won the name.
///
/// # Errors
///
/// Returns the driver's error for the second attempt, or for any other
/// failure.
pub async fn ensure_ready<P>(
    driver: &LifecycleDriver,
    name: &str,
    provisioner: &P,
) -> Result<ResourceHandle, LifecycleError<P::Error>>
where
    P: Provisioner + ?Sized,
{
    let handle = match driver.ensure(name, provisioner).await {
        Err(LifecycleError::CreationConflict { kind, .. }) => {
            warn!(kind = %kind, name, "name taken by a concurrent create; retrying ensure");
            driver.ensure(name, provisioner).await?
        }
        other => other?,
    };
    driver.poll_until_terminal(&handle, provisioner).await?;
    Ok(handle)
}

/// Provisions the knowledge base stack described by a [`PipelineConfig`].
#[derive(Clone, Debug)]
pub struct KnowledgeBasePipeline<R: CommandRunner + Clone> {
    config: PipelineConfig,
    cli: AwsCli<R>,
    driver: LifecycleDriver,
}

impl KnowledgeBasePipeline<ProcessCommandRunner> {
    /// Validates `config` and wires the pipeline to the real `aws` binary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when validation fails.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate_knowledge_base()?;
        let cli = AwsCli::with_process_runner(config.aws_cli_config()?);
        let driver = LifecycleDriver::new(config.poll_policy()?);
        Ok(Self::new(config, cli, driver))
    }
}

impl<R: CommandRunner + Clone> KnowledgeBasePipeline<R> {
    /// Creates a pipeline from explicit parts.
    #[must_use]
    pub const fn new(config: PipelineConfig, cli: AwsCli<R>, driver: LifecycleDriver) -> Self {
        Self {
            config,
            cli,
            driver,
        }
    }

    /// Runs every step, uploading `documents` first when given.
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] variant naming the step that failed.
    pub async fn execute(
        &self,
        documents: Option<&Utf8Path>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let uploaded_documents = match documents {
            Some(path) => Some(self.upload(path).await?),
            None => None,
        };

        let store = VectorStore::new(
            self.cli.clone(),
            self.config.vector_index.as_str(),
            self.config.vector_dimension,
        );
        let vector_bucket = ensure_ready(&self.driver, &self.config.vector_bucket, &store)
            .await
            .map_err(|err| PipelineError::VectorStore(Box::new(err)))?;
        let storage = store
            .arns(&vector_bucket)
            .await
            .map_err(PipelineError::VectorStoreArns)?;

        let knowledge_base = KnowledgeBase::new(
            self.cli.clone(),
            self.config.knowledge_base_spec(),
            storage,
        );
        let knowledge_base_id =
            ensure_ready(&self.driver, &self.config.knowledge_base_name, &knowledge_base)
                .await
                .map_err(|err| PipelineError::KnowledgeBase(Box::new(err)))?;

        let data_source = DataSource::new(
            self.cli.clone(),
            knowledge_base_id.clone(),
            self.config.data_source_spec(),
        );
        let data_source_id =
            ensure_ready(&self.driver, &self.config.data_source_name, &data_source)
                .await
                .map_err(|err| PipelineError::DataSource(Box::new(err)))?;

        let job = IngestionJob::new(
            self.cli.clone(),
            knowledge_base_id.clone(),
            data_source_id.clone(),
        );
        let job_name = format!("{} ingestion", self.config.knowledge_base_name);
        let ingestion_job_id = self
            .driver
            .ensure_and_wait(&job_name, &job)
            .await
            .map_err(|err| PipelineError::Ingestion(Box::new(err)))?;

        info!(
            knowledge_base = %knowledge_base_id,
            data_source = %data_source_id,
            ingestion_job = %ingestion_job_id,
            "knowledge base ready"
        );
        Ok(PipelineOutcome {
            uploaded_documents,
            vector_bucket,
            knowledge_base_id,
            data_source_id,
            ingestion_job_id,
        })
    }

    async fn upload(&self, path: &Utf8Path) -> Result<usize, PipelineError> {
        let count = count_documents(path)?;
        let destination = format!(
            "s3://{}/{}",
            self.config.document_bucket,
            self.config.document_prefix.trim_start_matches('/')
        );
        let args = [OsString::from(path.as_str()), OsString::from(&destination)];
        self.cli
            .call("s3", "sync", &args)
            .await
            .map_err(PipelineError::Upload)?;
        info!(documents = count, %destination, "uploaded policy documents");
        Ok(count)
    }
}

fn count_documents(path: &Utf8Path) -> Result<usize, PipelineError> {
    let documents_error = |message: String| PipelineError::Documents {
        path: path.to_owned(),
        message,
    };
    let dir = Dir::open_ambient_dir(path, ambient_authority())
        .map_err(|err| documents_error(err.to_string()))?;
    let mut count = 0_usize;
    for entry in dir
        .entries()
        .map_err(|err| documents_error(err.to_string()))?
    {
        let file_type = entry
            .and_then(|item| item.file_type())
            .map_err(|err| documents_error(err.to_string()))?;
        if file_type.is_file() {
            count = count.saturating_add(1);
        }
    }
    if count == 0 {
        return Err(documents_error(String::from("directory contains no files")));
    }
    Ok(count)
}

#[cfg(test)]
mod tests;
