//! Guardrail provisioning for `claimkb guardrail`.

use thiserror::Error;
use tracing::info;

use super::{StepError, ensure_ready};
use crate::aws::{AwsCli, AwsCliError, Guardrail, GuardrailSpec};
use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::{ConfigError, PipelineConfig};
use crate::lifecycle::{LifecycleDriver, ResourceHandle};

/// Errors raised while provisioning the guardrail.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// Raised when configuration is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when the guardrail does not become ready.
    #[error("guardrail step failed: {0}")]
    Lifecycle(#[source] StepError),
    /// Raised when listing or publishing versions fails.
    #[error("failed to publish guardrail version: {0}")]
    Version(#[source] AwsCliError),
}

/// Identifier and published version of a ready guardrail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GuardrailOutcome {
    /// Guardrail identifier.
    pub guardrail_id: ResourceHandle,
    /// Numbered version to pass at invocation time.
    pub version: String,
    /// `true` when the version was published by this run.
    pub published: bool,
}

/// Ensures the claim-screening guardrail and a published version.
#[derive(Clone, Debug)]
pub struct GuardrailWorkflow<R: CommandRunner + Clone> {
    name: String,
    cli: AwsCli<R>,
    driver: LifecycleDriver,
}

impl GuardrailWorkflow<ProcessCommandRunner> {
    /// Validates `config` and wires the workflow to the real `aws` binary.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailError::Config`] when validation fails.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, GuardrailError> {
        config.validate()?;
        Ok(Self::new(
            config.guardrail_name.clone(),
            AwsCli::with_process_runner(config.aws_cli_config()?),
            LifecycleDriver::new(config.poll_policy()?),
        ))
    }
}

impl<R: CommandRunner + Clone> GuardrailWorkflow<R> {
    /// Creates a workflow from explicit parts.
    #[must_use]
    pub const fn new(name: String, cli: AwsCli<R>, driver: LifecycleDriver) -> Self {
        Self { name, cli, driver }
    }

    /// Ensures the guardrail is ready, then reuses its highest published
    /// version or publishes the first one and waits for versioning to settle.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailError::Lifecycle`] when the guardrail fails to
    /// become ready and [`GuardrailError::Version`] when versioning fails.
    pub async fn execute(&self) -> Result<GuardrailOutcome, GuardrailError> {
        let guardrail = Guardrail::new(self.cli.clone(), GuardrailSpec::default());
        let guardrail_id = ensure_ready(&self.driver, &self.name, &guardrail)
            .await
            .map_err(|err| GuardrailError::Lifecycle(Box::new(err)))?;

        if let Some(version) = guardrail
            .published_version(&guardrail_id)
            .await
            .map_err(GuardrailError::Version)?
        {
            info!(guardrail = %guardrail_id, version = %version, "reusing published guardrail version");
            return Ok(GuardrailOutcome {
                guardrail_id,
                version,
                published: false,
            });
        }

        let version = guardrail
            .create_version(&guardrail_id)
            .await
            .map_err(GuardrailError::Version)?;
        self.driver
            .poll_until_terminal(&guardrail_id, &guardrail)
            .await
            .map_err(|err| GuardrailError::Lifecycle(Box::new(err)))?;
        info!(guardrail = %guardrail_id, version = %version, "published guardrail version");
        Ok(GuardrailOutcome {
            guardrail_id,
            version,
            published: true,
        })
    }
}
