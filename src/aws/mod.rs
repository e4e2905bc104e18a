//! Bedrock and S3 Vectors resources driven through the `aws` CLI.
//!
//! Every adapter shells out to `aws <service> <operation> ... --output json`
//! through a [`CommandRunner`] and implements
//! [`Provisioner`](crate::lifecycle::Provisioner) so the lifecycle driver can
//! create and wait for it.

mod data_source;
mod guardrail;
mod ingestion;
mod knowledge_base;
mod vector_store;

use std::ffi::OsString;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::command::{
    CommandError, CommandOutput, CommandRunner, ProcessCommandRunner, render_command,
};
use crate::lifecycle::RemoteError;

pub use data_source::{DataSource, DataSourceSpec};
pub use guardrail::{Guardrail, GuardrailSpec};
pub use ingestion::IngestionJob;
pub use knowledge_base::{KnowledgeBase, KnowledgeBaseSpec, KnowledgeBaseSummary};
pub use vector_store::{VectorStore, VectorStoreArns};

pub(crate) use knowledge_base::{delete as delete_knowledge_base, list as list_knowledge_bases};

/// Default `aws` CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

/// Connection settings shared by every `aws` invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsCliConfig {
    /// Path to the `aws` CLI binary.
    pub aws_bin: String,
    /// Region passed through `--region`.
    pub region: String,
    /// Optional named profile passed through `--profile`.
    pub profile: Option<String>,
}

impl AwsCliConfig {
    /// Constructs a config, trimming whitespace and dropping a blank profile.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError::InvalidConfig`] when the binary or region is
    /// blank.
    pub fn new(
        aws_bin: impl Into<String>,
        region: impl Into<String>,
        profile: Option<String>,
    ) -> Result<Self, AwsCliError> {
        let trimmed_bin = aws_bin.into().trim().to_owned();
        let trimmed_region = region.into().trim().to_owned();
        if trimmed_bin.is_empty() {
            return Err(AwsCliError::InvalidConfig {
                field: String::from("aws_bin"),
            });
        }
        if trimmed_region.is_empty() {
            return Err(AwsCliError::InvalidConfig {
                field: String::from("region"),
            });
        }
        let trimmed_profile = profile
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        Ok(Self {
            aws_bin: trimmed_bin,
            region: trimmed_region,
            profile: trimmed_profile,
        })
    }
}

/// Errors raised while talking to AWS through the CLI.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AwsCliError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}")]
    InvalidConfig {
        /// Name of the missing or invalid field.
        field: String,
    },
    /// Raised when `aws` returns a non-zero exit status.
    #[error("{program} {operation} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed (typically `aws`).
        program: String,
        /// Service and operation, for example `bedrock-agent get-knowledge-base`.
        operation: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when JSON output from the CLI cannot be parsed.
    #[error("failed to parse {operation} output: {message}")]
    Parse {
        /// Service and operation whose output was parsed.
        operation: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when a response lacks a field the caller needs.
    #[error("{operation} response is missing '{field}'")]
    MissingField {
        /// Service and operation whose output was inspected.
        operation: String,
        /// JSON pointer of the missing field.
        field: String,
    },
    /// Raised when command execution fails.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

impl AwsCliError {
    /// Returns `true` when AWS reported that the addressed resource does not
    /// exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CommandFailure { stderr, .. } if stderr.contains("NotFoundException")
        )
    }
}

impl RemoteError for AwsCliError {
    /// Bedrock also raises `ConflictException` for concurrent modification,
    /// so only the "already exists" message counts as a name conflict.
    fn is_name_conflict(&self) -> bool {
        matches!(
            self,
            Self::CommandFailure { stderr, .. } if stderr.contains("already exist")
        )
    }
}

/// Thin wrapper that runs `aws` commands and decodes their JSON output.
#[derive(Clone, Debug)]
pub struct AwsCli<R: CommandRunner> {
    config: AwsCliConfig,
    runner: R,
}

impl AwsCli<ProcessCommandRunner> {
    /// Creates a wrapper that spawns the real `aws` binary.
    #[must_use]
    pub const fn with_process_runner(config: AwsCliConfig) -> Self {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> AwsCli<R> {
    /// Creates a wrapper using the provided configuration and runner.
    #[must_use]
    pub const fn new(config: AwsCliConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Returns the connection settings.
    #[must_use]
    pub const fn config(&self) -> &AwsCliConfig {
        &self.config
    }

    /// Runs `aws <service> <operation> <args>` and returns stdout.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError::Runner`] when the binary cannot be spawned and
    /// [`AwsCliError::CommandFailure`] when it exits unsuccessfully.
    pub async fn call(
        &self,
        service: &str,
        operation: &str,
        args: &[OsString],
    ) -> Result<String, AwsCliError> {
        let argv = self.build_args(service, operation, args);
        debug!(command = %render_command(&self.config.aws_bin, &argv), "running aws");
        let output = self.runner.run(&self.config.aws_bin, &argv).await?;
        self.check_output(output, service, operation)
            .map(|out| out.stdout)
    }

    /// Runs a command and parses stdout as JSON. Empty output becomes
    /// [`Value::Null`], as several delete operations print nothing.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::call`] plus [`AwsCliError::Parse`] for
    /// malformed output.
    pub async fn call_json(
        &self,
        service: &str,
        operation: &str,
        args: &[OsString],
    ) -> Result<Value, AwsCliError> {
        let stdout = self.call(service, operation, args).await?;
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|err| AwsCliError::Parse {
            operation: format!("{service} {operation}"),
            message: err.to_string(),
        })
    }

    /// Runs a command and deserialises stdout into `T`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::call`] plus [`AwsCliError::Parse`] when
    /// the output does not match `T`.
    pub async fn call_as<T>(
        &self,
        service: &str,
        operation: &str,
        args: &[OsString],
    ) -> Result<T, AwsCliError>
    where
        T: DeserializeOwned,
    {
        let stdout = self.call(service, operation, args).await?;
        serde_json::from_str(&stdout).map_err(|err| AwsCliError::Parse {
            operation: format!("{service} {operation}"),
            message: err.to_string(),
        })
    }

    fn build_args(&self, service: &str, operation: &str, args: &[OsString]) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(args.len().saturating_add(8));
        argv.push(OsString::from(service));
        argv.push(OsString::from(operation));
        argv.extend(args.iter().cloned());
        argv.push(OsString::from("--region"));
        argv.push(OsString::from(&self.config.region));
        if let Some(profile) = &self.config.profile {
            argv.push(OsString::from("--profile"));
            argv.push(OsString::from(profile));
        }
        argv.push(OsString::from("--output"));
        argv.push(OsString::from("json"));
        argv
    }

    fn check_output(
        &self,
        output: CommandOutput,
        service: &str,
        operation: &str,
    ) -> Result<CommandOutput, AwsCliError> {
        if output.is_success() {
            return Ok(output);
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(AwsCliError::CommandFailure {
            program: self.config.aws_bin.clone(),
            operation: format!("{service} {operation}"),
            status: output.code,
            status_text,
            stderr: output.stderr.trim().to_owned(),
        })
    }
}

/// Reads a string field addressed by a JSON pointer.
pub(crate) fn string_at(
    value: &Value,
    pointer: &str,
    operation: &str,
) -> Result<String, AwsCliError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AwsCliError::MissingField {
            operation: operation.to_owned(),
            field: pointer.to_owned(),
        })
}

/// Builds a `--flag value` pair.
pub(crate) fn flag(name: &str, value: impl Into<OsString>) -> [OsString; 2] {
    [OsString::from(name), value.into()]
}

/// Generates an idempotency token for create calls.
pub(crate) fn client_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
