//! Model invocation through `aws bedrock-runtime invoke-model`.
//!
//! The CLI writes the response body to a file rather than stdout, so each
//! call gets a unique file in a scratch directory which is read back and
//! removed once parsed.

use std::env;
use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::aws::{AwsCli, AwsCliError, flag};
use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::{ConfigError, PipelineConfig};
use crate::payload::{InvocationRequest, PayloadError};

const SERVICE: &str = "bedrock-runtime";

/// Errors raised while invoking a model.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Raised when configuration is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when the guardrail selection is incomplete.
    #[error("guardrail {field} must not be empty")]
    InvalidGuardrail {
        /// Name of the blank field.
        field: &'static str,
    },
    /// Raised when the request is invalid or the response has no text.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// Raised when `aws` fails.
    #[error(transparent)]
    Aws(#[from] AwsCliError),
    /// Raised when the response file cannot be read or decoded.
    #[error("failed to read model response {path}: {message}")]
    Response {
        /// Response file written by the CLI.
        path: Utf8PathBuf,
        /// Description of the problem.
        message: String,
    },
}

/// Guardrail identifier and version applied to an invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GuardrailRef {
    id: String,
    version: String,
}

impl GuardrailRef {
    /// Pairs a guardrail identifier with a published version.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::InvalidGuardrail`] when either part is blank.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Result<Self, InvokeError> {
        let trimmed_id = id.into().trim().to_owned();
        let trimmed_version = version.into().trim().to_owned();
        if trimmed_id.is_empty() {
            return Err(InvokeError::InvalidGuardrail { field: "id" });
        }
        if trimmed_version.is_empty() {
            return Err(InvokeError::InvalidGuardrail { field: "version" });
        }
        Ok(Self {
            id: trimmed_id,
            version: trimmed_version,
        })
    }

    /// Guardrail identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Published guardrail version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Result of a successful invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationOutcome {
    /// Generated text extracted for the request's model family.
    pub text: String,
    /// Raw decoded response body.
    pub response: Value,
}

/// Invokes Bedrock models through the `aws` CLI.
#[derive(Clone, Debug)]
pub struct ModelInvoker<R: CommandRunner> {
    cli: AwsCli<R>,
    scratch_dir: Utf8PathBuf,
}

impl ModelInvoker<ProcessCommandRunner> {
    /// Wires an invoker to the real `aws` binary, writing responses to the
    /// system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Config`] when validation fails or the
    /// temporary directory is not valid UTF-8.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, InvokeError> {
        config.validate()?;
        let scratch_dir = Utf8PathBuf::from_path_buf(env::temp_dir()).map_err(|path| {
            ConfigError::Invalid(format!(
                "temporary directory is not valid UTF-8: {}",
                path.display()
            ))
        })?;
        Ok(Self::new(
            AwsCli::with_process_runner(config.aws_cli_config()?),
            scratch_dir,
        ))
    }
}

impl<R: CommandRunner> ModelInvoker<R> {
    /// Creates an invoker writing response files under `scratch_dir`.
    #[must_use]
    pub const fn new(cli: AwsCli<R>, scratch_dir: Utf8PathBuf) -> Self {
        Self { cli, scratch_dir }
    }

    /// Sends `request`, optionally screened by `guardrail`, and returns the
    /// generated text.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Aws`] when the CLI fails,
    /// [`InvokeError::Response`] when the response file is unusable and
    /// [`InvokeError::Payload`] when it holds no text.
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
        guardrail: Option<&GuardrailRef>,
    ) -> Result<InvocationOutcome, InvokeError> {
        let file_name = format!("claimkb-{}.json", uuid::Uuid::new_v4());
        let outfile = self.scratch_dir.join(&file_name);

        let mut args: Vec<OsString> = flag("--model-id", request.model_id()).into();
        args.extend(flag("--body", request.body().to_string()));
        args.extend(flag("--cli-binary-format", "raw-in-base64-out"));
        args.extend(flag("--content-type", "application/json"));
        args.extend(flag("--accept", "application/json"));
        if let Some(selected) = guardrail {
            args.extend(flag("--guardrail-identifier", selected.id()));
            args.extend(flag("--guardrail-version", selected.version()));
        }
        args.push(OsString::from(outfile.as_str()));

        self.cli.call(SERVICE, "invoke-model", &args).await?;
        let response = self.read_response(&file_name, &outfile)?;
        let text = request.family().extract_text(&response)?;
        info!(
            model = request.model_id(),
            family = %request.family(),
            guardrail = guardrail.map(GuardrailRef::id),
            "model invocation completed"
        );
        Ok(InvocationOutcome { text, response })
    }

    fn read_response(&self, file_name: &str, outfile: &Utf8Path) -> Result<Value, InvokeError> {
        let response_error = |message: String| InvokeError::Response {
            path: outfile.to_owned(),
            message,
        };
        let dir = Dir::open_ambient_dir(&self.scratch_dir, ambient_authority())
            .map_err(|err| response_error(err.to_string()))?;
        let raw = dir
            .read_to_string(file_name)
            .map_err(|err| response_error(err.to_string()))?;
        if let Err(err) = dir.remove_file(file_name) {
            debug!(path = %outfile, error = %err, "failed to remove response file");
        }
        serde_json::from_str(&raw).map_err(|err| response_error(err.to_string()))
    }
}

#[cfg(test)]
mod tests;
