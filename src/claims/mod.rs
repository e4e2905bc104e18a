//! Claim summarisation and evaluation for `claimkb summarise`.
//!
//! A claim is summarised in two model calls: the first extracts the key
//! fields as JSON and the second condenses them. [`ClaimProcessor::evaluate`]
//! then asks a judge model to grade the summary for accuracy against the
//! document and for writing quality.

mod prompt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::info;

use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::{ConfigError, PipelineConfig};
use crate::invoke::{GuardrailRef, InvokeError, ModelInvoker};
use crate::payload::{InvocationRequest, PayloadError};

pub use prompt::PromptTemplate;

/// Errors raised while summarising or evaluating a claim.
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Raised when configuration is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a value substituted into a prompt is blank.
    #[error("claim {field} must not be empty")]
    BlankInput {
        /// Name of the blank value.
        field: &'static str,
    },
    /// Raised when the claim document cannot be read.
    #[error("failed to read claim document {path}: {message}")]
    Document {
        /// Path that was read.
        path: Utf8PathBuf,
        /// Description of the problem.
        message: String,
    },
    /// Raised when a prompt does not form a valid request.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// Raised when a model invocation fails.
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// Fields extracted from a claim and the summary written from them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimSummary {
    /// Model output of the extraction step, normally JSON.
    pub extracted: String,
    /// Concise summary written from the extracted fields.
    pub summary: String,
}

/// Judge verdicts on a summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimEvaluation {
    /// Factual accuracy verdict against the source document.
    pub accuracy: String,
    /// Writing quality verdict.
    pub quality: String,
}

/// Reads a UTF-8 claim document.
///
/// # Errors
///
/// Returns [`ClaimError::Document`] when the file cannot be read and
/// [`ClaimError::BlankInput`] when it holds only whitespace.
pub fn read_document(path: &Utf8Path) -> Result<String, ClaimError> {
    let document_error = |message: String| ClaimError::Document {
        path: path.to_owned(),
        message,
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| document_error(String::from("path has no file name")))?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| document_error(err.to_string()))?;
    let text = dir
        .read_to_string(file_name)
        .map_err(|err| document_error(err.to_string()))?;
    if text.trim().is_empty() {
        return Err(ClaimError::BlankInput { field: "document" });
    }
    Ok(text)
}

/// Summarises claim documents and grades the results.
#[derive(Clone, Debug)]
pub struct ClaimProcessor<R: CommandRunner> {
    invoker: ModelInvoker<R>,
    model_id: String,
    judge_model_id: String,
}

impl ClaimProcessor<ProcessCommandRunner> {
    /// Validates `config` and wires the processor to the real `aws` binary.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::Config`] when validation fails.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ClaimError> {
        config.validate_claims()?;
        Ok(Self::new(
            ModelInvoker::from_config(config)?,
            config.model_id.clone(),
            config.judge_model_id.clone(),
        ))
    }
}

impl<R: CommandRunner> ClaimProcessor<R> {
    /// Creates a processor summarising with `model_id` and judging with
    /// `judge_model_id`.
    #[must_use]
    pub const fn new(invoker: ModelInvoker<R>, model_id: String, judge_model_id: String) -> Self {
        Self {
            invoker,
            model_id,
            judge_model_id,
        }
    }

    /// Extracts the claim's key fields and summarises them.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::BlankInput`] for a blank document or extraction
    /// result and [`ClaimError::Invoke`] when a model call fails.
    pub async fn summarise(&self, document: &str) -> Result<ClaimSummary, ClaimError> {
        let extracted = self
            .run(&self.model_id, PromptTemplate::ExtractInfo { document }, None)
            .await?;
        let summary = self
            .run(
                &self.model_id,
                PromptTemplate::Summarise {
                    extracted: &extracted,
                },
                None,
            )
            .await?;
        info!(
            model = %self.model_id,
            summary_chars = summary.chars().count(),
            "claim summarised"
        );
        Ok(ClaimSummary { extracted, summary })
    }

    /// Grades `summary` with the judge model, optionally screened by
    /// `guardrail`.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::BlankInput`] for blank inputs and
    /// [`ClaimError::Invoke`] when a model call fails.
    pub async fn evaluate(
        &self,
        document: &str,
        summary: &str,
        guardrail: Option<&GuardrailRef>,
    ) -> Result<ClaimEvaluation, ClaimError> {
        let accuracy = self
            .run(
                &self.judge_model_id,
                PromptTemplate::Accuracy { document, summary },
                guardrail,
            )
            .await?;
        let quality = self
            .run(
                &self.judge_model_id,
                PromptTemplate::Quality { summary },
                guardrail,
            )
            .await?;
        info!(
            judge = %self.judge_model_id,
            guardrail = guardrail.map(GuardrailRef::id),
            "claim summary evaluated"
        );
        Ok(ClaimEvaluation { accuracy, quality })
    }

    async fn run(
        &self,
        model_id: &str,
        template: PromptTemplate<'_>,
        guardrail: Option<&GuardrailRef>,
    ) -> Result<String, ClaimError> {
        let mut builder = InvocationRequest::builder(model_id, template.render()?)
            .max_tokens(template.max_tokens())
            .temperature(template.temperature());
        if let Some(system) = template.system() {
            builder = builder.system(system);
        }
        let outcome = self.invoker.invoke(&builder.build()?, guardrail).await?;
        Ok(outcome.text)
    }
}
