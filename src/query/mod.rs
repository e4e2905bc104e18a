//! Knowledge base question answering for `claimkb query`.
//!
//! Questions go through `aws bedrock-agent-runtime`: `retrieve` returns the
//! closest passages and `retrieve-and-generate` asks a model to answer from
//! them. Both accept an optional guardrail.

use std::ffi::OsString;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::aws::{AwsCli, AwsCliError, Guardrail, GuardrailSpec, flag, list_knowledge_bases};
use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::{ConfigError, MAX_RETRIEVAL_RESULTS, PipelineConfig};
use crate::invoke::{GuardrailRef, InvokeError};
use crate::lifecycle::ResourceHandle;

const SERVICE: &str = "bedrock-agent-runtime";

/// Errors raised while querying the knowledge base.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Raised when configuration is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when the question is blank.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// Raised when generation settings are out of range.
    #[error("invalid query settings: {0}")]
    InvalidSettings(String),
    /// Raised when no knowledge base carries the configured name.
    #[error("no knowledge base named '{name}'; run `claimkb provision` first")]
    KnowledgeBaseNotFound {
        /// Name that was looked up.
        name: String,
    },
    /// Raised when no guardrail with a published version carries the name.
    #[error("no published guardrail named '{name}'; run `claimkb guardrail` first")]
    GuardrailNotFound {
        /// Name that was looked up.
        name: String,
    },
    /// Raised when a resolved guardrail reference is unusable.
    #[error(transparent)]
    Guardrail(#[from] InvokeError),
    /// Raised when `aws` fails or prints unexpected output.
    #[error(transparent)]
    Aws(#[from] AwsCliError),
}

/// Retrieval and generation parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySettings {
    /// Passages retrieved per question.
    pub number_of_results: u32,
    /// Token limit for generated answers.
    pub max_tokens: u32,
    /// Sampling temperature for generated answers.
    pub temperature: f64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            number_of_results: 3,
            max_tokens: 512,
            temperature: 0.5,
        }
    }
}

impl QuerySettings {
    fn validate(&self) -> Result<(), QueryError> {
        if !(1..=MAX_RETRIEVAL_RESULTS).contains(&self.number_of_results) {
            return Err(QueryError::InvalidSettings(format!(
                "number_of_results must be between 1 and {MAX_RETRIEVAL_RESULTS}, got {}",
                self.number_of_results
            )));
        }
        if self.max_tokens == 0 {
            return Err(QueryError::InvalidSettings(String::from(
                "max_tokens must be greater than zero",
            )));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(QueryError::InvalidSettings(format!(
                "temperature must be between 0.0 and 1.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Passage returned by `retrieve`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievedPassage {
    /// Chunk text.
    pub text: String,
    /// Relevance score reported by the vector search.
    pub score: Option<f64>,
    /// S3 URI of the source document.
    pub source: Option<String>,
}

/// Answer returned by `retrieve-and-generate`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedAnswer {
    /// Generated answer text.
    pub text: String,
    /// Number of citations backing the answer.
    pub citations: usize,
    /// Distinct S3 URIs cited, in order of first appearance.
    pub sources: Vec<String>,
    /// `true` when the guardrail replaced or blocked the answer.
    pub guardrail_intervened: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3Location {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    #[serde(default)]
    s3_location: Option<S3Location>,
}

#[derive(Debug, Deserialize)]
struct RetrievalContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RetrievalResult {
    content: RetrievalContent,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    location: Option<Location>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RetrievalResult>,
}

#[derive(Debug, Deserialize)]
struct GeneratedOutput {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrievedReference {
    #[serde(default)]
    location: Option<Location>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Citation {
    #[serde(default)]
    retrieved_references: Vec<RetrievedReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    output: GeneratedOutput,
    #[serde(default)]
    citations: Vec<Citation>,
    #[serde(default)]
    guardrail_action: Option<String>,
}

fn source_uri(location: Option<Location>) -> Option<String> {
    location
        .and_then(|found| found.s3_location)
        .map(|s3| s3.uri)
}

fn guardrail_configuration(guardrail: &GuardrailRef) -> Value {
    json!({
        "guardrailId": guardrail.id(),
        "guardrailVersion": guardrail.version(),
    })
}

fn require_question(question: &str) -> Result<&str, QueryError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(QueryError::EmptyQuestion);
    }
    Ok(trimmed)
}

/// Looks up the highest published version of the guardrail called `name`.
///
/// # Errors
///
/// Returns [`QueryError::GuardrailNotFound`] when no guardrail with that
/// name has a published version and [`QueryError::Aws`] when listing fails.
pub async fn resolve_guardrail<R>(cli: &AwsCli<R>, name: &str) -> Result<GuardrailRef, QueryError>
where
    R: CommandRunner + Clone,
{
    let guardrail = Guardrail::new(cli.clone(), GuardrailSpec::default());
    for id in guardrail.ids_named(name).await? {
        if let Some(version) = guardrail.published_version(&id).await? {
            return Ok(GuardrailRef::new(id.as_str(), version)?);
        }
    }
    Err(QueryError::GuardrailNotFound {
        name: name.to_owned(),
    })
}

/// Answers questions from the knowledge base named in the configuration.
#[derive(Clone, Debug)]
pub struct KnowledgeBaseQuery<R: CommandRunner> {
    cli: AwsCli<R>,
    knowledge_base_name: String,
    model_arn: String,
    settings: QuerySettings,
}

impl KnowledgeBaseQuery<ProcessCommandRunner> {
    /// Validates `config` and wires the query to the real `aws` binary.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Config`] when validation fails.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, QueryError> {
        config.validate_query()?;
        Ok(Self::new(
            AwsCli::with_process_runner(config.aws_cli_config()?),
            config.knowledge_base_name.clone(),
            config.generation_model_arn.clone(),
            QuerySettings {
                number_of_results: config.retrieval_results,
                ..QuerySettings::default()
            },
        ))
    }
}

impl<R: CommandRunner> KnowledgeBaseQuery<R> {
    /// Creates a query from explicit parts.
    #[must_use]
    pub const fn new(
        cli: AwsCli<R>,
        knowledge_base_name: String,
        model_arn: String,
        settings: QuerySettings,
    ) -> Self {
        Self {
            cli,
            knowledge_base_name,
            model_arn,
            settings,
        }
    }

    /// Replaces the retrieval and generation settings.
    #[must_use]
    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Settings applied to each call.
    #[must_use]
    pub const fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Resolves the knowledge base identifier by name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::KnowledgeBaseNotFound`] when no knowledge base
    /// has the configured name.
    pub async fn knowledge_base_id(&self) -> Result<ResourceHandle, QueryError> {
        list_knowledge_bases(&self.cli)
            .await?
            .into_iter()
            .find(|summary| summary.name == self.knowledge_base_name)
            .map(|summary| ResourceHandle::new(summary.knowledge_base_id))
            .ok_or_else(|| QueryError::KnowledgeBaseNotFound {
                name: self.knowledge_base_name.clone(),
            })
    }

    /// Returns the passages closest to `question`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyQuestion`] for a blank question,
    /// [`QueryError::InvalidSettings`] for out-of-range settings and
    /// [`QueryError::Aws`] when the call fails.
    pub async fn retrieve(
        &self,
        knowledge_base_id: &ResourceHandle,
        question: &str,
        guardrail: Option<&GuardrailRef>,
    ) -> Result<Vec<RetrievedPassage>, QueryError> {
        let text = require_question(question)?;
        self.settings.validate()?;

        let mut args: Vec<OsString> =
            flag("--knowledge-base-id", knowledge_base_id.as_str()).into();
        args.extend(flag("--retrieval-query", json!({ "text": text }).to_string()));
        args.extend(flag(
            "--retrieval-configuration",
            json!({
                "vectorSearchConfiguration": {
                    "numberOfResults": self.settings.number_of_results,
                }
            })
            .to_string(),
        ));
        if let Some(selected) = guardrail {
            args.extend(flag(
                "--guardrail-configuration",
                guardrail_configuration(selected).to_string(),
            ));
        }

        let response: RetrieveResponse = self.cli.call_as(SERVICE, "retrieve", &args).await?;
        let passages: Vec<RetrievedPassage> = response
            .retrieval_results
            .into_iter()
            .map(|result| RetrievedPassage {
                text: result.content.text,
                score: result.score,
                source: source_uri(result.location),
            })
            .collect();
        info!(
            knowledge_base = %knowledge_base_id,
            passages = passages.len(),
            "retrieved passages"
        );
        Ok(passages)
    }

    /// Answers `question` from retrieved passages with the configured model.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyQuestion`] for a blank question,
    /// [`QueryError::InvalidSettings`] for out-of-range settings and
    /// [`QueryError::Aws`] when the call fails.
    pub async fn retrieve_and_generate(
        &self,
        knowledge_base_id: &ResourceHandle,
        question: &str,
        guardrail: Option<&GuardrailRef>,
    ) -> Result<GeneratedAnswer, QueryError> {
        let text = require_question(question)?;
        self.settings.validate()?;

        let mut generation = json!({
            "inferenceConfig": {
                "textInferenceConfig": {
                    "maxTokens": self.settings.max_tokens,
                    "temperature": self.settings.temperature,
                }
            },
            "performanceConfig": { "latency": "standard" },
        });
        if let (Some(selected), Some(fields)) = (guardrail, generation.as_object_mut()) {
            fields.insert(
                String::from("guardrailConfiguration"),
                guardrail_configuration(selected),
            );
        }
        let configuration = json!({
            "type": "KNOWLEDGE_BASE",
            "knowledgeBaseConfiguration": {
                "knowledgeBaseId": knowledge_base_id.as_str(),
                "modelArn": self.model_arn,
                "generationConfiguration": generation,
                "retrievalConfiguration": {
                    "vectorSearchConfiguration": {
                        "numberOfResults": self.settings.number_of_results,
                        "overrideSearchType": "SEMANTIC",
                    }
                },
            }
        });

        let mut args: Vec<OsString> = flag("--input", json!({ "text": text }).to_string()).into();
        args.extend(flag(
            "--retrieve-and-generate-configuration",
            configuration.to_string(),
        ));

        let response: GenerateResponse = self
            .cli
            .call_as(SERVICE, "retrieve-and-generate", &args)
            .await?;
        let citations = response.citations.len();
        let mut sources: Vec<String> = Vec::new();
        for uri in response
            .citations
            .into_iter()
            .flat_map(|citation| citation.retrieved_references)
            .filter_map(|reference| source_uri(reference.location))
        {
            if !sources.contains(&uri) {
                sources.push(uri);
            }
        }
        let guardrail_intervened = response.guardrail_action.as_deref() == Some("INTERVENED");
        info!(
            knowledge_base = %knowledge_base_id,
            citations,
            guardrail_intervened,
            "generated answer"
        );
        Ok(GeneratedAnswer {
            text: response.output.text,
            citations,
            sources,
            guardrail_intervened,
        })
    }
}

#[cfg(test)]
mod tests;
