//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::aws::{AwsCliConfig, DEFAULT_AWS_BIN, DataSourceSpec, KnowledgeBaseSpec};
use crate::lifecycle::{PolicyError, PollPolicy};

/// Application name used for configuration discovery.
pub const APP_NAME: &str = "claimkb";

/// Upper bound Bedrock accepts for `numberOfResults`.
pub const MAX_RETRIEVAL_RESULTS: u32 = 100;

/// Pipeline settings layered from defaults, `claimkb.toml` and `CLAIMKB_*`
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CLAIMKB",
    discovery(
        app_name = "claimkb",
        env_var = "CLAIMKB_CONFIG_PATH",
        config_file_name = "claimkb.toml",
        dotfile_name = ".claimkb.toml",
        project_file_name = "claimkb.toml"
    )
)]
pub struct PipelineConfig {
    /// AWS region hosting every resource.
    #[ortho_config(default = "us-east-1".to_owned())]
    pub region: String,
    /// Path to the `aws` CLI binary.
    #[ortho_config(default = DEFAULT_AWS_BIN.to_owned())]
    pub aws_bin: String,
    /// Optional named AWS CLI profile.
    pub aws_profile: Option<String>,
    /// Name used to find or create the knowledge base.
    #[ortho_config(default = "kb-auto-policy-info".to_owned())]
    pub knowledge_base_name: String,
    /// IAM role Bedrock assumes for the knowledge base. Required for
    /// provisioning.
    #[ortho_config(default = String::new())]
    pub knowledge_base_role_arn: String,
    /// Embedding model used during ingestion.
    #[ortho_config(
        default = "arn:aws:bedrock:us-east-1::foundation-model/amazon.titan-embed-text-v2:0".to_owned()
    )]
    pub embedding_model_arn: String,
    /// General purpose bucket holding policy documents. Required for
    /// provisioning.
    #[ortho_config(default = String::new())]
    pub document_bucket: String,
    /// Key prefix for policy documents inside the bucket.
    #[ortho_config(default = "policies/".to_owned())]
    pub document_prefix: String,
    /// S3 Vectors bucket name.
    #[ortho_config(default = "claim-documents-poc-kb-vectors".to_owned())]
    pub vector_bucket: String,
    /// S3 Vectors index name.
    #[ortho_config(default = "claim-documents-poc-kb-vectors-index".to_owned())]
    pub vector_index: String,
    /// Embedding dimension; must match the embedding model.
    #[ortho_config(default = 1024)]
    pub vector_dimension: u32,
    /// Name used to find or create the data source.
    #[ortho_config(default = "auto-policy-info-s3-source".to_owned())]
    pub data_source_name: String,
    /// Maximum tokens per fixed-size chunk.
    #[ortho_config(default = 300)]
    pub chunk_max_tokens: u32,
    /// Overlap between chunks, in percent.
    #[ortho_config(default = 5)]
    pub chunk_overlap_percentage: u32,
    /// Name used to find or create the guardrail.
    #[ortho_config(default = "auto-policy-claim-guardrail".to_owned())]
    pub guardrail_name: String,
    /// Model invoked by `claimkb invoke` when none is given.
    #[ortho_config(default = "us.anthropic.claude-3-7-sonnet-20250219-v1:0".to_owned())]
    pub model_id: String,
    /// Model that grades claim summaries in `claimkb summarise --evaluate`.
    #[ortho_config(default = "anthropic.claude-3-5-sonnet-20240620-v1:0".to_owned())]
    pub judge_model_id: String,
    /// Model ARN that writes answers in `claimkb query`.
    #[ortho_config(
        default = "arn:aws:bedrock:us-east-1::foundation-model/amazon.nova-micro-v1:0".to_owned()
    )]
    pub generation_model_arn: String,
    /// Passages retrieved per knowledge base query.
    #[ortho_config(default = 3)]
    pub retrieval_results: u32,
    /// Seconds between status polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Seconds to wait for a resource before giving up.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl PipelineConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to {APP_NAME}.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates settings shared by every command.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank required values and
    /// [`ConfigError::Policy`] for an inconsistent poll policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.region,
            &FieldMetadata::new("AWS region", "CLAIMKB_REGION", "region"),
        )?;
        Self::require_field(
            &self.aws_bin,
            &FieldMetadata::new("aws CLI binary", "CLAIMKB_AWS_BIN", "aws_bin"),
        )?;
        Self::require_field(
            &self.guardrail_name,
            &FieldMetadata::new("guardrail name", "CLAIMKB_GUARDRAIL_NAME", "guardrail_name"),
        )?;
        Self::require_field(
            &self.model_id,
            &FieldMetadata::new("model identifier", "CLAIMKB_MODEL_ID", "model_id"),
        )?;
        self.poll_policy()?;
        Ok(())
    }

    /// Validates the settings `claimkb provision` and `claimkb teardown`
    /// need on top of [`Self::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank required values and
    /// [`ConfigError::Invalid`] for out-of-range numbers.
    pub fn validate_knowledge_base(&self) -> Result<(), ConfigError> {
        self.validate()?;
        Self::require_field(
            &self.knowledge_base_name,
            &FieldMetadata::new(
                "knowledge base name",
                "CLAIMKB_KNOWLEDGE_BASE_NAME",
                "knowledge_base_name",
            ),
        )?;
        Self::require_field(
            &self.knowledge_base_role_arn,
            &FieldMetadata::new(
                "knowledge base IAM role ARN",
                "CLAIMKB_KNOWLEDGE_BASE_ROLE_ARN",
                "knowledge_base_role_arn",
            ),
        )?;
        Self::require_field(
            &self.embedding_model_arn,
            &FieldMetadata::new(
                "embedding model ARN",
                "CLAIMKB_EMBEDDING_MODEL_ARN",
                "embedding_model_arn",
            ),
        )?;
        Self::require_field(
            &self.document_bucket,
            &FieldMetadata::new("document bucket", "CLAIMKB_DOCUMENT_BUCKET", "document_bucket"),
        )?;
        Self::require_field(
            &self.vector_bucket,
            &FieldMetadata::new("vector bucket", "CLAIMKB_VECTOR_BUCKET", "vector_bucket"),
        )?;
        Self::require_field(
            &self.vector_index,
            &FieldMetadata::new("vector index", "CLAIMKB_VECTOR_INDEX", "vector_index"),
        )?;
        Self::require_field(
            &self.data_source_name,
            &FieldMetadata::new(
                "data source name",
                "CLAIMKB_DATA_SOURCE_NAME",
                "data_source_name",
            ),
        )?;
        if self.vector_dimension == 0 {
            return Err(ConfigError::Invalid(String::from(
                "vector_dimension must be greater than zero",
            )));
        }
        if self.chunk_max_tokens == 0 {
            return Err(ConfigError::Invalid(String::from(
                "chunk_max_tokens must be greater than zero",
            )));
        }
        if self.chunk_overlap_percentage > 99 {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap_percentage must be between 0 and 99, got {}",
                self.chunk_overlap_percentage
            )));
        }
        Ok(())
    }

    /// Validates the settings `claimkb query` needs on top of
    /// [`Self::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank required values and
    /// [`ConfigError::Invalid`] when `retrieval_results` is outside
    /// `1..=100`.
    pub fn validate_query(&self) -> Result<(), ConfigError> {
        self.validate()?;
        Self::require_field(
            &self.knowledge_base_name,
            &FieldMetadata::new(
                "knowledge base name",
                "CLAIMKB_KNOWLEDGE_BASE_NAME",
                "knowledge_base_name",
            ),
        )?;
        Self::require_field(
            &self.generation_model_arn,
            &FieldMetadata::new(
                "generation model ARN",
                "CLAIMKB_GENERATION_MODEL_ARN",
                "generation_model_arn",
            ),
        )?;
        if !(1..=MAX_RETRIEVAL_RESULTS).contains(&self.retrieval_results) {
            return Err(ConfigError::Invalid(format!(
                "retrieval_results must be between 1 and {MAX_RETRIEVAL_RESULTS}, got {}",
                self.retrieval_results
            )));
        }
        Ok(())
    }

    /// Validates the settings `claimkb summarise` needs on top of
    /// [`Self::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the judge model is blank.
    pub fn validate_claims(&self) -> Result<(), ConfigError> {
        self.validate()?;
        Self::require_field(
            &self.judge_model_id,
            &FieldMetadata::new(
                "judge model identifier",
                "CLAIMKB_JUDGE_MODEL_ID",
                "judge_model_id",
            ),
        )
    }

    /// Builds the poll policy shared by every wait.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Policy`] when the durations are inconsistent.
    pub fn poll_policy(&self) -> Result<PollPolicy, ConfigError> {
        Ok(PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.wait_timeout_secs),
        )?)
    }

    /// Builds the `aws` CLI connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the binary or region is blank.
    pub fn aws_cli_config(&self) -> Result<AwsCliConfig, ConfigError> {
        AwsCliConfig::new(&self.aws_bin, &self.region, self.aws_profile.clone())
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Knowledge base settings derived from this configuration.
    #[must_use]
    pub fn knowledge_base_spec(&self) -> KnowledgeBaseSpec {
        KnowledgeBaseSpec {
            role_arn: self.knowledge_base_role_arn.clone(),
            embedding_model_arn: self.embedding_model_arn.clone(),
            document_bucket: self.document_bucket.clone(),
            description: String::from("Knowledge base for auto insurance policy documents"),
        }
    }

    /// Data source settings derived from this configuration.
    #[must_use]
    pub fn data_source_spec(&self) -> DataSourceSpec {
        DataSourceSpec {
            bucket: self.document_bucket.clone(),
            prefix: self.document_prefix.clone(),
            chunk_max_tokens: self.chunk_max_tokens,
            chunk_overlap_percentage: self.chunk_overlap_percentage,
            description: String::from("S3 source for auto insurance policy information"),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Indicates the poll interval and timeout are inconsistent.
    #[error("invalid poll configuration: {0}")]
    Policy(#[from] PolicyError),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
