//! Command-line interface definitions for the `claimkb` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `claimkb` binary.
#[derive(Debug, Parser)]
#[command(
    name = "claimkb",
    about = "Provision and query the Bedrock resources behind claim summarisation",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Upload policy documents and build the knowledge base.
    #[command(
        name = "provision",
        about = "Upload policy documents and build the knowledge base"
    )]
    Provision(ProvisionCommand),
    /// Create the claim-screening guardrail and publish a version.
    #[command(
        name = "guardrail",
        about = "Create the claim-screening guardrail and publish a version"
    )]
    Guardrail,
    /// Send a prompt to a foundation model.
    #[command(name = "invoke", about = "Send a prompt to a foundation model")]
    Invoke(InvokeCommand),
    /// Answer a question from the knowledge base.
    #[command(name = "query", about = "Answer a question from the knowledge base")]
    Query(QueryCommand),
    /// Summarise a claim document and optionally grade the summary.
    #[command(
        name = "summarise",
        about = "Summarise a claim document and optionally grade the summary"
    )]
    Summarise(SummariseCommand),
    /// Delete the knowledge base, vector store and guardrail.
    #[command(
        name = "teardown",
        about = "Delete the knowledge base, vector store and guardrail"
    )]
    Teardown,
}

/// Arguments for the `claimkb provision` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ProvisionCommand {
    /// Local directory synced to the document bucket before provisioning.
    ///
    /// When omitted, documents already in the bucket are ingested as-is.
    #[arg(long, value_name = "DIR")]
    pub(crate) documents: Option<String>,
}

/// Arguments for the `claimkb invoke` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct InvokeCommand {
    /// Model or inference profile identifier; defaults to the configured model.
    #[arg(long, value_name = "MODEL_ID")]
    pub(crate) model_id: Option<String>,
    /// System prompt replacing the model family's default.
    #[arg(long, value_name = "TEXT")]
    pub(crate) system: Option<String>,
    /// Maximum number of tokens to generate.
    #[arg(long, value_name = "N")]
    pub(crate) max_tokens: Option<u32>,
    /// Sampling temperature between 0.0 and 1.0.
    #[arg(long, value_name = "T")]
    pub(crate) temperature: Option<f64>,
    /// Nucleus sampling threshold between 0.0 and 1.0.
    #[arg(long, value_name = "P")]
    pub(crate) top_p: Option<f64>,
    #[command(flatten)]
    pub(crate) guardrail: GuardrailArgs,
    /// Prompt text; multiple words are joined with spaces.
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) prompt: Vec<String>,
}

/// Arguments for the `claimkb query` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct QueryCommand {
    /// Print the retrieved passages instead of a generated answer.
    #[arg(long)]
    pub(crate) retrieve_only: bool,
    /// Passages retrieved per question; defaults to the configured count.
    #[arg(long, value_name = "N")]
    pub(crate) results: Option<u32>,
    #[command(flatten)]
    pub(crate) guardrail: GuardrailArgs,
    /// Question text; multiple words are joined with spaces.
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) question: Vec<String>,
}

/// Arguments for the `claimkb summarise` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct SummariseCommand {
    /// UTF-8 text file holding the claim document.
    #[arg(value_name = "FILE")]
    pub(crate) document: String,
    /// Grade the summary for accuracy and quality with the judge model.
    #[arg(long)]
    pub(crate) evaluate: bool,
    /// Guardrail screening the grading calls.
    #[command(flatten)]
    pub(crate) guardrail: GuardrailArgs,
}

/// Guardrail selection shared by the model-facing subcommands.
#[derive(Debug, Default, Args)]
pub(crate) struct GuardrailArgs {
    /// Guardrail identifier applied to the request.
    #[arg(long, value_name = "ID", requires = "guardrail_version")]
    pub(crate) guardrail_id: Option<String>,
    /// Published guardrail version applied to the request.
    #[arg(long, value_name = "VERSION", requires = "guardrail_id")]
    pub(crate) guardrail_version: Option<String>,
    /// Apply the newest published version of the configured guardrail.
    #[arg(long, conflicts_with = "guardrail_id")]
    pub(crate) guarded: bool,
}
