//! Core library for the `claimkb` provisioning tool.
//!
//! The crate drives the Bedrock resources behind a claim summarisation
//! pipeline (vector store, knowledge base, data source, ingestion job and
//! guardrail) through a polling lifecycle driver that creates or reuses each
//! resource by name and waits until it is ready. Once provisioned, the
//! knowledge base answers questions and the model summarises claims.

pub mod aws;
pub mod claims;
pub mod command;
pub mod config;
pub mod invoke;
pub mod lifecycle;
pub mod logging;
pub mod payload;
pub mod provision;
pub mod query;
pub mod teardown;
pub mod test_support;

pub use aws::{AwsCli, AwsCliConfig, AwsCliError};
pub use claims::{
    ClaimError, ClaimEvaluation, ClaimProcessor, ClaimSummary, PromptTemplate, read_document,
};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{APP_NAME, ConfigError, PipelineConfig};
pub use invoke::{GuardrailRef, InvocationOutcome, InvokeError, ModelInvoker};
pub use lifecycle::{
    LifecycleDriver, LifecycleError, PollPolicy, PollReport, Provisioner, ResourceHandle,
    ResourceStatus, StatusClass, StatusTable,
};
pub use payload::{InvocationRequest, ModelFamily, PayloadError};
pub use provision::{
    GuardrailError, GuardrailOutcome, GuardrailWorkflow, KnowledgeBasePipeline, PipelineError,
    PipelineOutcome, ensure_ready,
};
pub use query::{
    GeneratedAnswer, KnowledgeBaseQuery, QueryError, QuerySettings, RetrievedPassage,
    resolve_guardrail,
};
pub use teardown::{Teardown, TeardownError, TeardownSummary, TeardownTargets};
