//! Shared fixtures and helpers for provisioning BDD scenarios.

use claimkb::test_support::ScriptedRunner;
use claimkb::{PipelineConfig, PipelineError, PipelineOutcome};
use rstest::fixture;

#[derive(Clone, Debug)]
pub enum ProvisionOutcome {
    Success(PipelineOutcome),
    Failure { step: &'static str, message: String },
}

#[derive(Clone, Debug)]
pub struct ProvisionContext {
    pub config: Option<PipelineConfig>,
    pub runner: ScriptedRunner,
    pub outcome: Option<ProvisionOutcome>,
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    ProvisionContext {
        config: None,
        runner: ScriptedRunner::new(),
        outcome: None,
    }
}

pub fn build_config(knowledge_base_name: &str) -> PipelineConfig {
    PipelineConfig {
        region: String::from("us-east-1"),
        aws_bin: String::from("aws"),
        aws_profile: None,
        knowledge_base_name: knowledge_base_name.to_owned(),
        knowledge_base_role_arn: String::from("arn:aws:iam::123456789012:role/bedrock"),
        embedding_model_arn: String::from(
            "arn:aws:bedrock:us-east-1::foundation-model/amazon.titan-embed-text-v2:0",
        ),
        document_bucket: String::from("claim-docs"),
        document_prefix: String::from("policies/"),
        vector_bucket: String::from("vec"),
        vector_index: String::from("idx"),
        vector_dimension: 1024,
        data_source_name: String::from("auto-policy-info-s3-source"),
        chunk_max_tokens: 300,
        chunk_overlap_percentage: 5,
        guardrail_name: String::from("auto-policy-claim-guardrail"),
        model_id: String::from("us.anthropic.claude-3-7-sonnet-20250219-v1:0"),
        judge_model_id: String::from("anthropic.claude-3-5-sonnet-20240620-v1:0"),
        generation_model_arn: String::from(
            "arn:aws:bedrock:us-east-1::foundation-model/amazon.nova-micro-v1:0",
        ),
        retrieval_results: 3,
        poll_interval_secs: 5,
        wait_timeout_secs: 60,
    }
}

pub const fn failed_step(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::Config(_) => "config",
        PipelineError::Documents { .. } | PipelineError::Upload(_) => "upload",
        PipelineError::VectorStore(_) | PipelineError::VectorStoreArns(_) => "vector store",
        PipelineError::KnowledgeBase(_) => "knowledge base",
        PipelineError::DataSource(_) => "data source",
        PipelineError::Ingestion(_) => "ingestion",
    }
}

/// Second argument of each recorded `aws` call, i.e. the operation name.
pub fn operations(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .invocations()
        .iter()
        .filter_map(|call| call.args.get(1))
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}
