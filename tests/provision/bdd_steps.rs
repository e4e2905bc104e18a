//! BDD step definitions for the provisioning pipeline.

use std::time::Duration;

use claimkb::test_support::{
    ScriptedRunner, json_data_source, json_data_sources, json_ingestion_job, json_knowledge_base,
    json_knowledge_bases, json_vector_buckets, json_vector_index,
};
use claimkb::{AwsCli, AwsCliConfig, KnowledgeBasePipeline, LifecycleDriver, PollPolicy};
use rstest_bdd_macros::{given, then, when};
use serde_json::json;
use tokio::runtime::Builder;

use super::test_helpers::{
    ProvisionContext, ProvisionOutcome, build_config, failed_step, operations,
};

const INDEX_NOT_FOUND: &str =
    "An error occurred (ResourceNotFoundException) when calling the GetIndex operation: missing";

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

/// Responses for the ARN lookups that follow a ready vector store.
fn push_vector_store_arns(runner: &ScriptedRunner) {
    runner.push_json(&json!({
        "vectorBucket": { "vectorBucketArn": "arn:aws:s3vectors:us-east-1:123456789012:bucket/vec" }
    }));
    runner.push_json(&json_vector_index("vec", "idx"));
}

#[given("a provisioning pipeline for knowledge base \"{name}\"")]
fn provisioning_pipeline(mut provision_context: ProvisionContext, name: String) -> ProvisionContext {
    provision_context.config = Some(build_config(name.trim()));
    provision_context
}

#[given("no vector store exists yet")]
fn no_vector_store(provision_context: ProvisionContext) -> ProvisionContext {
    let runner = &provision_context.runner;
    runner.push_json(&json_vector_buckets(&[])); // find
    runner.push_json(&json_vector_buckets(&[])); // bucket check in create
    runner.push_success(); // create-vector-bucket
    runner.push_success(); // create-index
    runner.push_json(&json_vector_index("vec", "idx"));
    push_vector_store_arns(runner);
    provision_context
}

#[given("the vector bucket exists without its index")]
fn bucket_without_index(provision_context: ProvisionContext) -> ProvisionContext {
    let runner = &provision_context.runner;
    runner.push_json(&json_vector_buckets(&["vec"]));
    runner.push_failure(254, INDEX_NOT_FOUND);
    runner.push_json(&json_vector_buckets(&["vec"]));
    runner.push_success(); // create-index
    runner.push_json(&json_vector_index("vec", "idx"));
    push_vector_store_arns(runner);
    provision_context
}

#[given("the vector store is ready")]
fn vector_store_ready(provision_context: ProvisionContext) -> ProvisionContext {
    let runner = &provision_context.runner;
    runner.push_json(&json_vector_buckets(&["vec"]));
    runner.push_json(&json_vector_index("vec", "idx"));
    runner.push_json(&json_vector_index("vec", "idx"));
    push_vector_store_arns(runner);
    provision_context
}

#[given("no knowledge base exists yet")]
fn no_knowledge_base(provision_context: ProvisionContext) -> ProvisionContext {
    let runner = &provision_context.runner;
    runner.push_json(&json_knowledge_bases(&[]));
    runner.push_json(&json!({ "knowledgeBase": { "knowledgeBaseId": "KB1", "status": "CREATING" } }));
    runner.push_json(&json_knowledge_base("KB1", "CREATING"));
    runner.push_json(&json_knowledge_base("KB1", "ACTIVE"));
    provision_context
}

#[given("the knowledge base reports \"{status}\"")]
fn knowledge_base_reports(provision_context: ProvisionContext, status: String) -> ProvisionContext {
    let runner = &provision_context.runner;
    runner.push_json(&json_knowledge_bases(&[(
        "KB1",
        "kb-auto-policy-info",
        status.as_str(),
    )]));
    runner.push_json(&json_knowledge_base("KB1", status.as_str()));
    provision_context
}

#[given("the data source and ingestion job succeed")]
fn downstream_succeeds(provision_context: ProvisionContext) -> ProvisionContext {
    let runner = &provision_context.runner;
    runner.push_json(&json_data_sources(&[]));
    runner.push_json(&json!({ "dataSource": { "dataSourceId": "DS1", "status": "AVAILABLE" } }));
    runner.push_json(&json_data_source("DS1", "AVAILABLE"));
    runner.push_json(&json!({ "ingestionJob": { "ingestionJobId": "JOB1", "status": "STARTING" } }));
    runner.push_json(&json_ingestion_job("JOB1", "IN_PROGRESS"));
    runner.push_json(&json_ingestion_job("JOB1", "COMPLETE"));
    provision_context
}

#[when("I run the provisioning pipeline")]
fn run_pipeline(mut provision_context: ProvisionContext) -> ProvisionContext {
    let config = provision_context
        .config
        .clone()
        .unwrap_or_else(|| panic!("test setup requires a configured pipeline"));
    let cli = AwsCli::new(
        AwsCliConfig::new("aws", "us-east-1", None)
            .unwrap_or_else(|err| panic!("aws config should be valid: {err}")),
        provision_context.runner.clone(),
    );
    let driver = LifecycleDriver::new(
        PollPolicy::new(Duration::from_secs(5), Duration::from_secs(60))
            .unwrap_or_else(|err| panic!("poll policy should be valid: {err}")),
    );
    let pipeline = KnowledgeBasePipeline::new(config, cli, driver);
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("tokio runtime should build: {err}"));

    provision_context.outcome = Some(match runtime.block_on(pipeline.execute(None)) {
        Ok(outcome) => ProvisionOutcome::Success(outcome),
        Err(err) => ProvisionOutcome::Failure {
            step: failed_step(&err),
            message: err.to_string(),
        },
    });
    provision_context
}

#[then("the pipeline reports knowledge base \"{knowledge_base}\" and ingestion job \"{job}\"")]
fn reports_identifiers(
    provision_context: &ProvisionContext,
    knowledge_base: String,
    job: String,
) -> Result<(), StepError> {
    let Some(outcome) = provision_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    let ProvisionOutcome::Success(ids) = outcome else {
        return Err(StepError::Assertion(format!(
            "expected success, got: {outcome:?}"
        )));
    };
    if ids.knowledge_base_id.as_str() == knowledge_base && ids.ingestion_job_id.as_str() == job {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected knowledge base {knowledge_base} and job {job}, got {ids:?}"
        )))
    }
}

#[then("the number of vector bucket creations is {count:usize}")]
fn vector_bucket_creations(
    provision_context: &ProvisionContext,
    count: usize,
) -> Result<(), StepError> {
    let created = operations(&provision_context.runner)
        .iter()
        .filter(|op| op.as_str() == "create-vector-bucket")
        .count();
    if created == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} create-vector-bucket calls, got {created}"
        )))
    }
}

#[then("the vector index is created")]
fn vector_index_created(provision_context: &ProvisionContext) -> Result<(), StepError> {
    if operations(&provision_context.runner)
        .iter()
        .any(|op| op == "create-index")
    {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "expected a create-index call",
        )))
    }
}

#[then("the pipeline fails at the \"{step}\" step")]
fn fails_at_step(provision_context: &ProvisionContext, step: String) -> Result<(), StepError> {
    match provision_context.outcome.as_ref() {
        Some(ProvisionOutcome::Failure { step: failed, .. }) if *failed == step.as_str() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure at the {step} step, got: {other:?}"
        ))),
    }
}

#[then("no data source is created")]
fn no_data_source(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let ops = operations(&provision_context.runner);
    if ops
        .iter()
        .any(|op| op == "list-data-sources" || op == "create-data-source")
    {
        Err(StepError::Assertion(format!(
            "data source calls should not run, got: {ops:?}"
        )))
    } else {
        Ok(())
    }
}
