//! Unit tests for the provisioning workflows.

use std::time::Duration;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::aws::AwsCliConfig;
use crate::lifecycle::PollPolicy;
use crate::test_support::{
    ScriptedRunner, json_data_source, json_data_sources, json_guardrail, json_guardrails,
    json_ingestion_job, json_knowledge_base, json_knowledge_bases, json_vector_buckets,
    json_vector_index,
};

const CONFLICT: &str =
    "An error occurred (ConflictException) when calling the CreateKnowledgeBase operation: \
     Knowledge base with name kb-auto-policy-info already exists";

fn config() -> PipelineConfig {
    PipelineConfig {
        region: String::from("us-east-1"),
        aws_bin: String::from("aws"),
        aws_profile: None,
        knowledge_base_name: String::from("kb-auto-policy-info"),
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

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

fn cli(runner: &ScriptedRunner) -> AwsCli<ScriptedRunner> {
    AwsCli::new(
        AwsCliConfig::new("aws", "us-east-1", None).expect("config"),
        runner.clone(),
    )
}

fn driver() -> LifecycleDriver {
    LifecycleDriver::new(
        PollPolicy::new(Duration::from_secs(5), Duration::from_secs(60)).expect("policy"),
    )
}

fn pipeline(runner: &ScriptedRunner) -> KnowledgeBasePipeline<ScriptedRunner> {
    KnowledgeBasePipeline::new(config(), cli(runner), driver())
}

fn push_vector_store_ready(runner: &ScriptedRunner) {
    runner.push_json(&json_vector_buckets(&["vec"]));
    runner.push_json(&json_vector_index("vec", "idx"));
    runner.push_json(&json_vector_index("vec", "idx"));
    runner.push_json(&json!({
        "vectorBucket": { "vectorBucketArn": "arn:aws:s3vectors:us-east-1:123456789012:bucket/vec" }
    }));
    runner.push_json(&json_vector_index("vec", "idx"));
}

fn push_downstream_ready(runner: &ScriptedRunner) {
    runner.push_json(&json_data_sources(&[]));
    runner.push_json(&json!({ "dataSource": { "dataSourceId": "DS1", "status": "AVAILABLE" } }));
    runner.push_json(&json_data_source("DS1", "AVAILABLE"));
    runner.push_json(&json!({ "ingestionJob": { "ingestionJobId": "JOB1", "status": "STARTING" } }));
    runner.push_json(&json_ingestion_job("JOB1", "IN_PROGRESS"));
    runner.push_json(&json_ingestion_job("JOB1", "COMPLETE"));
}

fn operations(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .invocations()
        .iter()
        .filter_map(|call| call.args.get(1))
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn pipeline_provisions_every_resource_in_order(runner: ScriptedRunner) {
    push_vector_store_ready(&runner);
    runner.push_json(&json_knowledge_bases(&[]));
    runner.push_json(&json!({ "knowledgeBase": { "knowledgeBaseId": "KB1", "status": "CREATING" } }));
    runner.push_json(&json_knowledge_base("KB1", "CREATING"));
    runner.push_json(&json_knowledge_base("KB1", "ACTIVE"));
    push_downstream_ready(&runner);

    let outcome = pipeline(&runner)
        .execute(None)
        .await
        .expect("pipeline should succeed");

    assert_eq!(
        outcome,
        PipelineOutcome {
            uploaded_documents: None,
            vector_bucket: ResourceHandle::new("vec"),
            knowledge_base_id: ResourceHandle::new("KB1"),
            data_source_id: ResourceHandle::new("DS1"),
            ingestion_job_id: ResourceHandle::new("JOB1"),
        }
    );
    assert_eq!(
        operations(&runner),
        vec![
            "list-vector-buckets",
            "get-index",
            "get-index",
            "get-vector-bucket",
            "get-index",
            "list-knowledge-bases",
            "create-knowledge-base",
            "get-knowledge-base",
            "get-knowledge-base",
            "list-data-sources",
            "create-data-source",
            "get-data-source",
            "start-ingestion-job",
            "get-ingestion-job",
            "get-ingestion-job",
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn pipeline_uploads_documents_first(runner: ScriptedRunner) {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp path");
    let dir = Dir::open_ambient_dir(&root, ambient_authority()).expect("open temp dir");
    dir.write("policy-a.txt", "coverage").expect("write policy");
    dir.write("policy-b.txt", "exclusions").expect("write policy");
    dir.create_dir("nested").expect("create nested dir");

    runner.push_success();
    push_vector_store_ready(&runner);
    runner.push_json(&json_knowledge_bases(&[("KB1", "kb-auto-policy-info", "ACTIVE")]));
    runner.push_json(&json_knowledge_base("KB1", "ACTIVE"));
    push_downstream_ready(&runner);

    let outcome = pipeline(&runner)
        .execute(Some(&root))
        .await
        .expect("pipeline should succeed");

    assert_eq!(outcome.uploaded_documents, Some(2));
    let invocations = runner.invocations();
    let sync = invocations.first().expect("sync invocation");
    assert_eq!(
        sync.command_string(),
        format!("aws s3 sync {root} s3://claim-docs/policies/ --region us-east-1 --output json")
    );
}

#[rstest]
#[tokio::test]
async fn pipeline_rejects_empty_document_directory(runner: ScriptedRunner) {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp path");

    let err = pipeline(&runner)
        .execute(Some(&root))
        .await
        .expect_err("empty directory should fail");

    assert!(matches!(err, PipelineError::Documents { .. }));
    assert!(runner.invocations().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn pipeline_stops_when_knowledge_base_fails(runner: ScriptedRunner) {
    push_vector_store_ready(&runner);
    runner.push_json(&json_knowledge_bases(&[("KB1", "kb-auto-policy-info", "FAILED")]));
    runner.push_json(&json_knowledge_base("KB1", "FAILED"));

    let err = pipeline(&runner)
        .execute(None)
        .await
        .expect_err("failed knowledge base should abort");

    let PipelineError::KnowledgeBase(inner) = err else {
        panic!("expected KnowledgeBase error, got {err:?}");
    };
    assert!(matches!(*inner, LifecycleError::RemoteFailed { .. }));
    assert!(!operations(&runner).contains(&String::from("list-data-sources")));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn pipeline_retries_ensure_after_conflict(runner: ScriptedRunner) {
    push_vector_store_ready(&runner);
    runner.push_json(&json_knowledge_bases(&[]));
    runner.push_failure(254, CONFLICT);
    runner.push_json(&json_knowledge_bases(&[("KB7", "kb-auto-policy-info", "CREATING")]));
    runner.push_json(&json_knowledge_base("KB7", "ACTIVE"));
    push_downstream_ready(&runner);

    let outcome = pipeline(&runner)
        .execute(None)
        .await
        .expect("pipeline should recover from the conflict");

    assert_eq!(outcome.knowledge_base_id, ResourceHandle::new("KB7"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn pipeline_reports_vector_index_that_disappears(runner: ScriptedRunner) {
    runner.push_json(&json_vector_buckets(&[]));
    runner.push_json(&json_vector_buckets(&[]));
    runner.push_success();
    runner.push_success();
    runner.push_failure(254, "An error occurred (NotFoundException) when calling GetIndex");

    let err = pipeline(&runner)
        .execute(None)
        .await
        .expect_err("missing index should abort");

    let PipelineError::VectorStore(inner) = err else {
        panic!("expected VectorStore error, got {err:?}");
    };
    assert!(matches!(
        *inner,
        LifecycleError::RemoteFailed { ref status, .. } if status.as_str() == "MISSING"
    ));
}

#[rstest]
fn pipeline_config_validation_is_enforced() {
    let invalid = PipelineConfig {
        document_bucket: String::new(),
        ..config()
    };

    let err = KnowledgeBasePipeline::from_config(invalid).expect_err("bucket is required");

    assert!(
        err.to_string().contains("CLAIMKB_DOCUMENT_BUCKET"),
        "unexpected error: {err}"
    );
}

fn workflow(runner: &ScriptedRunner) -> GuardrailWorkflow<ScriptedRunner> {
    GuardrailWorkflow::new(
        String::from("auto-policy-claim-guardrail"),
        cli(runner),
        driver(),
    )
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn guardrail_workflow_reuses_published_version(runner: ScriptedRunner) {
    runner.push_json(&json_guardrails(&[("gr-1", "auto-policy-claim-guardrail", "DRAFT")]));
    runner.push_json(&json_guardrail("gr-1", "READY"));
    runner.push_json(&json_guardrails(&[
        ("gr-1", "auto-policy-claim-guardrail", "DRAFT"),
        ("gr-1", "auto-policy-claim-guardrail", "1"),
    ]));

    let outcome = workflow(&runner).execute().await.expect("workflow");

    assert_eq!(
        outcome,
        GuardrailOutcome {
            guardrail_id: ResourceHandle::new("gr-1"),
            version: String::from("1"),
            published: false,
        }
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn guardrail_workflow_publishes_first_version(runner: ScriptedRunner) {
    runner.push_json(&json_guardrails(&[]));
    runner.push_json(&json!({ "guardrailId": "gr-2", "version": "DRAFT" }));
    runner.push_json(&json_guardrail("gr-2", "CREATING"));
    runner.push_json(&json_guardrail("gr-2", "READY"));
    runner.push_json(&json_guardrails(&[("gr-2", "auto-policy-claim-guardrail", "DRAFT")]));
    runner.push_json(&json!({ "guardrailId": "gr-2", "version": "1" }));
    runner.push_json(&json_guardrail("gr-2", "VERSIONING"));
    runner.push_json(&json_guardrail("gr-2", "READY"));

    let outcome = workflow(&runner).execute().await.expect("workflow");

    assert!(outcome.published);
    assert_eq!(outcome.version, "1");
    assert!(operations(&runner).contains(&String::from("create-guardrail-version")));
}
