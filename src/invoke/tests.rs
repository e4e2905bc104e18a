//! Unit tests for model invocation.

use std::fs;

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::aws::AwsCliConfig;
use crate::test_support::ScriptedRunner;

struct Harness {
    _tmp: TempDir,
    scratch: Utf8PathBuf,
    runner: ScriptedRunner,
}

#[fixture]
fn harness() -> Harness {
    let tmp = TempDir::new().expect("tempdir");
    let scratch = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp path");
    Harness {
        _tmp: tmp,
        scratch,
        runner: ScriptedRunner::new(),
    }
}

impl Harness {
    fn invoker(&self) -> ModelInvoker<ScriptedRunner> {
        ModelInvoker::new(
            AwsCli::new(
                AwsCliConfig::new("aws", "us-east-1", None).expect("config"),
                self.runner.clone(),
            ),
            self.scratch.clone(),
        )
    }

    fn leftover_files(&self) -> usize {
        fs::read_dir(&self.scratch).expect("read scratch").count()
    }
}

fn claude_request() -> InvocationRequest {
    InvocationRequest::builder("us.anthropic.claude-3-7-sonnet-20250219-v1:0", "Summarise")
        .build()
        .expect("valid request")
}

#[rstest]
#[tokio::test]
async fn invoke_returns_generated_text(harness: Harness) {
    harness.runner.push_model_response(&json!({
        "content": [{ "type": "text", "text": "The claim is covered." }],
        "stop_reason": "end_turn",
    }));
    let invoker = harness.invoker();

    let outcome = invoker
        .invoke(&claude_request(), None)
        .await
        .expect("invocation succeeds");

    assert_eq!(outcome.text, "The claim is covered.");
    assert_eq!(harness.leftover_files(), 0, "response file should be removed");

    let invocations = harness.runner.invocations();
    let call = invocations.first().expect("invoke-model call");
    assert!(call.command_string().starts_with("aws bedrock-runtime invoke-model"));
    assert_eq!(
        call.flag_value("--cli-binary-format").as_deref(),
        Some("raw-in-base64-out")
    );
    let body: Value =
        serde_json::from_str(&call.flag_value("--body").expect("body flag")).expect("json body");
    assert_eq!(body["anthropic_version"], json!("bedrock-2023-05-31"));
    assert!(call.flag_value("--guardrail-identifier").is_none());
}

#[rstest]
#[tokio::test]
async fn invoke_passes_guardrail_selection(harness: Harness) {
    harness.runner.push_model_response(&json!({
        "output": { "message": { "content": [{ "text": "Sorry, I can't help with that." }] } }
    }));
    let invoker = harness.invoker();
    let request = InvocationRequest::builder("amazon.nova-lite-v1:0", "Give me legal advice")
        .build()
        .expect("valid request");
    let guardrail = GuardrailRef::new("gr-1", "2").expect("guardrail");

    let outcome = invoker
        .invoke(&request, Some(&guardrail))
        .await
        .expect("invocation succeeds");

    assert_eq!(outcome.text, "Sorry, I can't help with that.");
    let invocations = harness.runner.invocations();
    let call = invocations.first().expect("invoke-model call");
    assert_eq!(call.flag_value("--guardrail-identifier").as_deref(), Some("gr-1"));
    assert_eq!(call.flag_value("--guardrail-version").as_deref(), Some("2"));
}

#[rstest]
#[tokio::test]
async fn invoke_surfaces_cli_failure(harness: Harness) {
    harness
        .runner
        .push_failure(254, "An error occurred (AccessDeniedException) when calling InvokeModel");
    let invoker = harness.invoker();

    let err = invoker
        .invoke(&claude_request(), None)
        .await
        .expect_err("CLI failure should propagate");

    assert!(matches!(err, InvokeError::Aws(AwsCliError::CommandFailure { .. })));
}

#[rstest]
#[tokio::test]
async fn invoke_reports_missing_response_file(harness: Harness) {
    harness.runner.push_success();
    let invoker = harness.invoker();

    let err = invoker
        .invoke(&claude_request(), None)
        .await
        .expect_err("missing file should fail");

    let InvokeError::Response { path, .. } = err else {
        panic!("expected Response error, got {err:?}");
    };
    assert!(path.as_str().starts_with(harness.scratch.as_str()));
    assert!(path.as_str().ends_with(".json"));
}

#[rstest]
#[tokio::test]
async fn invoke_rejects_response_without_text(harness: Harness) {
    harness.runner.push_model_response(&json!({ "content": [] }));
    let invoker = harness.invoker();

    let err = invoker
        .invoke(&claude_request(), None)
        .await
        .expect_err("empty content should fail");

    assert!(matches!(
        err,
        InvokeError::Payload(PayloadError::MissingText { .. })
    ));
}

#[rstest]
#[case("", "2", "id")]
#[case("gr-1", "  ", "version")]
fn guardrail_ref_requires_both_parts(
    #[case] id: &str,
    #[case] version: &str,
    #[case] field: &str,
) {
    let err = GuardrailRef::new(id, version).expect_err("blank part");

    assert!(
        matches!(err, InvokeError::InvalidGuardrail { field: actual } if actual == field),
        "unexpected error: {err}"
    );
}
