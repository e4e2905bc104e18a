//! Unit tests for knowledge base queries.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::aws::AwsCliConfig;
use crate::test_support::{ScriptedRunner, json_guardrails, json_knowledge_bases};

const MODEL_ARN: &str = "arn:aws:bedrock:us-east-1::foundation-model/amazon.nova-micro-v1:0";

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

fn query(runner: &ScriptedRunner) -> KnowledgeBaseQuery<ScriptedRunner> {
    KnowledgeBaseQuery::new(
        cli(runner),
        String::from("kb-auto-policy-info"),
        String::from(MODEL_ARN),
        QuerySettings::default(),
    )
}

fn json_flag(runner: &ScriptedRunner, flag: &str) -> Value {
    let invocations = runner.invocations();
    let call = invocations.last().expect("recorded invocation");
    serde_json::from_str(&call.flag_value(flag).expect("flag present")).expect("json flag")
}

#[rstest]
#[tokio::test]
async fn knowledge_base_is_resolved_by_name(runner: ScriptedRunner) {
    runner.push_json(&json_knowledge_bases(&[
        ("KB0", "kb-other", "ACTIVE"),
        ("KB1", "kb-auto-policy-info", "ACTIVE"),
    ]));

    let id = query(&runner).knowledge_base_id().await.expect("found");

    assert_eq!(id, ResourceHandle::new("KB1"));
}

#[rstest]
#[tokio::test]
async fn missing_knowledge_base_points_at_provision(runner: ScriptedRunner) {
    runner.push_json(&json_knowledge_bases(&[("KB0", "kb-other", "ACTIVE")]));

    let err = query(&runner)
        .knowledge_base_id()
        .await
        .expect_err("no knowledge base with that name");

    assert!(matches!(
        err,
        QueryError::KnowledgeBaseNotFound { ref name } if name == "kb-auto-policy-info"
    ));
    assert!(err.to_string().contains("claimkb provision"));
}

#[rstest]
#[tokio::test]
async fn retrieve_returns_passages_with_sources(runner: ScriptedRunner) {
    runner.push_json(&json!({
        "retrievalResults": [
            {
                "content": { "text": "Comprehensive coverage pays for theft." },
                "score": 0.82,
                "location": { "type": "S3", "s3Location": { "uri": "s3://claim-docs/policies/auto.pdf" } }
            },
            { "content": { "text": "Premiums vary by state." } }
        ]
    }));

    let passages = query(&runner)
        .retrieve(
            &ResourceHandle::new("KB1"),
            "  What does comprehensive coverage include? ",
            None,
        )
        .await
        .expect("retrieve succeeds");

    assert_eq!(
        passages,
        vec![
            RetrievedPassage {
                text: String::from("Comprehensive coverage pays for theft."),
                score: Some(0.82),
                source: Some(String::from("s3://claim-docs/policies/auto.pdf")),
            },
            RetrievedPassage {
                text: String::from("Premiums vary by state."),
                score: None,
                source: None,
            },
        ]
    );
    let invocations = runner.invocations();
    let call = invocations.first().expect("retrieve call");
    assert!(call.command_string().starts_with("aws bedrock-agent-runtime retrieve "));
    assert_eq!(call.flag_value("--knowledge-base-id").as_deref(), Some("KB1"));
    assert!(call.flag_value("--guardrail-configuration").is_none());
    assert_eq!(
        json_flag(&runner, "--retrieval-query"),
        json!({ "text": "What does comprehensive coverage include?" })
    );
    assert_eq!(
        json_flag(&runner, "--retrieval-configuration"),
        json!({ "vectorSearchConfiguration": { "numberOfResults": 3 } })
    );
}

#[rstest]
#[tokio::test]
async fn retrieve_applies_guardrail(runner: ScriptedRunner) {
    runner.push_json(&json!({ "retrievalResults": [] }));
    let guardrail = GuardrailRef::new("gr-1", "2").expect("guardrail");

    let passages = query(&runner)
        .retrieve(&ResourceHandle::new("KB1"), "coverage", Some(&guardrail))
        .await
        .expect("retrieve succeeds");

    assert!(passages.is_empty());
    assert_eq!(
        json_flag(&runner, "--guardrail-configuration"),
        json!({ "guardrailId": "gr-1", "guardrailVersion": "2" })
    );
}

#[rstest]
#[tokio::test]
async fn generate_builds_knowledge_base_configuration(runner: ScriptedRunner) {
    runner.push_json(&json!({
        "output": { "text": "State averages depend on traffic density and repair costs." },
        "citations": [
            { "retrievedReferences": [
                { "location": { "s3Location": { "uri": "s3://claim-docs/policies/a.pdf" } } },
                { "location": { "s3Location": { "uri": "s3://claim-docs/policies/b.pdf" } } }
            ] },
            { "retrievedReferences": [
                { "location": { "s3Location": { "uri": "s3://claim-docs/policies/a.pdf" } } }
            ] }
        ],
        "guardrailAction": "NONE"
    }));
    let guardrail = GuardrailRef::new("gr-1", "2").expect("guardrail");

    let answer = query(&runner)
        .retrieve_and_generate(
            &ResourceHandle::new("KB1"),
            "What affects average premiums?",
            Some(&guardrail),
        )
        .await
        .expect("generation succeeds");

    assert_eq!(
        answer,
        GeneratedAnswer {
            text: String::from("State averages depend on traffic density and repair costs."),
            citations: 2,
            sources: vec![
                String::from("s3://claim-docs/policies/a.pdf"),
                String::from("s3://claim-docs/policies/b.pdf"),
            ],
            guardrail_intervened: false,
        }
    );
    let configuration = json_flag(&runner, "--retrieve-and-generate-configuration");
    let knowledge_base = &configuration["knowledgeBaseConfiguration"];
    assert_eq!(configuration["type"], json!("KNOWLEDGE_BASE"));
    assert_eq!(knowledge_base["knowledgeBaseId"], json!("KB1"));
    assert_eq!(knowledge_base["modelArn"], json!(MODEL_ARN));
    assert_eq!(
        knowledge_base["generationConfiguration"]["guardrailConfiguration"],
        json!({ "guardrailId": "gr-1", "guardrailVersion": "2" })
    );
    assert_eq!(
        knowledge_base["generationConfiguration"]["inferenceConfig"]["textInferenceConfig"],
        json!({ "maxTokens": 512, "temperature": 0.5 })
    );
    assert_eq!(
        knowledge_base["retrievalConfiguration"]["vectorSearchConfiguration"],
        json!({ "numberOfResults": 3, "overrideSearchType": "SEMANTIC" })
    );
    assert_eq!(
        json_flag(&runner, "--input"),
        json!({ "text": "What affects average premiums?" })
    );
}

#[rstest]
#[tokio::test]
async fn generate_reports_guardrail_intervention(runner: ScriptedRunner) {
    runner.push_json(&json!({
        "output": { "text": "Sorry, the model cannot answer this question." },
        "guardrailAction": "INTERVENED"
    }));

    let answer = query(&runner)
        .retrieve_and_generate(&ResourceHandle::new("KB1"), "Tell me about politics.", None)
        .await
        .expect("generation succeeds");

    assert!(answer.guardrail_intervened);
    assert_eq!(answer.citations, 0);
    let configuration = json_flag(&runner, "--retrieve-and-generate-configuration");
    assert!(
        configuration["knowledgeBaseConfiguration"]["generationConfiguration"]
            .get("guardrailConfiguration")
            .is_none()
    );
}

#[rstest]
#[case::blank_question("   ", QuerySettings::default())]
#[case::no_results("coverage", QuerySettings { number_of_results: 0, ..QuerySettings::default() })]
#[case::too_many_results("coverage", QuerySettings { number_of_results: 101, ..QuerySettings::default() })]
#[case::zero_tokens("coverage", QuerySettings { max_tokens: 0, ..QuerySettings::default() })]
#[case::hot("coverage", QuerySettings { temperature: 1.5, ..QuerySettings::default() })]
#[tokio::test]
async fn invalid_requests_never_reach_aws(
    runner: ScriptedRunner,
    #[case] question: &str,
    #[case] settings: QuerySettings,
) {
    let kb = ResourceHandle::new("KB1");
    let subject = query(&runner).with_settings(settings);

    let retrieve = subject.retrieve(&kb, question, None).await;
    let generate = subject.retrieve_and_generate(&kb, question, None).await;

    assert!(matches!(
        retrieve,
        Err(QueryError::EmptyQuestion | QueryError::InvalidSettings(_))
    ));
    assert!(matches!(
        generate,
        Err(QueryError::EmptyQuestion | QueryError::InvalidSettings(_))
    ));
    assert!(runner.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn guardrail_resolves_to_highest_published_version(runner: ScriptedRunner) {
    runner.push_json(&json_guardrails(&[
        ("gr-9", "another-guardrail", "DRAFT"),
        ("gr-1", "auto-policy-claim-guardrail", "DRAFT"),
    ]));
    runner.push_json(&json_guardrails(&[
        ("gr-1", "auto-policy-claim-guardrail", "DRAFT"),
        ("gr-1", "auto-policy-claim-guardrail", "1"),
        ("gr-1", "auto-policy-claim-guardrail", "3"),
    ]));

    let guardrail = resolve_guardrail(&cli(&runner), "auto-policy-claim-guardrail")
        .await
        .expect("published guardrail");

    assert_eq!(guardrail, GuardrailRef::new("gr-1", "3").expect("guardrail"));
}

#[rstest]
#[tokio::test]
async fn unpublished_guardrail_is_not_found(runner: ScriptedRunner) {
    runner.push_json(&json_guardrails(&[("gr-1", "auto-policy-claim-guardrail", "DRAFT")]));
    runner.push_json(&json_guardrails(&[("gr-1", "auto-policy-claim-guardrail", "DRAFT")]));

    let err = resolve_guardrail(&cli(&runner), "auto-policy-claim-guardrail")
        .await
        .expect_err("draft only");

    assert!(matches!(err, QueryError::GuardrailNotFound { .. }));
    assert!(err.to_string().contains("claimkb guardrail"));
}
