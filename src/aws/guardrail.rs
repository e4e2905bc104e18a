//! Bedrock guardrail adapter.

use std::ffi::OsString;

use serde::Deserialize;
use serde_json::{Value, json};

use super::{AwsCli, AwsCliError, client_token, flag, string_at};
use crate::command::CommandRunner;
use crate::lifecycle::{
    LifecycleFuture, Provisioner, ResourceHandle, ResourceStatus, StatusTable,
};

const SERVICE: &str = "bedrock";

/// Messaging and description for a claim-screening guardrail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GuardrailSpec {
    /// Description stored on the guardrail.
    pub description: String,
    /// Message returned when input is blocked.
    pub blocked_input_message: String,
    /// Message returned when output is blocked.
    pub blocked_output_message: String,
}

impl Default for GuardrailSpec {
    fn default() -> Self {
        Self {
            description: String::from(
                "Guardrail to filter sensitive info in auto policy claim forms",
            ),
            blocked_input_message: String::from(
                "The input content has been instructed to deny processing.",
            ),
            blocked_output_message: String::from(
                "Output is omitted due to sensitive information.",
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GuardrailSummary {
    id: String,
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuardrailList {
    #[serde(default)]
    guardrails: Vec<GuardrailSummary>,
}

/// Guardrail with content, topic and PII filters for claim documents.
#[derive(Clone, Debug)]
pub struct Guardrail<R: CommandRunner> {
    cli: AwsCli<R>,
    spec: GuardrailSpec,
    table: StatusTable,
}

impl<R: CommandRunner> Guardrail<R> {
    /// Creates an adapter using `spec` for newly created guardrails.
    #[must_use]
    pub fn new(cli: AwsCli<R>, spec: GuardrailSpec) -> Self {
        Self {
            cli,
            spec,
            table: StatusTable::guardrail(),
        }
    }

    /// Publishes an immutable numbered version of the working draft.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when the CLI call fails or the response lacks
    /// a version.
    pub async fn create_version(&self, id: &ResourceHandle) -> Result<String, AwsCliError> {
        let mut args: Vec<OsString> = flag("--guardrail-identifier", id.as_str()).into();
        args.extend(flag("--client-token", client_token()));
        let response = self
            .cli
            .call_json(SERVICE, "create-guardrail-version", &args)
            .await?;
        string_at(&response, "/version", "bedrock create-guardrail-version")
    }

    /// Returns the highest published version, ignoring the `DRAFT` entry.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when the CLI call or parsing fails.
    pub async fn published_version(
        &self,
        id: &ResourceHandle,
    ) -> Result<Option<String>, AwsCliError> {
        let listing: GuardrailList = self
            .cli
            .call_as(
                SERVICE,
                "list-guardrails",
                &flag("--guardrail-identifier", id.as_str()),
            )
            .await?;
        Ok(listing
            .guardrails
            .into_iter()
            .filter_map(|guardrail| guardrail.version)
            .filter_map(|version| version.parse::<u64>().ok())
            .max()
            .map(|version| version.to_string()))
    }

    /// Finds guardrail identifiers whose name equals `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when the CLI call or parsing fails.
    pub async fn ids_named(&self, name: &str) -> Result<Vec<ResourceHandle>, AwsCliError> {
        let listing: GuardrailList = self.cli.call_as(SERVICE, "list-guardrails", &[]).await?;
        Ok(listing
            .guardrails
            .into_iter()
            .filter(|guardrail| guardrail.name == name)
            .map(|guardrail| ResourceHandle::new(guardrail.id))
            .collect())
    }

    /// Deletes the guardrail and every version.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when the CLI call fails.
    pub async fn delete(&self, id: &ResourceHandle) -> Result<(), AwsCliError> {
        self.cli
            .call(
                SERVICE,
                "delete-guardrail",
                &flag("--guardrail-identifier", id.as_str()),
            )
            .await
            .map(drop)
    }

    fn create_args(&self, name: &str) -> Vec<OsString> {
        let mut args = Vec::new();
        args.extend(flag("--name", name));
        args.extend(flag("--description", self.spec.description.as_str()));
        args.extend(flag("--content-policy-config", content_policy().to_string()));
        args.extend(flag("--topic-policy-config", topic_policy().to_string()));
        args.extend(flag(
            "--sensitive-information-policy-config",
            sensitive_information_policy().to_string(),
        ));
        args.extend(flag(
            "--blocked-input-messaging",
            self.spec.blocked_input_message.as_str(),
        ));
        args.extend(flag(
            "--blocked-outputs-messaging",
            self.spec.blocked_output_message.as_str(),
        ));
        args.extend(flag("--client-token", client_token()));
        args
    }
}

fn content_filter(kind: &str, output_strength: &str) -> Value {
    json!({
        "type": kind,
        "inputStrength": "HIGH",
        "outputStrength": output_strength,
        "inputModalities": ["TEXT"],
        "outputModalities": ["TEXT"],
    })
}

fn content_policy() -> Value {
    json!({
        "filtersConfig": [
            content_filter("HATE", "HIGH"),
            content_filter("SEXUAL", "HIGH"),
            content_filter("VIOLENCE", "HIGH"),
            content_filter("PROMPT_ATTACK", "NONE"),
        ],
        "tierConfig": { "tierName": "CLASSIC" },
    })
}

fn denied_topic(name: &str, definition: &str, examples: &[&str]) -> Value {
    json!({
        "name": name,
        "definition": definition,
        "examples": examples,
        "type": "DENY",
    })
}

fn topic_policy() -> Value {
    json!({
        "topicsConfig": [
            denied_topic(
                "LegalAdvice",
                "Providing legal advice or interpretation of insurance policy laws",
                &["What legal action should I take?", "Is this policy contract enforceable?"],
            ),
            denied_topic(
                "MedicalAdvice",
                "Providing medical diagnosis or treatment advice",
                &["What medication should I take?", "Is this symptom serious?"],
            ),
            denied_topic(
                "Politics",
                "Providing advice on any political issue including world politics and geopolitics",
                &["Which president is the best?", "Do politicians lie about their responsibilities?"],
            ),
        ]
    })
}

fn sensitive_information_policy() -> Value {
    let entities = [
        ("NAME", "ANONYMIZE"),
        ("ADDRESS", "ANONYMIZE"),
        ("PHONE", "ANONYMIZE"),
        ("EMAIL", "ANONYMIZE"),
        ("US_SOCIAL_SECURITY_NUMBER", "BLOCK"),
        ("DRIVER_ID", "BLOCK"),
        ("VEHICLE_IDENTIFICATION_NUMBER", "ANONYMIZE"),
        ("LICENSE_PLATE", "ANONYMIZE"),
    ]
    .into_iter()
    .map(|(kind, action)| json!({ "type": kind, "action": action }))
    .collect::<Vec<_>>();
    json!({ "piiEntitiesConfig": entities })
}

impl<R: CommandRunner> Provisioner for Guardrail<R> {
    type Error = AwsCliError;

    fn status_table(&self) -> &StatusTable {
        &self.table
    }

    fn find<'a>(
        &'a self,
        name: &'a str,
    ) -> LifecycleFuture<'a, Option<ResourceHandle>, Self::Error> {
        Box::pin(async move { Ok(self.ids_named(name).await?.into_iter().next()) })
    }

    fn create<'a>(&'a self, name: &'a str) -> LifecycleFuture<'a, ResourceHandle, Self::Error> {
        Box::pin(async move {
            let response = self
                .cli
                .call_json(SERVICE, "create-guardrail", &self.create_args(name))
                .await?;
            string_at(&response, "/guardrailId", "bedrock create-guardrail")
                .map(ResourceHandle::new)
        })
    }

    fn status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> LifecycleFuture<'a, ResourceStatus, Self::Error> {
        Box::pin(async move {
            let response = self
                .cli
                .call_json(
                    SERVICE,
                    "get-guardrail",
                    &flag("--guardrail-identifier", handle.as_str()),
                )
                .await?;
            string_at(&response, "/status", "bedrock get-guardrail").map(ResourceStatus::new)
        })
    }
}
