//! Bedrock knowledge base adapter.

use std::ffi::OsString;

use serde::Deserialize;
use serde_json::json;

use super::{AwsCli, AwsCliError, VectorStoreArns, client_token, flag, string_at};
use crate::command::CommandRunner;
use crate::lifecycle::{
    LifecycleFuture, Provisioner, ResourceHandle, ResourceStatus, StatusTable,
};

const SERVICE: &str = "bedrock-agent";

/// Settings for a vector knowledge base backed by S3 Vectors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KnowledgeBaseSpec {
    /// IAM role Bedrock assumes to read documents and write vectors.
    pub role_arn: String,
    /// Embedding model used during ingestion.
    pub embedding_model_arn: String,
    /// General purpose bucket holding the source documents, also used for
    /// supplemental storage.
    pub document_bucket: String,
    /// Description stored on the knowledge base.
    pub description: String,
}

/// Entry returned by `list-knowledge-bases`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseSummary {
    /// Identifier issued by Bedrock.
    pub knowledge_base_id: String,
    /// Human readable name.
    pub name: String,
    /// Last reported status.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseList {
    #[serde(default)]
    knowledge_base_summaries: Vec<KnowledgeBaseSummary>,
}

/// Knowledge base resource, created against an existing vector index.
#[derive(Clone, Debug)]
pub struct KnowledgeBase<R: CommandRunner> {
    cli: AwsCli<R>,
    spec: KnowledgeBaseSpec,
    storage: VectorStoreArns,
    table: StatusTable,
}

impl<R: CommandRunner> KnowledgeBase<R> {
    /// Creates an adapter that stores vectors in `storage`.
    #[must_use]
    pub fn new(cli: AwsCli<R>, spec: KnowledgeBaseSpec, storage: VectorStoreArns) -> Self {
        Self {
            cli,
            spec,
            storage,
            table: StatusTable::knowledge_base(),
        }
    }

    /// Lists every knowledge base in the region.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when the CLI call or parsing fails.
    pub async fn list(&self) -> Result<Vec<KnowledgeBaseSummary>, AwsCliError> {
        list(&self.cli).await
    }

    fn knowledge_base_configuration(&self) -> String {
        json!({
            "type": "VECTOR",
            "vectorKnowledgeBaseConfiguration": {
                "embeddingModelArn": self.spec.embedding_model_arn,
                "supplementalDataStorageConfiguration": {
                    "storageLocations": [{
                        "type": "S3",
                        "s3Location": { "uri": format!("s3://{}", self.spec.document_bucket) }
                    }]
                }
            }
        })
        .to_string()
    }

    fn storage_configuration(&self) -> String {
        json!({
            "type": "S3_VECTORS",
            "s3VectorsConfiguration": {
                "vectorBucketArn": self.storage.bucket_arn,
                "indexArn": self.storage.index_arn,
            }
        })
        .to_string()
    }
}

/// Lists knowledge bases without needing a fully configured adapter.
pub(crate) async fn list<R: CommandRunner>(
    cli: &AwsCli<R>,
) -> Result<Vec<KnowledgeBaseSummary>, AwsCliError> {
    let listing: KnowledgeBaseList = cli.call_as(SERVICE, "list-knowledge-bases", &[]).await?;
    Ok(listing.knowledge_base_summaries)
}

/// Requests deletion of a knowledge base. Bedrock moves it to `DELETING`.
pub(crate) async fn delete<R: CommandRunner>(
    cli: &AwsCli<R>,
    id: &str,
) -> Result<(), AwsCliError> {
    cli.call(SERVICE, "delete-knowledge-base", &flag("--knowledge-base-id", id))
        .await
        .map(drop)
}

impl<R: CommandRunner> Provisioner for KnowledgeBase<R> {
    type Error = AwsCliError;

    fn status_table(&self) -> &StatusTable {
        &self.table
    }

    fn find<'a>(
        &'a self,
        name: &'a str,
    ) -> LifecycleFuture<'a, Option<ResourceHandle>, Self::Error> {
        Box::pin(async move {
            Ok(self
                .list()
                .await?
                .into_iter()
                .find(|kb| kb.name == name)
                .map(|kb| ResourceHandle::new(kb.knowledge_base_id)))
        })
    }

    fn create<'a>(&'a self, name: &'a str) -> LifecycleFuture<'a, ResourceHandle, Self::Error> {
        Box::pin(async move {
            let mut args: Vec<OsString> = Vec::new();
            args.extend(flag("--name", name));
            args.extend(flag("--description", self.spec.description.as_str()));
            args.extend(flag("--role-arn", self.spec.role_arn.as_str()));
            args.extend(flag(
                "--knowledge-base-configuration",
                self.knowledge_base_configuration(),
            ));
            args.extend(flag("--storage-configuration", self.storage_configuration()));
            args.extend(flag("--client-token", client_token()));

            let response = self
                .cli
                .call_json(SERVICE, "create-knowledge-base", &args)
                .await?;
            let id = string_at(
                &response,
                "/knowledgeBase/knowledgeBaseId",
                "bedrock-agent create-knowledge-base",
            )?;
            Ok(ResourceHandle::new(id))
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
                    "get-knowledge-base",
                    &flag("--knowledge-base-id", handle.as_str()),
                )
                .await?;
            string_at(
                &response,
                "/knowledgeBase/status",
                "bedrock-agent get-knowledge-base",
            )
            .map(ResourceStatus::new)
        })
    }
}
