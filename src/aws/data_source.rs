//! Bedrock knowledge base data source adapter.

use std::ffi::OsString;

use serde::Deserialize;
use serde_json::json;

use super::{AwsCli, AwsCliError, client_token, flag, string_at};
use crate::command::CommandRunner;
use crate::lifecycle::{
    LifecycleFuture, Provisioner, ResourceHandle, ResourceStatus, StatusTable,
};

const SERVICE: &str = "bedrock-agent";

/// S3 source and chunking settings for a data source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataSourceSpec {
    /// General purpose bucket holding the documents.
    pub bucket: String,
    /// Key prefix ingested from the bucket.
    pub prefix: String,
    /// Maximum tokens per fixed-size chunk.
    pub chunk_max_tokens: u32,
    /// Overlap between consecutive chunks, in percent.
    pub chunk_overlap_percentage: u32,
    /// Description stored on the data source.
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceSummary {
    data_source_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceList {
    #[serde(default)]
    data_source_summaries: Vec<DataSourceSummary>,
}

/// Data source attached to one knowledge base.
#[derive(Clone, Debug)]
pub struct DataSource<R: CommandRunner> {
    cli: AwsCli<R>,
    knowledge_base_id: ResourceHandle,
    spec: DataSourceSpec,
    table: StatusTable,
}

impl<R: CommandRunner> DataSource<R> {
    /// Creates an adapter scoped to `knowledge_base_id`.
    #[must_use]
    pub fn new(cli: AwsCli<R>, knowledge_base_id: ResourceHandle, spec: DataSourceSpec) -> Self {
        Self {
            cli,
            knowledge_base_id,
            spec,
            table: StatusTable::data_source(),
        }
    }

    fn data_source_configuration(&self) -> String {
        json!({
            "type": "S3",
            "s3Configuration": {
                "bucketArn": format!("arn:aws:s3:::{}", self.spec.bucket),
                "inclusionPrefixes": [self.spec.prefix],
            }
        })
        .to_string()
    }

    fn vector_ingestion_configuration(&self) -> String {
        json!({
            "chunkingConfiguration": {
                "chunkingStrategy": "FIXED_SIZE",
                "fixedSizeChunkingConfiguration": {
                    "maxTokens": self.spec.chunk_max_tokens,
                    "overlapPercentage": self.spec.chunk_overlap_percentage,
                }
            }
        })
        .to_string()
    }

    fn scope(&self) -> [OsString; 2] {
        flag("--knowledge-base-id", self.knowledge_base_id.as_str())
    }
}

impl<R: CommandRunner> Provisioner for DataSource<R> {
    type Error = AwsCliError;

    fn status_table(&self) -> &StatusTable {
        &self.table
    }

    fn find<'a>(
        &'a self,
        name: &'a str,
    ) -> LifecycleFuture<'a, Option<ResourceHandle>, Self::Error> {
        Box::pin(async move {
            let listing: DataSourceList = self
                .cli
                .call_as(SERVICE, "list-data-sources", &self.scope())
                .await?;
            Ok(listing
                .data_source_summaries
                .into_iter()
                .find(|ds| ds.name == name)
                .map(|ds| ResourceHandle::new(ds.data_source_id)))
        })
    }

    fn create<'a>(&'a self, name: &'a str) -> LifecycleFuture<'a, ResourceHandle, Self::Error> {
        Box::pin(async move {
            let mut args: Vec<OsString> = self.scope().into();
            args.extend(flag("--name", name));
            args.extend(flag("--description", self.spec.description.as_str()));
            args.extend(flag(
                "--data-source-configuration",
                self.data_source_configuration(),
            ));
            args.extend(flag(
                "--vector-ingestion-configuration",
                self.vector_ingestion_configuration(),
            ));
            args.extend(flag("--client-token", client_token()));

            let response = self
                .cli
                .call_json(SERVICE, "create-data-source", &args)
                .await?;
            string_at(
                &response,
                "/dataSource/dataSourceId",
                "bedrock-agent create-data-source",
            )
            .map(ResourceHandle::new)
        })
    }

    fn status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> LifecycleFuture<'a, ResourceStatus, Self::Error> {
        Box::pin(async move {
            let mut args: Vec<OsString> = self.scope().into();
            args.extend(flag("--data-source-id", handle.as_str()));
            let response = self
                .cli
                .call_json(SERVICE, "get-data-source", &args)
                .await?;
            string_at(
                &response,
                "/dataSource/status",
                "bedrock-agent get-data-source",
            )
            .map(ResourceStatus::new)
        })
    }
}
