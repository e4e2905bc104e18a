//! Bedrock ingestion job adapter.
//!
//! Ingestion jobs are never reused: every `ensure` starts a fresh job so the
//! vector index reflects the current bucket contents.

use std::ffi::OsString;

use super::{AwsCli, AwsCliError, client_token, flag, string_at};
use crate::command::CommandRunner;
use crate::lifecycle::{
    LifecycleFuture, Provisioner, ResourceHandle, ResourceStatus, StatusTable,
};

const SERVICE: &str = "bedrock-agent";

/// Ingestion job for one knowledge base data source.
#[derive(Clone, Debug)]
pub struct IngestionJob<R: CommandRunner> {
    cli: AwsCli<R>,
    knowledge_base_id: ResourceHandle,
    data_source_id: ResourceHandle,
    table: StatusTable,
}

impl<R: CommandRunner> IngestionJob<R> {
    /// Creates an adapter for the given knowledge base and data source.
    #[must_use]
    pub fn new(
        cli: AwsCli<R>,
        knowledge_base_id: ResourceHandle,
        data_source_id: ResourceHandle,
    ) -> Self {
        Self {
            cli,
            knowledge_base_id,
            data_source_id,
            table: StatusTable::ingestion_job(),
        }
    }

    fn scope(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(4);
        args.extend(flag("--knowledge-base-id", self.knowledge_base_id.as_str()));
        args.extend(flag("--data-source-id", self.data_source_id.as_str()));
        args
    }
}

impl<R: CommandRunner> Provisioner for IngestionJob<R> {
    type Error = AwsCliError;

    fn status_table(&self) -> &StatusTable {
        &self.table
    }

    fn find<'a>(
        &'a self,
        _name: &'a str,
    ) -> LifecycleFuture<'a, Option<ResourceHandle>, Self::Error> {
        Box::pin(async { Ok(None) })
    }

    fn create<'a>(&'a self, name: &'a str) -> LifecycleFuture<'a, ResourceHandle, Self::Error> {
        Box::pin(async move {
            let mut args = self.scope();
            args.extend(flag("--description", name));
            args.extend(flag("--client-token", client_token()));
            let response = self
                .cli
                .call_json(SERVICE, "start-ingestion-job", &args)
                .await?;
            string_at(
                &response,
                "/ingestionJob/ingestionJobId",
                "bedrock-agent start-ingestion-job",
            )
            .map(ResourceHandle::new)
        })
    }

    fn status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> LifecycleFuture<'a, ResourceStatus, Self::Error> {
        Box::pin(async move {
            let mut args = self.scope();
            args.extend(flag("--ingestion-job-id", handle.as_str()));
            let response = self
                .cli
                .call_json(SERVICE, "get-ingestion-job", &args)
                .await?;
            string_at(
                &response,
                "/ingestionJob/status",
                "bedrock-agent get-ingestion-job",
            )
            .map(ResourceStatus::new)
        })
    }
}
