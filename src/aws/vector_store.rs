//! S3 Vectors bucket and index adapter.
//!
//! The service reports no lifecycle status, so the adapter synthesises one:
//! `AVAILABLE` when the index answers `get-index`, `MISSING` when AWS says
//! it does not exist. A bucket left without its index by an interrupted
//! run is not reported by `find`, so the next run creates the index.

use std::ffi::OsString;

use serde::Deserialize;
use tracing::debug;

use super::{AwsCli, AwsCliError, flag, string_at};
use crate::command::CommandRunner;
use crate::lifecycle::{
    LifecycleFuture, Provisioner, ResourceHandle, ResourceStatus, StatusTable,
};

const SERVICE: &str = "s3vectors";

/// ARNs a knowledge base needs to write vectors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VectorStoreArns {
    /// Vector bucket ARN.
    pub bucket_arn: String,
    /// Vector index ARN.
    pub index_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VectorBucketSummary {
    vector_bucket_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VectorBucketList {
    #[serde(default)]
    vector_buckets: Vec<VectorBucketSummary>,
}

/// Vector bucket holding a single float32 cosine index. The resource name
/// is the bucket name, which doubles as its handle.
#[derive(Clone, Debug)]
pub struct VectorStore<R: CommandRunner> {
    cli: AwsCli<R>,
    index_name: String,
    dimension: u32,
    table: StatusTable,
}

impl<R: CommandRunner> VectorStore<R> {
    /// Creates an adapter for `index_name` with vectors of `dimension`.
    #[must_use]
    pub fn new(cli: AwsCli<R>, index_name: impl Into<String>, dimension: u32) -> Self {
        Self {
            cli,
            index_name: index_name.into(),
            dimension,
            table: StatusTable::vector_store(),
        }
    }

    /// Name of the managed index.
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Resolves the bucket and index ARNs.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when either lookup fails.
    pub async fn arns(&self, bucket: &ResourceHandle) -> Result<VectorStoreArns, AwsCliError> {
        let bucket_response = self
            .cli
            .call_json(
                SERVICE,
                "get-vector-bucket",
                &flag("--vector-bucket-name", bucket.as_str()),
            )
            .await?;
        let bucket_arn = string_at(
            &bucket_response,
            "/vectorBucket/vectorBucketArn",
            "s3vectors get-vector-bucket",
        )?;
        let index_response = self.get_index(bucket).await?;
        let index_arn = string_at(&index_response, "/index/indexArn", "s3vectors get-index")?;
        Ok(VectorStoreArns {
            bucket_arn,
            index_arn,
        })
    }

    /// Lists vector bucket names in the region.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when the CLI call or parsing fails.
    pub async fn bucket_names(&self) -> Result<Vec<String>, AwsCliError> {
        let listing: VectorBucketList = self
            .cli
            .call_as(SERVICE, "list-vector-buckets", &[])
            .await?;
        Ok(listing
            .vector_buckets
            .into_iter()
            .map(|bucket| bucket.vector_bucket_name)
            .collect())
    }

    /// Deletes the index, then the bucket. A missing index is skipped so a
    /// half-created store can still be removed.
    ///
    /// # Errors
    ///
    /// Returns [`AwsCliError`] when either delete fails for another reason.
    pub async fn delete(&self, bucket: &str) -> Result<(), AwsCliError> {
        let mut index_args: Vec<OsString> = flag("--vector-bucket-name", bucket).into();
        index_args.extend(flag("--index-name", self.index_name.as_str()));
        match self.cli.call(SERVICE, "delete-index", &index_args).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        self.cli
            .call(
                SERVICE,
                "delete-vector-bucket",
                &flag("--vector-bucket-name", bucket),
            )
            .await
            .map(drop)
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool, AwsCliError> {
        Ok(self.bucket_names().await?.iter().any(|bucket| bucket == name))
    }

    async fn get_index(&self, bucket: &ResourceHandle) -> Result<serde_json::Value, AwsCliError> {
        let mut args: Vec<OsString> = flag("--vector-bucket-name", bucket.as_str()).into();
        args.extend(flag("--index-name", self.index_name.as_str()));
        self.cli.call_json(SERVICE, "get-index", &args).await
    }
}

impl<R: CommandRunner> Provisioner for VectorStore<R> {
    type Error = AwsCliError;

    fn status_table(&self) -> &StatusTable {
        &self.table
    }

    fn find<'a>(
        &'a self,
        name: &'a str,
    ) -> LifecycleFuture<'a, Option<ResourceHandle>, Self::Error> {
        Box::pin(async move {
            if !self.bucket_exists(name).await? {
                return Ok(None);
            }
            // A bucket without its index is unfinished; `create` completes it.
            let handle = ResourceHandle::new(name);
            match self.get_index(&handle).await {
                Ok(_) => Ok(Some(handle)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            }
        })
    }

    fn create<'a>(&'a self, name: &'a str) -> LifecycleFuture<'a, ResourceHandle, Self::Error> {
        Box::pin(async move {
            if self.bucket_exists(name).await? {
                debug!(bucket = %name, "vector bucket exists, creating index only");
            } else {
                self.cli
                    .call(SERVICE, "create-vector-bucket", &flag("--vector-bucket-name", name))
                    .await?;
            }

            let mut args: Vec<OsString> = flag("--vector-bucket-name", name).into();
            args.extend(flag("--index-name", self.index_name.as_str()));
            args.extend(flag("--data-type", "float32"));
            args.extend(flag("--dimension", self.dimension.to_string()));
            args.extend(flag("--distance-metric", "cosine"));
            self.cli.call(SERVICE, "create-index", &args).await?;
            Ok(ResourceHandle::new(name))
        })
    }

    fn status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> LifecycleFuture<'a, ResourceStatus, Self::Error> {
        Box::pin(async move {
            match self.get_index(handle).await {
                Ok(_) => Ok(ResourceStatus::new("AVAILABLE")),
                Err(err) if err.is_not_found() => Ok(ResourceStatus::new("MISSING")),
                Err(err) => Err(err),
            }
        })
    }
}
