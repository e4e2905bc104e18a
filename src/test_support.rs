//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::command::{CommandError, CommandFuture, CommandOutput, CommandRunner};
use crate::lifecycle::{
    LifecycleFuture, Provisioner, RemoteError, ResourceHandle, ResourceStatus, StatusTable,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

#[derive(Clone, Debug)]
struct ScriptedResponse {
    output: CommandOutput,
    response_file: Option<String>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len().saturating_add(1));
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the value following `flag`, if present.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .skip_while(|arg| arg.to_string_lossy() != flag)
            .nth(1)
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with a JSON document on stdout.
    pub fn push_json(&self, body: &Value) {
        self.push_output(Some(0), body.to_string(), "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(ScriptedResponse {
            output: CommandOutput {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            },
            response_file: None,
        });
    }

    /// Pushes a successful `invoke-model` call that writes `body` to the
    /// `*.json` output path among the arguments.
    pub fn push_model_response(&self, body: &Value) {
        lock(&self.responses).push_back(ScriptedResponse {
            output: CommandOutput {
                code: Some(0),
                stdout: json!({ "contentType": "application/json" }).to_string(),
                stderr: String::new(),
            },
            response_file: Some(body.to_string()),
        });
    }
}

fn write_response_file(program: &str, args: &[OsString], body: &str) -> Result<(), CommandError> {
    let spawn_error = |message: String| CommandError::Spawn {
        program: program.to_owned(),
        message,
    };
    let path = args
        .iter()
        .filter_map(|arg| arg.to_str())
        .find(|arg| arg.ends_with(".json"))
        .map(Utf8Path::new)
        .ok_or_else(|| spawn_error(String::from("no response file argument")))?;
    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Err(spawn_error(format!("invalid response file path {path}")));
    };
    Dir::open_ambient_dir(parent, ambient_authority())
        .and_then(|dir| dir.write(file_name, body))
        .map_err(|err| spawn_error(err.to_string()))
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        let next = lock(&self.responses).pop_front();
        let outcome = match next {
            None => Err(CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            }),
            Some(ScriptedResponse {
                output,
                response_file: Some(body),
            }) => write_response_file(program, args, &body).map(|()| output),
            Some(ScriptedResponse { output, .. }) => Ok(output),
        };
        Box::pin(async move { outcome })
    }
}

/// Error returned by [`ScriptedProvisioner`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedRemoteError {
    /// Simulates a provider rejecting a duplicate name.
    #[error("resource name already exists")]
    NameTaken,
    /// Simulates any other remote failure.
    #[error("scripted remote failure: {0}")]
    Failure(String),
    /// Raised when the script ran out of status responses.
    #[error("no scripted status available")]
    Exhausted,
}

impl RemoteError for ScriptedRemoteError {
    fn is_name_conflict(&self) -> bool {
        matches!(self, Self::NameTaken)
    }
}

#[derive(Debug, Default)]
struct ProvisionerScript {
    existing: Option<ResourceHandle>,
    find_error: Option<ScriptedRemoteError>,
    create_results: VecDeque<Result<ResourceHandle, ScriptedRemoteError>>,
    reuse_created: bool,
    statuses: VecDeque<Result<ResourceStatus, ScriptedRemoteError>>,
    find_calls: usize,
    create_calls: usize,
    status_calls: usize,
}

/// In-memory [`Provisioner`] whose responses are scripted up front.
///
/// Clones share the same script and counters.
#[derive(Clone, Debug)]
pub struct ScriptedProvisioner {
    table: StatusTable,
    script: Arc<Mutex<ProvisionerScript>>,
}

impl ScriptedProvisioner {
    /// Creates a provisioner using the knowledge base vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_table(StatusTable::knowledge_base())
    }

    /// Creates a provisioner classifying statuses with `table`.
    #[must_use]
    pub fn with_table(table: StatusTable) -> Self {
        Self {
            table,
            script: Arc::new(Mutex::new(ProvisionerScript::default())),
        }
    }

    /// Makes `find` return `handle`.
    #[must_use]
    pub fn existing(self, handle: &str) -> Self {
        lock(&self.script).existing = Some(ResourceHandle::new(handle));
        self
    }

    /// Makes `find` fail.
    #[must_use]
    pub fn failing_find(self, error: ScriptedRemoteError) -> Self {
        lock(&self.script).find_error = Some(error);
        self
    }

    /// Queues a successful create returning `handle`.
    #[must_use]
    pub fn creates(self, handle: &str) -> Self {
        lock(&self.script)
            .create_results
            .push_back(Ok(ResourceHandle::new(handle)));
        self
    }

    /// Queues a failing create.
    #[must_use]
    pub fn failing_create(self, error: ScriptedRemoteError) -> Self {
        lock(&self.script).create_results.push_back(Err(error));
        self
    }

    /// Makes later `find` calls return whatever `create` produced.
    #[must_use]
    pub fn remembering_created(self) -> Self {
        lock(&self.script).reuse_created = true;
        self
    }

    /// Queues status strings returned in order.
    #[must_use]
    pub fn statuses(self, statuses: &[&str]) -> Self {
        lock(&self.script)
            .statuses
            .extend(statuses.iter().map(|status| Ok(ResourceStatus::new(*status))));
        self
    }

    /// Queues a failing status call.
    #[must_use]
    pub fn failing_status(self, error: ScriptedRemoteError) -> Self {
        lock(&self.script).statuses.push_back(Err(error));
        self
    }

    /// Number of `find` calls observed.
    #[must_use]
    pub fn find_calls(&self) -> usize {
        lock(&self.script).find_calls
    }

    /// Number of `create` calls observed.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        lock(&self.script).create_calls
    }

    /// Number of `status` calls observed.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        lock(&self.script).status_calls
    }
}

impl Default for ScriptedProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Provisioner for ScriptedProvisioner {
    type Error = ScriptedRemoteError;

    fn status_table(&self) -> &StatusTable {
        &self.table
    }

    fn find<'a>(
        &'a self,
        _name: &'a str,
    ) -> LifecycleFuture<'a, Option<ResourceHandle>, Self::Error> {
        let result = {
            let mut script = lock(&self.script);
            script.find_calls = script.find_calls.saturating_add(1);
            script
                .find_error
                .clone()
                .map_or_else(|| Ok(script.existing.clone()), Err)
        };
        Box::pin(async move { result })
    }

    fn create<'a>(&'a self, _name: &'a str) -> LifecycleFuture<'a, ResourceHandle, Self::Error> {
        let result = {
            let mut script = lock(&self.script);
            script.create_calls = script.create_calls.saturating_add(1);
            let next = script
                .create_results
                .pop_front()
                .unwrap_or_else(|| Err(ScriptedRemoteError::Failure(String::from("no create"))));
            if let (Ok(handle), true) = (&next, script.reuse_created) {
                script.existing = Some(handle.clone());
            }
            next
        };
        Box::pin(async move { result })
    }

    fn status<'a>(
        &'a self,
        _handle: &'a ResourceHandle,
    ) -> LifecycleFuture<'a, ResourceStatus, Self::Error> {
        let result = {
            let mut script = lock(&self.script);
            script.status_calls = script.status_calls.saturating_add(1);
            script
                .statuses
                .pop_front()
                .unwrap_or(Err(ScriptedRemoteError::Exhausted))
        };
        Box::pin(async move { result })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs, &[]).await
    }

    /// Sets `pairs` and removes `removed` while holding the global mutex.
    pub async fn apply(pairs: &[(&str, &str)], removed: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(removed.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len().saturating_add(removed.len()));
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in removed {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Produces a payload matching `aws bedrock-agent list-knowledge-bases`.
#[must_use]
pub fn json_knowledge_bases(items: &[(&str, &str, &str)]) -> Value {
    let summaries = items
        .iter()
        .map(|(id, name, status)| {
            json!({ "knowledgeBaseId": id, "name": name, "status": status })
        })
        .collect::<Vec<_>>();
    json!({ "knowledgeBaseSummaries": summaries })
}

/// Produces a payload matching `aws bedrock-agent get-knowledge-base`.
#[must_use]
pub fn json_knowledge_base(id: &str, status: &str) -> Value {
    json!({
        "knowledgeBase": {
            "knowledgeBaseId": id,
            "knowledgeBaseArn": format!("arn:aws:bedrock:us-east-1:123456789012:knowledge-base/{id}"),
            "status": status,
        }
    })
}

/// Produces a payload matching `aws bedrock-agent list-data-sources`.
#[must_use]
pub fn json_data_sources(items: &[(&str, &str)]) -> Value {
    let summaries = items
        .iter()
        .map(|(id, name)| json!({ "dataSourceId": id, "name": name, "status": "AVAILABLE" }))
        .collect::<Vec<_>>();
    json!({ "dataSourceSummaries": summaries })
}

/// Produces a payload matching `aws bedrock-agent get-data-source`.
#[must_use]
pub fn json_data_source(id: &str, status: &str) -> Value {
    json!({ "dataSource": { "dataSourceId": id, "status": status } })
}

/// Produces a payload matching `aws bedrock-agent get-ingestion-job`.
#[must_use]
pub fn json_ingestion_job(id: &str, status: &str) -> Value {
    json!({ "ingestionJob": { "ingestionJobId": id, "status": status } })
}

/// Produces a payload matching `aws s3vectors list-vector-buckets`.
#[must_use]
pub fn json_vector_buckets(names: &[&str]) -> Value {
    let buckets = names
        .iter()
        .map(|name| {
            json!({
                "vectorBucketName": name,
                "vectorBucketArn": format!("arn:aws:s3vectors:us-east-1:123456789012:bucket/{name}"),
            })
        })
        .collect::<Vec<_>>();
    json!({ "vectorBuckets": buckets })
}

/// Produces a payload matching `aws s3vectors get-index`.
#[must_use]
pub fn json_vector_index(bucket: &str, index: &str) -> Value {
    json!({
        "index": {
            "vectorBucketName": bucket,
            "indexName": index,
            "indexArn": format!("arn:aws:s3vectors:us-east-1:123456789012:bucket/{bucket}/index/{index}"),
        }
    })
}

/// Produces a payload matching `aws bedrock list-guardrails`.
#[must_use]
pub fn json_guardrails(items: &[(&str, &str, &str)]) -> Value {
    let guardrails = items
        .iter()
        .map(|(id, name, version)| {
            json!({ "id": id, "name": name, "version": version, "status": "READY" })
        })
        .collect::<Vec<_>>();
    json!({ "guardrails": guardrails })
}

/// Produces a payload matching `aws bedrock get-guardrail`.
#[must_use]
pub fn json_guardrail(id: &str, status: &str) -> Value {
    json!({ "guardrailId": id, "status": status, "version": "DRAFT" })
}
