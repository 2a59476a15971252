//! Testing utilities for the Coder workspace
//!
//! Scripted collaborators, an in-memory learning store and a temp
//! workspace fixture.

#![allow(missing_docs)]

use coder_core::autopoiesis::LearnedRecord;
use coder_core::routing::{
    action_content, action_id, action_path, action_verb, routing_failure, routing_success,
    BUILD_PROJECT, DELETE_FILE, WRITE_FILE,
};
use coder_core::{
    ActionRouter, LearningStore, LlmClient, LlmError, RouterError, StoreError, ToolGenerator,
    ToolOutcome, ToolRequest,
};
use coder_kernel::{predicates, Fact, InMemoryKernel, Kernel};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static TRACING: Once = Once::new();

/// Install a test subscriber once; honours `RUST_LOG`, defaults to `warn`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// `{file, content}` envelope
pub fn envelope(file: &str, content: &str) -> String {
    serde_json::json!({ "file": file, "content": content }).to_string()
}

/// `{file, content, old_content}` envelope
pub fn envelope_with_old(file: &str, content: &str, old_content: &str) -> String {
    serde_json::json!({ "file": file, "content": content, "old_content": old_content })
        .to_string()
}

/// `{file, content, artifact_type}` envelope
pub fn tool_envelope(file: &str, content: &str, artifact_type: &str) -> String {
    serde_json::json!({ "file": file, "content": content, "artifact_type": artifact_type })
        .to_string()
}

/// `{edits: [{file, content}, ...]}` envelope
pub fn multi_envelope(edits: &[(&str, &str)]) -> String {
    let edits: Vec<_> = edits
        .iter()
        .map(|(file, content)| serde_json::json!({ "file": file, "content": content }))
        .collect();
    serde_json::json!({ "edits": edits }).to_string()
}

/// LLM double that replays queued replies
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    /// Client with no replies queued
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue successful replies
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let llm = Self::new();
        for reply in replies {
            llm.push_reply(reply);
        }
        llm
    }

    /// Queue a reply
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(Ok(reply.into()));
    }

    /// Queue an error
    pub fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().push_back(Err(LlmError::new(message)));
    }

    /// Number of completions requested
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(system, user)` prompt pairs seen so far
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .push((system.to_string(), user.to_string()));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::new("unauthorized: no scripted response left")))
    }
}

/// Router double that performs file actions on disk and records them
#[derive(Debug, Default)]
pub struct RecordingRouter {
    actions: Mutex<Vec<Fact>>,
    build_results: Mutex<VecDeque<Result<String, RouterError>>>,
    fail_paths: Mutex<Vec<String>>,
}

impl RecordingRouter {
    /// Router that succeeds on everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail write/delete actions whose path contains `fragment`
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.fail_paths.lock().push(fragment.into());
    }

    /// Queue a build result
    pub fn push_build(&self, result: Result<String, RouterError>) {
        self.build_results.lock().push_back(result);
    }

    /// Actions routed so far
    pub fn actions(&self) -> Vec<Fact> {
        self.actions.lock().clone()
    }

    /// Verbs of recorded actions, in order
    pub fn verbs(&self) -> Vec<String> {
        self.actions
            .lock()
            .iter()
            .filter_map(|a| action_verb(a).map(str::to_string))
            .collect()
    }

    fn should_fail(&self, path: &str) -> bool {
        self.fail_paths.lock().iter().any(|f| path.contains(f.as_str()))
    }
}

#[async_trait::async_trait]
impl ActionRouter for RecordingRouter {
    async fn route_action(&self, action: &Fact) -> Result<String, RouterError> {
        self.actions.lock().push(action.clone());

        match action_verb(action) {
            Some(WRITE_FILE) => {
                let path = action_path(action).ok_or_else(|| RouterError::new("write without path"))?;
                if self.should_fail(path) {
                    return Err(RouterError::new(format!("scripted failure for {path}")));
                }
                let content = action_content(action).unwrap_or_default();
                if let Some(parent) = Path::new(path).parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| RouterError::new(e.to_string()))?;
                }
                tokio::fs::write(path, content)
                    .await
                    .map_err(|e| RouterError::new(e.to_string()))?;
                Ok(format!("wrote {} bytes", content.len()))
            }
            Some(DELETE_FILE) => {
                let path = action_path(action).ok_or_else(|| RouterError::new("delete without path"))?;
                if self.should_fail(path) {
                    return Err(RouterError::new(format!("scripted failure for {path}")));
                }
                match tokio::fs::remove_file(path).await {
                    Ok(()) => Ok("deleted".to_string()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok("absent".to_string()),
                    Err(e) => Err(RouterError::new(e.to_string())),
                }
            }
            Some(BUILD_PROJECT) => self
                .build_results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new())),
            other => Err(RouterError::new(format!("unsupported action {other:?}"))),
        }
    }
}

/// Watch `next_action` facts and answer them through `routing_result`
///
/// Stands in for the external executor in kernel-dispatch mode.
pub fn spawn_kernel_router(
    kernel: Arc<InMemoryKernel>,
    router: Arc<RecordingRouter>,
    poll: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut handled: HashSet<String> = HashSet::new();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(poll) => {}
            }

            for action in kernel.facts(predicates::NEXT_ACTION) {
                let Some(id) = action_id(&action).map(str::to_string) else {
                    continue;
                };
                if !handled.insert(id.clone()) {
                    continue;
                }
                let result = match router.route_action(&action).await {
                    Ok(output) => routing_success(&id, Some(&output)),
                    Err(e) => routing_failure(&id, &e.to_string()),
                };
                if let Err(e) = kernel.assert_fact(result).await {
                    tracing::warn!(error = %e, "could not assert routing_result");
                }
            }
        }
    })
}

/// Learning store kept in memory
#[derive(Debug, Default)]
pub struct MemoryLearningStore {
    records: Mutex<Vec<(String, String, Vec<String>)>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemoryLearningStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of saved tuples for a predicate
    pub fn count(&self, predicate: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|(_, p, _)| p == predicate)
            .count()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl LearningStore for MemoryLearningStore {
    async fn save(
        &self,
        shard: &str,
        predicate: &str,
        args: &[String],
        _extra: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.records
            .lock()
            .push((shard.to_string(), predicate.to_string(), args.to_vec()));
        Ok(())
    }

    async fn load_by_predicate(
        &self,
        shard: &str,
        predicate: &str,
    ) -> Result<Vec<LearnedRecord>, StoreError> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|(s, p, _)| s == shard && p == predicate)
            .map(|(_, _, args)| LearnedRecord { args: args.clone() })
            .collect())
    }
}

/// Tool generator double that records requests
#[derive(Debug)]
pub struct StubToolGenerator {
    requests: Mutex<Vec<ToolRequest>>,
    outcome: Mutex<ToolOutcome>,
}

impl StubToolGenerator {
    /// Succeeds with `/tools/<name>` as binary path
    pub fn succeeding() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            outcome: Mutex::new(ToolOutcome {
                success: true,
                ..ToolOutcome::default()
            }),
        }
    }

    /// Generator that fails every request
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            outcome: Mutex::new(ToolOutcome {
                success: false,
                error_message: message.into(),
                ..ToolOutcome::default()
            }),
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ToolRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl ToolGenerator for StubToolGenerator {
    async fn generate_tool(&self, request: ToolRequest) -> ToolOutcome {
        let mut outcome = self.outcome.lock().clone();
        if outcome.success {
            outcome.resolved_name.clone_from(&request.tool_name);
            outcome.binary_path = format!("/tools/{}", request.tool_name);
        }
        self.requests.lock().push(request);
        outcome
    }
}

/// Temporary workspace directory
#[derive(Debug)]
pub struct TempWorkspace {
    dir: tempfile::TempDir,
}

impl TempWorkspace {
    /// Fresh temporary directory
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp workspace"),
        }
    }

    /// Workspace root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a relative one
    pub fn join(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating parents
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(path, content).expect("write fixture file");
    }

    /// Read a file as UTF-8; panics when missing
    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.join(relative)).expect("read workspace file")
    }

    /// Whether a relative path exists
    pub fn exists(&self, relative: &str) -> bool {
        self.join(relative).exists()
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Go source with `lines` numbered statements in `main`
pub fn go_file_with_lines(lines: usize, tag: &str) -> String {
    let mut out = String::from("package main\n\nfunc main() {\n");
    for i in 0..lines.saturating_sub(4) {
        out.push_str(&format!("\t_ = \"{tag}-{i}\"\n"));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_llm_runs_dry() {
        let llm = ScriptedLlm::with_replies(["one"]);
        assert_eq!(llm.complete("s", "u").await.unwrap(), "one");
        let err = llm.complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("unauthorized"));
        assert_eq!(llm.calls(), 2);
    }

    #[test]
    fn go_fixture_has_requested_lines() {
        assert_eq!(go_file_with_lines(200, "a").lines().count(), 200);
    }

    #[tokio::test]
    async fn memory_store_filters_by_shard() {
        let store = MemoryLearningStore::new();
        store
            .save("a", "avoid_pattern", &["x".into()], &serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(store.load_by_predicate("b", "avoid_pattern").await.unwrap().len(), 0);
        assert_eq!(store.load_by_predicate("a", "avoid_pattern").await.unwrap().len(), 1);
    }
}
