//! Edit pipeline orchestrator
//!
//! One [`Coder::execute`] call runs a task end to end:
//! parse → safety gate → prompt → LLM (retry) → decode → route by artifact.
//! Project code goes through the transactional apply, then the build check,
//! fact emission and learning updates. Tool artifacts are handed to the
//! tool generator and never touch the workspace.

use crate::autopoiesis::{Autopoiesis, LearnedPatterns, LearningStore};
use crate::build::run_build;
use crate::collaborators::{
    ActionRouter, FileContextProvider, FsFileContext, LlmClient, ToolGenerator, ToolRequest,
};
use crate::config::CoderConfig;
use crate::decoder::decode_response;
use crate::error::{CoderError, ConfigError};
use crate::facts::{generate_facts, modified_fact, task_fact};
use crate::intent::parse_task;
use crate::prompt::{DefaultPromptBuilder, PromptBuilder, PromptContext};
use crate::retry::{complete_with_retry, RetryPolicy};
use crate::routing::{self, delete_action, new_action_id, write_action, RoutingError};
use crate::safety::{SafetyGate, SafetyVerdict};
use crate::types::{
    Action, ArtifactKind, BuildOutcome, Diagnostic, Edit, ParsedResponse, Task, TaskId,
    TaskReport, TaskState,
};
use coder_artifact::{file_stem, line_change_ratio, resolve_path, PathError};
use coder_constitutional::{workspace, FileTransaction, SyntaxValidator};
use coder_kernel::{predicates, Fact, Kernel};
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Counter key for tool-generation outcomes
const TOOL_GENERATION_KEY: &str = "self_tool_generation";

/// Reason recorded when the safety gate blocks a task
const IMPACT_BLOCKED: &str = "impact_blocked";

/// Per-instance mutable state, guarded by one lock
#[derive(Debug, Default)]
struct CoderState {
    state: TaskState,
    history: Vec<Edit>,
    diagnostics: Vec<Diagnostic>,
    started_at: Option<Instant>,
    policy_loaded: bool,
}

/// The edit pipeline
pub struct Coder {
    config: CoderConfig,
    workdir: PathBuf,
    llm: Arc<dyn LlmClient>,
    kernel: Option<Arc<dyn Kernel>>,
    router: Option<Arc<dyn ActionRouter>>,
    file_context: Arc<dyn FileContextProvider>,
    prompts: Arc<dyn PromptBuilder>,
    tools: Option<Arc<dyn ToolGenerator>>,
    gate: SafetyGate,
    learning: Autopoiesis,
    inner: RwLock<CoderState>,
}

impl fmt::Debug for Coder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coder")
            .field("workdir", &self.workdir)
            .field("config", &self.config)
            .field("has_kernel", &self.kernel.is_some())
            .field("has_router", &self.router.is_some())
            .field("has_tools", &self.tools.is_some())
            .field("learning", &self.learning)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Coder`]
pub struct CoderBuilder {
    workdir: PathBuf,
    llm: Arc<dyn LlmClient>,
    config: CoderConfig,
    kernel: Option<Arc<dyn Kernel>>,
    router: Option<Arc<dyn ActionRouter>>,
    file_context: Option<Arc<dyn FileContextProvider>>,
    prompts: Option<Arc<dyn PromptBuilder>>,
    tools: Option<Arc<dyn ToolGenerator>>,
    store: Option<Arc<dyn LearningStore>>,
}

impl fmt::Debug for CoderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoderBuilder")
            .field("workdir", &self.workdir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CoderBuilder {
    /// Replace the default configuration
    #[must_use]
    pub fn with_config(mut self, config: CoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a kernel for policy, facts and dispatch
    #[must_use]
    pub fn with_kernel(mut self, kernel: Arc<dyn Kernel>) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Attach an action router; without one edits are written directly
    #[must_use]
    pub fn with_router(mut self, router: Arc<dyn ActionRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Override the default filesystem context reader
    #[must_use]
    pub fn with_file_context(mut self, provider: Arc<dyn FileContextProvider>) -> Self {
        self.file_context = Some(provider);
        self
    }

    /// Override the default prompt builder
    #[must_use]
    pub fn with_prompt_builder(mut self, builder: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = Some(builder);
        self
    }

    /// Attach a tool generator for self-tool artifacts
    #[must_use]
    pub fn with_tool_generator(mut self, tools: Arc<dyn ToolGenerator>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Attach a store for learned patterns
    #[must_use]
    pub fn with_learning_store(mut self, store: Arc<dyn LearningStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate config and hydrate learned patterns
    ///
    /// A failing learning store is logged; the coder starts with empty
    /// counters.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for out-of-range config values.
    pub async fn build(self) -> Result<Coder, ConfigError> {
        self.config.validate()?;

        let mut learning = Autopoiesis::from_config(&self.config);
        if let Some(store) = self.store {
            learning = learning.with_store(store);
        }
        if let Err(e) = learning.load_learned_patterns().await {
            tracing::warn!(error = %e, "could not load learned patterns");
        }

        let file_context = self
            .file_context
            .unwrap_or_else(|| Arc::new(FsFileContext::new(self.workdir.clone())));

        Ok(Coder {
            gate: SafetyGate::new(self.kernel.clone()),
            config: self.config,
            workdir: self.workdir,
            llm: self.llm,
            kernel: self.kernel,
            router: self.router,
            file_context,
            prompts: self.prompts.unwrap_or_else(|| Arc::new(DefaultPromptBuilder)),
            tools: self.tools,
            learning,
            inner: RwLock::new(CoderState::default()),
        })
    }
}

/// Marks the task failed if `execute` is dropped before it finishes
struct RunGuard<'a> {
    inner: &'a RwLock<CoderState>,
    done: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, ok: bool) {
        self.inner.write().state = if ok {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        self.done = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.inner.write().state = TaskState::Failed;
        }
    }
}

impl Coder {
    /// Start building a coder rooted at `workdir`
    #[must_use]
    pub fn builder(workdir: impl Into<PathBuf>, llm: Arc<dyn LlmClient>) -> CoderBuilder {
        CoderBuilder {
            workdir: workdir.into(),
            llm,
            config: CoderConfig::default(),
            kernel: None,
            router: None,
            file_context: None,
            prompts: None,
            tools: None,
            store: None,
        }
    }

    /// Run one task
    ///
    /// # Errors
    /// - `CoderError::Busy` if another task is running on this instance
    /// - any other [`CoderError`] kind; apply failures leave the workspace
    ///   as it was before the call
    pub async fn execute(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TaskReport, CoderError> {
        let guard = self.begin()?;
        let id = TaskId::new();
        let result = self
            .run(id, input, cancel)
            .instrument(tracing::info_span!("execute", task_id = %id))
            .await;
        guard.finish(result.is_ok());
        result
    }

    fn begin(&self) -> Result<RunGuard<'_>, CoderError> {
        let mut inner = self.inner.write();
        if inner.state == TaskState::Running {
            return Err(CoderError::Busy);
        }
        inner.state = TaskState::Running;
        inner.history.clear();
        inner.diagnostics.clear();
        inner.started_at = Some(Instant::now());
        Ok(RunGuard {
            inner: &self.inner,
            done: false,
        })
    }

    async fn run(
        &self,
        id: TaskId,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TaskReport, CoderError> {
        let started = Instant::now();
        self.ensure_policy().await;

        let task = parse_task(input);
        tracing::info!(action = %task.action, path = %task.target, "task started");

        if self.config.safety_mode && self.config.impact_check {
            if let SafetyVerdict::Blocked(reason) = self.gate.check(&task.target).await {
                tracing::warn!(path = %task.target, %reason, "edit blocked by policy");
                self.learning
                    .track_rejection(task.action.tag(), IMPACT_BLOCKED)
                    .await;
                return Err(CoderError::PolicyBlocked {
                    target: task.target,
                    reason,
                });
            }
        }

        self.assert_best_effort(task_fact(&task)).await;

        let parsed = match self.generate(&task, cancel).await {
            Ok(parsed) => parsed,
            Err(err) => return Err(self.reject(&task, err).await),
        };

        if parsed.artifact.is_tool() {
            return self.hand_off_tool(id, task, parsed, started, cancel).await;
        }

        let applied = match self.apply_edits(&parsed.edits, cancel).await {
            Ok(applied) => applied,
            Err(err @ CoderError::PolicyBlocked { .. }) => {
                self.learning
                    .track_rejection(task.action.tag(), IMPACT_BLOCKED)
                    .await;
                return Err(err);
            }
            Err(err) => return Err(self.reject(&task, err).await),
        };
        self.learning.track_acceptance(task.action.tag()).await;

        let build = run_build(self.router.as_deref(), &self.workdir, cancel).await;
        self.inner.write().diagnostics.clone_from(&build.diagnostics);

        let facts = generate_facts(
            &applied,
            &build,
            &self.learning.learned_patterns(),
            chrono::Utc::now(),
        );
        for fact in &facts {
            self.assert_best_effort(fact.clone()).await;
        }

        let report = TaskReport {
            id,
            task,
            artifact: ArtifactKind::ProjectCode,
            edits: applied,
            facts,
            build,
            tool: None,
            duration: started.elapsed(),
        };
        tracing::info!(summary = %report, "task completed");
        Ok(report)
    }

    /// Context, prompts, LLM call and decoding
    async fn generate(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<ParsedResponse, CoderError> {
        let warnings = if self.config.safety_mode {
            self.gate.warnings(&task.target).await
        } else {
            Vec::new()
        };

        let context = if task.has_target() {
            self.file_context
                .read_file_context(&task.target)
                .await
                .map_err(|e| CoderError::FileContext {
                    target: task.target.clone(),
                    message: e.to_string(),
                })?
        } else {
            String::new()
        };
        if context.is_empty() && task.action != Action::Create {
            return Err(CoderError::MissingTarget {
                target: task.target.clone(),
            });
        }

        let learned = self.learning.learned_patterns();
        let prompts = self.prompts.build(&PromptContext {
            task,
            file_context: &context,
            warnings: &warnings,
            learned: &learned,
        });

        let policy = RetryPolicy::new(self.config.max_retries, self.config.retry_base());
        let response =
            complete_with_retry(self.llm.as_ref(), &prompts.system, &prompts.user, policy, cancel)
                .await?;

        let parsed = decode_response(&response, task);
        if parsed.edits.is_empty() {
            return Err(CoderError::NoEdits);
        }
        tracing::debug!(edits = parsed.edits.len(), artifact = %parsed.artifact, "response decoded");
        Ok(parsed)
    }

    async fn hand_off_tool(
        &self,
        id: TaskId,
        task: Task,
        parsed: ParsedResponse,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<TaskReport, CoderError> {
        let Some(edit) = parsed.edits.first() else {
            return Err(CoderError::NoEdits);
        };
        let tool_name = parsed
            .tool_name
            .clone()
            .unwrap_or_else(|| file_stem(&edit.file));

        let Some(tools) = &self.tools else {
            let err = CoderError::ToolGeneration {
                tool: tool_name,
                message: "no tool generator attached".to_string(),
            };
            self.learning
                .track_rejection(TOOL_GENERATION_KEY, &err.to_string())
                .await;
            return Err(err);
        };

        let request = ToolRequest {
            tool_name: tool_name.clone(),
            purpose: if task.instruction.is_empty() {
                edit.rationale.clone()
            } else {
                task.instruction.clone()
            },
            code: edit.new_content.clone(),
            confidence: self.config.tool_confidence,
            priority: self.config.tool_priority,
            is_diagnostic: parsed.artifact == ArtifactKind::Diagnostic,
        };
        tracing::info!(tool = %tool_name, artifact = %parsed.artifact, "handing off to tool generator");

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoderError::Cancelled),
            outcome = tools.generate_tool(request) => outcome,
        };

        if !outcome.success {
            let message = if outcome.error_message.is_empty() {
                "tool generator reported failure".to_string()
            } else {
                outcome.error_message.clone()
            };
            self.learning
                .track_rejection(TOOL_GENERATION_KEY, &message)
                .await;
            return Err(CoderError::ToolGeneration {
                tool: tool_name,
                message,
            });
        }

        self.learning.track_acceptance(TOOL_GENERATION_KEY).await;
        let report = TaskReport {
            id,
            task,
            artifact: parsed.artifact,
            edits: Vec::new(),
            facts: Vec::new(),
            build: BuildOutcome::skipped(),
            tool: Some(outcome),
            duration: started.elapsed(),
        };
        tracing::info!(summary = %report, "tool generated");
        Ok(report)
    }

    /// Transactional apply of one edit batch
    ///
    /// On any failure the transaction is rolled back, `modified` facts this
    /// batch introduced are retracted in reverse order and the history is
    /// truncated to where the batch started. Facts present before the batch
    /// are left alone.
    async fn apply_edits(
        &self,
        edits: &[Edit],
        cancel: &CancellationToken,
    ) -> Result<Vec<Edit>, CoderError> {
        let mut tx = FileTransaction::new();
        let mut validator = SyntaxValidator::new();
        let mut applied: Vec<Edit> = Vec::with_capacity(edits.len());
        let history_base = self.inner.read().history.len();
        let preexisting = self.query_best_effort(predicates::MODIFIED).await;
        let mut introduced: Vec<Fact> = Vec::new();

        let mut outcome = Ok(());
        for edit in edits {
            if let Err(err) = self
                .apply_one(edit, &mut tx, &mut validator, cancel)
                .await
            {
                outcome = Err(err);
                break;
            }
            let fact = modified_fact(&edit.file);
            let is_new = preexisting
                .as_ref()
                .is_some_and(|before| !before.contains(&fact))
                && !introduced.contains(&fact);
            if is_new {
                introduced.push(fact.clone());
            }
            self.assert_best_effort(fact).await;
            applied.push(edit.clone());
        }
        validator.release();

        match outcome {
            Ok(()) => {
                if let Err(e) = tx.commit() {
                    tracing::warn!(error = %e, "commit left backup files behind");
                }
                tracing::info!(edits = applied.len(), "edit batch committed");
                Ok(applied)
            }
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "edit batch failed; rolling back");
                if let Err(e) = tx.rollback().await {
                    tracing::error!(error = %e, "rollback incomplete");
                }
                for fact in introduced.iter().rev() {
                    self.retract_best_effort(fact).await;
                }
                self.inner.write().history.truncate(history_base);
                Err(err)
            }
        }
    }

    async fn apply_one(
        &self,
        edit: &Edit,
        tx: &mut FileTransaction,
        validator: &mut SyntaxValidator,
        cancel: &CancellationToken,
    ) -> Result<(), CoderError> {
        if cancel.is_cancelled() {
            return Err(CoderError::Cancelled);
        }

        let abs = resolve_path(&self.workdir, &edit.file).map_err(|e| match e {
            PathError::EscapesWorkspace(_) => CoderError::PathEscapesWorkspace {
                path: edit.file.clone(),
            },
            PathError::Empty => CoderError::ApplyFailed {
                path: edit.file.clone(),
                message: e.to_string(),
            },
        })?;

        if self.config.safety_mode && self.config.impact_check {
            if let SafetyVerdict::Blocked(reason) = self.gate.check(&edit.file).await {
                tracing::warn!(path = %edit.file, %reason, "edit blocked by policy");
                return Err(CoderError::PolicyBlocked {
                    target: edit.file.clone(),
                    reason,
                });
            }
        }

        tx.stage(&abs).await?;

        if edit.action.checks_old_content() {
            self.check_guards(edit, &abs).await?;
        }

        if edit.action != Action::Delete {
            validator.validate(&edit.file, edit.language, &edit.new_content)?;
        }

        self.inner.write().history.push(edit.clone());

        self.dispatch(edit, &abs, cancel).await?;
        tracing::debug!(file = %edit.file, action = %edit.action, "edit applied");
        Ok(())
    }

    /// Old-content check and large-rewrite guard
    async fn check_guards(&self, edit: &Edit, abs: &Path) -> Result<(), CoderError> {
        let current = workspace::read_optional(abs)
            .await
            .map_err(|e| CoderError::ApplyFailed {
                path: edit.file.clone(),
                message: e.to_string(),
            })?;

        if let Some(old) = &edit.old_content {
            if current.as_deref() != Some(old.as_bytes()) {
                return Err(CoderError::OldContentMismatch {
                    path: edit.file.clone(),
                });
            }
        }

        if !edit.action.guards_rewrite() {
            return Ok(());
        }
        let baseline = match (&edit.old_content, &current) {
            (Some(old), _) => old.clone(),
            (None, Some(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            (None, None) => return Ok(()),
        };

        let change = line_change_ratio(&baseline, &edit.new_content);
        if change.exceeds(
            self.config.large_rewrite_min_lines,
            self.config.large_rewrite_max_ratio,
        ) {
            return Err(CoderError::LargeRewriteRefused {
                path: edit.file.clone(),
                percent: change.percent(),
            });
        }
        Ok(())
    }

    /// The single seam where edits reach the workspace
    async fn dispatch(
        &self,
        edit: &Edit,
        abs: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), CoderError> {
        let is_delete = edit.action == Action::Delete;

        let Some(router) = &self.router else {
            let result = if is_delete {
                workspace::remove_file(abs).await
            } else {
                workspace::write_file(abs, edit.new_content.as_bytes()).await
            };
            return result.map_err(|e| CoderError::ApplyFailed {
                path: edit.file.clone(),
                message: e.to_string(),
            });
        };

        let id = new_action_id();
        let action = if is_delete {
            delete_action(abs, &id)
        } else {
            write_action(abs, &edit.new_content, &id)
        };

        match &self.kernel {
            Some(kernel) if self.config.kernel_dispatch => routing::dispatch_via_kernel(
                kernel.as_ref(),
                &action,
                &id,
                self.config.poll_interval(),
                self.config.routing_timeout(),
                cancel,
            )
            .await
            .map(|_| ())
            .map_err(|e| match e {
                RoutingError::Cancelled => CoderError::Cancelled,
                RoutingError::Failure(message) => CoderError::RoutingFailure {
                    path: edit.file.clone(),
                    message,
                },
                RoutingError::TimedOut(limit) => CoderError::RoutingFailure {
                    path: edit.file.clone(),
                    message: format!("no routing result within {limit:?}"),
                },
                RoutingError::Kernel(message) => CoderError::ApplyFailed {
                    path: edit.file.clone(),
                    message,
                },
            }),
            _ => {
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(CoderError::Cancelled),
                    result = router.route_action(&action) => result,
                };
                result.map(|_| ()).map_err(|e| CoderError::ApplyFailed {
                    path: edit.file.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Record a rejection for `task` and hand the error back
    async fn reject(&self, task: &Task, err: CoderError) -> CoderError {
        self.learning
            .track_rejection(task.action.tag(), &err.to_string())
            .await;
        err
    }

    async fn ensure_policy(&self) {
        let (Some(kernel), Some(path)) = (&self.kernel, &self.config.policy_path) else {
            return;
        };
        let loaded = self.inner.read().policy_loaded;
        if loaded {
            return;
        }

        let path = if path.is_absolute() {
            path.clone()
        } else {
            self.workdir.join(path)
        };
        match kernel.load_policy_file(&path).await {
            Ok(()) => self.inner.write().policy_loaded = true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "policy load failed; continuing without it");
            }
        }
    }

    async fn assert_best_effort(&self, fact: Fact) {
        let Some(kernel) = &self.kernel else {
            return;
        };
        let predicate = fact.predicate.clone();
        if let Err(e) = kernel.assert_fact(fact).await {
            tracing::warn!(%predicate, error = %e, "kernel assert failed");
        }
    }

    /// `None` without a kernel or when the query fails
    async fn query_best_effort(&self, predicate: &str) -> Option<Vec<Fact>> {
        let kernel = self.kernel.as_ref()?;
        match kernel.query(predicate).await {
            Ok(facts) => Some(facts),
            Err(e) => {
                tracing::warn!(%predicate, error = %e, "kernel query failed");
                None
            }
        }
    }

    async fn retract_best_effort(&self, fact: &Fact) {
        let Some(kernel) = &self.kernel else {
            return;
        };
        if let Err(e) = kernel.retract_fact(fact).await {
            tracing::warn!(predicate = %fact.predicate, error = %e, "kernel retract failed");
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.read().state
    }

    /// Edits committed by the current or last task
    #[must_use]
    pub fn edit_history(&self) -> Vec<Edit> {
        self.inner.read().history.clone()
    }

    /// Diagnostics from the last build check
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.read().diagnostics.clone()
    }

    /// Time since the current or last task started
    #[must_use]
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        self.inner.read().started_at.map(|t| t.elapsed())
    }

    /// Rejection count for an `action:reason` key
    #[must_use]
    pub fn rejection_count(&self, key: &str) -> u32 {
        self.learning.rejection_count(key)
    }

    /// Acceptance count for an action tag
    #[must_use]
    pub fn acceptance_count(&self, action: &str) -> u32 {
        self.learning.acceptance_count(action)
    }

    /// Patterns at or above their thresholds
    #[must_use]
    pub fn learned_patterns(&self) -> LearnedPatterns {
        self.learning.learned_patterns()
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &CoderConfig {
        &self.config
    }

    /// Workspace root
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}
