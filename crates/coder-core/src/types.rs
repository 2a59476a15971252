//! Core types for the edit pipeline

use crate::collaborators::ToolOutcome;
use coder_artifact::Language;
use coder_kernel::Fact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use ulid::Ulid;

/// Unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Verb a task applies to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Write a new file
    Create,
    /// Change an existing file
    Modify,
    /// Restructure without changing behavior
    Refactor,
    /// Repair a defect
    Fix,
    /// Fill in a stub or interface
    Implement,
    /// Remove a file
    Delete,
    /// No recognised verb
    #[default]
    Unknown,
}

impl Action {
    /// Map a task verb or synonym to an action
    #[must_use]
    pub fn from_synonym(word: &str) -> Option<Self> {
        let action = match word.to_ascii_lowercase().as_str() {
            "create" | "new" | "add" => Self::Create,
            "modify" | "edit" | "change" | "update" => Self::Modify,
            "refactor" | "restructure" => Self::Refactor,
            "fix" | "repair" | "patch" => Self::Fix,
            "implement" | "write" => Self::Implement,
            "delete" | "remove" => Self::Delete,
            _ => return None,
        };
        Some(action)
    }

    /// Lowercase tag used in facts and counter keys
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Refactor => "refactor",
            Self::Fix => "fix",
            Self::Implement => "implement",
            Self::Delete => "delete",
            Self::Unknown => "unknown",
        }
    }

    /// Actions whose edits are checked against old content
    #[inline]
    #[must_use]
    pub fn checks_old_content(self) -> bool {
        matches!(self, Self::Modify | Self::Refactor | Self::Fix)
    }

    /// Actions subject to the large-rewrite guard
    #[inline]
    #[must_use]
    pub fn guards_rewrite(self) -> bool {
        matches!(self, Self::Modify | Self::Fix)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parsed task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Task {
    /// Verb
    pub action: Action,
    /// Workspace-relative target, empty when none was given
    pub target: String,
    /// Free-form instruction (`spec:` value or remaining words)
    pub instruction: String,
    /// Other `key:value` tokens
    pub extras: BTreeMap<String, String>,
}

impl Task {
    /// Task without extras
    #[must_use]
    pub fn new(action: Action, target: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            instruction: instruction.into(),
            extras: BTreeMap::new(),
        }
    }

    /// True when a target was given
    #[inline]
    #[must_use]
    pub fn has_target(&self) -> bool {
        !self.target.is_empty()
    }
}

/// One proposed file mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// Workspace-relative path
    pub file: String,
    /// Expected current content, checked before writing
    pub old_content: Option<String>,
    /// Proposed content
    pub new_content: String,
    /// Action this edit performs
    pub action: Action,
    /// Language used for the syntax gate
    pub language: Language,
    /// LLM rationale
    pub rationale: String,
}

impl Edit {
    /// Create edit; language is detected from the path
    #[must_use]
    pub fn new(file: impl Into<String>, new_content: impl Into<String>, action: Action) -> Self {
        let file = file.into();
        Self {
            language: Language::detect(&file),
            file,
            old_content: None,
            new_content: new_content.into(),
            action,
            rationale: String::new(),
        }
    }

    /// Set expected current content
    #[must_use]
    pub fn with_old_content(mut self, old: impl Into<String>) -> Self {
        self.old_content = Some(old.into());
        self
    }

    /// Set rationale
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Override detected language
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

/// Routing tag on decoded LLM output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Ordinary workspace edits
    #[default]
    ProjectCode,
    /// Tool for the agent itself
    SelfTool,
    /// Diagnostic tool for the agent itself
    Diagnostic,
}

impl ArtifactKind {
    /// Parse an envelope `artifact_type` value
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "project_code" => Some(Self::ProjectCode),
            "self_tool" => Some(Self::SelfTool),
            "diagnostic" => Some(Self::Diagnostic),
            _ => None,
        }
    }

    /// Envelope tag
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::ProjectCode => "project_code",
            Self::SelfTool => "self_tool",
            Self::Diagnostic => "diagnostic",
        }
    }

    /// True for artifacts handed to the tool generator
    #[inline]
    #[must_use]
    pub fn is_tool(self) -> bool {
        matches!(self, Self::SelfTool | Self::Diagnostic)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Decoder output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedResponse {
    /// Decoded edits in response order
    pub edits: Vec<Edit>,
    /// Routing tag
    pub artifact: ArtifactKind,
    /// Derived from the file stem for tool artifacts
    pub tool_name: Option<String>,
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Error
    Error,
    /// Warning
    Warning,
    /// Informational
    Info,
}

impl Severity {
    /// Lowercase tag used in facts
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Build diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Reported file
    pub file: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Compiler message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file,
            self.line,
            self.column,
            self.severity.tag(),
            self.message
        )
    }
}

/// Per-instance task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// No task has run
    #[default]
    Idle,
    /// A task is in progress
    Running,
    /// Last task committed
    Completed,
    /// Last task failed and rolled back
    Failed,
}

/// Result of the post-apply build check
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildOutcome {
    /// Detected build command, `None` when no build ran
    pub command: Option<String>,
    /// Build exited successfully or was skipped
    pub passed: bool,
    /// Parsed diagnostics
    pub diagnostics: Vec<Diagnostic>,
    /// Combined build output
    pub output: String,
}

impl BuildOutcome {
    /// No router or no recognised project: counts as passing
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            command: None,
            passed: true,
            diagnostics: Vec::new(),
            output: String::new(),
        }
    }
}

/// Result of a successful execute call
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// ULID of the task
    pub id: TaskId,
    /// Parsed task
    pub task: Task,
    /// Routing tag of the response
    pub artifact: ArtifactKind,
    /// Committed edits in batch order
    pub edits: Vec<Edit>,
    /// Facts emitted after commit
    pub facts: Vec<Fact>,
    /// Post-apply build check
    pub build: BuildOutcome,
    /// Set for tool artifacts
    pub tool: Option<ToolOutcome>,
    /// Wall time of the task
    pub duration: Duration,
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tool) = &self.tool {
            write!(f, "generated {} tool {}", self.artifact, tool.resolved_name)?;
            if !tool.binary_path.is_empty() {
                write!(f, " at {}", tool.binary_path)?;
            }
            return write!(f, " ({}ms)", self.duration.as_millis());
        }

        let files: Vec<&str> = self.edits.iter().map(|e| e.file.as_str()).collect();
        write!(
            f,
            "{} {}: applied {} edit(s) [{}]; build {}",
            self.task.action,
            if self.task.target.is_empty() { "-" } else { &self.task.target },
            self.edits.len(),
            files.join(", "),
            if self.build.passed { "passing" } else { "failing" },
        )?;
        if !self.build.diagnostics.is_empty() {
            write!(f, " ({} diagnostics)", self.build.diagnostics.len())?;
        }
        write!(f, " ({}ms)", self.duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_synonyms() {
        assert_eq!(Action::from_synonym("ADD"), Some(Action::Create));
        assert_eq!(Action::from_synonym("update"), Some(Action::Modify));
        assert_eq!(Action::from_synonym("restructure"), Some(Action::Refactor));
        assert_eq!(Action::from_synonym("patch"), Some(Action::Fix));
        assert_eq!(Action::from_synonym("write"), Some(Action::Implement));
        assert_eq!(Action::from_synonym("remove"), Some(Action::Delete));
        assert_eq!(Action::from_synonym("please"), None);
    }

    #[test]
    fn guard_sets() {
        assert!(Action::Refactor.checks_old_content());
        assert!(!Action::Refactor.guards_rewrite());
        assert!(Action::Fix.guards_rewrite());
        assert!(!Action::Create.checks_old_content());
    }

    #[test]
    fn edit_detects_language() {
        let edit = Edit::new("src/main.go", "package main\n", Action::Create);
        assert_eq!(edit.language, Language::Go);
    }

    #[test]
    fn artifact_tags() {
        assert_eq!(ArtifactKind::from_tag("self_tool"), Some(ArtifactKind::SelfTool));
        assert_eq!(ArtifactKind::from_tag(" Diagnostic "), Some(ArtifactKind::Diagnostic));
        assert_eq!(ArtifactKind::from_tag("binary"), None);
        assert!(ArtifactKind::Diagnostic.is_tool());
        assert!(!ArtifactKind::default().is_tool());
    }

    #[test]
    fn report_summary() {
        let report = TaskReport {
            id: TaskId::new(),
            task: Task::new(Action::Create, "a.go", "x"),
            artifact: ArtifactKind::ProjectCode,
            edits: vec![Edit::new("a.go", "package a\n", Action::Create)],
            facts: Vec::new(),
            build: BuildOutcome::skipped(),
            tool: None,
            duration: Duration::from_millis(12),
        };
        assert_eq!(
            report.to_string(),
            "create a.go: applied 1 edit(s) [a.go]; build passing (12ms)"
        );
    }
}
