//! Error types for Coder Core
//!
//! Provides error handling for:
//! - Safety gate denials
//! - LLM generation failures (terminal, exhausted, cancelled)
//! - Optimistic-concurrency and rewrite guards
//! - Syntax gating and transactional apply
//! - Collaborator failures (router, learning store, config)

use coder_constitutional::{SyntaxError, TransactionError};

/// Main error surfaced by [`crate::Coder::execute`]
#[derive(Debug, thiserror::Error)]
pub enum CoderError {
    /// Safety gate denied the edit
    #[error("edit to {target} blocked: {reason}")]
    PolicyBlocked { target: String, reason: String },

    /// Retry harness exhausted or hit a terminal LLM error
    #[error("generation failed: {0}")]
    GenerationFailed(GenerationError),

    /// Target does not exist and the task is not a create
    #[error("no file context for {target:?}; only create tasks may target a missing file")]
    MissingTarget { target: String },

    /// File-context collaborator failed
    #[error("reading context for {target}: {message}")]
    FileContext { target: String, message: String },

    /// Decoder found nothing to apply
    #[error("LLM response contained no edits")]
    NoEdits,

    /// On-disk bytes differ from the edit's old content
    #[error("old_content mismatch for {path}; refusing to apply edit")]
    OldContentMismatch { path: String },

    /// Line-change guard triggered
    #[error("{path}: edit changes {percent}% of lines; refusing large rewrite without refactor intent")]
    LargeRewriteRefused { path: String, percent: u32 },

    /// Proposed content failed the syntax gate
    #[error(transparent)]
    SyntaxInvalid(#[from] SyntaxError),

    /// Router or filesystem write failed mid-batch
    #[error("apply failed for {path}: {message}")]
    ApplyFailed { path: String, message: String },

    /// Router answered `failure` through `routing_result`
    #[error("routing failure for {path}: {message}")]
    RoutingFailure { path: String, message: String },

    /// Edit path resolves outside the working directory
    #[error("{path} resolves outside the workspace")]
    PathEscapesWorkspace { path: String },

    /// Staging or rollback bookkeeping failed
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Tool-generation collaborator failed or is missing
    #[error("tool generation failed for {tool}: {message}")]
    ToolGeneration { tool: String, message: String },

    /// External cancellation fired
    #[error("operation cancelled")]
    Cancelled,

    /// Another execute call is running on this instance
    #[error("coder is already running a task")]
    Busy,
}

impl CoderError {
    /// Whether this kind is recovered by transaction rollback
    #[inline]
    #[must_use]
    pub fn is_rollback_kind(&self) -> bool {
        matches!(
            self,
            Self::OldContentMismatch { .. }
                | Self::LargeRewriteRefused { .. }
                | Self::SyntaxInvalid(_)
                | Self::ApplyFailed { .. }
                | Self::RoutingFailure { .. }
                | Self::PathEscapesWorkspace { .. }
                | Self::Transaction(_)
                | Self::Cancelled
        )
    }

    /// Short kind name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PolicyBlocked { .. } => "policy_blocked",
            Self::GenerationFailed(_) => "generation_failed",
            Self::MissingTarget { .. } => "missing_target",
            Self::FileContext { .. } => "file_context",
            Self::NoEdits => "no_edits",
            Self::OldContentMismatch { .. } => "old_content_mismatch",
            Self::LargeRewriteRefused { .. } => "large_rewrite_refused",
            Self::SyntaxInvalid(_) => "syntax_invalid",
            Self::ApplyFailed { .. } => "apply_failed",
            Self::RoutingFailure { .. } => "routing_failure",
            Self::PathEscapesWorkspace { .. } => "path_escapes_workspace",
            Self::Transaction(_) => "transaction",
            Self::ToolGeneration { .. } => "tool_generation",
            Self::Cancelled => "cancelled",
            Self::Busy => "busy",
        }
    }
}

impl From<GenerationError> for CoderError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Cancelled => Self::Cancelled,
            other => Self::GenerationFailed(other),
        }
    }
}

/// Outcome of the LLM retry harness when no response is produced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Non-retryable provider error
    #[error("terminal LLM error: {message}")]
    Terminal { message: String },

    /// Every attempt failed with a retryable error
    #[error("LLM retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// Cancelled before or between attempts
    #[error("generation cancelled")]
    Cancelled,
}

/// Error returned by an [`crate::LlmClient`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct LlmError(pub String);

impl LlmError {
    /// Error with message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error returned by an [`crate::ActionRouter`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RouterError {
    /// Failure description
    pub message: String,
    /// Combined output captured before the failure (build logs)
    pub output: String,
}

impl RouterError {
    /// Error with message and no output
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: String::new(),
        }
    }

    /// Attach captured output
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Error returned by a [`crate::FileContextProvider`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ContextError(pub String);

/// Errors from a [`crate::LearningStore`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the store file failed
    #[error("learning store io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store file is not valid JSON
    #[error("learning store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Backend refused the call
    #[error("learning store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("reading config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_messages_are_stable() {
        let err = CoderError::OldContentMismatch {
            path: "x.txt".into(),
        };
        assert_eq!(
            err.to_string(),
            "old_content mismatch for x.txt; refusing to apply edit"
        );

        let err = CoderError::LargeRewriteRefused {
            path: "big.go".into(),
            percent: 70,
        };
        assert_eq!(
            err.to_string(),
            "big.go: edit changes 70% of lines; refusing large rewrite without refactor intent"
        );
    }

    #[test]
    fn rollback_kinds() {
        assert!(CoderError::Cancelled.is_rollback_kind());
        assert!(CoderError::ApplyFailed {
            path: "a".into(),
            message: "b".into()
        }
        .is_rollback_kind());
        assert!(!CoderError::NoEdits.is_rollback_kind());
        assert!(!CoderError::PolicyBlocked {
            target: "a".into(),
            reason: "b".into()
        }
        .is_rollback_kind());
    }

    #[test]
    fn cancelled_generation_maps_to_cancelled() {
        let err: CoderError = GenerationError::Cancelled.into();
        assert!(matches!(err, CoderError::Cancelled));

        let err: CoderError = GenerationError::Terminal {
            message: "401".into(),
        }
        .into();
        assert_eq!(err.kind(), "generation_failed");
    }
}
