//! Error types for the Constitutional Layer
//!
//! Provides error handling for:
//! - Transaction operations (stage, commit, rollback)
//! - Syntax gating of proposed content
//! - Direct workspace writes

use crate::parsers::SyntaxIssue;
use coder_artifact::Language;
use std::path::PathBuf;

/// Errors from [`crate::FileTransaction`]
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Transaction was already committed or rolled back
    #[error("transaction already finished")]
    Finished,

    /// Could not stat or back up a file
    #[error("io error staging {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some backups could not be deleted on commit
    #[error("backup cleanup failed: {}", .0.join("; "))]
    Cleanup(Vec<String>),

    /// Some originals could not be restored on rollback
    #[error("rollback incomplete: {}", .0.join("; "))]
    RollbackIncomplete(Vec<String>),
}

impl TransactionError {
    /// Create staging error for path
    pub fn stage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Stage {
            path: path.into(),
            source,
        }
    }
}

/// Errors from [`crate::SyntaxValidator`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyntaxError {
    /// Proposed content does not parse
    #[error("{language} syntax check failed for {path}: {detail}")]
    Invalid {
        language: Language,
        path: String,
        detail: String,
        issues: Vec<SyntaxIssue>,
    },

    /// Grammar could not be loaded
    #[error("parser initialization failed for {language}: {message}")]
    ParserInit { language: Language, message: String },
}

impl SyntaxError {
    /// Create invalid-content error from collected issues
    pub fn invalid(language: Language, path: impl Into<String>, issues: Vec<SyntaxIssue>) -> Self {
        let detail = issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self::Invalid {
            language,
            path: path.into(),
            detail,
            issues,
        }
    }
}

/// Errors from direct workspace writes
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// IO error during write, delete or read
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Combined constitutional layer error
#[derive(Debug, thiserror::Error)]
pub enum ConstitutionalError {
    /// File transaction failure
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Syntax gate rejection
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// Workspace IO failure
    #[error("write error: {0}")]
    Write(#[from] WriteError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_display_names_language_and_path() {
        let err = SyntaxError::invalid(
            Language::Go,
            "src/bad.go",
            vec![SyntaxIssue::new(2, 6, "missing identifier")],
        );
        assert_eq!(
            err.to_string(),
            "go syntax check failed for src/bad.go: 2:6: missing identifier"
        );
    }

    #[test]
    fn transaction_error_display() {
        let err = TransactionError::RollbackIncomplete(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "rollback incomplete: a; b");
    }

    #[test]
    fn error_conversions() {
        let constitutional: ConstitutionalError = TransactionError::Finished.into();
        assert!(matches!(constitutional, ConstitutionalError::Transaction(_)));
    }
}
