//! Error types for the kernel contract

use crate::fact::FactParseError;
use std::path::PathBuf;

/// Kernel errors
///
/// The edit pipeline treats every kernel error as non-fatal; these exist so
/// callers can log precisely what was swallowed.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Kernel cannot be reached
    #[error("kernel unavailable: {0}")]
    Unavailable(String),

    /// Policy file could not be read
    #[error("io error reading policy {path}: {source}")]
    PolicyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy file contains an invalid fact literal
    #[error("invalid policy {path} line {line}: {source}")]
    PolicySyntax {
        path: PathBuf,
        line: usize,
        #[source]
        source: FactParseError,
    },

    /// Query could not be evaluated
    #[error("query failed for {predicate}: {message}")]
    QueryFailed { predicate: String, message: String },
}
