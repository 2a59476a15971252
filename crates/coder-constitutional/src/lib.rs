//! Coder Constitutional Layer
//!
//! The trusted boundary between proposed edits and the workspace.
//!
//! # Core Operations
//!
//! - **Gate**: parse proposed content with a tree-sitter grammar before it
//!   touches disk ([`SyntaxValidator`])
//! - **Stage**: back up or record every path an edit batch touches
//!   ([`FileTransaction::stage`])
//! - **Settle**: keep the batch or restore the workspace byte-for-byte
//!   ([`FileTransaction::commit`] / [`FileTransaction::rollback`])
//!
//! # Architecture
//!
//! ```text
//! proposed content → SyntaxValidator → FileTransaction::stage → write → commit
//!                          ↓ error                                 ↓ error
//!                          └──────────────→ rollback ←─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use coder_constitutional::{workspace, FileTransaction, SyntaxValidator};
//! use coder_artifact::Language;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let path = Path::new("/tmp/ws/main.go");
//! let content = "package main\n";
//!
//! SyntaxValidator::new().validate("main.go", Language::Go, content)?;
//!
//! let mut tx = FileTransaction::new();
//! tx.stage(path).await?;
//! workspace::write_file(path, content.as_bytes()).await?;
//! tx.commit()?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod parsers;
pub mod transaction;
pub mod workspace;

pub use error::{ConstitutionalError, SyntaxError, TransactionError, WriteError};
pub use parsers::{grammar_for, Grammar, SyntaxIssue, SyntaxValidator};
pub use transaction::FileTransaction;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the Constitutional Layer
    pub use crate::error::{ConstitutionalError, SyntaxError, TransactionError, WriteError};
    pub use crate::parsers::{SyntaxIssue, SyntaxValidator};
    pub use crate::transaction::FileTransaction;
    pub use coder_artifact::Language;
}
