//! Coder Artifact Primitives
//!
//! Leaf utilities shared by every stage of the edit pipeline.
//!
//! # Core Concepts
//!
//! - [`Language`]: Language tag detected from a file extension
//! - [`ContentHash`]: 32-byte SHA-256 hash with a short 8-byte hex form
//! - [`resolve_path`] / [`relative_path`]: Workspace path resolution
//! - [`is_test_file`]: Test-file heuristics used by `file_topology` facts
//! - [`line_change_ratio`]: Rewrite detector for the large-edit guard
//!
//! # Example
//!
//! ```rust
//! use coder_artifact::{ContentHash, Language};
//!
//! let language = Language::detect("src/hello.go");
//! assert_eq!(language.tag(), "go");
//!
//! let hash = ContentHash::compute(b"package main\n");
//! assert_eq!(hash.short().len(), 16);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod hash;
mod language;
mod lines;
mod path;

pub use hash::{ContentHash, HashError};
pub use language::Language;
pub use lines::{line_change_ratio, LineChange};
pub use path::{file_stem, is_test_file, normalize, relative_path, resolve_path, PathError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn language_and_hash_for_same_file() {
        let workdir = Path::new("/work");
        let abs = resolve_path(workdir, "pkg/server_test.go").unwrap();

        assert_eq!(Language::detect(&abs), Language::Go);
        assert!(is_test_file(&abs));
        assert_eq!(relative_path(workdir, &abs), "pkg/server_test.go");

        let short = ContentHash::compute(b"package pkg\n").short();
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
