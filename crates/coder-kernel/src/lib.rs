//! Coder Kernel Contract
//!
//! Structured facts and the kernel seam used by the edit pipeline.
//!
//! - [`Fact`] / [`FactArg`]: predicate plus tagged-variant arguments
//! - [`Kernel`]: async assert / retract / query / policy loading
//! - [`InMemoryKernel`]: ground-fact reference implementation
//!
//! # Example
//!
//! ```rust
//! use coder_kernel::{Fact, FactArg};
//!
//! let fact = Fact::new("build_state", [FactArg::atom("passing")]);
//! assert_eq!(fact.to_string(), "build_state(/passing)");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod fact;
pub mod kernel;

pub use error::KernelError;
pub use fact::{Fact, FactArg, FactParseError};
pub use kernel::{InMemoryKernel, Kernel};

/// Predicate names emitted or consumed by the edit pipeline
pub mod predicates {
    /// `coder_task(Id, /Action, Target, Instruction)`
    pub const CODER_TASK: &str = "coder_task";
    /// `modified(File)`
    pub const MODIFIED: &str = "modified";
    /// `file_topology(File, Hash, /Lang, Mtime, IsTest)`
    pub const FILE_TOPOLOGY: &str = "file_topology";
    /// `build_state(/passing | /failing)`
    pub const BUILD_STATE: &str = "build_state";
    /// `diagnostic(/Severity, File, Line, Column, Message)`
    pub const DIAGNOSTIC: &str = "diagnostic";
    /// `promote_to_long_term(/Kind, Key)`
    pub const PROMOTE_TO_LONG_TERM: &str = "promote_to_long_term";
    /// `next_action(/Verb, Target, Payload)`
    pub const NEXT_ACTION: &str = "next_action";
    /// `routing_result(Id, /Status, Payload?)`
    pub const ROUTING_RESULT: &str = "routing_result";
    /// `coder_block_write(File, Reason)`
    pub const CODER_BLOCK_WRITE: &str = "coder_block_write";
    /// `edit_unsafe(Ref, Reason)`
    pub const EDIT_UNSAFE: &str = "edit_unsafe";
    /// `breaking_change_risk(Ref, /Level, Reason)`
    pub const BREAKING_CHANGE_RISK: &str = "breaking_change_risk";
    /// `generated_code(File, Generator)`
    pub const GENERATED_CODE: &str = "generated_code";
    /// `api_client_function(Ref, ...)`
    pub const API_CLIENT_FUNCTION: &str = "api_client_function";
    /// `api_handler_function(Ref, ...)`
    pub const API_HANDLER_FUNCTION: &str = "api_handler_function";
    /// `cgo_code(File)`
    pub const CGO_CODE: &str = "cgo_code";
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
