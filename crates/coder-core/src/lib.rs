//! Coder Core - edit pipeline for a code-mutating agent
//!
//! Turns a free-form task into validated, transactional file edits:
//! - Parses the task string into an action, target and instruction
//! - Gates targets against kernel policy facts
//! - Calls the LLM with retry and decodes its response into edits
//! - Applies edits atomically with syntax gating and rollback
//! - Runs the build check, emits facts and learns from outcomes
//!
//! # Example
//!
//! ```rust,ignore
//! use coder_core::{Coder, CoderConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(llm: std::sync::Arc<dyn coder_core::LlmClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let coder = Coder::builder("/work/project", llm)
//!     .with_config(CoderConfig::new().with_max_retries(5))
//!     .build()
//!     .await?;
//!
//! let report = coder
//!     .execute("create file:cmd/main.go spec:hello world", &CancellationToken::new())
//!     .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod autopoiesis;
pub mod build;
pub mod coder;
pub mod collaborators;
pub mod config;
pub mod decoder;
pub mod error;
pub mod facts;
pub mod intent;
pub mod prompt;
pub mod retry;
pub mod routing;
pub mod safety;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use autopoiesis::{Autopoiesis, LearnedPatterns, LearnedRecord, LearningStore};
pub use build::{detect_build_command, parse_go_diagnostics, run_build};
pub use coder::{Coder, CoderBuilder};
pub use collaborators::{
    ActionRouter, FileContextProvider, FsFileContext, LlmClient, ToolGenerator, ToolOutcome,
    ToolRequest,
};
pub use config::CoderConfig;
pub use decoder::{decode_response, extract_json_object};
pub use error::{
    CoderError, ConfigError, ContextError, GenerationError, LlmError, RouterError, StoreError,
};
pub use facts::generate_facts;
pub use intent::parse_task;
pub use prompt::{DefaultPromptBuilder, PromptBuilder, PromptContext, Prompts};
pub use retry::{classify_error, complete_with_retry, ErrorClass, RetryPolicy};
pub use routing::RoutingError;
pub use safety::{SafetyGate, SafetyVerdict};
pub use store::JsonFileLearningStore;
pub use types::{
    Action, ArtifactKind, BuildOutcome, Diagnostic, Edit, ParsedResponse, Severity, Task, TaskId,
    TaskReport, TaskState,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the edit pipeline
    pub use crate::{
        ActionRouter, Coder, CoderConfig, CoderError, Edit, FileContextProvider, LlmClient,
        TaskReport, TaskState, ToolGenerator,
    };
    pub use coder_kernel::{Fact, FactArg, Kernel};
    pub use tokio_util::sync::CancellationToken;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
