//! External collaborator contracts
//!
//! The edit pipeline talks to its environment only through these traits.
//! Defaults that need no external service ([`FsFileContext`]) live here too.

use crate::error::{ContextError, LlmError, RouterError};
use coder_artifact::{resolve_path, PathError};
use coder_kernel::Fact;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// LLM provider
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a system/user prompt pair
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Executes privileged `next_action` facts
///
/// Recognised shapes (first argument is the verb atom):
/// - `next_action(/write_file, Path, {content, action_id})`
/// - `next_action(/delete_file, Path, {confirmed: true, action_id})`
/// - `next_action(/build_project, Command)`
#[async_trait::async_trait]
pub trait ActionRouter: Send + Sync {
    /// Run the action and return its combined output
    async fn route_action(&self, action: &Fact) -> Result<String, RouterError>;
}

/// Produces the current contents of a task target
#[async_trait::async_trait]
pub trait FileContextProvider: Send + Sync {
    /// Read context for a workspace-relative path; `""` when it does not exist
    async fn read_file_context(&self, path: &str) -> Result<String, ContextError>;
}

/// Request passed to the tool-generation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Requested tool name
    pub tool_name: String,
    /// What the tool should do
    pub purpose: String,
    /// Generated source
    pub code: String,
    /// Confidence score passed to the generator
    pub confidence: f64,
    /// Scheduling priority
    pub priority: f64,
    /// Set for diagnostic artifacts
    pub is_diagnostic: bool,
}

/// Tool-generation result
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the tool was built and registered
    pub success: bool,
    /// Name the tool was registered under
    pub resolved_name: String,
    /// Path of the built binary
    pub binary_path: String,
    /// Failure detail when `success` is false
    pub error_message: String,
}

/// Compiles and registers self-generated tools
#[async_trait::async_trait]
pub trait ToolGenerator: Send + Sync {
    async fn generate_tool(&self, request: ToolRequest) -> ToolOutcome;
}

/// Reads files under the working directory
#[derive(Debug, Clone)]
pub struct FsFileContext {
    workdir: PathBuf,
}

impl FsFileContext {
    /// Reader rooted at `workdir`
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Workspace root
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[async_trait::async_trait]
impl FileContextProvider for FsFileContext {
    async fn read_file_context(&self, path: &str) -> Result<String, ContextError> {
        let abs = match resolve_path(&self.workdir, path) {
            Ok(abs) => abs,
            Err(PathError::Empty) => return Ok(String::new()),
            Err(e) => return Err(ContextError(e.to_string())),
        };

        match tokio::fs::read(&abs).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(ContextError(format!("{}: {e}", abs.display()))),
        }
    }
}
