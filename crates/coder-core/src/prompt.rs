//! Prompt assembly
//!
//! [`PromptBuilder`] is a seam; [`DefaultPromptBuilder`] renders the task,
//! file context, safety warnings and learned patterns together with the
//! response envelope the decoder understands.

use crate::autopoiesis::LearnedPatterns;
use crate::types::{Action, Task};
use std::fmt::Write as _;

/// Inputs available when building prompts
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Task being served
    pub task: &'a Task,
    /// Current target content, empty when absent
    pub file_context: &'a str,
    /// Non-blocking safety warnings
    pub warnings: &'a [String],
    /// Patterns above threshold
    pub learned: &'a LearnedPatterns,
}

/// System and user prompt pair
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prompts {
    /// System prompt
    pub system: String,
    /// User prompt
    pub user: String,
}

/// Builds prompts for one task
pub trait PromptBuilder: Send + Sync {
    fn build(&self, ctx: &PromptContext<'_>) -> Prompts;
}

const SYSTEM_PROMPT: &str = "You are a careful software engineer editing a user's workspace. \
Reply with a single JSON object and nothing else:\n\
{\"file\": \"<workspace-relative path>\", \"content\": \"<complete new file content>\", \
\"old_content\": \"<current content, optional>\", \"rationale\": \"<one sentence>\", \
\"artifact_type\": \"project_code\"}\n\
To change several files reply with {\"edits\": [{\"file\", \"content\", \"type\", \"rationale\"}, ...]}. \
Use type \"delete\" with empty content to remove a file. \
Use artifact_type \"self_tool\" or \"diagnostic\" only when asked to build a tool for yourself.";

/// Plain-text prompt renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptBuilder;

impl PromptBuilder for DefaultPromptBuilder {
    fn build(&self, ctx: &PromptContext<'_>) -> Prompts {
        let task = ctx.task;
        let mut user = String::new();

        let target = if task.target.is_empty() {
            "(choose a path)"
        } else {
            task.target.as_str()
        };
        let _ = writeln!(user, "Task: {} {}", task.action, target);
        if !task.instruction.is_empty() {
            let _ = writeln!(user, "Instruction: {}", task.instruction);
        }
        for (key, value) in &task.extras {
            let _ = writeln!(user, "{key}: {value}");
        }

        if !ctx.warnings.is_empty() {
            user.push_str("\nWarnings:\n");
            for warning in ctx.warnings {
                let _ = writeln!(user, "- {warning}");
            }
        }

        if !ctx.learned.is_empty() {
            user.push_str("\nLearned from earlier tasks:\n");
            for pattern in ctx.learned.avoid.keys() {
                let _ = writeln!(user, "- avoid: {pattern}");
            }
            for action in ctx.learned.preferred.keys() {
                let _ = writeln!(user, "- accepted approach: {action}");
            }
        }

        if ctx.file_context.is_empty() {
            if task.action == Action::Create {
                user.push_str("\nThe file does not exist yet.\n");
            }
        } else {
            let _ = write!(
                user,
                "\nCurrent content of {target}:\n```\n{}\n```\n",
                ctx.file_context.trim_end_matches('\n')
            );
        }

        Prompts {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}
