//! Safety gate
//!
//! Consults the kernel before any LLM call. First hit wins:
//! 1. `coder_block_write(File, Reason)` with File equal to the target
//! 2. `edit_unsafe(Ref, Reason)` with Ref containing the target
//! 3. `breaking_change_risk(Ref, /critical, Reason)` with Ref containing the target
//!
//! Kernel errors fail open: the predicate is skipped and a warning logged.

use coder_kernel::{predicates, Fact, Kernel};
use std::sync::Arc;

/// Gate decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    /// Edit may proceed
    Allowed,
    /// Edit refused with reason
    Blocked(String),
}

impl SafetyVerdict {
    /// True when blocked
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    /// Block reason, if any
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Blocked(reason) => Some(reason),
        }
    }
}

/// Per-file block lookup and warning composition
#[derive(Clone, Default)]
pub struct SafetyGate {
    kernel: Option<Arc<dyn Kernel>>,
}

impl std::fmt::Debug for SafetyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGate")
            .field("has_kernel", &self.kernel.is_some())
            .finish()
    }
}

impl SafetyGate {
    /// Gate over an optional kernel; no kernel allows everything
    #[must_use]
    pub fn new(kernel: Option<Arc<dyn Kernel>>) -> Self {
        Self { kernel }
    }

    /// Decide whether `target` may be edited
    pub async fn check(&self, target: &str) -> SafetyVerdict {
        let Some(kernel) = &self.kernel else {
            return SafetyVerdict::Allowed;
        };
        if target.is_empty() {
            return SafetyVerdict::Allowed;
        }

        for fact in query_or_warn(kernel.as_ref(), predicates::CODER_BLOCK_WRITE).await {
            if fact.arg(0).and_then(|a| a.as_str()) == Some(target) {
                return SafetyVerdict::Blocked(fact.arg_text(1));
            }
        }

        for fact in query_or_warn(kernel.as_ref(), predicates::EDIT_UNSAFE).await {
            if fact.arg_text(0).contains(target) {
                return SafetyVerdict::Blocked(format!("Code DOM safety: {}", fact.arg_text(1)));
            }
        }

        for fact in query_or_warn(kernel.as_ref(), predicates::BREAKING_CHANGE_RISK).await {
            let critical = fact.arg(1).is_some_and(|level| level.matches_symbol("critical"));
            if critical && fact.arg_text(0).contains(target) {
                return SafetyVerdict::Blocked(format!(
                    "Critical breaking change: {}",
                    fact.arg_text(2)
                ));
            }
        }

        SafetyVerdict::Allowed
    }

    /// Non-blocking warnings threaded into the prompt
    pub async fn warnings(&self, target: &str) -> Vec<String> {
        let Some(kernel) = &self.kernel else {
            return Vec::new();
        };
        if target.is_empty() {
            return Vec::new();
        }
        let kernel = kernel.as_ref();
        let mut warnings = Vec::new();

        for fact in query_or_warn(kernel, predicates::GENERATED_CODE).await {
            if fact.arg_text(0).contains(target) {
                warnings.push(format!(
                    "{} is generated by {}; edit the generator instead",
                    fact.arg_text(0),
                    fact.arg_text(1)
                ));
            }
        }
        for fact in query_or_warn(kernel, predicates::API_CLIENT_FUNCTION).await {
            if fact.arg_text(0).contains(target) {
                warnings.push(format!(
                    "{} is an API client; keep its request contract",
                    fact.arg_text(0)
                ));
            }
        }
        for fact in query_or_warn(kernel, predicates::API_HANDLER_FUNCTION).await {
            if fact.arg_text(0).contains(target) {
                warnings.push(format!(
                    "{} is an API handler; keep its response shape",
                    fact.arg_text(0)
                ));
            }
        }
        for fact in query_or_warn(kernel, predicates::CGO_CODE).await {
            if fact.arg_text(0).contains(target) {
                warnings.push(format!("{} uses cgo; keep C declarations intact", fact.arg_text(0)));
            }
        }
        for fact in query_or_warn(kernel, predicates::BREAKING_CHANGE_RISK).await {
            let critical = fact.arg(1).is_some_and(|level| level.matches_symbol("critical"));
            if !critical && fact.arg_text(0).contains(target) {
                let level = fact
                    .arg(1)
                    .and_then(|l| l.atom_name().or_else(|| l.as_str()))
                    .unwrap_or("unknown")
                    .trim_start_matches('/')
                    .to_string();
                warnings.push(format!(
                    "Breaking change risk ({level}): {}",
                    fact.arg_text(2)
                ));
            }
        }

        warnings
    }
}

async fn query_or_warn(kernel: &dyn Kernel, predicate: &str) -> Vec<Fact> {
    match kernel.query(predicate).await {
        Ok(facts) => facts,
        Err(e) => {
            tracing::warn!(predicate, error = %e, "kernel query failed; continuing without it");
            Vec::new()
        }
    }
}
