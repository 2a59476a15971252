//! Post-apply build check
//!
//! Detects the project type from marker files, asks the action router to
//! run the build, and extracts Go-style `file:line:col: message`
//! diagnostics from failing output.

use crate::collaborators::ActionRouter;
use crate::routing::build_action;
use crate::types::{BuildOutcome, Diagnostic, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Marker file to build command, checked in order
const BUILD_MARKERS: &[(&str, &str)] = &[
    ("go.mod", "go build ./..."),
    ("package.json", "npm run build"),
    ("Cargo.toml", "cargo build"),
    ("pyproject.toml", "python -m py_compile"),
];

static GO_DIAGNOSTIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+\.go):(\d+):(\d+): (.+)$").expect("valid regex"));

/// Build command for the first marker present in `workdir`
pub async fn detect_build_command(workdir: &Path) -> Option<&'static str> {
    for (marker, command) in BUILD_MARKERS {
        if tokio::fs::try_exists(workdir.join(marker)).await.unwrap_or(false) {
            return Some(*command);
        }
    }
    None
}

/// Parse Go compiler lines; anything else is ignored
#[must_use]
pub fn parse_go_diagnostics(output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| {
            let caps = GO_DIAGNOSTIC.captures(line.trim_end())?;
            Some(Diagnostic {
                severity: Severity::Error,
                file: caps[1].to_string(),
                line: caps[2].parse().ok()?,
                column: caps[3].parse().ok()?,
                message: caps[4].to_string(),
            })
        })
        .collect()
}

/// Run the build through the router
///
/// No router or no recognised project counts as passing. Cancellation
/// reports a failing build with no diagnostics.
pub async fn run_build(
    router: Option<&dyn ActionRouter>,
    workdir: &Path,
    cancel: &CancellationToken,
) -> BuildOutcome {
    let Some(router) = router else {
        return BuildOutcome::skipped();
    };
    let Some(command) = detect_build_command(workdir).await else {
        tracing::debug!(workdir = %workdir.display(), "no build marker found");
        return BuildOutcome::skipped();
    };

    let action = build_action(command);
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::warn!(command, "build cancelled");
            return BuildOutcome {
                command: Some(command.to_string()),
                passed: false,
                diagnostics: Vec::new(),
                output: "build cancelled".to_string(),
            };
        }
        result = router.route_action(&action) => result,
    };

    match result {
        Ok(output) => {
            tracing::info!(command, "build passed");
            BuildOutcome {
                command: Some(command.to_string()),
                passed: true,
                diagnostics: Vec::new(),
                output,
            }
        }
        Err(e) => {
            let output = if e.output.is_empty() { e.message.clone() } else { e.output.clone() };
            let diagnostics = parse_go_diagnostics(&output);
            tracing::warn!(command, diagnostics = diagnostics.len(), error = %e, "build failed");
            BuildOutcome {
                command: Some(command.to_string()),
                passed: false,
                diagnostics,
                output,
            }
        }
    }
}
