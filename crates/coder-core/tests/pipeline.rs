//! End-to-end tests for the edit pipeline.
//!
//! Guarantees exercised here:
//! - A create task writes the file and emits `modified`, `file_topology`
//!   and `build_state` facts.
//! - Syntax-invalid content never reaches disk and is counted as a rejection.
//! - A stale `old_content` aborts the apply.
//! - Large rewrites need refactor intent.
//! - Tool artifacts go to the tool generator instead of the workspace.

use coder_core::prelude::*;
use coder_core::{ArtifactKind, BuildOutcome, RouterError};
use coder_kernel::{predicates, InMemoryKernel};
use coder_test_utils::{
    envelope, envelope_with_old, go_file_with_lines, init_tracing, tool_envelope,
    RecordingRouter, ScriptedLlm, StubToolGenerator, TempWorkspace,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const HELLO_GO: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n";

async fn plain_coder(ws: &TempWorkspace, llm: Arc<ScriptedLlm>) -> Coder {
    Coder::builder(ws.path(), llm).build().await.unwrap()
}

/// A create task through router and kernel writes the file and records
/// the facts downstream consumers read.
#[tokio::test]
async fn create_go_file_emits_facts() {
    init_tracing();
    let ws = TempWorkspace::new();
    ws.write("go.mod", "module example.com/hello\n");
    let llm = Arc::new(ScriptedLlm::with_replies([envelope("src/hello.go", HELLO_GO)]));
    let kernel = Arc::new(InMemoryKernel::new());
    let router = Arc::new(RecordingRouter::new());

    let coder = Coder::builder(ws.path(), llm.clone())
        .with_kernel(kernel.clone())
        .with_router(router.clone())
        .build()
        .await
        .unwrap();

    let report = coder
        .execute(
            "create file:src/hello.go spec:print a greeting",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ws.read("src/hello.go"), HELLO_GO);
    assert_eq!(router.verbs(), vec!["write_file", "build_project"]);
    assert_eq!(report.build.command.as_deref(), Some("go build ./..."));
    assert!(report.build.passed);

    assert!(kernel.contains(&Fact::new(
        predicates::MODIFIED,
        [FactArg::string("src/hello.go")]
    )));
    let topology = kernel.facts(predicates::FILE_TOPOLOGY);
    assert_eq!(topology.len(), 1);
    assert_eq!(topology[0].arg_text(0), "src/hello.go");
    assert_eq!(topology[0].arg_text(1).len(), 16);
    assert!(topology[0].arg(2).unwrap().is_atom("go"));
    assert_eq!(topology[0].arg(4), Some(&FactArg::Bool(false)));
    assert!(kernel.contains(&Fact::new(
        predicates::BUILD_STATE,
        [FactArg::atom("passing")]
    )));
    assert_eq!(kernel.facts(predicates::CODER_TASK).len(), 1);

    assert_eq!(coder.state(), TaskState::Completed);
    assert_eq!(coder.acceptance_count("create"), 1);
    assert_eq!(llm.calls(), 1);
}

/// Without router or build marker the build is skipped and counts as passing.
#[tokio::test]
async fn create_without_router_writes_directly() {
    let ws = TempWorkspace::new();
    let llm = Arc::new(ScriptedLlm::with_replies([envelope("src/hello.go", HELLO_GO)]));
    let coder = plain_coder(&ws, llm).await;

    let report = coder
        .execute("create file:src/hello.go", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ws.read("src/hello.go"), HELLO_GO);
    assert_eq!(report.build, BuildOutcome::skipped());
    assert_eq!(report.artifact, ArtifactKind::ProjectCode);
    assert_eq!(coder.edit_history().len(), 1);
}

/// Content that does not parse is refused and counted.
#[tokio::test]
async fn syntax_invalid_content_is_rejected() {
    let ws = TempWorkspace::new();
    let llm = Arc::new(ScriptedLlm::with_replies([envelope(
        "src/bad.go",
        "package main\n\nfunc main( {\n",
    )]));
    let kernel = Arc::new(InMemoryKernel::new());
    let coder = Coder::builder(ws.path(), llm)
        .with_kernel(kernel.clone())
        .build()
        .await
        .unwrap();

    let err = coder
        .execute("create file:src/bad.go spec:broken", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoderError::SyntaxInvalid(_)));
    assert!(err
        .to_string()
        .contains("go syntax check failed for src/bad.go"));
    assert!(!ws.exists("src/bad.go"));
    assert!(kernel.facts(predicates::MODIFIED).is_empty());
    assert_eq!(coder.rejection_count(&format!("create:{err}")), 1);
    assert_eq!(coder.state(), TaskState::Failed);
    assert!(coder.edit_history().is_empty());
}

/// A stale `old_content` leaves the file untouched.
#[tokio::test]
async fn old_content_mismatch_aborts() {
    let ws = TempWorkspace::new();
    ws.write("a.go", "package a\n");
    let llm = Arc::new(ScriptedLlm::with_replies([envelope_with_old(
        "a.go",
        "package a\n\nvar X = 1\n",
        "package b\n",
    )]));
    let coder = plain_coder(&ws, llm).await;

    let err = coder
        .execute("modify file:a.go spec:add X", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoderError::OldContentMismatch { ref path } if path == "a.go"));
    assert_eq!(ws.read("a.go"), "package a\n");
}

/// Matching `old_content` applies.
#[tokio::test]
async fn old_content_match_applies() {
    let ws = TempWorkspace::new();
    ws.write("a.go", "package a\n");
    let llm = Arc::new(ScriptedLlm::with_replies([envelope_with_old(
        "a.go",
        "package a\n\nvar X = 1\n",
        "package a\n",
    )]));
    let coder = plain_coder(&ws, llm).await;

    coder
        .execute("modify file:a.go spec:add X", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(ws.read("a.go"), "package a\n\nvar X = 1\n");
}

fn rewrite_140_of_200(old: &str) -> String {
    old.lines()
        .enumerate()
        .map(|(i, line)| {
            if (3..143).contains(&i) {
                format!("\t_ = \"new-{i}\"")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

/// Changing 70% of a 200-line file needs refactor intent.
#[tokio::test]
async fn large_rewrite_needs_refactor_intent() {
    let ws = TempWorkspace::new();
    let original = go_file_with_lines(200, "old");
    let rewritten = rewrite_140_of_200(&original);
    ws.write("main.go", &original);

    let llm = Arc::new(ScriptedLlm::with_replies([
        envelope("main.go", &rewritten),
        envelope("main.go", &rewritten),
    ]));
    let coder = plain_coder(&ws, llm).await;

    let err = coder
        .execute("modify file:main.go spec:rework", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoderError::LargeRewriteRefused { percent: 70, .. }
    ));
    assert_eq!(ws.read("main.go"), original);

    coder
        .execute("refactor file:main.go spec:rework", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(ws.read("main.go"), rewritten);
}

/// A diagnostic artifact is handed to the tool generator; nothing is written.
#[tokio::test]
async fn diagnostic_artifact_goes_to_tool_generator() {
    let ws = TempWorkspace::new();
    let llm = Arc::new(ScriptedLlm::with_replies([tool_envelope(
        "tools/analyze.go",
        "package main\n\nfunc main() {}\n",
        "diagnostic",
    )]));
    let tools = Arc::new(StubToolGenerator::succeeding());
    let coder = Coder::builder(ws.path(), llm)
        .with_tool_generator(tools.clone())
        .build()
        .await
        .unwrap();

    let report = coder
        .execute(
            "create file:tools/analyze.go spec:summarise panics in logs",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let requests = tools.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tool_name, "analyze");
    assert!(requests[0].is_diagnostic);
    assert!(requests[0].purpose.contains("summarise panics"));

    assert_eq!(report.artifact, ArtifactKind::Diagnostic);
    assert!(report.edits.is_empty());
    assert_eq!(report.tool.as_ref().unwrap().binary_path, "/tools/analyze");
    assert!(!ws.exists("tools/analyze.go"));
    assert_eq!(coder.acceptance_count("self_tool_generation"), 1);
}

/// A failing tool generator is a rejection under the tool key.
#[tokio::test]
async fn tool_generation_failure_is_rejection() {
    let ws = TempWorkspace::new();
    let llm = Arc::new(ScriptedLlm::with_replies([tool_envelope(
        "lint.go",
        "package main\n",
        "self_tool",
    )]));
    let coder = Coder::builder(ws.path(), llm)
        .with_tool_generator(Arc::new(StubToolGenerator::failing("compile error")))
        .build()
        .await
        .unwrap();

    let err = coder
        .execute("create file:lint.go", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoderError::ToolGeneration { ref tool, .. } if tool == "lint"));
    assert_eq!(
        coder.rejection_count("self_tool_generation:compile error"),
        1
    );
}

/// A failing build yields diagnostics and a failing build_state.
#[tokio::test]
async fn failing_build_reports_diagnostics() {
    let ws = TempWorkspace::new();
    ws.write("go.mod", "module example.com/hello\n");
    let llm = Arc::new(ScriptedLlm::with_replies([envelope("src/hello.go", HELLO_GO)]));
    let kernel = Arc::new(InMemoryKernel::new());
    let router = Arc::new(RecordingRouter::new());
    router.push_build(Err(RouterError::new("exit status 1")
        .with_output("src/hello.go:6:2: undefined: fmt\nnote: unrelated\n")));

    let coder = Coder::builder(ws.path(), llm)
        .with_kernel(kernel.clone())
        .with_router(router)
        .build()
        .await
        .unwrap();

    let report = coder
        .execute("create file:src/hello.go", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.build.passed);
    assert_eq!(report.build.diagnostics.len(), 1);
    assert_eq!(coder.diagnostics().len(), 1);
    assert_eq!(coder.diagnostics()[0].line, 6);
    assert!(kernel.contains(&Fact::new(
        predicates::BUILD_STATE,
        [FactArg::atom("failing")]
    )));
    assert_eq!(kernel.facts(predicates::DIAGNOSTIC).len(), 1);
}

/// Modify against a missing file fails before the LLM is called.
#[tokio::test]
async fn modify_missing_target_skips_llm() {
    let ws = TempWorkspace::new();
    let llm = Arc::new(ScriptedLlm::new());
    let coder = plain_coder(&ws, llm.clone()).await;

    let err = coder
        .execute("fix file:nope.go error:panic", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoderError::MissingTarget { .. }));
    assert_eq!(llm.calls(), 0);
}

/// A response with nothing to apply is its own error kind.
#[tokio::test]
async fn single_line_prose_has_no_edits() {
    let ws = TempWorkspace::new();
    let llm = Arc::new(ScriptedLlm::with_replies(["I cannot help with that."]));
    let coder = plain_coder(&ws, llm).await;

    let err = coder
        .execute("create file:a.go", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoderError::NoEdits));
}

/// Terminal provider errors stop after one call.
#[tokio::test]
async fn terminal_llm_error_is_not_retried() {
    let ws = TempWorkspace::new();
    let llm = Arc::new(ScriptedLlm::new());
    llm.push_error("401 unauthorized");
    let coder = plain_coder(&ws, llm.clone()).await;

    let err = coder
        .execute("create file:a.go", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoderError::GenerationFailed(_)));
    assert_eq!(llm.calls(), 1);
}
