//! Action construction and kernel-mediated dispatch
//!
//! Privileged actions are `next_action` facts. When dispatching through the
//! kernel the action is asserted, then `routing_result(Id, Status, Payload?)`
//! is polled until a tuple for the action id reports `success` or `failure`.

use coder_kernel::{predicates, Fact, FactArg, Kernel};
use std::path::Path;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Verb for writing a file
pub const WRITE_FILE: &str = "write_file";
/// Verb for deleting a file
pub const DELETE_FILE: &str = "delete_file";
/// Verb for running the project build
pub const BUILD_PROJECT: &str = "build_project";

/// Fresh action id
#[must_use]
pub fn new_action_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `next_action(/write_file, Path, {content, action_id})`
#[must_use]
pub fn write_action(path: &Path, content: &str, action_id: &str) -> Fact {
    Fact::new(
        predicates::NEXT_ACTION,
        [
            FactArg::atom(WRITE_FILE),
            FactArg::string(path.display().to_string()),
            FactArg::map([
                ("content", FactArg::string(content)),
                ("action_id", FactArg::string(action_id)),
            ]),
        ],
    )
}

/// `next_action(/delete_file, Path, {confirmed: true, action_id})`
#[must_use]
pub fn delete_action(path: &Path, action_id: &str) -> Fact {
    Fact::new(
        predicates::NEXT_ACTION,
        [
            FactArg::atom(DELETE_FILE),
            FactArg::string(path.display().to_string()),
            FactArg::map([
                ("confirmed", FactArg::Bool(true)),
                ("action_id", FactArg::string(action_id)),
            ]),
        ],
    )
}

/// `next_action(/build_project, Command)`
#[must_use]
pub fn build_action(command: &str) -> Fact {
    Fact::new(
        predicates::NEXT_ACTION,
        [FactArg::atom(BUILD_PROJECT), FactArg::string(command)],
    )
}

/// Verb atom of a `next_action` fact
#[must_use]
pub fn action_verb(action: &Fact) -> Option<&str> {
    action.arg(0).and_then(FactArg::atom_name)
}

/// Path argument of a write/delete action
#[must_use]
pub fn action_path(action: &Fact) -> Option<&str> {
    action.arg(1).and_then(FactArg::as_str)
}

/// `content` field of a write action
#[must_use]
pub fn action_content(action: &Fact) -> Option<&str> {
    action.arg(2)?.get("content")?.as_str()
}

/// `action_id` field, if the action carries one
#[must_use]
pub fn action_id(action: &Fact) -> Option<&str> {
    action.arg(2)?.get("action_id")?.as_str()
}

/// Why a kernel-dispatched action did not succeed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// Router answered `failure` with this payload
    #[error("{0}")]
    Failure(String),

    /// No result within the limit
    #[error("no routing result after {0:?}")]
    TimedOut(Duration),

    /// Cancellation fired while waiting
    #[error("dispatch cancelled")]
    Cancelled,

    /// The action could not be asserted
    #[error("kernel rejected action: {0}")]
    Kernel(String),
}

/// `routing_result(Id, /success, Payload?)`
#[must_use]
pub fn routing_success(action_id: &str, payload: Option<&str>) -> Fact {
    let mut args = vec![FactArg::string(action_id), FactArg::atom("success")];
    args.extend(payload.map(FactArg::string));
    Fact::new(predicates::ROUTING_RESULT, args)
}

/// `routing_result(Id, /failure, Reason)`
#[must_use]
pub fn routing_failure(action_id: &str, reason: &str) -> Fact {
    Fact::new(
        predicates::ROUTING_RESULT,
        [
            FactArg::string(action_id),
            FactArg::atom("failure"),
            FactArg::string(reason),
        ],
    )
}

/// Assert `action`, wait for its result, then retract both
///
/// # Errors
/// See [`await_routing_result`]; `RoutingError::Kernel` if the assert fails.
pub async fn dispatch_via_kernel(
    kernel: &dyn Kernel,
    action: &Fact,
    id: &str,
    poll: Duration,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Option<String>, RoutingError> {
    kernel
        .assert_fact(action.clone())
        .await
        .map_err(|e| RoutingError::Kernel(e.to_string()))?;
    tracing::debug!(action_id = id, "next_action asserted");

    let answered = wait_for_result(kernel, id, poll, timeout, cancel).await;

    if let Err(e) = kernel.retract_fact(action).await {
        tracing::warn!(action_id = id, error = %e, "failed to retract next_action");
    }
    let (result, outcome) = answered?;
    if let Err(e) = kernel.retract_fact(&result).await {
        tracing::warn!(action_id = id, error = %e, "failed to retract routing_result");
    }
    outcome
}

/// Poll `routing_result` for `id`
///
/// Waits until cancellation unless `timeout` is set. Query errors are
/// logged and polling continues.
///
/// # Errors
/// - `RoutingError::Failure` with the payload when the status is `failure`
/// - `RoutingError::TimedOut` when `timeout` elapses
/// - `RoutingError::Cancelled` when `cancel` fires
pub async fn await_routing_result(
    kernel: &dyn Kernel,
    id: &str,
    poll: Duration,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Option<String>, RoutingError> {
    wait_for_result(kernel, id, poll, timeout, cancel)
        .await
        .and_then(|(_, outcome)| outcome)
}

/// The answering `routing_result` fact together with its outcome
async fn wait_for_result(
    kernel: &dyn Kernel,
    id: &str,
    poll: Duration,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(Fact, Result<Option<String>, RoutingError>), RoutingError> {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RoutingError::Cancelled),
            _ = ticker.tick() => {}
        }

        match kernel.query(predicates::ROUTING_RESULT).await {
            Ok(results) => {
                if let Some(answer) = results
                    .into_iter()
                    .find_map(|fact| match_result(&fact, id).map(|outcome| (fact, outcome)))
                {
                    return Ok(answer);
                }
            }
            Err(e) => tracing::warn!(action_id = id, error = %e, "routing_result query failed"),
        }

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                return Err(RoutingError::TimedOut(limit));
            }
        }
    }
}

fn match_result(fact: &Fact, id: &str) -> Option<Result<Option<String>, RoutingError>> {
    if !fact.arg(0).is_some_and(|a| a.matches_symbol(id)) {
        return None;
    }
    let status = fact.arg(1)?;
    let payload = fact.arg(2).map(FactArg::text);
    if status.matches_symbol("success") {
        Some(Ok(payload))
    } else if status.matches_symbol("failure") {
        Some(Err(RoutingError::Failure(
            payload.unwrap_or_else(|| "routing failure".to_string()),
        )))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coder_kernel::InMemoryKernel;
    use std::sync::Arc;

    #[test]
    fn action_shapes() {
        let write = write_action(Path::new("/ws/a.go"), "package a\n", "id-1");
        assert_eq!(action_verb(&write), Some(WRITE_FILE));
        assert_eq!(action_path(&write), Some("/ws/a.go"));
        assert_eq!(action_content(&write), Some("package a\n"));
        assert_eq!(action_id(&write), Some("id-1"));

        let delete = delete_action(Path::new("/ws/a.go"), "id-2");
        assert_eq!(action_verb(&delete), Some(DELETE_FILE));
        assert_eq!(
            delete.arg(2).and_then(|m| m.get("confirmed")),
            Some(&FactArg::Bool(true))
        );

        let build = build_action("go build ./...");
        assert_eq!(action_verb(&build), Some(BUILD_PROJECT));
        assert_eq!(action_id(&build), None);
    }

    #[test]
    fn action_ids_are_unique() {
        assert_ne!(new_action_id(), new_action_id());
    }

    #[tokio::test(start_paused = true)]
    async fn success_with_payload() {
        let kernel = Arc::new(InMemoryKernel::new());
        let responder = kernel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            responder.insert(routing_success("other", None));
            responder.insert(routing_success("id-1", Some("wrote 10 bytes")));
        });

        let out = await_routing_result(
            kernel.as_ref(),
            "id-1",
            Duration::from_millis(50),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out.as_deref(), Some("wrote 10 bytes"));
    }

    #[tokio::test(start_paused = true)]
    async fn string_statuses_accepted() {
        let kernel = InMemoryKernel::with_facts([Fact::new(
            predicates::ROUTING_RESULT,
            [FactArg::string("id-1"), FactArg::string("/failure"), FactArg::string("disk full")],
        )]);
        let err = await_routing_result(&kernel, "id-1", Duration::from_millis(50), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, RoutingError::Failure("disk full".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_cancelled() {
        let kernel = InMemoryKernel::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            trigger.cancel();
        });

        let err = await_routing_result(&kernel, "id-1", Duration::from_millis(50), None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, RoutingError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn optional_timeout() {
        let kernel = InMemoryKernel::new();
        let err = await_routing_result(
            &kernel,
            "id-1",
            Duration::from_millis(50),
            Some(Duration::from_millis(200)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, RoutingError::TimedOut(Duration::from_millis(200)));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_retracts_next_action() {
        let kernel = Arc::new(InMemoryKernel::new());
        let action = write_action(Path::new("/ws/a.go"), "x", "id-9");
        kernel.insert(routing_success("id-9", None));

        let out = dispatch_via_kernel(
            kernel.as_ref(),
            &action,
            "id-9",
            Duration::from_millis(50),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out, None);
        assert!(kernel.facts(predicates::NEXT_ACTION).is_empty());
        assert!(kernel.facts(predicates::ROUTING_RESULT).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_consumes_only_its_own_result() {
        let kernel = Arc::new(InMemoryKernel::new());
        let action = write_action(Path::new("/ws/a.go"), "x", "id-3");
        kernel.insert(routing_success("id-other", None));
        kernel.insert(routing_failure("id-3", "disk full"));

        let err = dispatch_via_kernel(
            kernel.as_ref(),
            &action,
            "id-3",
            Duration::from_millis(50),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, RoutingError::Failure("disk full".into()));
        assert_eq!(
            kernel.facts(predicates::ROUTING_RESULT),
            vec![routing_success("id-other", None)]
        );
    }
}
