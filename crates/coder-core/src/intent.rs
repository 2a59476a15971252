//! Task string parsing
//!
//! Turns a free-form task such as
//! `create file:src/hello.go spec:write a hello function` into a [`Task`].
//! Parsing never fails; underspecified tasks are rejected later in the
//! pipeline.

use crate::types::{Action, Task};
use once_cell::sync::Lazy;
use regex::Regex;

const TARGET_KEYS: &[&str] = &["file", "path", "target"];
const INSTRUCTION_KEYS: &[&str] = &[
    "spec",
    "specification",
    "description",
    "instruction",
    "change",
    "do",
];
const ERROR_KEYS: &[&str] = &["error", "issue", "bug"];

static PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s)(spec|instruction|description|error):").expect("valid regex")
});

static NEXT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s[A-Za-z_][A-Za-z0-9_-]*:").expect("valid regex"));

/// Free-text slot that unquoted continuation tokens extend
#[derive(Clone, Copy, PartialEq, Eq)]
enum Open {
    None,
    Instruction,
    Error,
}

/// Parse a task string
#[must_use]
pub fn parse_task(input: &str) -> Task {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Task::default();
    }

    let tokens = tokenize(trimmed);
    let mut rest = tokens.as_slice();
    let mut task = Task::new(Action::Modify, "", "");

    if let Some(action) = rest.first().and_then(|t| Action::from_synonym(t)) {
        task.action = action;
        rest = &rest[1..];
    }

    let mut explicit_target: Option<String> = None;
    let mut in_target: Option<String> = None;
    let mut error_text: Option<String> = None;
    let mut bare: Vec<String> = Vec::new();
    let mut open = Open::None;

    for token in rest {
        if let Some((key, raw)) = split_key_value(token) {
            let value = strip_quotes(raw).to_string();
            let continues = !is_quoted(raw);
            let lower = key.to_ascii_lowercase();
            open = Open::None;

            if TARGET_KEYS.contains(&lower.as_str()) {
                explicit_target = Some(value);
            } else if INSTRUCTION_KEYS.contains(&lower.as_str()) {
                task.instruction = value;
                if continues {
                    open = Open::Instruction;
                }
            } else if ERROR_KEYS.contains(&lower.as_str()) {
                error_text = Some(value);
                if continues {
                    open = Open::Error;
                }
            } else if lower == "in" {
                in_target = Some(value);
            } else {
                task.extras.insert(key.to_string(), value);
            }
            continue;
        }

        match open {
            Open::Instruction => append_word(&mut task.instruction, token),
            Open::Error => append_word(error_text.get_or_insert_with(String::new), token),
            Open::None => bare.push(strip_quotes(token).to_string()),
        }
    }

    if let Some(target) = explicit_target {
        task.target = target;
    } else if let Some(idx) = bare.iter().position(|t| looks_like_path(t)) {
        let token = bare.remove(idx);
        task.target = trim_path_punctuation(&token).to_string();
    } else if let Some(target) = in_target {
        task.target = target;
    }

    if let Some(error) = error_text {
        task.extras.insert("error".to_string(), error);
    }

    if task.instruction.is_empty() {
        task.instruction = scan_prefixed(trimmed).unwrap_or_default();
    }
    if task.instruction.is_empty() {
        task.instruction = bare.join(" ");
    }

    tracing::trace!(action = %task.action, path = %task.target, "parsed task");
    task
}

/// Whitespace split; a quote opening a token or a value spans spaces
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => {
                let opens_value = current.is_empty()
                    || (current.ends_with(':') && current.matches(':').count() == 1);
                if matches!(c, '"' | '\'') && opens_value {
                    quote = Some(c);
                }
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn split_key_value(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once(':')?;
    let valid_key = !key.is_empty()
        && key.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    // scheme-like tokens (http://...) are text, not keys
    if !valid_key || value.starts_with("//") {
        return None;
    }
    Some((key, value))
}

fn is_quoted(value: &str) -> bool {
    value.starts_with('"') || value.starts_with('\'')
}

fn strip_quotes(value: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(q) {
            return inner.strip_suffix(q).unwrap_or(inner);
        }
    }
    value
}

fn append_word(slot: &mut String, word: &str) {
    if !slot.is_empty() {
        slot.push(' ');
    }
    slot.push_str(word);
}

fn trim_path_punctuation(token: &str) -> &str {
    token.trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':'))
}

fn looks_like_path(token: &str) -> bool {
    let t = trim_path_punctuation(token);
    t.contains('/') || t.contains('.')
}

/// Text after the first known prefix, cut at the next `key:`
fn scan_prefixed(input: &str) -> Option<String> {
    let m = PREFIX.find(input)?;
    let after = &input[m.end()..];
    let end = NEXT_KEY.find(after).map_or(after.len(), |k| k.start());
    let text = strip_quotes(after[..end].trim()).trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn create_with_file_and_spec() {
        let task = parse_task("create file:src/hello.go spec:write a hello function");
        assert_eq!(task.action, Action::Create);
        assert_eq!(task.target, "src/hello.go");
        assert_eq!(task.instruction, "write a hello function");
        assert!(task.extras.is_empty());
    }

    #[test]
    fn empty_task_is_unknown() {
        let task = parse_task("   ");
        assert_eq!(task.action, Action::Unknown);
        assert!(!task.has_target());
    }

    #[test]
    fn default_action_and_bare_path() {
        let task = parse_task("src/main.go tidy up imports");
        assert_eq!(task.action, Action::Modify);
        assert_eq!(task.target, "src/main.go");
        assert_eq!(task.instruction, "tidy up imports");
    }

    #[test]
    fn synonyms_map_to_actions() {
        assert_eq!(parse_task("repair x.go").action, Action::Fix);
        assert_eq!(parse_task("restructure x.go").action, Action::Refactor);
        assert_eq!(parse_task("remove x.go").action, Action::Delete);
        assert_eq!(parse_task("write x.go").action, Action::Implement);
        assert_eq!(parse_task("Update x.go").action, Action::Modify);
    }

    #[test]
    fn quoted_values_are_stripped() {
        let task = parse_task(r#"fix path:"pkg/a b.go" instruction:"handle nil" owner:'team x'"#);
        assert_eq!(task.target, "pkg/a b.go");
        assert_eq!(task.instruction, "handle nil");
        assert_eq!(task.extras.get("owner").map(String::as_str), Some("team x"));
    }

    #[test]
    fn error_keys_go_to_extras() {
        let task = parse_task("fix target:server.go bug:nil pointer in handler priority:high");
        assert_eq!(task.extras.get("error").map(String::as_str), Some("nil pointer in handler"));
        assert_eq!(task.extras.get("priority").map(String::as_str), Some("high"));
        assert_eq!(task.target, "server.go");
    }

    #[test]
    fn in_key_sets_target_only_when_unset() {
        let task = parse_task("modify in:lib/util.py do:rename helper");
        assert_eq!(task.target, "lib/util.py");
        assert_eq!(task.instruction, "rename helper");

        let task = parse_task("modify file:a.py in:b.py do:x");
        assert_eq!(task.target, "a.py");
    }

    #[test]
    fn prefix_scan_recovers_spaced_instruction() {
        assert_eq!(
            scan_prefixed("fix a.go spec: handle the timeout owner:me").as_deref(),
            Some("handle the timeout")
        );
        assert_eq!(scan_prefixed("nothing here"), None);
    }

    #[test]
    fn urls_are_not_keys() {
        let task = parse_task("fix docs/api.md spec:link to http://example.com/x");
        assert_eq!(task.instruction, "link to http://example.com/x");
        assert!(task.extras.is_empty());
    }

    #[test]
    fn fallback_instruction_from_bare_tokens() {
        let task = parse_task("add logging to every handler");
        assert_eq!(task.action, Action::Create);
        assert_eq!(task.instruction, "logging to every handler");
        assert!(!task.has_target());
    }

    proptest! {
        #[test]
        fn parsing_is_deterministic(input in ".{0,80}") {
            prop_assert_eq!(parse_task(&input), parse_task(&input));
        }

        #[test]
        fn key_value_tasks_are_stable(
            target in "[a-z]{1,8}/[a-z]{1,8}\\.go",
            words in proptest::collection::vec("[a-z]{1,6}", 1..5),
        ) {
            let instruction = words.join(" ");
            let input = format!("fix file:{target} spec:{instruction}");
            let task = parse_task(&input);
            prop_assert_eq!(task.action, Action::Fix);
            prop_assert_eq!(task.target, target);
            prop_assert_eq!(task.instruction, instruction);
        }
    }
}
