//! LLM response decoding
//!
//! Strategies, first non-empty edit list wins:
//! 1. outer JSON object (first `{` to last `}`)
//! 2. reasoning wrapper `{reasoning_trace, result}`; a string `result` is file
//!    content, an object `result` is decoded further
//! 3. multi-edit envelope `{edits: [...], artifact_type}`
//! 4. single envelope `{file, content, old_content, rationale, artifact_type}`
//! 5. last fenced markdown code block
//! 6. raw response, if it spans more than one line

use crate::types::{Action, ArtifactKind, Edit, ParsedResponse, Task};
use coder_artifact::{file_stem, Language};
use pulldown_cmark::{CodeBlockKind, Event, Parser as MdParser, Tag, TagEnd};
use serde::Deserialize;
use serde_json::{Map, Value};

const MARKDOWN_RATIONALE: &str = "Generated from LLM response";
const RAW_RATIONALE: &str = "Raw LLM response";

/// One edit as the LLM spells it
#[derive(Debug, Default, Deserialize)]
struct EditEnvelope {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    old_content: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    artifact_type: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Shape of a `{reasoning_trace, result}` wrapper
enum Wrapped {
    /// `result` was a string: file content for the task target
    Content { content: String, reasoning: String },
    /// `result` was an object: decode it as an envelope
    Envelope(Map<String, Value>),
    /// No wrapper present
    Plain(Map<String, Value>),
}

/// Decode an LLM response into edits for `task`
#[must_use]
pub fn decode_response(response: &str, task: &Task) -> ParsedResponse {
    if let Some(parsed) = extract_json_object(response)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .and_then(|value| decode_json(value, task))
    {
        return parsed;
    }

    if let Some(block) = last_fenced_block(response) {
        if let Some(edit) = target_edit(task, block, MARKDOWN_RATIONALE) {
            tracing::debug!(file = %edit.file, "decoded markdown code block");
            return project_code(vec![edit]);
        }
    }

    if response.contains('\n') {
        if let Some(edit) = target_edit(task, response.to_string(), RAW_RATIONALE) {
            tracing::debug!(file = %edit.file, "using raw response as content");
            return project_code(vec![edit]);
        }
    }

    tracing::debug!("no decoding strategy produced edits");
    ParsedResponse::default()
}

/// Substring from the first `{` to the last `}`
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn decode_json(value: Value, task: &Task) -> Option<ParsedResponse> {
    let Value::Object(object) = value else {
        return None;
    };

    let candidate = match unwrap_reasoning(object) {
        Wrapped::Content { content, reasoning } => {
            let edit = target_edit(task, content, &reasoning)?;
            tracing::debug!(file = %edit.file, "decoded reasoning wrapper with string result");
            return Some(project_code(vec![edit]));
        }
        Wrapped::Envelope(inner) => inner,
        Wrapped::Plain(object) => object,
    };

    decode_multi(&candidate, task).or_else(|| decode_single(candidate, task))
}

fn unwrap_reasoning(mut object: Map<String, Value>) -> Wrapped {
    if !object.contains_key("result") {
        return Wrapped::Plain(object);
    }
    let reasoning = match object.get("reasoning_trace") {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    match object.remove("result") {
        Some(Value::String(content)) => Wrapped::Content { content, reasoning },
        Some(Value::Object(inner)) => Wrapped::Envelope(inner),
        Some(other) => {
            object.insert("result".to_string(), other);
            Wrapped::Plain(object)
        }
        None => Wrapped::Plain(object),
    }
}

fn decode_multi(object: &Map<String, Value>, task: &Task) -> Option<ParsedResponse> {
    let Some(Value::Array(entries)) = object.get("edits") else {
        return None;
    };

    let mut edits = Vec::new();
    for entry in entries {
        let envelope = match EditEnvelope::deserialize(entry) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed edit entry");
                continue;
            }
        };
        if let Some(edit) = envelope_edit(envelope, task, true) {
            edits.push(edit);
        }
    }
    if edits.is_empty() {
        return None;
    }

    let artifact = artifact_kind(object.get("artifact_type").and_then(Value::as_str));
    tracing::debug!(edits = edits.len(), %artifact, "decoded multi-edit envelope");
    Some(finish(edits, artifact))
}

fn decode_single(object: Map<String, Value>, task: &Task) -> Option<ParsedResponse> {
    let envelope = EditEnvelope::deserialize(Value::Object(object)).ok()?;
    let artifact = artifact_kind(envelope.artifact_type.as_deref());
    let edit = envelope_edit(envelope, task, false)?;
    tracing::debug!(file = %edit.file, %artifact, "decoded edit envelope");
    Some(finish(vec![edit], artifact))
}

fn envelope_edit(envelope: EditEnvelope, task: &Task, allow_type: bool) -> Option<Edit> {
    let kind = if allow_type { envelope.kind.as_deref() } else { None };
    let action = kind.and_then(Action::from_synonym).unwrap_or(task.action);

    let content = envelope.content.unwrap_or_default();
    if content.is_empty() && action != Action::Delete {
        return None;
    }

    let file = envelope
        .file
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| task.target.clone());
    if file.is_empty() {
        return None;
    }

    let mut edit = Edit::new(file, content, action).with_rationale(envelope.rationale.unwrap_or_default());
    edit.old_content = envelope.old_content;
    Some(edit)
}

fn target_edit(task: &Task, content: String, rationale: &str) -> Option<Edit> {
    if content.is_empty() || task.target.is_empty() {
        return None;
    }
    Some(
        Edit::new(task.target.clone(), content, task.action)
            .with_language(Language::detect(&task.target))
            .with_rationale(rationale),
    )
}

fn artifact_kind(tag: Option<&str>) -> ArtifactKind {
    match tag {
        None => ArtifactKind::ProjectCode,
        Some(tag) => ArtifactKind::from_tag(tag).unwrap_or_else(|| {
            tracing::debug!(tag, "unknown artifact_type; treating as project code");
            ArtifactKind::ProjectCode
        }),
    }
}

fn project_code(edits: Vec<Edit>) -> ParsedResponse {
    ParsedResponse {
        edits,
        artifact: ArtifactKind::ProjectCode,
        tool_name: None,
    }
}

fn finish(edits: Vec<Edit>, artifact: ArtifactKind) -> ParsedResponse {
    let tool_name = if artifact.is_tool() {
        edits.first().map(|e| file_stem(&e.file)).filter(|s| !s.is_empty())
    } else {
        None
    };
    ParsedResponse {
        edits,
        artifact,
        tool_name,
    }
}

/// Contents of the last fenced code block
fn last_fenced_block(markdown: &str) -> Option<String> {
    let mut last = None;
    let mut current: Option<String> = None;

    for event in MdParser::new(markdown) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) => {
                current = Some(String::new());
            }
            Event::Text(text) => {
                if let Some(code) = current.as_mut() {
                    code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(code) = current.take() {
                    last = Some(code);
                }
            }
            _ => {}
        }
    }
    last
}
