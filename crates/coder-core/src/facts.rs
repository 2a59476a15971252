//! Fact generation
//!
//! Wire-stable shapes:
//! - `coder_task(/Action, Target, Instruction)`
//! - `modified(File)`
//! - `file_topology(File, ShortHash, /Language, UnixTime, IsTest)`
//! - `build_state(/passing | /failing)`
//! - `diagnostic(/Severity, File, Line, Column, Message)`
//! - `promote_to_long_term(/style_preference, Pattern)`
//! - `promote_to_long_term(/preferred_pattern, Action)`

use crate::autopoiesis::LearnedPatterns;
use crate::types::{BuildOutcome, Diagnostic, Edit, Task};
use chrono::{DateTime, Utc};
use coder_artifact::{is_test_file, ContentHash};
use coder_kernel::{predicates, Fact, FactArg};

/// `coder_task(Id, /Action, Target, Instruction)` for a parsed task
#[must_use]
pub fn task_fact(task: &Task) -> Fact {
    Fact::new(
        predicates::CODER_TASK,
        [
            FactArg::atom(task.action.tag()),
            FactArg::string(&task.target),
            FactArg::string(&task.instruction),
        ],
    )
}

/// `modified(File)`
#[must_use]
pub fn modified_fact(file: &str) -> Fact {
    Fact::new(predicates::MODIFIED, [FactArg::string(file)])
}

/// Topology fact; the hash is the 8-byte SHA-256 prefix of the new content
#[must_use]
pub fn file_topology_fact(edit: &Edit, at: DateTime<Utc>) -> Fact {
    Fact::new(
        predicates::FILE_TOPOLOGY,
        [
            FactArg::string(&edit.file),
            FactArg::string(ContentHash::compute(edit.new_content.as_bytes()).short()),
            FactArg::atom(edit.language.tag()),
            FactArg::Int(at.timestamp()),
            FactArg::Bool(is_test_file(&edit.file)),
        ],
    )
}

/// `build_state(/passing | /failing)`
#[must_use]
pub fn build_state_fact(passed: bool) -> Fact {
    let state = if passed { "passing" } else { "failing" };
    Fact::new(predicates::BUILD_STATE, [FactArg::atom(state)])
}

/// `diagnostic(/Severity, File, Line, Column, Message)`
#[must_use]
pub fn diagnostic_fact(diagnostic: &Diagnostic) -> Fact {
    Fact::new(
        predicates::DIAGNOSTIC,
        [
            FactArg::atom(diagnostic.severity.tag()),
            FactArg::string(&diagnostic.file),
            FactArg::Int(i64::from(diagnostic.line)),
            FactArg::Int(i64::from(diagnostic.column)),
            FactArg::string(&diagnostic.message),
        ],
    )
}

/// Promotion facts for patterns at or above threshold
#[must_use]
pub fn promotion_facts(learned: &LearnedPatterns) -> Vec<Fact> {
    let avoid = learned.avoid.keys().map(|pattern| {
        Fact::new(
            predicates::PROMOTE_TO_LONG_TERM,
            [FactArg::atom("style_preference"), FactArg::string(pattern)],
        )
    });
    let preferred = learned.preferred.keys().map(|action| {
        Fact::new(
            predicates::PROMOTE_TO_LONG_TERM,
            [FactArg::atom("preferred_pattern"), FactArg::string(action)],
        )
    });
    avoid.chain(preferred).collect()
}

/// Facts for a committed task, in emission order
#[must_use]
pub fn generate_facts(
    edits: &[Edit],
    build: &BuildOutcome,
    learned: &LearnedPatterns,
    at: DateTime<Utc>,
) -> Vec<Fact> {
    let mut facts = Vec::with_capacity(edits.len() * 2 + build.diagnostics.len() + 1);
    for edit in edits {
        facts.push(modified_fact(&edit.file));
        facts.push(file_topology_fact(edit, at));
    }
    facts.push(build_state_fact(build.passed));
    facts.extend(build.diagnostics.iter().map(diagnostic_fact));
    facts.extend(promotion_facts(learned));
    facts
}
