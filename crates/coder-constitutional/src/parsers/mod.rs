//! Syntax gating for proposed file content
//!
//! Grammar selection:
//! - Go (tag `go` or `.go`): every error node is reported
//! - Rust, Python, TypeScript: first error node is reported
//! - JavaScript (`.js`, `.jsx`, `.mjs`, `.cjs`): JavaScript grammar with JSX
//! - anything else: no gate
//!
//! Parsers are created lazily and reused by one [`SyntaxValidator`] for the
//! lifetime of a task.

use crate::error::SyntaxError;
use coder_artifact::Language;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

mod code;

pub use code::GrammarCheck;

/// One syntax problem with 1-based position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Parser message
    pub message: String,
}

impl SyntaxIssue {
    /// Create issue at position
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Tree-sitter grammar used for a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// Go
    Go,
    /// Rust
    Rust,
    /// Python
    Python,
    /// TypeScript without JSX
    TypeScript,
    /// TypeScript with JSX
    Tsx,
    /// JavaScript, JSX included
    JavaScript,
}

impl Grammar {
    /// Tree-sitter language handle
    #[must_use]
    pub fn tree_sitter_language(self) -> tree_sitter::Language {
        match self {
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    /// Whether every error is collected instead of the first one
    #[inline]
    #[must_use]
    pub fn reports_all_errors(self) -> bool {
        matches!(self, Self::Go)
    }
}

/// Pick grammar from language tag, then file extension
#[must_use]
pub fn grammar_for(language: Language, file: &str) -> Option<Grammar> {
    let ext = Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let ext = ext.as_deref();

    if language == Language::Go || ext == Some("go") {
        return Some(Grammar::Go);
    }

    match (language, ext) {
        (_, Some("tsx")) => Some(Grammar::Tsx),
        (_, Some("jsx" | "mjs" | "cjs")) => Some(Grammar::JavaScript),
        (Language::Rust, _) | (_, Some("rs")) => Some(Grammar::Rust),
        (Language::Python, _) | (_, Some("py")) => Some(Grammar::Python),
        (Language::TypeScript, _) | (_, Some("ts")) => Some(Grammar::TypeScript),
        (Language::JavaScript, _) | (_, Some("js")) => Some(Grammar::JavaScript),
        _ => None,
    }
}

/// Per-task syntax validator with cached parsers
#[derive(Default)]
pub struct SyntaxValidator {
    checks: HashMap<Grammar, GrammarCheck>,
}

impl fmt::Debug for SyntaxValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxValidator")
            .field("initialized", &self.checks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SyntaxValidator {
    /// Create validator with no parsers loaded
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `source` for `file`
    ///
    /// Content for languages without a grammar always passes.
    ///
    /// # Errors
    /// - `SyntaxError::Invalid` when the parse tree contains errors
    /// - `SyntaxError::ParserInit` when the grammar cannot be loaded
    pub fn validate(&mut self, file: &str, language: Language, source: &str) -> Result<(), SyntaxError> {
        let Some(grammar) = grammar_for(language, file) else {
            tracing::trace!(file, %language, "no syntax gate for language");
            return Ok(());
        };

        let check = match self.checks.entry(grammar) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let check = GrammarCheck::new(grammar).map_err(|message| SyntaxError::ParserInit {
                    language: reported_language(grammar, language),
                    message,
                })?;
                entry.insert(check)
            }
        };

        let issues = check.issues(source);
        if issues.is_empty() {
            Ok(())
        } else {
            let language = reported_language(grammar, language);
            tracing::debug!(file, %language, issues = issues.len(), "syntax check failed");
            Err(SyntaxError::invalid(language, file, issues))
        }
    }

    /// Number of grammars loaded so far
    #[must_use]
    pub fn initialized_count(&self) -> usize {
        self.checks.len()
    }

    /// Drop all cached parsers
    pub fn release(&mut self) {
        self.checks.clear();
    }
}

fn reported_language(grammar: Grammar, language: Language) -> Language {
    if !language.is_unknown() {
        return language;
    }
    match grammar {
        Grammar::Go => Language::Go,
        Grammar::Rust => Language::Rust,
        Grammar::Python => Language::Python,
        Grammar::TypeScript | Grammar::Tsx => Language::TypeScript,
        Grammar::JavaScript => Language::JavaScript,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_selection() {
        assert_eq!(grammar_for(Language::Go, "main.txt"), Some(Grammar::Go));
        assert_eq!(grammar_for(Language::Unknown, "x/main.go"), Some(Grammar::Go));
        assert_eq!(grammar_for(Language::Rust, "lib.rs"), Some(Grammar::Rust));
        assert_eq!(grammar_for(Language::Unknown, "app.py"), Some(Grammar::Python));
        assert_eq!(grammar_for(Language::TypeScript, "a.ts"), Some(Grammar::TypeScript));
        assert_eq!(grammar_for(Language::TypeScript, "a.tsx"), Some(Grammar::Tsx));
        assert_eq!(grammar_for(Language::JavaScript, "a.js"), Some(Grammar::JavaScript));
        assert_eq!(grammar_for(Language::Unknown, "a.jsx"), Some(Grammar::JavaScript));
        assert_eq!(grammar_for(Language::Unknown, "lib/index.mjs"), Some(Grammar::JavaScript));
        assert_eq!(grammar_for(Language::Markdown, "README.md"), None);
        assert_eq!(grammar_for(Language::Unknown, "Makefile"), None);
    }

    #[test]
    fn valid_go_passes() {
        let mut validator = SyntaxValidator::new();
        let src = "package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n";
        validator.validate("main.go", Language::Go, src).unwrap();
    }

    #[test]
    fn invalid_go_names_language_and_path() {
        let mut validator = SyntaxValidator::new();
        let err = validator
            .validate("src/bad.go", Language::Go, "package main\nfunc {")
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("go syntax check failed for src/bad.go: "));
        match err {
            SyntaxError::Invalid { issues, .. } => assert!(!issues.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rust_python_typescript_gates() {
        let mut validator = SyntaxValidator::new();
        validator
            .validate("lib.rs", Language::Rust, "pub fn add(a: i32, b: i32) -> i32 { a + b }\n")
            .unwrap();
        assert!(validator
            .validate("lib.rs", Language::Rust, "pub fn add(a: i32 -> i32 {")
            .is_err());

        validator
            .validate("app.py", Language::Python, "def f(x):\n    return x + 1\n")
            .unwrap();
        assert!(validator
            .validate("app.py", Language::Python, "def f(x:\n    return\n")
            .is_err());

        validator
            .validate("a.ts", Language::TypeScript, "export const x: number = 1;\n")
            .unwrap();
        assert!(validator
            .validate("a.ts", Language::TypeScript, "export const = ;\n")
            .is_err());
    }

    #[test]
    fn javascript_jsx_accepted() {
        let mut validator = SyntaxValidator::new();
        validator
            .validate("view.jsx", Language::JavaScript, "const v = <div>{name}</div>;\n")
            .unwrap();
    }

    #[test]
    fn plain_javascript_uses_its_own_grammar() {
        let mut validator = SyntaxValidator::new();
        let src = "\
class Counter {
  #count = 0;
  bump(step) { this.#count += step ?? 1; return this.#count; }
}
const ok = (a, b, c) => a < b && c > b;
export default function render(props) {
  return <span className=\"n\">{props?.user?.name}</span>;
}
";
        validator.validate("src/counter.js", Language::JavaScript, src).unwrap();

        let err = validator
            .validate("src/counter.js", Language::JavaScript, "const = ;\n")
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("javascript syntax check failed for src/counter.js: "));
        assert_eq!(validator.initialized_count(), 1);
    }

    #[test]
    fn ungated_language_passes_anything() {
        let mut validator = SyntaxValidator::new();
        validator
            .validate("notes.md", Language::Markdown, "func {{{ ((")
            .unwrap();
        assert_eq!(validator.initialized_count(), 0);
    }

    #[test]
    fn parsers_are_reused() {
        let mut validator = SyntaxValidator::new();
        validator.validate("a.go", Language::Go, "package a\n").unwrap();
        validator.validate("b.go", Language::Go, "package b\n").unwrap();
        validator.validate("c.rs", Language::Rust, "fn c() {}\n").unwrap();
        assert_eq!(validator.initialized_count(), 2);

        validator.release();
        assert_eq!(validator.initialized_count(), 0);
    }
}
