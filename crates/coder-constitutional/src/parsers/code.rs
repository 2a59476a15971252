//! Tree-sitter backed checks

use super::{Grammar, SyntaxIssue};
use tree_sitter::{Node, Parser};

const SNIPPET_MAX: usize = 24;

/// Loaded parser for one grammar
pub struct GrammarCheck {
    grammar: Grammar,
    parser: Parser,
}

impl std::fmt::Debug for GrammarCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarCheck")
            .field("grammar", &self.grammar)
            .finish_non_exhaustive()
    }
}

impl GrammarCheck {
    /// Load grammar into a fresh parser
    ///
    /// # Errors
    /// Returns the loader message if the grammar ABI is incompatible.
    pub fn new(grammar: Grammar) -> Result<Self, String> {
        let mut parser = Parser::new();
        parser
            .set_language(&grammar.tree_sitter_language())
            .map_err(|e| e.to_string())?;
        Ok(Self { grammar, parser })
    }

    /// Grammar this check uses
    #[must_use]
    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Parse `source` and collect error and missing nodes
    pub fn issues(&mut self, source: &str) -> Vec<SyntaxIssue> {
        let Some(tree) = self.parser.parse(source, None) else {
            return vec![SyntaxIssue::new(1, 1, "parser produced no tree")];
        };

        let root = tree.root_node();
        if !root.has_error() {
            return Vec::new();
        }

        let mut issues = Vec::new();
        collect(root, source.as_bytes(), self.grammar.reports_all_errors(), &mut issues);
        if issues.is_empty() {
            issues.push(SyntaxIssue::new(1, 1, "syntax error"));
        }
        issues
    }
}

/// Depth-first walk; subtrees without errors are skipped
fn collect(node: Node<'_>, source: &[u8], all: bool, out: &mut Vec<SyntaxIssue>) {
    if !all && !out.is_empty() {
        return;
    }

    if node.is_missing() || node.is_error() {
        out.push(issue_for(node, source));
        if node.is_missing() {
            return;
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            collect(child, source, all, out);
        }
    }
}

fn issue_for(node: Node<'_>, source: &[u8]) -> SyntaxIssue {
    let pos = node.start_position();
    let message = if node.is_missing() {
        format!("missing {}", node.kind())
    } else {
        let text = node.utf8_text(source).unwrap_or_default();
        let first = text.lines().next().unwrap_or_default().trim();
        if first.is_empty() {
            "unexpected end of input".to_string()
        } else {
            let snippet: String = first.chars().take(SNIPPET_MAX).collect();
            format!("unexpected `{snippet}`")
        }
    };
    SyntaxIssue::new(pos.row + 1, pos.column + 1, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_reports_every_error() {
        let mut check = GrammarCheck::new(Grammar::Go).unwrap();
        let src = "package main\n\nfunc a() { x := }\n\nfunc b() { y := }\n";
        let issues = check.issues(src);
        assert!(issues.len() >= 2, "expected multiple issues, got {issues:?}");
    }

    #[test]
    fn rust_reports_first_error_only() {
        let mut check = GrammarCheck::new(Grammar::Rust).unwrap();
        let src = "fn a() { let = ; }\nfn b() { let = ; }\n";
        assert_eq!(check.issues(src).len(), 1);
    }

    #[test]
    fn clean_source_has_no_issues() {
        let mut check = GrammarCheck::new(Grammar::Python).unwrap();
        assert!(check.issues("x = 1\n").is_empty());
    }

    #[test]
    fn issue_positions_are_one_based() {
        let mut check = GrammarCheck::new(Grammar::Go).unwrap();
        let issues = check.issues("package main\nfunc {");
        let first = &issues[0];
        assert!(first.line >= 1);
        assert!(first.column >= 1);
    }
}
