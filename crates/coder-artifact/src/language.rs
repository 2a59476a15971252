//! Language tags
//!
//! Maps file extensions to the lowercase language tags used in edits,
//! `file_topology` facts and syntax-validator selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Programming language support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Go
    Go,
    /// Rust
    Rust,
    /// Python
    Python,
    /// TypeScript
    TypeScript,
    /// JavaScript, JSX included
    JavaScript,
    /// Java
    Java,
    /// C
    C,
    /// C++
    Cpp,
    /// Shell script
    Shell,
    /// Markdown
    Markdown,
    /// JSON
    Json,
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// Unrecognised extension
    Unknown,
}

impl Language {
    /// Get file extensions for this language
    #[inline]
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Go => &["go"],
            Language::Rust => &["rs"],
            Language::Python => &["py"],
            Language::TypeScript => &["ts", "tsx"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::Java => &["java"],
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp"],
            Language::Shell => &["sh", "bash"],
            Language::Markdown => &["md", "markdown"],
            Language::Json => &["json"],
            Language::Yaml => &["yaml", "yml"],
            Language::Toml => &["toml"],
            Language::Unknown => &[],
        }
    }

    /// Detect language from file extension
    #[inline]
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "go" => Some(Language::Go),
            "rs" => Some(Language::Rust),
            "py" => Some(Language::Python),
            "ts" | "tsx" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "java" => Some(Language::Java),
            "c" | "h" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "hpp" => Some(Language::Cpp),
            "sh" | "bash" => Some(Language::Shell),
            "md" | "markdown" => Some(Language::Markdown),
            "json" => Some(Language::Json),
            "yaml" | "yml" => Some(Language::Yaml),
            "toml" => Some(Language::Toml),
            _ => None,
        }
    }

    /// Detect language from a path, falling back to [`Language::Unknown`]
    #[must_use]
    pub fn detect(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Lowercase tag (`go`, `rust`, `typescript`, ...)
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Shell => "shell",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Unknown => "unknown",
        }
    }

    /// Check for the unknown tag
    #[inline]
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Language::Unknown)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Unknown
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = std::convert::Infallible;

    /// Accepts a tag (`go`), an alias (`golang`, `ts`) or an extension (`.rs`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let lang = match lower.as_str() {
            "go" | "golang" => Language::Go,
            "rust" => Language::Rust,
            "python" => Language::Python,
            "typescript" => Language::TypeScript,
            "javascript" => Language::JavaScript,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "shell" => Language::Shell,
            "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" => Language::Yaml,
            "toml" => Language::Toml,
            other => Language::from_extension(other).unwrap_or(Language::Unknown),
        };
        Ok(lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_extension() {
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension(".RS"), Some(Language::Rust));
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("unknown"), None);
    }

    #[test]
    fn language_detect_from_path() {
        assert_eq!(Language::detect("src/hello.go"), Language::Go);
        assert_eq!(Language::detect("web/app.jsx"), Language::JavaScript);
        assert_eq!(Language::detect("Makefile"), Language::Unknown);
    }

    #[test]
    fn language_tag_roundtrip() {
        for lang in [Language::Go, Language::Rust, Language::Python, Language::TypeScript] {
            assert_eq!(lang.tag().parse::<Language>().unwrap(), lang);
        }
        assert_eq!("golang".parse::<Language>().unwrap(), Language::Go);
        assert_eq!("ts".parse::<Language>().unwrap(), Language::TypeScript);
    }

    #[test]
    fn language_extensions() {
        assert!(Language::Rust.extensions().contains(&"rs"));
        assert!(Language::Unknown.extensions().is_empty());
    }
}
