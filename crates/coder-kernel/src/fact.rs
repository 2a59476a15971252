//! Fact model
//!
//! A fact is a predicate name plus an ordered argument vector. Arguments are
//! a tagged variant so that atoms (`/go`, `/passing`) stay distinct from free
//! text without any reflection on the consumer side.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A single fact argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FactArg {
    /// Symbolic constant, stored without its leading `/`
    Atom(String),
    /// Free text
    Str(String),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// String-keyed payload (action arguments)
    Map(BTreeMap<String, FactArg>),
}

impl FactArg {
    /// Create an atom; a leading `/` is accepted and stripped
    #[inline]
    #[must_use]
    pub fn atom(name: impl AsRef<str>) -> Self {
        Self::Atom(name.as_ref().trim_start_matches('/').to_string())
    }

    /// Create a free-text argument
    #[inline]
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Create a map argument from key/value pairs
    #[must_use]
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FactArg)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// True if this is the atom `name` (with or without leading `/`)
    #[inline]
    #[must_use]
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Self::Atom(a) if a == name.trim_start_matches('/'))
    }

    /// True if this atom or string spells `name` or `/name`
    #[must_use]
    pub fn matches_symbol(&self, name: &str) -> bool {
        let bare = name.trim_start_matches('/');
        match self {
            Self::Atom(a) => a == bare,
            Self::Str(s) => s.trim_start_matches('/') == bare,
            _ => false,
        }
    }

    /// Borrow free text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow an atom's name (without `/`)
    #[inline]
    #[must_use]
    pub fn atom_name(&self) -> Option<&str> {
        match self {
            Self::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// Look up a key in a map argument
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FactArg> {
        match self {
            Self::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Textual value: strings verbatim, atoms with `/`, everything else as a literal
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Display for FactArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(a) => write!(f, "/{a}"),
            Self::Str(s) => write!(f, "{}", quote(s)),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

impl From<&str> for FactArg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FactArg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for FactArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FactArg {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FactArg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FactArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Predicate plus ordered arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Predicate name
    pub predicate: String,
    /// Ordered arguments
    pub args: Vec<FactArg>,
}

impl Fact {
    /// Create new fact
    #[inline]
    #[must_use]
    pub fn new(predicate: impl Into<String>, args: impl IntoIterator<Item = FactArg>) -> Self {
        Self {
            predicate: predicate.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Argument at `index`
    #[inline]
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&FactArg> {
        self.args.get(index)
    }

    /// Textual argument at `index` (empty when absent)
    #[inline]
    #[must_use]
    pub fn arg_text(&self, index: usize) -> String {
        self.arg(index).map(FactArg::text).unwrap_or_default()
    }

    /// Number of arguments
    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Parse a ground fact literal such as `modified("a.go").`
    ///
    /// # Errors
    /// Returns `FactParseError` describing the first offending position.
    pub fn parse(input: &str) -> Result<Self, FactParseError> {
        let mut parser = LiteralParser::new(input);
        let fact = parser.fact()?;
        parser.skip_ws();
        parser.eat('.');
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("trailing input"));
        }
        Ok(fact)
    }
}

impl Display for Fact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl FromStr for Fact {
    type Err = FactParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Fact literal parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fact literal at {position}: {message}")]
pub struct FactParseError {
    /// Character offset
    pub position: usize,
    /// What went wrong
    pub message: String,
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> FactParseError {
        FactParseError {
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), FactParseError> {
        self.skip_ws();
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn ident(&mut self) -> Result<String, FactParseError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn fact(&mut self) -> Result<Fact, FactParseError> {
        let predicate = self.ident()?;
        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_ws();
        if self.eat(')') {
            return Ok(Fact { predicate, args });
        }
        loop {
            args.push(self.value()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                break;
            }
            return Err(self.error("expected ',' or ')'"));
        }
        Ok(Fact { predicate, args })
    }

    fn value(&mut self) -> Result<FactArg, FactParseError> {
        self.skip_ws();
        match self.peek() {
            Some('"') => self.quoted().map(FactArg::Str),
            Some('/') => {
                self.pos += 1;
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/'))
                {
                    self.pos += 1;
                }
                if start == self.pos {
                    return Err(self.error("empty atom"));
                }
                Ok(FactArg::Atom(self.chars[start..self.pos].iter().collect()))
            }
            Some('{') => self.map(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(_) => {
                let word = self.ident()?;
                match word.as_str() {
                    "true" => Ok(FactArg::Bool(true)),
                    "false" => Ok(FactArg::Bool(false)),
                    _ => Err(self.error(format!("unexpected bare word '{word}'"))),
                }
            }
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn quoted(&mut self) -> Result<String, FactParseError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some(c) => c,
                        None => return Err(self.error("dangling escape")),
                    };
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<FactArg, FactParseError> {
        let start = self.pos;
        self.eat('-');
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if text.contains('.') {
            text.parse::<f64>()
                .map(FactArg::Float)
                .map_err(|_| self.error(format!("invalid float '{text}'")))
        } else {
            text.parse::<i64>()
                .map(FactArg::Int)
                .map_err(|_| self.error(format!("invalid integer '{text}'")))
        }
    }

    fn map(&mut self) -> Result<FactArg, FactParseError> {
        self.pos += 1;
        let mut entries = BTreeMap::new();
        self.skip_ws();
        if self.eat('}') {
            return Ok(FactArg::Map(entries));
        }
        loop {
            self.skip_ws();
            let key = if self.peek() == Some('"') {
                self.quoted()?
            } else {
                self.ident()?
            };
            self.expect(':')?;
            let value = self.value()?;
            entries.insert(key, value);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat('}') {
                break;
            }
            return Err(self.error("expected ',' or '}'"));
        }
        Ok(FactArg::Map(entries))
    }
}
