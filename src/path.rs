// Path module - compiles and evaluates field-path expressions
//
// A path expression addresses one location inside an arbitrary JSON tree.
// Expressions are compiled once, when a metric definition is built, so a
// malformed path fails at startup instead of during a scrape.
//
// # Syntax
// - `jvm.mem.heap_used_in_bytes`     nested field descent
// - `nodes."node-1".host`            quoted field names
// - `snapshots[0]`, `snapshots[-1]`  array indexing, negative counts from the end
// - `pools[?name == 'old'].used`     first array element matching a filter
// - `items[?size != `0`]`            filters also accept backtick JSON literals

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while compiling a path expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path expression `{expression}` at offset {offset}: {reason}")]
    InvalidSyntax {
        expression: String,
        offset: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(i64),
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Comparator {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    path: Vec<Segment>,
    comparator: Comparator,
    literal: Value,
}

impl Filter {
    fn matches(&self, item: &Value) -> bool {
        let equal = match walk(&self.path, item) {
            Some(value) => values_equal(value, &self.literal),
            None => self.literal.is_null(),
        };

        match self.comparator {
            Comparator::Equal => equal,
            Comparator::NotEqual => !equal,
        }
    }
}

/// A compiled, read-only path expression
///
/// Evaluation never fails: any missing segment, `null` value, or attempt to
/// descend through a scalar yields `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPath {
    expression: String,
    segments: Vec<Segment>,
}

impl CompiledPath {
    /// Compiles a path expression
    ///
    /// # Returns
    /// * `Ok(CompiledPath)` - The expression parsed completely
    /// * `Err(PathError)` - The expression is empty or malformed
    ///
    /// # Example
    /// ```
    /// use es_exporter::path::CompiledPath;
    ///
    /// let path = CompiledPath::compile("jvm.mem.heap_used_in_bytes").unwrap();
    /// assert_eq!(path.as_str(), "jvm.mem.heap_used_in_bytes");
    /// ```
    pub fn compile(expression: &str) -> Result<Self, PathError> {
        let mut parser = Parser::new(expression);
        let segments = parser.parse_segments(false)?;

        if let Some(c) = parser.peek() {
            return Err(parser.error(format!("unexpected character '{}'", c)));
        }

        Ok(CompiledPath {
            expression: expression.to_string(),
            segments,
        })
    }

    /// Evaluates the path against a decoded document
    ///
    /// Returns the addressed value unchanged, or `None` when the path does
    /// not resolve. A resolved `null` is reported as not found.
    pub fn evaluate<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        walk(&self.segments, document).filter(|value| !value.is_null())
    }

    /// Returns the source text of the expression
    pub fn as_str(&self) -> &str {
        &self.expression
    }
}

impl FromStr for CompiledPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for CompiledPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn walk<'a>(segments: &[Segment], document: &'a Value) -> Option<&'a Value> {
    let mut current = document;

    for segment in segments {
        current = match (segment, current) {
            (Segment::Field(name), Value::Object(map)) => map.get(name)?,
            (Segment::Index(index), Value::Array(items)) => {
                let position = if *index < 0 {
                    let back = usize::try_from(index.unsigned_abs()).ok()?;
                    items.len().checked_sub(back)?
                } else {
                    usize::try_from(*index).ok()?
                };
                items.get(position)?
            }
            (Segment::Filter(filter), Value::Array(items)) => {
                items.iter().find(|item| filter.matches(item))?
            }
            _ => return None,
        };
    }

    Some(current)
}

// Numbers compare by value so that `1` and `1.0` are equal.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => left == right,
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$')
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), PathError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn error(&self, reason: impl Into<String>) -> PathError {
        PathError::InvalidSyntax {
            expression: self.input.to_string(),
            offset: self.pos,
            reason: reason.into(),
        }
    }

    /// Parses a chain of segments. Inside a filter the chain ends at the
    /// comparator or the closing bracket.
    fn parse_segments(&mut self, in_filter: bool) -> Result<Vec<Segment>, PathError> {
        let mut segments = Vec::new();

        if self.peek() == Some('[') {
            self.bump();
            segments.push(self.parse_bracket()?);
        } else {
            segments.push(Segment::Field(self.parse_field()?));
        }

        loop {
            match self.peek() {
                None => break,
                Some('.') => {
                    self.bump();
                    segments.push(Segment::Field(self.parse_field()?));
                }
                Some('[') => {
                    self.bump();
                    segments.push(self.parse_bracket()?);
                }
                Some(c) if in_filter && (c.is_whitespace() || matches!(c, '=' | '!' | ']')) => {
                    break
                }
                Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
            }
        }

        Ok(segments)
    }

    fn parse_field(&mut self) -> Result<String, PathError> {
        if self.peek() == Some('"') {
            self.bump();
            return self.parse_quoted('"');
        }

        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_identifier_char(c)) {
            self.bump();
        }

        if start == self.pos {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected field name, found '{}'", c)),
                None => self.error("expected field name, found end of input"),
            });
        }

        Ok(self.input[start..self.pos].to_string())
    }

    // Reads up to the closing quote, honouring backslash escapes.
    fn parse_quoted(&mut self, quote: char) -> Result<String, PathError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape sequence")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error(format!("unterminated {} quote", quote))),
            }
        }
    }

    fn parse_bracket(&mut self) -> Result<Segment, PathError> {
        self.skip_whitespace();

        if self.peek() == Some('?') {
            self.bump();
            let filter = self.parse_filter()?;
            self.skip_whitespace();
            self.expect(']')?;
            return Ok(Segment::Filter(filter));
        }

        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }

        let digits = &self.input[start..self.pos];
        let index = digits
            .parse::<i64>()
            .map_err(|_| self.error(format!("invalid array index '{}'", digits)))?;

        self.skip_whitespace();
        self.expect(']')?;
        Ok(Segment::Index(index))
    }

    fn parse_filter(&mut self) -> Result<Filter, PathError> {
        self.skip_whitespace();
        let path = self.parse_segments(true)?;
        self.skip_whitespace();

        let comparator = match (self.bump(), self.bump()) {
            (Some('='), Some('=')) => Comparator::Equal,
            (Some('!'), Some('=')) => Comparator::NotEqual,
            _ => return Err(self.error("expected '==' or '!=' in filter")),
        };

        self.skip_whitespace();
        let literal = self.parse_literal()?;

        Ok(Filter {
            path,
            comparator,
            literal,
        })
    }

    fn parse_literal(&mut self) -> Result<Value, PathError> {
        match self.bump() {
            Some('\'') => self.parse_quoted('\'').map(Value::String),
            Some('`') => {
                let input = self.input;
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c != '`') {
                    self.bump();
                }
                let raw = &input[start..self.pos];
                self.expect('`')?;
                serde_json::from_str(raw.trim())
                    .map_err(|e| self.error(format!("invalid JSON literal `{}`: {}", raw, e)))
            }
            _ => Err(self.error("expected a quoted string or backtick literal")),
        }
    }
}
