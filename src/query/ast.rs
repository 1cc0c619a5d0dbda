//! Lucene parse tree
//!
//! Node types produced by the Lucene-like grammar, before compilation into
//! [`Criteria`](crate::query::Criteria). Every node prints back to query
//! text that parses to an equal tree.

use std::borrow::Cow;
use std::fmt;

/// Binary connective between two criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Prefix operator of a term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `NOT `
    Not,
    /// `!`
    Bang,
    /// `-`
    Minus,
    /// `+`
    Plus,
}

impl UnaryOp {
    pub fn is_negation(&self) -> bool {
        !matches!(self, UnaryOp::Plus)
    }
}

/// One segment of a field path, with an optional `(index)` suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<String>,
}

/// A dotted field path, e.g. `http.headers(0).name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub segments: Vec<PathSegment>,
}

/// A string operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LuceneString {
    /// `'...'`, unescaped
    SingleQuoted(String),
    /// `"..."`, unescaped
    DoubleQuoted(String),
    /// `/.../`, with `\/` unescaped
    Regex(String),
    /// Bare text as typed, escapes and wildcards included
    Unquoted(String),
}

impl LuceneString {
    /// The literal text, with backslash escapes resolved for bare strings
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            LuceneString::SingleQuoted(s) | LuceneString::DoubleQuoted(s) | LuceneString::Regex(s) => {
                Cow::Borrowed(s)
            }
            LuceneString::Unquoted(raw) if !raw.contains('\\') => Cow::Borrowed(raw),
            LuceneString::Unquoted(raw) => {
                let mut out = String::with_capacity(raw.len());
                let mut chars = raw.chars();
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        if let Some(next) = chars.next() {
                            out.push(next);
                            continue;
                        }
                    }
                    out.push(c);
                }
                Cow::Owned(out)
            }
        }
    }

    /// A quoted string with nothing inside; regexes never count
    pub fn is_empty_text(&self) -> bool {
        match self {
            LuceneString::SingleQuoted(s) | LuceneString::DoubleQuoted(s) => s.is_empty(),
            LuceneString::Regex(_) | LuceneString::Unquoted(_) => false,
        }
    }

    /// Whether a bare string holds an unescaped `*` or `?`
    pub fn has_wildcard(&self) -> bool {
        let LuceneString::Unquoted(raw) = self else {
            return false;
        };

        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '*' | '?' => return true,
                _ => {}
            }
        }
        false
    }

    /// A bare `*` range bound, meaning "unbounded"
    pub fn is_open_bound(&self) -> bool {
        matches!(self, LuceneString::Unquoted(raw) if raw == "*")
    }

    /// Anchored regular expression equivalent to a wildcard pattern
    pub fn glob_regex(&self) -> String {
        let mut pattern = String::from("^");
        let mut chars = self.raw_text().chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        pattern.push_str(&regex::escape(&next.to_string()));
                    }
                }
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        pattern
    }

    fn raw_text(&self) -> &str {
        match self {
            LuceneString::SingleQuoted(s)
            | LuceneString::DoubleQuoted(s)
            | LuceneString::Regex(s)
            | LuceneString::Unquoted(s) => s,
        }
    }
}

/// Boost or fuzziness suffix; parsed and kept, but has no effect on compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Boost(u32),
    Fuzzy(Option<u32>),
}

/// A single searchable term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// `[field:]value[modifier]`
    Fielded {
        field: Option<FieldPath>,
        value: LuceneString,
        modifier: Option<Modifier>,
    },
    /// `[field:][low TO high]`
    InclusiveRange {
        field: Option<FieldPath>,
        low: LuceneString,
        high: LuceneString,
    },
    /// `[field:]{low TO high}`
    ExclusiveRange {
        field: Option<FieldPath>,
        low: LuceneString,
        high: LuceneString,
    },
}

impl Term {
    pub fn field(&self) -> Option<&FieldPath> {
        match self {
            Term::Fielded { field, .. }
            | Term::InclusiveRange { field, .. }
            | Term::ExclusiveRange { field, .. } => field.as_ref(),
        }
    }
}

/// A node of the Lucene parse tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseNode {
    /// Left-associative binary combination
    Bool {
        left: Box<ParseNode>,
        op: BoolOp,
        right: Box<ParseNode>,
    },
    /// A term with an optional prefix operator
    Negatable {
        operator: Option<UnaryOp>,
        body: Term,
    },
    Parenthesis(Box<ParseNode>),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(index) = &self.index {
            write!(f, "({})", index)?;
        }
        Ok(())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Display for LuceneString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuceneString::SingleQuoted(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            LuceneString::DoubleQuoted(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            LuceneString::Regex(s) => write!(f, "/{}/", s.replace('/', "\\/")),
            LuceneString::Unquoted(raw) => f.write_str(raw),
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Boost(n) => write!(f, "^{}", n),
            Modifier::Fuzzy(Some(n)) => write!(f, "~{}", n),
            Modifier::Fuzzy(None) => f.write_str("~"),
        }
    }
}

fn write_field(f: &mut fmt::Formatter<'_>, field: &Option<FieldPath>) -> fmt::Result {
    match field {
        Some(path) => write!(f, "{}:", path),
        None => Ok(()),
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Fielded {
                field,
                value,
                modifier,
            } => {
                write_field(f, field)?;
                write!(f, "{}", value)?;
                if let Some(modifier) = modifier {
                    write!(f, "{}", modifier)?;
                }
                Ok(())
            }
            Term::InclusiveRange { field, low, high } => {
                write_field(f, field)?;
                write!(f, "[{} TO {}]", low, high)
            }
            Term::ExclusiveRange { field, low, high } => {
                write_field(f, field)?;
                write!(f, "{{{} TO {}}}", low, high)
            }
        }
    }
}

impl fmt::Display for ParseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseNode::Bool { left, op, right } => {
                let op = match op {
                    BoolOp::And => "AND",
                    BoolOp::Or => "OR",
                };
                write!(f, "{} {} {}", left, op, right)
            }
            ParseNode::Negatable { operator, body } => {
                let prefix = match operator {
                    None => "",
                    Some(UnaryOp::Not) => "NOT ",
                    Some(UnaryOp::Bang) => "!",
                    Some(UnaryOp::Minus) => "-",
                    Some(UnaryOp::Plus) => "+",
                };
                write!(f, "{}{}", prefix, body)
            }
            ParseNode::Parenthesis(inner) => write!(f, "({})", inner),
        }
    }
}
