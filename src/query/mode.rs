//! Query syntaxes and their operator tables

use serde::{Deserialize, Serialize};

/// The two textual query syntaxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// `field:value AND other:[1 TO 5]`
    #[default]
    Lucene,
    /// `field = "value" && !other`
    Criterion,
}

/// How a syntax spells its operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorTable {
    pub equal: &'static str,
    pub notequal: &'static str,
    pub substr: &'static str,
    pub notsubstr: Option<&'static str>,
    pub and: &'static [&'static str],
    pub or: &'static [&'static str],
}

impl OperatorTable {
    /// Separator placed between criteria joined with the first AND spelling
    pub fn and_joiner(&self) -> String {
        format!(" {} ", self.and[0]).replace("  ", " ")
    }
}

static LUCENE_OPERATORS: OperatorTable = OperatorTable {
    equal: "",
    notequal: "-",
    substr: "",
    notsubstr: None,
    and: &["", "AND"],
    or: &["OR"],
};

static CRITERION_OPERATORS: OperatorTable = OperatorTable {
    equal: "=",
    notequal: "!=",
    substr: "<>",
    notsubstr: Some("!<>"),
    and: &["&&"],
    or: &["||"],
};

impl QueryMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lucene" => Some(Self::Lucene),
            "criterion" => Some(Self::Criterion),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lucene => "lucene",
            Self::Criterion => "criterion",
        }
    }

    pub fn operators(&self) -> &'static OperatorTable {
        match self {
            Self::Lucene => &LUCENE_OPERATORS,
            Self::Criterion => &CRITERION_OPERATORS,
        }
    }
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Words the grammar reads as connectives or negation when bare
const LUCENE_KEYWORDS: [&str; 3] = ["AND", "OR", "NOT"];

/// Whether a value cannot be written as a bare Lucene string
pub fn lucene_needs_quotes(value: &str) -> bool {
    value.is_empty()
        || LUCENE_KEYWORDS.contains(&value)
        || value.starts_with('\'')
        || value.contains("&&")
        || value.contains("||")
        || value.chars().any(|c| c.is_whitespace() || "/+-!(){}[]^\"~*?:\\".contains(c))
}

/// A Lucene value, double-quoted when needed
pub fn lucene_value(value: &str) -> String {
    if lucene_needs_quotes(value) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// A criterion value, always double-quoted
pub fn criterion_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
