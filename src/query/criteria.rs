//! Compiled criteria tree
//!
//! Both query syntaxes compile into the same tree of qualified-path leaves.
//! `And`/`Or` nodes are kept flat: combining two nodes of the same kind merges
//! their children, and `Empty` is the identity of both combinators.
//!
//! A leaf without a value is an existence test: an operator starting with
//! `!` asks for the path to be absent, anything else for it to be present.

use crate::query::compiler::RAW_QUERY_FIELD;
use crate::query::mode::{criterion_value, lucene_value, QueryMode};
use serde::Serialize;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// A compiled boolean criteria expression
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criteria {
    /// Matches everything
    #[default]
    Empty,
    Leaf {
        path: String,
        operator: String,
        value: Option<String>,
    },
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
}

/// Whether an operator negates its test (`!=`, `!~`, `!<>` ...)
pub fn is_negated_operator(operator: &str) -> bool {
    operator.starts_with('!')
}

/// The operator matching exactly the rows `operator` rejects
pub fn negate_operator(operator: &str) -> String {
    let negated = match operator {
        "==" | "=" => "!=",
        "!=" => "==",
        ">=" => "<",
        ">" => "<=",
        "<=" => ">",
        "<" => ">=",
        "<>" => "!<>",
        other => {
            return match other.strip_prefix('!') {
                Some(positive) => positive.to_string(),
                None => format!("!{}", other),
            }
        }
    };
    negated.to_string()
}

impl Criteria {
    pub fn leaf(
        path: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Criteria::Leaf {
            path: path.into(),
            operator: operator.into(),
            value: Some(value.into()),
        }
    }

    /// A leaf whose value may be absent
    pub fn leaf_opt(
        path: impl Into<String>,
        operator: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        Criteria::Leaf {
            path: path.into(),
            operator: operator.into(),
            value,
        }
    }

    /// Path must be present
    pub fn exists(path: impl Into<String>) -> Self {
        Self::leaf_opt(path, "==", None)
    }

    /// Path must be absent
    pub fn absent(path: impl Into<String>) -> Self {
        Self::leaf_opt(path, "!=", None)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Criteria::Empty)
    }

    /// Conjunction, flattening nested `And`s
    pub fn and(self, other: Criteria) -> Criteria {
        match (self, other) {
            (Criteria::Empty, c) | (c, Criteria::Empty) => c,
            (Criteria::And(mut left), Criteria::And(right)) => {
                left.extend(right);
                Criteria::And(left)
            }
            (Criteria::And(mut left), c) => {
                left.push(c);
                Criteria::And(left)
            }
            (c, Criteria::And(right)) => {
                let mut children = vec![c];
                children.extend(right);
                Criteria::And(children)
            }
            (left, right) => Criteria::And(vec![left, right]),
        }
    }

    /// Disjunction, flattening nested `Or`s
    pub fn or(self, other: Criteria) -> Criteria {
        match (self, other) {
            (Criteria::Empty, c) | (c, Criteria::Empty) => c,
            (Criteria::Or(mut left), Criteria::Or(right)) => {
                left.extend(right);
                Criteria::Or(left)
            }
            (Criteria::Or(mut left), c) => {
                left.push(c);
                Criteria::Or(left)
            }
            (c, Criteria::Or(right)) => {
                let mut children = vec![c];
                children.extend(right);
                Criteria::Or(children)
            }
            (left, right) => Criteria::Or(vec![left, right]),
        }
    }

    pub fn all(criteria: impl IntoIterator<Item = Criteria>) -> Criteria {
        criteria.into_iter().fold(Criteria::Empty, Criteria::and)
    }

    pub fn any(criteria: impl IntoIterator<Item = Criteria>) -> Criteria {
        criteria.into_iter().fold(Criteria::Empty, Criteria::or)
    }

    /// Every leaf path, in tree order
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Criteria::Empty => {}
            Criteria::Leaf { path, .. } => out.push(path),
            Criteria::And(children) | Criteria::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
        }
    }

    /// Serialize in either syntax, optionally stripping a `datatype` prefix from paths
    pub fn to_query_string(&self, mode: QueryMode, strip_prefix: Option<&str>) -> String {
        self.render(mode, strip_prefix, false)
    }

    fn render(&self, mode: QueryMode, strip_prefix: Option<&str>, nested: bool) -> String {
        match self {
            Criteria::Empty => String::new(),
            Criteria::Leaf {
                path,
                operator,
                value,
            } => {
                let path = strip_prefix
                    .and_then(|prefix| path.strip_prefix(prefix))
                    .and_then(|rest| rest.strip_prefix('.'))
                    .unwrap_or(path);
                match mode {
                    QueryMode::Lucene => render_lucene_leaf(path, operator, value.as_deref()),
                    QueryMode::Criterion => render_criterion_leaf(path, operator, value.as_deref()),
                }
            }
            Criteria::And(children) | Criteria::Or(children) => {
                let joiner = match (self, mode) {
                    (Criteria::And(_), QueryMode::Lucene) => " AND ",
                    (Criteria::And(_), QueryMode::Criterion) => " && ",
                    (_, QueryMode::Lucene) => " OR ",
                    (_, QueryMode::Criterion) => " || ",
                };
                let parts: Vec<String> = children
                    .iter()
                    .filter(|c| !c.is_empty())
                    .map(|c| c.render(mode, strip_prefix, true))
                    .collect();

                if nested && parts.len() > 1 {
                    format!("({})", parts.join(joiner))
                } else {
                    parts.join(joiner)
                }
            }
        }
    }
}

fn render_lucene_leaf(path: &str, operator: &str, value: Option<&str>) -> String {
    let field = if path == RAW_QUERY_FIELD {
        String::new()
    } else {
        format!("{}:", path)
    };
    let sign = if is_negated_operator(operator) { "-" } else { "" };

    let Some(value) = value else {
        return format!("{}{}[* TO *]", sign, field);
    };

    match operator {
        ">=" => format!("{}[{} TO *]", field, lucene_value(value)),
        ">" => format!("{}{{{} TO *}}", field, lucene_value(value)),
        "<=" => format!("{}[* TO {}]", field, lucene_value(value)),
        "<" => format!("{}{{* TO {}}}", field, lucene_value(value)),
        "~" | "!~" | "~*" | "!~*" => {
            format!("{}{}/{}/", sign, field, value.replace('/', "\\/"))
        }
        "<>" | "!<>" | "<>*" | "!<>*" => {
            let pattern = format!(".*{}.*", regex::escape(value));
            format!("{}{}/{}/", sign, field, pattern.replace('/', "\\/"))
        }
        _ => format!("{}{}{}", sign, field, lucene_value(value)),
    }
}

fn render_criterion_leaf(path: &str, operator: &str, value: Option<&str>) -> String {
    match value {
        None if is_negated_operator(operator) => format!("!{}", path),
        None => path.to_string(),
        Some(value) => format!("{} {} {}", path, operator, criterion_value(value)),
    }
}

impl std::fmt::Display for Criteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string(QueryMode::Criterion, None))
    }
}

impl BitAnd for Criteria {
    type Output = Criteria;

    fn bitand(self, rhs: Criteria) -> Criteria {
        self.and(rhs)
    }
}

impl BitOr for Criteria {
    type Output = Criteria;

    fn bitor(self, rhs: Criteria) -> Criteria {
        self.or(rhs)
    }
}

impl BitAndAssign for Criteria {
    fn bitand_assign(&mut self, rhs: Criteria) {
        *self = std::mem::take(self).and(rhs);
    }
}

impl BitOrAssign for Criteria {
    fn bitor_assign(&mut self, rhs: Criteria) {
        *self = std::mem::take(self).or(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(path: &str, op: &str, value: &str) -> Criteria {
        Criteria::leaf(path, op, value)
    }

    #[test]
    fn test_empty_is_identity() {
        let c = leaf("events.a", "==", "1");
        assert_eq!(Criteria::Empty.and(c.clone()), c);
        assert_eq!(c.clone().or(Criteria::Empty), c);
        assert_eq!(Criteria::all(Vec::new()), Criteria::Empty);
    }

    #[test]
    fn test_combinators_flatten() {
        let a = leaf("events.a", "==", "1");
        let b = leaf("events.b", "==", "2");
        let c = leaf("events.c", "==", "3");

        let and = a.clone() & b.clone() & c.clone();
        assert_eq!(and, Criteria::And(vec![a.clone(), b.clone(), c.clone()]));

        let mut or = Criteria::Empty;
        or |= a.clone();
        or |= b.clone() | c.clone();
        assert_eq!(or, Criteria::Or(vec![a, b, c]));
    }

    #[test]
    fn test_mixed_kinds_nest() {
        let a = leaf("events.a", "==", "1");
        let b = leaf("events.b", "==", "2");
        let c = leaf("events.c", "==", "3");

        let tree = a.clone() & (b.clone() | c.clone());
        assert_eq!(
            tree,
            Criteria::And(vec![a, Criteria::Or(vec![b, c])])
        );
    }

    #[test]
    fn test_negate_operator() {
        assert_eq!(negate_operator("=="), "!=");
        assert_eq!(negate_operator("!="), "==");
        assert_eq!(negate_operator(">="), "<");
        assert_eq!(negate_operator("<"), ">=");
        assert_eq!(negate_operator("~"), "!~");
        assert_eq!(negate_operator("!~*"), "~*");
        assert_eq!(negate_operator("<>*"), "!<>*");
    }

    #[test]
    fn test_lucene_serialization() {
        let tree = leaf("events.severity", "==", "high")
            & (leaf("events.source", "==", "internal net")
                | leaf("events.port", "<", "1")
                | leaf("events.port", ">", "1024"));

        assert_eq!(
            tree.to_query_string(QueryMode::Lucene, Some("events")),
            "severity:high AND (source:\"internal net\" OR port:{* TO 1} OR port:{1024 TO *})"
        );
    }

    #[test]
    fn test_lucene_special_leaves() {
        let render = |c: Criteria| c.to_query_string(QueryMode::Lucene, Some("events"));

        assert_eq!(render(leaf("events._raw_query", "==", "failed")), "failed");
        assert_eq!(render(leaf("events.user", "!=", "root")), "-user:root");
        assert_eq!(render(leaf("events.host", "~", "web[0-9]+")), "host:/web[0-9]+/");
        assert_eq!(render(leaf("events.url", "~", "a/b")), "url:/a\\/b/");
        assert_eq!(render(Criteria::exists("events.tag")), "tag:[* TO *]");
        assert_eq!(render(Criteria::absent("events.tag")), "-tag:[* TO *]");
        assert_eq!(render(leaf("events.port", ">=", "80")), "port:[80 TO *]");
        assert_eq!(render(leaf("events.port", "<=", "80")), "port:[* TO 80]");
    }

    #[test]
    fn test_criterion_serialization() {
        let tree = leaf("events.severity", "=", "high")
            & (Criteria::absent("events.tag") | leaf("events.port", ">=", "80"));

        assert_eq!(
            tree.to_query_string(QueryMode::Criterion, Some("events")),
            "severity = \"high\" && (!tag || port >= \"80\")"
        );
        assert_eq!(
            tree.to_string(),
            "events.severity = \"high\" && (!events.tag || events.port >= \"80\")"
        );
    }

    #[test]
    fn test_strip_prefix_requires_dot() {
        let c = leaf("eventsx.a", "==", "1");
        assert_eq!(
            c.to_query_string(QueryMode::Criterion, Some("events")),
            "eventsx.a == \"1\""
        );
    }

    #[test]
    fn test_paths() {
        let tree = leaf("events.a", "==", "1") | Criteria::exists("events.b");
        assert_eq!(tree.paths(), vec!["events.a", "events.b"]);
    }
}
