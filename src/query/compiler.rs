//! Query compiler
//!
//! Turns a Lucene parse tree or a criterion parse tree into [`Criteria`]
//! over qualified paths (`datatype.field`).
//!
//! Lucene paths are qualified as written. Criterion paths go through the
//! translation table: a logical field expands into one leaf per physical
//! path, joined with OR for positive tests and with AND for negated ones.

use crate::query::ast::{BoolOp, LuceneString, ParseNode, Term};
use crate::query::criteria::{is_negated_operator, negate_operator, Criteria};
use crate::query::criterion::{parse_criterion, CriterionNode};
use crate::query::error::QueryResult;
use crate::query::mode::QueryMode;
use crate::query::parser::parse_lucene;
use crate::query::translate::TranslationTable;

/// Pseudo-field searched by terms without a field
pub const RAW_QUERY_FIELD: &str = "_raw_query";

/// Compiles query text for one datatype
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'a> {
    datatype: &'a str,
    translations: &'a TranslationTable,
}

impl<'a> Compiler<'a> {
    pub fn new(datatype: &'a str, translations: &'a TranslationTable) -> Self {
        Self {
            datatype,
            translations,
        }
    }

    /// Parse and compile; blank text compiles to [`Criteria::Empty`]
    pub fn compile(&self, text: &str, mode: QueryMode) -> QueryResult<Criteria> {
        if text.trim().is_empty() {
            return Ok(Criteria::Empty);
        }

        let criteria = match mode {
            QueryMode::Lucene => self.compile_lucene(&parse_lucene(text)?),
            QueryMode::Criterion => self.compile_criterion(&parse_criterion(text)?),
        };

        tracing::debug!(datatype = self.datatype, %mode, criteria = %criteria, "Compiled query");
        Ok(criteria)
    }

    pub fn compile_lucene(&self, node: &ParseNode) -> Criteria {
        match node {
            ParseNode::Bool { left, op, right } => {
                let left = self.compile_lucene(left);
                let right = self.compile_lucene(right);
                match op {
                    BoolOp::And => left.and(right),
                    BoolOp::Or => left.or(right),
                }
            }
            ParseNode::Parenthesis(inner) => self.compile_lucene(inner),
            ParseNode::Negatable { operator, body } => {
                let negated = operator.map_or(false, |op| op.is_negation());
                self.compile_term(body, negated)
            }
        }
    }

    fn lucene_path(&self, term: &Term) -> String {
        match term.field() {
            Some(field) => format!("{}.{}", self.datatype, field),
            None => format!("{}.{}", self.datatype, RAW_QUERY_FIELD),
        }
    }

    fn compile_term(&self, term: &Term, negated: bool) -> Criteria {
        let path = self.lucene_path(term);

        match term {
            Term::Fielded { value, .. } if negated && value.is_empty_text() => {
                Criteria::absent(path)
            }
            Term::Fielded { value, .. } => {
                let (operator, value) = match value {
                    LuceneString::Regex(pattern) => ("~", pattern.clone()),
                    bare if bare.has_wildcard() => ("~", bare.glob_regex()),
                    other => ("==", other.text().into_owned()),
                };
                let operator = if negated {
                    negate_operator(operator)
                } else {
                    operator.to_string()
                };
                Criteria::leaf(path, operator, value)
            }
            Term::InclusiveRange { low, high, .. } => {
                compile_range(path, low, high, (">=", "<="), negated)
            }
            Term::ExclusiveRange { low, high, .. } => {
                compile_range(path, low, high, (">", "<"), negated)
            }
        }
    }

    pub fn compile_criterion(&self, node: &CriterionNode) -> Criteria {
        match node {
            CriterionNode::Compare {
                path,
                operator,
                value,
            } => self.compile_leaf(path, operator, value.as_deref()),
            CriterionNode::And(left, right) => {
                self.compile_criterion(left).and(self.compile_criterion(right))
            }
            CriterionNode::Or(left, right) => {
                self.compile_criterion(left).or(self.compile_criterion(right))
            }
        }
    }

    /// Resolve a logical field and build leaves over its physical paths
    pub fn compile_leaf(&self, field: &str, operator: &str, value: Option<&str>) -> Criteria {
        let Some(translation) = self.translations.get(field) else {
            return Criteria::leaf_opt(
                format!("{}.{}", self.datatype, field),
                operator,
                value.map(str::to_string),
            );
        };

        let value = value.map(|v| translation.transform(v));
        let leaves = translation
            .paths
            .iter()
            .map(|path| Criteria::leaf_opt(path.as_str(), operator, value.clone()));

        // a negated test must hold on every physical path
        if is_negated_operator(operator) {
            Criteria::all(leaves)
        } else {
            Criteria::any(leaves)
        }
    }
}

/// Bounds become comparison leaves; a `*` bound drops its side
fn compile_range(
    path: String,
    low: &LuceneString,
    high: &LuceneString,
    (low_op, high_op): (&str, &str),
    negated: bool,
) -> Criteria {
    let bounds = [(low_op, low), (high_op, high)];
    let leaves: Vec<Criteria> = bounds
        .into_iter()
        .filter(|(_, bound)| !bound.is_open_bound())
        .map(|(op, bound)| {
            let op = if negated {
                negate_operator(op)
            } else {
                op.to_string()
            };
            Criteria::leaf(path.as_str(), op, bound.text().into_owned())
        })
        .collect();

    match (leaves.is_empty(), negated) {
        (true, false) => Criteria::exists(path),
        (true, true) => Criteria::absent(path),
        (false, false) => Criteria::all(leaves),
        (false, true) => Criteria::any(leaves),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::translate::{FieldTranslation, ValueTransform};

    fn leaf(path: &str, op: &str, value: &str) -> Criteria {
        Criteria::leaf(path, op, value)
    }

    fn compile(text: &str, mode: QueryMode) -> Criteria {
        let table = TranslationTable::default();
        Compiler::new("events", &table).compile(text, mode).unwrap()
    }

    #[test]
    fn test_blank_query_is_empty() {
        assert_eq!(compile("", QueryMode::Lucene), Criteria::Empty);
        assert_eq!(compile("   ", QueryMode::Criterion), Criteria::Empty);
    }

    #[test]
    fn test_lucene_default_field() {
        assert_eq!(
            compile("failed", QueryMode::Lucene),
            leaf("events._raw_query", "==", "failed")
        );
    }

    #[test]
    fn test_lucene_and_with_negation() {
        assert_eq!(
            compile("severity:high AND -source:internal", QueryMode::Lucene),
            Criteria::And(vec![
                leaf("events.severity", "==", "high"),
                leaf("events.source", "!=", "internal"),
            ])
        );
        assert_eq!(
            compile("NOT a:1 !b:2 +c:3", QueryMode::Lucene),
            Criteria::And(vec![
                leaf("events.a", "!=", "1"),
                leaf("events.b", "!=", "2"),
                leaf("events.c", "==", "3"),
            ])
        );
    }

    #[test]
    fn test_lucene_ranges() {
        assert_eq!(
            compile("port:[1 TO 1024]", QueryMode::Lucene),
            Criteria::And(vec![
                leaf("events.port", ">=", "1"),
                leaf("events.port", "<=", "1024"),
            ])
        );
        assert_eq!(
            compile("port:{* TO 80}", QueryMode::Lucene),
            leaf("events.port", "<", "80")
        );
        assert_eq!(
            compile("-port:[1 TO 1024]", QueryMode::Lucene),
            Criteria::Or(vec![
                leaf("events.port", "<", "1"),
                leaf("events.port", ">", "1024"),
            ])
        );
        assert_eq!(
            compile("tag:[* TO *]", QueryMode::Lucene),
            Criteria::exists("events.tag")
        );
        assert_eq!(
            compile("-tag:[* TO *]", QueryMode::Lucene),
            Criteria::absent("events.tag")
        );
    }

    #[test]
    fn test_lucene_regex_and_wildcards() {
        assert_eq!(
            compile("host:/web[0-9]+/", QueryMode::Lucene),
            leaf("events.host", "~", "web[0-9]+")
        );
        assert_eq!(
            compile("-host:web*", QueryMode::Lucene),
            leaf("events.host", "!~", "^web.*$")
        );
        assert_eq!(
            compile("host:\"web*\"", QueryMode::Lucene),
            leaf("events.host", "==", "web*")
        );
    }

    #[test]
    fn test_lucene_modifiers_are_ignored() {
        assert_eq!(
            compile("title:rust^3", QueryMode::Lucene),
            leaf("events.title", "==", "rust")
        );
    }

    #[test]
    fn test_lucene_negated_empty_value_is_absent() {
        assert_eq!(compile("-msg:\"\"", QueryMode::Lucene), Criteria::absent("events.msg"));
        assert_eq!(compile("NOT msg:''", QueryMode::Lucene), Criteria::absent("events.msg"));
        // a positive empty value stays a literal equality
        assert_eq!(compile("msg:\"\"", QueryMode::Lucene), leaf("events.msg", "==", ""));
        assert_eq!(compile("-msg://", QueryMode::Lucene), leaf("events.msg", "!~", ""));
    }

    #[test]
    fn test_lucene_round_trip() {
        for query in [
            "msg:\"AND\" OR \"OR\"",
            "\"NOT\" AND x:1",
            "-msg:\"\" a:1 AND(b:2)",
            "severity:high AND (source:\"internal net\" OR -port:[1 TO 1024])",
            "failed OR -user:root",
            "port:{10 TO *} host:/a\\/b/ -tag:[* TO *]",
        ] {
            let compiled = compile(query, QueryMode::Lucene);
            let text = compiled.to_query_string(QueryMode::Lucene, Some("events"));
            assert_eq!(compile(&text, QueryMode::Lucene), compiled, "{}", text);
        }
    }

    #[test]
    fn test_criterion_untranslated() {
        assert_eq!(
            compile("severity = \"high\" && source != \"internal\"", QueryMode::Criterion),
            Criteria::And(vec![
                leaf("events.severity", "=", "high"),
                leaf("events.source", "!=", "internal"),
            ])
        );
        assert_eq!(
            compile("!tag || port > 10", QueryMode::Criterion),
            Criteria::Or(vec![Criteria::absent("events.tag"), leaf("events.port", ">", "10")])
        );
    }

    #[test]
    fn test_criterion_round_trip() {
        let query = "(a = \"x y\" || !b) && c >= \"3\"";
        let compiled = compile(query, QueryMode::Criterion);
        let text = compiled.to_query_string(QueryMode::Criterion, Some("events"));
        assert_eq!(compile(&text, QueryMode::Criterion), compiled);
    }

    #[test]
    fn test_translation_expands_paths() {
        let table = TranslationTable::builder()
            .translate(
                "source",
                FieldTranslation::new(["events.src_ip", "events.src_host"])
                    .with_transform(ValueTransform::builtin("lowercase").unwrap()),
            )
            .build();
        let compiler = Compiler::new("events", &table);

        assert_eq!(
            compiler.compile("source = \"WEB\"", QueryMode::Criterion).unwrap(),
            Criteria::Or(vec![
                leaf("events.src_ip", "=", "web"),
                leaf("events.src_host", "=", "web"),
            ])
        );
        assert_eq!(
            compiler.compile("source != \"WEB\"", QueryMode::Criterion).unwrap(),
            Criteria::And(vec![
                leaf("events.src_ip", "!=", "web"),
                leaf("events.src_host", "!=", "web"),
            ])
        );
        assert_eq!(
            compiler.compile("!source", QueryMode::Criterion).unwrap(),
            Criteria::And(vec![
                Criteria::absent("events.src_ip"),
                Criteria::absent("events.src_host"),
            ])
        );
    }

    #[test]
    fn test_syntax_errors_propagate() {
        let table = TranslationTable::default();
        let compiler = Compiler::new("events", &table);
        assert!(compiler.compile("a:(b", QueryMode::Lucene).is_err());
        assert!(compiler.compile("a = ", QueryMode::Criterion).is_err());
    }
}
