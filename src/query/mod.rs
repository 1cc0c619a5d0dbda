//! Search Query Engine
//!
//! Compiles user queries into backend criteria and plans their execution:
//!
//! - **Parsers**: Lucene-like and criterion syntaxes
//! - **Compiler**: parse trees to [`Criteria`] over qualified paths
//! - **Planner**: retrieval paths, grouping, time buckets, memoized execution
//! - **Reconstruct**: date component columns back to timestamps
//! - **Link**: drill-down links for grouped rows
//!
//! # Query Languages
//!
//! ```text
//! lucene:     severity:high AND -source:internal port:[1 TO 1024]
//! criterion:  severity = "high" && (source != "internal" || !tag)
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use datasearch::query::{QueryPlanner, RequestContext, SearchParams};
//!
//! let params = SearchParams::new("severity:high").group_by(["day"]);
//! let mut planner = QueryPlanner::new(&surface, RequestContext::new(tz), params)?;
//! for item in planner.chart_items(planner.step())? {
//!     println!("{} {} {}", item.label, item.value, item.link.to_url("/search"));
//! }
//! ```

mod ast;
mod compiler;
mod criteria;
mod criterion;
mod error;
mod link;
mod mode;
mod parser;
mod planner;
mod reconstruct;
mod translate;

pub use ast::{
    BoolOp, FieldPath, LuceneString, Modifier, ParseNode, PathSegment, Term, UnaryOp,
};
pub use compiler::{Compiler, RAW_QUERY_FIELD};
pub use criteria::{is_negated_operator, negate_operator, Criteria};
pub use criterion::{parse_criterion, CriterionNode};
pub use error::{QueryError, QueryResult};
pub use link::{criteria_to_urlparams, format_criterion, ChartItem, DrilldownLink};
pub use mode::{criterion_value, lucene_needs_quotes, lucene_value, OperatorTable, QueryMode};
pub use parser::parse_lucene;
pub use planner::{QueryPlanner, RequestContext, SearchParams, MAX_CHART_BUCKETS};
pub use reconstruct::{datetime_from_components, rebuild_row, DatetimeRows};
pub use translate::{FieldTranslation, TranslationTable, TranslationTableBuilder, ValueTransform};
