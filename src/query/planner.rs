//! Query planner
//!
//! Assembles everything a provider needs for one search request:
//!
//! - the compiled user criteria, AND-ed with the ambient time window
//! - the retrieval paths: every declared field for listings, or a count plus
//!   grouping paths for aggregate queries
//! - a time bucket cascade (year down to the requested unit) when grouping
//!   by a temporal unit
//!
//! # Execution
//!
//! ```text
//! SearchParams + RequestContext → plan → DataProvider::execute → [reconstruct] → ResultSet
//! ```
//!
//! Execution is lazy and happens at most once per planner.

use crate::provider::{PathExpr, PathSource, QueryRequest, ResultSet, SortOrder};
use crate::query::criteria::Criteria;
use crate::query::error::{QueryError, QueryResult};
use crate::query::mode::QueryMode;
use crate::query::reconstruct::DatetimeRows;
use crate::surface::SearchSurface;
use crate::time::{Step, TimeRange, TimeUnit, UserTimezone};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Most buckets a chart is split into when no time unit is requested
pub const MAX_CHART_BUCKETS: i64 = 100;

/// Request state that is not part of the query text
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    /// Timezone used for bucketing and displayed timestamps
    pub timezone: UserTimezone,
    /// Active time window, if the caller narrowed one
    pub window: Option<TimeRange>,
    /// Caller parameters carried over to drill-down links
    pub menu_params: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new(timezone: impl Into<UserTimezone>) -> Self {
        Self {
            timezone: timezone.into(),
            window: None,
            menu_params: Vec::new(),
        }
    }

    pub fn with_window(mut self, window: TimeRange) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_menu_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.menu_params.push((key.into(), value.into()));
        self
    }

    /// Criteria restricting `time_path` to the window; empty without one
    pub fn ambient_criteria(&self, time_path: &str) -> Criteria {
        let Some(window) = self.window else {
            return Criteria::Empty;
        };

        let bounds = [
            (">=", window.start_in(&self.timezone)),
            ("<", window.end_in(&self.timezone)),
        ];
        Criteria::all(bounds.into_iter().filter_map(|(op, instant)| {
            instant.map(|dt| Criteria::leaf(time_path, op, dt.to_rfc3339()))
        }))
    }

    /// Bucket width for charts over the window
    pub fn step(&self) -> Step {
        match &self.window {
            Some(window) => Step::for_range(window, MAX_CHART_BUCKETS),
            None => Step::new(TimeUnit::Day, 1),
        }
    }

    /// Parameters describing this context in a URL
    pub fn url_parameters(&self) -> Vec<(String, String)> {
        let mut params = self.menu_params.clone();
        if let Some(window) = self.window {
            params.push(("timeline_mode".to_string(), "custom".to_string()));
            params.push(("timeline_start".to_string(), (window.start / 1000).to_string()));
            params.push(("timeline_end".to_string(), (window.end / 1000).to_string()));
        }
        params
    }
}

/// User-editable search parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub query: String,
    /// Defaults to the surface's mode
    pub query_mode: Option<QueryMode>,
    /// Grouping fields; temporal unit names select time buckets
    pub groupby: Vec<String>,
    pub offset: usize,
    /// `None` means unlimited
    pub limit: Option<usize>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.query_mode = Some(mode);
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groupby = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One planned search
pub struct QueryPlanner<'s> {
    id: Uuid,
    surface: &'s SearchSurface,
    context: RequestContext,
    query: String,
    mode: QueryMode,
    criteria: Criteria,
    all_criteria: Criteria,
    groupby: Vec<String>,
    /// Result columns taken by each grouping field
    group_widths: Vec<usize>,
    time_group: Option<TimeUnit>,
    paths: Vec<PathExpr>,
    offset: usize,
    limit: Option<usize>,
    date_selection_index: Option<usize>,
    result: Option<ResultSet>,
}

impl<'s> QueryPlanner<'s> {
    pub fn new(
        surface: &'s SearchSurface,
        context: RequestContext,
        params: SearchParams,
    ) -> QueryResult<Self> {
        let mode = params.query_mode.unwrap_or(surface.default_mode());
        let criteria = surface.compiler().compile(&params.query, mode)?;
        let all_criteria = criteria
            .clone()
            .and(context.ambient_criteria(&surface.time_path()));

        let mut planner = Self {
            id: Uuid::new_v4(),
            surface,
            context,
            query: params.query,
            mode,
            criteria,
            all_criteria,
            groupby: Vec::new(),
            group_widths: Vec::new(),
            time_group: None,
            paths: Vec::new(),
            offset: params.offset,
            limit: params.limit,
            date_selection_index: None,
            result: None,
        };

        let mut groupby: Vec<String> = Vec::new();
        for field in params.groupby {
            if !groupby.contains(&field) {
                groupby.push(field);
            }
        }

        if groupby.is_empty() {
            planner.paths = surface
                .fields()
                .iter()
                .map(|f| PathExpr::field(surface.qualify(&f.field)))
                .collect();
        } else {
            planner.prepare_groupby(groupby)?;
        }

        debug!(
            request_id = %planner.id,
            datatype = surface.datatype(),
            paths = planner.paths.len(),
            criteria = %planner.all_criteria,
            "Planned query"
        );
        Ok(planner)
    }

    fn prepare_groupby(&mut self, groupby: Vec<String>) -> QueryResult<()> {
        let surface = self.surface;
        let (temporal, fields): (Vec<String>, Vec<String>) =
            groupby.into_iter().partition(|f| TimeUnit::is_temporal(f));

        if temporal.len() > 1 {
            return Err(QueryError::Validation(format!(
                "only one time unit can be used for grouping, got: {}",
                temporal.join(", ")
            )));
        }

        self.paths = vec![PathExpr::count()];
        for field in &fields {
            let paths = surface.group_paths(field)?;
            self.group_widths.push(paths.len());
            self.paths.extend(paths);
        }

        match temporal.first().and_then(|name| TimeUnit::from_str(name)) {
            None => self.paths[0].order = Some(SortOrder::Desc),
            Some(unit) => {
                self.time_group = Some(unit);
                self.date_selection_index = Some(self.paths.len());
                self.paths.extend(self.time_selection(unit));
                self.group_widths.push(1);
            }
        }

        self.groupby = fields;
        self.groupby.extend(temporal);
        Ok(())
    }

    /// Truncation paths from year down to `unit`, grouped and ascending
    fn time_selection(&self, unit: TimeUnit) -> Vec<PathExpr> {
        let time_path = self.surface.time_path();
        unit.cascade()
            .map(|u| {
                PathExpr::truncated(time_path.as_str(), self.context.timezone, u)
                    .grouped()
                    .ordered(SortOrder::Asc)
            })
            .collect()
    }

    /// Order by `field`; only `asc` and `desc` are honoured
    pub fn add_order(&mut self, field: &str, order: &str) {
        match SortOrder::from_str(order) {
            Some(order) => self.add_sort(field, order),
            None => warn!(request_id = %self.id, field, order, "Ignoring invalid sort order"),
        }
    }

    pub fn add_sort(&mut self, field: &str, order: SortOrder) {
        if self.result.is_some() {
            warn!(request_id = %self.id, field, "Query already executed, ignoring sort");
            return;
        }

        let path = self.surface.qualify(field);
        let target = self
            .paths
            .iter_mut()
            .find(|p| matches!(&p.source, PathSource::Field(f) if *f == path));

        match target {
            Some(p) => p.order = Some(order),
            None => debug!(request_id = %self.id, field, "Sort field is not retrieved"),
        }
    }

    /// Execute on first call, then return the same result
    pub fn get_result(&mut self) -> QueryResult<&mut ResultSet> {
        let results = match self.result.take() {
            Some(results) => results,
            None => self.execute()?,
        };
        Ok(self.result.insert(results))
    }

    fn execute(&self) -> QueryResult<ResultSet> {
        let aggregate = self.is_aggregate();
        let highlight = if aggregate || self.criteria.is_empty() {
            None
        } else {
            Some(self.surface.highlight())
        };

        let request = QueryRequest {
            datatype: self.surface.datatype(),
            paths: &self.paths,
            criteria: &self.all_criteria,
            limit: self.limit,
            offset: self.offset,
            aggregate,
            highlight,
        };

        let start = Instant::now();
        let results = self.surface.provider().execute(&request)?;
        info!(
            request_id = %self.id,
            datatype = request.datatype,
            aggregate,
            total = results.total(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Executed query"
        );

        Ok(match self.date_selection_index {
            Some(index) => DatetimeRows::wrap(results, index, self.context.timezone),
            None => results,
        })
    }

    /// Bucket width of the chart this query draws
    pub fn step(&self) -> Step {
        match self.time_group {
            Some(unit) => Step::new(unit, 1),
            None => self.context.step(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn surface(&self) -> &'s SearchSurface {
        self.surface
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Compiled user criteria, without the time window
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Criteria sent to the provider
    pub fn all_criteria(&self) -> &Criteria {
        &self.all_criteria
    }

    pub fn paths(&self) -> &[PathExpr] {
        &self.paths
    }

    /// Grouping fields, non-temporal first
    pub fn groupby(&self) -> &[String] {
        &self.groupby
    }

    pub(crate) fn group_widths(&self) -> &[usize] {
        &self.group_widths
    }

    pub fn time_group(&self) -> Option<TimeUnit> {
        self.time_group
    }

    pub fn date_selection_index(&self) -> Option<usize> {
        self.date_selection_index
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_aggregate(&self) -> bool {
        !self.groupby.is_empty()
    }
}

impl std::fmt::Debug for QueryPlanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlanner")
            .field("id", &self.id)
            .field("datatype", &self.surface.datatype())
            .field("query", &self.query)
            .field("mode", &self.mode)
            .field("groupby", &self.groupby)
            .field("executed", &self.result.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        DataProvider, Dataset, FieldType, MemoryProvider, PathInfo, ProviderResult, Row, Value,
    };
    use crate::query::translate::{FieldTranslation, TranslationTable};
    use crate::time::{parse_timezone, UserTimezone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn utc() -> UserTimezone {
        parse_timezone("UTC").unwrap()
    }

    fn dataset() -> Dataset {
        let at = |d: u32, h: u32| Value::DateTime(utc().with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap());
        Dataset::new()
            .with_field("timestamp", FieldType::DateTime)
            .with_field("severity", FieldType::Text)
            .with_field("message", FieldType::Text)
            .with_field("raw", FieldType::Object)
            .record([
                ("timestamp", at(1, 10)),
                ("severity", Value::from("high")),
                ("message", Value::from("login failed")),
            ])
            .record([
                ("timestamp", at(1, 11)),
                ("severity", Value::from("low")),
                ("message", Value::from("login ok")),
            ])
            .record([
                ("timestamp", at(2, 9)),
                ("severity", Value::from("high")),
                ("message", Value::from("disk failed")),
            ])
    }

    fn surface() -> SearchSurface {
        let provider = MemoryProvider::new().with_dataset("events", dataset());
        SearchSurface::builder("events", Arc::new(provider))
            .translations(
                TranslationTable::builder()
                    .translate("level", FieldTranslation::new(["events.severity"]))
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn context() -> RequestContext {
        RequestContext::new(utc())
    }

    #[test]
    fn test_listing_paths_cover_all_fields() {
        let surface = surface();
        let planner = QueryPlanner::new(&surface, context(), SearchParams::new("")).unwrap();

        let paths: Vec<String> = planner.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            paths,
            vec!["events.timestamp", "events.severity", "events.message", "events.raw"]
        );
        assert!(!planner.is_aggregate());
        assert_eq!(planner.criteria(), &Criteria::Empty);
    }

    #[test]
    fn test_groupby_paths() {
        let surface = surface();
        let params = SearchParams::new("").group_by(["severity", "severity"]);
        let planner = QueryPlanner::new(&surface, context(), params).unwrap();

        let paths: Vec<String> = planner.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["count(1)/order_desc", "events.severity/group_by"]);
        assert_eq!(planner.groupby(), ["severity"]);
        assert_eq!(planner.date_selection_index(), None);
    }

    #[test]
    fn test_translated_groupby_uses_physical_paths() {
        let surface = surface();
        let params = SearchParams::new("").group_by(["level"]);
        let planner = QueryPlanner::new(&surface, context(), params).unwrap();

        assert_eq!(planner.paths()[1].to_string(), "events.severity/group_by");
    }

    #[test]
    fn test_time_groupby_cascade() {
        let surface = surface();
        let tz = parse_timezone("+02:00").unwrap();
        let params = SearchParams::new("").group_by(["day", "severity"]);
        let planner = QueryPlanner::new(&surface, RequestContext::new(tz), params).unwrap();

        let paths: Vec<String> = planner.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "count(1)",
                "events.severity/group_by",
                "timezone(events.timestamp, '+02:00'):year/order_asc,group_by",
                "timezone(events.timestamp, '+02:00'):month/order_asc,group_by",
                "timezone(events.timestamp, '+02:00'):mday/order_asc,group_by",
            ]
        );
        assert_eq!(planner.groupby(), ["severity", "day"]);
        assert_eq!(planner.date_selection_index(), Some(2));
        assert_eq!(planner.time_group(), Some(TimeUnit::Day));
        assert_eq!(planner.step(), Step::new(TimeUnit::Day, 1));
    }

    #[test]
    fn test_two_time_units_rejected() {
        let surface = surface();
        let params = SearchParams::new("").group_by(["day", "hour"]);
        let err = QueryPlanner::new(&surface, context(), params).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_unknown_and_ungroupable_fields() {
        let surface = surface();

        let params = SearchParams::new("").group_by(["nope"]);
        let err = QueryPlanner::new(&surface, context(), params).unwrap_err();
        assert!(matches!(err, QueryError::UnknownPath(ref f) if f == "nope"));

        let params = SearchParams::new("").group_by(["raw"]);
        let err = QueryPlanner::new(&surface, context(), params).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_syntax_error_surfaces() {
        let surface = surface();
        let err = QueryPlanner::new(&surface, context(), SearchParams::new("a:(b")).unwrap_err();
        assert!(matches!(err, QueryError::Syntax(_)));
    }

    #[test]
    fn test_ambient_window_criteria() {
        let surface = surface();
        let start = utc().with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = utc().with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let ctx = context().with_window(TimeRange::between(&start, &end).unwrap());

        let planner = QueryPlanner::new(&surface, ctx, SearchParams::new("severity:high")).unwrap();
        assert_eq!(
            planner.all_criteria(),
            &Criteria::And(vec![
                Criteria::leaf("events.severity", "==", "high"),
                Criteria::leaf("events.timestamp", ">=", "2024-03-01T00:00:00+00:00"),
                Criteria::leaf("events.timestamp", "<", "2024-03-02T00:00:00+00:00"),
            ])
        );
        assert_eq!(
            planner.criteria(),
            &Criteria::leaf("events.severity", "==", "high")
        );
    }

    #[test]
    fn test_add_order_is_strict() {
        let surface = surface();
        let mut planner = QueryPlanner::new(&surface, context(), SearchParams::new("")).unwrap();

        planner.add_order("severity", "asc, desc");
        assert!(planner.paths().iter().all(|p| p.order.is_none()));

        planner.add_order("severity", "asc");
        assert_eq!(planner.paths()[1].order, Some(SortOrder::Asc));
    }

    #[test]
    fn test_grouped_result_reconstructs_dates() {
        let surface = surface();
        let params = SearchParams::new("").group_by(["day"]);
        let mut planner = QueryPlanner::new(&surface, context(), params).unwrap();

        let results = planner.get_result().unwrap();
        assert_eq!(results.total(), 2);
        let rows: Vec<Row> = results.collect::<ProviderResult<_>>().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![
                    Value::Integer(2),
                    Value::DateTime(utc().with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
                ],
                vec![
                    Value::Integer(1),
                    Value::DateTime(utc().with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
                ],
            ]
        );
    }

    #[test]
    fn test_minute_grouping_reconstructs_time_of_day() {
        let surface = surface();
        let params = SearchParams::new("").group_by(["minute"]);
        let mut planner = QueryPlanner::new(&surface, context(), params).unwrap();

        let paths: Vec<String> = planner.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths.len(), 6);
        assert_eq!(paths[5], "timezone(events.timestamp, 'UTC'):min/order_asc,group_by");
        assert_eq!(planner.step(), Step::new(TimeUnit::Minute, 1));

        let rows: Vec<Row> = planner
            .get_result()
            .unwrap()
            .collect::<ProviderResult<_>>()
            .unwrap();
        let stamps: Vec<String> = rows
            .iter()
            .map(|row| row[1].as_datetime().unwrap().to_rfc3339())
            .collect();
        assert_eq!(
            stamps,
            vec![
                "2024-03-01T10:00:00+00:00",
                "2024-03-01T11:00:00+00:00",
                "2024-03-02T09:00:00+00:00",
            ]
        );
    }

    #[test]
    fn test_day_buckets_follow_named_timezone() {
        let at = |m: u32, d: u32, h: u32| {
            Value::DateTime(utc().with_ymd_and_hms(2024, m, d, h, 0, 0).unwrap())
        };
        let dataset = Dataset::new()
            .with_field("timestamp", FieldType::DateTime)
            // 23:30 in Paris, winter then summer time
            .record([("timestamp", at(1, 15, 22))])
            .record([("timestamp", at(7, 15, 21))]);
        let provider = MemoryProvider::new().with_dataset("events", dataset);
        let surface = SearchSurface::builder("events", Arc::new(provider)).build().unwrap();

        let paris = parse_timezone("Europe/Paris").unwrap();
        let params = SearchParams::new("").group_by(["day"]);
        let mut planner = QueryPlanner::new(&surface, RequestContext::new(paris), params).unwrap();

        let rows: Vec<Row> = planner
            .get_result()
            .unwrap()
            .collect::<ProviderResult<_>>()
            .unwrap();
        let days: Vec<String> = rows
            .iter()
            .map(|row| row[1].as_datetime().unwrap().to_rfc3339())
            .collect();
        assert_eq!(
            days,
            vec!["2024-01-15T00:00:00+01:00", "2024-07-15T00:00:00+02:00"]
        );
    }

    struct CountingProvider {
        inner: MemoryProvider,
        calls: AtomicUsize,
        highlighted: AtomicUsize,
    }

    impl DataProvider for CountingProvider {
        fn execute(&self, request: &QueryRequest<'_>) -> ProviderResult<ResultSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.highlight.is_some() {
                self.highlighted.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.execute(request)
        }

        fn get_paths(&self, datatype: &str) -> ProviderResult<Vec<String>> {
            self.inner.get_paths(datatype)
        }

        fn get_path_info(&self, path: &str) -> ProviderResult<PathInfo> {
            self.inner.get_path_info(path)
        }
    }

    #[test]
    fn test_result_is_memoized() {
        let provider = Arc::new(CountingProvider {
            inner: MemoryProvider::new().with_dataset("events", dataset()),
            calls: AtomicUsize::new(0),
            highlighted: AtomicUsize::new(0),
        });
        let surface = SearchSurface::builder("events", provider.clone()).build().unwrap();

        let mut planner =
            QueryPlanner::new(&surface, context(), SearchParams::new("failed")).unwrap();
        assert_eq!(planner.get_result().unwrap().total(), 2);
        assert_eq!(planner.get_result().unwrap().total(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.highlighted.load(Ordering::SeqCst), 1);

        // sorting after execution has no effect
        planner.add_order("severity", "asc");
        assert!(planner.paths().iter().all(|p| p.order.is_none()));
    }

    #[test]
    fn test_no_highlight_without_criteria_or_when_grouped() {
        let provider = Arc::new(CountingProvider {
            inner: MemoryProvider::new().with_dataset("events", dataset()),
            calls: AtomicUsize::new(0),
            highlighted: AtomicUsize::new(0),
        });
        let surface = SearchSurface::builder("events", provider.clone()).build().unwrap();

        let mut planner = QueryPlanner::new(&surface, context(), SearchParams::new("")).unwrap();
        planner.get_result().unwrap();

        let params = SearchParams::new("failed").group_by(["severity"]);
        let mut planner = QueryPlanner::new(&surface, context(), params).unwrap();
        planner.get_result().unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.highlighted.load(Ordering::SeqCst), 0);
    }
}
