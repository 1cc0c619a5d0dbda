//! Search surface
//!
//! Per-datatype view over a [`DataProvider`]: the declared fields in column
//! order with their type information, the translation table and the search
//! defaults. Planners are created from a surface and borrow it.

use crate::highlight::Highlight;
use crate::provider::{DataProvider, PathExpr, PathInfo, SortOrder};
use crate::query::{
    criteria_to_urlparams, Compiler, Criteria, QueryError, QueryMode, QueryPlanner, QueryResult,
    RequestContext, SearchParams, TranslationTable,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One declared field of a datatype
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    /// Field name without the datatype prefix
    pub field: String,
    #[serde(flatten)]
    pub info: PathInfo,
    pub column_index: usize,
}

/// Field metadata and search defaults of one datatype
pub struct SearchSurface {
    datatype: String,
    label: String,
    provider: Arc<dyn DataProvider>,
    translations: TranslationTable,
    fields: Vec<FieldInfo>,
    default_mode: QueryMode,
    default_sort: String,
    time_field: String,
    default_groupby: Vec<String>,
    highlight: Highlight,
}

impl SearchSurface {
    pub fn builder(
        datatype: impl Into<String>,
        provider: Arc<dyn DataProvider>,
    ) -> SearchSurfaceBuilder {
        SearchSurfaceBuilder {
            datatype: datatype.into(),
            provider,
            translations: TranslationTable::default(),
            default_columns: Vec::new(),
            default_mode: QueryMode::default(),
            default_sort: None,
            time_field: "timestamp".to_string(),
            default_groupby: Vec::new(),
            highlight: Highlight::default(),
        }
    }

    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    /// Display name reported by the provider
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn provider(&self) -> &dyn DataProvider {
        self.provider.as_ref()
    }

    pub fn translations(&self) -> &TranslationTable {
        &self.translations
    }

    /// Declared fields in column order
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field_info(&self, field: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.field == field)
    }

    pub fn default_mode(&self) -> QueryMode {
        self.default_mode
    }

    pub fn default_sort(&self) -> &str {
        &self.default_sort
    }

    pub fn default_groupby(&self) -> &[String] {
        &self.default_groupby
    }

    pub fn highlight(&self) -> &Highlight {
        &self.highlight
    }

    /// Qualified path of `field`
    pub fn qualify(&self, field: &str) -> String {
        format!("{}.{}", self.datatype, field)
    }

    /// Qualified path of the field time windows and buckets apply to
    pub fn time_path(&self) -> String {
        self.qualify(&self.time_field)
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(&self.datatype, &self.translations)
    }

    /// Grouped retrieval paths for a non-temporal grouping field
    ///
    /// Translated fields group on every physical path. Declared fields must
    /// be groupable; anything else is an unknown path.
    pub fn group_paths(&self, field: &str) -> QueryResult<Vec<PathExpr>> {
        if let Some(translation) = self.translations.get(field) {
            return Ok(translation
                .paths
                .iter()
                .map(|p| PathExpr::field(p.as_str()).grouped())
                .collect());
        }

        match self.field_info(field) {
            Some(f) if f.info.groupable => Ok(vec![PathExpr::field(f.info.path.as_str()).grouped()]),
            Some(_) => Err(QueryError::Validation(format!(
                "field '{}' cannot be grouped",
                field
            ))),
            None => Err(QueryError::UnknownPath(field.to_string())),
        }
    }

    pub fn planner(
        &self,
        context: RequestContext,
        params: SearchParams,
    ) -> QueryResult<QueryPlanner<'_>> {
        QueryPlanner::new(self, context, params)
    }

    /// Plan one page of a listing or grouped search
    ///
    /// `page` starts at 1. The sort column applies when it names a declared
    /// field; otherwise results sort on the default sort path, newest first.
    pub fn prepare(
        &self,
        context: RequestContext,
        params: SearchParams,
        page: usize,
        rows: usize,
        sort: Option<(&str, &str)>,
    ) -> QueryResult<QueryPlanner<'_>> {
        let params = params
            .offset(page.saturating_sub(1).saturating_mul(rows))
            .limit(rows);
        let mut planner = self.planner(context, params)?;

        match sort {
            Some((field, order)) if self.field_info(field).is_some() => {
                planner.add_order(field, order)
            }
            _ => planner.add_sort(&self.default_sort, SortOrder::Desc),
        }
        Ok(planner)
    }

    /// Link parameters reproducing `criteria` as a criterion query
    pub fn criteria_to_urlparams(&self, criteria: &Criteria) -> Vec<(String, String)> {
        criteria_to_urlparams(criteria, &self.datatype)
    }
}

impl std::fmt::Debug for SearchSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSurface")
            .field("datatype", &self.datatype)
            .field("fields", &self.fields.len())
            .field("translations", &self.translations.len())
            .field("default_mode", &self.default_mode)
            .field("time_field", &self.time_field)
            .finish()
    }
}

pub struct SearchSurfaceBuilder {
    datatype: String,
    provider: Arc<dyn DataProvider>,
    translations: TranslationTable,
    default_columns: Vec<String>,
    default_mode: QueryMode,
    default_sort: Option<String>,
    time_field: String,
    default_groupby: Vec<String>,
    highlight: Highlight,
}

impl SearchSurfaceBuilder {
    pub fn translations(mut self, translations: TranslationTable) -> Self {
        self.translations = translations;
        self
    }

    /// Fields listed first, in this order
    pub fn default_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_mode(mut self, mode: QueryMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Sort field used when a request names none; defaults to the time field
    pub fn default_sort(mut self, field: impl Into<String>) -> Self {
        self.default_sort = Some(field.into());
        self
    }

    pub fn time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = field.into();
        self
    }

    pub fn default_groupby<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_groupby = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn highlight(mut self, highlight: Highlight) -> Self {
        self.highlight = highlight;
        self
    }

    /// Load field metadata from the provider
    pub fn build(self) -> QueryResult<SearchSurface> {
        let prefix = format!("{}.", self.datatype);
        let mut paths = self.provider.get_paths(&self.datatype)?;

        let rank = |path: &str| {
            let field = path.strip_prefix(&prefix).unwrap_or(path);
            self.default_columns
                .iter()
                .position(|c| c == field)
                .unwrap_or(self.default_columns.len())
        };
        paths.sort_by_key(|p| rank(p));

        let mut fields = Vec::with_capacity(paths.len());
        for (column_index, path) in paths.into_iter().enumerate() {
            let info = self.provider.get_path_info(&path)?;
            let field = path.strip_prefix(&prefix).unwrap_or(&path).to_string();
            fields.push(FieldInfo {
                field,
                info,
                column_index,
            });
        }

        debug!(
            datatype = %self.datatype,
            fields = fields.len(),
            translations = self.translations.len(),
            "Built search surface"
        );

        let label = self.provider.get_label(&self.datatype);
        let default_sort = self.default_sort.unwrap_or_else(|| self.time_field.clone());
        Ok(SearchSurface {
            datatype: self.datatype,
            label,
            provider: self.provider,
            translations: self.translations,
            fields,
            default_mode: self.default_mode,
            default_sort,
            time_field: self.time_field,
            default_groupby: self.default_groupby,
            highlight: self.highlight,
        })
    }
}
