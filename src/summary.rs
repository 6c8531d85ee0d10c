//! Per-filter child counts for every built-in view

use serde::Serialize;

use crate::error::CoreResult;
use crate::gateway::CaseQueryGateway;
use crate::query::{
    build_where_clause, row_limit, DeletedContentFilter, ExtensionFilter, FileSizeFilter,
    FilterDescriptor, QueryPreferences, ScoreFilter, ViewFilter,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCount {
    pub view: String,
    pub filter: String,
    pub display_name: String,
    pub count: i64,
    /// The view hit its row ceiling; more rows exist than are shown
    pub truncated: bool,
}

/// Every built-in filter, grouped by view
pub fn builtin_filters() -> Vec<ViewFilter> {
    let mut filters: Vec<ViewFilter> = Vec::new();
    filters.extend(FileSizeFilter::ALL.iter().copied().map(ViewFilter::Size));
    filters.extend(DeletedContentFilter::ALL.iter().copied().map(ViewFilter::Deleted));
    filters.extend(ScoreFilter::ALL.iter().copied().map(ViewFilter::Score));
    filters.extend(ExtensionFilter::root_filters().into_iter().map(ViewFilter::Extension));
    filters.extend(ExtensionFilter::document_filters().into_iter().map(ViewFilter::Extension));
    filters.extend(ExtensionFilter::executable_filters().into_iter().map(ViewFilter::Extension));
    filters.push(ViewFilter::Extension(ExtensionFilter::event_logs()));
    filters
}

pub fn summarize_views(
    gateway: &dyn CaseQueryGateway,
    data_source_id: Option<i64>,
    prefs: &QueryPreferences,
) -> CoreResult<Vec<ViewCount>> {
    builtin_filters()
        .iter()
        .map(|filter| {
            let clause = build_where_clause(filter, data_source_id, prefs)?;
            let raw = gateway.count_files_where(&clause)?;
            let (count, truncated) = match row_limit(filter) {
                Some(limit) if raw >= limit as i64 => (limit as i64 - 1, true),
                _ => (raw, false),
            };
            Ok(ViewCount {
                view: filter.view_name().to_string(),
                filter: filter.name().to_string(),
                display_name: filter.display_name().to_string(),
                count,
                truncated,
            })
        })
        .collect()
}
