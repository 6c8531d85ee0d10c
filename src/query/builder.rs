//! WHERE-clause construction for the content views
//!
//! Every function here is pure: the same filter, data source and preferences
//! always produce the same bytes. Views store the clause they were built with
//! and use it for both the count and the fetch.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::tsk;

use super::filters::{
    DeletedContentFilter, ExtensionFilter, FileSizeFilter, FilterDescriptor, MimeTypeFilter,
    ScoreFilter, ViewFilter,
};

/// Rows requested from the database for deleted content views.
/// One more than is displayed so an overflow can be detected.
pub const DELETED_CONTENT_QUERY_LIMIT: usize = 10_001;

/// Rows actually shown for deleted content views
pub const DELETED_CONTENT_DISPLAY_LIMIT: usize = DELETED_CONTENT_QUERY_LIMIT - 1;

/// The preference flags a clause can honor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryPreferences {
    pub hide_known_files: bool,
    pub hide_slack_files: bool,
}

/// Build the WHERE clause for a view filter.
///
/// `data_source_id` of `None` or `Some(0)` leaves the clause unscoped; a
/// negative id is a configuration error.
pub fn build_where_clause(
    filter: &ViewFilter,
    data_source_id: Option<i64>,
    prefs: &QueryPreferences,
) -> CoreResult<String> {
    let data_source_id = validate_data_source(data_source_id)?;

    let mut clause = match filter {
        ViewFilter::Size(f) => size_criteria(*f),
        ViewFilter::Deleted(f) => deleted_criteria(*f),
        ViewFilter::Score(f) => score_criteria(*f),
        ViewFilter::Extension(f) => extension_criteria(f)?,
        ViewFilter::MimeType(f) => mime_criteria(f)?,
    };

    let supports_known = !matches!(filter, ViewFilter::Score(_));
    let supports_slack = matches!(
        filter,
        ViewFilter::Size(_) | ViewFilter::Extension(_) | ViewFilter::MimeType(_)
    );

    if supports_known && prefs.hide_known_files {
        clause.push_str(&format!(
            " AND (known IS NULL OR known != {})",
            tsk::KNOWN_KNOWN
        ));
    }
    if supports_slack && prefs.hide_slack_files {
        clause.push_str(&format!(" AND (type != {})", tsk::FILE_TYPE_SLACK));
    }
    if let Some(ds) = data_source_id {
        clause.push_str(&format!(" AND data_source_obj_id = {}", ds));
    }
    if let Some(limit) = row_limit(filter) {
        clause.push_str(&format!(" LIMIT {}", limit));
    }

    Ok(clause)
}

/// Row ceiling baked into the clause, if the view has one
pub fn row_limit(filter: &ViewFilter) -> Option<usize> {
    match filter {
        ViewFilter::Deleted(_) => Some(DELETED_CONTENT_QUERY_LIMIT),
        _ => None,
    }
}

fn validate_data_source(data_source_id: Option<i64>) -> CoreResult<Option<i64>> {
    match data_source_id {
        Some(ds) if ds < 0 => Err(CoreError::Configuration(format!(
            "Data source id must be greater than 0 or absent, got {}",
            ds
        ))),
        Some(0) | None => Ok(None),
        Some(ds) => Ok(Some(ds)),
    }
}

fn size_criteria(filter: FileSizeFilter) -> String {
    let range = match filter.bounds() {
        (low, Some(high)) => format!("(size >= {} AND size < {})", low, high),
        (low, None) => format!("(size >= {})", low),
    };
    // unallocated block files are never listed by size
    format!("{} AND (type != {})", range, tsk::FILE_TYPE_UNALLOC_BLOCKS)
}

fn deleted_criteria(filter: DeletedContentFilter) -> String {
    match filter {
        DeletedContentFilter::FsDeleted => format!(
            "(dir_flags = {} AND meta_flags != {} AND type = {})",
            tsk::NAME_FLAG_UNALLOC,
            tsk::META_FLAG_ORPHAN,
            tsk::FILE_TYPE_FS
        ),
        DeletedContentFilter::AllDeleted => format!(
            "(((dir_flags = {} OR meta_flags = {}) AND type = {}) OR type = {})",
            tsk::NAME_FLAG_UNALLOC,
            tsk::META_FLAG_ORPHAN,
            tsk::FILE_TYPE_FS,
            tsk::FILE_TYPE_CARVED
        ),
    }
}

fn score_criteria(filter: ScoreFilter) -> String {
    let significance = match filter {
        ScoreFilter::BadItems => tsk::SIGNIFICANCE_NOTABLE,
        ScoreFilter::SuspiciousItems => tsk::SIGNIFICANCE_LIKELY_NOTABLE,
    };
    format!(
        "obj_id IN (SELECT tsk_aggregate_score.obj_id FROM tsk_aggregate_score \
         WHERE tsk_aggregate_score.significance = {} \
         AND (tsk_aggregate_score.priority = {} OR tsk_aggregate_score.priority = {}))",
        significance,
        tsk::PRIORITY_NORMAL,
        tsk::PRIORITY_OVERRIDE
    )
}

fn extension_criteria(filter: &ExtensionFilter) -> CoreResult<String> {
    if filter.extensions().is_empty() {
        return Err(CoreError::Configuration(format!(
            "Extension filter {} has no extensions",
            filter.name()
        )));
    }
    let list = filter
        .extensions()
        .iter()
        .map(|ext| {
            let bare = ext.strip_prefix('.').unwrap_or(ext).to_lowercase();
            sql_quote(&bare)
        })
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "(dir_type = {}) AND (extension IN ({}))",
        tsk::NAME_TYPE_REG,
        list
    ))
}

fn mime_criteria(filter: &MimeTypeFilter) -> CoreResult<String> {
    let types = filter.mime_types();
    if types.is_empty() {
        return Err(CoreError::Configuration(format!(
            "MIME filter {} has no subtypes",
            filter.name()
        )));
    }
    let list = types
        .iter()
        .map(|t| sql_quote(t))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("(mime_type IN ({}))", list))
}

// =============================================================================
// Blackboard attribute queries
// =============================================================================

const ATTRIBUTE_COLUMNS: &str = "blackboard_attributes.value_text, blackboard_attributes.value_int32, \
     blackboard_attributes.artifact_id, blackboard_attributes.attribute_type_id";

/// Set-name attributes of every artifact of one type (hash set hits,
/// interesting item hits)
pub fn set_name_attributes_query(
    artifact_type_id: i32,
    data_source_id: Option<i64>,
) -> CoreResult<String> {
    artifact_attribute_query(artifact_type_id, tsk::ATTRIBUTE_SET_NAME, data_source_id)
}

/// Path attributes of every email message, used to group them by account
/// and folder
pub fn email_path_attributes_query(data_source_id: Option<i64>) -> CoreResult<String> {
    artifact_attribute_query(tsk::ARTIFACT_EMAIL_MSG, tsk::ATTRIBUTE_PATH, data_source_id)
}

fn artifact_attribute_query(
    artifact_type_id: i32,
    attribute_type_id: i32,
    data_source_id: Option<i64>,
) -> CoreResult<String> {
    let data_source_id = validate_data_source(data_source_id)?;
    let mut query = format!(
        "SELECT {} FROM blackboard_attributes, blackboard_artifacts \
         WHERE blackboard_attributes.artifact_id = blackboard_artifacts.artifact_id \
         AND blackboard_artifacts.artifact_type_id = {} \
         AND blackboard_attributes.attribute_type_id = {}",
        ATTRIBUTE_COLUMNS, artifact_type_id, attribute_type_id
    );
    if let Some(ds) = data_source_id {
        query.push_str(&format!(" AND blackboard_artifacts.data_source_obj_id = {}", ds));
    }
    Ok(query)
}

/// Attributes needed to group keyword hits by list, keyword and instance
pub fn keyword_attributes_query(data_source_id: Option<i64>) -> CoreResult<String> {
    let data_source_id = validate_data_source(data_source_id)?;
    let mut query = format!(
        "SELECT {} FROM blackboard_attributes, blackboard_artifacts \
         WHERE blackboard_attributes.artifact_id = blackboard_artifacts.artifact_id \
         AND blackboard_artifacts.artifact_type_id = {} \
         AND (attribute_type_id = {} OR attribute_type_id = {} \
         OR attribute_type_id = {} OR attribute_type_id = {})",
        ATTRIBUTE_COLUMNS,
        tsk::ARTIFACT_KEYWORD_HIT,
        tsk::ATTRIBUTE_SET_NAME,
        tsk::ATTRIBUTE_KEYWORD,
        tsk::ATTRIBUTE_KEYWORD_SEARCH_TYPE,
        tsk::ATTRIBUTE_KEYWORD_REGEXP
    );
    if let Some(ds) = data_source_id {
        query.push_str(&format!(" AND blackboard_artifacts.data_source_obj_id = {}", ds));
    }
    Ok(query)
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
