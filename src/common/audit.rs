//! Case Audit Logging
//!
//! Structured records of case sessions, truncated result sets and data
//! exports, emitted on the `forensic_audit` target so they can be routed
//! separately from diagnostic logs.

use std::path::Path;
use tracing::{info, span, warn, Level};

/// Log a case database being opened for viewing
pub fn log_case_opened(path: &Path, data_source_id: Option<i64>) {
    let _span = span!(
        Level::INFO,
        "case_session",
        path = %path.display(),
    )
    .entered();

    info!(
        target: "forensic_audit",
        operation = "case_open",
        path = %path.display(),
        data_source_id = data_source_id.unwrap_or(0),
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Case opened"
    );
}

/// Log the current case being closed
pub fn log_case_closed(views_released: usize) {
    info!(
        target: "forensic_audit",
        operation = "case_close",
        views_released = views_released,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Case closed"
    );
}

/// Log a view whose result set was cut at its display limit
pub fn log_result_cap_reached(where_clause: &str, shown: usize) {
    warn!(
        target: "forensic_audit",
        operation = "result_cap",
        where_clause = where_clause,
        shown = shown,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "View result set truncated"
    );
}

/// Log content exported from the case
pub fn log_data_export(source: &str, destination: &Path, bytes_exported: u64, completed: bool) {
    info!(
        target: "forensic_audit",
        operation = "data_export",
        source = source,
        destination = %destination.display(),
        bytes_exported = bytes_exported,
        status = if completed { "COMPLETED" } else { "CANCELLED" },
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Case content exported"
    );
}
