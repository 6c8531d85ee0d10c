//! Query-backed children for the file views
//!
//! A [`FileViewChildren`] builds its WHERE clause once, at construction, and
//! uses that exact string for both the child count and the child fetch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::common::audit;
use crate::error::CoreResult;
use crate::events::Hook;
use crate::gateway::CaseQueryGateway;
use crate::model::{ContentNode, ContentRow};
use crate::preferences::ViewPreferences;
use crate::query::{
    build_where_clause, row_limit, FilterDescriptor, QueryPreferences, ViewFilter,
};
use crate::refresh::RefreshBus;

use super::factory::{ChildFactory, ChildFilter, KeySource};

// =============================================================================
// Over-limit notice
// =============================================================================

pub type NoticeCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Tells the user once per case session that a capped view was truncated
#[derive(Default)]
pub struct OverLimitNotice {
    shown: AtomicBool,
    callback: Mutex<Option<NoticeCallback>>,
}

impl OverLimitNotice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: NoticeCallback) -> Self {
        Self {
            shown: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Show the notice unless it was already shown this session.
    /// Returns true if this call showed it.
    pub fn fire(&self, shown_limit: usize) -> bool {
        if self.shown.swap(true, Ordering::SeqCst) {
            return false;
        }
        warn!(
            limit = shown_limit,
            "There are more deleted files than can be displayed; only the first {} are shown",
            shown_limit
        );
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(shown_limit);
        }
        true
    }

    pub fn was_shown(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }

    /// Start a new case session
    pub fn reset(&self) {
        self.shown.store(false, Ordering::SeqCst);
    }

    /// Close hook for a [`ViewInvalidator`](crate::events::ViewInvalidator),
    /// so the next case session can show the notice again
    pub fn reset_hook(self: &Arc<Self>) -> Hook {
        let notice = Arc::clone(self);
        Arc::new(move || notice.reset())
    }
}

// =============================================================================
// Row filter
// =============================================================================

/// Drops known and/or slack rows according to the view preferences
#[derive(Debug, Clone, Copy, Default)]
pub struct KnownAndSlackFilter {
    prefs: QueryPreferences,
}

impl KnownAndSlackFilter {
    pub fn new(prefs: QueryPreferences) -> Self {
        Self { prefs }
    }
}

impl ChildFilter<ContentRow> for KnownAndSlackFilter {
    fn accept(&self, row: &ContentRow) -> bool {
        !(self.prefs.hide_known_files && row.is_known())
            && !(self.prefs.hide_slack_files && row.is_slack())
    }
}

// =============================================================================
// Key sources
// =============================================================================

struct FileQuerySource {
    gateway: Arc<dyn CaseQueryGateway>,
    clause: String,
    /// Query limit and the notice to fire when it is reached
    cap: Option<(usize, Arc<OverLimitNotice>)>,
}

impl KeySource<ContentRow> for FileQuerySource {
    fn make_keys(&self) -> CoreResult<Vec<ContentRow>> {
        let mut rows = self.gateway.find_all_files_where(&self.clause)?;
        if let Some((limit, notice)) = &self.cap {
            if rows.len() >= *limit {
                rows.truncate(limit - 1);
                if notice.fire(limit - 1) {
                    audit::log_result_cap_reached(&self.clause, limit - 1);
                }
            }
        }
        Ok(rows)
    }
}

struct ContentChildrenSource {
    gateway: Arc<dyn CaseQueryGateway>,
    parent_id: i64,
}

impl KeySource<ContentRow> for ContentChildrenSource {
    fn make_keys(&self) -> CoreResult<Vec<ContentRow>> {
        self.gateway.get_content_children(self.parent_id)
    }
}

// =============================================================================
// File view children
// =============================================================================

/// Children of one filter node (a size bucket, a deleted mode, ...)
pub struct FileViewChildren {
    filter: ViewFilter,
    clause: String,
    gateway: Arc<dyn CaseQueryGateway>,
    factory: ChildFactory<ContentRow>,
}

impl FileViewChildren {
    pub fn new(
        gateway: Arc<dyn CaseQueryGateway>,
        filter: ViewFilter,
        data_source_id: Option<i64>,
        prefs: &ViewPreferences,
        bus: Arc<RefreshBus>,
        notice: Arc<OverLimitNotice>,
    ) -> CoreResult<Self> {
        let query_prefs = prefs.query_preferences();
        let clause = build_where_clause(&filter, data_source_id, &query_prefs)?;
        let node_name = filter.channel_name(data_source_id);

        // Score clauses cannot express the known/slack flags, so rows are
        // filtered after the fetch instead.
        let row_filter = match filter {
            ViewFilter::Score(_) => KnownAndSlackFilter::new(query_prefs),
            _ => KnownAndSlackFilter::default(),
        };

        let source = FileQuerySource {
            gateway: Arc::clone(&gateway),
            clause: clause.clone(),
            cap: row_limit(&filter).map(|limit| (limit, notice)),
        };

        debug!(node = %node_name, %clause, "Created file view children");
        let factory = ChildFactory::new(node_name, prefs.page_size, source, row_filter, bus);

        Ok(Self {
            filter,
            clause,
            gateway,
            factory,
        })
    }

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    /// The clause used for both count and fetch
    pub fn where_clause(&self) -> &str {
        &self.clause
    }

    pub fn node_name(&self) -> &str {
        self.factory.node_name()
    }

    /// Matching rows, computed with the same clause as the fetch
    pub fn count(&self) -> CoreResult<i64> {
        self.gateway.count_files_where(&self.clause)
    }

    /// Count as shown next to the node name; capped views never claim more
    /// rows than they display
    pub fn display_count(&self) -> CoreResult<i64> {
        let count = self.count()?;
        Ok(match row_limit(&self.filter) {
            Some(limit) => count.min(limit as i64 - 1),
            None => count,
        })
    }

    pub fn display_name(&self) -> CoreResult<String> {
        Ok(format!(
            "{} ({})",
            self.filter.display_name(),
            self.display_count()?
        ))
    }

    pub fn factory(&self) -> &ChildFactory<ContentRow> {
        &self.factory
    }

    /// Nodes for the current page
    pub fn get_children_for_display(&self) -> Vec<ContentNode> {
        self.factory
            .get_children_for_display()
            .into_iter()
            .map(ContentNode::from_row)
            .collect()
    }

    pub fn refresh(&self) {
        self.factory.refresh();
    }

    pub fn dispose(&mut self) {
        self.factory.dispose();
    }
}

/// Children of a directory-like content object
pub struct ContentChildren {
    factory: ChildFactory<ContentRow>,
}

impl ContentChildren {
    pub fn new(
        gateway: Arc<dyn CaseQueryGateway>,
        parent_id: i64,
        prefs: &ViewPreferences,
        bus: Arc<RefreshBus>,
    ) -> Self {
        let source = ContentChildrenSource { gateway, parent_id };
        let factory = ChildFactory::new(
            format!("Content_{}", parent_id),
            prefs.page_size,
            source,
            KnownAndSlackFilter::new(prefs.query_preferences()),
            bus,
        );
        Self { factory }
    }

    pub fn node_name(&self) -> &str {
        self.factory.node_name()
    }

    pub fn get_children_for_display(&self) -> Vec<ContentNode> {
        self.factory
            .get_children_for_display()
            .into_iter()
            .map(ContentNode::from_row)
            .collect()
    }

    pub fn factory(&self) -> &ChildFactory<ContentRow> {
        &self.factory
    }

    pub fn dispose(&mut self) {
        self.factory.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        close_case, CaseEventHub, CaseNotification, FileViewPolicy, ViewInvalidator,
    };
    use crate::gateway::fixtures::*;
    use crate::gateway::SqliteCaseGateway;
    use crate::model::{tsk, ContentKind};
    use crate::query::{
        DeletedContentFilter, FileSizeFilter, ScoreFilter, DELETED_CONTENT_DISPLAY_LIMIT,
    };
    use crate::refresh::RefreshEvent;
    use std::sync::atomic::AtomicUsize;

    fn prefs(page_size: i64) -> ViewPreferences {
        ViewPreferences {
            page_size,
            ..ViewPreferences::default()
        }
    }

    fn shared(gw: SqliteCaseGateway) -> Arc<dyn CaseQueryGateway> {
        Arc::new(gw)
    }

    #[test]
    fn test_size_view_paging_scenario() {
        let gw = open_case();
        for id in 1..=5 {
            insert_file(&gw, id, &format!("video_{}.mp4", id), 100_000_000, 1);
        }
        insert_file(&gw, 6, "small.txt", 10, 1);
        insert_file(&gw, 7, "huge.iso", 5_000_000_000, 1);

        let bus = Arc::new(RefreshBus::new());
        let view = FileViewChildren::new(
            shared(gw),
            ViewFilter::Size(FileSizeFilter::Size50To200),
            None,
            &prefs(2),
            Arc::clone(&bus),
            Arc::new(OverLimitNotice::new()),
        )
        .unwrap();

        assert_eq!(view.count().unwrap(), 5);
        assert_eq!(view.display_name().unwrap(), "50 - 200MB (5)");

        let page_one = view.get_children_for_display();
        assert_eq!(page_one.len(), 2);
        assert_eq!(view.factory().page_count(), 3);

        bus.publish(view.node_name(), RefreshEvent::PageChanged(2)).unwrap();
        assert_eq!(view.get_children_for_display().len(), 2);
        bus.publish(view.node_name(), RefreshEvent::PageChanged(3)).unwrap();
        assert_eq!(view.get_children_for_display().len(), 1);

        bus.publish(view.node_name(), RefreshEvent::PageSizeChanged(5)).unwrap();
        assert_eq!(view.factory().page_count(), 1);
        assert_eq!(view.factory().current_page(), 1);
        assert_eq!(view.get_children_for_display().len(), 5);
    }

    fn open_case_with_deleted(rows: i64) -> SqliteCaseGateway {
        let gw = open_case();
        gw.with_conn(|c| {
            c.execute_batch(&format!(
                "INSERT INTO tsk_files (obj_id, par_obj_id, data_source_obj_id, name, size, type,
                    dir_type, meta_type, dir_flags, meta_flags, known, extension, mime_type)
                 WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < {})
                 SELECT i, 1, 1, 'del_' || i, 10, 0, 5, 1, 2, 0, NULL, 'bin', NULL FROM n;",
                rows
            ))
            .unwrap();
        });
        gw
    }

    fn counting_notice() -> (Arc<OverLimitNotice>, Arc<AtomicUsize>) {
        let shown = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&shown);
        let notice = Arc::new(OverLimitNotice::with_callback(Arc::new(move |limit| {
            assert_eq!(limit, 10_000);
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        (notice, shown)
    }

    #[test]
    fn test_all_deleted_cap_and_single_notice() {
        let gw = open_case_with_deleted(10_005);
        let (notice, shown) = counting_notice();

        let bus = Arc::new(RefreshBus::new());
        let view = FileViewChildren::new(
            shared(gw),
            ViewFilter::Deleted(DeletedContentFilter::AllDeleted),
            None,
            &prefs(0),
            Arc::clone(&bus),
            Arc::clone(&notice),
        )
        .unwrap();

        assert_eq!(view.get_children_for_display().len(), DELETED_CONTENT_DISPLAY_LIMIT);
        view.refresh();
        assert_eq!(view.get_children_for_display().len(), DELETED_CONTENT_DISPLAY_LIMIT);

        assert_eq!(shown.load(Ordering::SeqCst), 1);
        assert_eq!(view.display_count().unwrap(), 10_000);
        assert_eq!(view.count().unwrap(), 10_001);
    }

    #[test]
    fn test_notice_reset_starts_new_session() {
        let notice = OverLimitNotice::new();
        assert!(notice.fire(10));
        assert!(!notice.fire(10));
        notice.reset();
        assert!(!notice.was_shown());
        assert!(notice.fire(10));
    }

    #[test]
    fn test_case_close_rearms_notice() {
        let hub = Arc::new(CaseEventHub::new());
        let bus = Arc::new(RefreshBus::new());
        let (notice, shown) = counting_notice();

        let invalidator = ViewInvalidator::new(
            "DeletedContent",
            FileViewPolicy,
            Arc::clone(&hub),
            Arc::clone(&bus),
        );
        invalidator.on_case_closed(notice.reset_hook());

        let view = FileViewChildren::new(
            shared(open_case_with_deleted(10_005)),
            ViewFilter::Deleted(DeletedContentFilter::AllDeleted),
            None,
            &prefs(0),
            Arc::clone(&bus),
            Arc::clone(&notice),
        )
        .unwrap();
        assert_eq!(view.get_children_for_display().len(), DELETED_CONTENT_DISPLAY_LIMIT);
        assert_eq!(shown.load(Ordering::SeqCst), 1);

        close_case(&hub);
        assert!(!notice.was_shown());

        view.refresh();
        assert_eq!(view.get_children_for_display().len(), DELETED_CONTENT_DISPLAY_LIMIT);
        assert_eq!(shown.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_score_view_filters_known_rows() {
        let gw = open_case();
        insert_file(&gw, 1, "bad.exe", 100, 1);
        insert_file(&gw, 2, "known_bad.dll", 100, 1);
        set_column(&gw, 2, "known", tsk::KNOWN_KNOWN as i64);
        insert_score(&gw, 1, tsk::SIGNIFICANCE_NOTABLE, tsk::PRIORITY_NORMAL);
        insert_score(&gw, 2, tsk::SIGNIFICANCE_NOTABLE, tsk::PRIORITY_OVERRIDE);

        let view_prefs = ViewPreferences {
            hide_known_files: true,
            ..prefs(0)
        };
        let view = FileViewChildren::new(
            shared(gw),
            ViewFilter::Score(ScoreFilter::BadItems),
            None,
            &view_prefs,
            Arc::new(RefreshBus::new()),
            Arc::new(OverLimitNotice::new()),
        )
        .unwrap();

        let ids: Vec<i64> = view
            .get_children_for_display()
            .iter()
            .map(|n| n.row.id)
            .collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(view.count().unwrap(), 2);
    }

    #[test]
    fn test_refresh_picks_up_new_rows() {
        let gw = Arc::new(open_case());
        insert_file(&gw, 1, "a.mp4", 60_000_000, 1);

        let gateway: Arc<dyn CaseQueryGateway> = gw.clone();
        let bus = Arc::new(RefreshBus::new());
        let view = FileViewChildren::new(
            gateway,
            ViewFilter::Size(FileSizeFilter::Size50To200),
            Some(1),
            &prefs(10),
            Arc::clone(&bus),
            Arc::new(OverLimitNotice::new()),
        )
        .unwrap();
        assert_eq!(view.get_children_for_display().len(), 1);

        insert_file(&gw, 2, "b.mp4", 70_000_000, 1);
        insert_file(&gw, 3, "c.mp4", 70_000_000, 2);
        assert_eq!(view.get_children_for_display().len(), 1);

        bus.publish(view.node_name(), RefreshEvent::RefreshKeys).unwrap();
        assert_eq!(view.get_children_for_display().len(), 2);
    }

    #[test]
    fn test_content_changed_notification_reloads_view() {
        let gw = Arc::new(open_case());
        insert_file(&gw, 1, "a.mp4", 60_000_000, 1);

        let gateway: Arc<dyn CaseQueryGateway> = gw.clone();
        let hub = Arc::new(CaseEventHub::new());
        let bus = Arc::new(RefreshBus::new());
        let view = FileViewChildren::new(
            gateway,
            ViewFilter::Size(FileSizeFilter::Size50To200),
            None,
            &prefs(10),
            Arc::clone(&bus),
            Arc::new(OverLimitNotice::new()),
        )
        .unwrap();
        let invalidator = ViewInvalidator::new(
            "FileSize",
            FileViewPolicy,
            Arc::clone(&hub),
            Arc::clone(&bus),
        );
        invalidator.watch_channel(view.node_name());
        assert_eq!(view.get_children_for_display().len(), 1);

        insert_file(&gw, 2, "b.mp4", 70_000_000, 1);
        hub.dispatch(&CaseNotification::DataAdded {
            artifact_type_id: tsk::ARTIFACT_KEYWORD_HIT,
            category: crate::model::ArtifactCategory::AnalysisResult,
        });
        assert_eq!(view.get_children_for_display().len(), 1);

        hub.dispatch(&CaseNotification::ContentChanged { content_id: 2 });
        let mut names: Vec<String> = view
            .get_children_for_display()
            .iter()
            .map(|n| n.row.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.mp4".to_string(), "b.mp4".to_string()]);
    }

    #[test]
    fn test_invalid_data_source_fails_fast() {
        let result = FileViewChildren::new(
            shared(open_case()),
            ViewFilter::Size(FileSizeFilter::Size1000Plus),
            Some(-1),
            &prefs(10),
            Arc::new(RefreshBus::new()),
            Arc::new(OverLimitNotice::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_content_children_kinds() {
        let gw = open_case();
        insert_file(&gw, 10, "Users", 0, 1);
        insert_file(&gw, 11, "notes.txt", 10, 1);
        insert_file(&gw, 12, "Documents", 0, 1);
        insert_file(&gw, 13, "notes.txt-slack", 10, 1);
        for id in [11, 12, 13] {
            set_column(&gw, id, "par_obj_id", 10);
        }
        set_column(&gw, 12, "meta_type", tsk::META_TYPE_DIR as i64);
        set_column(&gw, 13, "type", tsk::FILE_TYPE_SLACK as i64);

        let view_prefs = ViewPreferences {
            hide_slack_files: true,
            ..prefs(0)
        };
        let children = ContentChildren::new(
            shared(gw),
            10,
            &view_prefs,
            Arc::new(RefreshBus::new()),
        );
        let nodes = children.get_children_for_display();
        let kinds: Vec<(String, ContentKind)> = nodes
            .iter()
            .map(|n| (n.row.name.clone(), n.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("Documents".to_string(), ContentKind::Directory),
                ("notes.txt".to_string(), ContentKind::File),
            ]
        );
        assert_eq!(children.node_name(), "Content_10");
    }
}
