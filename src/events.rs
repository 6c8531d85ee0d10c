//! Case and ingest lifecycle notifications, and the per-view decisions of
//! which of them invalidate a tree branch
//!
//! The host application feeds [`CaseNotification`]s into a [`CaseEventHub`].
//! Each view subsystem owns a [`ViewInvalidator`] that applies its own
//! [`RefreshPolicy`] and, when a notification matters to it, publishes
//! `RefreshKeys` on the refresh channels of its branches.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::common::audit;
use crate::error::CoreError;
use crate::model::ArtifactCategory;
use crate::refresh::{RefreshBus, RefreshEvent};

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseNotification {
    /// The current case changed; `open == false` means it was closed
    CurrentCase { open: bool },
    DataSourceAdded { data_source_id: i64 },
    ContentChanged { content_id: i64 },
    /// New blackboard data of one artifact type
    DataAdded {
        artifact_type_id: i32,
        category: ArtifactCategory,
    },
    IngestJobCompleted,
    IngestJobCancelled,
    ContentTagAdded { content_id: i64 },
    ContentTagDeleted { content_id: i64 },
    ArtifactTagAdded { artifact_id: i64 },
    ArtifactTagDeleted { artifact_id: i64 },
}

impl CaseNotification {
    /// Get a human-readable event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            CaseNotification::CurrentCase { .. } => "current_case",
            CaseNotification::DataSourceAdded { .. } => "data_source_added",
            CaseNotification::ContentChanged { .. } => "content_changed",
            CaseNotification::DataAdded { .. } => "data_added",
            CaseNotification::IngestJobCompleted => "ingest_job_completed",
            CaseNotification::IngestJobCancelled => "ingest_job_cancelled",
            CaseNotification::ContentTagAdded { .. } => "content_tag_added",
            CaseNotification::ContentTagDeleted { .. } => "content_tag_deleted",
            CaseNotification::ArtifactTagAdded { .. } => "artifact_tag_added",
            CaseNotification::ArtifactTagDeleted { .. } => "artifact_tag_deleted",
        }
    }

    pub fn is_case_closed(&self) -> bool {
        matches!(self, CaseNotification::CurrentCase { open: false })
    }

    pub fn is_ingest_job_end(&self) -> bool {
        matches!(
            self,
            CaseNotification::IngestJobCompleted | CaseNotification::IngestJobCancelled
        )
    }

    /// A tag was added to or removed from a file or an artifact
    pub fn is_tag_change(&self) -> bool {
        matches!(
            self,
            CaseNotification::ContentTagAdded { .. }
                | CaseNotification::ContentTagDeleted { .. }
                | CaseNotification::ArtifactTagAdded { .. }
                | CaseNotification::ArtifactTagDeleted { .. }
        )
    }
}

// =============================================================================
// Event hub
// =============================================================================

pub type CaseListener = Arc<dyn Fn(&CaseNotification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

/// Fan-out point for case notifications
#[derive(Default)]
pub struct CaseEventHub {
    listeners: Mutex<Vec<(ListenerId, CaseListener)>>,
}

impl CaseEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, CaseListener)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, listener: CaseListener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    /// Deliver to every listener subscribed when dispatch started. Listeners
    /// may unsubscribe (themselves or others) while being called.
    pub fn dispatch(&self, notification: &CaseNotification) -> usize {
        let snapshot: Vec<CaseListener> = self
            .listeners()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        trace!(
            event = notification.event_type(),
            listeners = snapshot.len(),
            "Dispatching case notification"
        );
        for listener in &snapshot {
            listener(notification);
        }
        snapshot.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}

// =============================================================================
// Refresh policies
// =============================================================================

/// Decides whether a notification invalidates a view subsystem
pub trait RefreshPolicy: Send + Sync {
    fn is_refresh_required(&self, notification: &CaseNotification) -> bool;
}

/// Size, extension, MIME type and deleted-content views
#[derive(Debug, Clone, Copy, Default)]
pub struct FileViewPolicy;

impl RefreshPolicy for FileViewPolicy {
    fn is_refresh_required(&self, notification: &CaseNotification) -> bool {
        matches!(
            notification,
            CaseNotification::ContentChanged { .. } | CaseNotification::DataSourceAdded { .. }
        ) || notification.is_ingest_job_end()
    }
}

/// Score views also change when analysis results arrive or tags move,
/// since both feed the aggregate score
#[derive(Debug, Clone, Copy, Default)]
pub struct ScorePolicy;

impl RefreshPolicy for ScorePolicy {
    fn is_refresh_required(&self, notification: &CaseNotification) -> bool {
        match notification {
            CaseNotification::DataAdded { category, .. } => {
                *category == ArtifactCategory::AnalysisResult
            }
            other => other.is_tag_change() || FileViewPolicy.is_refresh_required(other),
        }
    }
}

/// Result views of a single artifact type (hash set hits, keyword hits, ...)
#[derive(Debug, Clone, Copy)]
pub struct ArtifactTypePolicy {
    pub artifact_type_id: i32,
}

impl RefreshPolicy for ArtifactTypePolicy {
    fn is_refresh_required(&self, notification: &CaseNotification) -> bool {
        match notification {
            CaseNotification::DataAdded {
                artifact_type_id, ..
            } => *artifact_type_id == self.artifact_type_id,
            other => other.is_ingest_job_end(),
        }
    }
}

impl<F> RefreshPolicy for F
where
    F: Fn(&CaseNotification) -> bool + Send + Sync,
{
    fn is_refresh_required(&self, notification: &CaseNotification) -> bool {
        self(notification)
    }
}

// =============================================================================
// Invalidator
// =============================================================================

pub type Hook = Arc<dyn Fn() + Send + Sync>;

struct InvalidatorShared {
    name: String,
    policy: Box<dyn RefreshPolicy>,
    bus: Arc<RefreshBus>,
    hub: Arc<CaseEventHub>,
    subscription: Mutex<Option<ListenerId>>,
    channels: Mutex<Vec<String>>,
    on_refresh: Mutex<Vec<Hook>>,
    on_close: Mutex<Vec<Hook>>,
}

impl InvalidatorShared {
    fn handle(&self, notification: &CaseNotification) {
        if notification.is_case_closed() {
            self.case_closed();
            return;
        }
        if !self.policy.is_refresh_required(notification) {
            return;
        }

        debug!(
            view = %self.name,
            event = notification.event_type(),
            "Case notification invalidates view"
        );
        for hook in snapshot(&self.on_refresh) {
            hook();
        }
        for channel in snapshot(&self.channels) {
            match self.bus.publish(&channel, RefreshEvent::RefreshKeys) {
                Ok(_) => {}
                Err(CoreError::StaleChannel(_)) => {
                    trace!(view = %self.name, %channel, "Branch not expanded, nothing to refresh");
                }
                Err(e) => debug!(view = %self.name, %channel, error = %e, "Refresh not delivered"),
            }
        }
    }

    /// Leave the hub before anything else so no later notification can act
    /// on the closed case
    fn case_closed(&self) {
        if !self.deregister() {
            return;
        }
        for hook in snapshot(&self.on_close) {
            hook();
        }
        info!(view = %self.name, "Case closed, view invalidator deregistered");
    }

    fn deregister(&self) -> bool {
        let id = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match id {
            Some(id) => self.hub.unsubscribe(id),
            None => false,
        }
    }

    fn is_active(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

fn snapshot<T: Clone>(items: &Mutex<Vec<T>>) -> Vec<T> {
    items.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Refresh driver of one view subsystem
pub struct ViewInvalidator {
    shared: Arc<InvalidatorShared>,
}

impl ViewInvalidator {
    /// Subscribe to `hub`; refreshes go out on `bus`
    pub fn new(
        name: impl Into<String>,
        policy: impl RefreshPolicy + 'static,
        hub: Arc<CaseEventHub>,
        bus: Arc<RefreshBus>,
    ) -> Self {
        let shared = Arc::new(InvalidatorShared {
            name: name.into(),
            policy: Box::new(policy),
            bus,
            hub: Arc::clone(&hub),
            subscription: Mutex::new(None),
            channels: Mutex::new(Vec::new()),
            on_refresh: Mutex::new(Vec::new()),
            on_close: Mutex::new(Vec::new()),
        });

        let target = Arc::clone(&shared);
        let id = hub.subscribe(Arc::new(move |n: &CaseNotification| target.handle(n)));
        *shared.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);

        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Publish `RefreshKeys` on `channel` whenever this view is invalidated
    pub fn watch_channel(&self, channel: impl Into<String>) {
        let channel = channel.into();
        let mut channels = self.shared.channels.lock().unwrap_or_else(|e| e.into_inner());
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }

    /// Run `hook` on invalidation, before any channel is published
    pub fn on_refresh(&self, hook: Hook) {
        self.shared
            .on_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(hook);
    }

    /// Run `hook` once when the case closes
    pub fn on_case_closed(&self, hook: Hook) {
        self.shared
            .on_close
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(hook);
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Leave the hub without running close hooks; idempotent
    pub fn dispose(&mut self) {
        if self.shared.deregister() {
            debug!(view = %self.shared.name, "View invalidator disposed");
        }
    }
}

impl Drop for ViewInvalidator {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Broadcast a case close and record it in the audit log
pub fn close_case(hub: &CaseEventHub) {
    let released = hub.listener_count();
    hub.dispatch(&CaseNotification::CurrentCase { open: false });
    audit::log_case_closed(released);
}
