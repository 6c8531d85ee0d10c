//! Paged, refreshable child factory
//!
//! A [`ChildFactory`] backs one tree branch. It owns the branch's
//! [`PagingEngine`], listens on the branch's refresh channel, and only calls
//! its key source again after a cold start or an explicit `RefreshKeys`.
//! Page navigation and page-size changes are served from the keys it already
//! holds.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, trace};

use crate::error::CoreResult;
use crate::paging::PagingEngine;
use crate::pool::BackgroundLoader;
use crate::refresh::{RefreshBus, RefreshEvent, SubscriptionId};

/// Produces the full, unfiltered key list of a branch. May block on the
/// database and is called from background threads.
pub trait KeySource<K>: Send + Sync {
    fn make_keys(&self) -> CoreResult<Vec<K>>;
}

impl<K, F> KeySource<K> for F
where
    F: Fn() -> CoreResult<Vec<K>> + Send + Sync,
{
    fn make_keys(&self) -> CoreResult<Vec<K>> {
        self()
    }
}

/// Stateless predicate deciding which keys become children
pub trait ChildFilter<K>: Send + Sync {
    fn accept(&self, key: &K) -> bool;
}

impl<K, F> ChildFilter<K> for F
where
    F: Fn(&K) -> bool + Send + Sync,
{
    fn accept(&self, key: &K) -> bool {
        self(key)
    }
}

/// Filter that keeps every key
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<K> ChildFilter<K> for AcceptAll {
    fn accept(&self, _key: &K) -> bool {
        true
    }
}

/// Called after the branch's children may have changed
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

struct FactoryState<K> {
    paging: PagingEngine<K>,
    /// Bumped by every `RefreshKeys`; starts at 1 for the cold start
    refresh_requested: u64,
    /// Highest request covered by the keys currently held
    refresh_served: u64,
    /// Last recomputation started
    started: u64,
    /// Recomputation whose keys are currently held
    applied: u64,
}

impl<K> FactoryState<K> {
    fn is_stale(&self) -> bool {
        self.refresh_requested > self.refresh_served
    }
}

/// A recomputation in flight
#[derive(Debug, Clone, Copy)]
struct Ticket {
    generation: u64,
    request: u64,
}

struct FactoryShared<K> {
    node_name: String,
    key_source: Box<dyn KeySource<K>>,
    filter: Box<dyn ChildFilter<K>>,
    state: Mutex<FactoryState<K>>,
    on_change: Mutex<Option<ChangeCallback>>,
    bus: Arc<RefreshBus>,
}

impl<K: Clone + Send + 'static> FactoryShared<K> {
    fn state(&self) -> MutexGuard<'_, FactoryState<K>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_recompute(&self) -> Ticket {
        let mut state = self.state();
        state.started += 1;
        Ticket {
            generation: state.started,
            request: state.refresh_requested,
        }
    }

    /// Apply a finished recomputation unless a newer one already landed
    fn finish_recompute(&self, ticket: Ticket, result: CoreResult<Vec<K>>) -> Vec<K> {
        let filtered = result.map(|keys| {
            keys.into_iter()
                .filter(|k| self.filter.accept(k))
                .collect::<Vec<K>>()
        });

        let (page, event) = {
            let mut state = self.state();
            state.refresh_served = state.refresh_served.max(ticket.request);

            let event = match filtered {
                Ok(keys) if ticket.generation > state.applied => {
                    debug!(
                        node = %self.node_name,
                        keys = keys.len(),
                        generation = ticket.generation,
                        "Applied recomputed child keys"
                    );
                    state.applied = ticket.generation;
                    state.paging.set_keys(keys)
                }
                Ok(_) => {
                    debug!(
                        node = %self.node_name,
                        generation = ticket.generation,
                        applied = state.applied,
                        "Discarded superseded child keys"
                    );
                    None
                }
                Err(e) => {
                    error!(
                        node = %self.node_name,
                        error = %e,
                        "Failed to load child keys, keeping previous keys"
                    );
                    None
                }
            };
            (state.paging.current_page_keys(), event)
        };

        if let Some(event) = event {
            self.announce(event);
        }
        page
    }

    fn recompute(&self) -> Vec<K> {
        let ticket = self.begin_recompute();
        let result = self.key_source.make_keys();
        self.finish_recompute(ticket, result)
    }

    fn children_for_display(&self) -> Vec<K> {
        {
            let state = self.state();
            if !state.is_stale() {
                return state.paging.current_page_keys();
            }
        }
        self.recompute()
    }

    fn handle_event(&self, event: &RefreshEvent) {
        trace!(node = %self.node_name, ?event, "Refresh event");
        match *event {
            RefreshEvent::PageChanged(page) => {
                self.state().paging.set_current_page(page);
            }
            RefreshEvent::PageSizeChanged(size) => {
                let count_event = self.state().paging.set_page_size(size);
                if let Some(count_event) = count_event {
                    self.announce(count_event);
                }
            }
            RefreshEvent::PageCountChanged(_) => return,
            RefreshEvent::RefreshKeys => {
                self.state().refresh_requested += 1;
            }
        }
        self.notify_changed();
    }

    /// Tell pager controls about a page count change on our own channel
    fn announce(&self, event: RefreshEvent) {
        if let Err(e) = self.bus.publish(&self.node_name, event) {
            trace!(node = %self.node_name, error = %e, "Page count change not delivered");
        }
    }

    fn notify_changed(&self) {
        let callback = self
            .on_change
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Child factory of one tree branch
pub struct ChildFactory<K: Clone + Send + 'static> {
    shared: Arc<FactoryShared<K>>,
    subscription: Option<SubscriptionId>,
}

impl<K: Clone + Send + 'static> ChildFactory<K> {
    /// Create the factory and register it on the channel `node_name`
    pub fn new(
        node_name: impl Into<String>,
        page_size: i64,
        key_source: impl KeySource<K> + 'static,
        filter: impl ChildFilter<K> + 'static,
        bus: Arc<RefreshBus>,
    ) -> Self {
        let node_name = node_name.into();
        let shared = Arc::new(FactoryShared {
            node_name: node_name.clone(),
            key_source: Box::new(key_source),
            filter: Box::new(filter),
            state: Mutex::new(FactoryState {
                paging: PagingEngine::new(page_size),
                refresh_requested: 1,
                refresh_served: 0,
                started: 0,
                applied: 0,
            }),
            on_change: Mutex::new(None),
            bus: Arc::clone(&bus),
        });

        let listener_target = Arc::clone(&shared);
        let subscription = bus.register(
            &node_name,
            Arc::new(move |event: &RefreshEvent| listener_target.handle_event(event)),
        );

        Self {
            shared,
            subscription: Some(subscription),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.shared.node_name
    }

    /// Keys to materialize for the current page. Recomputes only when the
    /// branch is cold or a refresh was requested; a failed load leaves the
    /// previous keys (or none) in place.
    pub fn get_children_for_display(&self) -> Vec<K> {
        self.shared.children_for_display()
    }

    /// Request a key recomputation on the next display
    pub fn refresh(&self) {
        self.shared.handle_event(&RefreshEvent::RefreshKeys);
    }

    /// Recompute keys on a worker thread; the change callback fires when done
    pub fn refresh_in_background(&self, loader: &BackgroundLoader) {
        self.shared.state().refresh_requested += 1;
        let shared = Arc::clone(&self.shared);
        loader.spawn(move || {
            shared.recompute();
            shared.notify_changed();
        });
    }

    pub fn set_change_callback(&self, callback: ChangeCallback) {
        *self
            .shared
            .on_change
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    pub fn is_stale(&self) -> bool {
        self.shared.state().is_stale()
    }

    pub fn page_count(&self) -> usize {
        self.shared.state().paging.page_count()
    }

    pub fn current_page(&self) -> usize {
        self.shared.state().paging.current_page()
    }

    pub fn page_size(&self) -> i64 {
        self.shared.state().paging.page_size()
    }

    /// Number of keys held across all pages
    pub fn key_count(&self) -> usize {
        self.shared.state().paging.key_count()
    }

    pub fn is_disposed(&self) -> bool {
        self.subscription.is_none()
    }

    /// Leave the refresh channel. Called when the branch is removed from the
    /// tree or the case closes; idempotent.
    pub fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.shared.bus.unregister(subscription);
            debug!(node = %self.shared.node_name, "Child factory disposed");
        }
    }
}

impl<K: Clone + Send + 'static> Drop for ChildFactory<K> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Key source counting its calls; fails while `fail` is set
    struct CountingSource {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        keys: Vec<u32>,
    }

    impl KeySource<u32> for CountingSource {
        fn make_keys(&self) -> CoreResult<Vec<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::DataAccess("case not open".into()));
            }
            Ok(self.keys.clone())
        }
    }

    fn counting(keys: Vec<u32>) -> (CountingSource, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        (
            CountingSource {
                calls: Arc::clone(&calls),
                fail: Arc::clone(&fail),
                keys,
            },
            calls,
            fail,
        )
    }

    #[test]
    fn test_navigation_never_reloads_keys() {
        let bus = Arc::new(RefreshBus::new());
        let (source, calls, _) = counting((1..=5).collect());
        let factory = ChildFactory::new("branch", 2, source, AcceptAll, Arc::clone(&bus));

        assert_eq!(factory.get_children_for_display(), vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        bus.publish("branch", RefreshEvent::PageChanged(3)).unwrap();
        assert_eq!(factory.get_children_for_display(), vec![5]);

        bus.publish("branch", RefreshEvent::PageSizeChanged(5)).unwrap();
        assert_eq!(factory.get_children_for_display(), vec![1, 2, 3, 4, 5]);
        assert_eq!(factory.current_page(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        bus.publish("branch", RefreshEvent::RefreshKeys).unwrap();
        factory.get_children_for_display();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_filter_preserves_order() {
        let bus = Arc::new(RefreshBus::new());
        let (source, _, _) = counting(vec![9, 2, 7, 4, 6, 1]);
        let factory = ChildFactory::new(
            "evens",
            0,
            source,
            |k: &u32| k % 2 == 0,
            Arc::clone(&bus),
        );
        assert_eq!(factory.get_children_for_display(), vec![2, 4, 6]);
    }

    #[test]
    fn test_failure_keeps_previous_keys() {
        let bus = Arc::new(RefreshBus::new());
        let (source, calls, fail) = counting(vec![1, 2, 3]);

        fail.store(true, Ordering::SeqCst);
        let factory = ChildFactory::new("branch", 10, source, AcceptAll, Arc::clone(&bus));
        assert!(factory.get_children_for_display().is_empty());

        fail.store(false, Ordering::SeqCst);
        factory.refresh();
        assert_eq!(factory.get_children_for_display(), vec![1, 2, 3]);

        fail.store(true, Ordering::SeqCst);
        factory.refresh();
        assert_eq!(factory.get_children_for_display(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!factory.is_stale());
    }

    #[test]
    fn test_page_count_changes_are_announced() {
        let bus = Arc::new(RefreshBus::new());
        let (source, _, _) = counting((1..=5).collect());
        let factory = ChildFactory::new("branch", 2, source, AcceptAll, Arc::clone(&bus));

        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        bus.register(
            "branch",
            Arc::new(move |e: &RefreshEvent| {
                if let RefreshEvent::PageCountChanged(n) = e {
                    sink.lock().unwrap().push(*n);
                }
            }),
        );

        factory.get_children_for_display();
        bus.publish("branch", RefreshEvent::PageSizeChanged(5)).unwrap();
        assert_eq!(*counts.lock().unwrap(), vec![3, 1]);
    }

    #[test]
    fn test_superseded_recompute_is_discarded() {
        let bus = Arc::new(RefreshBus::new());
        let factory = ChildFactory::new(
            "branch",
            0,
            || -> CoreResult<Vec<u32>> { Ok(Vec::new()) },
            AcceptAll,
            Arc::clone(&bus),
        );

        let older = factory.shared.begin_recompute();
        let newer = factory.shared.begin_recompute();
        factory.shared.finish_recompute(newer, Ok(vec![2, 2]));
        let shown = factory.shared.finish_recompute(older, Ok(vec![1]));

        assert_eq!(shown, vec![2, 2]);
        assert_eq!(factory.get_children_for_display(), vec![2, 2]);
    }

    #[test]
    fn test_refresh_arriving_mid_load_is_not_lost() {
        let bus = Arc::new(RefreshBus::new());
        let factory = ChildFactory::new(
            "branch",
            0,
            || -> CoreResult<Vec<u32>> { Ok(vec![1]) },
            AcceptAll,
            Arc::clone(&bus),
        );

        let ticket = factory.shared.begin_recompute();
        factory.refresh();
        factory.shared.finish_recompute(ticket, Ok(vec![0]));
        assert!(factory.is_stale());
        assert_eq!(factory.get_children_for_display(), vec![1]);
    }

    #[test]
    fn test_dispose_unregisters() {
        let bus = Arc::new(RefreshBus::new());
        let (source, _, _) = counting(vec![1]);
        let mut factory = ChildFactory::new("branch", 1, source, AcceptAll, Arc::clone(&bus));
        assert_eq!(bus.listener_count("branch"), 1);

        factory.dispose();
        factory.dispose();
        assert!(factory.is_disposed());
        assert!(bus.publish("branch", RefreshEvent::RefreshKeys).is_err());

        {
            let (source, _, _) = counting(vec![1]);
            let _scoped = ChildFactory::new("scoped", 1, source, AcceptAll, Arc::clone(&bus));
            assert!(bus.has_channel("scoped"));
        }
        assert!(!bus.has_channel("scoped"));
    }

    #[test]
    fn test_background_refresh_notifies() {
        let bus = Arc::new(RefreshBus::new());
        let loader = BackgroundLoader::new(2).unwrap();
        let (source, calls, _) = counting(vec![4, 5]);
        let factory = ChildFactory::new("branch", 0, source, AcceptAll, Arc::clone(&bus));

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        factory.set_change_callback(Arc::new(move || {
            let _ = tx.lock().unwrap().send(());
        }));

        factory.refresh_in_background(&loader);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(!factory.is_stale());
        assert_eq!(factory.get_children_for_display(), vec![4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
