//! Named refresh channels between pager controls and child factories
//!
//! A control that only knows the node name of a tree branch publishes
//! [`RefreshEvent`]s on that name; the factory backing the branch registered a
//! listener under the same name when it was created and unregisters it when
//! the branch is disposed.
//!
//! Within one channel, events reach every listener registered at publish time
//! in publish order. A listener may publish again (on any channel) from inside
//! its callback; such events are queued behind the one being delivered.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Events flowing on a refresh channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshEvent {
    /// Navigate to a 1-based page
    PageChanged(usize),
    /// New page size; `<= 0` means unpaged
    PageSizeChanged(i64),
    /// The branch now has this many pages
    PageCountChanged(usize),
    /// Recompute the branch's keys from the database
    RefreshKeys,
}

pub type RefreshListener = Arc<dyn Fn(&RefreshEvent) + Send + Sync>;

/// Handle returned by [`RefreshBus::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

struct Channel {
    listeners: Vec<(SubscriptionId, RefreshListener)>,
    /// Events waiting for delivery, with the listeners registered when published
    queue: VecDeque<(RefreshEvent, Vec<RefreshListener>)>,
    draining: bool,
}

impl Channel {
    fn new() -> Self {
        Self {
            listeners: Vec::new(),
            queue: VecDeque::new(),
            draining: false,
        }
    }
}

/// Registry of named multicast refresh channels
#[derive(Default)]
pub struct RefreshBus {
    channels: Mutex<HashMap<String, Channel>>,
}

impl RefreshBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        // Listener callbacks never run under this lock, so poisoning cannot
        // leave the map half-updated.
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a listener to the channel `name`, creating the channel if needed
    pub fn register(&self, name: &str, listener: RefreshListener) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.channels()
            .entry(name.to_string())
            .or_insert_with(Channel::new)
            .listeners
            .push((id, listener));
        debug!(channel = name, "Registered refresh listener");
        id
    }

    /// Remove a listener. Channels left without listeners are dropped.
    /// Returns false if the subscription was not registered.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut channels = self.channels();
        let mut emptied = None;
        let mut found = false;

        for (name, channel) in channels.iter_mut() {
            let before = channel.listeners.len();
            channel.listeners.retain(|(sub, _)| *sub != id);
            if channel.listeners.len() != before {
                found = true;
                if channel.listeners.is_empty() {
                    emptied = Some(name.clone());
                }
                break;
            }
        }

        if let Some(name) = emptied {
            channels.remove(&name);
            debug!(channel = %name, "Refresh channel closed");
        }
        found
    }

    /// Deliver `event` to every listener of `name`.
    ///
    /// Returns the number of listeners the event was addressed to, or
    /// [`CoreError::StaleChannel`] if nobody listens on `name`.
    pub fn publish(&self, name: &str, event: RefreshEvent) -> CoreResult<usize> {
        let addressed = {
            let mut channels = self.channels();
            let channel = match channels.get_mut(name) {
                Some(channel) if !channel.listeners.is_empty() => channel,
                _ => return Err(CoreError::StaleChannel(name.to_string())),
            };
            let snapshot: Vec<RefreshListener> =
                channel.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            let addressed = snapshot.len();
            channel.queue.push_back((event, snapshot));

            if channel.draining {
                trace!(channel = name, ?event, "Queued behind active delivery");
                return Ok(addressed);
            }
            channel.draining = true;
            addressed
        };

        trace!(channel = name, ?event, listeners = addressed, "Publishing refresh event");
        self.drain(name);
        Ok(addressed)
    }

    /// Publish `event` on every live channel; returns the number of channels
    pub fn broadcast(&self, event: RefreshEvent) -> usize {
        let names = self.channel_names();
        names
            .iter()
            .filter(|name| self.publish(name, event).is_ok())
            .count()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels().contains_key(name)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.channels()
            .get(name)
            .map(|c| c.listeners.len())
            .unwrap_or(0)
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels().keys().cloned().collect();
        names.sort();
        names
    }

    fn drain(&self, name: &str) {
        let mut guard = DrainGuard {
            bus: self,
            name,
            armed: true,
        };
        loop {
            let next = {
                let mut channels = self.channels();
                let Some(channel) = channels.get_mut(name) else {
                    // Every listener went away mid-delivery; queued events go with them
                    guard.armed = false;
                    return;
                };
                match channel.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        channel.draining = false;
                        guard.armed = false;
                        return;
                    }
                }
            };

            let (event, listeners) = next;
            for listener in listeners {
                listener(&event);
            }
        }
    }
}

/// Reopens a channel whose delivery was cut short by a panicking listener.
/// Events still queued behind the failed one are dropped.
struct DrainGuard<'a> {
    bus: &'a RefreshBus,
    name: &'a str,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut channels = self.bus.channels();
        if let Some(channel) = channels.get_mut(self.name) {
            let dropped = channel.queue.len();
            channel.queue.clear();
            channel.draining = false;
            warn!(
                channel = self.name,
                dropped,
                "Refresh listener panicked, channel reopened"
            );
        }
    }
}

static BUS: OnceLock<Arc<RefreshBus>> = OnceLock::new();

/// Process-wide bus shared by the views and the pager controls
pub fn global() -> Arc<RefreshBus> {
    Arc::clone(BUS.get_or_init(|| Arc::new(RefreshBus::new())))
}
