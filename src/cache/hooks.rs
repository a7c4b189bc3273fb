//! Invalidation hooks keyed by domain event type.
//!
//! A hook maps one event to the cache keys it makes stale. Several hooks may
//! be registered for the same event type; their targets are merged.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::util::lock::{rw_read, rw_write};

use super::events::{EventKind, EventType};
use super::keys::{CacheKey, Namespace};

const SOURCE: &str = "cache::hooks";

/// Maps an event to the cache keys it makes stale.
pub type InvalidationHook = Arc<dyn Fn(&EventKind) -> Vec<CacheKey> + Send + Sync>;

/// Hooks grouped by [`EventType`].
pub struct InvalidationHooks {
    hooks: RwLock<HashMap<EventType, Vec<InvalidationHook>>>,
}

impl InvalidationHooks {
    /// An empty registry; no event invalidates anything.
    pub fn empty() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the invalidation rules of the local cache layer.
    pub fn with_defaults() -> Self {
        let hooks = Self::empty();

        hooks.register(EventType::PostCreated, |event| match event {
            EventKind::PostCreated { channel_id, .. } => vec![
                CacheKey::LastPostTime(*channel_id),
                CacheKey::Posts(*channel_id),
            ],
            _ => Vec::new(),
        });
        hooks.register(EventType::PostsChanged, |event| match event {
            EventKind::PostsChanged { channel_id } => vec![
                CacheKey::LastPostTime(*channel_id),
                CacheKey::Posts(*channel_id),
            ],
            _ => Vec::new(),
        });
        hooks.register(EventType::FileInfosChanged, |event| match event {
            EventKind::FileInfosChanged { post_id } => CacheKey::file_infos_of(*post_id).to_vec(),
            _ => Vec::new(),
        });
        hooks.register(EventType::ChannelMembersChanged, |event| match event {
            EventKind::ChannelMembersChanged { channel_id } => {
                vec![CacheKey::MemberCount(*channel_id)]
            }
            _ => Vec::new(),
        });
        hooks.register(EventType::ClearAll, |_| {
            Namespace::ALL.into_iter().map(CacheKey::All).collect()
        });

        hooks
    }

    /// Add `hook` after any already registered for `event_type`.
    pub fn register<F>(&self, event_type: EventType, hook: F)
    where
        F: Fn(&EventKind) -> Vec<CacheKey> + Send + Sync + 'static,
    {
        rw_write(&self.hooks, SOURCE, "register")
            .entry(event_type)
            .or_default()
            .push(Arc::new(hook));
    }

    /// Keys made stale by `event`, in hook registration order.
    pub fn targets_for(&self, event: &EventKind) -> Vec<CacheKey> {
        let hooks: Vec<InvalidationHook> = rw_read(&self.hooks, SOURCE, "targets_for")
            .get(&event.event_type())
            .cloned()
            .unwrap_or_default();

        hooks.iter().flat_map(|hook| hook(event)).collect()
    }

    /// Number of hooks registered for `event_type`.
    pub fn hook_count(&self, event_type: EventType) -> usize {
        rw_read(&self.hooks, SOURCE, "hook_count")
            .get(&event_type)
            .map_or(0, Vec::len)
    }
}

impl Default for InvalidationHooks {
    fn default() -> Self {
        Self::with_defaults()
    }
}
