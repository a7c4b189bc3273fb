//! Invalidation plan generation.
//!
//! Merges a batch of events into the set of keys to drop.

use std::collections::HashSet;
use std::fmt;

use super::events::CacheEvent;
use super::hooks::InvalidationHooks;
use super::keys::{CacheKey, Namespace};

/// Merged result of a batch of events: namespaces to clear and keys to drop.
#[derive(Debug, Default)]
pub struct InvalidationPlan {
    /// Namespaces dropped wholesale; per-key targets inside them are pruned.
    pub cleared: Vec<Namespace>,
    /// Individual keys, in first-seen order without duplicates.
    pub targets: Vec<CacheKey>,
    pub event_count: usize,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ events: {}, cleared: [",
            self.event_count
        )?;
        for (idx, namespace) in self.cleared.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{namespace}")?;
        }
        write!(f, "], targets: {} }}", self.targets.len())
    }
}

impl InvalidationPlan {
    /// Deduplicates events by id, then collects hook targets.
    pub fn from_events(events: Vec<CacheEvent>, hooks: &InvalidationHooks) -> Self {
        let mut seen_events = HashSet::new();
        let mut seen_keys = HashSet::new();
        let mut plan = Self::default();

        for event in events {
            if !seen_events.insert(event.id) {
                continue;
            }
            plan.event_count += 1;

            for key in hooks.targets_for(&event.kind) {
                if !seen_keys.insert(key.clone()) {
                    continue;
                }
                match key {
                    CacheKey::All(namespace) => plan.cleared.push(namespace),
                    other => plan.targets.push(other),
                }
            }
        }

        let cleared = plan.cleared.clone();
        plan.targets
            .retain(|key| !cleared.contains(&key.namespace()));
        plan
    }

    /// True when the batch invalidates nothing.
    pub fn is_empty(&self) -> bool {
        self.cleared.is_empty() && self.targets.is_empty()
    }
}
