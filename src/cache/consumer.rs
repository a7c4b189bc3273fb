//! Cache consumer for executing invalidation plans.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::hooks::InvalidationHooks;
use super::planner::InvalidationPlan;
use super::store::CacheStores;

const METRIC_CACHE_CONSUME_MS: &str = "herald_cache_consume_ms";

/// Drains events, plans with the registered hooks and drops stale entries.
pub struct CacheConsumer {
    config: CacheConfig,
    stores: Arc<CacheStores>,
    hooks: Arc<InvalidationHooks>,
    queue: Arc<EventQueue>,
}

impl CacheConsumer {
    /// Consumer over a shared queue, hook registry and set of stores.
    pub fn new(
        config: CacheConfig,
        stores: Arc<CacheStores>,
        hooks: Arc<InvalidationHooks>,
        queue: Arc<EventQueue>,
    ) -> Self {
        Self {
            config,
            stores,
            hooks,
            queue,
        }
    }

    /// Consume every pending event batch. Returns true if any event was processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let mut processed = false;
        while self.consume_batch() {
            processed = true;
        }
        processed
    }

    fn consume_batch(&self) -> bool {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit());
        if events.is_empty() {
            return false;
        }

        let event_ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
        let plan = InvalidationPlan::from_events(events, &self.hooks);

        debug!(event_ids = ?event_ids, plan = %plan, "Cache consumption starting");

        for namespace in &plan.cleared {
            self.stores.clear_namespace(*namespace);
        }
        for key in &plan.targets {
            self.stores.invalidate(key);
        }

        info!(
            event_count = plan.event_count,
            cleared = plan.cleared.len(),
            invalidated = plan.targets.len(),
            "Cache consumption complete"
        );

        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }

    /// Stores this consumer invalidates.
    pub fn stores(&self) -> &Arc<CacheStores> {
        &self.stores
    }

    /// Registry used to plan invalidations.
    pub fn hooks(&self) -> &Arc<InvalidationHooks> {
        &self.hooks
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::cache::events::EventKind;
    use crate::domain::entities::PostList;

    fn consumer(config: CacheConfig) -> (CacheConsumer, Arc<EventQueue>) {
        let stores = Arc::new(CacheStores::new(&config));
        let hooks = Arc::new(InvalidationHooks::with_defaults());
        let queue = Arc::new(EventQueue::new());
        (
            CacheConsumer::new(config, stores, hooks, Arc::clone(&queue)),
            queue,
        )
    }

    #[test]
    fn consume_on_empty_queue_reports_nothing() {
        let (consumer, _) = consumer(CacheConfig::default());
        assert!(!consumer.consume());
    }

    #[test]
    fn post_created_drops_only_that_channels_entries() {
        let (consumer, queue) = consumer(CacheConfig::default());
        let stores = consumer.stores();
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        stores.last_post_time.put(target, OffsetDateTime::UNIX_EPOCH);
        stores.last_post_time.put(other, OffsetDateTime::UNIX_EPOCH);
        stores.posts.put((target, 60), PostList::default());
        stores.member_counts.put(target, 4);

        queue.publish(EventKind::PostCreated {
            channel_id: target,
            post_id: Uuid::new_v4(),
        });
        assert!(consumer.consume());

        assert!(stores.last_post_time.get(&target).is_none());
        assert!(stores.last_post_time.get(&other).is_some());
        assert!(stores.posts.is_empty());
        assert_eq!(stores.member_counts.get(&target), Some(4));
        assert!(queue.is_empty());
    }

    #[test]
    fn drains_in_batches_until_empty() {
        let (consumer, queue) = consumer(CacheConfig {
            consume_batch_limit: 1,
            ..Default::default()
        });
        for _ in 0..3 {
            queue.publish(EventKind::ClearAll);
        }

        assert!(consumer.consume());
        assert!(queue.is_empty());
    }
}
