//! Cache trigger service.
//!
//! Publishes domain events from write paths and consumes them right away so
//! the writer's next read observes the invalidation.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

/// Entry point for writes: publishes events and drives the consumer.
pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    /// Trigger over a shared queue and consumer; a disabled config publishes nothing.
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    /// Publish an event; with `consume_now` the queue is drained before returning.
    pub fn trigger(&self, kind: EventKind, consume_now: bool) {
        if !self.config.is_enabled() {
            debug!(event_kind = ?kind, "Cache trigger skipped: cache disabled");
            return;
        }

        self.queue.publish(kind);

        if consume_now {
            self.consumer.consume();
        }
    }

    /// A new post changes the channel's last post time and first page.
    pub fn post_created(&self, channel_id: Uuid, post_id: Uuid) {
        self.trigger(
            EventKind::PostCreated {
                channel_id,
                post_id,
            },
            true,
        );
    }

    /// An edit or delete in the channel.
    pub fn posts_changed(&self, channel_id: Uuid) {
        self.trigger(EventKind::PostsChanged { channel_id }, true);
    }

    /// Attachments of a post were added or deleted.
    pub fn file_infos_changed(&self, post_id: Uuid) {
        self.trigger(EventKind::FileInfosChanged { post_id }, true);
    }

    /// Membership of the channel changed.
    pub fn channel_members_changed(&self, channel_id: Uuid) {
        self.trigger(EventKind::ChannelMembersChanged { channel_id }, true);
    }

    /// Drop everything in every namespace.
    pub fn clear_all(&self) {
        self.trigger(EventKind::ClearAll, true);
    }

    /// Queue events are published to.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Consumer that applies the queued events.
    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }
}
