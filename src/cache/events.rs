//! Domain events that drive cache invalidation.
//!
//! Writes through the cache layer publish an event; the consumer drains the
//! queue and asks the registered hooks which entries the event touches.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_QUEUE_LEN: &str = "herald_cache_event_queue_len";

/// Monotonic sequence number assigned at publish time.
pub type Sequence = u64;

/// A published domain event with its queue position.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier used to drop duplicates within a batch.
    pub id: Uuid,
    pub sequence: Sequence,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    /// Stamp `kind` with `sequence` and the current time.
    pub fn new(kind: EventKind, sequence: Sequence) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Write that may make cached entries stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A post landed in a channel.
    PostCreated { channel_id: Uuid, post_id: Uuid },
    /// Existing posts in a channel were edited or removed.
    PostsChanged { channel_id: Uuid },
    /// File infos attached to a post were saved or deleted.
    FileInfosChanged { post_id: Uuid },
    /// Membership of a channel changed.
    ChannelMembersChanged { channel_id: Uuid },
    /// Drop every cached entry.
    ClearAll,
}

impl EventKind {
    /// Discriminant used to look up hooks.
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::PostCreated { .. } => EventType::PostCreated,
            EventKind::PostsChanged { .. } => EventType::PostsChanged,
            EventKind::FileInfosChanged { .. } => EventType::FileInfosChanged,
            EventKind::ChannelMembersChanged { .. } => EventType::ChannelMembersChanged,
            EventKind::ClearAll => EventType::ClearAll,
        }
    }
}

/// Payload-free discriminant used to key invalidation hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PostCreated,
    PostsChanged,
    FileInfosChanged,
    ChannelMembersChanged,
    ClearAll,
}

/// FIFO of pending cache events shared by triggers and the consumer.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    sequence: AtomicU64,
}

impl EventQueue {
    /// Empty queue; the first published event gets sequence zero.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Append an event with the next sequence number and update the length gauge.
    pub fn publish(&self, kind: EventKind) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = CacheEvent::new(kind, sequence);

        debug!(
            event_id = %event.id,
            event_sequence = event.sequence,
            event_kind = ?event.kind,
            "Cache event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    /// Number of events waiting to be consumed.
    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn sequences_increase_in_publish_order() {
        let queue = EventQueue::new();
        queue.publish(EventKind::ClearAll);
        queue.publish(EventKind::PostsChanged {
            channel_id: Uuid::nil(),
        });

        let events = queue.drain(10);
        assert_eq!(events.len(), 2);
        assert!(events[0].sequence < events[1].sequence);
        assert_ne!(events[0].id, events[1].id);
    }

    #[test]
    fn drain_respects_limit_and_fifo_order() {
        let queue = EventQueue::new();
        let channel_id = Uuid::new_v4();

        queue.publish(EventKind::ChannelMembersChanged { channel_id });
        queue.publish(EventKind::ClearAll);
        queue.publish(EventKind::FileInfosChanged {
            post_id: Uuid::nil(),
        });

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(events[0].kind, EventKind::ChannelMembersChanged { channel_id });
        assert_eq!(events[1].kind.event_type(), EventType::ClearAll);

        assert_eq!(queue.drain(100).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn event_queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish(EventKind::ClearAll);
        assert_eq!(queue.len(), 1);
    }
}
