//! Cluster-replicated "server busy" flag.
//!
//! While busy, expensive optional work is skipped. Every local transition is
//! broadcast to peers; peer transitions are adopted without re-broadcasting.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::repos::{ClusterEvent, ClusterTransport};
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::busy";
const METRIC_BUSY_BROADCAST_FAILED: &str = "herald_busy_broadcast_failed_total";

/// Maximum busy period when none is configured.
pub const DEFAULT_MAX_BUSY_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound for any configured maximum busy duration.
pub const MAX_BUSY_DURATION_LIMIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Wire form of the busy flag exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBusyState {
    pub busy: bool,
    /// Expiry as Unix seconds; zero when idle.
    pub expires: i64,
    /// Expiry as RFC 3339; the epoch when idle.
    pub expires_ts: String,
}

impl ServerBusyState {
    fn from_expiry(expires: Option<OffsetDateTime>) -> Self {
        let at = expires.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self {
            busy: expires.is_some(),
            expires: expires.map_or(0, OffsetDateTime::unix_timestamp),
            expires_ts: at.format(&Rfc3339).unwrap_or_default(),
        }
    }

    /// Expiry instant, preferring the RFC 3339 field.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.expires_ts, &Rfc3339)
            .ok()
            .or_else(|| OffsetDateTime::from_unix_timestamp(self.expires).ok())
    }
}

/// Busy flag shared with cluster peers.
///
/// Local transitions hold `transition` from the state change through the
/// broadcast, so peers receive them in the order they were applied. Peer
/// updates only take the `expires` lock.
pub struct Busy {
    expires: Mutex<Option<OffsetDateTime>>,
    transition: Mutex<()>,
    max_duration: Duration,
    transport: Option<Arc<dyn ClusterTransport>>,
}

impl Busy {
    /// Create the flag and subscribe to peer updates when a transport is given.
    ///
    /// `max_duration` is capped at [`MAX_BUSY_DURATION_LIMIT`].
    pub fn new(max_duration: Duration, transport: Option<Arc<dyn ClusterTransport>>) -> Arc<Self> {
        let busy = Arc::new(Self {
            expires: Mutex::new(None),
            transition: Mutex::new(()),
            max_duration: max_duration.min(MAX_BUSY_DURATION_LIMIT),
            transport,
        });

        if let Some(transport) = &busy.transport {
            let weak: Weak<Busy> = Arc::downgrade(&busy);
            transport.on_receive(
                ClusterEvent::BusyStateChanged,
                Arc::new(move |payload: &[u8]| {
                    if let Some(busy) = weak.upgrade() {
                        busy.handle_cluster_payload(payload);
                    }
                }),
            );
        }

        busy
    }

    /// Mark the server busy for `duration`, clamped to the configured maximum.
    /// A zero duration clears the flag.
    pub fn set(&self, duration: Duration) {
        if duration.is_zero() {
            self.clear();
            return;
        }

        let duration = duration.min(self.max_duration);
        let now = OffsetDateTime::now_utc();
        let expires = now.checked_add(duration.try_into().unwrap_or(time::Duration::MAX));
        let Some(expires) = expires else {
            warn!(?duration, "Busy duration out of range; clearing instead");
            self.clear();
            return;
        };

        let _transition = mutex_lock(&self.transition, SOURCE, "set");
        *mutex_lock(&self.expires, SOURCE, "set") = Some(expires);

        info!(expires = %expires, "Server marked busy");
        self.broadcast(Some(expires));
    }

    /// Clear the flag and tell peers, even when it was already idle.
    pub fn clear(&self) {
        let _transition = mutex_lock(&self.transition, SOURCE, "clear");
        let previous = mutex_lock(&self.expires, SOURCE, "clear").take();
        if previous.is_some() {
            info!("Server busy flag cleared");
        }
        self.broadcast(None);
    }

    /// Whether a busy period is in effect right now.
    pub fn is_busy(&self) -> bool {
        self.expires().is_some()
    }

    /// Expiry of the current busy period, or `None` when idle.
    pub fn expires(&self) -> Option<OffsetDateTime> {
        self.check_expiry(OffsetDateTime::now_utc())
    }

    /// Current state in wire form.
    pub fn to_state(&self) -> ServerBusyState {
        ServerBusyState::from_expiry(self.expires())
    }

    /// Adopt a peer's state as-is.
    pub fn cluster_event_changed(&self, state: &ServerBusyState) {
        let expires = if state.busy { state.expires_at() } else { None };
        *mutex_lock(&self.expires, SOURCE, "cluster_event_changed") = expires;
        debug!(busy = state.busy, expires = ?expires, "Adopted busy state from peer");
    }

    /// Periodically expire the flag so peers learn about the transition.
    ///
    /// The task ends once the flag is dropped.
    pub fn spawn_expiry_watcher(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(busy) => {
                        busy.expires();
                    }
                    None => break,
                }
            }
        })
    }

    /// Lazily move to idle once `now` passes the expiry.
    fn check_expiry(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        match *mutex_lock(&self.expires, SOURCE, "check_expiry") {
            Some(expires) if expires <= now => {}
            current => return current,
        }

        let _transition = mutex_lock(&self.transition, SOURCE, "check_expiry");
        {
            let mut guard = mutex_lock(&self.expires, SOURCE, "check_expiry");
            match *guard {
                Some(expires) if expires <= now => *guard = None,
                current => return current,
            }
        }

        info!("Server busy period expired");
        self.broadcast(None);
        None
    }

    fn handle_cluster_payload(&self, payload: &[u8]) {
        match serde_json::from_slice::<ServerBusyState>(payload) {
            Ok(state) => self.cluster_event_changed(&state),
            Err(err) => warn!(error = %err, "Ignoring malformed busy state from peer"),
        }
    }

    fn broadcast(&self, expires: Option<OffsetDateTime>) {
        let Some(transport) = &self.transport else {
            return;
        };

        let state = ServerBusyState::from_expiry(expires);
        let result = serde_json::to_vec(&state)
            .map_err(Into::into)
            .and_then(|payload| transport.broadcast(ClusterEvent::BusyStateChanged, payload));

        if let Err(err) = result {
            counter!(METRIC_BUSY_BROADCAST_FAILED).increment(1);
            warn!(error = %err, busy = state.busy, "Failed to broadcast busy state");
        }
    }
}
