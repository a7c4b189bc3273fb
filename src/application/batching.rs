//! Per-user email digests.
//!
//! Email notifications are queued per recipient and delivered together once
//! the first queued post is older than the user's batching interval. A queue
//! is dropped without delivery when the user has viewed any channel of the
//! queued teams since the first post arrived.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{ChannelStore, PreferenceStore};
use crate::domain::entities::{Channel, Post};
use crate::domain::types::ContentMode;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::batching";

/// Preference category and name holding a user's digest interval in seconds.
pub const PREFERENCE_CATEGORY_NOTIFICATIONS: &str = "notifications";
pub const PREFERENCE_NAME_EMAIL_INTERVAL: &str = "email_interval";
/// Interval used when the user has no valid preference.
pub const DEFAULT_EMAIL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// One queued post for a recipient, tagged with the team it was posted in.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedNotification {
    pub user_id: Uuid,
    pub post: Post,
    pub team_name: String,
}

/// Receives a user's digest once it is due.
#[async_trait]
pub trait BatchDelivery: Send + Sync {
    async fn deliver(
        &self,
        user_id: Uuid,
        notifications: Vec<BatchedNotification>,
    ) -> Result<(), AppError>;
}

enum Verdict {
    Keep,
    Drop,
    Deliver,
}

/// Per-user queues of pending email notifications.
pub struct EmailBatchingJob {
    pending: Mutex<HashMap<Uuid, Vec<BatchedNotification>>>,
    flush_gate: tokio::sync::Mutex<()>,
    channels: Arc<dyn ChannelStore>,
    preferences: Arc<dyn PreferenceStore>,
    default_interval: Duration,
}

impl EmailBatchingJob {
    /// Job reading memberships from `channels` and intervals from
    /// `preferences`, falling back to `default_interval`.
    pub fn new(
        channels: Arc<dyn ChannelStore>,
        preferences: Arc<dyn PreferenceStore>,
        default_interval: Duration,
    ) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            flush_gate: tokio::sync::Mutex::new(()),
            channels,
            preferences,
            default_interval,
        }
    }

    /// Queue a post for the user's next digest.
    pub fn add(&self, user_id: Uuid, post: Post, team_name: &str) {
        let mut pending = mutex_lock(&self.pending, SOURCE, "add");
        pending.entry(user_id).or_default().push(BatchedNotification {
            user_id,
            post,
            team_name: team_name.to_string(),
        });
    }

    /// Queued notifications for a user, in arrival order.
    pub fn pending_for(&self, user_id: &Uuid) -> Vec<BatchedNotification> {
        mutex_lock(&self.pending, SOURCE, "pending_for")
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of users with a non-empty queue.
    pub fn pending_users(&self) -> usize {
        mutex_lock(&self.pending, SOURCE, "pending_users").len()
    }

    /// Evaluate every queue at `now`, handing due digests to `deliver`.
    ///
    /// Entries queued while the flush runs stay for the next pass.
    pub async fn flush<F>(&self, now: OffsetDateTime, mut deliver: F)
    where
        F: FnMut(Uuid, Vec<BatchedNotification>),
    {
        let _gate = self.flush_gate.lock().await;

        let snapshot: Vec<(Uuid, Vec<BatchedNotification>)> =
            mutex_lock(&self.pending, SOURCE, "flush.snapshot")
                .iter()
                .filter(|(_, queue)| !queue.is_empty())
                .map(|(user_id, queue)| (*user_id, queue.clone()))
                .collect();

        for (user_id, batch) in snapshot {
            let verdict = self.evaluate(user_id, &batch, now).await;
            if matches!(verdict, Verdict::Keep) {
                continue;
            }

            self.remove_prefix(user_id, batch.len());

            match verdict {
                Verdict::Deliver => {
                    info!(user_id = %user_id, count = batch.len(), "Delivering email digest");
                    deliver(user_id, batch);
                }
                Verdict::Drop => {
                    debug!(user_id = %user_id, count = batch.len(), "User caught up; dropping digest");
                }
                Verdict::Keep => {}
            }
        }
    }

    /// Flush on `cadence` until the job is dropped, sending digests to `delivery`.
    pub fn spawn(self: &Arc<Self>, cadence: Duration, delivery: Arc<dyn BatchDelivery>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(job) = weak.upgrade() else {
                    break;
                };

                let mut due = Vec::new();
                job.flush(OffsetDateTime::now_utc(), |user_id, batch| due.push((user_id, batch)))
                    .await;
                drop(job);

                for (user_id, batch) in due {
                    if let Err(err) = delivery.deliver(user_id, batch).await {
                        warn!(user_id = %user_id, error = %err, "Failed to deliver email digest");
                    }
                }
            }
        })
    }

    async fn evaluate(
        &self,
        user_id: Uuid,
        batch: &[BatchedNotification],
        now: OffsetDateTime,
    ) -> Verdict {
        let Some(first) = batch.first() else {
            return Verdict::Keep;
        };
        let started_at = first.post.create_at;

        let teams: BTreeSet<&str> = batch.iter().map(|entry| entry.team_name.as_str()).collect();
        for team_name in teams {
            match self.channels.members_for_user(team_name, user_id).await {
                Ok(members) => {
                    if members.iter().any(|member| member.last_viewed_at >= started_at) {
                        return Verdict::Drop;
                    }
                }
                Err(err) => {
                    warn!(
                        user_id = %user_id,
                        team_name,
                        error = %err,
                        "Failed to load memberships for email digest"
                    );
                    return Verdict::Keep;
                }
            }
        }

        let interval = self.interval_for(user_id).await;
        if now - started_at > interval {
            Verdict::Deliver
        } else {
            Verdict::Keep
        }
    }

    async fn interval_for(&self, user_id: Uuid) -> Duration {
        let value = self
            .preferences
            .get(
                user_id,
                PREFERENCE_CATEGORY_NOTIFICATIONS,
                PREFERENCE_NAME_EMAIL_INTERVAL,
            )
            .await;

        match value {
            Ok(Some(raw)) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .unwrap_or(self.default_interval),
            Ok(None) => self.default_interval,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Failed to read email interval preference");
                self.default_interval
            }
        }
    }

    fn remove_prefix(&self, user_id: Uuid, count: usize) {
        let mut pending = mutex_lock(&self.pending, SOURCE, "flush.remove");
        if let Some(queue) = pending.get_mut(&user_id) {
            queue.drain(..count.min(queue.len()));
            if queue.is_empty() {
                pending.remove(&user_id);
            }
        }
    }
}

/// Render one digest entry as plain text.
///
/// `Generic` mode leaves the message body out.
pub fn render_batched_post(
    notification: &BatchedNotification,
    channel: &Channel,
    sender_name: &str,
    site_url: &str,
    mode: ContentMode,
) -> String {
    let timestamp = notification
        .post
        .create_at
        .format(format_description!(
            "[month repr:short] [day], [hour]:[minute] UTC"
        ))
        .unwrap_or_default();
    let link = format!(
        "{}/{}/pl/{}",
        site_url.trim_end_matches('/'),
        notification.team_name,
        notification.post.id
    );

    match mode {
        ContentMode::Full => format!(
            "{sender_name} in {channel}, {timestamp}\n{message}\n{link}",
            channel = channel.display_name,
            message = notification.post.message,
        ),
        ContentMode::Generic => format!(
            "{sender_name} sent you a message in {channel}, {timestamp}\n{link}",
            channel = channel.display_name,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ChannelType;

    fn post_with(message: &str) -> Post {
        Post::new(Uuid::new_v4(), Uuid::new_v4(), message)
    }

    fn channel() -> Channel {
        Channel {
            id: Uuid::new_v4(),
            team_id: None,
            name: "town-square".into(),
            display_name: "Some Test Channel".into(),
            channel_type: ChannelType::Open,
            group_constrained: false,
        }
    }

    #[test]
    fn generic_mode_omits_message() {
        let notification = BatchedNotification {
            user_id: Uuid::new_v4(),
            post: post_with("This is the message"),
            team_name: "team".into(),
        };

        let rendered = render_batched_post(
            &notification,
            &channel(),
            "@sender",
            "http://localhost:8065/",
            ContentMode::Generic,
        );

        assert!(!rendered.contains("This is the message"));
        assert!(rendered.contains("Some Test Channel"));
        assert!(rendered.contains(&format!(
            "http://localhost:8065/team/pl/{}",
            notification.post.id
        )));
    }

    #[test]
    fn full_mode_includes_message() {
        let notification = BatchedNotification {
            user_id: Uuid::new_v4(),
            post: post_with("This is the message"),
            team_name: "team".into(),
        };

        let rendered = render_batched_post(
            &notification,
            &channel(),
            "@sender",
            "http://localhost:8065",
            ContentMode::Full,
        );

        assert!(rendered.contains("This is the message"));
        assert!(rendered.starts_with("@sender in Some Test Channel"));
    }
}
