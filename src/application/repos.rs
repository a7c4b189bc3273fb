//! Collaborator traits describing stores, directories and the cluster bus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{ChannelMember, FileInfo, Post, PostList, UserProfile};
use crate::domain::types::PresenceStatus;

/// Version prefix for channel etags; bump when the post wire shape changes.
pub const ETAG_VERSION: &str = "5.0";

/// Failure reported by a store or directory collaborator.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("store timeout")]
    Timeout,
}

impl RepoError {
    /// Wrap a backend error message as [`RepoError::Persistence`].
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Failure to hand a message to the cluster bus.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster transport unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode cluster payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Posts of a channel updated after `since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostsSinceOptions {
    pub channel_id: Uuid,
    pub since: OffsetDateTime,
}

/// One page of a channel's posts, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetPostsOptions {
    pub channel_id: Uuid,
    pub page: u32,
    pub per_page: u32,
}

/// Channel posts.
///
/// Reads take `allow_from_cache`; a caching decorator may answer them from
/// memory when it is `true`, backing stores ignore it.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a new or edited post and return the stored record.
    async fn save(&self, post: Post) -> Result<Post, RepoError>;

    /// Newest `update_at` in the channel, or the Unix epoch for an empty channel.
    async fn last_post_time(
        &self,
        channel_id: Uuid,
        allow_from_cache: bool,
    ) -> Result<OffsetDateTime, RepoError>;

    /// Posts updated after `options.since`.
    async fn get_posts_since(
        &self,
        options: PostsSinceOptions,
        allow_from_cache: bool,
    ) -> Result<PostList, RepoError>;

    /// A page of posts; see [`crate::cache::is_cacheable_page`] for the
    /// pages a cache keeps.
    async fn get_posts(
        &self,
        options: GetPostsOptions,
        allow_from_cache: bool,
    ) -> Result<PostList, RepoError>;

    /// `"{ETAG_VERSION}.{millis}"` built from [`PostStore::last_post_time`].
    async fn get_etag(&self, channel_id: Uuid, allow_from_cache: bool) -> Result<String, RepoError> {
        let last = self.last_post_time(channel_id, allow_from_cache).await?;
        Ok(format!(
            "{ETAG_VERSION}.{}",
            last.unix_timestamp_nanos() / 1_000_000
        ))
    }
}

/// Attachment metadata keyed by owning post.
#[async_trait]
pub trait FileInfoStore: Send + Sync {
    async fn save(&self, info: FileInfo) -> Result<FileInfo, RepoError>;

    /// Attachments of a post; soft-deleted ones only with `include_deleted`.
    async fn get_for_post(
        &self,
        post_id: Uuid,
        include_deleted: bool,
        allow_from_cache: bool,
    ) -> Result<Vec<FileInfo>, RepoError>;

    /// Soft-delete every attachment of a post.
    async fn delete_for_post(&self, post_id: Uuid) -> Result<(), RepoError>;
}

/// Channel memberships.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Number of members of a channel.
    async fn member_count(&self, channel_id: Uuid, allow_from_cache: bool)
    -> Result<u64, RepoError>;

    /// Every membership of a channel.
    async fn members(&self, channel_id: Uuid) -> Result<Vec<ChannelMember>, RepoError>;

    /// Memberships of a user across every channel of the named team.
    async fn members_for_user(
        &self,
        team_name: &str,
        user_id: Uuid,
    ) -> Result<Vec<ChannelMember>, RepoError>;

    /// Store a membership change such as a new `last_viewed_at`.
    async fn update_member(&self, member: ChannelMember) -> Result<ChannelMember, RepoError>;
}

/// User profiles and presence.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve usernames case-insensitively. The map is keyed by lowercase
    /// username and unknown names are absent.
    async fn resolve_users_by_username(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, UserProfile>, RepoError>;

    /// Current presence of a user.
    async fn status_of(&self, user_id: Uuid) -> Result<PresenceStatus, RepoError>;

    /// Profiles of every member of a channel, keyed by user id.
    async fn profiles_in_channel(
        &self,
        channel_id: Uuid,
    ) -> Result<HashMap<Uuid, UserProfile>, RepoError>;
}

/// Group membership for group-constrained channels.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Members of every group linked to the channel.
    async fn group_member_ids(&self, channel_id: Uuid) -> Result<HashSet<Uuid>, RepoError>;
}

/// Channel-level permission checks.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether the user may notify a whole channel with `@channel`, `@all`
    /// or `@here`.
    async fn can_use_channel_mentions(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, RepoError>;
}

/// Per-user preferences stored as strings under a category and name.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Raw preference value, or `None` when the user never set it.
    async fn get(
        &self,
        user_id: Uuid,
        category: &str,
        name: &str,
    ) -> Result<Option<String>, RepoError>;
}

/// Cluster message types this crate sends or listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterEvent {
    BusyStateChanged,
}

impl ClusterEvent {
    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterEvent::BusyStateChanged => "busy_state_changed",
        }
    }
}

/// Callback invoked with the raw payload of a received message.
pub type ClusterHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Fire-and-forget message bus between cluster nodes.
pub trait ClusterTransport: Send + Sync {
    /// Send `payload` to every other node. Delivery to peers is not awaited.
    fn broadcast(&self, event: ClusterEvent, payload: Vec<u8>) -> Result<(), ClusterError>;

    /// Register a handler for messages of `event` sent by other nodes.
    fn on_receive(&self, event: ClusterEvent, handler: ClusterHandler);
}
