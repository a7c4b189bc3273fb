//! Read-through/write-through decorator over the backing stores.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{
    ChannelStore, FileInfoStore, GetPostsOptions, PostStore, PostsSinceOptions, RepoError,
};
use crate::domain::entities::{ChannelMember, FileInfo, Post, PostList};

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue, EventType};
use super::hooks::InvalidationHooks;
use super::keys::{CacheKey, is_cacheable_page};
use super::store::CacheStores;
use super::trigger::CacheTrigger;

/// Backing stores wrapped by [`LocalCacheLayer`].
#[derive(Clone)]
pub struct BackingStores {
    pub posts: Arc<dyn PostStore>,
    pub file_infos: Arc<dyn FileInfoStore>,
    pub channels: Arc<dyn ChannelStore>,
}

/// Store decorator that answers hot reads from memory.
///
/// It implements the same store traits as the backing stores it wraps, so
/// callers swap it in without other changes.
pub struct LocalCacheLayer {
    config: CacheConfig,
    backing: BackingStores,
    stores: Arc<CacheStores>,
    trigger: CacheTrigger,
}

impl LocalCacheLayer {
    /// Wrap `backing` with the default invalidation rules.
    pub fn new(config: CacheConfig, backing: BackingStores) -> Self {
        Self::with_hooks(config, backing, InvalidationHooks::with_defaults())
    }

    /// Wrap `backing` with a caller-supplied hook registry.
    pub fn with_hooks(config: CacheConfig, backing: BackingStores, hooks: InvalidationHooks) -> Self {
        let stores = Arc::new(CacheStores::new(&config));
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new(
            config.clone(),
            Arc::clone(&stores),
            Arc::new(hooks),
            Arc::clone(&queue),
        ));
        let trigger = CacheTrigger::new(config.clone(), queue, consumer);

        Self {
            config,
            backing,
            stores,
            trigger,
        }
    }

    /// Add an invalidation rule on top of the defaults.
    pub fn register_hook<F>(&self, event_type: EventType, hook: F)
    where
        F: Fn(&EventKind) -> Vec<CacheKey> + Send + Sync + 'static,
    {
        self.trigger.consumer().hooks().register(event_type, hook);
    }

    /// Publish a domain event produced outside this layer, such as a peer write.
    pub fn publish(&self, kind: EventKind) {
        self.trigger.trigger(kind, true);
    }

    /// Drop one key immediately, bypassing the event queue.
    pub fn invalidate(&self, key: &CacheKey) {
        self.stores.invalidate(key);
    }

    /// Empty every namespace through a `ClearAll` event.
    pub fn clear_all(&self) {
        self.trigger.clear_all();
    }

    /// The namespaces behind this layer.
    pub fn stores(&self) -> &Arc<CacheStores> {
        &self.stores
    }

    fn enabled(&self) -> bool {
        self.config.is_enabled()
    }
}

#[async_trait]
impl PostStore for LocalCacheLayer {
    async fn save(&self, post: Post) -> Result<Post, RepoError> {
        let saved = self.backing.posts.save(post).await?;
        self.trigger.post_created(saved.channel_id, saved.id);
        Ok(saved)
    }

    async fn last_post_time(
        &self,
        channel_id: Uuid,
        allow_from_cache: bool,
    ) -> Result<OffsetDateTime, RepoError> {
        if !self.enabled() {
            return self.backing.posts.last_post_time(channel_id, allow_from_cache).await;
        }

        self.stores
            .last_post_time
            .read_through(channel_id, allow_from_cache, || {
                self.backing.posts.last_post_time(channel_id, allow_from_cache)
            })
            .await
    }

    async fn get_posts_since(
        &self,
        options: PostsSinceOptions,
        allow_from_cache: bool,
    ) -> Result<PostList, RepoError> {
        if !self.enabled() {
            return self.backing.posts.get_posts_since(options, allow_from_cache).await;
        }

        let namespace = &self.stores.last_post_time;
        if allow_from_cache
            && let Some(last) = namespace.get(&options.channel_id)
            && last <= options.since
        {
            debug!(channel_id = %options.channel_id, "No posts since cached last post time");
            return Ok(PostList::default());
        }

        let epoch = namespace.epoch();
        let list = self.backing.posts.get_posts_since(options, allow_from_cache).await?;
        let latest = list
            .latest_update()
            .map_or(options.since, |update| update.max(options.since));
        namespace.put_if_current(options.channel_id, latest, epoch);
        Ok(list)
    }

    async fn get_posts(
        &self,
        options: GetPostsOptions,
        allow_from_cache: bool,
    ) -> Result<PostList, RepoError> {
        if !self.enabled() || !is_cacheable_page(options.page, options.per_page) {
            return self.backing.posts.get_posts(options, allow_from_cache).await;
        }

        self.stores
            .posts
            .read_through(
                (options.channel_id, options.per_page),
                allow_from_cache,
                || self.backing.posts.get_posts(options, allow_from_cache),
            )
            .await
    }
}

#[async_trait]
impl FileInfoStore for LocalCacheLayer {
    async fn save(&self, info: FileInfo) -> Result<FileInfo, RepoError> {
        let saved = self.backing.file_infos.save(info).await?;
        if let Some(post_id) = saved.post_id {
            self.trigger.file_infos_changed(post_id);
        }
        Ok(saved)
    }

    async fn get_for_post(
        &self,
        post_id: Uuid,
        include_deleted: bool,
        allow_from_cache: bool,
    ) -> Result<Vec<FileInfo>, RepoError> {
        if !self.enabled() {
            return self
                .backing
                .file_infos
                .get_for_post(post_id, include_deleted, allow_from_cache)
                .await;
        }

        self.stores
            .file_infos
            .read_through((post_id, include_deleted), allow_from_cache, || {
                self.backing
                    .file_infos
                    .get_for_post(post_id, include_deleted, allow_from_cache)
            })
            .await
    }

    async fn delete_for_post(&self, post_id: Uuid) -> Result<(), RepoError> {
        self.backing.file_infos.delete_for_post(post_id).await?;
        self.trigger.file_infos_changed(post_id);
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for LocalCacheLayer {
    async fn member_count(
        &self,
        channel_id: Uuid,
        allow_from_cache: bool,
    ) -> Result<u64, RepoError> {
        if !self.enabled() {
            return self.backing.channels.member_count(channel_id, allow_from_cache).await;
        }

        self.stores
            .member_counts
            .read_through(channel_id, allow_from_cache, || {
                self.backing.channels.member_count(channel_id, allow_from_cache)
            })
            .await
    }

    async fn members(&self, channel_id: Uuid) -> Result<Vec<ChannelMember>, RepoError> {
        self.backing.channels.members(channel_id).await
    }

    async fn members_for_user(
        &self,
        team_name: &str,
        user_id: Uuid,
    ) -> Result<Vec<ChannelMember>, RepoError> {
        self.backing
            .channels
            .members_for_user(team_name, user_id)
            .await
    }

    async fn update_member(&self, member: ChannelMember) -> Result<ChannelMember, RepoError> {
        let updated = self.backing.channels.update_member(member).await?;
        self.trigger.channel_members_changed(updated.channel_id);
        Ok(updated)
    }
}
