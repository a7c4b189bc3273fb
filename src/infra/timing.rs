//! Latency instrumentation for backing stores.
//!
//! [`TimedStore`] wraps any store, records `herald_store_call_ms` per call
//! and logs failures. Compose it under the cache layer so only real backing
//! calls are measured.

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use metrics::histogram;
use time::OffsetDateTime;
use tracing::{Instrument, debug_span, warn};
use uuid::Uuid;

use crate::application::repos::{
    ChannelStore, FileInfoStore, GetPostsOptions, PostStore, PostsSinceOptions, RepoError,
};
use crate::domain::entities::{ChannelMember, FileInfo, Post, PostList};

const METRIC_STORE_CALL_MS: &str = "herald_store_call_ms";

pub struct TimedStore<S> {
    inner: S,
    store: &'static str,
}

impl<S> TimedStore<S> {
    pub fn new(store: &'static str, inner: S) -> Self {
        Self { inner, store }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn timed<T, F>(&self, method: &'static str, call: F) -> Result<T, RepoError>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        let started_at = Instant::now();
        let result = call
            .instrument(debug_span!("store_call", store = self.store, method))
            .await;

        histogram!(METRIC_STORE_CALL_MS, "store" => self.store, "method" => method)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        if let Err(err) = &result {
            warn!(store = self.store, method, error = %err, "Store call failed");
        }
        result
    }
}

#[async_trait]
impl<S: PostStore> PostStore for TimedStore<S> {
    async fn save(&self, post: Post) -> Result<Post, RepoError> {
        self.timed("save", self.inner.save(post)).await
    }

    async fn last_post_time(
        &self,
        channel_id: Uuid,
        allow_from_cache: bool,
    ) -> Result<OffsetDateTime, RepoError> {
        self.timed(
            "last_post_time",
            self.inner.last_post_time(channel_id, allow_from_cache),
        )
        .await
    }

    async fn get_posts_since(
        &self,
        options: PostsSinceOptions,
        allow_from_cache: bool,
    ) -> Result<PostList, RepoError> {
        self.timed(
            "get_posts_since",
            self.inner.get_posts_since(options, allow_from_cache),
        )
        .await
    }

    async fn get_posts(
        &self,
        options: GetPostsOptions,
        allow_from_cache: bool,
    ) -> Result<PostList, RepoError> {
        self.timed("get_posts", self.inner.get_posts(options, allow_from_cache))
            .await
    }
}

#[async_trait]
impl<S: FileInfoStore> FileInfoStore for TimedStore<S> {
    async fn save(&self, info: FileInfo) -> Result<FileInfo, RepoError> {
        self.timed("save", self.inner.save(info)).await
    }

    async fn get_for_post(
        &self,
        post_id: Uuid,
        include_deleted: bool,
        allow_from_cache: bool,
    ) -> Result<Vec<FileInfo>, RepoError> {
        self.timed(
            "get_for_post",
            self.inner
                .get_for_post(post_id, include_deleted, allow_from_cache),
        )
        .await
    }

    async fn delete_for_post(&self, post_id: Uuid) -> Result<(), RepoError> {
        self.timed("delete_for_post", self.inner.delete_for_post(post_id))
            .await
    }
}

#[async_trait]
impl<S: ChannelStore> ChannelStore for TimedStore<S> {
    async fn member_count(
        &self,
        channel_id: Uuid,
        allow_from_cache: bool,
    ) -> Result<u64, RepoError> {
        self.timed(
            "member_count",
            self.inner.member_count(channel_id, allow_from_cache),
        )
        .await
    }

    async fn members(&self, channel_id: Uuid) -> Result<Vec<ChannelMember>, RepoError> {
        self.timed("members", self.inner.members(channel_id)).await
    }

    async fn members_for_user(
        &self,
        team_name: &str,
        user_id: Uuid,
    ) -> Result<Vec<ChannelMember>, RepoError> {
        self.timed(
            "members_for_user",
            self.inner.members_for_user(team_name, user_id),
        )
        .await
    }

    async fn update_member(&self, member: ChannelMember) -> Result<ChannelMember, RepoError> {
        self.timed("update_member", self.inner.update_member(member))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingChannels {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChannelStore for CountingChannels {
        async fn member_count(&self, _channel_id: Uuid, _allow: bool) -> Result<u64, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }

        async fn members(&self, _channel_id: Uuid) -> Result<Vec<ChannelMember>, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RepoError::Timeout)
        }

        async fn members_for_user(
            &self,
            _team_name: &str,
            _user_id: Uuid,
        ) -> Result<Vec<ChannelMember>, RepoError> {
            Ok(Vec::new())
        }

        async fn update_member(&self, member: ChannelMember) -> Result<ChannelMember, RepoError> {
            Ok(member)
        }
    }

    #[tokio::test]
    async fn forwards_results_and_errors_unchanged() {
        let timed = TimedStore::new("channels", CountingChannels::default());

        assert_eq!(timed.member_count(Uuid::new_v4(), true).await.unwrap(), 7);
        assert!(matches!(
            timed.members(Uuid::new_v4()).await,
            Err(RepoError::Timeout)
        ));
        assert_eq!(timed.inner().calls.load(Ordering::SeqCst), 2);
    }
}
