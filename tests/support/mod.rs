//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herald::application::repos::{
    ChannelStore, FileInfoStore, GetPostsOptions, GroupDirectory, PermissionChecker, PostStore,
    PostsSinceOptions, PreferenceStore, RepoError, UserDirectory,
};
use herald::domain::entities::{ChannelMember, FileInfo, Post, PostList, UserProfile};
use herald::domain::notify_props::ChannelNotifyProps;
use herald::domain::types::PresenceStatus;
use time::OffsetDateTime;
use uuid::Uuid;

/// Backing store with call counters and switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    posts: Mutex<Vec<Post>>,
    file_infos: Mutex<Vec<FileInfo>>,
    members: Mutex<Vec<ChannelMember>>,
    team_channels: Mutex<HashMap<String, Vec<Uuid>>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    pub last_post_time_calls: AtomicUsize,
    pub posts_since_calls: AtomicUsize,
    pub get_posts_calls: AtomicUsize,
    pub file_info_calls: AtomicUsize,
    pub member_count_calls: AtomicUsize,
    pub members_for_user_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Slow every read down, to make concurrent callers overlap.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn insert_post(&self, post: Post) {
        self.posts.lock().unwrap().push(post);
    }

    pub fn insert_file_info(&self, info: FileInfo) {
        self.file_infos.lock().unwrap().push(info);
    }

    pub fn insert_member(&self, member: ChannelMember) {
        self.members.lock().unwrap().push(member);
    }

    pub fn add_team_channel(&self, team_name: &str, channel_id: Uuid) {
        self.team_channels
            .lock()
            .unwrap()
            .entry(team_name.to_string())
            .or_default()
            .push(channel_id);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn read(&self, counter: &AtomicUsize) -> Result<(), RepoError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn save(&self, post: Post) -> Result<Post, RepoError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("store offline".into()));
        }
        self.posts.lock().unwrap().push(post.clone());
        Ok(post)
    }

    async fn last_post_time(
        &self,
        channel_id: Uuid,
        _allow_from_cache: bool,
    ) -> Result<OffsetDateTime, RepoError> {
        self.read(&self.last_post_time_calls).await?;
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|post| post.channel_id == channel_id)
            .map(|post| post.update_at)
            .max()
            .unwrap_or(OffsetDateTime::UNIX_EPOCH))
    }

    async fn get_posts_since(
        &self,
        options: PostsSinceOptions,
        _allow_from_cache: bool,
    ) -> Result<PostList, RepoError> {
        self.read(&self.posts_since_calls).await?;
        let mut list = PostList::default();
        for post in self.posts.lock().unwrap().iter() {
            if post.channel_id == options.channel_id && post.update_at > options.since {
                list.push(post.clone());
            }
        }
        Ok(list)
    }

    async fn get_posts(
        &self,
        options: GetPostsOptions,
        _allow_from_cache: bool,
    ) -> Result<PostList, RepoError> {
        self.read(&self.get_posts_calls).await?;
        let mut posts: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|post| post.channel_id == options.channel_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.create_at.cmp(&a.create_at));

        let mut list = PostList::default();
        let skip = (options.page * options.per_page) as usize;
        for post in posts.into_iter().skip(skip).take(options.per_page as usize) {
            list.push(post);
        }
        Ok(list)
    }
}

#[async_trait]
impl FileInfoStore for MemoryStore {
    async fn save(&self, info: FileInfo) -> Result<FileInfo, RepoError> {
        self.file_infos.lock().unwrap().push(info.clone());
        Ok(info)
    }

    async fn get_for_post(
        &self,
        post_id: Uuid,
        include_deleted: bool,
        _allow_from_cache: bool,
    ) -> Result<Vec<FileInfo>, RepoError> {
        self.read(&self.file_info_calls).await?;
        Ok(self
            .file_infos
            .lock()
            .unwrap()
            .iter()
            .filter(|info| info.post_id == Some(post_id))
            .filter(|info| include_deleted || info.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn delete_for_post(&self, post_id: Uuid) -> Result<(), RepoError> {
        let now = OffsetDateTime::now_utc();
        for info in self.file_infos.lock().unwrap().iter_mut() {
            if info.post_id == Some(post_id) {
                info.deleted_at = Some(now);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn member_count(
        &self,
        channel_id: Uuid,
        _allow_from_cache: bool,
    ) -> Result<u64, RepoError> {
        self.read(&self.member_count_calls).await?;
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|member| member.channel_id == channel_id)
            .count() as u64)
    }

    async fn members(&self, channel_id: Uuid) -> Result<Vec<ChannelMember>, RepoError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|member| member.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn members_for_user(
        &self,
        team_name: &str,
        user_id: Uuid,
    ) -> Result<Vec<ChannelMember>, RepoError> {
        self.read(&self.members_for_user_calls).await?;
        let channels = self
            .team_channels
            .lock()
            .unwrap()
            .get(team_name)
            .cloned()
            .unwrap_or_default();
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|member| member.user_id == user_id && channels.contains(&member.channel_id))
            .cloned()
            .collect())
    }

    async fn update_member(&self, member: ChannelMember) -> Result<ChannelMember, RepoError> {
        let mut members = self.members.lock().unwrap();
        match members
            .iter_mut()
            .find(|existing| existing.channel_id == member.channel_id && existing.user_id == member.user_id)
        {
            Some(existing) => *existing = member.clone(),
            None => members.push(member.clone()),
        }
        Ok(member)
    }
}

/// Users, channel rosters and presence.
#[derive(Default)]
pub struct Directory {
    users: Mutex<HashMap<Uuid, UserProfile>>,
    rosters: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    statuses: Mutex<HashMap<Uuid, PresenceStatus>>,
    groups: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    fail_resolve: AtomicBool,
    fail_status: AtomicBool,
    pub resolve_calls: AtomicUsize,
}

impl Directory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, user: UserProfile) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn join(&self, channel_id: Uuid, user_id: Uuid) {
        self.rosters
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .insert(user_id);
    }

    pub fn set_status(&self, user_id: Uuid, status: PresenceStatus) {
        self.statuses.lock().unwrap().insert(user_id, status);
    }

    pub fn add_group_member(&self, channel_id: Uuid, user_id: Uuid) {
        self.groups
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .insert(user_id);
    }

    pub fn fail_resolve(&self, fail: bool) {
        self.fail_resolve.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for Directory {
    async fn resolve_users_by_username(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, UserProfile>, RepoError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let wanted: HashSet<String> = usernames.iter().map(|name| name.to_lowercase()).collect();
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|user| wanted.contains(&user.username.to_lowercase()))
            .map(|user| (user.username.to_lowercase(), user.clone()))
            .collect())
    }

    async fn status_of(&self, user_id: Uuid) -> Result<PresenceStatus, RepoError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(PresenceStatus::Offline))
    }

    async fn profiles_in_channel(
        &self,
        channel_id: Uuid,
    ) -> Result<HashMap<Uuid, UserProfile>, RepoError> {
        let roster = self
            .rosters
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .unwrap_or_default();
        let users = self.users.lock().unwrap();
        Ok(roster
            .iter()
            .filter_map(|user_id| users.get(user_id).map(|user| (*user_id, user.clone())))
            .collect())
    }
}

#[async_trait]
impl GroupDirectory for Directory {
    async fn group_member_ids(&self, channel_id: Uuid) -> Result<HashSet<Uuid>, RepoError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct Permissions {
    pub allow: bool,
}

#[async_trait]
impl PermissionChecker for Permissions {
    async fn can_use_channel_mentions(
        &self,
        _user_id: Uuid,
        _channel_id: Uuid,
    ) -> Result<bool, RepoError> {
        Ok(self.allow)
    }
}

/// `email_interval` preferences keyed by user.
#[derive(Default)]
pub struct Preferences {
    values: Mutex<HashMap<Uuid, String>>,
}

impl Preferences {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_interval(&self, user_id: Uuid, value: &str) {
        self.values.lock().unwrap().insert(user_id, value.to_string());
    }
}

#[async_trait]
impl PreferenceStore for Preferences {
    async fn get(
        &self,
        user_id: Uuid,
        _category: &str,
        _name: &str,
    ) -> Result<Option<String>, RepoError> {
        Ok(self.values.lock().unwrap().get(&user_id).cloned())
    }
}

pub fn member(channel_id: Uuid, user_id: Uuid) -> ChannelMember {
    ChannelMember {
        channel_id,
        user_id,
        last_viewed_at: OffsetDateTime::UNIX_EPOCH,
        notify_props: ChannelNotifyProps::default(),
    }
}

pub fn at_secs(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).expect("valid timestamp")
}
