//! Notification policy: who gets notified about a post and how.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::repos::{GroupDirectory, UserDirectory};
use crate::domain::entities::{Channel, Post, UserProfile};
use crate::domain::notify_props::{
    ChannelNotifyProps, ChannelPush, CommentsMode, MarkUnread, PushLevel, PushStatusThreshold,
    Toggle,
};
use crate::domain::types::{ChannelType, MentionKind, PostType, PresenceStatus};

use super::keywords::{HERE_MENTION, KeywordIndex};
use super::mentions::MentionResult;

pub const DEFAULT_MAX_NOTIFICATIONS_PER_CHANNEL: u64 = 1000;

/// Channel membership state captured for one notification pass.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub channel: Channel,
    pub profiles: HashMap<Uuid, UserProfile>,
    pub member_props: HashMap<Uuid, ChannelNotifyProps>,
    pub statuses: HashMap<Uuid, PresenceStatus>,
    pub member_count: u64,
}

impl ChannelSnapshot {
    pub fn is_member(&self, user_id: &Uuid) -> bool {
        self.profiles.contains_key(user_id)
    }

    pub fn status_of(&self, user_id: &Uuid) -> PresenceStatus {
        self.statuses
            .get(user_id)
            .copied()
            .unwrap_or(PresenceStatus::Offline)
    }

    pub fn props_of(&self, user_id: &Uuid) -> ChannelNotifyProps {
        self.member_props.get(user_id).copied().unwrap_or_default()
    }
}

/// Thread state for a reply.
#[derive(Debug, Clone, Default)]
pub struct ThreadContext {
    pub root_author: Option<Uuid>,
    /// Authors of the root post and every earlier reply.
    pub participants: Vec<Uuid>,
    pub followers: Vec<Uuid>,
}

pub struct PolicyInput<'a> {
    pub post: &'a Post,
    pub snapshot: &'a ChannelSnapshot,
    pub thread: Option<&'a ThreadContext>,
    pub keywords: &'a KeywordIndex,
    pub mentions: MentionResult,
    pub allow_channel_mentions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: Uuid,
    pub kind: MentionKind,
    pub send_email: bool,
    pub send_push: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationPlan {
    pub recipients: Vec<Recipient>,
    pub out_of_channel_users: Vec<UserProfile>,
    pub out_of_group_users: Vec<UserProfile>,
    pub channel_mentioned: bool,
    pub all_mentioned: bool,
    pub here_mentioned: bool,
}

impl NotificationPlan {
    pub fn recipient(&self, user_id: &Uuid) -> Option<&Recipient> {
        self.recipients
            .iter()
            .find(|recipient| &recipient.user_id == user_id)
    }

    pub fn email_count(&self) -> usize {
        self.recipients.iter().filter(|r| r.send_email).count()
    }

    pub fn push_count(&self) -> usize {
        self.recipients.iter().filter(|r| r.send_push).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationPolicy {
    max_notifications_per_channel: u64,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NOTIFICATIONS_PER_CHANNEL)
    }
}

impl NotificationPolicy {
    pub fn new(max_notifications_per_channel: u64) -> Self {
        Self {
            max_notifications_per_channel,
        }
    }

    /// Whether `@channel`, `@all` and `@here` are honored for this post.
    pub fn allow_channel_mentions(
        &self,
        post: &Post,
        member_count: u64,
        sender_can_use_channel_mentions: bool,
    ) -> bool {
        if matches!(post.post_type, PostType::HeaderChange | PostType::PurposeChange) {
            return false;
        }
        sender_can_use_channel_mentions && member_count <= self.max_notifications_per_channel
    }

    /// Turn mentions into a recipient plan and out-of-channel suggestions.
    pub async fn evaluate(
        &self,
        input: PolicyInput<'_>,
        users: &dyn UserDirectory,
        groups: &dyn GroupDirectory,
    ) -> NotificationPlan {
        let PolicyInput {
            post,
            snapshot,
            thread,
            keywords,
            mut mentions,
            allow_channel_mentions,
        } = input;

        let (out_of_channel_users, out_of_group_users) = self
            .out_of_channel_mentions(
                post,
                snapshot,
                &mentions.other_potential_mentions,
                users,
                groups,
            )
            .await;

        apply_channel_mentions(&mut mentions, allow_channel_mentions, keywords);
        add_implicit_mentions(&mut mentions, post, snapshot, thread);

        let mut recipients: Vec<Recipient> = mentions
            .mentions
            .iter()
            .filter(|(user_id, _)| **user_id != post.user_id && snapshot.is_member(user_id))
            .filter_map(|(user_id, kind)| {
                let profile = snapshot.profiles.get(user_id)?;
                let status = snapshot.status_of(user_id);
                let channel_props = snapshot.props_of(user_id);
                Some(Recipient {
                    user_id: *user_id,
                    kind: *kind,
                    send_email: user_allows_email(
                        profile,
                        status,
                        &channel_props,
                        post,
                        kind.is_explicit(),
                    ),
                    send_push: user_allows_push(profile, status, &channel_props, *kind),
                })
            })
            .collect();
        recipients.sort_by_key(|recipient| recipient.user_id);

        debug!(
            post_id = %post.id,
            channel_id = %post.channel_id,
            recipients = recipients.len(),
            out_of_channel = out_of_channel_users.len(),
            out_of_group = out_of_group_users.len(),
            "Notification plan evaluated"
        );

        NotificationPlan {
            recipients,
            out_of_channel_users,
            out_of_group_users,
            channel_mentioned: mentions.channel_mentioned,
            all_mentioned: mentions.all_mentioned,
            here_mentioned: mentions.here_mentioned,
        }
    }

    /// Resolve unresolved `@name` tokens into users outside the channel.
    ///
    /// Directory failures are logged and yield no suggestions.
    pub async fn out_of_channel_mentions(
        &self,
        post: &Post,
        snapshot: &ChannelSnapshot,
        potential: &[String],
        users: &dyn UserDirectory,
        groups: &dyn GroupDirectory,
    ) -> (Vec<UserProfile>, Vec<UserProfile>) {
        let channel = &snapshot.channel;
        if potential.is_empty()
            || channel.channel_type.is_conversation()
            || post.post_type.is_system_message()
        {
            return (Vec::new(), Vec::new());
        }

        let resolved = match users.resolve_users_by_username(potential).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(
                    channel_id = %channel.id,
                    error = %err,
                    "Failed to resolve potential out-of-channel mentions"
                );
                return (Vec::new(), Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let candidates: Vec<UserProfile> = potential
            .iter()
            .filter_map(|name| resolved.get(name))
            .filter(|user| user.is_active() && !user.is_bot && !snapshot.is_member(&user.id))
            .filter(|user| seen.insert(user.id))
            .cloned()
            .collect();

        if !channel.group_constrained {
            return (candidates, Vec::new());
        }

        let group_members = match groups.group_member_ids(channel.id).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(
                    channel_id = %channel.id,
                    error = %err,
                    "Failed to load group members for constrained channel"
                );
                return (Vec::new(), Vec::new());
            }
        };

        candidates
            .into_iter()
            .partition(|user| group_members.contains(&user.id))
    }
}

fn apply_channel_mentions(mentions: &mut MentionResult, allowed: bool, keywords: &KeywordIndex) {
    if !allowed {
        mentions.strip_channel_mentions();
        return;
    }

    if mentions.here_mentioned
        && let Some(online) = keywords.get(HERE_MENTION)
    {
        for user_id in online {
            mentions.add_mention(*user_id, MentionKind::Channel);
        }
    }
}

fn add_implicit_mentions(
    mentions: &mut MentionResult,
    post: &Post,
    snapshot: &ChannelSnapshot,
    thread: Option<&ThreadContext>,
) {
    if snapshot.channel.channel_type == ChannelType::Direct {
        for user_id in snapshot.profiles.keys() {
            if *user_id != post.user_id {
                mentions.add_mention(*user_id, MentionKind::DirectMessage);
            }
        }
    }

    let Some(thread) = thread else {
        return;
    };
    if post.root_id.is_none() {
        return;
    }

    for participant in &thread.participants {
        let Some(profile) = snapshot.profiles.get(participant) else {
            continue;
        };
        let notify = match profile.notify_props.comments {
            CommentsMode::Any => true,
            CommentsMode::Root => thread.root_author == Some(*participant),
            CommentsMode::Never => false,
        };
        if notify {
            mentions.add_mention(*participant, MentionKind::Comment);
        }
    }

    for follower in &thread.followers {
        mentions.add_mention(*follower, MentionKind::Thread);
    }
}

/// Email eligibility for one recipient of a post.
pub fn user_allows_email(
    user: &UserProfile,
    status: PresenceStatus,
    channel_props: &ChannelNotifyProps,
    post: &Post,
    is_mention: bool,
) -> bool {
    if matches!(
        status,
        PresenceStatus::Online | PresenceStatus::DoNotDisturb | PresenceStatus::OutOfOffice
    ) {
        return false;
    }

    let email_enabled = match channel_props.email {
        Toggle::On => true,
        Toggle::Off => false,
        Toggle::Default => user.notify_props.email,
    };
    if !email_enabled {
        return false;
    }

    if channel_props.mark_unread == MarkUnread::Mention && !is_mention {
        return false;
    }

    post.post_type != PostType::AutoResponder
}

/// Push eligibility for one recipient of a post.
pub fn user_allows_push(
    user: &UserProfile,
    status: PresenceStatus,
    channel_props: &ChannelNotifyProps,
    kind: MentionKind,
) -> bool {
    if matches!(
        status,
        PresenceStatus::DoNotDisturb | PresenceStatus::OutOfOffice
    ) {
        return false;
    }

    let level = match channel_props.push {
        ChannelPush::Level(level) => level,
        ChannelPush::Default => user.notify_props.push,
    };
    let wants_push = match level {
        PushLevel::All => true,
        PushLevel::Mention => kind.is_explicit(),
        PushLevel::None => false,
    };
    if !wants_push {
        return false;
    }

    match user.notify_props.push_status {
        PushStatusThreshold::Online => true,
        PushStatusThreshold::Away => status != PresenceStatus::Online,
        PushStatusThreshold::Offline => status == PresenceStatus::Offline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_of(post_type: PostType) -> Post {
        let mut post = Post::new(Uuid::new_v4(), Uuid::new_v4(), "hello");
        post.post_type = post_type;
        post
    }

    #[test]
    fn channel_mentions_allowed_for_small_channels() {
        let policy = NotificationPolicy::default();
        let post = post_of(PostType::Regular);

        assert!(policy.allow_channel_mentions(&post, 5, true));
        assert!(policy.allow_channel_mentions(&post, 1000, true));
        assert!(!policy.allow_channel_mentions(&post, 1001, true));
        assert!(!policy.allow_channel_mentions(&post, 5, false));
    }

    #[test]
    fn header_and_purpose_changes_never_allow_channel_mentions() {
        let policy = NotificationPolicy::default();
        assert!(!policy.allow_channel_mentions(&post_of(PostType::HeaderChange), 5, true));
        assert!(!policy.allow_channel_mentions(&post_of(PostType::PurposeChange), 5, true));
        assert!(policy.allow_channel_mentions(&post_of(PostType::AddRemove), 5, true));
    }

    fn email_props(email: Toggle, mark_unread: MarkUnread) -> ChannelNotifyProps {
        ChannelNotifyProps {
            email,
            mark_unread,
            ..Default::default()
        }
    }

    #[test]
    fn email_allowed_when_offline_with_defaults() {
        let user = UserProfile::new("kim");
        let props = email_props(Toggle::Default, MarkUnread::All);
        let post = post_of(PostType::Other("some-post-type".into()));

        assert!(user_allows_email(&user, PresenceStatus::Offline, &props, &post, true));
        assert!(user_allows_email(&user, PresenceStatus::Away, &props, &post, false));
    }

    #[test]
    fn email_blocked_by_presence() {
        let user = UserProfile::new("kim");
        let props = email_props(Toggle::Default, MarkUnread::All);
        let post = post_of(PostType::Regular);

        for status in [
            PresenceStatus::Online,
            PresenceStatus::DoNotDisturb,
            PresenceStatus::OutOfOffice,
        ] {
            assert!(!user_allows_email(&user, status, &props, &post, true), "{status:?}");
        }
    }

    #[test]
    fn email_channel_override_wins_over_user_preference() {
        let mut user = UserProfile::new("kim");
        let post = post_of(PostType::Regular);

        let off = email_props(Toggle::Off, MarkUnread::All);
        assert!(!user_allows_email(&user, PresenceStatus::Offline, &off, &post, true));

        user.notify_props.email = false;
        let default = email_props(Toggle::Default, MarkUnread::All);
        assert!(!user_allows_email(&user, PresenceStatus::Offline, &default, &post, true));

        let on = email_props(Toggle::On, MarkUnread::All);
        assert!(user_allows_email(&user, PresenceStatus::Offline, &on, &post, true));
    }

    #[test]
    fn email_mark_unread_mention_requires_mention() {
        let user = UserProfile::new("kim");
        let props = email_props(Toggle::Default, MarkUnread::Mention);
        let post = post_of(PostType::Regular);

        assert!(!user_allows_email(&user, PresenceStatus::Offline, &props, &post, false));
        assert!(user_allows_email(&user, PresenceStatus::Offline, &props, &post, true));
    }

    #[test]
    fn email_never_for_auto_responder() {
        let user = UserProfile::new("kim");
        let props = email_props(Toggle::Default, MarkUnread::All);
        let post = post_of(PostType::AutoResponder);

        assert!(!user_allows_email(&user, PresenceStatus::Offline, &props, &post, true));
    }

    #[test]
    fn push_levels_and_thresholds() {
        let mut user = UserProfile::new("lee");
        let defaults = ChannelNotifyProps::default();

        assert!(user_allows_push(&user, PresenceStatus::Away, &defaults, MentionKind::Keyword));
        assert!(!user_allows_push(&user, PresenceStatus::Online, &defaults, MentionKind::Keyword));
        assert!(!user_allows_push(&user, PresenceStatus::Away, &defaults, MentionKind::Thread));
        assert!(!user_allows_push(
            &user,
            PresenceStatus::DoNotDisturb,
            &defaults,
            MentionKind::Keyword
        ));

        user.notify_props.push_status = PushStatusThreshold::Online;
        assert!(user_allows_push(&user, PresenceStatus::Online, &defaults, MentionKind::Comment));

        user.notify_props.push_status = PushStatusThreshold::Offline;
        assert!(!user_allows_push(&user, PresenceStatus::Away, &defaults, MentionKind::Keyword));
        assert!(user_allows_push(&user, PresenceStatus::Offline, &defaults, MentionKind::Keyword));
    }

    #[test]
    fn channel_push_override_replaces_user_level() {
        let user = UserProfile::new("lee");
        let all = ChannelNotifyProps {
            push: ChannelPush::Level(PushLevel::All),
            ..Default::default()
        };
        let none = ChannelNotifyProps {
            push: ChannelPush::Level(PushLevel::None),
            ..Default::default()
        };

        assert!(user_allows_push(&user, PresenceStatus::Offline, &all, MentionKind::Thread));
        assert!(!user_allows_push(&user, PresenceStatus::Offline, &none, MentionKind::Keyword));
    }
}
