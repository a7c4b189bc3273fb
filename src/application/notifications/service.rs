//! Notification orchestration for newly created posts.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::batching::EmailBatchingJob;
use crate::application::error::AppError;
use crate::application::repos::{ChannelStore, GroupDirectory, PermissionChecker, UserDirectory};
use crate::domain::entities::{Channel, Post};
use crate::domain::types::PresenceStatus;

use super::keywords::build_keywords;
use super::mentions::extract_post_mentions;
use super::policy::{ChannelSnapshot, NotificationPlan, NotificationPolicy, PolicyInput, ThreadContext};

/// Collaborators the notification pass reads from.
#[derive(Clone)]
pub struct NotificationDeps {
    pub channels: Arc<dyn ChannelStore>,
    pub users: Arc<dyn UserDirectory>,
    pub groups: Arc<dyn GroupDirectory>,
    pub permissions: Arc<dyn PermissionChecker>,
}

pub struct NotificationService {
    policy: NotificationPolicy,
    deps: NotificationDeps,
    email_batching: Option<Arc<EmailBatchingJob>>,
}

impl NotificationService {
    pub fn new(policy: NotificationPolicy, deps: NotificationDeps) -> Self {
        Self {
            policy,
            deps,
            email_batching: None,
        }
    }

    /// Queue email recipients into a digest instead of leaving delivery to the caller.
    pub fn with_email_batching(mut self, job: Arc<EmailBatchingJob>) -> Self {
        self.email_batching = Some(job);
        self
    }

    /// Load membership, preferences and presence for a channel.
    pub async fn load_snapshot(&self, channel: &Channel) -> Result<ChannelSnapshot, AppError> {
        let member_count = self.deps.channels.member_count(channel.id, true).await?;
        let profiles = self.deps.users.profiles_in_channel(channel.id).await?;
        let member_props = self
            .deps
            .channels
            .members(channel.id)
            .await?
            .into_iter()
            .map(|member| (member.user_id, member.notify_props))
            .collect();

        let users = &self.deps.users;
        let lookups = profiles.keys().map(|user_id| async move {
            let status = match users.status_of(*user_id).await {
                Ok(status) => status,
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "Status lookup failed; assuming offline");
                    PresenceStatus::Offline
                }
            };
            (*user_id, status)
        });
        let statuses: HashMap<Uuid, PresenceStatus> = join_all(lookups).await.into_iter().collect();

        Ok(ChannelSnapshot {
            channel: channel.clone(),
            profiles,
            member_props,
            statuses,
            member_count,
        })
    }

    /// Decide who is notified about `post` and how.
    #[instrument(skip_all, fields(post_id = %post.id, channel_id = %channel.id))]
    pub async fn plan_for_post(
        &self,
        post: &Post,
        channel: &Channel,
        thread: Option<&ThreadContext>,
    ) -> Result<NotificationPlan, AppError> {
        if post.channel_id != channel.id {
            return Err(AppError::validation(format!(
                "post {} does not belong to channel {}",
                post.id, channel.id
            )));
        }

        let snapshot = self.load_snapshot(channel).await?;
        let can_use_channel_mentions = self
            .deps
            .permissions
            .can_use_channel_mentions(post.user_id, channel.id)
            .await?;
        let allow_channel_mentions = self.policy.allow_channel_mentions(
            post,
            snapshot.member_count,
            can_use_channel_mentions,
        );

        let keywords = build_keywords(
            &snapshot.profiles,
            allow_channel_mentions,
            &snapshot.member_props,
            &snapshot.statuses,
        );
        let mentions = extract_post_mentions(post, &keywords);

        let plan = self
            .policy
            .evaluate(
                PolicyInput {
                    post,
                    snapshot: &snapshot,
                    thread,
                    keywords: &keywords,
                    mentions,
                    allow_channel_mentions,
                },
                self.deps.users.as_ref(),
                self.deps.groups.as_ref(),
            )
            .await;

        info!(
            recipients = plan.recipients.len(),
            emails = plan.email_count(),
            pushes = plan.push_count(),
            out_of_channel = plan.out_of_channel_users.len(),
            out_of_group = plan.out_of_group_users.len(),
            channel_wide = plan.channel_mentioned || plan.all_mentioned || plan.here_mentioned,
            "Notification plan ready"
        );

        Ok(plan)
    }

    /// Plan notifications and queue email recipients for the digest.
    pub async fn notify(
        &self,
        post: &Post,
        channel: &Channel,
        team_name: &str,
        thread: Option<&ThreadContext>,
    ) -> Result<NotificationPlan, AppError> {
        let plan = self.plan_for_post(post, channel, thread).await?;

        if let Some(job) = &self.email_batching {
            for recipient in plan.recipients.iter().filter(|r| r.send_email) {
                job.add(recipient.user_id, post.clone(), team_name);
            }
        }

        Ok(plan)
    }
}
