//! Mention detection and notification fan-out.
//!
//! A notification pass builds a [`KeywordIndex`] from the channel snapshot,
//! scans the post with [`extract_mentions`] and hands the result to
//! [`NotificationPolicy::evaluate`] for recipients and delivery flags.

mod keywords;
mod markdown;
mod mentions;
mod names;
mod policy;
mod service;

pub use keywords::{
    ALL_MENTION, CHANNEL_MENTION, HERE_MENTION, KeywordIndex, RESERVED_MENTIONS, build_keywords,
    is_reserved,
};
pub use markdown::text_fragments;
pub use mentions::{MentionResult, extract_mentions, extract_post_mentions};
pub use names::PostNotification;
pub use policy::{
    ChannelSnapshot, DEFAULT_MAX_NOTIFICATIONS_PER_CHANNEL, NotificationPlan, NotificationPolicy,
    PolicyInput, Recipient, ThreadContext, user_allows_email, user_allows_push,
};
pub use service::{NotificationDeps, NotificationService};
