//! Mention keyword index built from a channel membership snapshot.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::entities::UserProfile;
use crate::domain::notify_props::{ChannelNotifyProps, Toggle};
use crate::domain::types::PresenceStatus;

pub const CHANNEL_MENTION: &str = "@channel";
pub const ALL_MENTION: &str = "@all";
pub const HERE_MENTION: &str = "@here";

/// Reserved `@`-words; never reported as potential out-of-channel mentions.
pub const RESERVED_MENTIONS: [&str; 3] = [CHANNEL_MENTION, ALL_MENTION, HERE_MENTION];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_MENTIONS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(word))
}

/// Keyword to candidate user ids.
///
/// Ids are kept in insertion order and duplicates are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordIndex {
    entries: HashMap<String, Vec<Uuid>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, keyword: impl Into<String>, user_id: Uuid) {
        self.entries.entry(keyword.into()).or_default().push(user_id);
    }

    pub fn get(&self, keyword: &str) -> Option<&[Uuid]> {
        self.entries.get(keyword).map(Vec::as_slice)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.entries.contains_key(keyword)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Uuid])> {
        self.entries
            .iter()
            .map(|(keyword, ids)| (keyword.as_str(), ids.as_slice()))
    }
}

impl<K: Into<String>> FromIterator<(K, Uuid)> for KeywordIndex {
    fn from_iter<T: IntoIterator<Item = (K, Uuid)>>(iter: T) -> Self {
        let mut index = KeywordIndex::new();
        for (keyword, user_id) in iter {
            index.add(keyword, user_id);
        }
        index
    }
}

/// Build the keyword index for one notification pass.
///
/// `member_props` holds each member's channel-level preferences and
/// `statuses` their current presence; missing entries mean defaults and
/// offline respectively.
pub fn build_keywords(
    profiles: &HashMap<Uuid, UserProfile>,
    allow_channel_mentions: bool,
    member_props: &HashMap<Uuid, ChannelNotifyProps>,
    statuses: &HashMap<Uuid, PresenceStatus>,
) -> KeywordIndex {
    let mut index = KeywordIndex::new();

    let mut ordered: Vec<&UserProfile> = profiles.values().collect();
    ordered.sort_by_key(|profile| profile.id);

    for profile in ordered {
        add_keywords_for_user(
            &mut index,
            profile,
            member_props.get(&profile.id),
            statuses.get(&profile.id).copied(),
            allow_channel_mentions,
        );
    }

    index
}

fn add_keywords_for_user(
    index: &mut KeywordIndex,
    profile: &UserProfile,
    channel_props: Option<&ChannelNotifyProps>,
    status: Option<PresenceStatus>,
    allow_channel_mentions: bool,
) {
    let props = &profile.notify_props;

    index.add(format!("@{}", profile.username.to_lowercase()), profile.id);

    for key in &props.mention_keys {
        index.add(key.clone(), profile.id);
    }

    if props.first_name && !profile.first_name.is_empty() {
        index.add(profile.first_name.clone(), profile.id);
    }

    let ignores_channel_mentions = channel_props
        .is_some_and(|channel| channel.ignore_channel_mentions == Toggle::On);

    if allow_channel_mentions && props.channel && !ignores_channel_mentions {
        index.add(CHANNEL_MENTION, profile.id);
        index.add(ALL_MENTION, profile.id);
        if status == Some(PresenceStatus::Online) {
            index.add(HERE_MENTION, profile.id);
        }
    }
}
