//! Typed notification preferences.
//!
//! Preferences arrive as flat string maps. Unknown keys are ignored and
//! malformed values fall back to the documented default instead of failing.

use std::collections::HashMap;

use serde::Deserialize;

const EMAIL: &str = "email";
const PUSH: &str = "push";
const PUSH_STATUS: &str = "push_status";
const CHANNEL: &str = "channel";
const FIRST_NAME: &str = "first_name";
const MENTION_KEYS: &str = "mention_keys";
const COMMENTS: &str = "comments";
const MARK_UNREAD: &str = "mark_unread";
const IGNORE_CHANNEL_MENTIONS: &str = "ignore_channel_mentions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushLevel {
    All,
    #[default]
    Mention,
    None,
}

impl PushLevel {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(PushLevel::All),
            "mention" => Some(PushLevel::Mention),
            "none" => Some(PushLevel::None),
            _ => None,
        }
    }
}

/// Presence threshold at or below which push notifications are still sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushStatusThreshold {
    Online,
    #[default]
    Away,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentsMode {
    #[default]
    Never,
    Root,
    Any,
}

/// Three-state channel override; `Default` defers to the user preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toggle {
    #[default]
    Default,
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkUnread {
    #[default]
    All,
    Mention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPush {
    #[default]
    Default,
    Level(PushLevel),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "HashMap<String, String>")]
pub struct UserNotifyProps {
    pub email: bool,
    pub push: PushLevel,
    pub push_status: PushStatusThreshold,
    pub channel: bool,
    pub first_name: bool,
    pub mention_keys: Vec<String>,
    pub comments: CommentsMode,
}

impl Default for UserNotifyProps {
    fn default() -> Self {
        Self {
            email: true,
            push: PushLevel::default(),
            push_status: PushStatusThreshold::default(),
            channel: true,
            first_name: false,
            mention_keys: Vec::new(),
            comments: CommentsMode::default(),
        }
    }
}

impl UserNotifyProps {
    pub fn from_map(props: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| props.get(key).map(String::as_str);

        Self {
            email: get(EMAIL).map_or(defaults.email, |value| value != "false"),
            push: get(PUSH).and_then(PushLevel::parse).unwrap_or(defaults.push),
            push_status: match get(PUSH_STATUS) {
                Some("online") => PushStatusThreshold::Online,
                Some("offline") => PushStatusThreshold::Offline,
                Some("away") => PushStatusThreshold::Away,
                _ => defaults.push_status,
            },
            channel: get(CHANNEL).map_or(defaults.channel, |value| value == "true"),
            first_name: get(FIRST_NAME) == Some("true"),
            mention_keys: get(MENTION_KEYS)
                .map(split_mention_keys)
                .unwrap_or_default(),
            comments: match get(COMMENTS) {
                Some("root") => CommentsMode::Root,
                Some("any") => CommentsMode::Any,
                _ => CommentsMode::Never,
            },
        }
    }
}

impl From<HashMap<String, String>> for UserNotifyProps {
    fn from(props: HashMap<String, String>) -> Self {
        Self::from_map(&props)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "HashMap<String, String>")]
pub struct ChannelNotifyProps {
    pub email: Toggle,
    pub push: ChannelPush,
    pub mark_unread: MarkUnread,
    pub ignore_channel_mentions: Toggle,
}

impl ChannelNotifyProps {
    pub fn from_map(props: &HashMap<String, String>) -> Self {
        let get = |key: &str| props.get(key).map(String::as_str);

        Self {
            email: match get(EMAIL) {
                Some("true") => Toggle::On,
                Some("false") => Toggle::Off,
                _ => Toggle::Default,
            },
            push: get(PUSH)
                .and_then(PushLevel::parse)
                .map_or(ChannelPush::Default, ChannelPush::Level),
            mark_unread: match get(MARK_UNREAD) {
                Some("mention") => MarkUnread::Mention,
                _ => MarkUnread::All,
            },
            ignore_channel_mentions: match get(IGNORE_CHANNEL_MENTIONS) {
                Some("on") => Toggle::On,
                Some("off") => Toggle::Off,
                _ => Toggle::Default,
            },
        }
    }
}

impl From<HashMap<String, String>> for ChannelNotifyProps {
    fn from(props: HashMap<String, String>) -> Self {
        Self::from_map(&props)
    }
}

fn split_mention_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_lowercase)
        .collect()
}
