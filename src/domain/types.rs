//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "P")]
    Private,
    #[serde(rename = "D")]
    Direct,
    #[serde(rename = "G")]
    Group,
}

impl ChannelType {
    /// Direct and group conversations are closed membership sets.
    pub fn is_conversation(self) -> bool {
        matches!(self, ChannelType::Direct | ChannelType::Group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
    #[serde(rename = "dnd")]
    DoNotDisturb,
    #[serde(rename = "ooo")]
    OutOfOffice,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Offline => "offline",
            PresenceStatus::DoNotDisturb => "dnd",
            PresenceStatus::OutOfOffice => "ooo",
        }
    }
}

/// Post type tag. Unknown `system_*` types are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PostType {
    #[default]
    Regular,
    HeaderChange,
    PurposeChange,
    DisplayNameChange,
    AddRemove,
    AutoResponder,
    Other(String),
}

impl PostType {
    pub fn as_str(&self) -> &str {
        match self {
            PostType::Regular => "",
            PostType::HeaderChange => "system_header_change",
            PostType::PurposeChange => "system_purpose_change",
            PostType::DisplayNameChange => "system_displayname_change",
            PostType::AddRemove => "system_add_remove",
            PostType::AutoResponder => "system_auto_responder",
            PostType::Other(value) => value.as_str(),
        }
    }

    pub fn is_system_message(&self) -> bool {
        self.as_str().starts_with("system_")
    }
}

impl From<String> for PostType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => PostType::Regular,
            "system_header_change" => PostType::HeaderChange,
            "system_purpose_change" => PostType::PurposeChange,
            "system_displayname_change" => PostType::DisplayNameChange,
            "system_add_remove" => PostType::AddRemove,
            "system_auto_responder" => PostType::AutoResponder,
            _ => PostType::Other(value),
        }
    }
}

impl From<PostType> for String {
    fn from(value: PostType) -> Self {
        value.as_str().to_string()
    }
}

/// Why a user is notified about a post.
///
/// Kinds are ordered by tier; `Keyword` and `Channel` share the top tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    Thread,
    DirectMessage,
    Comment,
    Keyword,
    Channel,
}

impl MentionKind {
    pub fn tier(self) -> u8 {
        match self {
            MentionKind::Thread => 0,
            MentionKind::DirectMessage => 1,
            MentionKind::Comment => 2,
            MentionKind::Keyword | MentionKind::Channel => 3,
        }
    }

    /// True when this kind counts as an explicit mention of the user.
    pub fn is_explicit(self) -> bool {
        self.tier() >= MentionKind::DirectMessage.tier()
    }
}

impl fmt::Display for MentionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MentionKind::Thread => "thread",
            MentionKind::DirectMessage => "direct_message",
            MentionKind::Comment => "comment",
            MentionKind::Keyword => "keyword",
            MentionKind::Channel => "channel",
        };
        f.write_str(label)
    }
}

/// How user names are rendered in notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameFormat {
    #[default]
    Username,
    FullName,
    NicknameFullName,
}

/// How much of a post is included in email and push payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    #[default]
    Full,
    Generic,
}
