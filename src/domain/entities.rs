//! Domain entities shared by the notification engine and the cache layer.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    notify_props::{ChannelNotifyProps, UserNotifyProps},
    types::{ChannelType, NameFormat, PostType},
};

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub is_bot: bool,
    pub deleted_at: Option<OffsetDateTime>,
    pub notify_props: UserNotifyProps,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            nickname: String::new(),
            is_bot: false,
            deleted_at: None,
            notify_props: UserNotifyProps::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => String::new(),
        }
    }

    /// Render the user's name; falls back to the username when the
    /// requested fields are empty.
    pub fn display_name(&self, format: NameFormat) -> String {
        let name = match format {
            NameFormat::Username => String::new(),
            NameFormat::FullName => self.full_name(),
            NameFormat::NicknameFullName => {
                if self.nickname.is_empty() {
                    self.full_name()
                } else {
                    self.nickname.clone()
                }
            }
        };

        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: Uuid,
    pub team_id: Option<Uuid>,
    pub name: String,
    pub display_name: String,
    pub channel_type: ChannelType,
    pub group_constrained: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMember {
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub last_viewed_at: OffsetDateTime,
    pub notify_props: ChannelNotifyProps,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub pretext: String,
    pub text: String,
    pub fallback: String,
}

/// Recognized post properties; anything else in the property bag is ignored.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PostProps {
    pub attachments: Vec<Attachment>,
    pub override_username: Option<String>,
    #[serde(deserialize_with = "flag_from_bool_or_string")]
    pub from_webhook: bool,
}

fn flag_from_bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Text(value)) => value == "true",
        None => false,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub root_id: Option<Uuid>,
    pub message: String,
    pub post_type: PostType,
    pub props: PostProps,
    pub create_at: OffsetDateTime,
    pub update_at: OffsetDateTime,
}

impl Post {
    pub fn new(channel_id: Uuid, user_id: Uuid, message: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            channel_id,
            user_id,
            root_id: None,
            message: message.into(),
            post_type: PostType::Regular,
            props: PostProps::default(),
            create_at: now,
            update_at: now,
        }
    }

    /// Message body followed by every attachment pretext and text, in order.
    pub fn mention_fields(&self) -> Vec<&str> {
        let mut fields = Vec::with_capacity(1 + self.props.attachments.len() * 2);
        fields.push(self.message.as_str());
        for attachment in &self.props.attachments {
            fields.push(attachment.pretext.as_str());
            fields.push(attachment.text.as_str());
        }
        fields.retain(|field| !field.is_empty());
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostList {
    pub order: Vec<Uuid>,
    pub posts: HashMap<Uuid, Post>,
}

impl PostList {
    pub fn push(&mut self, post: Post) {
        self.order.push(post.id);
        self.posts.insert(post.id, post);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn latest_update(&self) -> Option<OffsetDateTime> {
        self.posts.values().map(|post| post.update_at).max()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub id: Uuid,
    pub post_id: Option<Uuid>,
    pub name: String,
    pub size: u64,
    pub deleted_at: Option<OffsetDateTime>,
}
