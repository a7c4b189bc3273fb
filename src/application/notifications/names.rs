//! Display names used in notification payloads.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::entities::{Channel, Post, UserProfile};
use crate::domain::types::{ChannelType, NameFormat};

const SYSTEM_SENDER_NAME: &str = "System";

/// A post together with the context needed to label its notifications.
#[derive(Debug, Clone, Copy)]
pub struct PostNotification<'a> {
    pub post: &'a Post,
    pub channel: &'a Channel,
    pub sender: &'a UserProfile,
    pub profiles: &'a HashMap<Uuid, UserProfile>,
}

impl PostNotification<'_> {
    /// Channel label as seen by `recipient_id`.
    pub fn channel_name(&self, format: NameFormat, recipient_id: Uuid) -> String {
        match self.channel.channel_type {
            ChannelType::Direct => user_label(self.sender, format),
            ChannelType::Group => {
                let mut names: Vec<String> = self
                    .profiles
                    .values()
                    .filter(|profile| profile.id != recipient_id)
                    .map(|profile| profile.display_name(format))
                    .collect();
                names.sort();
                names.join(", ")
            }
            ChannelType::Open | ChannelType::Private => self.channel.display_name.clone(),
        }
    }

    pub fn sender_name(&self, format: NameFormat, allow_overrides: bool) -> String {
        if self.post.post_type.is_system_message() {
            return SYSTEM_SENDER_NAME.to_string();
        }

        if allow_overrides
            && self.channel.channel_type != ChannelType::Direct
            && self.post.props.from_webhook
            && let Some(name) = self.post.props.override_username.as_deref()
            && !name.is_empty()
        {
            return name.to_string();
        }

        user_label(self.sender, format)
    }
}

fn user_label(user: &UserProfile, format: NameFormat) -> String {
    match format {
        NameFormat::Username => format!("@{}", user.username),
        _ => user.display_name(format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PostType;

    fn user(name: &str) -> UserProfile {
        let mut profile = UserProfile::new(name.to_lowercase());
        profile.first_name = name.to_string();
        profile.last_name = name.to_string();
        profile.nickname = name.to_string();
        profile
    }

    fn channel(channel_type: ChannelType) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            team_id: None,
            name: "channel".into(),
            display_name: "My Channel".into(),
            channel_type,
            group_constrained: false,
        }
    }

    #[test]
    fn channel_name_by_channel_type() {
        let sender = user("Sender");
        let recipient = user("Recipient");
        let other = user("Other");
        let profiles: HashMap<Uuid, UserProfile> = [&sender, &recipient, &other]
            .into_iter()
            .map(|profile| (profile.id, profile.clone()))
            .collect();
        let post = Post::new(Uuid::new_v4(), sender.id, "hi");

        let cases = [
            (ChannelType::Open, NameFormat::Username, "My Channel"),
            (ChannelType::Direct, NameFormat::Username, "@sender"),
            (ChannelType::Direct, NameFormat::FullName, "Sender Sender"),
            (ChannelType::Direct, NameFormat::NicknameFullName, "Sender"),
            (ChannelType::Group, NameFormat::Username, "other, sender"),
            (ChannelType::Group, NameFormat::FullName, "Other Other, Sender Sender"),
            (ChannelType::Group, NameFormat::NicknameFullName, "Other, Sender"),
        ];

        for (channel_type, format, expected) in cases {
            let channel = channel(channel_type);
            let notification = PostNotification {
                post: &post,
                channel: &channel,
                sender: &sender,
                profiles: &profiles,
            };
            assert_eq!(
                notification.channel_name(format, recipient.id),
                expected,
                "{channel_type:?} {format:?}"
            );
        }
    }

    #[test]
    fn sender_name_formats_and_overrides() {
        let sender = user("Sender");
        let profiles = HashMap::new();
        let open = channel(ChannelType::Open);
        let direct = channel(ChannelType::Direct);

        let plain = Post::new(open.id, sender.id, "hi");
        let mut overridden = plain.clone();
        overridden.props.override_username = Some("Overridden".into());
        overridden.props.from_webhook = true;
        let mut system = plain.clone();
        system.post_type = PostType::Other("system_custom".into());

        let name = |post: &Post, channel: &Channel, format, allow| {
            PostNotification {
                post,
                channel,
                sender: &sender,
                profiles: &profiles,
            }
            .sender_name(format, allow)
        };

        assert_eq!(name(&plain, &open, NameFormat::Username, false), "@sender");
        assert_eq!(name(&plain, &open, NameFormat::FullName, false), "Sender Sender");
        assert_eq!(name(&plain, &open, NameFormat::NicknameFullName, false), "Sender");
        assert_eq!(name(&system, &open, NameFormat::Username, false), "System");
        assert_eq!(name(&overridden, &open, NameFormat::Username, true), "Overridden");
        assert_eq!(name(&overridden, &direct, NameFormat::Username, true), "@sender");
        assert_eq!(name(&overridden, &open, NameFormat::Username, false), "@sender");
    }
}
