//! Keyword building and mention extraction over realistic posts.

use std::collections::HashMap;

use herald::application::notifications::{build_keywords, extract_post_mentions};
use herald::domain::entities::{Attachment, Post, UserProfile};
use herald::domain::notify_props::{ChannelNotifyProps, Toggle};
use herald::domain::types::{MentionKind, PresenceStatus};
use uuid::Uuid;

struct Team {
    profiles: HashMap<Uuid, UserProfile>,
    statuses: HashMap<Uuid, PresenceStatus>,
    alice: Uuid,
    bob: Uuid,
    carol: Uuid,
}

fn team() -> Team {
    let mut alice = UserProfile::new("Alice");
    alice.first_name = "Alice".into();
    alice.notify_props.first_name = true;
    alice.notify_props.mention_keys = vec!["deploy".into()];

    let bob = UserProfile::new("bob.smith");
    let carol = UserProfile::new("carol");

    let statuses = HashMap::from([
        (alice.id, PresenceStatus::Online),
        (bob.id, PresenceStatus::Away),
        (carol.id, PresenceStatus::Online),
    ]);

    Team {
        alice: alice.id,
        bob: bob.id,
        carol: carol.id,
        statuses,
        profiles: [alice, bob, carol]
            .into_iter()
            .map(|user| (user.id, user))
            .collect(),
    }
}

fn post(message: &str) -> Post {
    Post::new(Uuid::new_v4(), Uuid::new_v4(), message)
}

#[test]
fn markdown_post_resolves_members_and_collects_strangers() {
    let team = team();
    let keywords = build_keywords(&team.profiles, true, &HashMap::new(), &team.statuses);

    let message = "\
# Release notes

Thanks @alice and @bob.smith! Ping @dave about the `@carol` snippet.

```
@carol should not be pinged from code
```

> Alice, the deploy is done.";

    let result = extract_post_mentions(&post(message), &keywords);

    assert_eq!(result.kind_of(&team.alice), Some(MentionKind::Keyword));
    assert_eq!(result.kind_of(&team.bob), Some(MentionKind::Keyword));
    assert_eq!(result.kind_of(&team.carol), None);
    assert_eq!(result.other_potential_mentions, vec!["dave".to_string()]);
    assert!(!result.is_channel_wide());
}

#[test]
fn here_in_attachment_is_flagged_without_tagging_users() {
    let team = team();
    let keywords = build_keywords(&team.profiles, true, &HashMap::new(), &team.statuses);
    assert_eq!(keywords.get("@here").map(<[Uuid]>::len), Some(2));

    let mut post = post("build finished");
    post.props.attachments = vec![Attachment {
        pretext: "heads up @here".into(),
        ..Default::default()
    }];

    let result = extract_post_mentions(&post, &keywords);

    assert!(result.here_mentioned);
    assert!(result.mentions.is_empty());
}

#[test]
fn channel_mentions_need_permission_and_respect_opt_outs() {
    let team = team();
    let muted = ChannelNotifyProps {
        ignore_channel_mentions: Toggle::On,
        ..Default::default()
    };
    let member_props = HashMap::from([(team.carol, muted)]);

    let keywords = build_keywords(&team.profiles, true, &member_props, &team.statuses);
    let result = extract_post_mentions(&post("@channel standup in 5"), &keywords);
    assert!(result.channel_mentioned);
    assert_eq!(result.kind_of(&team.alice), Some(MentionKind::Channel));
    assert_eq!(result.kind_of(&team.carol), None);

    let keywords = build_keywords(&team.profiles, false, &member_props, &team.statuses);
    let result = extract_post_mentions(&post("@channel standup in 5"), &keywords);
    assert!(result.channel_mentioned);
    assert!(result.mentions.is_empty());
}

#[test]
fn trailing_punctuation_and_dotted_usernames() {
    let team = team();
    let keywords = build_keywords(&team.profiles, true, &HashMap::new(), &team.statuses);

    let result = extract_post_mentions(&post("ask @bob.smith. or @bob.smith: or @alice..."), &keywords);

    assert_eq!(result.kind_of(&team.bob), Some(MentionKind::Keyword));
    assert_eq!(result.kind_of(&team.alice), Some(MentionKind::Keyword));
    assert!(result.other_potential_mentions.is_empty());
}
