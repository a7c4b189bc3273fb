//! Mention extraction over message and attachment text.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::entities::Post;
use crate::domain::types::MentionKind;

use super::keywords::{ALL_MENTION, CHANNEL_MENTION, HERE_MENTION, KeywordIndex, is_reserved};
use super::markdown::text_fragments;

const TRIM_CHARS: [char; 4] = [':', '.', '-', '_'];
const SPLIT_CHARS: [char; 3] = ['.', '-', ':'];

/// Mentions found in one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionResult {
    pub mentions: HashMap<Uuid, MentionKind>,
    pub channel_mentioned: bool,
    pub all_mentioned: bool,
    pub here_mentioned: bool,
    /// Unresolved `@name` tokens, lowercase, in order of first appearance.
    pub other_potential_mentions: Vec<String>,
}

impl MentionResult {
    /// Record a mention unless the user already holds a higher-tier one.
    pub fn add_mention(&mut self, user_id: Uuid, kind: MentionKind) {
        match self.mentions.get(&user_id) {
            Some(existing) if existing.tier() > kind.tier() => {}
            _ => {
                self.mentions.insert(user_id, kind);
            }
        }
    }

    fn add_mentions(&mut self, user_ids: &[Uuid], kind: MentionKind) {
        for user_id in user_ids {
            self.add_mention(*user_id, kind);
        }
    }

    pub fn kind_of(&self, user_id: &Uuid) -> Option<MentionKind> {
        self.mentions.get(user_id).copied()
    }

    pub fn is_channel_wide(&self) -> bool {
        self.channel_mentioned || self.all_mentioned || self.here_mentioned
    }

    /// Drop every channel-wide tag and flag; keyword mentions stay.
    pub fn strip_channel_mentions(&mut self) {
        self.mentions.retain(|_, kind| *kind != MentionKind::Channel);
        self.channel_mentioned = false;
        self.all_mentioned = false;
        self.here_mentioned = false;
    }
}

/// Scan every field for mentions against the keyword index.
pub fn extract_mentions<S: AsRef<str>>(fields: &[S], keywords: &KeywordIndex) -> MentionResult {
    let mut extractor = Extractor::new(keywords);
    for field in fields {
        let field = field.as_ref();
        if field.is_empty() {
            continue;
        }
        for fragment in text_fragments(field) {
            extractor.process_text(&fragment);
        }
    }
    extractor.finish()
}

/// Scan a post's message and attachment pretext/text.
pub fn extract_post_mentions(post: &Post, keywords: &KeywordIndex) -> MentionResult {
    extract_mentions(&post.mention_fields(), keywords)
}

struct Extractor<'a> {
    keywords: &'a KeywordIndex,
    result: MentionResult,
    /// Resolved tokens, lowercase and without the leading `@`.
    resolved: Vec<String>,
}

impl<'a> Extractor<'a> {
    fn new(keywords: &'a KeywordIndex) -> Self {
        Self {
            keywords,
            result: MentionResult::default(),
            resolved: Vec::new(),
        }
    }

    fn process_text(&mut self, text: &str) {
        for word in text.split(|c: char| !is_word_char(c)) {
            if word.is_empty() || is_emoji(word) {
                continue;
            }

            let word = word.trim_start_matches(TRIM_CHARS);
            if word.is_empty() {
                continue;
            }

            if !self.check_trimmed(word) {
                if word.starts_with('@') && !is_reserved(word.trim_end_matches(TRIM_CHARS)) {
                    self.add_potential(word);
                } else if word.contains(SPLIT_CHARS) {
                    for piece in word.split(SPLIT_CHARS) {
                        if piece.is_empty() || self.check_for_mention(piece) {
                            continue;
                        }
                        if piece.starts_with('@') && !is_reserved(piece) {
                            self.add_potential(piece);
                        }
                    }
                }
            }

            self.check_multibyte(word);
        }
    }

    /// Try the word, then each form with one more trailing separator removed.
    fn check_trimmed(&mut self, word: &str) -> bool {
        let mut candidate = word;
        loop {
            if self.check_for_mention(candidate) {
                return true;
            }
            match candidate.strip_suffix(TRIM_CHARS) {
                Some(shorter) if !shorter.is_empty() => candidate = shorter,
                _ => return false,
            }
        }
    }

    fn check_for_mention(&mut self, word: &str) -> bool {
        let lower = word.to_lowercase();

        match lower.as_str() {
            HERE_MENTION => {
                self.result.here_mentioned = true;
                return true;
            }
            CHANNEL_MENTION => {
                self.result.channel_mentioned = true;
                self.tag_bucket(CHANNEL_MENTION);
                return true;
            }
            ALL_MENTION => {
                self.result.all_mentioned = true;
                self.tag_bucket(ALL_MENTION);
                return true;
            }
            _ => {}
        }

        let keywords = self.keywords;
        let ids = keywords.get(&lower).or_else(|| keywords.get(word));
        match ids {
            Some(ids) => {
                self.result.add_mentions(ids, MentionKind::Keyword);
                self.resolved.push(lower.trim_start_matches('@').to_string());
                true
            }
            None => false,
        }
    }

    fn tag_bucket(&mut self, bucket: &str) {
        let keywords = self.keywords;
        if let Some(ids) = keywords.get(bucket) {
            self.result.add_mentions(ids, MentionKind::Channel);
        }
    }

    fn check_multibyte(&mut self, word: &str) {
        let keywords = self.keywords;
        for (keyword, ids) in keywords.iter() {
            if !ids.is_empty() && !keyword.is_ascii() && word.contains(keyword) {
                self.result.add_mentions(ids, MentionKind::Keyword);
            }
        }
    }

    fn add_potential(&mut self, word: &str) {
        let name = word
            .trim_end_matches(TRIM_CHARS)
            .trim_start_matches('@')
            .to_lowercase();
        if !name.is_empty() && !self.result.other_potential_mentions.contains(&name) {
            self.result.other_potential_mentions.push(name);
        }
    }

    fn finish(mut self) -> MentionResult {
        let resolved = &self.resolved;
        self.result.other_potential_mentions.retain(|potential| {
            !resolved.iter().any(|token| {
                token
                    .strip_prefix(potential.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
            })
        });
        self.result
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ':' | '.' | '-' | '_' | '@')
}

fn is_emoji(word: &str) -> bool {
    word.len() > 1 && word.starts_with(':') && word.ends_with(':')
}
