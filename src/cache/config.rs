//! Cache configuration.
//!
//! Controls the local cache namespaces in front of the backing stores.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_LAST_POST_TIME_LIMIT: usize = 25_000;
const DEFAULT_POSTS_LIMIT: usize = 2_000;
const DEFAULT_FILE_INFO_LIMIT: usize = 25_000;
const DEFAULT_MEMBER_COUNT_LIMIT: usize = 20_000;
const DEFAULT_MEMBER_COUNT_TTL_SECS: u64 = 30 * 60;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

/// Settings of the local cache layer, read from the `[cache]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve reads from the local cache; when off every call passes through.
    pub enable: bool,
    /// Maximum channels tracked in the last-post-time namespace.
    pub last_post_time_limit: usize,
    /// Maximum first pages of channel posts kept.
    pub posts_limit: usize,
    /// Maximum (post, include-deleted) file info lists kept.
    pub file_info_limit: usize,
    /// Maximum channel member counts kept.
    pub member_count_limit: usize,
    /// Optional wall-clock expiry for member counts.
    pub member_count_ttl_secs: Option<u64>,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            last_post_time_limit: DEFAULT_LAST_POST_TIME_LIMIT,
            posts_limit: DEFAULT_POSTS_LIMIT,
            file_info_limit: DEFAULT_FILE_INFO_LIMIT,
            member_count_limit: DEFAULT_MEMBER_COUNT_LIMIT,
            member_count_ttl_secs: Some(DEFAULT_MEMBER_COUNT_TTL_SECS),
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl CacheConfig {
    /// When false every read and write passes straight to the backing stores.
    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    /// Capacity of the `last_post_time` namespace, at least one.
    pub fn last_post_time_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.last_post_time_limit)
    }

    /// Capacity of the `posts` namespace.
    pub fn posts_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.posts_limit)
    }

    /// Capacity of the `file_infos` namespace.
    pub fn file_info_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.file_info_limit)
    }

    /// Capacity of the `member_counts` namespace.
    pub fn member_count_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.member_count_limit)
    }

    /// A zero TTL disables expiry.
    pub fn member_count_ttl(&self) -> Option<Duration> {
        self.member_count_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Batch size for draining events, clamped to at least one.
    pub fn consume_batch_limit(&self) -> usize {
        self.consume_batch_limit.max(1)
    }
}

fn non_zero(limit: usize) -> NonZeroUsize {
    NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN)
}
