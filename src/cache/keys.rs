//! Cache namespaces and invalidation targets.

use std::fmt;

use uuid::Uuid;

/// Page sizes whose first page is kept in the `posts` namespace.
pub const CACHEABLE_PAGE_SIZES: [u32; 2] = [30, 60];

/// A logical group of cache entries sharing invalidation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    LastPostTime,
    Posts,
    FileInfos,
    MemberCounts,
}

impl Namespace {
    /// Every namespace, in clearing order.
    pub const ALL: [Namespace; 4] = [
        Namespace::LastPostTime,
        Namespace::Posts,
        Namespace::FileInfos,
        Namespace::MemberCounts,
    ];

    /// Label used in metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::LastPostTime => "last_post_time",
            Namespace::Posts => "posts",
            Namespace::FileInfos => "file_infos",
            Namespace::MemberCounts => "member_counts",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of the `posts` namespace: first page of a channel at a given size.
pub type PostsPageKey = (Uuid, u32);

/// Key of the `file_infos` namespace: post id and include-deleted flag.
pub type FileInfoKey = (Uuid, bool);

/// What an invalidation hook asks the consumer to drop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    LastPostTime(Uuid),
    /// Every cached page size of the channel.
    Posts(Uuid),
    FileInfos { post_id: Uuid, include_deleted: bool },
    MemberCount(Uuid),
    /// The whole namespace.
    All(Namespace),
}

impl CacheKey {
    /// Namespace the key belongs to.
    pub fn namespace(&self) -> Namespace {
        match self {
            CacheKey::LastPostTime(_) => Namespace::LastPostTime,
            CacheKey::Posts(_) => Namespace::Posts,
            CacheKey::FileInfos { .. } => Namespace::FileInfos,
            CacheKey::MemberCount(_) => Namespace::MemberCounts,
            CacheKey::All(namespace) => *namespace,
        }
    }

    /// Both include-deleted variants of a post's file infos.
    pub fn file_infos_of(post_id: Uuid) -> [CacheKey; 2] {
        [
            CacheKey::FileInfos {
                post_id,
                include_deleted: false,
            },
            CacheKey::FileInfos {
                post_id,
                include_deleted: true,
            },
        ]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::LastPostTime(id) => write!(f, "last_post_time:{id}"),
            CacheKey::Posts(id) => write!(f, "posts:{id}"),
            CacheKey::FileInfos {
                post_id,
                include_deleted,
            } => write!(f, "file_infos:{post_id}:{include_deleted}"),
            CacheKey::MemberCount(id) => write!(f, "member_counts:{id}"),
            CacheKey::All(namespace) => write!(f, "{namespace}:*"),
        }
    }
}

/// Only the first page at one of [`CACHEABLE_PAGE_SIZES`] is cached.
pub fn is_cacheable_page(page: u32, per_page: u32) -> bool {
    page == 0 && CACHEABLE_PAGE_SIZES.contains(&per_page)
}
