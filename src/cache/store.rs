//! Cache storage.
//!
//! Each namespace is an LRU map with an invalidation epoch. A fetch only
//! populates the cache when no invalidation happened while it was running,
//! so a slow read can never resurrect a value that a write already dropped.

use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::domain::entities::{FileInfo, PostList};
use crate::util::lock::rw_write;

use super::config::CacheConfig;
use super::flight::InFlight;
use super::keys::{CACHEABLE_PAGE_SIZES, CacheKey, FileInfoKey, Namespace, PostsPageKey};

const SOURCE: &str = "cache::store";
const METRIC_HIT: &str = "herald_cache_hit_total";
const METRIC_MISS: &str = "herald_cache_miss_total";
const METRIC_EVICT: &str = "herald_cache_evict_total";
const METRIC_INVALIDATE: &str = "herald_cache_invalidate_total";

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// One cache namespace: a bounded LRU map with optional TTL and an
/// invalidation epoch.
pub struct NamespaceCache<K, V>
where
    K: Eq + Hash + Clone,
{
    namespace: Namespace,
    entries: RwLock<LruCache<K, Entry<V>>>,
    ttl: Option<Duration>,
    epoch: AtomicU64,
    flights: InFlight<K>,
}

impl<K, V> NamespaceCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Empty namespace holding at most `capacity` entries. Entries older than
    /// `ttl` are treated as absent.
    pub fn new(namespace: Namespace, capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            namespace,
            entries: RwLock::new(LruCache::new(capacity)),
            ttl,
            epoch: AtomicU64::new(0),
            flights: InFlight::new(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Cached value for `key`; expired entries are dropped and count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if !self.is_expired(entry) => {
                counter!(METRIC_HIT, "namespace" => self.namespace.as_str()).increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        counter!(METRIC_MISS, "namespace" => self.namespace.as_str()).increment(1);
        None
    }

    /// Store `value`, evicting the least recently used entry when full.
    pub fn put(&self, key: K, value: V) {
        let mut entries = rw_write(&self.entries, SOURCE, "put");
        self.insert(&mut entries, key, value);
    }

    /// Store `value` only if nothing was invalidated since `epoch` was read.
    pub fn put_if_current(&self, key: K, value: V, epoch: u64) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "put_if_current");
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(
                namespace = self.namespace.as_str(),
                "Discarded fetch result that raced an invalidation"
            );
            return false;
        }
        self.insert(&mut entries, key, value);
        true
    }

    /// Drop `key` and advance the epoch so in-flight fetches are not stored.
    pub fn invalidate(&self, key: &K) {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
        entries.pop(key);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        counter!(METRIC_INVALIDATE, "namespace" => self.namespace.as_str()).increment(1);
    }

    /// Drop every entry and advance the epoch.
    pub fn clear(&self) {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        entries.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        counter!(METRIC_INVALIDATE, "namespace" => self.namespace.as_str()).increment(1);
    }

    /// Counter bumped by every invalidation; read before a fetch and pass
    /// to [`NamespaceCache::put_if_current`].
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        rw_write(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-through with per-key coalescing.
    ///
    /// With `use_cache` a hit is returned without calling `fetch`, and
    /// concurrent misses for one key share a single fetch. Without it the
    /// backing store is always asked and the fresh value replaces the entry.
    /// Errors are returned unchanged and leave the cache untouched.
    pub async fn read_through<F, Fut, E>(&self, key: K, use_cache: bool, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if !use_cache {
            return self.fetch_and_store(key, fetch).await;
        }

        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let _flight = self.flights.acquire(key.clone()).await;
        if let Some(value) = self.peek(&key) {
            return Ok(value);
        }

        self.fetch_and_store(key, fetch).await
    }

    async fn fetch_and_store<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let epoch = self.epoch();
        let value = fetch().await?;
        self.put_if_current(key, value.clone(), epoch);
        Ok(value)
    }

    /// Lookup that does not record hit or miss metrics.
    fn peek(&self, key: &K) -> Option<V> {
        let mut entries = rw_write(&self.entries, SOURCE, "peek");
        entries
            .get(key)
            .filter(|entry| !self.is_expired(entry))
            .map(|entry| entry.value.clone())
    }

    fn insert(&self, entries: &mut LruCache<K, Entry<V>>, key: K, value: V) {
        let entry = Entry {
            value,
            stored_at: Instant::now(),
        };
        if let Some((evicted, _)) = entries.push(key.clone(), entry)
            && evicted != key
        {
            counter!(METRIC_EVICT, "namespace" => self.namespace.as_str()).increment(1);
        }
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.stored_at.elapsed() >= ttl)
    }
}

/// The namespaces of the local cache layer.
pub struct CacheStores {
    pub last_post_time: NamespaceCache<Uuid, OffsetDateTime>,
    pub posts: NamespaceCache<PostsPageKey, PostList>,
    pub file_infos: NamespaceCache<FileInfoKey, Vec<FileInfo>>,
    pub member_counts: NamespaceCache<Uuid, u64>,
}

impl CacheStores {
    /// Namespaces sized from `config`; only member counts expire.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            last_post_time: NamespaceCache::new(
                Namespace::LastPostTime,
                config.last_post_time_limit_non_zero(),
                None,
            ),
            posts: NamespaceCache::new(Namespace::Posts, config.posts_limit_non_zero(), None),
            file_infos: NamespaceCache::new(
                Namespace::FileInfos,
                config.file_info_limit_non_zero(),
                None,
            ),
            member_counts: NamespaceCache::new(
                Namespace::MemberCounts,
                config.member_count_limit_non_zero(),
                config.member_count_ttl(),
            ),
        }
    }

    /// Apply one invalidation key. A posts key drops every cached page size
    /// of the channel.
    pub fn invalidate(&self, key: &CacheKey) {
        match key {
            CacheKey::LastPostTime(channel_id) => self.last_post_time.invalidate(channel_id),
            CacheKey::Posts(channel_id) => {
                for per_page in CACHEABLE_PAGE_SIZES {
                    self.posts.invalidate(&(*channel_id, per_page));
                }
            }
            CacheKey::FileInfos {
                post_id,
                include_deleted,
            } => self.file_infos.invalidate(&(*post_id, *include_deleted)),
            CacheKey::MemberCount(channel_id) => self.member_counts.invalidate(channel_id),
            CacheKey::All(namespace) => self.clear_namespace(*namespace),
        }
    }

    pub fn clear_namespace(&self, namespace: Namespace) {
        match namespace {
            Namespace::LastPostTime => self.last_post_time.clear(),
            Namespace::Posts => self.posts.clear(),
            Namespace::FileInfos => self.file_infos.clear(),
            Namespace::MemberCounts => self.member_counts.clear(),
        }
    }

    /// Empty every namespace.
    pub fn clear_all(&self) {
        for namespace in Namespace::ALL {
            self.clear_namespace(namespace);
        }
    }
}
