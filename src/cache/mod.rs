//! Local cache layer.
//!
//! Sits in front of the backing stores for hot entities: last post time per
//! channel, the first page of channel posts, file infos per post and channel
//! member counts.
//!
//! Reads go through [`NamespaceCache::read_through`], which coalesces
//! concurrent misses per key. Writes through [`LocalCacheLayer`] publish
//! domain events; [`InvalidationHooks`] map each event to the keys it makes
//! stale and the consumer drops them before the write returns.
//!
//! ```toml
//! [cache]
//! enable = true
//! last_post_time_limit = 25000
//! member_count_ttl_secs = 1800
//! ```

mod config;
mod consumer;
mod events;
mod flight;
mod hooks;
mod keys;
mod layer;
mod planner;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, EventKind, EventQueue, EventType, Sequence};
pub use flight::{FlightGuard, InFlight};
pub use hooks::{InvalidationHook, InvalidationHooks};
pub use keys::{CACHEABLE_PAGE_SIZES, CacheKey, FileInfoKey, Namespace, PostsPageKey, is_cacheable_page};
pub use layer::{BackingStores, LocalCacheLayer};
pub use planner::InvalidationPlan;
pub use store::{CacheStores, NamespaceCache};
pub use trigger::CacheTrigger;
