//! A segmented, concurrent in-process cache with LRU ordering, weight- and
//! time-based eviction, single-flight loads, and removal notifications.
//!
//! The design favors read performance and easy-to-follow code over write
//! throughput. The key space is split across 256 segments, each a hash map
//! behind its own read/write lock, so readers contend only with writers of
//! the same segment. Each segment maps a key to a *promise* of an entry:
//! concurrent loads of one key serialize on the promise, and the loader
//! itself always runs outside every lock, which is what allows a loader to
//! fetch other keys, even ones landing in the same segment, without
//! deadlocking.
//!
//! Eviction order is kept in a single doubly-linked list chaining all live
//! entries. The list, the entry count and the total weight are owned by a
//! per-cache maintenance thread that drains a FIFO queue of structural
//! operations (link, relink, unlink, evict, wipe, barrier). Serializing
//! those mutations on one consumer makes the totals, the eviction scan and
//! the removal notifications consistent without any locking on the list.
//! Evictions run after every promotion or insert, and on demand via
//! [`Cache::refresh`].
//!
//! ```
//! use strata_cache::CacheBuilder;
//!
//! let cache = CacheBuilder::default().maximum_weight(2).build().unwrap();
//!
//! cache.insert("a", 1);
//! let hit = cache.get(&"a");
//! assert_eq!(hit.as_deref(), Some(&1));
//!
//! let loaded = cache
//!   .get_with(&"b", |_key| Ok(2))
//!   .expect("loader cannot fail here");
//! assert_eq!(*loaded, 2);
//! ```

mod builder;
mod cache;
mod entry;
mod error;
mod iter;
mod list;
mod listener;
mod metrics;
mod segment;
mod shared;
mod sync;
mod task;
mod time;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use error::{BuildError, LoadError};
pub use iter::{Iter, Keys, Values};
pub use listener::{RemovalListener, RemovalReason};
pub use metrics::CacheStats;
