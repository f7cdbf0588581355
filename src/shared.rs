use crate::entry::Entry;
use crate::listener::{RemovalListener, RemovalReason};
use crate::metrics::CacheStats;
use crate::segment::{hash_key, Segment};
use crate::time;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

/// The key space is partitioned into a fixed number of segments; a key's
/// segment is the low eight bits of its hash.
pub(crate) const NUM_SEGMENTS: usize = 256;

pub(crate) type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u64 + Send + Sync>;

/// Everything shared between the facade and the maintenance worker: the
/// segment array, the configuration, and the global totals.
///
/// The totals are written only by the maintenance worker and read without
/// synchronization everywhere else; like the statistics, they are accurate
/// only once the queue has drained.
pub(crate) struct CacheCore<K, V, H> {
  pub(crate) segments: Box<[CachePadded<Segment<K, V, H>>]>,
  pub(crate) hasher: H,
  pub(crate) weigher: Weigher<K, V>,
  pub(crate) listener: Option<Arc<dyn RemovalListener<K, V>>>,
  pub(crate) expire_after_access: Option<u64>,
  pub(crate) expire_after_write: Option<u64>,
  pub(crate) maximum_weight: Option<u64>,
  pub(crate) count: CachePadded<AtomicU64>,
  pub(crate) weight: CachePadded<AtomicU64>,
}

impl<K, V, H> fmt::Debug for CacheCore<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheCore")
      .field("count", &self.count.load(Ordering::Relaxed))
      .field("weight", &self.weight.load(Ordering::Relaxed))
      .field("maximum_weight", &self.maximum_weight)
      .field("expire_after_access", &self.expire_after_access)
      .field("expire_after_write", &self.expire_after_write)
      .finish_non_exhaustive()
  }
}

impl<K, V, H> CacheCore<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  /// The relative time used for expiry. Reading the clock is not free, so
  /// this is zero for caches with no time-based expiry at all.
  #[inline]
  pub(crate) fn now(&self) -> u64 {
    if self.expire_after_access.is_some() || self.expire_after_write.is_some() {
      time::now_nanos()
    } else {
      0
    }
  }

  #[inline]
  pub(crate) fn segment_for(&self, key: &K) -> &Segment<K, V, H> {
    let hash = hash_key(&self.hasher, key);
    &self.segments[(hash & 0xff) as usize]
  }

  pub(crate) fn is_expired(&self, entry: &Entry<K, V>, now: u64) -> bool {
    if let Some(limit) = self.expire_after_access {
      if now.saturating_sub(entry.access_time()) > limit {
        return true;
      }
    }
    if let Some(limit) = self.expire_after_write {
      if now.saturating_sub(entry.write_time) > limit {
        return true;
      }
    }
    false
  }

  #[inline]
  pub(crate) fn exceeds_weight(&self) -> bool {
    self
      .maximum_weight
      .is_some_and(|max| self.weight.load(Ordering::Relaxed) > max)
  }

  /// The prune predicate applied to the list tail during eviction.
  #[inline]
  pub(crate) fn should_evict(&self, entry: &Entry<K, V>, now: u64) -> bool {
    self.exceeds_weight() || self.is_expired(entry, now)
  }

  #[inline]
  pub(crate) fn weigh(&self, entry: &Entry<K, V>) -> u64 {
    (self.weigher)(&entry.key, &entry.value)
  }

  /// Delivers a removal notification. Called only from the maintenance
  /// worker, outside every segment lock.
  pub(crate) fn notify(&self, entry: &Entry<K, V>, reason: RemovalReason) {
    if let Some(listener) = &self.listener {
      listener.on_removal(entry.key.clone(), entry.value(), reason);
    }
  }

  pub(crate) fn stats(&self) -> CacheStats {
    let mut stats = CacheStats::default();
    for segment in self.segments.iter() {
      segment.stats.add_to(&mut stats);
    }
    stats
  }
}
