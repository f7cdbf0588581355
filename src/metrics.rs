use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Per-segment hit/miss/eviction counters.
///
/// Counters are independent and updated `Relaxed`; a statistics read sums
/// them without a barrier, so a snapshot can be slightly out of date
/// mid-flight. They never decrease.
#[derive(Debug, Default)]
pub(crate) struct SegmentStats {
  hits: CachePadded<AtomicU64>,
  misses: CachePadded<AtomicU64>,
  evictions: CachePadded<AtomicU64>,
}

impl SegmentStats {
  #[inline]
  pub(crate) fn hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn eviction(&self) {
    self.evictions.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn add_to(&self, stats: &mut CacheStats) {
    stats.hits += self.hits.load(Ordering::Relaxed);
    stats.misses += self.misses.load(Ordering::Relaxed);
    stats.evictions += self.evictions.load(Ordering::Relaxed);
  }
}

/// A best-effort, point-in-time snapshot of the cache's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
  /// Lookups that found a live entry.
  pub hits: u64,
  /// Lookups that found nothing, or found a failed load.
  pub misses: u64,
  /// Entries removed from a segment, whether evicted or invalidated.
  pub evictions: u64,
}

impl CacheStats {
  /// The fraction of lookups that hit, or 0.0 before any lookup.
  pub fn hit_ratio(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

impl fmt::Display for CacheStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "hits={} misses={} evictions={} ({:.2}% hit ratio)",
      self.hits,
      self.misses,
      self.evictions,
      self.hit_ratio() * 100.0
    )
  }
}
