use crate::entry::Entry;
use crate::error::LoadError;
use crate::metrics::SegmentStats;
use crate::sync::Promise;

use std::collections::hash_map::Entry as MapSlot;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

/// What a completed load resolves to: an entry, or the shared failure.
pub(crate) type LoadOutcome<K, V> = Result<Arc<Entry<K, V>>, LoadError>;

/// The value type of a segment map. Concurrent loaders for one key
/// serialize on this shared promise.
pub(crate) type EntryPromise<K, V> = Arc<Promise<LoadOutcome<K, V>>>;

#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// One hash partition of the key space.
///
/// The map holds a promise per key rather than an entry, so that a load in
/// progress occupies its key without holding any lock. The read/write lock
/// covers map access only; promise completion is always awaited outside it.
/// This is what lets a loader request another key of the same segment
/// without deadlocking.
pub(crate) struct Segment<K, V, H> {
  pub(crate) map: RwLock<HashMap<K, EntryPromise<K, V>, H>>,
  pub(crate) stats: SegmentStats,
}

impl<K, V, H> Segment<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  pub(crate) fn new(hasher: H) -> Self {
    Self {
      map: RwLock::new(HashMap::with_hasher(hasher)),
      stats: SegmentStats::default(),
    }
  }

  /// Looks up an entry, waiting out a load in progress. A missing key or a
  /// failed load counts as a miss. Expiry and the access-time stamp are the
  /// caller's concern: the entry must be judged against its access time
  /// from before this lookup.
  pub(crate) fn get(&self, key: &K) -> Option<Arc<Entry<K, V>>> {
    let promise = { self.map.read().get(key).cloned() };
    match promise {
      Some(promise) => match promise.wait() {
        Ok(entry) => {
          self.stats.hit();
          Some(entry)
        }
        Err(_) => {
          self.stats.miss();
          None
        }
      },
      None => {
        self.stats.miss();
        None
      }
    }
  }

  /// Installs a fresh entry, returning it along with whatever entry the key
  /// previously resolved to.
  pub(crate) fn insert(
    &self,
    key: K,
    value: V,
    now: u64,
  ) -> (Arc<Entry<K, V>>, Option<Arc<Entry<K, V>>>) {
    let entry = Arc::new(Entry::new(key.clone(), value, now));
    let previous = {
      let mut map = self.map.write();
      map.insert(key, Arc::new(Promise::ready(Ok(Arc::clone(&entry)))))
    };
    let previous = previous.and_then(|promise| promise.wait().ok());
    (entry, previous)
  }

  /// Removes the mapping for a key. Returns the entry it resolved to, if
  /// the load had succeeded, and counts it as an eviction.
  pub(crate) fn remove(&self, key: &K) -> Option<Arc<Entry<K, V>>> {
    let removed = { self.map.write().remove(key) };
    let entry = removed?.wait().ok()?;
    self.stats.eviction();
    Some(entry)
  }

  /// Like `remove`, but never waits: a mapping still being loaded is left
  /// in place. Used by the eviction scan, which must not block on a
  /// loader. A failure tombstone is cleared but reported as nothing.
  pub(crate) fn remove_settled(&self, key: &K) -> Option<Arc<Entry<K, V>>> {
    let mut map = self.map.write();
    let settled = match map.get(key) {
      Some(promise) => promise.try_get(),
      None => return None,
    };
    match settled {
      Some(outcome) => {
        map.remove(key);
        let entry = outcome.ok()?;
        self.stats.eviction();
        Some(entry)
      }
      None => None,
    }
  }

  /// Atomically installs `promise` if the key is unoccupied. Returns the
  /// already-present promise otherwise. The winner of this race is the
  /// thread that runs the loader.
  pub(crate) fn install_pending(
    &self,
    key: K,
    promise: EntryPromise<K, V>,
  ) -> Option<EntryPromise<K, V>> {
    match self.map.write().entry(key) {
      MapSlot::Occupied(occupied) => Some(Arc::clone(occupied.get())),
      MapSlot::Vacant(vacant) => {
        vacant.insert(promise);
        None
      }
    }
  }

  /// Clears a failed load's tombstone, but only while the mapping is still
  /// that exact promise. A concurrent `insert` that already replaced it is
  /// left untouched.
  pub(crate) fn remove_if_failed(&self, key: &K, promise: &EntryPromise<K, V>) {
    let mut map = self.map.write();
    let still_ours = map
      .get(key)
      .is_some_and(|current| Arc::ptr_eq(current, promise));
    if still_ours && matches!(promise.try_get(), Some(Err(_))) {
      map.remove(key);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metrics::CacheStats;

  fn segment() -> Segment<&'static str, i32, ahash::RandomState> {
    Segment::new(ahash::RandomState::new())
  }

  fn stats_of(segment: &Segment<&'static str, i32, ahash::RandomState>) -> CacheStats {
    let mut stats = CacheStats::default();
    segment.stats.add_to(&mut stats);
    stats
  }

  #[test]
  fn get_records_miss_then_hit() {
    let segment = segment();
    assert!(segment.get(&"a").is_none());
    segment.insert("a", 1, 0);
    let entry = segment.get(&"a").unwrap();
    assert_eq!(*entry.value, 1);

    let stats = stats_of(&segment);
    assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 0));
  }

  #[test]
  fn insert_returns_previous_entry() {
    let segment = segment();
    let (_, previous) = segment.insert("a", 1, 0);
    assert!(previous.is_none());
    let (entry, previous) = segment.insert("a", 2, 0);
    assert_eq!(*previous.unwrap().value, 1);
    assert_eq!(*entry.value, 2);
  }

  #[test]
  fn remove_counts_an_eviction() {
    let segment = segment();
    segment.insert("a", 1, 0);
    assert_eq!(*segment.remove(&"a").unwrap().value, 1);
    assert!(segment.remove(&"a").is_none());
    assert_eq!(stats_of(&segment).evictions, 1);
  }

  #[test]
  fn install_pending_yields_to_the_first_promise() {
    let segment = segment();
    let first: EntryPromise<&'static str, i32> = Arc::new(Promise::new());
    let second: EntryPromise<&'static str, i32> = Arc::new(Promise::new());

    assert!(segment.install_pending("a", Arc::clone(&first)).is_none());
    let existing = segment.install_pending("a", second).unwrap();
    assert!(Arc::ptr_eq(&existing, &first));
  }

  #[test]
  fn remove_if_failed_spares_replacements() {
    let segment = segment();
    let failed: EntryPromise<&'static str, i32> = Arc::new(Promise::new());
    failed.complete(Err(crate::error::LoadError::Panicked));

    // The failed promise is still mapped: removed.
    segment.install_pending("a", Arc::clone(&failed));
    segment.remove_if_failed(&"a", &failed);
    assert!(segment.map.read().get(&"a").is_none());

    // A replacement got there first: left alone.
    segment.insert("a", 5, 0);
    segment.remove_if_failed(&"a", &failed);
    assert_eq!(*segment.get(&"a").unwrap().value, 5);
  }
}
