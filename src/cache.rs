use crate::entry::{Entry, EntryState};
use crate::error::LoadError;
use crate::iter::{Iter, Keys, Values};
use crate::listener::RemovalReason;
use crate::metrics::CacheStats;
use crate::segment::EntryPromise;
use crate::shared::CacheCore;
use crate::sync::{Promise, Sender};
use crate::task::coordinator::Op;

use std::error::Error;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A thread-safe, segmented in-process cache.
///
/// Reads take a shared lock on one of 256 segments; writes take that
/// segment's exclusive lock for the map mutation only. Promotion order,
/// eviction and removal notifications are maintained by a dedicated
/// worker thread that drains a queue of structural operations, so the
/// facade never blocks on list maintenance.
///
/// Values are stored behind an `Arc` and handed out as clones of it.
pub struct Cache<K: Send, V: Send + Sync, H = ahash::RandomState> {
  pub(crate) core: Arc<CacheCore<K, V, H>>,
  pub(crate) ops: Sender<Op<K, V>>,
}

// Handles share one core and one maintenance worker; the worker stops once
// the last handle is dropped.
impl<K: Send, V: Send + Sync, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      core: Arc::clone(&self.core),
      ops: self.ops.clone(),
    }
  }
}

impl<K: Send, V: Send + Sync, H> fmt::Debug for Cache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache")
      .field("count", &self.core.count.load(Ordering::Relaxed))
      .field("weight", &self.core.weight.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Returns the value for `key`, or `None` if there is no mapping or the
  /// entry has expired.
  ///
  /// A hit promotes the entry to the head of the eviction order. If a load
  /// for this key is in flight, the call waits for it and shares its
  /// outcome.
  pub fn get(&self, key: &K) -> Option<Arc<V>> {
    let now = self.core.now();
    self.get_at(key, now)
  }

  fn get_at(&self, key: &K, now: u64) -> Option<Arc<V>> {
    let entry = self.core.segment_for(key).get(key)?;
    // Judge expiry before stamping the access time, so an idle entry is not
    // resurrected by the very read that should miss it.
    if self.core.is_expired(&entry, now) {
      return None;
    }
    entry.touch(now);
    if self.promote(&entry, now) {
      Some(entry.value())
    } else {
      // The entry was deleted while we held it; its value is stale.
      None
    }
  }

  /// Associates `value` with `key`, replacing any existing mapping.
  ///
  /// Replacing a live entry delivers a [`RemovalReason::Replaced`]
  /// notification for the old value.
  pub fn insert(&self, key: K, value: V) {
    let now = self.core.now();
    let segment = self.core.segment_for(&key);
    let (entry, previous) = segment.insert(key, value, now);

    if let Some(previous) = previous {
      if previous.state() == EntryState::Existing {
        let core = Arc::clone(&self.core);
        let stale = Arc::clone(&previous);
        self.ops.send(Op::Unlink {
          entry: previous,
          on_unlink: Box::new(move |unlinked| {
            if unlinked {
              core.notify(&stale, RemovalReason::Replaced);
            }
          }),
        });
      }
    }
    self.promote(&entry, now);
  }

  /// Returns the value for `key`, computing it with `loader` if absent.
  ///
  /// For any one key, at most one loader runs at a time across all
  /// threads; concurrent callers block and receive the leader's outcome,
  /// including its failure. A failed load is not cached: the mapping is
  /// cleared and the next call runs its loader again.
  ///
  /// The loader is invoked outside all locks, so it may use the cache
  /// itself, including `get_with` for other keys of the same segment.
  /// If the loader panics, waiters observe [`LoadError::Panicked`] and the
  /// panic resumes on this thread.
  pub fn get_with<F>(&self, key: &K, loader: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce(&K) -> Result<V, Box<dyn Error + Send + Sync>>,
  {
    let now = self.core.now();
    if let Some(value) = self.get_at(key, now) {
      return Ok(value);
    }

    let segment = self.core.segment_for(key);
    let fresh: EntryPromise<K, V> = Arc::new(Promise::new());
    let promise = match segment.install_pending(key.clone(), Arc::clone(&fresh)) {
      Some(existing) => existing,
      None => {
        // We won the install race: run the loader, with no lock held.
        match panic::catch_unwind(AssertUnwindSafe(|| loader(key))) {
          Ok(Ok(value)) => {
            fresh.complete(Ok(Arc::new(Entry::new(key.clone(), value, now))));
          }
          Ok(Err(error)) => {
            fresh.complete(Err(LoadError::failed(error)));
          }
          Err(payload) => {
            fresh.complete(Err(LoadError::Panicked));
            segment.remove_if_failed(key, &fresh);
            panic::resume_unwind(payload);
          }
        }
        fresh
      }
    };

    match promise.wait() {
      Ok(entry) => {
        self.promote(&entry, now);
        Ok(entry.value())
      }
      Err(error) => {
        segment.remove_if_failed(key, &promise);
        Err(error)
      }
    }
  }

  /// Removes the mapping for `key`, if any. A removed entry is reported to
  /// the removal listener as [`RemovalReason::Invalidated`].
  pub fn invalidate(&self, key: &K) -> bool {
    match self.core.segment_for(key).remove(key) {
      Some(entry) => {
        self.ops.send(Op::Delete {
          entry,
          reason: RemovalReason::Invalidated,
        });
        true
      }
      None => false,
    }
  }

  /// Removes every entry. Blocks until the wipe has happened; the
  /// [`RemovalReason::Invalidated`] notification for each entry that was
  /// live is delivered before this returns.
  pub fn invalidate_all(&self) {
    let done = Arc::new(Promise::new());
    self.ops.send(Op::InvalidateAll {
      done: Arc::clone(&done),
    });
    done.wait();
  }

  /// Forces all outstanding weight- and time-based evictions, then blocks
  /// until they (and every previously enqueued operation) have completed.
  pub fn refresh(&self) {
    let now = self.core.now();
    self.ops.send(Op::Evict { now });
    self.barrier();
  }

  // Waits for all operations enqueued before this call to drain.
  fn barrier(&self) {
    let done = Arc::new(Promise::new());
    self.ops.send(Op::Barrier {
      done: Arc::clone(&done),
    });
    done.wait();
  }

  /// Iterates over `(key, value)` pairs in promotion order, most recently
  /// promoted first.
  ///
  /// The sequence is a snapshot taken by the maintenance worker when the
  /// call is made; mutations after that point are not reflected. To remove
  /// an element the iterator yielded, call [`Cache::invalidate`] with its
  /// key.
  pub fn iter(&self) -> Iter<K, V> {
    let out = Arc::new(Promise::new());
    self.ops.send(Op::Collect {
      out: Arc::clone(&out),
    });
    Iter::new(out.wait())
  }

  /// The keys in promotion order. See [`Cache::iter`].
  pub fn keys(&self) -> Keys<K, V> {
    Keys::new(self.iter())
  }

  /// The values in promotion order. See [`Cache::iter`].
  pub fn values(&self) -> Values<K, V> {
    Values::new(self.iter())
  }

  /// A best-effort snapshot of the hit/miss/eviction counters.
  pub fn stats(&self) -> CacheStats {
    self.core.stats()
  }

  /// The number of live entries. Best-effort: mutations still queued at
  /// the maintenance worker are not yet counted. [`Cache::refresh`] first
  /// to get a settled reading.
  pub fn len(&self) -> u64 {
    self.core.count.load(Ordering::Relaxed)
  }

  /// Whether the cache has no live entries. Best-effort, like
  /// [`Cache::len`].
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The total weight of live entries. Best-effort, like [`Cache::len`].
  pub fn weight(&self) -> u64 {
    self.core.weight.load(Ordering::Relaxed)
  }

  /// Queues the structural work a cache hit or insert entails: link or
  /// relink at the head, then an eviction pass. Returns `false` when the
  /// entry has already been deleted, in which case its value must not be
  /// served.
  fn promote(&self, entry: &Arc<Entry<K, V>>, now: u64) -> bool {
    match entry.state() {
      EntryState::Deleted => false,
      EntryState::Existing => {
        self.ops.send(Op::RelinkAtHead(Arc::clone(entry)));
        self.ops.send(Op::Evict { now });
        true
      }
      EntryState::New => {
        self.ops.send(Op::LinkAtHead(Arc::clone(entry)));
        self.ops.send(Op::Evict { now });
        true
      }
    }
  }
}
