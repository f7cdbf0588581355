//! The maintenance worker: sole owner of the promotion list and the global
//! totals.
//!
//! Facade operations never touch the list. They enqueue structural
//! operations here, and a single dedicated thread drains them in FIFO
//! order. That total order is what keeps the totals, the eviction scan and
//! the removal notifications consistent without fine-grained list locking.

use crate::entry::{Entry, EntryState};
use crate::list::LruList;
use crate::listener::RemovalReason;
use crate::shared::CacheCore;
use crate::sync::{Promise, Receiver};

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, trace};

/// A structural operation against the promotion list.
pub(crate) enum Op<K, V> {
  /// Link a fresh entry at the head, counting it into the totals.
  LinkAtHead(Arc<Entry<K, V>>),
  /// Move a live entry to the head.
  RelinkAtHead(Arc<Entry<K, V>>),
  /// Splice a live entry out; the callback observes whether the entry was
  /// actually unlinked, so the enqueuer can notify conditionally.
  Unlink {
    entry: Arc<Entry<K, V>>,
    on_unlink: Box<dyn FnOnce(bool) + Send>,
  },
  /// Unlink and, if the entry was live, deliver a removal notification.
  Delete {
    entry: Arc<Entry<K, V>>,
    reason: RemovalReason,
  },
  /// Prune the tail while it exceeds the weight bound or is expired.
  Evict { now: u64 },
  /// Wipe every segment and the list, then release the waiting caller.
  InvalidateAll { done: Arc<Promise<()>> },
  /// Release the waiting caller once all prior operations have drained.
  Barrier { done: Arc<Promise<()>> },
  /// Resolve with the `(key, value)` pairs in promotion order.
  Collect {
    out: Arc<Promise<Vec<(K, Arc<V>)>>>,
  },
}

/// Spawns the worker for one cache. It runs until the facade, the only
/// sender, is dropped.
pub(crate) fn spawn<K, V, H>(
  core: Arc<CacheCore<K, V, H>>,
  ops: Receiver<Op<K, V>>,
) -> JoinHandle<()>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  thread::spawn(move || {
    debug!("cache maintenance worker started");
    let mut list = LruList::new();
    while let Some(op) = ops.recv() {
      apply(&core, &mut list, op);
    }
    debug!("cache maintenance worker stopped");
  })
}

fn apply<K, V, H>(core: &CacheCore<K, V, H>, list: &mut LruList<K, V>, op: Op<K, V>)
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  match op {
    Op::LinkAtHead(entry) => link_at_head(core, list, &entry),
    Op::RelinkAtHead(entry) => list.relink_at_head(&entry),
    Op::Unlink { entry, on_unlink } => on_unlink(unlink(core, list, &entry)),
    Op::Delete { entry, reason } => delete(core, list, &entry, reason),
    Op::Evict { now } => evict(core, list, now),
    Op::InvalidateAll { done } => {
      invalidate_all(core, list);
      done.complete(());
    }
    Op::Barrier { done } => done.complete(()),
    Op::Collect { out } => {
      let pairs = list
        .snapshot()
        .iter()
        .map(|entry| (entry.key.clone(), entry.value()))
        .collect();
      out.complete(pairs);
    }
  }
}

fn link_at_head<K, V, H>(core: &CacheCore<K, V, H>, list: &mut LruList<K, V>, entry: &Arc<Entry<K, V>>)
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  match entry.state() {
    EntryState::New => {
      let weight = core.weigh(entry);
      list.link_at_head(entry, weight);
      core.count.fetch_add(1, Ordering::Relaxed);
      core.weight.fetch_add(weight, Ordering::Relaxed);
    }
    // A second promotion raced in before the first link drained. The entry
    // is already where it should be, or is gone; linking it again would
    // double-count it.
    EntryState::Existing => list.relink_at_head(entry),
    EntryState::Deleted => {}
  }
}

fn unlink<K, V, H>(core: &CacheCore<K, V, H>, list: &mut LruList<K, V>, entry: &Arc<Entry<K, V>>) -> bool
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  match list.unlink(entry) {
    Some(weight) => {
      core.count.fetch_sub(1, Ordering::Relaxed);
      core.weight.fetch_sub(weight, Ordering::Relaxed);
      true
    }
    None => false,
  }
}

fn delete<K, V, H>(
  core: &CacheCore<K, V, H>,
  list: &mut LruList<K, V>,
  entry: &Arc<Entry<K, V>>,
  reason: RemovalReason,
) where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  if unlink(core, list, entry) {
    core.notify(entry, reason);
  }
}

/// Prunes from the tail while the prune predicate holds. The segment
/// mutation comes first on every removal path, so a reader never sees a
/// value whose entry is already recorded as deleted. The settled-only
/// removal keeps this loop from ever waiting on a loader.
fn evict<K, V, H>(core: &CacheCore<K, V, H>, list: &mut LruList<K, V>, now: u64)
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  while let Some(tail) = list.tail_entry() {
    if !core.should_evict(&tail, now) {
      break;
    }
    core.segment_for(&tail.key).remove_settled(&tail.key);
    delete(core, list, &tail, RemovalReason::Evicted);
  }
}

fn invalidate_all<K, V, H>(core: &CacheCore<K, V, H>, list: &mut LruList<K, V>)
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  let removed = {
    // Take every segment write lock, in ascending order, so the wipe is a
    // single point in time for all readers.
    let mut guards: Vec<_> = core.segments.iter().map(|s| s.map.write()).collect();

    let removed = list.drain();
    for guard in guards.iter_mut() {
      **guard = HashMap::with_hasher(core.hasher.clone());
    }
    core.count.store(0, Ordering::Relaxed);
    core.weight.store(0, Ordering::Relaxed);

    while let Some(guard) = guards.pop() {
      drop(guard);
    }
    removed
  };

  trace!("invalidated all entries, {} were live", removed.len());
  for entry in &removed {
    core.notify(entry, RemovalReason::Invalidated);
  }
}
