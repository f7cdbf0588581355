use generational_arena::Index;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Where an entry stands in its lifecycle.
///
/// State only ever advances: `New` → `Existing` → `Deleted`. Transitions
/// are stored exclusively by the maintenance worker; any thread may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
  /// In a segment map, not yet linked into the promotion list.
  New,
  /// Linked into the promotion list.
  Existing,
  /// Unlinked. The entry may still be referenced by in-flight operations
  /// but is never promoted again.
  Deleted,
}

const STATE_NEW: u8 = 0;
const STATE_EXISTING: u8 = 1;
const STATE_DELETED: u8 = 2;

/// A cached key/value pair plus its bookkeeping metadata.
///
/// The key, value and write time are immutable and shared freely between
/// the segment maps and the promotion list. The access time is a plain
/// atomic touched on every hit. The list slot is the entry's node in the
/// arena-backed promotion list; it is locked and mutated only by the
/// maintenance worker.
#[derive(Debug)]
pub(crate) struct Entry<K, V> {
  pub(crate) key: K,
  pub(crate) value: Arc<V>,
  pub(crate) write_time: u64,
  pub(crate) access_time: AtomicU64,
  state: AtomicU8,
  slot: Mutex<Option<Index>>,
}

impl<K, V> Entry<K, V> {
  pub(crate) fn new(key: K, value: V, now: u64) -> Self {
    Self {
      key,
      value: Arc::new(value),
      write_time: now,
      access_time: AtomicU64::new(now),
      state: AtomicU8::new(STATE_NEW),
      slot: Mutex::new(None),
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  /// Records an access. A torn read on exotic targets would still observe
  /// either the old or the new stamp, both of which are valid.
  #[inline]
  pub(crate) fn touch(&self, now: u64) {
    self.access_time.store(now, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn access_time(&self) -> u64 {
    self.access_time.load(Ordering::Relaxed)
  }

  #[inline]
  pub(crate) fn state(&self) -> EntryState {
    match self.state.load(Ordering::Relaxed) {
      STATE_NEW => EntryState::New,
      STATE_EXISTING => EntryState::Existing,
      _ => EntryState::Deleted,
    }
  }

  /// Stored only by the maintenance worker.
  #[inline]
  pub(crate) fn set_state(&self, state: EntryState) {
    let raw = match state {
      EntryState::New => STATE_NEW,
      EntryState::Existing => STATE_EXISTING,
      EntryState::Deleted => STATE_DELETED,
    };
    self.state.store(raw, Ordering::Relaxed);
  }

  /// The entry's node in the promotion list, if it is linked.
  /// Accessed only by the maintenance worker.
  #[inline]
  pub(crate) fn slot(&self) -> Option<Index> {
    *self.slot.lock()
  }

  #[inline]
  pub(crate) fn set_slot(&self, slot: Option<Index>) {
    *self.slot.lock() = slot;
  }

  #[inline]
  pub(crate) fn take_slot(&self) -> Option<Index> {
    self.slot.lock().take()
  }
}
