use crate::entry::{Entry, EntryState};

use std::sync::Arc;

use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node<K, V> {
  entry: Arc<Entry<K, V>>,
  weight: u64,
  prev: Option<Index>,
  next: Option<Index>,
}

/// The promotion list: a doubly-linked list over all live entries, from the
/// most recently promoted at the head to the least recently promoted at the
/// tail.
///
/// Nodes live in an arena and are addressed by stable indices; each entry
/// records its own node in its slot, so list membership is resolved without
/// a key lookup even when several entries for one key are briefly alive.
/// The list is owned by value by the maintenance worker and is never seen
/// by another thread.
#[derive(Debug)]
pub(crate) struct LruList<K, V> {
  nodes: Arena<Node<K, V>>,
  head: Option<Index>,
  tail: Option<Index>,
}

impl<K, V> LruList<K, V> {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      head: None,
      tail: None,
    }
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.nodes.len()
  }

  // Splice a node out of the chain without touching the arena.
  fn detach(&mut self, index: Index) {
    let (prev, next) = {
      let node = &self.nodes[index];
      (node.prev, node.next)
    };

    match prev {
      Some(prev_index) => self.nodes[prev_index].next = next,
      None => self.head = next,
    }
    match next {
      Some(next_index) => self.nodes[next_index].prev = prev,
      None => self.tail = prev,
    }

    let node = &mut self.nodes[index];
    node.prev = None;
    node.next = None;
  }

  // Make an already-allocated node the new head.
  fn attach_front(&mut self, index: Index) {
    let old_head = self.head;
    {
      let node = &mut self.nodes[index];
      node.prev = None;
      node.next = old_head;
    }
    self.head = Some(index);

    if let Some(old_head) = old_head {
      self.nodes[old_head].prev = Some(index);
    }
    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  /// Links a fresh entry at the head and marks it live. The weight is
  /// remembered in the node, so the eventual unlink releases exactly what
  /// was charged here.
  pub(crate) fn link_at_head(&mut self, entry: &Arc<Entry<K, V>>, weight: u64) {
    debug_assert_eq!(entry.state(), EntryState::New);
    let index = self.nodes.insert(Node {
      entry: Arc::clone(entry),
      weight,
      prev: None,
      next: None,
    });
    self.attach_front(index);
    entry.set_slot(Some(index));
    entry.set_state(EntryState::Existing);
  }

  /// Moves a live entry to the head. Entries that are not (or are no
  /// longer) linked are left alone.
  pub(crate) fn relink_at_head(&mut self, entry: &Arc<Entry<K, V>>) {
    if entry.state() != EntryState::Existing {
      return;
    }
    let Some(index) = entry.slot() else {
      return;
    };
    if self.head == Some(index) {
      return;
    }
    self.detach(index);
    self.attach_front(index);
  }

  /// Removes a live entry from the list, marking it deleted. Returns the
  /// weight the entry carried, or `None` if the entry was not linked (for
  /// example, already deleted by an earlier operation).
  pub(crate) fn unlink(&mut self, entry: &Arc<Entry<K, V>>) -> Option<u64> {
    if entry.state() != EntryState::Existing {
      return None;
    }
    let index = entry.take_slot()?;
    self.detach(index);
    let node = self.nodes.remove(index)?;
    entry.set_state(EntryState::Deleted);
    Some(node.weight)
  }

  /// The least recently promoted entry, if any.
  pub(crate) fn tail_entry(&self) -> Option<Arc<Entry<K, V>>> {
    self.tail.map(|index| Arc::clone(&self.nodes[index].entry))
  }

  /// Empties the list, marking every entry deleted. Returns the entries in
  /// promotion order so the caller can notify for them.
  pub(crate) fn drain(&mut self) -> Vec<Arc<Entry<K, V>>> {
    let entries = self.snapshot();
    for entry in &entries {
      entry.set_state(EntryState::Deleted);
      entry.set_slot(None);
    }
    self.nodes.clear();
    self.head = None;
    self.tail = None;
    entries
  }

  /// The entries in promotion order, head to tail.
  pub(crate) fn snapshot(&self) -> Vec<Arc<Entry<K, V>>> {
    let mut entries = Vec::with_capacity(self.nodes.len());
    let mut current = self.head;
    while let Some(index) = current {
      let node = &self.nodes[index];
      entries.push(Arc::clone(&node.entry));
      current = node.next;
    }
    entries
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(key: i32) -> Arc<Entry<i32, i32>> {
    Arc::new(Entry::new(key, key * 10, 0))
  }

  fn keys(list: &LruList<i32, i32>) -> Vec<i32> {
    list.snapshot().iter().map(|e| e.key).collect()
  }

  #[test]
  fn new_list_is_empty() {
    let list = LruList::<i32, i32>::new();
    assert_eq!(list.len(), 0);
    assert!(list.tail_entry().is_none());
    assert!(keys(&list).is_empty());
  }

  #[test]
  fn link_at_head_orders_newest_first() {
    let mut list = LruList::new();
    let a = entry(1);
    let b = entry(2);

    list.link_at_head(&a, 5);
    assert_eq!(a.state(), EntryState::Existing);
    assert_eq!(keys(&list), vec![1]);

    list.link_at_head(&b, 2);
    assert_eq!(keys(&list), vec![2, 1]);
    assert_eq!(list.tail_entry().unwrap().key, 1);
  }

  #[test]
  fn relink_moves_to_front() {
    let mut list = LruList::new();
    let a = entry(1);
    let b = entry(2);
    let c = entry(3);
    list.link_at_head(&a, 1);
    list.link_at_head(&b, 1);
    list.link_at_head(&c, 1);
    assert_eq!(keys(&list), vec![3, 2, 1]);

    list.relink_at_head(&a);
    assert_eq!(keys(&list), vec![1, 3, 2]);

    // Relinking the head is a no-op.
    list.relink_at_head(&a);
    assert_eq!(keys(&list), vec![1, 3, 2]);
  }

  #[test]
  fn relink_ignores_deleted_entries() {
    let mut list = LruList::new();
    let a = entry(1);
    let b = entry(2);
    list.link_at_head(&a, 1);
    list.link_at_head(&b, 1);

    assert_eq!(list.unlink(&a), Some(1));
    assert_eq!(a.state(), EntryState::Deleted);

    list.relink_at_head(&a);
    assert_eq!(keys(&list), vec![2]);
  }

  #[test]
  fn unlink_returns_linked_weight() {
    let mut list = LruList::new();
    let a = entry(1);
    let b = entry(2);
    let c = entry(3);
    list.link_at_head(&a, 10);
    list.link_at_head(&b, 20);
    list.link_at_head(&c, 30);

    // Middle element.
    assert_eq!(list.unlink(&b), Some(20));
    assert_eq!(keys(&list), vec![3, 1]);

    // Unlinking twice yields nothing.
    assert_eq!(list.unlink(&b), None);

    // Head and tail.
    assert_eq!(list.unlink(&c), Some(30));
    assert_eq!(list.unlink(&a), Some(10));
    assert_eq!(list.len(), 0);
    assert!(list.tail_entry().is_none());
  }

  #[test]
  fn unlink_ignores_fresh_entries() {
    let mut list = LruList::new();
    let a = entry(1);
    assert_eq!(a.state(), EntryState::New);
    assert_eq!(list.unlink(&a), None);
    assert_eq!(a.state(), EntryState::New);
  }

  #[test]
  fn drain_marks_everything_deleted() {
    let mut list = LruList::new();
    let a = entry(1);
    let b = entry(2);
    list.link_at_head(&a, 1);
    list.link_at_head(&b, 1);

    let drained = list.drain();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].key, 2);
    assert_eq!(drained[1].key, 1);
    assert_eq!(a.state(), EntryState::Deleted);
    assert_eq!(b.state(), EntryState::Deleted);
    assert_eq!(list.len(), 0);
    assert!(list.tail_entry().is_none());
  }
}
