//! Internal synchronization primitives: a parked-thread promise and an
//! unbounded multi-producer/single-consumer queue.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, Thread};

/// A value that is produced exactly once and observed by any number of
/// threads.
///
/// Waiters park until the value arrives; completing the promise wakes them
/// all. This backs the per-key load futures in the segment maps as well as
/// the barriers and snapshots exchanged with the maintenance worker.
pub(crate) struct Promise<T> {
  inner: Mutex<PromiseInner<T>>,
}

struct PromiseInner<T> {
  value: Option<T>,
  waiters: VecDeque<Thread>,
}

impl<T: Clone> Promise<T> {
  /// Creates a promise with no value yet.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(PromiseInner {
        value: None,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Creates a promise that is already complete.
  pub(crate) fn ready(value: T) -> Self {
    Self {
      inner: Mutex::new(PromiseInner {
        value: Some(value),
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the promise, waking every parked waiter. A promise is
  /// completed at most once; a second completion is ignored.
  pub(crate) fn complete(&self, value: T) {
    let mut inner = self.inner.lock();
    if inner.value.is_some() {
      return;
    }
    inner.value = Some(value);
    for waiter in inner.waiters.drain(..) {
      waiter.unpark();
    }
  }

  /// Returns the value if the promise has completed.
  pub(crate) fn try_get(&self) -> Option<T> {
    self.inner.lock().value.clone()
  }

  /// Blocks the current thread until the promise completes.
  pub(crate) fn wait(&self) -> T {
    loop {
      {
        let mut inner = self.inner.lock();
        if let Some(value) = &inner.value {
          return value.clone();
        }
        inner.waiters.push_back(thread::current());
      }
      // Unlock before parking; `complete` may have raced us, in which case
      // the park returns immediately via the stored unpark token.
      thread::park();
    }
  }
}

/// Creates an unbounded MPSC channel.
///
/// `recv` blocks while the queue is empty and returns `None` once every
/// sender has been dropped and the queue is drained.
pub(crate) fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
  let shared = Arc::new(ChannelShared {
    inner: Mutex::new(ChannelInner {
      queue: VecDeque::new(),
      senders: 1,
    }),
    available: Condvar::new(),
  });
  (
    Sender {
      shared: Arc::clone(&shared),
    },
    Receiver { shared },
  )
}

struct ChannelShared<T> {
  inner: Mutex<ChannelInner<T>>,
  available: Condvar,
}

struct ChannelInner<T> {
  queue: VecDeque<T>,
  senders: usize,
}

pub(crate) struct Sender<T> {
  shared: Arc<ChannelShared<T>>,
}

impl<T> Sender<T> {
  pub(crate) fn send(&self, value: T) {
    self.shared.inner.lock().queue.push_back(value);
    self.shared.available.notify_one();
  }
}

impl<T> Clone for Sender<T> {
  fn clone(&self) -> Self {
    self.shared.inner.lock().senders += 1;
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T> Drop for Sender<T> {
  fn drop(&mut self) {
    let disconnected = {
      let mut inner = self.shared.inner.lock();
      inner.senders -= 1;
      inner.senders == 0
    };
    if disconnected {
      self.shared.available.notify_all();
    }
  }
}

pub(crate) struct Receiver<T> {
  shared: Arc<ChannelShared<T>>,
}

impl<T> Receiver<T> {
  /// Receives the next value, blocking while the queue is empty. Returns
  /// `None` when the channel has disconnected and drained.
  pub(crate) fn recv(&self) -> Option<T> {
    let mut inner = self.shared.inner.lock();
    loop {
      if let Some(value) = inner.queue.pop_front() {
        return Some(value);
      }
      if inner.senders == 0 {
        return None;
      }
      self.shared.available.wait(&mut inner);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[test]
  fn promise_ready_is_immediate() {
    let promise = Promise::ready(7);
    assert_eq!(promise.try_get(), Some(7));
    assert_eq!(promise.wait(), 7);
  }

  #[test]
  fn promise_wakes_parked_waiters() {
    let promise = Arc::new(Promise::new());
    let woken = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for _ in 0..4 {
      let promise = promise.clone();
      let woken = woken.clone();
      handles.push(thread::spawn(move || {
        assert_eq!(promise.wait(), 42);
        woken.fetch_add(1, Ordering::SeqCst);
      }));
    }

    thread::sleep(Duration::from_millis(50));
    assert_eq!(promise.try_get(), None);
    promise.complete(42);

    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), 4);
  }

  #[test]
  fn promise_second_completion_is_ignored() {
    let promise = Promise::new();
    promise.complete(1);
    promise.complete(2);
    assert_eq!(promise.wait(), 1);
  }

  #[test]
  fn channel_delivers_in_order() {
    let (tx, rx) = unbounded();
    for i in 0..10 {
      tx.send(i);
    }
    for i in 0..10 {
      assert_eq!(rx.recv(), Some(i));
    }
  }

  #[test]
  fn channel_recv_blocks_until_send() {
    let (tx, rx) = unbounded::<i32>();
    let handle = thread::spawn(move || rx.recv());
    thread::sleep(Duration::from_millis(50));
    tx.send(9);
    assert_eq!(handle.join().unwrap(), Some(9));
  }

  #[test]
  fn channel_drains_after_disconnect() {
    let (tx, rx) = unbounded();
    tx.send(1);
    tx.send(2);
    drop(tx);
    assert_eq!(rx.recv(), Some(1));
    assert_eq!(rx.recv(), Some(2));
    assert_eq!(rx.recv(), None);
  }
}
