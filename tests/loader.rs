use strata_cache::{CacheBuilder, LoadError};
use std::hash::{BuildHasher, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[test]
fn loads_once_then_hits() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::default().build().unwrap();

  let value = cache
    .get_with(&5, |key| {
      load_count.fetch_add(1, Ordering::SeqCst);
      Ok(key * 10)
    })
    .unwrap();
  assert_eq!(*value, 50);
  assert_eq!(load_count.load(Ordering::SeqCst), 1);

  let value = cache
    .get_with(&5, |_key| {
      load_count.fetch_add(1, Ordering::SeqCst);
      Ok(0)
    })
    .unwrap();
  assert_eq!(*value, 50, "the cached value wins");
  assert_eq!(load_count.load(Ordering::SeqCst), 1, "no second load");
}

#[test]
fn single_flight_under_contention() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = Arc::new(CacheBuilder::default().build().unwrap());

  let num_threads = 16;
  let barrier = Arc::new(Barrier::new(num_threads));
  let mut handles = vec![];

  for _ in 0..num_threads {
    let cache = Arc::clone(&cache);
    let barrier = Arc::clone(&barrier);
    let load_count = Arc::clone(&load_count);
    handles.push(thread::spawn(move || {
      barrier.wait();
      let value = cache
        .get_with(&"k", move |_key| {
          // Simulate a slow computation so the others pile up behind it.
          thread::sleep(Duration::from_millis(100));
          Ok(load_count.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .unwrap();
      assert_eq!(*value, 1, "every caller sees the first load's result");
    }));
  }

  for handle in handles {
    handle.join().unwrap();
  }
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
}

#[test]
fn a_failed_load_is_not_cached() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::default().build().unwrap();

  let error = cache
    .get_with(&"k", |_key: &&str| -> Result<i32, BoxError> {
      load_count.fetch_add(1, Ordering::SeqCst);
      Err("backend unavailable".into())
    })
    .unwrap_err();
  match &error {
    LoadError::Failed(source) => assert_eq!(source.to_string(), "backend unavailable"),
    other => panic!("unexpected error: {other:?}"),
  }

  // The tombstone is gone; the next call loads again and succeeds.
  let value = cache
    .get_with(&"k", |_key| {
      load_count.fetch_add(1, Ordering::SeqCst);
      Ok(7)
    })
    .unwrap();
  assert_eq!(*value, 7);
  assert_eq!(load_count.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_callers_share_the_failure() {
  let cache = Arc::new(CacheBuilder::<&'static str, i32>::default().build().unwrap());

  let num_threads = 8;
  let barrier = Arc::new(Barrier::new(num_threads));
  let mut handles = vec![];

  for _ in 0..num_threads {
    let cache = Arc::clone(&cache);
    let barrier = Arc::clone(&barrier);
    handles.push(thread::spawn(move || {
      barrier.wait();
      cache.get_with(&"k", |_key| {
        thread::sleep(Duration::from_millis(50));
        Err("boom".into())
      })
    }));
  }

  for handle in handles {
    let result = handle.join().unwrap();
    assert!(result.is_err(), "no caller of a failed round sees a value");
  }
  assert!(cache.get(&"k").is_none());
}

#[test]
fn a_panicking_loader_does_not_poison_the_key() {
  let cache = CacheBuilder::default().build().unwrap();

  let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
    cache.get_with(&"k", |_key| -> Result<i32, BoxError> { panic!("kaboom") })
  }));
  assert!(outcome.is_err(), "the panic resumes on the loading thread");

  let value = cache.get_with(&"k", |_key| Ok(3)).unwrap();
  assert_eq!(*value, 3);
}

// Routes every key to one segment, to exercise same-segment re-entrancy.
#[derive(Clone, Default)]
struct SingleSegment;

struct ZeroHasher;

impl Hasher for ZeroHasher {
  fn finish(&self) -> u64 {
    0
  }

  fn write(&mut self, _bytes: &[u8]) {}
}

impl BuildHasher for SingleSegment {
  type Hasher = ZeroHasher;

  fn build_hasher(&self) -> ZeroHasher {
    ZeroHasher
  }
}

#[test]
fn a_loader_may_load_a_dependent_key_of_the_same_segment() {
  let cache = CacheBuilder::<&'static str, i32, SingleSegment>::new()
    .build()
    .unwrap();

  let value = cache
    .get_with(&"k1", |_key| {
      let inner = cache.get_with(&"k2", |_key| Ok(2))?;
      Ok(*inner + 1)
    })
    .unwrap();

  assert_eq!(*value, 3);
  assert_eq!(cache.get(&"k2").as_deref(), Some(&2));
  assert_eq!(cache.get(&"k1").as_deref(), Some(&3));
}

#[test]
fn a_plain_get_waits_for_an_inflight_load() {
  let cache = Arc::new(CacheBuilder::<&'static str, i32>::default().build().unwrap());

  let loader_cache = Arc::clone(&cache);
  let leader = thread::spawn(move || {
    loader_cache
      .get_with(&"slow", |_key| {
        thread::sleep(Duration::from_millis(100));
        Ok(42)
      })
      .unwrap()
  });

  // Give the leader a head start, then observe its result through `get`.
  thread::sleep(Duration::from_millis(20));
  assert_eq!(cache.get(&"slow").as_deref(), Some(&42));
  assert_eq!(*leader.join().unwrap(), 42);
}
