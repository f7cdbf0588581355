//! Construction and validation of [`Cache`] instances.

use crate::cache::Cache;
use crate::error::BuildError;
use crate::listener::RemovalListener;
use crate::segment::Segment;
use crate::shared::{CacheCore, Weigher, NUM_SEGMENTS};
use crate::sync;
use crate::task::coordinator;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::CachePadded;

/// A builder for [`Cache`] instances.
///
/// All options are fixed at construction; the cache never reconfigures
/// itself afterwards.
///
/// ```
/// use strata_cache::CacheBuilder;
/// use std::time::Duration;
///
/// let cache = CacheBuilder::default()
///   .maximum_weight(10_000)
///   .weigher(|_key: &String, value: &Vec<u8>| value.len() as u64)
///   .expire_after_write(Duration::from_secs(60))
///   .build()
///   .unwrap();
///
/// cache.insert("a".to_string(), vec![1, 2, 3]);
/// assert_eq!(cache.get(&"a".to_string()).as_deref(), Some(&vec![1, 2, 3]));
/// ```
pub struct CacheBuilder<K: Send, V: Send, H = ahash::RandomState> {
  expire_after_access: Option<Duration>,
  expire_after_write: Option<Duration>,
  maximum_weight: Option<u64>,
  weigher: Option<Weigher<K, V>>,
  listener: Option<Arc<dyn RemovalListener<K, V>>>,
  hasher: H,
}

impl<K: Send, V: Send, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("expire_after_access", &self.expire_after_access)
      .field("expire_after_write", &self.expire_after_write)
      .field("maximum_weight", &self.maximum_weight)
      .field("has_weigher", &self.weigher.is_some())
      .field("has_listener", &self.listener.is_some())
      .finish_non_exhaustive()
  }
}

impl<K: Send, V: Send, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a builder with no expiry, no weight bound, a constant weigher
  /// of 1 and no removal listener.
  pub fn new() -> Self {
    Self {
      expire_after_access: None,
      expire_after_write: None,
      maximum_weight: None,
      weigher: None,
      listener: None,
      hasher: H::default(),
    }
  }
}

impl<K: Send, V: Send> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: Send, V: Send, H> CacheBuilder<K, V, H> {
  /// Evicts entries that have not been read or written for `duration`.
  /// The duration must be positive; this is checked by `build`.
  pub fn expire_after_access(mut self, duration: Duration) -> Self {
    self.expire_after_access = Some(duration);
    self
  }

  /// Evicts entries `duration` after they were written, regardless of
  /// reads. The duration must be positive; this is checked by `build`.
  pub fn expire_after_write(mut self, duration: Duration) -> Self {
    self.expire_after_write = Some(duration);
    self
  }

  /// Bounds the total weight of the cache. Whenever the total exceeds this
  /// after a mutation, entries are evicted from the cold end of the
  /// promotion order until it no longer does.
  pub fn maximum_weight(mut self, maximum_weight: u64) -> Self {
    self.maximum_weight = Some(maximum_weight);
    self
  }

  /// Assigns a weight to each entry. Defaults to a constant 1, which makes
  /// `maximum_weight` a plain entry count.
  pub fn weigher(mut self, weigher: impl Fn(&K, &V) -> u64 + Send + Sync + 'static) -> Self {
    self.weigher = Some(Arc::new(weigher));
    self
  }

  /// Registers a listener invoked for every removed entry.
  pub fn removal_listener<L>(mut self, listener: L) -> Self
  where
    L: RemovalListener<K, V> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }
}

impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Sets the hasher used to route keys to segments and within segment
  /// maps.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }

  /// Builds the cache and spawns its maintenance worker.
  pub fn build(mut self) -> Result<Cache<K, V, H>, BuildError> {
    self.validate()?;

    let segments: Vec<_> = (0..NUM_SEGMENTS)
      .map(|_| CachePadded::new(Segment::new(self.hasher.clone())))
      .collect();

    let core = Arc::new(CacheCore {
      segments: segments.into_boxed_slice(),
      hasher: self.hasher.clone(),
      weigher: self.weigher.take().unwrap_or_else(|| Arc::new(|_, _| 1)),
      listener: self.listener.take(),
      expire_after_access: self.expire_after_access.map(|d| d.as_nanos() as u64),
      expire_after_write: self.expire_after_write.map(|d| d.as_nanos() as u64),
      maximum_weight: self.maximum_weight,
      count: CachePadded::new(AtomicU64::new(0)),
      weight: CachePadded::new(AtomicU64::new(0)),
    });

    let (ops, ops_rx) = sync::unbounded();
    coordinator::spawn(Arc::clone(&core), ops_rx);

    Ok(Cache { core, ops })
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.expire_after_access == Some(Duration::ZERO) {
      return Err(BuildError::ZeroExpireAfterAccess);
    }
    if self.expire_after_write == Some(Duration::ZERO) {
      return Err(BuildError::ZeroExpireAfterWrite);
    }
    Ok(())
  }
}
