use std::fmt;
use std::sync::Arc;

/// Describes the reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
  /// The entry was removed because the cache exceeded its maximum weight or
  /// because the entry expired.
  Evicted,
  /// The entry was removed by `invalidate` or `invalidate_all`.
  Invalidated,
  /// The entry was overwritten by an `insert` for the same key.
  Replaced,
}

impl fmt::Display for RemovalReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RemovalReason::Evicted => write!(f, "evicted due to weight or expiry"),
      RemovalReason::Invalidated => write!(f, "manually invalidated"),
      RemovalReason::Replaced => write!(f, "replaced by a newer value"),
    }
  }
}

/// A listener that receives a notification for every entry removed from the
/// cache, with the reason for the removal.
///
/// Notifications are delivered on the cache's maintenance thread, outside
/// all segment locks, so a listener is free to call back into the cache,
/// including for the key it is being notified about. A notification for a
/// key may race with a concurrent `insert` of the same key; listeners must
/// tolerate that.
pub trait RemovalListener<K, V>: Send + Sync {
  fn on_removal(&self, key: K, value: Arc<V>, reason: RemovalReason);
}
