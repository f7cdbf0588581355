use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// `expire_after_access` was configured with a zero duration. Leave it
  /// unset to disable access expiry.
  ZeroExpireAfterAccess,
  /// `expire_after_write` was configured with a zero duration. Leave it
  /// unset to disable write expiry.
  ZeroExpireAfterWrite,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroExpireAfterAccess => {
        write!(f, "expire_after_access must be a positive duration")
      }
      BuildError::ZeroExpireAfterWrite => {
        write!(f, "expire_after_write must be a positive duration")
      }
    }
  }
}

impl Error for BuildError {}

/// The failure of a `get_with` load, delivered to the leader and to every
/// concurrent waiter of the same key.
///
/// The underlying error is shared, not converted: all callers of the losing
/// round observe the same source error. The failed mapping is removed from
/// the cache, so a later call retries the loader.
#[derive(Debug, Clone)]
pub enum LoadError {
  /// The loader returned an error.
  Failed(Arc<dyn Error + Send + Sync + 'static>),
  /// The loader panicked. The panic is resumed on the loading thread;
  /// waiters observe this variant instead.
  Panicked,
}

impl LoadError {
  pub(crate) fn failed(source: Box<dyn Error + Send + Sync + 'static>) -> Self {
    LoadError::Failed(Arc::from(source))
  }
}

impl fmt::Display for LoadError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LoadError::Failed(source) => write!(f, "loader failed: {}", source),
      LoadError::Panicked => write!(f, "loader panicked"),
    }
  }
}

impl Error for LoadError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      LoadError::Failed(source) => Some(source.as_ref() as &(dyn Error + 'static)),
      LoadError::Panicked => None,
    }
  }
}
