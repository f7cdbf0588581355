use once_cell::sync::Lazy;
use std::time::Instant;

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// The current monotonic time as nanoseconds since the cache epoch.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  Instant::now()
    .saturating_duration_since(*CACHE_EPOCH)
    .as_nanos() as u64
}
