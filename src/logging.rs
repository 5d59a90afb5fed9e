//! Logging setup.
//!
//! The allocator emits `tracing` events under the `tagalloc` target:
//! `trace` for every allocate/free, `debug` for heap extensions and
//! coalescing, `warn` for failed allocations and heap check violations.
//! Nothing is printed until a subscriber is installed.

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
///
/// Defaults to `tagalloc=debug` in debug builds and `tagalloc=info`
/// otherwise. Does nothing if a global subscriber is already set.
pub fn init_logging() {
  use tracing_subscriber::{EnvFilter, fmt};

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    #[cfg(debug_assertions)]
    {
      EnvFilter::new("tagalloc=debug")
    }
    #[cfg(not(debug_assertions))]
    {
      EnvFilter::new("tagalloc=info")
    }
  });

  fmt().with_env_filter(filter).compact().try_init().ok();
}
