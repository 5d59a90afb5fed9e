use std::env;

use crate::block::{DSIZE, MAX_BLOCK_SIZE};
use crate::error::AllocError;

/// Default amount the heap grows by when no free block fits (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

/// Environment variable read by [`Config::from_env`].
pub const CHUNK_SIZE_ENV: &str = "TAGALLOC_CHUNK_SIZE";

/// Tunables for a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Minimum number of bytes requested from the source per extension.
  pub chunk_size: usize,
}

impl Config {
  pub const fn new() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
    }
  }

  pub const fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  /// Defaults, with the chunk size overridden by `TAGALLOC_CHUNK_SIZE` when
  /// it holds a number.
  pub fn from_env() -> Self {
    let config = Self::new();
    match env::var(CHUNK_SIZE_ENV).ok().and_then(|v| v.trim().parse().ok()) {
      Some(chunk_size) => config.with_chunk_size(chunk_size),
      None => config,
    }
  }

  pub fn validate(&self) -> Result<(), AllocError> {
    if self.chunk_size == 0 {
      return Err(AllocError::InvalidConfig("chunk size must be non-zero"));
    }
    if self.chunk_size % DSIZE != 0 {
      return Err(AllocError::InvalidConfig("chunk size must be a multiple of 8"));
    }
    if self.chunk_size > MAX_BLOCK_SIZE {
      return Err(AllocError::InvalidConfig("chunk size does not fit in a block tag"));
    }
    Ok(())
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_chunk_is_one_page() {
    let config = Config::default();
    assert_eq!(config.chunk_size, 4096);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_rejects_bad_chunk_sizes() {
    for chunk_size in [0, 12, 4095, MAX_BLOCK_SIZE.wrapping_add(DSIZE)] {
      let config = Config::new().with_chunk_size(chunk_size);
      assert!(
        matches!(config.validate(), Err(AllocError::InvalidConfig(_))),
        "chunk size {chunk_size} accepted"
      );
    }
  }

  #[test]
  fn test_accepts_larger_aligned_chunks() {
    let config = Config::new().with_chunk_size(1 << 16);
    assert!(config.validate().is_ok());
  }
}
