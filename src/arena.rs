use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::SourceError;
use crate::source::{MemorySource, checked_increment, system_page_size};

/// Alignment of the reserved buffer; keeps every block double-word aligned.
const ARENA_ALIGN: usize = 16;

/// A fixed-capacity heap range reserved up front.
///
/// The whole buffer is allocated (zeroed) at construction and handed out by
/// moving a break forward, so addresses never move and the process break is
/// left alone. Useful for tests and for embedding an isolated heap.
pub struct ArenaSource {
  start: NonNull<u8>,
  layout: Layout,
  capacity: usize,
  brk: usize,
}

impl ArenaSource {
  pub fn with_capacity(capacity: usize) -> Result<Self, SourceError> {
    let layout = Layout::from_size_align(capacity.max(ARENA_ALIGN), ARENA_ALIGN)
      .map_err(|_| SourceError::InvalidIncrement(capacity))?;

    let start = unsafe { alloc::alloc_zeroed(layout) };
    let start = NonNull::new(start).ok_or(SourceError::OutOfMemory {
      requested: capacity,
    })?;

    Ok(Self {
      start,
      layout,
      capacity,
      brk: 0,
    })
  }

  /// Total bytes this arena can hand out.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes still available to [`extend`](MemorySource::extend).
  pub fn remaining(&self) -> usize {
    self.capacity() - self.brk
  }

  /// Rewinds the break to an empty range.
  ///
  /// Only sound while nothing refers into the arena, which is why it needs
  /// an owned source rather than one already moved into a heap.
  pub fn reset(&mut self) {
    self.brk = 0;
  }
}

impl MemorySource for ArenaSource {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, SourceError> {
    checked_increment(bytes)?;

    let remaining = self.remaining();
    if bytes > remaining {
      return Err(SourceError::CapacityExhausted {
        requested: bytes,
        remaining,
      });
    }

    let previous = unsafe { self.start.add(self.brk) };
    self.brk += bytes;
    Ok(previous)
  }

  fn heap_low(&self) -> *mut u8 {
    self.start.as_ptr()
  }

  fn heap_size(&self) -> usize {
    self.brk
  }

  fn page_size(&self) -> usize {
    system_page_size()
  }
}

impl Drop for ArenaSource {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.start.as_ptr(), self.layout) }
  }
}
