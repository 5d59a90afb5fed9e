use std::ptr::NonNull;

use crate::error::SourceError;

/// A monotonically growing byte range the heap is carved from.
///
/// Implementations only hand out memory; they never shrink and never look
/// inside the bytes they return.
pub trait MemorySource {
  /// Grows the range by exactly `bytes` and returns the previous end.
  ///
  /// The returned pointer must stay valid, and the range contiguous, for as
  /// long as the source lives.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, SourceError>;

  /// First byte of the range.
  fn heap_low(&self) -> *mut u8;

  /// Number of bytes handed out so far.
  fn heap_size(&self) -> usize;

  /// Page size of the underlying system.
  fn page_size(&self) -> usize;

  /// Last byte of the range.
  fn heap_high(&self) -> *mut u8 {
    self.heap_end().wrapping_sub(1)
  }

  /// One past the last byte of the range.
  fn heap_end(&self) -> *mut u8 {
    self.heap_low().wrapping_add(self.heap_size())
  }
}

/// Page size reported by the operating system.
pub(crate) fn system_page_size() -> usize {
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    size if size > 0 => size as usize,
    _ => 4096,
  }
}

/// Converts a byte count into a break increment, rejecting counts that do
/// not fit in a signed offset.
pub(crate) fn checked_increment(bytes: usize) -> Result<isize, SourceError> {
  isize::try_from(bytes).map_err(|_| SourceError::InvalidIncrement(bytes))
}
