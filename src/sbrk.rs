use std::ptr::NonNull;

use libc::{c_void, intptr_t, sbrk};
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::source::{MemorySource, checked_increment, system_page_size};

/// The process data segment, grown with `sbrk(2)`.
///
/// The range is anchored at the program break observed when the source is
/// created. The break is shared with anything else in the process that calls
/// `brk`/`sbrk`; if it moves underneath us, [`extend`](MemorySource::extend)
/// fails with [`SourceError::NonContiguous`] instead of handing out a range
/// with a hole in it.
///
/// That failure is permanent: the recorded end no longer matches the break,
/// so every later `extend` fails the same way. The bytes the failing call
/// obtained stay mapped but are never handed out.
pub struct SbrkSource {
  low: *mut u8,
  end: *mut u8,
}

impl SbrkSource {
  pub fn new() -> Result<Self, SourceError> {
    let brk = unsafe { sbrk(0) };

    if brk == usize::MAX as *mut c_void {
      return Err(SourceError::OutOfMemory { requested: 0 });
    }

    Ok(Self {
      low: brk.cast(),
      end: brk.cast(),
    })
  }
}

impl MemorySource for SbrkSource {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, SourceError> {
    let increment = checked_increment(bytes)? as intptr_t;

    let previous = unsafe { sbrk(increment) };

    if previous == usize::MAX as *mut c_void {
      return Err(SourceError::OutOfMemory { requested: bytes });
    }

    let previous = previous.cast::<u8>();
    if previous != self.end {
      warn!(
        at = ?previous,
        bytes,
        expected = ?self.end,
        "program break moved by another caller, range abandoned"
      );
      return Err(SourceError::NonContiguous {
        expected: self.end as usize,
        found: previous as usize,
      });
    }

    self.end = previous.wrapping_add(bytes);
    debug!(bytes, brk = ?self.end, "moved program break");

    NonNull::new(previous).ok_or(SourceError::OutOfMemory { requested: bytes })
  }

  fn heap_low(&self) -> *mut u8 {
    self.low
  }

  fn heap_size(&self) -> usize {
    self.end as usize - self.low as usize
  }

  fn page_size(&self) -> usize {
    system_page_size()
  }
}
