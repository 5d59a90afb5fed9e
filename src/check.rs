//! Heap consistency checker.
//!
//! A diagnostic walk over every block, from the prologue to the epilogue.
//! It reports what it finds and never repairs anything.

use std::fmt;

use tracing::warn;

use crate::block::{Block, DSIZE, MAX_BLOCK_SIZE, Tag};
use crate::heap::Heap;
use crate::source::MemorySource;

/// One problem found by [`Heap::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
  /// The prologue is not an allocated double-word block.
  BadPrologue { header: Tag },
  /// A payload address is not double-word aligned.
  Misaligned { addr: usize },
  /// A block's header and footer disagree.
  TagMismatch { addr: usize, header: Tag, footer: Tag },
  /// Two physically adjacent blocks are both free and small enough to
  /// have been merged.
  AdjacentFree { addr: usize },
  /// A block's size runs past the end of the heap.
  Overrun { addr: usize, size: usize },
  /// The terminating block is not allocated or not the last heap word.
  BadEpilogue { addr: usize, header: Tag },
}

impl fmt::Display for Violation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::BadPrologue { header } => write!(f, "Bad prologue header [{header}]"),
      Self::Misaligned { addr } => write!(f, "{addr:#x} is not double word aligned"),
      Self::TagMismatch {
        addr,
        header,
        footer,
      } => write!(
        f,
        "{addr:#x}: header [{header}] does not match footer [{footer}]"
      ),
      Self::AdjacentFree { addr } => write!(f, "{addr:#x}: free block follows a free block"),
      Self::Overrun { addr, size } => {
        write!(f, "{addr:#x}: block of {size} bytes runs past the heap end")
      }
      Self::BadEpilogue { addr, header } => {
        write!(f, "Bad epilogue header [{header}] at {addr:#x}")
      }
    }
  }
}

/// Header and footer of one block as seen by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLine {
  pub addr: usize,
  pub header: Tag,
  /// `None` for the epilogue, which has no footer.
  pub footer: Option<Tag>,
}

/// Result of a heap walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReport {
  /// Prologue payload address, `None` before initialization.
  pub origin: Option<usize>,
  pub blocks: Vec<BlockLine>,
  pub violations: Vec<Violation>,
}

impl HeapReport {
  pub fn is_consistent(&self) -> bool {
    self.violations.is_empty()
  }
}

impl fmt::Display for HeapReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let Some(origin) = self.origin else {
      return writeln!(f, "Heap (uninitialized)");
    };

    writeln!(f, "Heap ({origin:#x}):")?;
    for line in &self.blocks {
      match line.footer {
        Some(footer) => writeln!(
          f,
          "{:#x}: header: [{}] footer: [{}]",
          line.addr, line.header, footer
        )?,
        None => writeln!(f, "{:#x}, EOL", line.addr)?,
      }
    }
    for violation in &self.violations {
      writeln!(f, "Error: {violation}")?;
    }

    Ok(())
  }
}

impl<S: MemorySource> Heap<S> {
  /// Walks the heap and collects every inconsistency.
  ///
  /// The walk never leaves `[heap_low, heap_end)`, so it is safe to run on a
  /// heap whose tags were overwritten by a misbehaving caller.
  pub fn check(&self) -> HeapReport {
    let mut report = HeapReport::default();
    let Some(prologue) = self.prologue else {
      return report;
    };
    report.origin = Some(prologue.addr());

    let end = self.source.heap_end() as usize;

    let header = unsafe { prologue.header() };
    if header.size() != DSIZE || !header.is_allocated() {
      report.violations.push(Violation::BadPrologue { header });
    }

    let mut block = prologue;
    let mut prev_free_size = 0;

    loop {
      let header = unsafe { block.header() };

      if header.size() == 0 {
        report.blocks.push(BlockLine {
          addr: block.addr(),
          header,
          footer: None,
        });
        if !header.is_allocated() || block.addr() != end {
          report.violations.push(Violation::BadEpilogue {
            addr: block.addr(),
            header,
          });
        }
        break;
      }

      if block.addr() + header.size() > end {
        report.violations.push(Violation::Overrun {
          addr: block.addr(),
          size: header.size(),
        });
        break;
      }

      let footer = unsafe { block.footer() };
      report.blocks.push(BlockLine {
        addr: block.addr(),
        header,
        footer: Some(footer),
      });
      check_block(block, header, footer, &mut report.violations);

      let mergeable = prev_free_size != 0 && prev_free_size + header.size() <= MAX_BLOCK_SIZE;
      if !header.is_allocated() && mergeable {
        report.violations.push(Violation::AdjacentFree { addr: block.addr() });
      }
      prev_free_size = if header.is_allocated() { 0 } else { header.size() };

      block = unsafe { block.next() };
    }

    report
  }

  /// Runs [`check`](Self::check), logs every violation and, when `verbose`,
  /// prints the block listing to stdout.
  pub fn verify(
    &self,
    verbose: bool,
  ) -> HeapReport {
    let report = self.check();

    for violation in &report.violations {
      warn!(%violation, "heap check failed");
    }
    if verbose {
      print!("{report}");
    }

    report
  }
}

fn check_block(
  block: Block,
  header: Tag,
  footer: Tag,
  violations: &mut Vec<Violation>,
) {
  if block.addr() % DSIZE != 0 {
    violations.push(Violation::Misaligned { addr: block.addr() });
  }
  if header != footer {
    violations.push(Violation::TagMismatch {
      addr: block.addr(),
      header,
      footer,
    });
  }
}

#[cfg(test)]
mod tests {
  use std::ptr::NonNull;

  use super::*;
  use crate::arena::ArenaSource;
  use crate::block::{WSIZE, write_tag};

  fn heap() -> Heap<ArenaSource> {
    let mut heap = Heap::new(ArenaSource::with_capacity(1 << 16).unwrap());
    heap.initialize().unwrap();
    heap
  }

  fn poke(
    addr: usize,
    tag: Tag,
  ) {
    unsafe { write_tag(NonNull::new(addr as *mut u8).unwrap(), tag) }
  }

  #[test]
  fn test_fresh_heap_is_consistent() {
    let heap = heap();
    let report = heap.check();
    let base = heap.source().heap_low() as usize;

    assert!(report.is_consistent());
    assert_eq!(report.origin, Some(base + 8));
    assert_eq!(
      report.blocks,
      vec![
        BlockLine {
          addr: base + 8,
          header: Tag::pack(8, true),
          footer: Some(Tag::pack(8, true)),
        },
        BlockLine {
          addr: base + 16,
          header: Tag::pack(4096, false),
          footer: Some(Tag::pack(4096, false)),
        },
        BlockLine {
          addr: base + 16 + 4096,
          header: Tag::EPILOGUE,
          footer: None,
        },
      ]
    );
  }

  #[test]
  fn test_uninitialized_heap_reports_nothing() {
    let heap = Heap::new(ArenaSource::with_capacity(64).unwrap());
    let report = heap.check();

    assert_eq!(report, HeapReport::default());
    assert_eq!(report.to_string(), "Heap (uninitialized)\n");
  }

  #[test]
  fn test_detects_footer_overwrite() {
    let mut heap = heap();
    let ptr = heap.allocate(16) as usize;

    // Writing past the 16 requested bytes lands on the footer.
    poke(ptr + 16, Tag::pack(32, true));

    let report = heap.check();
    assert_eq!(
      report.violations,
      vec![Violation::TagMismatch {
        addr: ptr,
        header: Tag::pack(24, true),
        footer: Tag::pack(32, true),
      }]
    );
  }

  #[test]
  fn test_detects_adjacent_free_blocks() {
    let mut heap = heap();
    let a = heap.allocate(8) as usize;
    let b = heap.allocate(8) as usize;

    // Mark both free behind the allocator's back, skipping coalescing.
    for bp in [a, b] {
      poke(bp - WSIZE, Tag::pack(16, false));
      poke(bp + 8, Tag::pack(16, false));
    }

    let violations = heap.check().violations;
    assert!(violations.contains(&Violation::AdjacentFree { addr: b }));
    assert!(violations.contains(&Violation::AdjacentFree { addr: b + 16 }));
  }

  #[test]
  fn test_detects_bad_epilogue() {
    let heap = heap();
    let end = heap.source().heap_end() as usize;

    poke(end - WSIZE, Tag::pack(0, false));

    assert_eq!(
      heap.check().violations,
      vec![Violation::BadEpilogue {
        addr: end,
        header: Tag::pack(0, false),
      }]
    );
  }

  #[test]
  fn test_detects_bad_prologue() {
    let heap = heap();
    let origin = heap.check().origin.unwrap();

    poke(origin - WSIZE, Tag::pack(8, false));

    let violations = heap.check().violations;
    assert_eq!(
      violations[0],
      Violation::BadPrologue {
        header: Tag::pack(8, false)
      }
    );
  }

  #[test]
  fn test_detects_overrun_without_leaving_heap() {
    let heap = heap();
    let first = heap.blocks().next().unwrap().addr;

    poke(first - WSIZE, Tag::pack(1 << 20, false));

    let report = heap.check();
    assert_eq!(
      report.violations,
      vec![Violation::Overrun {
        addr: first,
        size: 1 << 20,
      }]
    );
  }

  #[test]
  fn test_report_listing_format() {
    let heap = heap();
    let base = heap.source().heap_low() as usize;
    let listing = heap.verify(false).to_string();

    let expected = format!(
      "Heap ({:#x}):\n{:#x}: header: [8:a] footer: [8:a]\n{:#x}: header: [4096:f] footer: [4096:f]\n{:#x}, EOL\n",
      base + 8,
      base + 8,
      base + 16,
      base + 16 + 4096
    );
    assert_eq!(listing, expected);
  }
}
