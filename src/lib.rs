//! # tagalloc - A Boundary-Tag Heap Allocator
//!
//! This crate provides a user-space **implicit free list** allocator with
//! boundary-tag coalescing. It manages one contiguous heap region obtained
//! from a [`MemorySource`] (the process break via `sbrk`, or a reserved
//! arena) and exposes malloc/free style operations on top of it.
//!
//! ## Overview
//!
//! Every block carries its size and allocation state twice: in a header word
//! before the payload and in a footer word after it. The footer is what lets
//! a freed block find its predecessor without any stored pointers.
//!
//! ```text
//!   Heap Layout:
//!
//!   heap_low                                                         heap_end
//!   ┌─────┬───────┬───────┬──────────────┬──────────────────────┬──────────┐
//!   │ pad │ 8 : a │ 8 : a │  hdr ... ftr │  hdr   ...      ftr  │  0 : a   │
//!   └─────┴───────┴───────┴──────────────┴──────────────────────┴──────────┘
//!          └─ prologue ──┘ └── block ───┘ └──────── block ─────┘ epilogue
//!                                                               (size 0)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macro (align!)
//!   ├── block      - Tags and block views (internal arithmetic)
//!   ├── heap       - Heap: allocate, free, extend, coalesce
//!   ├── check      - Consistency checker and reports
//!   ├── source     - MemorySource trait
//!   ├── sbrk       - SbrkSource (program break)
//!   ├── arena      - ArenaSource (fixed reserved buffer)
//!   ├── config     - Heap tunables
//!   ├── error      - SourceError, AllocError
//!   └── logging    - tracing subscriber setup
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaSource, Heap};
//!
//! let mut heap = Heap::new(ArenaSource::with_capacity(1 << 16).unwrap());
//!
//! let ptr = heap.allocate(24) as *mut u64;
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!   *ptr = 42;
//!   assert_eq!(*ptr, 42);
//!   heap.deallocate(ptr as *mut u8);
//! }
//!
//! assert!(heap.check().is_consistent());
//! ```
//!
//! ## How It Works
//!
//! Allocation rounds the request up to `payload + 8` bytes (one header and
//! one footer word), aligned to 8 and at least 16, then scans the blocks in
//! address order for the first free one that is big enough:
//!
//! ```text
//!   allocate(n)
//!       │
//!       ▼
//!   first-fit scan ──hit──► place (split if the rest is ≥ 16 bytes)
//!       │
//!      miss
//!       │
//!       ▼
//!   extend heap by max(asize, chunk) ──► coalesce with old tail ──► place
//! ```
//!
//! Freeing rewrites both tags as free and merges the block with whichever
//! physical neighbours are free:
//!
//! ```text
//!   prev   block   next          result
//!   ─────  ─────   ─────         ──────────────────────────
//!   alloc  free    alloc    →    unchanged
//!   alloc  free    free     →    block + next
//!   free   free    alloc    →    prev + block
//!   free   free    free     →    prev + block + next
//! ```
//!
//! The prologue and epilogue are always allocated, so they are never merged
//! and the scan always stops at the epilogue.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`
//! - **Never shrinks**: freed space is reused, never returned to the source
//! - **Linear search**: first-fit over every block, no size classes
//! - **Unix-only**: `SbrkSource` needs `libc` and `sbrk`
//!
//! ## Safety
//!
//! Allocation is safe. Freeing is `unsafe`: a pointer that did not come from
//! the same heap, or one freed twice, corrupts the tags and cannot be
//! detected cheaply. [`Heap::check`] can find the damage afterwards.

pub mod align;
mod arena;
mod block;
mod check;
mod config;
mod error;
mod heap;
pub mod logging;
mod sbrk;
mod source;

pub use arena::ArenaSource;
pub use block::{DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, Tag, WSIZE};
pub use check::{BlockLine, HeapReport, Violation};
pub use config::{CHUNK_SIZE_ENV, Config, DEFAULT_CHUNK_SIZE};
pub use error::{AllocError, SourceError};
pub use heap::{BlockInfo, Blocks, Heap, HeapStats};
pub use sbrk::SbrkSource;
pub use source::MemorySource;
