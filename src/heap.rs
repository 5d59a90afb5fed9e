use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use tracing::{debug, trace, warn};

use crate::align;
use crate::block::{Block, DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, Tag, WSIZE, write_tag};
use crate::config::Config;
use crate::error::AllocError;
use crate::source::MemorySource;

/// Snapshot of one block of the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload address.
  pub addr: usize,
  /// Full block size, tags included.
  pub size: usize,
  pub allocated: bool,
}

/// Aggregate view of the block list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub heap_size: usize,
  pub blocks: usize,
  pub allocated_blocks: usize,
  pub free_blocks: usize,
  pub allocated_bytes: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
  pub extensions: usize,
}

/// An implicit-free-list heap with boundary-tag coalescing.
///
/// The heap owns its [`MemorySource`] and lays blocks out contiguously
/// between a prologue and an epilogue sentinel. Allocation is first-fit;
/// freed blocks are merged with free neighbours immediately.
pub struct Heap<S: MemorySource> {
  pub(crate) source: S,
  pub(crate) prologue: Option<Block>,
  config: Config,
  extensions: usize,
}

impl<S: MemorySource> Heap<S> {
  pub fn new(source: S) -> Self {
    Self {
      source,
      prologue: None,
      config: Config::default(),
      extensions: 0,
    }
  }

  pub fn with_config(
    source: S,
    config: Config,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    Ok(Self {
      config,
      ..Self::new(source)
    })
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn is_initialized(&self) -> bool {
    self.prologue.is_some()
  }

  /// Lays down the prologue and epilogue and seeds the heap with one free
  /// chunk.
  ///
  /// Allocation initializes lazily, so calling this is optional. A failed
  /// seeding extension still leaves a well-formed empty heap behind.
  pub fn initialize(&mut self) -> Result<(), AllocError> {
    if self.is_initialized() {
      return Err(AllocError::AlreadyInitialized);
    }

    self.init_heap()
  }

  fn init_heap(&mut self) -> Result<(), AllocError> {
    let misalignment = self.source.heap_end() as usize % DSIZE;
    if misalignment != 0 {
      self.source.extend(DSIZE - misalignment)?;
    }

    let start = self.source.extend(4 * WSIZE)?;

    let prologue = unsafe {
      write_tag(start, Tag::pack(0, false));
      write_tag(start.add(WSIZE), Tag::pack(DSIZE, true));
      write_tag(start.add(2 * WSIZE), Tag::pack(DSIZE, true));
      write_tag(start.add(3 * WSIZE), Tag::EPILOGUE);
      Block::from_payload(start.add(2 * WSIZE))
    };
    self.prologue = Some(prologue);

    debug!(origin = ?prologue.payload(), "heap initialized");

    self.extend_heap(self.config.chunk_size / WSIZE)?;
    Ok(())
  }

  /// Allocates at least `size` bytes.
  ///
  /// Returns `Ok(None)` for a zero-sized request without touching the heap.
  /// The returned memory is 8-byte aligned and not zeroed.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    if size == 0 {
      return Ok(None);
    }

    let asize = adjusted_size(size)?;

    if !self.is_initialized() {
      self.init_heap()?;
    }

    let block = match self.find_fit(asize) {
      Some(block) => block,
      None => {
        let extend_size = asize.max(self.config.chunk_size);
        self.extend_heap(extend_size / WSIZE)?
      }
    };

    unsafe { self.place(block, asize) };
    trace!(size, asize, ptr = ?block.payload(), "allocated");

    Ok(Some(block.payload()))
  }

  /// Allocates at least `size` bytes, returning null on a zero-sized request
  /// or on failure.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_allocate(size) {
      Ok(Some(ptr)) => ptr.as_ptr(),
      Ok(None) => ptr::null_mut(),
      Err(err) => {
        warn!(size, error = %err, "allocation failed");
        ptr::null_mut()
      }
    }
  }

  /// Returns a block to the heap and merges it with free neighbours.
  ///
  /// A null pointer is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by [`allocate`](Self::allocate)
  /// or [`try_allocate`](Self::try_allocate) on this heap that has not been
  /// freed since. Double frees and foreign pointers cannot be detected and
  /// corrupt the heap.
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(bp) = NonNull::new(ptr) else {
      return;
    };
    debug_assert!(self.is_initialized(), "free on an uninitialized heap");

    unsafe {
      let block = Block::from_payload(bp);
      let size = block.size();

      block.set_tags(size, false);
      trace!(size, ptr = ?bp, "freed");

      self.coalesce(block);
    }
  }

  /// Payload bytes available behind `ptr`.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this heap.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { Block::from_payload(ptr).size() - DSIZE }
  }

  /// Walks the blocks between the prologue and the epilogue in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      next: self.prologue.map(|prologue| unsafe { prologue.next() }),
      _heap: PhantomData,
    }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.source.heap_size(),
      extensions: self.extensions,
      ..HeapStats::default()
    };

    for block in self.blocks() {
      stats.blocks += 1;
      if block.allocated {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += block.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      }
    }

    stats
  }

  /// Grows the heap by `words` (rounded up to an even count) and returns the
  /// new free block, merged with a free block that ended the old heap.
  fn extend_heap(
    &mut self,
    words: usize,
  ) -> Result<Block, AllocError> {
    if words == 0 {
      return Err(AllocError::ZeroExtension);
    }

    let words = words + words % 2;
    let bytes = words
      .checked_mul(WSIZE)
      .filter(|&bytes| bytes <= MAX_BLOCK_SIZE)
      .ok_or(AllocError::RequestTooLarge(words.saturating_mul(WSIZE)))?;

    // The new block merges with a free tail; the result must fit a tag.
    if self.trailing_free() + bytes > MAX_BLOCK_SIZE {
      return Err(AllocError::RequestTooLarge(bytes));
    }

    let bp = self.source.extend(bytes)?;
    self.extensions += 1;
    debug!(bytes, heap_size = self.source.heap_size(), "extended heap");

    // The new block's header lands on the old epilogue.
    unsafe {
      let block = Block::from_payload(bp);
      block.set_tags(bytes, false);
      block.next().set_header(Tag::EPILOGUE);

      Ok(self.coalesce(block))
    }
  }

  /// Merges a free block with its free physical neighbours.
  ///
  /// Rewrites one header and one footer and returns the merged block. A
  /// merge whose size would not fit in a tag is skipped, so two free blocks
  /// may stay adjacent when together they exceed [`MAX_BLOCK_SIZE`].
  unsafe fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    unsafe {
      let prev = block.prev();
      let next = block.next();
      let mut size = block.size();

      let mut merge_prev = !prev.is_allocated() && size + prev.size() <= MAX_BLOCK_SIZE;
      let merge_next = !next.is_allocated() && size + next.size() <= MAX_BLOCK_SIZE;
      if merge_prev && merge_next && size + prev.size() + next.size() > MAX_BLOCK_SIZE {
        merge_prev = false;
      }
      if (!prev.is_allocated() && !merge_prev) || (!next.is_allocated() && !merge_next) {
        debug!(ptr = ?block.payload(), size, "merge skipped, size exceeds tag limit");
      }

      match (merge_prev, merge_next) {
        (false, false) => block,
        (false, true) => {
          size += next.size();
          block.set_tags(size, false);
          debug!(ptr = ?block.payload(), size, "merged with next block");
          block
        }
        (true, false) => {
          size += prev.size();
          prev.set_tags(size, false);
          debug!(ptr = ?prev.payload(), size, "merged with previous block");
          prev
        }
        (true, true) => {
          size += prev.size() + next.size();
          prev.set_tags(size, false);
          debug!(ptr = ?prev.payload(), size, "merged with both neighbours");
          prev
        }
      }
    }
  }

  /// Size of the free block ending the heap, 0 when the last block is
  /// allocated.
  fn trailing_free(&self) -> usize {
    let Some(end) = NonNull::new(self.source.heap_end()) else {
      return 0;
    };

    unsafe {
      let last = Block::from_payload(end).prev();
      if last.is_allocated() { 0 } else { last.size() }
    }
  }

  /// First free block of at least `asize` bytes, in address order.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    let mut current = unsafe { self.prologue?.next() };

    unsafe {
      while current.size() > 0 {
        if !current.is_allocated() && current.size() >= asize {
          return Some(current);
        }
        current = current.next();
      }
    }

    None
  }

  /// Marks `asize` bytes of a free block allocated, splitting off the rest
  /// when it can hold a block of its own.
  unsafe fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    unsafe {
      let block_size = block.size();

      if block_size - asize < MIN_BLOCK_SIZE {
        block.set_tags(block_size, true);
      } else {
        block.set_tags(asize, true);
        block.next().set_tags(block_size - asize, false);
      }
    }
  }
}

/// Block size needed to serve a `size`-byte request: payload plus tags,
/// rounded to a double word, never below [`MIN_BLOCK_SIZE`].
pub(crate) fn adjusted_size(size: usize) -> Result<usize, AllocError> {
  let with_tags = size
    .checked_add(DSIZE)
    .filter(|&bytes| bytes <= MAX_BLOCK_SIZE)
    .ok_or(AllocError::RequestTooLarge(size))?;

  Ok(align!(with_tags).max(MIN_BLOCK_SIZE))
}

/// Iterator returned by [`Heap::blocks`].
pub struct Blocks<'a> {
  next: Option<Block>,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let block = self.next?;

    let header = unsafe { block.header() };
    if header.size() == 0 {
      self.next = None;
      return None;
    }

    self.next = Some(unsafe { block.next() });
    Some(BlockInfo {
      addr: block.addr(),
      size: header.size(),
      allocated: header.is_allocated(),
    })
  }
}
