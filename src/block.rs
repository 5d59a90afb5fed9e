//! Boundary tags and block views.
//!
//! Every block is bracketed by two identical tag words:
//!
//! ```text
//!   ┌────────┬──────────────────────────────────┬────────┐
//!   │ header │      payload (+ padding)         │ footer │
//!   │ size|a │                                  │ size|a │
//!   └────────┴──────────────────────────────────┴────────┘
//!    4 bytes  ▲                                   4 bytes
//!             └── block pointer (8-byte aligned)
//! ```
//!
//! A [`Block`] is addressed by its payload pointer. The header sits one word
//! before it and the footer one double word before the next block.

use std::fmt;
use std::ptr::NonNull;

/// Word size: one header or footer tag.
pub const WSIZE: usize = 4;
/// Double word size: the alignment unit of every block.
pub const DSIZE: usize = 8;
/// Header, footer and the smallest payload the heap hands out.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;
/// Largest size a 32-bit tag can encode.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX & !ALLOC_MASK_BITS) as usize;

const ALLOCATED_BIT: u32 = 0x1;
const ALLOC_MASK_BITS: u32 = 0x7;

/// A header or footer word: `size | allocated`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
  /// Size 0, allocated: marks the end of the heap.
  pub const EPILOGUE: Tag = Tag(ALLOCATED_BIT);

  /// Packs a block size and allocation flag into one word.
  ///
  /// # Panics
  ///
  /// If `size` is not a multiple of [`DSIZE`] or exceeds [`MAX_BLOCK_SIZE`].
  #[inline]
  pub fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    assert!(
      size % DSIZE == 0 && size <= MAX_BLOCK_SIZE,
      "block size {size} cannot be encoded in a tag"
    );
    Tag(size as u32 | allocated as u32)
  }

  #[inline]
  pub fn size(self) -> usize {
    (self.0 & !ALLOC_MASK_BITS) as usize
  }

  #[inline]
  pub fn is_allocated(self) -> bool {
    self.0 & ALLOCATED_BIT != 0
  }

  pub(crate) const fn raw(self) -> u32 {
    self.0
  }
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Tag({self})")
  }
}

impl fmt::Display for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let state = if self.is_allocated() { 'a' } else { 'f' };
    write!(f, "{}:{}", self.size(), state)
  }
}

/// Reads the tag word stored at `at`.
///
/// # Safety
///
/// `at` must be 4-byte aligned and point to four readable bytes inside the
/// managed heap.
#[inline]
pub(crate) unsafe fn read_tag(at: NonNull<u8>) -> Tag {
  Tag(unsafe { at.cast::<u32>().read() })
}

/// Writes `tag` at `at`.
///
/// # Safety
///
/// Same as [`read_tag`], for writes.
#[inline]
pub(crate) unsafe fn write_tag(
  at: NonNull<u8>,
  tag: Tag,
) {
  unsafe { at.cast::<u32>().write(tag.raw()) }
}

/// A view over one block of the heap, addressed by its payload pointer.
///
/// The view does not own anything. All accessors that touch memory are
/// `unsafe`: the caller guarantees the pointer names a block of a live,
/// well-formed heap.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Block(NonNull<u8>);

impl Block {
  #[inline]
  pub(crate) fn from_payload(bp: NonNull<u8>) -> Self {
    Self(bp)
  }

  #[inline]
  pub(crate) fn payload(self) -> NonNull<u8> {
    self.0
  }

  #[inline]
  pub(crate) fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  #[inline]
  pub(crate) unsafe fn header(self) -> Tag {
    unsafe { read_tag(self.0.sub(WSIZE)) }
  }

  /// Reads the footer as placed by the current header size.
  #[inline]
  pub(crate) unsafe fn footer(self) -> Tag {
    unsafe { read_tag(self.footer_ptr(self.size())) }
  }

  #[inline]
  pub(crate) unsafe fn size(self) -> usize {
    unsafe { self.header().size() }
  }

  #[inline]
  pub(crate) unsafe fn is_allocated(self) -> bool {
    unsafe { self.header().is_allocated() }
  }

  #[inline]
  pub(crate) unsafe fn set_header(
    self,
    tag: Tag,
  ) {
    unsafe { write_tag(self.0.sub(WSIZE), tag) }
  }

  /// Writes matching header and footer for a block of `size` bytes.
  #[inline]
  pub(crate) unsafe fn set_tags(
    self,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::pack(size, allocated);
    unsafe {
      self.set_header(tag);
      write_tag(self.footer_ptr(size), tag);
    }
  }

  /// The physically following block.
  #[inline]
  pub(crate) unsafe fn next(self) -> Block {
    unsafe { Block(self.0.add(self.size())) }
  }

  /// The physically preceding block, located through its footer.
  #[inline]
  pub(crate) unsafe fn prev(self) -> Block {
    unsafe {
      let prev_footer = read_tag(self.0.sub(DSIZE));
      Block(self.0.sub(prev_footer.size()))
    }
  }

  #[inline]
  unsafe fn footer_ptr(
    self,
    size: usize,
  ) -> NonNull<u8> {
    unsafe { self.0.add(size).sub(DSIZE) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[repr(align(8))]
  struct Words([u32; 16]);

  fn block_at(
    words: &mut Words,
    word: usize,
  ) -> Block {
    let base = NonNull::new(words.0.as_mut_ptr()).unwrap().cast::<u8>();
    Block::from_payload(unsafe { base.add(word * WSIZE) })
  }

  #[test]
  fn test_tag_packing() {
    let tag = Tag::pack(24, true);
    assert_eq!(tag.size(), 24);
    assert!(tag.is_allocated());

    let tag = Tag::pack(4096, false);
    assert_eq!(tag.size(), 4096);
    assert!(!tag.is_allocated());

    assert_eq!(Tag::EPILOGUE.size(), 0);
    assert!(Tag::EPILOGUE.is_allocated());
    assert_eq!(Tag::pack(MAX_BLOCK_SIZE, false).size(), MAX_BLOCK_SIZE);
  }

  #[test]
  #[cfg(target_pointer_width = "64")]
  #[should_panic(expected = "cannot be encoded in a tag")]
  fn test_pack_rejects_size_past_tag_limit() {
    Tag::pack(MAX_BLOCK_SIZE + DSIZE, false);
  }

  #[test]
  #[should_panic(expected = "cannot be encoded in a tag")]
  fn test_pack_rejects_unaligned_size() {
    Tag::pack(12, true);
  }

  #[test]
  fn test_tag_display() {
    assert_eq!(Tag::pack(16, true).to_string(), "16:a");
    assert_eq!(Tag::pack(32, false).to_string(), "32:f");
  }

  #[test]
  fn test_set_tags_writes_header_and_footer() {
    let mut words = Words([0; 16]);
    let block = block_at(&mut words, 2);

    unsafe {
      block.set_tags(24, true);
      assert_eq!(block.size(), 24);
      assert!(block.is_allocated());
      assert_eq!(block.header(), block.footer());
    }

    // header at word 1, footer at word 1 + 24 / 4 - 1
    assert_eq!(words.0[1], 24 | 1);
    assert_eq!(words.0[6], 24 | 1);
  }

  #[test]
  fn test_next_and_prev_navigate_by_tags() {
    let mut words = Words([0; 16]);
    let first = block_at(&mut words, 2);

    unsafe {
      first.set_tags(16, true);
      let second = first.next();
      second.set_tags(24, false);

      assert_eq!(second.addr() - first.addr(), 16);
      assert_eq!(second.prev(), first);
      assert_eq!(second.size(), 24);
      assert!(!second.is_allocated());
    }
  }
}
