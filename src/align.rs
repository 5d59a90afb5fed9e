/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. With a single argument the value is
/// rounded to the double-word boundary every block size and payload address
/// in the heap sits on.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align!($value, $crate::DSIZE)
  };
  ($value:expr, $alignment:expr) => {
    (($value) + ($alignment) - 1) & !(($alignment) - 1)
  };
}
