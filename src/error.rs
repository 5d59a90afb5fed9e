use std::fmt;

/// Failures reported by a [`MemorySource`](crate::MemorySource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
  /// The increment cannot be expressed as a signed break offset.
  InvalidIncrement(usize),
  /// The operating system refused to move the program break.
  OutOfMemory { requested: usize },
  /// Someone else moved the break since the last extension.
  NonContiguous { expected: usize, found: usize },
  /// A fixed-capacity source has no room left for the request.
  CapacityExhausted { requested: usize, remaining: usize },
}

impl fmt::Display for SourceError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::InvalidIncrement(bytes) => write!(f, "invalid heap increment of {bytes} bytes"),
      Self::OutOfMemory { requested } => {
        write!(f, "out of memory extending the heap by {requested} bytes")
      }
      Self::NonContiguous { expected, found } => write!(
        f,
        "program break moved outside the allocator: expected {expected:#x}, found {found:#x}"
      ),
      Self::CapacityExhausted { requested, remaining } => write!(
        f,
        "arena exhausted: requested {requested} bytes, {remaining} remaining"
      ),
    }
  }
}

impl std::error::Error for SourceError {}

/// Failures reported by the [`Heap`](crate::Heap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
  /// The memory source could not grow the heap.
  Source(SourceError),
  /// The request does not fit in a block tag.
  RequestTooLarge(usize),
  /// A heap extension of zero words was requested.
  ZeroExtension,
  /// `initialize` was called on a heap that already has its sentinels.
  AlreadyInitialized,
  /// The configuration was rejected.
  InvalidConfig(&'static str),
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Source(err) => write!(f, "{err}"),
      Self::RequestTooLarge(size) => write!(f, "request of {size} bytes is too large"),
      Self::ZeroExtension => write!(f, "heap extension of zero words"),
      Self::AlreadyInitialized => write!(f, "heap already initialized"),
      Self::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
    }
  }
}

impl std::error::Error for AllocError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Source(err) => Some(err),
      _ => None,
    }
  }
}

impl From<SourceError> for AllocError {
  fn from(err: SourceError) -> Self {
    Self::Source(err)
  }
}
