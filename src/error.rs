//! Error kinds surfaced by the allocator's top-level API.
//!
//! `ClientMisuse` (freeing a non-allocator pointer, a double free, reading
//! past a payload) is deliberately absent from this enum: it is undefined
//! behavior by contract, never detected, and so has nothing to report.
//! `InvariantViolation`s are reported by [`crate::Allocator::check_heap`]
//! as a printed diagnostic and a count, not through this type, since the
//! checker never fails the operation it's checking, see its own docs.

use std::fmt;

/// Failure modes of `init`/`allocate`/`reallocate`/`calloc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// The sbrk provider reported it could not grow the heap further.
  OutOfMemory,
  /// Growing the heap would push it past the 32-bit offset ceiling the
  /// free-list index depends on (free-list links are 4-byte offsets from
  /// the heap base).
  HeapTooLarge,
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::OutOfMemory => write!(f, "sbrk provider is out of memory"),
      AllocError::HeapTooLarge => {
        write!(f, "heap would exceed the 32-bit free-list offset ceiling")
      }
    }
  }
}

impl std::error::Error for AllocError {}

impl From<crate::sbrk::SbrkError> for AllocError {
  fn from(
    _: crate::sbrk::SbrkError,
  ) -> Self {
    AllocError::OutOfMemory
  }
}
