//! The sbrk provider: the external collaborator that grows the managed
//! heap region on demand.
//!
//! The allocator core never calls `libc::sbrk` directly. It talks to
//! whatever implements [`SbrkProvider`]. This is a Rust-shaped
//! generalization of the original's implicit global `mem_sbrk` /
//! `mem_heap_lo` / `mem_heap_hi` functions: instead of the allocator
//! reaching out to hidden process state, it owns its collaborator through
//! a generic parameter (see the "Global state" note this crate's design
//! carries forward). [`SystemSbrk`] wraps the real `sbrk(2)` syscall;
//! [`SimulatedHeap`] is a pointer-stable in-process arena used by tests and
//! by embedders who would rather not touch the real process break at all.

use std::fmt;

/// Growing the heap failed: the provider is out of address space, or the
/// requested increment would exceed whatever bound it enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbrkError;

impl fmt::Display for SbrkError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "sbrk provider failed to grow the heap")
  }
}

impl std::error::Error for SbrkError {}

/// A host that can grow a single contiguous, monotonically-growable byte
/// region and report its current bounds.
pub trait SbrkProvider {
  /// Grows the managed region by `increment` bytes (always positive in
  /// this allocator) and returns the address of the first byte of the
  /// newly added region, or [`SbrkError`] if the provider is exhausted.
  fn sbrk(
    &mut self,
    increment: isize,
  ) -> Result<*mut u8, SbrkError>;

  /// Lowest address ever handed out by this provider.
  fn heap_lo(&self) -> *mut u8;

  /// Address one past the highest byte currently managed.
  fn heap_hi(&self) -> *mut u8;
}

/// A provider backed by the real process break, via `libc::sbrk`.
#[cfg(unix)]
pub struct SystemSbrk {
  lo: Option<*mut u8>,
  hi: *mut u8,
}

#[cfg(unix)]
impl SystemSbrk {
  /// Captures the current program break as the baseline for this
  /// provider.
  pub fn new() -> Self {
    let hi = unsafe { libc::sbrk(0) } as *mut u8;
    Self { lo: None, hi }
  }
}

#[cfg(unix)]
impl Default for SystemSbrk {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(unix)]
impl SbrkProvider for SystemSbrk {
  fn sbrk(
    &mut self,
    increment: isize,
  ) -> Result<*mut u8, SbrkError> {
    // The C convention: sbrk returns (void*)-1 on failure. Compare by
    // that sentinel value, not by a null check, mirroring what the
    // real call contract promises.
    let raw = unsafe { libc::sbrk(increment as libc::intptr_t) };
    if raw as isize == -1 {
      return Err(SbrkError);
    }
    if self.lo.is_none() {
      self.lo = Some(raw as *mut u8);
    }
    let grown_by = if increment > 0 { increment as usize } else { 0 };
    self.hi = unsafe { (raw as *mut u8).add(grown_by) };
    Ok(raw as *mut u8)
  }

  fn heap_lo(&self) -> *mut u8 {
    self.lo.unwrap_or(std::ptr::null_mut())
  }

  fn heap_hi(&self) -> *mut u8 {
    self.hi
  }
}

/// A fixed-capacity, pointer-stable arena that simulates `sbrk` without
/// touching the real process break.
///
/// The backing storage is allocated once, up front, at its full capacity
/// and never reallocated, so every pointer handed out remains valid for
/// the lifetime of the `SimulatedHeap`, exactly the stability guarantee
/// the real process break provides.
pub struct SimulatedHeap {
  storage: Vec<u8>,
  brk: usize,
}

impl SimulatedHeap {
  /// Reserves `capacity` bytes of backing storage. The simulated heap can
  /// grow up to, but not past, this capacity.
  pub fn with_capacity(
    capacity: usize,
  ) -> Self {
    Self {
      storage: vec![0u8; capacity],
      brk: 0,
    }
  }
}

impl SbrkProvider for SimulatedHeap {
  fn sbrk(
    &mut self,
    increment: isize,
  ) -> Result<*mut u8, SbrkError> {
    if increment < 0 {
      return Err(SbrkError);
    }
    let increment = increment as usize;
    let new_brk = self.brk.checked_add(increment).ok_or(SbrkError)?;
    if new_brk > self.storage.len() {
      return Err(SbrkError);
    }
    let ptr = unsafe { self.storage.as_mut_ptr().add(self.brk) };
    self.brk = new_brk;
    Ok(ptr)
  }

  fn heap_lo(&self) -> *mut u8 {
    self.storage.as_ptr() as *mut u8
  }

  fn heap_hi(&self) -> *mut u8 {
    unsafe { self.storage.as_ptr().add(self.brk) as *mut u8 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn simulated_heap_grows_and_returns_contiguous_pointers() {
    let mut heap = SimulatedHeap::with_capacity(1024);
    let a = heap.sbrk(64).unwrap();
    let b = heap.sbrk(64).unwrap();
    assert_eq!(unsafe { a.add(64) }, b);
  }

  #[test]
  fn simulated_heap_fails_past_capacity() {
    let mut heap = SimulatedHeap::with_capacity(128);
    assert!(heap.sbrk(64).is_ok());
    assert!(heap.sbrk(128).is_err());
  }

  #[test]
  fn simulated_heap_rejects_negative_increment() {
    let mut heap = SimulatedHeap::with_capacity(128);
    assert!(heap.sbrk(-1).is_err());
  }

  #[test]
  fn heap_bounds_track_growth() {
    let mut heap = SimulatedHeap::with_capacity(256);
    let lo = heap.heap_lo();
    assert_eq!(heap.heap_hi(), lo);
    heap.sbrk(32).unwrap();
    assert_eq!(heap.heap_hi(), unsafe { lo.add(32) });
  }
}
