//! # rallocator, a segregated-fit dynamic storage allocator
//!
//! This crate implements a general-purpose dynamic storage allocator over a
//! single contiguous, monotonically-growable byte region supplied by a host
//! (the [`sbrk`] provider). It is a single-threaded allocator: all state is
//! owned by one [`Allocator`] value and callers must serialize access
//! externally, exactly as a C `malloc` replacement built on `sbrk` would be.
//!
//! ## Design
//!
//! ```text
//!   Heap layout (low to high addresses), after init():
//!
//!   [align pad][free-list heads: LIST_NUM words][prologue hdr][prologue ftr]
//!   [ ... working heap: a sequence of blocks ... ][epilogue hdr]
//! ```
//!
//! Each block carries a 4-byte header encoding its size and two flags (is
//! this block allocated, is its physical predecessor allocated). Allocated
//! blocks carry no footer (the predecessor's allocated bit is what lets a
//! neighbor discover whether it even has one). Free blocks carry a footer
//! (so a forward-walking neighbor can find their start) and store their
//! free-list linkage, next/prev, as 4-byte offsets from the heap base, in
//! the first two words of their own payload.
//!
//! [`crate::block`] implements that encoding and the physical-walk
//! arithmetic; [`crate::sizeclass`] implements the 24-way segregated index;
//! [`freelist`], [`coalesce`] and [`place`] implement the free-list
//! operations, boundary-tag coalescing and first-fit-with-splitting
//! placement respectively; this module ties them together into the
//! top-level `init`/`allocate`/`free`/`reallocate`/`calloc` API plus the
//! `check_heap` consistency checker.
//!
//! ## Example
//!
//! ```rust
//! use rallocator::{Allocator, SimulatedHeap};
//!
//! let mut alloc = Allocator::init(SimulatedHeap::with_capacity(1 << 20)).unwrap();
//!
//! unsafe {
//!     let p = alloc.allocate(64) as *mut u64;
//!     assert!(!p.is_null());
//!     *p = 42;
//!     assert_eq!(*p, 42);
//!     alloc.free(p as *mut u8);
//! }
//! ```

pub mod align;
pub mod block;
mod checker;
mod coalesce;
pub mod error;
mod freelist;
mod place;
pub mod sbrk;
pub mod sizeclass;

use std::ptr;

pub use error::AllocError;
pub use sbrk::{SbrkError, SbrkProvider, SimulatedHeap};
#[cfg(unix)]
pub use sbrk::SystemSbrk;
pub use sizeclass::LIST_NUM;

use block::{DSIZE, MIN_BLOCK_SIZE, WSIZE};

/// Default `CHUNKSIZE`: the number of bytes the heap is extended by when no
/// free block satisfies a request and no tunable override was given.
pub const DEFAULT_CHUNKSIZE: usize = (1 << 8) - (1 << 5);

/// A segregated-fit dynamic storage allocator over a heap region grown by
/// `S`.
///
/// All operations are methods on an owned value rather than process-global
/// functions, so multiple independent heaps (e.g. one per test) can coexist
/// (the one piece of truly global state the design this crate continues
/// calls out, `heap_base` and the free-list heads, is just this struct's
/// fields).
pub struct Allocator<S: SbrkProvider> {
  sbrk: S,
  /// Address of the prologue's block pointer. Every other address in the
  /// heap is expressed relative to this one, including the 32-bit
  /// free-list offsets.
  heap_base: usize,
  chunk_size: usize,
}

impl<S: SbrkProvider> Allocator<S> {
  /// Initializes a fresh heap on top of `sbrk`, using [`DEFAULT_CHUNKSIZE`]
  /// as the extension granularity.
  pub fn init(sbrk: S) -> Result<Self, AllocError> {
    Self::init_with_chunk_size(sbrk, DEFAULT_CHUNKSIZE)
  }

  /// Initializes a fresh heap, overriding the extension granularity used
  /// whenever neither the free-list index nor the in-flight request can
  /// be satisfied without growing the heap.
  pub fn init_with_chunk_size(
    mut sbrk: S,
    chunk_size: usize,
  ) -> Result<Self, AllocError> {
    let head_words = LIST_NUM;
    // pad(1) + free-list heads(LIST_NUM) + prologue header(1) +
    // prologue footer(1) + epilogue header(1).
    let total_words = 4 + head_words;
    let base = sbrk.sbrk((total_words * WSIZE) as isize)? as usize;

    unsafe {
      for i in 0..(1 + head_words) {
        block::put(base + i * WSIZE, 0);
      }
      let prologue_hdr = base + (1 + head_words) * WSIZE;
      block::write_header(prologue_hdr, DSIZE as u32, true, true);
      let heap_base = prologue_hdr + WSIZE;
      block::put(heap_base, block::pack(DSIZE as u32, true)); // prologue footer
      let epilogue_hdr = heap_base + WSIZE;
      block::write_header(epilogue_hdr, 0, true, true);

      let mut allocator = Allocator {
        sbrk,
        heap_base,
        chunk_size,
      };
      allocator.extend_heap(chunk_size / WSIZE)?;
      Ok(allocator)
    }
  }

  /// Address of the head slot for free-list `i`.
  fn head_addr(
    &self,
    i: usize,
  ) -> usize {
    self.heap_base - (LIST_NUM + 1) * WSIZE + i * WSIZE
  }

  /// Encodes an in-heap address as a 32-bit offset from the heap base.
  fn offset_of(
    &self,
    addr: usize,
  ) -> u32 {
    (addr - self.heap_base) as u32
  }

  /// Decodes a 32-bit heap-base-relative offset back into an address.
  /// `0` must be checked for "nil" by the caller before calling this.
  fn addr_of(
    &self,
    offset: u32,
  ) -> usize {
    self.heap_base + offset as usize
  }

  /// Extends the heap by at least `words` words (rounded up to an even
  /// count), folds the new space into one free block (coalescing with a
  /// free tail if one exists), and returns that block's pointer.
  fn extend_heap(
    &mut self,
    words: usize,
  ) -> Result<usize, AllocError> {
    let words = if words % 2 != 0 { words + 1 } else { words };
    let size = words * WSIZE;

    let raw = self.sbrk.sbrk(size as isize)?;
    let bp = raw as usize;

    if bp - self.heap_base > u32::MAX as usize {
      return Err(AllocError::HeapTooLarge);
    }

    unsafe {
      let hdr = block::hdrp(bp);
      // This word used to be the epilogue header; its prev-alloc bit
      // tells us whether the block before it was allocated, and that
      // status carries over unchanged onto the new free block.
      let prev_alloc = block::get_prev_alloc(hdr);
      block::write_header(hdr, size as u32, false, prev_alloc);
      block::write_footer(bp, size as u32, false);
      let new_epilogue = bp + size - WSIZE;
      block::write_header(new_epilogue, 0, true, false);
    }

    Ok(self.coalesce(bp))
  }

  /// Allocates `size` bytes and returns a payload pointer aligned to 8
  /// bytes, or null if `size` is zero or the heap could not be grown
  /// enough to satisfy the request.
  ///
  /// # Safety
  /// The caller must eventually pass the returned pointer to [`Self::free`]
  /// (directly or via [`Self::reallocate`]) exactly once, and must not use
  /// it afterward.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }
    let asize = if size > DSIZE {
      crate::align!(size + WSIZE)
    } else {
      MIN_BLOCK_SIZE
    };

    if let Some(bp) = self.find_first(asize) {
      self.place(bp, asize);
      return bp as *mut u8;
    }

    let extend_words = std::cmp::max(asize, self.chunk_size) / WSIZE;
    match self.extend_heap(extend_words) {
      Ok(bp) => {
        self.place(bp, asize);
        bp as *mut u8
      }
      Err(_) => ptr::null_mut(),
    }
  }

  /// Frees a block previously returned by [`Self::allocate`],
  /// [`Self::calloc`] or [`Self::reallocate`]. A null pointer is a no-op.
  ///
  /// # Safety
  /// `bp` must be null or a still-live pointer returned by this allocator,
  /// not previously freed.
  pub unsafe fn free(
    &mut self,
    bp: *mut u8,
  ) {
    if bp.is_null() {
      return;
    }
    let bp = bp as usize;
    unsafe {
      let hdr = block::hdrp(bp);
      let size = block::get_size(hdr) as usize;
      block::write_header_preserve_prev(hdr, size as u32, false);
      block::write_footer(bp, size as u32, false);
      block::set_prev_alloc(block::hdrp(block::next_phys(bp)), false);
      self.coalesce(bp);
    }
  }

  /// Resizes a previous allocation, preserving its contents up to
  /// `min(old_size, size)` bytes. `size == 0` behaves like
  /// `free(bp)` and returns null; `bp.is_null()` behaves like
  /// `allocate(size)`. On failure the original block is left untouched.
  ///
  /// # Safety
  /// Same requirements as [`Self::free`] for `bp`.
  pub unsafe fn reallocate(
    &mut self,
    bp: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      unsafe { self.free(bp) };
      return ptr::null_mut();
    }
    if bp.is_null() {
      return unsafe { self.allocate(size) };
    }

    let old_payload_size = unsafe { block::get_size(block::hdrp(bp as usize)) as usize - WSIZE };
    let new_bp = unsafe { self.allocate(size) };
    if new_bp.is_null() {
      return ptr::null_mut();
    }

    let copy_len = std::cmp::min(size, old_payload_size);
    unsafe {
      ptr::copy_nonoverlapping(bp, new_bp, copy_len);
      self.free(bp);
    }
    new_bp
  }

  /// Allocates space for `n` elements of `elem_size` bytes and zeroes it.
  /// Returns null on overflow or if the underlying allocation fails.
  ///
  /// # Safety
  /// Same requirements as [`Self::allocate`].
  pub unsafe fn calloc(
    &mut self,
    n: usize,
    elem_size: usize,
  ) -> *mut u8 {
    let Some(total) = n.checked_mul(elem_size) else {
      return ptr::null_mut();
    };
    let bp = unsafe { self.allocate(total) };
    if !bp.is_null() {
      unsafe { ptr::write_bytes(bp, 0, total) };
    }
    bp
  }
}
