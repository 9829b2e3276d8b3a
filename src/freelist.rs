//! The free-list index: `LIST_NUM` doubly-linked lists of free blocks,
//! segregated by size class (see [`crate::sizeclass`]).
//!
//! Each free block stores its list linkage in the first two words of its
//! own payload (`next` at `bp`, `prev` at `bp + WSIZE`) as 4-byte offsets
//! from the heap base, with `0` meaning "nil". Inserts always go to the
//! head of their class's list (LIFO).

use crate::block::{self, WSIZE};
use crate::sbrk::SbrkProvider;
use crate::sizeclass::{self, LIST_NUM};
use crate::Allocator;

impl<S: SbrkProvider> Allocator<S> {
  /// Inserts a free block at the head of its size class's list.
  ///
  /// # Safety
  /// `bp` must be the block pointer of a free block whose header already
  /// encodes its final size.
  pub(crate) unsafe fn freelist_insert(
    &mut self,
    bp: usize,
  ) {
    unsafe {
      let size = block::get_size(block::hdrp(bp)) as usize;
      let i = sizeclass::list_of(size);
      let head_addr = self.head_addr(i);
      let head_off = block::get(head_addr);

      if head_off == 0 {
        block::put(head_addr, self.offset_of(bp));
        block::put(bp, 0);
        block::put(bp + WSIZE, 0);
      } else {
        let old_head = self.addr_of(head_off);
        block::put(bp, head_off);
        block::put(bp + WSIZE, 0);
        block::put(old_head + WSIZE, self.offset_of(bp));
        block::put(head_addr, self.offset_of(bp));
      }
    }
  }

  /// Removes a free block from its size class's list.
  ///
  /// The four node-position cases (sole node, head with a successor,
  /// tail with a predecessor, interior) are mutually exclusive, exactly
  /// one describes `bp`, so they're written as an `if`/`else if` chain
  /// rather than independent `if`s, to make that exclusivity explicit
  /// rather than relying on each branch's guard being airtight on its
  /// own.
  ///
  /// # Safety
  /// `bp` must currently be a member of the free list its size maps to.
  pub(crate) unsafe fn freelist_remove(
    &mut self,
    bp: usize,
  ) {
    unsafe {
      let size = block::get_size(block::hdrp(bp)) as usize;
      let i = sizeclass::list_of(size);
      let next_off = block::get(bp);
      let prev_off = block::get(bp + WSIZE);

      if prev_off == 0 && next_off == 0 {
        block::put(self.head_addr(i), 0);
      } else if prev_off == 0 && next_off != 0 {
        let next_bp = self.addr_of(next_off);
        block::put(next_bp + WSIZE, 0);
        block::put(self.head_addr(i), next_off);
      } else if prev_off != 0 && next_off == 0 {
        let prev_bp = self.addr_of(prev_off);
        block::put(prev_bp, 0);
      } else {
        let prev_bp = self.addr_of(prev_off);
        let next_bp = self.addr_of(next_off);
        block::put(prev_bp, next_off);
        block::put(next_bp + WSIZE, prev_off);
      }
    }
  }

  /// Scans lists from `list_of(asize)` upward for the first free block
  /// whose size is at least `asize` (first-fit). Returns `None` if no
  /// list yields a fit.
  pub(crate) fn find_first(
    &self,
    asize: usize,
  ) -> Option<usize> {
    let start = sizeclass::list_of(asize);
    for i in start..LIST_NUM {
      let mut cur = unsafe { block::get(self.head_addr(i)) };
      while cur != 0 {
        let bp = self.addr_of(cur);
        let size = unsafe { block::get_size(block::hdrp(bp)) as usize };
        if size >= asize {
          return Some(bp);
        }
        cur = unsafe { block::get(bp) };
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use crate::{Allocator, SimulatedHeap};

  fn new_allocator() -> Allocator<SimulatedHeap> {
    Allocator::init(SimulatedHeap::with_capacity(1 << 20)).unwrap()
  }

  #[test]
  fn insert_and_remove_round_trip_through_find_first() {
    let mut a = new_allocator();
    unsafe {
      let p = a.allocate(32);
      let q = a.allocate(32);
      a.free(p);
      a.free(q);
      // Both should now be reachable as free blocks of the same class.
      assert!(a.check_heap(false) == 0);
    }
  }

  #[test]
  fn lifo_reuse_returns_most_recently_freed_block_first() {
    let mut a = new_allocator();
    unsafe {
      let p = a.allocate(32);
      let q = a.allocate(32);
      a.free(p);
      a.free(q);
      // LIFO: q was freed last, so it should come out first for an
      // equal-size request, before the allocator would need to reach
      // for p.
      let r = a.allocate(32);
      assert_eq!(r, q);
    }
  }
}
