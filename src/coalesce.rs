//! Boundary-tag coalescing: merges a newly-free block with whichever free
//! physical neighbors it has.
//!
//! Called with a block whose header is already marked free and whose
//! footer has already been written. The order matters: each branch removes
//! the neighbor(s) being absorbed from their free list *before* recomputing
//! the merged size, because the size that ends up in the header is exactly
//! what `list_of` will later use to decide which list the merged block goes
//! into, and the merged block frequently lands in a different list than
//! either half did.

use crate::block::{self, WSIZE};
use crate::sbrk::SbrkProvider;
use crate::Allocator;

impl<S: SbrkProvider> Allocator<S> {
  /// Merges `bp` with any free physical neighbors and inserts the result
  /// into the free-list index, returning the resulting block's pointer.
  ///
  /// # Safety
  /// `bp`'s header must already be written with its (possibly
  /// unmerged) free size, and its footer must already be written.
  pub(crate) unsafe fn coalesce(
    &mut self,
    bp: usize,
  ) -> usize {
    unsafe {
      let hdr = block::hdrp(bp);
      let size = block::get_size(hdr) as usize;
      let prev_alloc = block::get_prev_alloc(hdr);
      let next_bp = bp + size;
      let next_alloc = block::get_alloc(block::hdrp(next_bp));

      match (prev_alloc, next_alloc) {
        (true, true) => {
          self.freelist_insert(bp);
          block::set_prev_alloc(block::hdrp(next_bp), false);
          bp
        }
        (true, false) => {
          let next_size = block::get_size(block::hdrp(next_bp)) as usize;
          self.freelist_remove(next_bp);
          let merged = size + next_size;
          block::write_header(hdr, merged as u32, false, true);
          block::write_footer(bp, merged as u32, false);
          self.freelist_insert(bp);
          bp
        }
        (false, true) => {
          let prev_bp = block::prev_phys(bp);
          let prev_hdr = block::hdrp(prev_bp);
          let prev_size = block::get_size(prev_hdr) as usize;
          self.freelist_remove(prev_bp);
          let merged = prev_size + size;
          block::write_header_preserve_prev(prev_hdr, merged as u32, false);
          block::write_footer(prev_bp, merged as u32, false);
          block::set_prev_alloc(block::hdrp(next_bp), false);
          self.freelist_insert(prev_bp);
          prev_bp
        }
        (false, false) => {
          let prev_bp = block::prev_phys(bp);
          let prev_hdr = block::hdrp(prev_bp);
          let prev_size = block::get_size(prev_hdr) as usize;
          let next_size = block::get_size(block::hdrp(next_bp)) as usize;
          self.freelist_remove(prev_bp);
          self.freelist_remove(next_bp);
          let merged = prev_size + size + next_size;
          block::write_header_preserve_prev(prev_hdr, merged as u32, false);
          block::write_footer(prev_bp, merged as u32, false);
          self.freelist_insert(prev_bp);
          prev_bp
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{Allocator, SimulatedHeap};
  use std::ptr;

  fn new_allocator() -> Allocator<SimulatedHeap> {
    Allocator::init(SimulatedHeap::with_capacity(1 << 20)).unwrap()
  }

  #[test]
  fn freeing_between_two_allocated_neighbors_does_not_merge() {
    let mut a = new_allocator();
    unsafe {
      let x = a.allocate(32);
      let _y = a.allocate(32);
      let before = a.free_block_count();
      a.free(x);
      assert_eq!(a.free_block_count(), before + 1);
      assert_eq!(a.check_heap(false), 0);
    }
  }

  #[test]
  fn freeing_next_to_a_free_block_merges_forward() {
    let mut a = new_allocator();
    unsafe {
      let x = a.allocate(32);
      let y = a.allocate(32);
      a.free(y);
      let before = a.free_block_count();
      a.free(x);
      assert_eq!(a.free_block_count(), before, "x and y should merge into one free block");
      assert_eq!(a.check_heap(false), 0);
    }
  }

  #[test]
  fn freeing_between_two_free_blocks_merges_both_ways() {
    let mut a = new_allocator();
    unsafe {
      let x = a.allocate(32);
      let y = a.allocate(32);
      let z = a.allocate(32);
      a.free(x);
      a.free(z);
      let before = a.free_block_count();
      a.free(y);
      assert_eq!(a.free_block_count(), before - 1, "x, y and z should merge into one block");
      assert_eq!(a.check_heap(false), 0);
    }
  }

  #[test]
  fn merged_block_preserves_bytes_until_reallocated() {
    let mut a = new_allocator();
    unsafe {
      let x = a.allocate(32) as *mut u8;
      ptr::write_bytes(x, 0x11, 32);
      let y = a.allocate(32);
      a.free(y);
      // x is untouched by freeing its neighbor.
      for i in 0..32 {
        assert_eq!(ptr::read(x.add(i)), 0x11);
      }
      a.free(x as *mut u8);
    }
  }
}
