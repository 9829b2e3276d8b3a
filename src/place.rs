//! First-fit placement: carves an allocation out of a free block located by
//! [`crate::freelist`], splitting off and re-inserting the remainder when
//! it is large enough to be a block in its own right.

use crate::block::{self, MIN_BLOCK_SIZE, WSIZE};
use crate::sbrk::SbrkProvider;
use crate::Allocator;

impl<S: SbrkProvider> Allocator<S> {
  /// Carves `asize` bytes out of the free block at `bp` (which must have
  /// size `>= asize`), marking the carved-out prefix allocated and, if
  /// the remainder is at least [`MIN_BLOCK_SIZE`], splitting it off as a
  /// new free block.
  ///
  /// # Safety
  /// `bp` must currently be a member of the free-list index, with a
  /// header size `>= asize`.
  pub(crate) unsafe fn place(
    &mut self,
    bp: usize,
    asize: usize,
  ) {
    unsafe {
      let hdr = block::hdrp(bp);
      let csize = block::get_size(hdr) as usize;
      let prev_alloc = block::get_prev_alloc(hdr);

      self.freelist_remove(bp);

      if csize - asize >= MIN_BLOCK_SIZE {
        block::write_header(hdr, asize as u32, true, prev_alloc);

        let remainder_bp = bp + asize;
        let remainder_size = csize - asize;
        block::write_header(block::hdrp(remainder_bp), remainder_size as u32, false, true);
        block::write_footer(remainder_bp, remainder_size as u32, false);
        self.freelist_insert(remainder_bp);

        let after = remainder_bp + remainder_size;
        block::set_prev_alloc(block::hdrp(after), false);
      } else {
        block::write_header(hdr, csize as u32, true, prev_alloc);
        let next_bp = bp + csize;
        block::set_prev_alloc(block::hdrp(next_bp), true);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{Allocator, SimulatedHeap};

  fn new_allocator() -> Allocator<SimulatedHeap> {
    Allocator::init(SimulatedHeap::with_capacity(1 << 20)).unwrap()
  }

  #[test]
  fn splitting_leaves_a_usable_free_remainder() {
    let mut a = new_allocator();
    unsafe {
      // One big block from a chunk extension, then carve a small
      // allocation out of the front of it.
      let big = a.allocate(4096);
      assert!(!big.is_null());
      a.free(big);
      let before = a.free_block_count();
      let small = a.allocate(32);
      assert!(!small.is_null());
      // Splitting should leave the remainder as a (still single) free
      // block rather than consuming the whole thing.
      assert_eq!(a.free_block_count(), before);
      assert_eq!(a.check_heap(false), 0);
    }
  }

  #[test]
  fn taking_the_whole_block_when_remainder_too_small() {
    let mut a = new_allocator();
    unsafe {
      // MIN_BLOCK_SIZE is 16; request something whose minimum block
      // size leaves no room > MIN_BLOCK_SIZE when split from a
      // tightly sized free block.
      let p = a.allocate(8);
      a.free(p);
      let before = a.free_block_count();
      let q = a.allocate(8);
      assert_eq!(q, p);
      assert_eq!(a.free_block_count(), before - 1);
    }
  }
}
