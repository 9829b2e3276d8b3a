//! The consistency checker. Walks the heap two ways: physically, block by
//! block, and through the free-list index, then cross-checks them against
//! each other and against the invariants block layout promises. It never
//! mutates state; a violation is reported, not corrected.
//!
//! `check_block`'s size check reads the size out of the block's header
//! word, never out of the payload pointer itself. The payload's first
//! bytes are live free-list linkage on a free block and client data on an
//! allocated one, neither of which holds a size.

use std::collections::HashSet;

use crate::block::{self, DSIZE, MIN_BLOCK_SIZE, WSIZE};
use crate::sbrk::SbrkProvider;
use crate::sizeclass::{self, LIST_NUM};
use crate::Allocator;

impl<S: SbrkProvider> Allocator<S> {
  /// Number of free blocks currently in the heap, found by physical walk.
  /// A convenience for tests; not part of the diagnostic contract
  /// [`Self::check_heap`] exposes.
  pub fn free_block_count(&self) -> usize {
    let mut count = 0;
    let mut bp = self.heap_base + DSIZE;
    loop {
      let hdr = block::hdrp(bp);
      let size = unsafe { block::get_size(hdr) } as usize;
      if size == 0 {
        break;
      }
      if !unsafe { block::get_alloc(hdr) } {
        count += 1;
      }
      bp += size;
    }
    count
  }

  /// Checks every invariant the heap is supposed to hold between calls:
  /// alignment, a well-formed prologue and epilogue, full physical
  /// coverage from one to the other, header/footer and prev-alloc-bit
  /// consistency, absence of adjacent free blocks, minimum block size,
  /// and that free blocks and the free-list index agree with each other
  /// exactly.
  ///
  /// Prints each violation when `verbose` is set. Always returns the
  /// violation count, so tests can assert `check_heap(false) == 0`
  /// without needing to capture stdout.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) -> usize {
    let mut violations = 0usize;
    let mut report = |msg: String| {
      violations += 1;
      if verbose {
        println!("check_heap: {msg}");
      }
    };

    let prologue_hdr = block::hdrp(self.heap_base);
    let prologue_size = unsafe { block::get_size(prologue_hdr) } as usize;
    let prologue_alloc = unsafe { block::get_alloc(prologue_hdr) };
    let prologue_prev_alloc = unsafe { block::get_prev_alloc(prologue_hdr) };
    if prologue_size != DSIZE || !prologue_alloc || !prologue_prev_alloc {
      report(format!(
        "bad prologue at {:#x}: size={prologue_size}, alloc={prologue_alloc}, prev_alloc={prologue_prev_alloc}",
        self.heap_base
      ));
    }

    let mut free_blocks: HashSet<usize> = HashSet::new();
    let mut bp = self.heap_base + DSIZE;
    let mut prev_actually_alloc = true; // the prologue is always allocated

    loop {
      let hdr = block::hdrp(bp);
      let size = unsafe { block::get_size(hdr) } as usize;
      if size == 0 {
        let epilogue_alloc = unsafe { block::get_alloc(hdr) };
        if !epilogue_alloc {
          report(format!("bad epilogue at {bp:#x}: expected alloc=true, got false"));
        }
        if bp as *mut u8 != self.sbrk.heap_hi() {
          report(format!(
            "epilogue at {bp:#x} does not sit at the managed heap's top ({:?})",
            self.sbrk.heap_hi()
          ));
        }
        break; // reached the epilogue
      }
      let alloc = unsafe { block::get_alloc(hdr) };
      let prev_alloc_bit = unsafe { block::get_prev_alloc(hdr) };

      if bp % DSIZE != 0 {
        report(format!("block at {bp:#x} is not 8-byte aligned"));
      }
      if size % DSIZE != 0 {
        report(format!("block at {bp:#x} has size {size}, not a multiple of 8"));
      }
      if size < MIN_BLOCK_SIZE {
        report(format!("block at {bp:#x} has size {size} < MIN_BLOCK_SIZE"));
      }
      if prev_alloc_bit != prev_actually_alloc {
        report(format!(
          "block at {bp:#x} has prev-alloc bit {prev_alloc_bit}, but its predecessor is {}",
          if prev_actually_alloc { "allocated" } else { "free" }
        ));
      }
      if !alloc {
        let footer = block::ftrp(bp, size);
        let footer_size = unsafe { block::get_size(footer) } as usize;
        let footer_alloc = unsafe { block::get_alloc(footer) };
        if footer_size != size || footer_alloc {
          report(format!(
            "free block at {bp:#x} has header (size={size}, alloc=false) but footer (size={footer_size}, alloc={footer_alloc})"
          ));
        }
        if !prev_actually_alloc {
          report(format!(
            "block at {bp:#x} is free and its physical predecessor is also free"
          ));
        }
        free_blocks.insert(bp);
      }

      prev_actually_alloc = alloc;
      bp += size;
    }

    let mut visited: HashSet<usize> = HashSet::new();
    for i in 0..LIST_NUM {
      let mut cur = unsafe { block::get(self.head_addr(i)) };
      let mut prev_off = 0u32;
      while cur != 0 {
        let node_bp = self.addr_of(cur);
        if node_bp % WSIZE != 0 {
          report(format!("free-list {i} node offset {cur:#x} is not word-aligned"));
        }
        if !free_blocks.contains(&node_bp) {
          report(format!(
            "free-list {i} contains {node_bp:#x}, which the physical walk did not find free"
          ));
        } else {
          let size = unsafe { block::get_size(block::hdrp(node_bp)) } as usize;
          let expected = sizeclass::list_of(size);
          if expected != i {
            report(format!(
              "block {node_bp:#x} of size {size} is in free-list {i}, expected list {expected}"
            ));
          }
        }
        let actual_prev = unsafe { block::get(node_bp + WSIZE) };
        if actual_prev != prev_off {
          report(format!(
            "free-list {i} node {node_bp:#x} has prev offset {actual_prev:#x}, expected {prev_off:#x}"
          ));
        }
        visited.insert(node_bp);
        prev_off = cur;
        cur = unsafe { block::get(node_bp) };
      }
    }

    for &bp in &free_blocks {
      if !visited.contains(&bp) {
        report(format!(
          "block {bp:#x} is free per the physical walk but appears in no free list"
        ));
      }
    }

    violations
  }
}

#[cfg(test)]
mod tests {
  use crate::{Allocator, SimulatedHeap};

  fn new_allocator() -> Allocator<SimulatedHeap> {
    Allocator::init(SimulatedHeap::with_capacity(1 << 20)).unwrap()
  }

  #[test]
  fn fresh_heap_has_no_violations() {
    let a = new_allocator();
    assert_eq!(a.check_heap(true), 0);
  }

  #[test]
  fn checker_stays_clean_across_many_operations() {
    let mut a = new_allocator();
    let mut live = Vec::new();
    unsafe {
      for size in [8usize, 16, 40, 100, 4096, 17, 9000, 33000] {
        live.push(a.allocate(size));
        assert_eq!(a.check_heap(false), 0, "after allocating {size}");
      }
      for (i, &p) in live.iter().enumerate() {
        if i % 3 == 0 {
          a.free(p);
          assert_eq!(a.check_heap(false), 0, "after freeing index {i}");
        }
      }
    }
  }

  #[test]
  fn free_block_count_matches_manual_accounting() {
    let mut a = new_allocator();
    unsafe {
      assert_eq!(a.free_block_count(), 1, "a freshly initialized heap is one big free block");
      let p = a.allocate(64);
      assert_eq!(a.free_block_count(), 1, "splitting a big block still leaves one remainder");
      a.free(p);
      assert_eq!(a.free_block_count(), 1);
    }
  }

  #[test]
  fn checker_validates_prologue_and_epilogue_on_a_grown_heap() {
    let mut a = new_allocator();
    unsafe {
      let p = a.allocate(1 << 20);
      assert!(!p.is_null());
      assert_eq!(a.check_heap(true), 0);
    }
  }
}
