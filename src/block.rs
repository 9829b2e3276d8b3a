//! Block layout & tags.
//!
//! A block is a contiguous region of the heap addressed by its *block
//! pointer* (`bp`), the address of its payload, one word past the header.
//! Every block carries a header word immediately before `bp`; free blocks
//! additionally carry a footer word as their last word, and store their
//! free-list linkage in the first two words of the payload (see
//! [`crate::freelist`]).
//!
//! Addresses are plain `usize` rather than typed pointers: the allocator
//! walks the heap by arithmetic on block sizes read out of headers, and
//! keeping that arithmetic in `usize` avoids a pointer-provenance dance at
//! every hop. All reads/writes here are raw 32-bit word accesses (the
//! header/footer width is fixed at 4 bytes regardless of the host's pointer
//! width, since the free-list index depends on that width to keep its
//! links at 4 bytes, see [`crate::freelist`]).

use core::ptr;

/// Width of a header/footer/free-list-link word, in bytes.
pub const WSIZE: usize = 4;

/// Minimum payload alignment and the granularity every block size is a
/// multiple of.
pub const DSIZE: usize = 8;

/// Smallest legal block size: header + next + prev + footer.
pub const MIN_BLOCK_SIZE: usize = 16;

const ALLOC_BIT: u32 = 0x1;
const PREV_ALLOC_BIT: u32 = 0x2;
const SIZE_MASK: u32 = !0x7;

/// Reads the 32-bit word at `addr`.
///
/// # Safety
/// `addr` must be a 4-byte-aligned address of a live word inside the
/// managed heap.
#[inline(always)]
pub unsafe fn get(
  addr: usize,
) -> u32 {
  unsafe { ptr::read(addr as *const u32) }
}

/// Writes the 32-bit word at `addr`.
///
/// # Safety
/// Same requirement as [`get`].
#[inline(always)]
pub unsafe fn put(
  addr: usize,
  value: u32,
) {
  unsafe { ptr::write(addr as *mut u32, value) }
}

/// Packs a size and current-allocated bit into a header/footer word. The
/// prev-allocated bit (bit 1) is left clear; footers never carry it and
/// callers that need it set use [`pack_full`].
pub fn pack(
  size: u32,
  alloc: bool,
) -> u32 {
  debug_assert_eq!(size & 0x7, 0, "block size must be a multiple of DSIZE");
  size | (alloc as u32)
}

/// Packs a size, current-allocated bit and prev-allocated bit into a header
/// word.
pub fn pack_full(
  size: u32,
  alloc: bool,
  prev_alloc: bool,
) -> u32 {
  debug_assert_eq!(size & 0x7, 0, "block size must be a multiple of DSIZE");
  size | (alloc as u32) | ((prev_alloc as u32) << 1)
}

/// Extracts the size encoded in the word at `addr`.
///
/// # Safety
/// Same requirement as [`get`].
#[inline(always)]
pub unsafe fn get_size(
  addr: usize,
) -> u32 {
  unsafe { get(addr) & SIZE_MASK }
}

/// Extracts the current-allocated bit from the word at `addr`.
///
/// # Safety
/// Same requirement as [`get`].
#[inline(always)]
pub unsafe fn get_alloc(
  addr: usize,
) -> bool {
  unsafe { get(addr) & ALLOC_BIT != 0 }
}

/// Extracts the prev-allocated bit from the word at `addr`.
///
/// # Safety
/// Same requirement as [`get`].
#[inline(always)]
pub unsafe fn get_prev_alloc(
  addr: usize,
) -> bool {
  unsafe { get(addr) & PREV_ALLOC_BIT != 0 }
}

/// Writes a full header word, including the prev-allocated bit.
///
/// # Safety
/// Same requirement as [`get`]/[`put`].
pub unsafe fn write_header(
  addr: usize,
  size: u32,
  alloc: bool,
  prev_alloc: bool,
) {
  unsafe { put(addr, pack_full(size, alloc, prev_alloc)) }
}

/// Writes a header word, preserving whatever prev-allocated bit was already
/// there. Use this whenever a block's own size/alloc state changes without
/// its predecessor changing at the same time. See the design rationale in
/// the [`crate::block`] module docs.
///
/// # Safety
/// Same requirement as [`get`]/[`put`].
pub unsafe fn write_header_preserve_prev(
  addr: usize,
  size: u32,
  alloc: bool,
) {
  unsafe {
    let prev_alloc = get_prev_alloc(addr);
    write_header(addr, size, alloc, prev_alloc);
  }
}

/// Writes a free block's footer. Footers never carry a prev-allocated bit
/// of their own (nothing ever reads it); only size and alloc need to match
/// the header.
///
/// # Safety
/// `bp` must be the payload address of a block of size `size` with room for
/// a footer (i.e. a free block).
pub unsafe fn write_footer(
  bp: usize,
  size: u32,
  alloc: bool,
) {
  unsafe { put(ftrp(bp, size as usize), pack(size, alloc)) }
}

/// Toggles only the prev-allocated bit of the header at `hdr_addr`,
/// preserving its size and its own allocated bit.
///
/// # Safety
/// Same requirement as [`get`]/[`put`].
pub unsafe fn set_prev_alloc(
  hdr_addr: usize,
  value: bool,
) {
  unsafe {
    let word = get(hdr_addr) & !PREV_ALLOC_BIT;
    put(hdr_addr, word | if value { PREV_ALLOC_BIT } else { 0 });
  }
}

/// Address of `bp`'s header: one word before the payload.
#[inline(always)]
pub fn hdrp(
  bp: usize,
) -> usize {
  bp - WSIZE
}

/// Address of a `size`-byte block's footer: the last word of the block.
#[inline(always)]
pub fn ftrp(
  bp: usize,
  size: usize,
) -> usize {
  bp + size - DSIZE
}

/// Block pointer of the next physically adjacent block.
///
/// # Safety
/// `hdrp(bp)` must be a live header word.
#[inline(always)]
pub unsafe fn next_phys(
  bp: usize,
) -> usize {
  unsafe { bp + get_size(hdrp(bp)) as usize }
}

/// Block pointer of the previous physically adjacent block.
///
/// Valid only when the previous block is free (only then does it have a
/// footer for us to read its size from). Callers must gate this on
/// `get_prev_alloc(hdrp(bp)) == false`.
///
/// # Safety
/// The word at `bp - DSIZE` must be a live footer, i.e. the previous block
/// must be free.
#[inline(always)]
pub unsafe fn prev_phys(
  bp: usize,
) -> usize {
  unsafe {
    let prev_size = get_size(bp - DSIZE) as usize;
    bp - prev_size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pack_and_unpack_roundtrip() {
    let w = pack_full(256, true, false);
    assert_eq!(w & SIZE_MASK, 256);
    assert_eq!(w & ALLOC_BIT, 1);
    assert_eq!(w & PREV_ALLOC_BIT, 0);

    let w = pack_full(256, false, true);
    assert_eq!(w & PREV_ALLOC_BIT, PREV_ALLOC_BIT);
    assert_eq!(w & ALLOC_BIT, 0);
  }

  #[test]
  fn footer_never_carries_prev_alloc() {
    let w = pack(128, false);
    assert_eq!(w & PREV_ALLOC_BIT, 0);
  }

  #[test]
  fn set_prev_alloc_preserves_size_and_own_alloc_bit() {
    let mut word = pack_full(64, true, false);
    unsafe {
      let addr = &mut word as *mut u32 as usize;
      set_prev_alloc(addr, true);
      assert_eq!(get_size(addr), 64);
      assert!(get_alloc(addr));
      assert!(get_prev_alloc(addr));

      set_prev_alloc(addr, false);
      assert_eq!(get_size(addr), 64);
      assert!(get_alloc(addr));
      assert!(!get_prev_alloc(addr));
    }
  }
}
