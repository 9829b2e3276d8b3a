//! Segregated size classes for the free-list index.
//!
//! Each list holds free blocks whose size falls in a disjoint range; a
//! block of size `s` goes in the smallest-indexed list whose bound is
//! `>= s`, and the last list is a catch-all for anything bigger than the
//! largest bound.

/// Number of free lists in the index.
pub const LIST_NUM: usize = 24;

/// Upper bound (in bytes) of each size class below the catch-all list.
/// `LIST_NUM - 1` entries; the final list has no explicit bound.
///
/// Index 16 (bound 40000) is immediately followed by index 17 (bound
/// 32768), a smaller bound coming *after* a larger one. This is
/// deliberately not sorted: the table is carried over bit-for-bit from the
/// allocator this crate continues, decision being parity over silently
/// "fixing" it. The practical effect, worked out in `list_of` below, is
/// that list 17 is structurally dead: any size that would want it already
/// satisfied list 16's wider bound first.
pub const SIZE_CLASS_BOUNDS: [usize; LIST_NUM - 1] = [
  16, 24, 48, 128, 256, 512, 1024, 2048, 4096, 9200, 12000, 16000, 20000, 24000, 28000, 32000,
  40000, 32768, 65536, 131072, 262144, 524288, 1048576,
];

/// Maps a block size to its free-list index by walking the bound table in
/// order and returning the first list whose bound is large enough,
/// falling back to the catch-all list if none match.
///
/// Written as a linear cascade rather than a binary search so that the
/// ordering anomaly in [`SIZE_CLASS_BOUNDS`] behaves exactly as documented
/// there, independent of how the table might later be re-sorted by an
/// editor expecting monotonicity.
pub fn list_of(
  size: usize,
) -> usize {
  for (i, &bound) in SIZE_CLASS_BOUNDS.iter().enumerate() {
    if size <= bound {
      return i;
    }
  }
  SIZE_CLASS_BOUNDS.len()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn small_sizes_map_to_early_lists() {
    assert_eq!(list_of(1), 0);
    assert_eq!(list_of(16), 0);
    assert_eq!(list_of(17), 1);
    assert_eq!(list_of(24), 1);
  }

  #[test]
  fn huge_sizes_fall_into_catch_all() {
    assert_eq!(list_of(1_048_577), LIST_NUM - 1);
    assert_eq!(list_of(usize::MAX), LIST_NUM - 1);
  }

  #[test]
  fn list_17_bound_is_unreachable_through_the_cascade() {
    // Any size that could only fit list 17 (bound 32768, i.e. > 32000)
    // is already captured by list 16's wider bound of 40000 first.
    for size in 32001..=32768 {
      assert_eq!(list_of(size), 16);
    }
  }

  #[test]
  fn every_index_is_within_range() {
    for size in (0..2_000_000).step_by(997) {
      assert!(list_of(size) < LIST_NUM);
    }
  }
}
