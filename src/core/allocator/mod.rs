//! Free-space management for scratch regions
//!
//! Released ranges are kept as [`Segment`](crate::core::segment::Segment)s in
//! a [`FreeSpaceAllocator`]: one arena of segments, two indexes over it
//! (by position for coalescing, by size for best-fit).

pub mod free_space;

pub use free_space::FreeSpaceAllocator;

/// Round `value` up to a multiple of `granularity` (0 and 1 mean exact)
pub fn align_up(value: u64, granularity: u64) -> Option<u64> {
    if granularity <= 1 {
        return Some(value);
    }
    let rem = value % granularity;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(granularity - rem)
    }
}
