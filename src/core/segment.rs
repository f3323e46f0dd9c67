//! Free-space segments
//!
//! A segment is one contiguous free range `[position, position + size)` of a
//! scratch region's logical address space.

use serde::{Deserialize, Serialize};

/// A contiguous free range of the logical address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    /// Starting logical offset
    pub position: u64,
    /// Length in bytes
    pub size: u64,
}

impl Segment {
    pub fn new(position: u64, size: u64) -> Self {
        Segment { position, size }
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.position + self.size
    }

    /// Check if this segment contains an offset
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.position && offset < self.end()
    }

    /// Check if `[offset, offset + size)` lies entirely inside this segment
    pub fn covers(&self, offset: u64, size: u64) -> bool {
        offset >= self.position
            && offset
                .checked_add(size)
                .map_or(false, |end| end <= self.end())
    }

    /// Check if this segment shares at least one byte with `[offset, offset + size)`
    pub fn overlaps(&self, offset: u64, size: u64) -> bool {
        size > 0 && self.size > 0 && offset < self.end() && self.position < offset + size
    }

    /// Check if this segment touches another end-to-start (can be coalesced)
    pub fn is_adjacent(&self, other: &Segment) -> bool {
        self.end() == other.position || other.end() == self.position
    }

    /// Coalesce two adjacent segments
    pub fn coalesce(&self, other: &Segment) -> Option<Segment> {
        if !self.is_adjacent(other) {
            return None;
        }

        let position = self.position.min(other.position);
        Some(Segment {
            position,
            size: self.size + other.size,
        })
    }
}

/// Stable handle of a segment inside the allocator's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub(crate) usize);

impl SegmentId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_contains() {
        let seg = Segment::new(10, 20);
        assert!(!seg.contains(9));
        assert!(seg.contains(10));
        assert!(seg.contains(29));
        assert!(!seg.contains(30));
    }

    #[test]
    fn test_segment_covers() {
        let seg = Segment::new(10, 20);
        assert!(seg.covers(10, 20));
        assert!(seg.covers(15, 5));
        assert!(seg.covers(30, 0));
        assert!(!seg.covers(25, 10));
        assert!(!seg.covers(5, 10));
        assert!(!seg.covers(u64::MAX, 2));
    }

    #[test]
    fn test_segment_overlaps() {
        let seg = Segment::new(10, 10);
        assert!(seg.overlaps(5, 6));
        assert!(seg.overlaps(19, 5));
        assert!(!seg.overlaps(20, 5));
        assert!(!seg.overlaps(0, 10));
        assert!(!seg.overlaps(12, 0));
    }

    #[test]
    fn test_segment_coalesce() {
        let a = Segment::new(10, 10);
        let b = Segment::new(20, 5);
        let c = Segment::new(40, 5);

        assert_eq!(a.coalesce(&b), Some(Segment::new(10, 15)));
        assert_eq!(b.coalesce(&a), Some(Segment::new(10, 15)));
        assert_eq!(a.coalesce(&c), None);
    }
}
