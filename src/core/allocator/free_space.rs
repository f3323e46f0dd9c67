//! Best-fit free-space allocator with coalescing
//!
//! Segments live in an arena and are addressed by [`SegmentId`]. Two views
//! index the same arena:
//! - `by_position`: start offset -> segment, sorted, used to find neighbours
//!   when a range is released
//! - `by_size`: size -> stack of segments of that size, used to find the
//!   smallest free segment that fits a request
//!
//! Every free segment appears exactly once in each view, and no two free
//! segments touch (they would have been coalesced).

use crate::core::error::{Result, ScratchError};
use crate::core::segment::{Segment, SegmentId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct FreeSpaceAllocator {
    /// Segment storage; `None` marks a vacant slot
    arena: Vec<Option<Segment>>,

    /// Vacant arena slots available for reuse
    vacant: Vec<usize>,

    /// Free segments indexed by start position
    by_position: BTreeMap<u64, SegmentId>,

    /// Free segments indexed by size (stack per size)
    by_size: BTreeMap<u64, Vec<SegmentId>>,

    /// Sum of all free segment sizes
    free_bytes: u64,
}

impl FreeSpaceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `size` bytes from free space
    ///
    /// Best fit: the smallest segment with `segment.size >= size`. Among
    /// segments of equal size the most recently freed one wins. The head of
    /// the segment is handed out; the tail stays free. Returns `None` when
    /// nothing fits (the caller grows the region instead).
    pub fn allocate(&mut self, size: u64) -> Option<u64> {
        if size == 0 {
            return None;
        }

        let id = {
            let (_, stack) = self.by_size.range(size..).next()?;
            *stack.last()?
        };

        let segment = self.remove(id);
        if segment.size > size {
            self.insert(Segment::new(segment.position + size, segment.size - size));
        }

        tracing::debug!(
            "Best-fit allocation of {} bytes at {} (segment of {})",
            size,
            segment.position,
            segment.size
        );

        Some(segment.position)
    }

    /// Return `[offset, offset + size)` to free space
    ///
    /// Coalesces with the free segments immediately before and after, so
    /// the result never leaves two touching free segments. Fails if the
    /// range is empty, overflows, or overlaps space that is already free.
    pub fn release(&mut self, offset: u64, size: u64) -> Result<()> {
        if size == 0 || offset.checked_add(size).is_none() {
            return Err(ScratchError::InvalidRange { offset, size });
        }

        let prev = self.neighbour_before(offset);
        let next = self.neighbour_from(offset);

        if prev.map_or(false, |(_, seg)| seg.overlaps(offset, size))
            || next.map_or(false, |(_, seg)| seg.overlaps(offset, size))
        {
            return Err(ScratchError::InvalidRange { offset, size });
        }

        let mut merged = Segment::new(offset, size);

        if let Some((id, seg)) = prev {
            if let Some(joined) = seg.coalesce(&merged) {
                self.remove(id);
                merged = joined;
            }
        }

        if let Some((id, seg)) = next {
            if let Some(joined) = merged.coalesce(&seg) {
                self.remove(id);
                merged = joined;
            }
        }

        self.insert(merged);
        Ok(())
    }

    /// Remove an arbitrary range from free space
    ///
    /// `[offset, offset + size)` must lie inside a single free segment; the
    /// parts of that segment before and after the range stay free.
    pub fn take_range(&mut self, offset: u64, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        let (id, segment) = self
            .segment_at_or_before(offset)
            .filter(|(_, seg)| seg.covers(offset, size))
            .ok_or(ScratchError::InvalidRange { offset, size })?;

        self.remove(id);

        if offset > segment.position {
            self.insert(Segment::new(segment.position, offset - segment.position));
        }
        let end = offset + size;
        if end < segment.end() {
            self.insert(Segment::new(end, segment.end() - end));
        }

        Ok(())
    }

    /// Free segments in position order
    pub fn free_segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.by_position.values().filter_map(|id| self.get(*id))
    }

    /// Number of free segments (fragmentation indicator)
    pub fn segment_count(&self) -> usize {
        self.by_position.len()
    }

    /// Total free bytes
    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// Size of the largest free segment
    pub fn largest_free(&self) -> u64 {
        self.by_size.keys().next_back().copied().unwrap_or(0)
    }

    /// 0.0 when all free space is one segment, approaching 1.0 as it splinters
    pub fn fragmentation_score(&self) -> f64 {
        if self.free_bytes == 0 {
            return 0.0;
        }

        let count = self.by_position.len();
        if count == 0 {
            return 0.0;
        }

        1.0 - (self.largest_free() as f64 / self.free_bytes as f64)
    }

    /// Cross-check both indexes and the arena
    ///
    /// Returns one message per violated invariant; empty means consistent.
    /// Segments must be non-empty, sorted, disjoint, non-touching and end
    /// at or before `limit`.
    pub fn check_consistency(&self, limit: u64) -> Vec<String> {
        let mut issues = Vec::new();
        let mut total = 0u64;
        let mut last: Option<Segment> = None;

        for (&position, &id) in &self.by_position {
            let Some(seg) = self.get(id) else {
                issues.push(format!("position index points at vacant slot {}", id.index()));
                continue;
            };

            if seg.position != position {
                issues.push(format!(
                    "segment {:?} indexed under position {}",
                    seg, position
                ));
            }
            if seg.size == 0 {
                issues.push(format!("empty free segment at {}", seg.position));
            }
            if seg.end() > limit {
                issues.push(format!(
                    "free segment {:?} extends past logical size {}",
                    seg, limit
                ));
            }
            if let Some(prev) = last {
                if prev.end() > seg.position {
                    issues.push(format!("free segments {:?} and {:?} overlap", prev, seg));
                } else if prev.end() == seg.position {
                    issues.push(format!(
                        "free segments {:?} and {:?} were not coalesced",
                        prev, seg
                    ));
                }
            }
            match self.by_size.get(&seg.size) {
                Some(stack) if stack.contains(&id) => {}
                _ => issues.push(format!("segment {:?} missing from size index", seg)),
            }

            total += seg.size;
            last = Some(seg);
        }

        let sized: usize = self.by_size.values().map(Vec::len).sum();
        if sized != self.by_position.len() {
            issues.push(format!(
                "size index holds {} segments, position index {}",
                sized,
                self.by_position.len()
            ));
        }
        for (&size, stack) in &self.by_size {
            if stack.is_empty() {
                issues.push(format!("empty size bucket {}", size));
            }
            for id in stack {
                if self.get(*id).map(|seg| seg.size) != Some(size) {
                    issues.push(format!("size bucket {} holds stale segment", size));
                }
            }
        }

        if total != self.free_bytes {
            issues.push(format!(
                "free byte counter {} disagrees with segment sum {}",
                self.free_bytes, total
            ));
        }

        issues
    }

    fn get(&self, id: SegmentId) -> Option<Segment> {
        self.arena.get(id.0).copied().flatten()
    }

    /// Last free segment starting strictly before `offset`
    fn neighbour_before(&self, offset: u64) -> Option<(SegmentId, Segment)> {
        self.by_position
            .range(..offset)
            .next_back()
            .and_then(|(_, &id)| self.get(id).map(|seg| (id, seg)))
    }

    /// First free segment starting at or after `offset`
    fn neighbour_from(&self, offset: u64) -> Option<(SegmentId, Segment)> {
        self.by_position
            .range(offset..)
            .next()
            .and_then(|(_, &id)| self.get(id).map(|seg| (id, seg)))
    }

    /// Last free segment starting at or before `offset`
    fn segment_at_or_before(&self, offset: u64) -> Option<(SegmentId, Segment)> {
        self.by_position
            .range(..=offset)
            .next_back()
            .and_then(|(_, &id)| self.get(id).map(|seg| (id, seg)))
    }

    fn insert(&mut self, segment: Segment) -> SegmentId {
        let id = match self.vacant.pop() {
            Some(slot) => {
                self.arena[slot] = Some(segment);
                SegmentId(slot)
            }
            None => {
                self.arena.push(Some(segment));
                SegmentId(self.arena.len() - 1)
            }
        };

        self.by_position.insert(segment.position, id);
        self.by_size.entry(segment.size).or_default().push(id);
        self.free_bytes += segment.size;
        id
    }

    fn remove(&mut self, id: SegmentId) -> Segment {
        let segment = match self.arena.get_mut(id.0).and_then(Option::take) {
            Some(seg) => seg,
            None => return Segment::new(0, 0),
        };
        self.vacant.push(id.0);

        self.by_position.remove(&segment.position);
        if let Some(stack) = self.by_size.get_mut(&segment.size) {
            if let Some(pos) = stack.iter().rposition(|&other| other == id) {
                stack.remove(pos);
            }
            if stack.is_empty() {
                self.by_size.remove(&segment.size);
            }
        }
        self.free_bytes -= segment.size;
        segment
    }
}
