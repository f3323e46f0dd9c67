//! Scratch space engine
//!
//! A `ScratchSpace` exposes one contiguous, zero-based logical byte range
//! that grows on demand. New space is backed by heap buffers while the
//! registry's memory ceiling allows it, and by temp files after that.
//! On top of the raw range sits a best-fit allocator so callers can carve
//! out, release and reuse regions.
//!
//! A region is owned by one unit of work at a time; share it across threads
//! only behind an external lock.

use crate::core::allocator::{align_up, FreeSpaceAllocator};
use crate::core::block::BlockChain;
use crate::core::error::{Result, ScratchError};
use crate::core::registry::TempSpaceRegistry;
use crate::core::segment::Segment;
use crate::core::temp_file::TempFileManager;
use crate::core::validation::FilePrefix;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Construction options for a scratch region
#[derive(Debug, Clone)]
pub struct ScratchOptions {
    /// Temp-file name prefix; the registry's configured prefix when `None`
    pub prefix: Option<String>,

    /// Caller-supplied first block (not counted against the memory ceiling)
    pub initial_buffer: Option<Vec<u8>>,

    /// When false, the region never grows past the initial buffer
    pub growable: bool,
}

impl Default for ScratchOptions {
    fn default() -> Self {
        ScratchOptions {
            prefix: None,
            initial_buffer: None,
            growable: true,
        }
    }
}

/// One region handed out by [`ScratchSpace::allocate_batch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSegment {
    pub offset: u64,
    pub size: u64,
}

/// Result of [`ScratchSpace::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub ok: bool,
    pub total_free: u64,
    pub issues: Vec<String>,
}

/// Point-in-time statistics of a scratch region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchStats {
    pub logical_size: u64,
    pub physical_size: u64,
    pub memory_bytes: u64,
    pub file_bytes: u64,
    pub memory_blocks: usize,
    pub file_blocks: usize,
    pub temp_files: usize,
    pub free_bytes: u64,
    pub free_segments: usize,
    pub fragmentation: f64,
}

impl ScratchStats {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Growable logical byte range over memory and temp-file blocks
pub struct ScratchSpace {
    /// Registry-unique id for log correlation
    id: u64,

    registry: Arc<TempSpaceRegistry>,

    /// Physical blocks covering `[0, physical_size)`
    chain: BlockChain,

    /// Spill files backing the file blocks
    files: TempFileManager,

    /// Released ranges available for reuse
    free: FreeSpaceAllocator,

    /// Caller-visible size; never shrinks
    logical_size: u64,

    /// Bytes reserved from the registry's memory ceiling
    cache_usage: u64,

    growable: bool,
}

impl ScratchSpace {
    /// Create an empty, growable region
    pub fn new(registry: Arc<TempSpaceRegistry>) -> Result<Self> {
        Self::with_options(registry, ScratchOptions::default())
    }

    /// Create a region with explicit options
    pub fn with_options(registry: Arc<TempSpaceRegistry>, options: ScratchOptions) -> Result<Self> {
        let prefix = FilePrefix::new(
            options
                .prefix
                .unwrap_or_else(|| registry.config().file_prefix.clone()),
        )?;

        let mut chain = BlockChain::new();
        if let Some(buffer) = options.initial_buffer {
            chain.push_memory(buffer, true);
        }

        let id = registry.next_space_id();
        debug!(
            "Scratch space {} created (prefix '{}', initial {} bytes, growable {})",
            id,
            prefix,
            chain.size(),
            options.growable
        );

        Ok(ScratchSpace {
            id,
            files: TempFileManager::new(Arc::clone(&registry), prefix),
            registry,
            chain,
            free: FreeSpaceAllocator::new(),
            logical_size: 0,
            cache_usage: 0,
            growable: options.growable,
        })
    }

    /// Logical size in bytes
    pub fn size(&self) -> u64 {
        self.logical_size
    }

    /// Bytes covered by physical blocks (>= logical size)
    pub fn physical_size(&self) -> u64 {
        self.chain.size()
    }

    /// Bytes of the memory ceiling held by this region
    pub fn memory_usage(&self) -> u64 {
        self.cache_usage
    }

    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn temp_file_count(&self) -> usize {
        self.files.len()
    }

    /// Paths of the spill files currently in use
    pub fn temp_file_paths(&self) -> Vec<&Path> {
        self.files.files().iter().map(|f| f.path()).collect()
    }

    pub fn is_growable(&self) -> bool {
        self.growable
    }

    pub fn registry(&self) -> &Arc<TempSpaceRegistry> {
        &self.registry
    }

    /// Grow the logical size by `size` bytes
    ///
    /// Physical space is added in multiples of the configured block size.
    /// A memory block is used while the registry's ceiling has room for it;
    /// otherwise the growth spills to a temp file. On error nothing changes.
    pub fn extend(&mut self, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        let new_logical = self
            .logical_size
            .checked_add(size)
            .ok_or(ScratchError::InvalidRange {
                offset: self.logical_size,
                size,
            })?;

        if new_logical > self.chain.size() {
            if !self.growable {
                return Err(ScratchError::GrowthForbidden {
                    requested: size,
                    capacity: self.chain.size(),
                });
            }

            let deficit = new_logical - self.chain.size();
            let grow = align_up(deficit, self.registry.config().block_granularity()).ok_or(
                ScratchError::InvalidRange {
                    offset: self.logical_size,
                    size,
                },
            )?;

            if self.grow_in_memory(grow) {
                debug!(
                    "Scratch space {} grown in memory: {} -> {} physical bytes",
                    self.id,
                    self.chain.size() - grow,
                    self.chain.size()
                );
            } else {
                let extent = self.files.setup_file(grow)?;
                if self.chain.push_file(extent.file, extent.offset, grow) {
                    debug!(
                        "Scratch space {} extended file tail by {} bytes: {} physical bytes",
                        self.id,
                        grow,
                        self.chain.size()
                    );
                } else {
                    info!(
                        "Scratch space {} spilled {} bytes to temp file {} at {}: {} physical bytes",
                        self.id,
                        grow,
                        extent.file,
                        extent.offset,
                        self.chain.size()
                    );
                }
            }
        }

        self.logical_size = new_logical;
        Ok(())
    }

    /// Try to add a `grow`-byte memory block within the ceiling
    fn grow_in_memory(&mut self, grow: u64) -> bool {
        let Ok(len) = usize::try_from(grow) else {
            return false;
        };
        if !self.registry.try_reserve_cache(grow) {
            return false;
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            self.registry.release_cache(grow);
            return false;
        }
        data.resize(len, 0);

        self.chain.push_memory(data, false);
        self.cache_usage += grow;
        true
    }

    fn check_range(&self, offset: u64, length: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.logical_size => Ok(()),
            _ => Err(ScratchError::OutOfBounds {
                offset,
                length,
                size: self.logical_size,
            }),
        }
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_range(offset, buf.len() as u64)?;
        self.chain.read(offset, buf, &self.files)?;
        Ok(buf.len())
    }

    /// Copy `buf` into the region at `offset`; the range must already exist
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.check_range(offset, buf.len() as u64)?;
        self.chain.write(offset, buf, &self.files)?;
        Ok(buf.len())
    }

    /// Zero-copy view of `[offset, offset + size)` when a single memory block holds it
    pub fn in_memory(&self, offset: u64, size: u64) -> Option<&[u8]> {
        self.check_range(offset, size).ok()?;
        self.chain.in_memory(offset, size)
    }

    /// Mutable zero-copy view, same rules as [`in_memory`](Self::in_memory)
    pub fn in_memory_mut(&mut self, offset: u64, size: u64) -> Option<&mut [u8]> {
        self.check_range(offset, size).ok()?;
        self.chain.in_memory_mut(offset, size)
    }

    /// First offset in `[begin, end)` where `size` bytes are memory-resident
    pub fn find_memory(&self, begin: u64, end: u64, size: u64) -> Option<u64> {
        if size == 0 {
            return None;
        }
        self.chain
            .find_memory(begin, end.min(self.logical_size), size)
    }

    /// Reserve `size` bytes no other live allocation uses
    ///
    /// The smallest free segment that fits is reused; the region only grows
    /// when none does. A zero-size request returns the current logical size
    /// and changes nothing.
    pub fn allocate_space(&mut self, size: u64) -> Result<u64> {
        if size == 0 {
            return Ok(self.logical_size);
        }

        if let Some(offset) = self.free.allocate(size) {
            return Ok(offset);
        }

        self.extend(size)?;
        Ok(self.logical_size - size)
    }

    /// Return an allocated range to the free pool, merging with free neighbours
    pub fn release_space(&mut self, offset: u64, size: u64) -> Result<()> {
        if size == 0 {
            return Err(ScratchError::InvalidRange { offset, size });
        }
        self.check_range(offset, size)?;
        self.free.release(offset, size)
    }

    /// Allocate `count` regions sized within `[min_size, max_size]`
    ///
    /// The preferred size is the free space split evenly over `count`,
    /// clamped to the bounds. Free segments are used first, in position
    /// order, preferring memory-resident windows; leftover segments of at
    /// least `min_size` then fill remaining requests with smaller regions.
    /// Whatever is still missing is grown at the preferred size.
    pub fn allocate_batch(
        &mut self,
        count: usize,
        min_size: u64,
        max_size: u64,
    ) -> Result<Vec<BatchSegment>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if min_size == 0 || min_size > max_size {
            return Err(ScratchError::InvalidRange {
                offset: min_size,
                size: max_size,
            });
        }

        let wanted = u64::try_from(count).map_err(|_| ScratchError::InvalidRange {
            offset: min_size,
            size: u64::MAX,
        })?;
        let chunk = (self.free.free_bytes() / wanted).clamp(min_size, max_size);
        if chunk.checked_mul(wanted).is_none() {
            return Err(ScratchError::InvalidRange {
                offset: chunk,
                size: wanted,
            });
        }

        let mut out = Vec::new();

        let candidates: Vec<Segment> = self
            .free
            .free_segments()
            .filter(|seg| seg.size >= chunk)
            .collect();

        for seg in candidates {
            let mut begin = seg.position;
            while out.len() < count && begin + chunk <= seg.end() {
                let at = self
                    .chain
                    .find_memory(begin, seg.end(), chunk)
                    .unwrap_or(begin);
                self.free.take_range(at, chunk)?;
                out.push(BatchSegment {
                    offset: at,
                    size: chunk,
                });
                begin = at + chunk;
            }
        }

        // Segments too small for the preferred size still fit `min_size`
        if out.len() < count {
            let leftovers: Vec<Segment> = self
                .free
                .free_segments()
                .filter(|seg| seg.size >= min_size)
                .collect();

            for seg in leftovers {
                let mut begin = seg.position;
                while out.len() < count && seg.end() - begin >= min_size {
                    let size = (seg.end() - begin).min(max_size);
                    self.free.take_range(begin, size)?;
                    out.push(BatchSegment {
                        offset: begin,
                        size,
                    });
                    begin += size;
                }
            }
        }

        let reused = out.len();
        let missing = (count - reused) as u64;
        if missing > 0 {
            let start = self.logical_size;
            if let Err(e) = self.extend(chunk * missing) {
                for seg in &out {
                    self.free.release(seg.offset, seg.size)?;
                }
                return Err(e);
            }

            out.extend((0..missing).map(|i| BatchSegment {
                offset: start + i * chunk,
                size: chunk,
            }));
        }

        debug!(
            "Scratch space {} batch: {} regions, preferred {} bytes ({} reused)",
            self.id, count, chunk, reused
        );

        Ok(out)
    }

    /// Free segments in position order
    pub fn free_segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.free.free_segments()
    }

    /// Total bytes in the free pool
    pub fn free_space(&self) -> u64 {
        self.free.free_bytes()
    }

    /// Full consistency check of the free pool and block chain
    pub fn validate(&self) -> ValidationReport {
        let mut issues = self.free.check_consistency(self.logical_size);

        let mut expected_start = 0;
        for block in self.chain.blocks() {
            if block.start() != expected_start {
                issues.push(format!(
                    "block at {} follows a block ending at {}",
                    block.start(),
                    expected_start
                ));
            }
            if block.size() == 0 {
                issues.push(format!("empty block at {}", block.start()));
            }
            expected_start = block.end();
        }
        if expected_start != self.chain.size() {
            issues.push(format!(
                "blocks cover {} bytes, chain reports {}",
                expected_start,
                self.chain.size()
            ));
        }
        if self.chain.size() < self.logical_size {
            issues.push(format!(
                "logical size {} exceeds physical size {}",
                self.logical_size,
                self.chain.size()
            ));
        }
        if self.chain.memory_bytes(false) != self.cache_usage {
            issues.push(format!(
                "memory blocks hold {} bytes, {} reserved",
                self.chain.memory_bytes(false),
                self.cache_usage
            ));
        }
        if self.chain.file_bytes() != self.files.total_size() {
            issues.push(format!(
                "file blocks hold {} bytes, temp files {}",
                self.chain.file_bytes(),
                self.files.total_size()
            ));
        }

        ValidationReport {
            ok: issues.is_empty(),
            total_free: self.free.free_bytes(),
            issues,
        }
    }

    pub fn stats(&self) -> ScratchStats {
        let blocks = self.chain.blocks();
        let memory_blocks = blocks.iter().filter(|b| b.is_memory()).count();
        ScratchStats {
            logical_size: self.logical_size,
            physical_size: self.chain.size(),
            memory_bytes: self.chain.memory_bytes(true),
            file_bytes: self.chain.file_bytes(),
            memory_blocks,
            file_blocks: blocks.len() - memory_blocks,
            temp_files: self.files.len(),
            free_bytes: self.free.free_bytes(),
            free_segments: self.free.segment_count(),
            fragmentation: self.free.fragmentation_score(),
        }
    }

    /// Destroy the region, handing back the caller-supplied initial buffer
    pub fn into_initial_buffer(mut self) -> Option<Vec<u8>> {
        self.chain.take_initial()
    }
}

impl std::fmt::Debug for ScratchSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchSpace")
            .field("id", &self.id)
            .field("logical_size", &self.logical_size)
            .field("physical_size", &self.chain.size())
            .field("blocks", &self.chain.len())
            .field("temp_files", &self.files.len())
            .field("free_bytes", &self.free.free_bytes())
            .finish()
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.registry.release_cache(self.cache_usage);
        debug!(
            "Scratch space {} released ({} memory bytes, {} temp files)",
            self.id,
            self.cache_usage,
            self.files.len()
        );
    }
}
