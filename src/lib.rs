//! # Scratch Space - Spill-to-Disk Temporary Storage
//!
//! `scratch-space` gives each unit of work a private, growable byte range for
//! intermediate results (sort runs, materialized rows, staged batches):
//!
//! - **Memory first**: new space comes from the heap while a process-wide
//!   ceiling allows it
//! - **Spill to disk**: past the ceiling, growth lands in temp files spread
//!   over configured directories with per-directory quotas
//! - **Free-space reuse**: best-fit allocation with coalescing on release
//! - **Automatic cleanup**: memory and temp files are returned on drop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scratch_space::{Result, ScratchBuilder};
//!
//! # fn main() -> Result<()> {
//! let mut space = ScratchBuilder::new()
//!     .directory("/var/tmp")
//!     .cache_limit(8 * 1024 * 1024)
//!     .build()?;
//!
//! let offset = space.allocate_space(4096)?;
//! space.write(offset, b"intermediate rows")?;
//!
//! let mut buf = [0u8; 17];
//! space.read(offset, &mut buf)?;
//! space.release_space(offset, 4096)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Shared Registry
//!
//! Regions created from the same [`TempSpaceRegistry`] share its memory
//! ceiling and directory quotas:
//!
//! ```rust,no_run
//! use scratch_space::{Result, ScratchSpace, TempSpaceConfig, TempSpaceRegistry};
//!
//! # fn main() -> Result<()> {
//! let config = TempSpaceConfig::load("scratch.toml")?.with_env_overrides()?;
//! let registry = TempSpaceRegistry::new(config)?;
//!
//! let sort_run = ScratchSpace::new(registry.clone())?;
//! let hash_table = ScratchSpace::new(registry)?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    allocator::FreeSpaceAllocator,
    batch_cache::{BatchCache, BlobRef},
    config::{TempDirectory, TempSpaceConfig},
    error::{Result, ScratchError},
    record_store::RecordStore,
    registry::TempSpaceRegistry,
    scratch::{BatchSegment, ScratchOptions, ScratchSpace, ScratchStats, ValidationReport},
    segment::Segment,
    validation::FilePrefix,
};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for a single scratch region
///
/// Without [`registry`](ScratchBuilder::registry), the builder creates a
/// private registry from the collected settings.
///
/// # Example
///
/// ```rust,no_run
/// use scratch_space::{Result, ScratchBuilder};
///
/// # fn main() -> Result<()> {
/// let space = ScratchBuilder::new()
///     .directory_with_limit("/fast-ssd/tmp", 1 << 30)
///     .directory("/var/tmp")
///     .prefix("sort_")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ScratchBuilder {
    registry: Option<Arc<TempSpaceRegistry>>,
    directories: Vec<TempDirectory>,
    cache_limit: Option<u64>,
    min_block_size: Option<u64>,
    options: ScratchOptions,
}

impl ScratchBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        ScratchBuilder {
            registry: None,
            directories: Vec::new(),
            cache_limit: None,
            min_block_size: None,
            options: ScratchOptions::default(),
        }
    }

    /// Attach to an existing registry (directory and limit settings are ignored)
    pub fn registry(mut self, registry: Arc<TempSpaceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a spill directory without a quota
    pub fn directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.directories.push(TempDirectory::new(path));
        self
    }

    /// Add a spill directory with a byte quota
    pub fn directory_with_limit<P: Into<PathBuf>>(mut self, path: P, limit: u64) -> Self {
        self.directories.push(TempDirectory::with_limit(path, limit));
        self
    }

    /// Set the memory ceiling
    pub fn cache_limit(mut self, limit: u64) -> Self {
        self.cache_limit = Some(limit);
        self
    }

    /// Set the physical growth granularity
    pub fn min_block_size(mut self, size: u64) -> Self {
        self.min_block_size = Some(size);
        self
    }

    /// Set the temp-file name prefix
    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.options.prefix = Some(prefix.into());
        self
    }

    /// Use a caller-owned buffer as the first block
    pub fn initial_buffer(mut self, buffer: Vec<u8>) -> Self {
        self.options.initial_buffer = Some(buffer);
        self
    }

    /// Never grow past the initial buffer
    pub fn fixed_capacity(mut self) -> Self {
        self.options.growable = false;
        self
    }

    /// Build the scratch region
    pub fn build(self) -> Result<ScratchSpace> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let mut config = TempSpaceConfig::default();
                if !self.directories.is_empty() {
                    config.directories = self.directories;
                }
                if let Some(limit) = self.cache_limit {
                    config = config.cache_limit(limit);
                }
                if let Some(size) = self.min_block_size {
                    config = config.min_block_size(size);
                }

                info!(
                    "Building scratch registry: {} directories, cache limit {} bytes",
                    config.directories.len(),
                    config.cache_limit
                );
                TempSpaceRegistry::new(config)?
            }
        };

        if !self.options.growable {
            debug!("Scratch region limited to its initial buffer");
        }

        ScratchSpace::with_options(registry, self.options)
    }
}

impl Default for ScratchBuilder {
    fn default() -> Self {
        Self::new()
    }
}
