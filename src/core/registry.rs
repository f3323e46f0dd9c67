//! Shared bookkeeping for scratch regions
//!
//! Every region attached to a registry draws its memory blocks from one
//! cache budget and its spill files from the same per-directory quotas.
//! The registry is shared as `Arc<TempSpaceRegistry>`; regions hold a clone
//! and return what they reserved when dropped.

use crate::core::config::TempSpaceConfig;
use crate::core::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Usage {
    /// Bytes currently held by memory blocks
    cache: u64,
    /// Bytes currently claimed in each configured directory
    dirs: Vec<u64>,
    /// Regions created so far (for log correlation)
    next_space_id: u64,
}

/// Reference-counted registry of cache and directory usage
#[derive(Debug)]
pub struct TempSpaceRegistry {
    config: TempSpaceConfig,
    usage: Mutex<Usage>,
}

impl TempSpaceRegistry {
    /// Create a registry after validating the config
    pub fn new(config: TempSpaceConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let dirs = vec![0; config.directories.len()];
        Ok(Arc::new(TempSpaceRegistry {
            config,
            usage: Mutex::new(Usage {
                dirs,
                ..Usage::default()
            }),
        }))
    }

    pub fn config(&self) -> &TempSpaceConfig {
        &self.config
    }

    /// Reserve `bytes` of the memory ceiling, all or nothing
    pub fn try_reserve_cache(&self, bytes: u64) -> bool {
        let mut usage = self.usage.lock();
        match usage.cache.checked_add(bytes) {
            Some(total) if total <= self.config.cache_limit => {
                usage.cache = total;
                true
            }
            _ => false,
        }
    }

    pub fn release_cache(&self, bytes: u64) {
        let mut usage = self.usage.lock();
        usage.cache = usage.cache.saturating_sub(bytes);
    }

    /// Reserve `bytes` of a directory's quota, all or nothing
    pub fn try_reserve_dir(&self, index: usize, bytes: u64) -> bool {
        let limit = match self.config.directories.get(index) {
            Some(dir) => dir.limit,
            None => return false,
        };
        let mut usage = self.usage.lock();
        let used = usage.dirs[index];
        match used.checked_add(bytes) {
            Some(total) if limit.map_or(true, |l| total <= l) => {
                usage.dirs[index] = total;
                true
            }
            _ => false,
        }
    }

    pub fn release_dir(&self, index: usize, bytes: u64) {
        let mut usage = self.usage.lock();
        if let Some(used) = usage.dirs.get_mut(index) {
            *used = used.saturating_sub(bytes);
        }
    }

    /// Bytes currently held in memory blocks by all regions
    pub fn cache_usage(&self) -> u64 {
        self.usage.lock().cache
    }

    /// Bytes currently claimed in a directory by all regions
    pub fn dir_usage(&self, index: usize) -> u64 {
        self.usage.lock().dirs.get(index).copied().unwrap_or(0)
    }

    pub(crate) fn next_space_id(&self) -> u64 {
        let mut usage = self.usage.lock();
        usage.next_space_id += 1;
        usage.next_space_id
    }
}
