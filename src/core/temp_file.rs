//! Temporary spill files
//!
//! A scratch region spills to at most one file per candidate directory.
//! Files are created with a random name under the region's prefix and are
//! deleted when the owning region is dropped.

use crate::core::error::{Result, ScratchError};
use crate::core::registry::TempSpaceRegistry;
use crate::core::validation::FilePrefix;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

/// One OS temporary file owned by a scratch region
#[derive(Debug)]
pub struct TempFile {
    file: NamedTempFile,
    /// Index of the configured directory hosting this file
    directory: usize,
    /// Bytes claimed so far
    size: u64,
}

impl TempFile {
    /// Create an empty temp file in `dir`
    pub fn create(dir: &Path, directory: usize, prefix: &FilePrefix) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(prefix.as_str())
            .tempfile_in(dir)
            .map_err(|e| ScratchError::io("open", dir, e))?;

        info!("Created temp file {:?}", file.path());

        Ok(TempFile {
            file,
            directory,
            size: 0,
        })
    }

    /// Grow the file by `delta` bytes, returning the offset of the new range
    pub fn extend(&mut self, delta: u64) -> Result<u64> {
        let offset = self.size;
        let new_size = offset
            .checked_add(delta)
            .ok_or(ScratchError::InvalidRange {
                offset,
                size: delta,
            })?;

        self.file
            .as_file()
            .set_len(new_size)
            .map_err(|e| ScratchError::io("extend", self.file.path(), e))?;

        self.size = new_size;
        Ok(offset)
    }

    /// Read exactly `buf.len()` bytes at `offset`
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.as_file();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| ScratchError::io("seek", self.file.path(), e))?;
        file.read_exact(buf)
            .map_err(|e| ScratchError::io("read", self.file.path(), e))
    }

    /// Write all of `buf` at `offset`
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.as_file();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| ScratchError::io("seek", self.file.path(), e))?;
        file.write_all(buf)
            .map_err(|e| ScratchError::io("write", self.file.path(), e))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn directory(&self) -> usize {
        self.directory
    }
}

/// Where a spill landed: which file, and at which offset inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileExtent {
    pub file: usize,
    pub offset: u64,
}

/// Creates and tracks the spill files of one scratch region
#[derive(Debug)]
pub struct TempFileManager {
    registry: Arc<TempSpaceRegistry>,
    prefix: FilePrefix,
    files: Vec<TempFile>,
}

impl TempFileManager {
    pub fn new(registry: Arc<TempSpaceRegistry>, prefix: FilePrefix) -> Self {
        TempFileManager {
            registry,
            prefix,
            files: Vec::new(),
        }
    }

    /// Claim `size` contiguous bytes in some temp file
    ///
    /// Candidate directories are tried in configured order. In each, the
    /// file this region already has there is grown, or a new one is
    /// created. A full quota or any I/O error moves on to the next
    /// directory; when none is left the region is out of temp space.
    pub fn setup_file(&mut self, size: u64) -> Result<FileExtent> {
        let registry = Arc::clone(&self.registry);
        let mut failures = Vec::new();

        for (index, dir) in registry.config().directories.iter().enumerate() {
            if !registry.try_reserve_dir(index, size) {
                let reason = format!(
                    "{:?}: quota of {} bytes exhausted",
                    dir.path,
                    dir.limit.unwrap_or(u64::MAX)
                );
                warn!("Temp directory unavailable, trying next: {}", reason);
                failures.push(reason);
                continue;
            }

            match self.grow_in(index, &dir.path, size) {
                Ok(extent) => return Ok(extent),
                Err(e) => {
                    registry.release_dir(index, size);
                    warn!("Temp directory unavailable, trying next: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        error!(
            "Out of temp space: {} bytes requested, {} directories tried",
            size,
            failures.len()
        );
        Err(ScratchError::OutOfTempSpace { size, failures })
    }

    fn grow_in(&mut self, index: usize, dir: &Path, size: u64) -> Result<FileExtent> {
        if let Some(pos) = self.files.iter().position(|f| f.directory == index) {
            let offset = self.files[pos].extend(size)?;
            return Ok(FileExtent { file: pos, offset });
        }

        let mut file = TempFile::create(dir, index, &self.prefix)?;
        let offset = file.extend(size)?;
        self.files.push(file);
        Ok(FileExtent {
            file: self.files.len() - 1,
            offset,
        })
    }

    pub fn file(&self, index: usize) -> Option<&TempFile> {
        self.files.get(index)
    }

    pub fn files(&self) -> &[TempFile] {
        &self.files
    }

    /// Bytes claimed across all files
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(TempFile::size).sum()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        for file in &self.files {
            self.registry.release_dir(file.directory, file.size);
        }
    }
}
