//! Physical block chain
//!
//! A scratch region's logical address space is partitioned into blocks,
//! ordered by start offset with no gaps. Each block is backed either by a
//! heap buffer or by a range of a temp file, fixed when the block is created.
//! The chain only grows.

use crate::core::error::{Result, ScratchError};
use crate::core::temp_file::TempFileManager;

/// Physical storage behind a block
#[derive(Debug)]
pub enum Backing {
    /// Heap buffer; `initial` marks the caller-supplied first buffer
    Memory { data: Vec<u8>, initial: bool },
    /// Range `[offset, offset + size)` of temp file `file`
    File { file: usize, offset: u64 },
}

/// One contiguous piece of the logical address space
#[derive(Debug)]
pub struct Block {
    start: u64,
    size: u64,
    backing: Backing,
}

impl Block {
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.backing, Backing::Memory { .. })
    }

    /// Copy out up to `buf.len()` bytes from block-relative `local`
    fn read(&self, local: u64, buf: &mut [u8], files: &TempFileManager) -> Result<usize> {
        let n = (self.size - local).min(buf.len() as u64) as usize;
        match &self.backing {
            Backing::Memory { data, .. } => {
                let from = local as usize;
                buf[..n].copy_from_slice(&data[from..from + n]);
            }
            Backing::File { file, offset } => {
                let file = files
                    .file(*file)
                    .ok_or_else(|| ScratchError::Consistency(format!("missing temp file {}", file)))?;
                file.read_at(offset + local, &mut buf[..n])?;
            }
        }
        Ok(n)
    }

    /// Copy in up to `buf.len()` bytes at block-relative `local`
    fn write(&mut self, local: u64, buf: &[u8], files: &TempFileManager) -> Result<usize> {
        let n = (self.size - local).min(buf.len() as u64) as usize;
        match &mut self.backing {
            Backing::Memory { data, .. } => {
                let from = local as usize;
                data[from..from + n].copy_from_slice(&buf[..n]);
            }
            Backing::File { file, offset } => {
                let file = files
                    .file(*file)
                    .ok_or_else(|| ScratchError::Consistency(format!("missing temp file {}", file)))?;
                file.write_at(*offset + local, &buf[..n])?;
            }
        }
        Ok(n)
    }

    /// Direct view of `[local, local + size)` if the block is in memory and covers it
    fn in_memory(&self, local: u64, size: u64) -> Option<&[u8]> {
        match &self.backing {
            Backing::Memory { data, .. } if local.checked_add(size)? <= self.size => {
                Some(&data[local as usize..(local + size) as usize])
            }
            _ => None,
        }
    }

    fn in_memory_mut(&mut self, local: u64, size: u64) -> Option<&mut [u8]> {
        let block_size = self.size;
        match &mut self.backing {
            Backing::Memory { data, .. } if local.checked_add(size)? <= block_size => {
                Some(&mut data[local as usize..(local + size) as usize])
            }
            _ => None,
        }
    }
}

/// Ordered, gap-free chain of blocks
#[derive(Debug, Default)]
pub struct BlockChain {
    blocks: Vec<Block>,
    /// Sum of block sizes
    size: u64,
}

impl BlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a memory block wrapping `data`
    pub fn push_memory(&mut self, data: Vec<u8>, initial: bool) {
        let size = data.len() as u64;
        if size == 0 {
            return;
        }
        self.blocks.push(Block {
            start: self.size,
            size,
            backing: Backing::Memory { data, initial },
        });
        self.size += size;
    }

    /// Append `size` bytes backed by `file` at `offset`
    ///
    /// When the tail block already ends at `offset` in the same file, the
    /// tail is lengthened instead of adding a block. Returns `true` in
    /// that case.
    pub fn push_file(&mut self, file: usize, offset: u64, size: u64) -> bool {
        if let Some(tail) = self.blocks.last_mut() {
            if let Backing::File {
                file: tail_file,
                offset: tail_offset,
            } = tail.backing
            {
                if tail_file == file && tail_offset + tail.size == offset {
                    tail.size += size;
                    self.size += size;
                    return true;
                }
            }
        }

        self.blocks.push(Block {
            start: self.size,
            size,
            backing: Backing::File { file, offset },
        });
        self.size += size;
        false
    }

    /// Index of the block containing `offset`
    pub fn find(&self, offset: u64) -> Option<usize> {
        let idx = self.blocks.partition_point(|b| b.end() <= offset);
        (idx < self.blocks.len()).then_some(idx)
    }

    /// Fill `buf` from `offset`, spanning blocks as needed
    pub fn read(&self, offset: u64, buf: &mut [u8], files: &TempFileManager) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let mut idx = self.find(offset).ok_or(ScratchError::OutOfBounds {
            offset,
            length: buf.len() as u64,
            size: self.size,
        })?;
        let mut local = offset - self.blocks[idx].start;
        let mut done = 0;

        while done < buf.len() {
            let block = self.blocks.get(idx).ok_or(ScratchError::OutOfBounds {
                offset,
                length: buf.len() as u64,
                size: self.size,
            })?;
            done += block.read(local, &mut buf[done..], files)?;
            idx += 1;
            local = 0;
        }

        Ok(())
    }

    /// Store `buf` at `offset`, spanning blocks as needed
    pub fn write(&mut self, offset: u64, buf: &[u8], files: &TempFileManager) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let size = self.size;
        let mut idx = self.find(offset).ok_or(ScratchError::OutOfBounds {
            offset,
            length: buf.len() as u64,
            size,
        })?;
        let mut local = offset - self.blocks[idx].start;
        let mut done = 0;

        while done < buf.len() {
            let block = self.blocks.get_mut(idx).ok_or(ScratchError::OutOfBounds {
                offset,
                length: buf.len() as u64,
                size,
            })?;
            done += block.write(local, &buf[done..], files)?;
            idx += 1;
            local = 0;
        }

        Ok(())
    }

    /// Direct view of `[offset, offset + size)` if one memory block holds all of it
    pub fn in_memory(&self, offset: u64, size: u64) -> Option<&[u8]> {
        let block = &self.blocks[self.find(offset)?];
        block.in_memory(offset - block.start, size)
    }

    pub fn in_memory_mut(&mut self, offset: u64, size: u64) -> Option<&mut [u8]> {
        let idx = self.find(offset)?;
        let block = &mut self.blocks[idx];
        let local = offset - block.start;
        block.in_memory_mut(local, size)
    }

    /// First offset `o >= begin` with `[o, o + size)` inside `[begin, end)`
    /// and inside a single memory block
    pub fn find_memory(&self, begin: u64, end: u64, size: u64) -> Option<u64> {
        let mut idx = self.find(begin)?;
        let mut at = begin;

        while at.checked_add(size)? <= end {
            let block = self.blocks.get(idx)?;
            if block.in_memory(at - block.start, size).is_some() {
                return Some(at);
            }
            at = block.end();
            idx += 1;
        }

        None
    }

    /// Take back the initial buffer, if the first block still wraps one
    pub fn take_initial(&mut self) -> Option<Vec<u8>> {
        match self.blocks.first_mut() {
            Some(Block {
                backing: Backing::Memory { data, initial: true },
                ..
            }) => Some(std::mem::take(data)),
            _ => None,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Physical size (sum of block sizes)
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes held in memory blocks, optionally excluding the initial buffer
    pub fn memory_bytes(&self, include_initial: bool) -> u64 {
        self.blocks
            .iter()
            .filter(|b| match b.backing {
                Backing::Memory { initial, .. } => include_initial || !initial,
                Backing::File { .. } => false,
            })
            .map(Block::size)
            .sum()
    }

    /// Bytes held in file blocks
    pub fn file_bytes(&self) -> u64 {
        self.blocks
            .iter()
            .filter(|b| !b.is_memory())
            .map(Block::size)
            .sum()
    }
}
