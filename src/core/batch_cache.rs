//! Staging cache for batched DML
//!
//! Interleaves fixed-size message records and growable blob payloads in one
//! scratch region. Every stored item occupies a multiple of the configured
//! alignment, so all offsets handed out are aligned as well. While the
//! region is memory-resident, message slots can be filled in place.
//!
//! Blob layout: an 8-byte little-endian payload length, then the payload.

use crate::core::allocator::align_up;
use crate::core::error::{Result, ScratchError};
use crate::core::scratch::ScratchSpace;
use std::collections::BTreeMap;
use tracing::debug;

const BLOB_HEADER: u64 = 8;

/// Location of a staged blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRef {
    /// Start of the blob header
    pub offset: u64,
    /// Bytes reserved for header and payload
    pub capacity: u64,
    /// Payload bytes stored
    pub length: u64,
}

#[derive(Debug)]
pub struct BatchCache {
    space: ScratchSpace,
    alignment: u64,
    /// Live message slots: offset -> reserved size
    messages: BTreeMap<u64, u64>,
    /// Live blobs: offset -> reserved size
    blobs: BTreeMap<u64, u64>,
}

impl BatchCache {
    /// `alignment` must be a power of two
    pub fn new(space: ScratchSpace, alignment: u64) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(ScratchError::InvalidConfig(format!(
                "alignment {} is not a power of two",
                alignment
            )));
        }
        if space.size() % alignment != 0 {
            return Err(ScratchError::InvalidConfig(format!(
                "region size {} is not aligned to {}",
                space.size(),
                alignment
            )));
        }

        Ok(BatchCache {
            space,
            alignment,
            messages: BTreeMap::new(),
            blobs: BTreeMap::new(),
        })
    }

    fn reserve(&self, bytes: u64) -> Result<u64> {
        align_up(bytes.max(1), self.alignment).ok_or(ScratchError::InvalidRange {
            offset: 0,
            size: bytes,
        })
    }

    /// Allocate `size` bytes and run `fill` on them; the region is released
    /// again if `fill` fails
    fn allocate_filled<F>(&mut self, size: u64, fill: F) -> Result<u64>
    where
        F: FnOnce(&mut ScratchSpace, u64) -> Result<()>,
    {
        let offset = self.space.allocate_space(size)?;
        if let Err(e) = fill(&mut self.space, offset) {
            self.space.release_space(offset, size)?;
            return Err(e);
        }
        Ok(offset)
    }

    /// Stage one message, returning its offset
    pub fn put_message(&mut self, message: &[u8]) -> Result<u64> {
        let size = self.reserve(message.len() as u64)?;
        let offset = self.allocate_filled(size, |space, offset| {
            match space.in_memory_mut(offset, message.len() as u64) {
                Some(slot) => slot.copy_from_slice(message),
                None => {
                    space.write(offset, message)?;
                }
            }
            Ok(())
        })?;

        self.messages.insert(offset, size);
        Ok(offset)
    }

    /// Read back `length` bytes of the message at `offset`
    pub fn message(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.check_message(offset, length)?;
        let mut buf = vec![0u8; length as usize];
        self.space.read(offset, &mut buf)?;
        Ok(buf)
    }

    /// In-place access to a message while its slot is memory-resident
    pub fn message_slot_mut(&mut self, offset: u64, length: u64) -> Option<&mut [u8]> {
        self.check_message(offset, length).ok()?;
        self.space.in_memory_mut(offset, length)
    }

    fn check_message(&self, offset: u64, length: u64) -> Result<()> {
        match self.messages.get(&offset) {
            Some(&size) if length <= size => Ok(()),
            _ => Err(ScratchError::InvalidRange {
                offset,
                size: length,
            }),
        }
    }

    pub fn release_message(&mut self, offset: u64) -> Result<()> {
        let size = self
            .messages
            .remove(&offset)
            .ok_or(ScratchError::InvalidRange { offset, size: 0 })?;
        self.space.release_space(offset, size)
    }

    /// Stage a blob
    pub fn put_blob(&mut self, data: &[u8]) -> Result<BlobRef> {
        let length = data.len() as u64;
        let capacity = self.reserve(BLOB_HEADER + length)?;
        let offset = self.allocate_filled(capacity, |space, offset| {
            space.write(offset, &length.to_le_bytes())?;
            space.write(offset + BLOB_HEADER, data)?;
            Ok(())
        })?;
        self.blobs.insert(offset, capacity);

        Ok(BlobRef {
            offset,
            capacity,
            length,
        })
    }

    /// Append to a staged blob, relocating it when it outgrows its slot
    pub fn append_blob(&mut self, blob: &mut BlobRef, data: &[u8]) -> Result<()> {
        self.check_blob(blob)?;
        let new_length = blob.length + data.len() as u64;

        if BLOB_HEADER + new_length <= blob.capacity {
            self.space
                .write(blob.offset + BLOB_HEADER + blob.length, data)?;
            self.space.write(blob.offset, &new_length.to_le_bytes())?;
            blob.length = new_length;
            return Ok(());
        }

        // Double the slot so repeated appends stay amortized
        let capacity = self.reserve((BLOB_HEADER + new_length).max(blob.capacity * 2))?;
        let old = *blob;
        let offset = self.allocate_filled(capacity, |space, offset| {
            let mut payload = vec![0u8; old.length as usize];
            space.read(old.offset + BLOB_HEADER, &mut payload)?;
            payload.extend_from_slice(data);

            space.write(offset, &new_length.to_le_bytes())?;
            space.write(offset + BLOB_HEADER, &payload)?;
            Ok(())
        })?;

        self.release_blob(*blob)?;
        self.blobs.insert(offset, capacity);
        debug!(
            "Blob moved {} -> {} ({} bytes, capacity {})",
            blob.offset, offset, new_length, capacity
        );

        *blob = BlobRef {
            offset,
            capacity,
            length: new_length,
        };
        Ok(())
    }

    /// Read a staged blob's payload
    pub fn blob(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        self.check_blob(blob)?;

        let mut header = [0u8; BLOB_HEADER as usize];
        self.space.read(blob.offset, &mut header)?;
        let length = u64::from_le_bytes(header);
        if BLOB_HEADER + length > blob.capacity {
            return Err(ScratchError::Consistency(format!(
                "blob at {} claims {} bytes in a {}-byte slot",
                blob.offset, length, blob.capacity
            )));
        }

        let mut payload = vec![0u8; length as usize];
        self.space.read(blob.offset + BLOB_HEADER, &mut payload)?;
        Ok(payload)
    }

    fn check_blob(&self, blob: &BlobRef) -> Result<()> {
        match self.blobs.get(&blob.offset) {
            Some(&capacity) if capacity == blob.capacity => Ok(()),
            _ => Err(ScratchError::InvalidRange {
                offset: blob.offset,
                size: blob.capacity,
            }),
        }
    }

    pub fn release_blob(&mut self, blob: BlobRef) -> Result<()> {
        self.check_blob(&blob)?;
        self.blobs.remove(&blob.offset);
        self.space.release_space(blob.offset, blob.capacity)
    }

    /// Release every staged message and blob
    pub fn clear(&mut self) -> Result<()> {
        let items: Vec<(u64, u64)> = std::mem::take(&mut self.messages)
            .into_iter()
            .chain(std::mem::take(&mut self.blobs))
            .collect();
        for (offset, size) in items {
            self.space.release_space(offset, size)?;
        }
        Ok(())
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn space(&self) -> &ScratchSpace {
        &self.space
    }

    pub fn into_inner(self) -> ScratchSpace {
        self.space
    }
}
