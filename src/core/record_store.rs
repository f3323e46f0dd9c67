//! Fixed-length record store
//!
//! Appends records of one length back to back (`index * record_length`)
//! and fetches them by index. A pure append log over a scratch region; it
//! never uses the free-space allocator.

use crate::core::error::{Result, ScratchError};
use crate::core::scratch::ScratchSpace;

#[derive(Debug)]
pub struct RecordStore {
    space: ScratchSpace,
    record_length: u64,
    count: u64,
}

impl RecordStore {
    pub fn new(space: ScratchSpace, record_length: u64) -> Result<Self> {
        if record_length == 0 {
            return Err(ScratchError::InvalidConfig(
                "record length must be non-zero".to_string(),
            ));
        }

        Ok(RecordStore {
            count: space.size() / record_length,
            space,
            record_length,
        })
    }

    /// Append a record, returning its index
    pub fn store(&mut self, record: &[u8]) -> Result<u64> {
        let offset = self.count * self.record_length;
        if record.len() as u64 != self.record_length {
            return Err(ScratchError::InvalidRange {
                offset,
                size: record.len() as u64,
            });
        }

        if offset + self.record_length > self.space.size() {
            self.space.extend(self.record_length)?;
        }
        self.space.write(offset, record)?;

        self.count += 1;
        Ok(self.count - 1)
    }

    /// Copy record `index` into `record`; `false` if no such record exists
    pub fn fetch(&self, index: u64, record: &mut [u8]) -> Result<bool> {
        if index >= self.count {
            return Ok(false);
        }
        if record.len() as u64 != self.record_length {
            return Err(ScratchError::InvalidRange {
                offset: index * self.record_length,
                size: record.len() as u64,
            });
        }

        self.space.read(index * self.record_length, record)?;
        Ok(true)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn record_length(&self) -> u64 {
        self.record_length
    }

    pub fn space(&self) -> &ScratchSpace {
        &self.space
    }

    pub fn into_inner(self) -> ScratchSpace {
        self.space
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{TempDirectory, TempSpaceConfig};
    use crate::core::registry::TempSpaceRegistry;
    use tempfile::TempDir;

    fn store(dir: &TempDir, cache_limit: u64, record_length: u64) -> RecordStore {
        let registry = TempSpaceRegistry::new(TempSpaceConfig::new(
            vec![TempDirectory::new(dir.path())],
            cache_limit,
        ))
        .unwrap();
        RecordStore::new(ScratchSpace::new(registry).unwrap(), record_length).unwrap()
    }

    #[test]
    fn test_store_and_fetch() {
        let dir = TempDir::new().unwrap();
        let mut records = store(&dir, 1 << 20, 4);

        assert_eq!(records.store(b"abcd").unwrap(), 0);
        assert_eq!(records.store(b"efgh").unwrap(), 1);

        let mut buf = [0u8; 4];
        assert!(records.fetch(1, &mut buf).unwrap());
        assert_eq!(&buf, b"efgh");
        assert!(!records.fetch(2, &mut buf).unwrap());
    }

    #[test]
    fn test_records_across_spill() {
        let dir = TempDir::new().unwrap();
        // 10 records fit in memory, the rest spill
        let mut records = store(&dir, 70, 7);

        for i in 0..40u8 {
            records.store(&[i; 7]).unwrap();
        }
        assert_eq!(records.count(), 40);
        assert!(records.space().temp_file_count() > 0);

        let mut buf = [0u8; 7];
        for i in 0..40u8 {
            assert!(records.fetch(i as u64, &mut buf).unwrap());
            assert_eq!(buf, [i; 7]);
        }
    }

    #[test]
    fn test_wrong_length_rejected() {
        let dir = TempDir::new().unwrap();
        let mut records = store(&dir, 1024, 8);
        assert!(records.store(b"short").is_err());
        assert_eq!(records.count(), 0);
        assert!(RecordStore::new(records.into_inner(), 0).is_err());
    }
}
