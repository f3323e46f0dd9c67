//! Scratch space internals
//!
//! Bottom-up: segments and the free-space allocator, temp files and the
//! block chain, the shared registry, and finally [`scratch::ScratchSpace`]
//! with the two consumers built on it.

pub mod allocator;
pub mod batch_cache;
pub mod block;
pub mod config;
pub mod error;
pub mod record_store;
pub mod registry;
pub mod scratch;
pub mod segment;
pub mod temp_file;
pub mod validation;

pub use batch_cache::{BatchCache, BlobRef};
pub use config::{TempDirectory, TempSpaceConfig};
pub use error::{Result, ScratchError};
pub use record_store::RecordStore;
pub use registry::TempSpaceRegistry;
pub use scratch::{BatchSegment, ScratchOptions, ScratchSpace, ScratchStats, ValidationReport};
pub use segment::Segment;
