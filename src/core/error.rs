use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("Range out of bounds: offset {offset} + length {length} exceeds logical size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("Invalid range: offset {offset}, size {size}")]
    InvalidRange { offset: u64, size: u64 },

    #[error("Growth forbidden: cannot extend by {requested} bytes, fixed capacity is {capacity}")]
    GrowthForbidden { requested: u64, capacity: u64 },

    #[error("Out of temporary space: no directory can host {size} more bytes ({})", .failures.join("; "))]
    OutOfTempSpace { size: u64, failures: Vec<String> },

    #[error("I/O error in {call} on {path:?}: {source}")]
    Io {
        call: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid temp file prefix: {0} (letters, digits, '_', '.', '-' only, 1-64 chars)")]
    InvalidPrefix(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Consistency check failed: {0}")]
    Consistency(String),
}

impl ScratchError {
    /// Wrap an OS error with the failing call and the file it targeted
    pub fn io(call: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScratchError::Io {
            call,
            path: path.into(),
            source,
        }
    }

    /// True for failures a caller can only recover from by discarding the scratch region
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            ScratchError::OutOfTempSpace { .. } | ScratchError::GrowthForbidden { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScratchError>;
