//! Validation for temp-file prefixes and candidate directories
//!
//! Temp files are named `{prefix}{random}` inside one of the configured
//! directories. The prefix is user-controlled (usually derived from the
//! consumer, e.g. `"sort_"` or `"batch_"`), so it is restricted to a safe
//! character set that can never escape the target directory.

use crate::core::error::{Result, ScratchError};
use regex::Regex;
use std::path::{Component, Path, PathBuf};

/// Validated temp-file name prefix
///
/// # Rules
/// - ASCII letters, digits, `_`, `.` and `-` only
/// - Length: 1-64 characters
/// - Must not be `.` or `..`
///
/// # Examples
///
/// ```
/// use scratch_space::FilePrefix;
///
/// let prefix = FilePrefix::new("sort_").unwrap();
/// assert_eq!(prefix.as_str(), "sort_");
///
/// assert!(FilePrefix::new("../escape").is_err());
/// assert!(FilePrefix::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePrefix(String);

impl FilePrefix {
    /// Pattern for a safe file name fragment
    const PATTERN: &'static str = r"^[A-Za-z0-9_.-]+$";

    /// Maximum prefix length
    const MAX_LENGTH: usize = 64;

    /// Create a new validated prefix
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        Self::validate_prefix(&prefix)?;
        Ok(FilePrefix(prefix))
    }

    fn validate_prefix(prefix: &str) -> Result<()> {
        if prefix.is_empty() || prefix.len() > Self::MAX_LENGTH {
            return Err(ScratchError::InvalidPrefix(prefix.to_string()));
        }

        let re = Regex::new(Self::PATTERN)
            .map_err(|e| ScratchError::InvalidConfig(format!("prefix pattern: {}", e)))?;
        if !re.is_match(prefix) {
            return Err(ScratchError::InvalidPrefix(prefix.to_string()));
        }

        if prefix == "." || prefix == ".." {
            return Err(ScratchError::InvalidPrefix(prefix.to_string()));
        }

        Ok(())
    }

    /// Get the prefix as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FilePrefix {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FilePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a candidate directory path for comparison
///
/// Drops `.` components and trailing separators so that `/tmp`, `/tmp/`
/// and `/tmp/.` compare equal. Does not touch the filesystem.
///
/// ```
/// use scratch_space::core::validation::normalize_directory;
/// use std::path::Path;
///
/// assert_eq!(normalize_directory(Path::new("/tmp/")), normalize_directory(Path::new("/tmp/.")));
/// ```
pub fn normalize_directory(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
