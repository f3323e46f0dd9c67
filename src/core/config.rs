//! Temp space configuration
//!
//! Controls where a scratch region spills once memory is exhausted and how
//! much memory all regions sharing a registry may hold. Loaded from TOML,
//! optionally overridden from the environment:
//!
//! ```toml
//! cache_limit = 67108864
//! min_block_size = 1048576
//! file_prefix = "scratch_"
//!
//! [[directories]]
//! path = "/fast/ssd/tmp"
//! limit = 10737418240
//!
//! [[directories]]
//! path = "/var/tmp"
//! ```

use crate::core::error::{Result, ScratchError};
use crate::core::validation::{normalize_directory, FilePrefix};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default memory ceiling shared by all scratch regions (64MB)
pub const DEFAULT_CACHE_LIMIT: u64 = 64 * 1024 * 1024;

/// Default physical growth granularity (1MB)
pub const DEFAULT_MIN_BLOCK_SIZE: u64 = 1024 * 1024;

/// Default temp-file name prefix
pub const DEFAULT_FILE_PREFIX: &str = "scratch_";

/// Candidate directory list (platform path-list separator)
pub const ENV_TEMP_DIRS: &str = "SCRATCH_TEMP_DIRS";
/// Memory ceiling in bytes
pub const ENV_CACHE_LIMIT: &str = "SCRATCH_CACHE_LIMIT";
/// Growth granularity in bytes
pub const ENV_MIN_BLOCK_SIZE: &str = "SCRATCH_MIN_BLOCK_SIZE";

/// One candidate directory for spill files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempDirectory {
    /// Directory in which temp files are created
    pub path: PathBuf,

    /// Maximum bytes all spill files in this directory may occupy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl TempDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TempDirectory {
            path: path.into(),
            limit: None,
        }
    }

    pub fn with_limit(path: impl Into<PathBuf>, limit: u64) -> Self {
        TempDirectory {
            path: path.into(),
            limit: Some(limit),
        }
    }
}

/// Scratch space configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempSpaceConfig {
    /// Ordered spill directories; the first that can host a file wins
    pub directories: Vec<TempDirectory>,

    /// Memory ceiling for memory-backed blocks, across every region on a registry
    pub cache_limit: u64,

    /// Physical blocks are sized in multiples of this (0 or 1 = exact)
    pub min_block_size: u64,

    /// Default temp-file name prefix
    pub file_prefix: String,
}

impl Default for TempSpaceConfig {
    fn default() -> Self {
        TempSpaceConfig {
            directories: vec![TempDirectory::new(std::env::temp_dir())],
            cache_limit: DEFAULT_CACHE_LIMIT,
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

impl TempSpaceConfig {
    /// Config with explicit directories and memory ceiling, exact-size blocks
    pub fn new(directories: Vec<TempDirectory>, cache_limit: u64) -> Self {
        TempSpaceConfig {
            directories,
            cache_limit,
            min_block_size: 1,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: TempSpaceConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ScratchError::io("open", path.as_ref(), e))?;
        Self::from_toml_str(&source)
    }

    /// Apply `SCRATCH_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(dirs) = std::env::var_os(ENV_TEMP_DIRS) {
            self.directories = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .map(TempDirectory::new)
                .collect();
        }
        if let Some(limit) = env_u64(ENV_CACHE_LIMIT)? {
            self.cache_limit = limit;
        }
        if let Some(size) = env_u64(ENV_MIN_BLOCK_SIZE)? {
            self.min_block_size = size;
        }
        self.validate()?;
        Ok(self)
    }

    /// Set the memory ceiling
    pub fn cache_limit(mut self, limit: u64) -> Self {
        self.cache_limit = limit;
        self
    }

    /// Set the growth granularity
    pub fn min_block_size(mut self, size: u64) -> Self {
        self.min_block_size = size;
        self
    }

    /// Set the default temp-file prefix
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Check the config is usable
    ///
    /// Rejects duplicate directories (after normalization), a zero quota
    /// and an invalid prefix. An empty directory list is allowed: regions
    /// then live in memory only and fail once the ceiling is hit.
    pub fn validate(&self) -> Result<()> {
        FilePrefix::new(self.file_prefix.clone())?;

        let mut seen = HashSet::new();
        for dir in &self.directories {
            if dir.path.as_os_str().is_empty() {
                return Err(ScratchError::InvalidConfig(
                    "temp directory path cannot be empty".to_string(),
                ));
            }
            if !seen.insert(normalize_directory(&dir.path)) {
                return Err(ScratchError::InvalidConfig(format!(
                    "temp directory listed twice: {:?}",
                    dir.path
                )));
            }
            if dir.limit == Some(0) {
                return Err(ScratchError::InvalidConfig(format!(
                    "temp directory {:?} has a zero limit",
                    dir.path
                )));
            }
        }

        Ok(())
    }

    /// Effective growth granularity (never zero)
    pub fn block_granularity(&self) -> u64 {
        self.min_block_size.max(1)
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ScratchError::InvalidConfig(format!("{}={}: {}", name, value, e))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ScratchError::InvalidConfig(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TempSpaceConfig::default();
        assert_eq!(config.cache_limit, DEFAULT_CACHE_LIMIT);
        assert_eq!(config.min_block_size, DEFAULT_MIN_BLOCK_SIZE);
        assert_eq!(config.directories.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = TempSpaceConfig::from_toml_str(
            r#"
            cache_limit = 65536
            min_block_size = 4096
            file_prefix = "sort_"

            [[directories]]
            path = "/fast/tmp"
            limit = 1048576

            [[directories]]
            path = "/var/tmp"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_limit, 65536);
        assert_eq!(config.min_block_size, 4096);
        assert_eq!(config.file_prefix, "sort_");
        assert_eq!(
            config.directories,
            vec![
                TempDirectory::with_limit("/fast/tmp", 1048576),
                TempDirectory::new("/var/tmp"),
            ]
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TempSpaceConfig::from_toml_str("cache_limit = 1024").unwrap();
        assert_eq!(config.cache_limit, 1024);
        assert_eq!(config.min_block_size, DEFAULT_MIN_BLOCK_SIZE);
        assert_eq!(config.file_prefix, DEFAULT_FILE_PREFIX);
    }

    #[test]
    fn test_empty_directory_list_is_valid() {
        let config = TempSpaceConfig::from_toml_str("directories = []").unwrap();
        assert!(config.directories.is_empty());
    }

    #[test]
    fn test_duplicate_directories_rejected() {
        let config = TempSpaceConfig::new(
            vec![TempDirectory::new("/var/tmp"), TempDirectory::new("/var/tmp/")],
            0,
        );
        assert!(matches!(
            config.validate(),
            Err(ScratchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = TempSpaceConfig::new(vec![TempDirectory::with_limit("/var/tmp", 0)], 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let config = TempSpaceConfig::default().file_prefix("../x");
        assert!(matches!(
            config.validate(),
            Err(ScratchError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        let result = TempSpaceConfig::from_toml_str("cache_limit = \"lots\"");
        assert!(matches!(result, Err(ScratchError::ConfigParse(_))));
    }

    #[test]
    fn test_block_granularity() {
        assert_eq!(TempSpaceConfig::default().min_block_size(0).block_granularity(), 1);
        assert_eq!(TempSpaceConfig::default().min_block_size(4096).block_granularity(), 4096);
    }

    // Environment variables are process-wide
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    fn clear_env() {
        std::env::remove_var(ENV_TEMP_DIRS);
        std::env::remove_var(ENV_CACHE_LIMIT);
        std::env::remove_var(ENV_MIN_BLOCK_SIZE);
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock();
        clear_env();

        let dirs = std::env::join_paths(["/fast/tmp", "/var/tmp"]).unwrap();
        std::env::set_var(ENV_TEMP_DIRS, &dirs);
        std::env::set_var(ENV_CACHE_LIMIT, " 4096 ");
        std::env::set_var(ENV_MIN_BLOCK_SIZE, "512");

        let result = TempSpaceConfig::default()
            .file_prefix("env_")
            .with_env_overrides();
        clear_env();

        let config = result.unwrap();
        assert_eq!(
            config.directories,
            vec![TempDirectory::new("/fast/tmp"), TempDirectory::new("/var/tmp")]
        );
        assert_eq!(config.cache_limit, 4096);
        assert_eq!(config.min_block_size, 512);
        assert_eq!(config.file_prefix, "env_");
    }

    #[test]
    fn test_env_absent_keeps_config() {
        let _guard = ENV_LOCK.lock();
        clear_env();

        let config = TempSpaceConfig::new(vec![TempDirectory::new("/var/tmp")], 100)
            .with_env_overrides()
            .unwrap();
        assert_eq!(config.directories, vec![TempDirectory::new("/var/tmp")]);
        assert_eq!(config.cache_limit, 100);
        assert_eq!(config.min_block_size, 1);
    }

    #[test]
    fn test_env_unparsable_value() {
        let _guard = ENV_LOCK.lock();
        clear_env();

        std::env::set_var(ENV_CACHE_LIMIT, "lots");
        let result = TempSpaceConfig::default().with_env_overrides();
        clear_env();

        match result {
            Err(ScratchError::InvalidConfig(message)) => {
                assert!(message.contains(ENV_CACHE_LIMIT));
                assert!(message.contains("lots"));
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }
}
