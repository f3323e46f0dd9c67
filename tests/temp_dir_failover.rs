//! Temp directory selection, quotas and failover

use scratch_space::{
    ScratchError, ScratchSpace, TempDirectory, TempSpaceConfig, TempSpaceRegistry,
};
use std::sync::Arc;
use tempfile::TempDir;

fn registry(directories: Vec<TempDirectory>) -> Arc<TempSpaceRegistry> {
    TempSpaceRegistry::new(TempSpaceConfig::new(directories, 0)).unwrap()
}

#[test]
fn test_first_directory_preferred() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let mut space = ScratchSpace::new(registry(vec![
        TempDirectory::new(first.path()),
        TempDirectory::new(second.path()),
    ]))
    .unwrap();

    space.extend(100).unwrap();
    space.extend(100).unwrap();

    // Both spills land in one file, so the chain keeps a single block
    assert_eq!(space.temp_file_count(), 1);
    assert_eq!(space.block_count(), 1);
    assert!(space.temp_file_paths()[0].starts_with(first.path()));
}

#[test]
fn test_quota_moves_spill_to_next_directory() {
    let small = TempDir::new().unwrap();
    let large = TempDir::new().unwrap();
    let registry = registry(vec![
        TempDirectory::with_limit(small.path(), 100),
        TempDirectory::new(large.path()),
    ]);
    let mut space = ScratchSpace::new(registry.clone()).unwrap();

    space.extend(80).unwrap();
    space.extend(80).unwrap();

    let paths = space.temp_file_paths();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].starts_with(small.path()));
    assert!(paths[1].starts_with(large.path()));
    assert_eq!(registry.dir_usage(0), 80);
    assert_eq!(registry.dir_usage(1), 80);

    // Data still reads back across the two files
    let data: Vec<u8> = (0..160).map(|i| i as u8).collect();
    space.write(0, &data).unwrap();
    let mut buf = vec![0u8; 160];
    space.read(0, &mut buf).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn test_unusable_directory_skipped() {
    let base = TempDir::new().unwrap();
    let good = TempDir::new().unwrap();
    let mut space = ScratchSpace::new(registry(vec![
        TempDirectory::new(base.path().join("does-not-exist")),
        TempDirectory::new(good.path()),
    ]))
    .unwrap();

    space.extend(64).unwrap();
    assert_eq!(space.temp_file_count(), 1);
    assert!(space.temp_file_paths()[0].starts_with(good.path()));
}

#[test]
fn test_all_directories_exhausted() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let mut space = ScratchSpace::new(registry(vec![
        TempDirectory::with_limit(a.path(), 10),
        TempDirectory::with_limit(b.path(), 10),
    ]))
    .unwrap();

    match space.extend(50) {
        Err(ScratchError::OutOfTempSpace { size, failures }) => {
            assert_eq!(size, 50);
            assert_eq!(failures.len(), 2);
        }
        other => panic!("expected OutOfTempSpace, got {:?}", other),
    }
    assert_eq!(space.size(), 0);
    assert_eq!(space.temp_file_count(), 0);
}

#[test]
fn test_quota_shared_between_regions() {
    let dir = TempDir::new().unwrap();
    let registry = registry(vec![TempDirectory::with_limit(dir.path(), 100)]);

    let mut a = ScratchSpace::new(registry.clone()).unwrap();
    let mut b = ScratchSpace::new(registry.clone()).unwrap();

    a.extend(70).unwrap();
    assert!(b.extend(70).is_err());

    drop(a);
    assert_eq!(registry.dir_usage(0), 0);
    b.extend(70).unwrap();
    assert_eq!(registry.dir_usage(0), 70);
}

#[test]
fn test_prefix_names_files() {
    let dir = TempDir::new().unwrap();
    let mut space = scratch_space::ScratchBuilder::new()
        .directory(dir.path())
        .cache_limit(0)
        .min_block_size(1)
        .prefix("sortrun_")
        .build()
        .unwrap();

    space.extend(10).unwrap();
    let name = space.temp_file_paths()[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert!(name.starts_with("sortrun_"));
}

#[test]
fn test_config_file_drives_registry() {
    let dir = TempDir::new().unwrap();
    let spill = dir.path().join("spill");
    std::fs::create_dir(&spill).unwrap();

    let config_path = dir.path().join("scratch.toml");
    std::fs::write(
        &config_path,
        format!(
            "cache_limit = 16\nmin_block_size = 8\nfile_prefix = \"cfg_\"\n\n[[directories]]\npath = {:?}\nlimit = 64\n",
            spill.to_string_lossy()
        ),
    )
    .unwrap();

    let config = TempSpaceConfig::load(&config_path).unwrap();
    assert_eq!(config.directories.len(), 1);
    assert_eq!(config.directories[0].limit, Some(64));

    let registry = TempSpaceRegistry::new(config).unwrap();
    let mut space = ScratchSpace::new(registry.clone()).unwrap();

    // 10 bytes round up to 16 and fill the ceiling; the next 10 spill
    space.extend(10).unwrap();
    space.extend(10).unwrap();
    assert_eq!(space.physical_size(), 24);
    assert_eq!(registry.cache_usage(), 16);
    assert_eq!(registry.dir_usage(0), 8);
    assert!(space.temp_file_paths()[0].starts_with(&spill));
}
