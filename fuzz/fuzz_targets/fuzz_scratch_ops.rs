#![no_main]
use libfuzzer_sys::{fuzz_target, arbitrary::{Arbitrary, Unstructured}};
use scratch_space::{ScratchSpace, TempDirectory, TempSpaceConfig, TempSpaceRegistry};

#[derive(Debug, Arbitrary)]
enum Op {
    Extend(u16),
    Write { offset: u32, data: Vec<u8> },
    Read { offset: u32, len: u16 },
    Allocate(u16),
    Release(u8),
    Batch { count: u8, min: u8, extra: u8 },
}

// Random op sequences against a small ceiling; any panic or failed
// consistency check is a bug
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);

    let cache_limit: u16 = match u.arbitrary() {
        Ok(limit) => limit,
        Err(_) => return,
    };
    let ops: Vec<Op> = match u.arbitrary() {
        Ok(ops) => ops,
        Err(_) => return,
    };

    let config = TempSpaceConfig::new(
        vec![TempDirectory::new(std::env::temp_dir())],
        cache_limit as u64,
    );
    let registry = match TempSpaceRegistry::new(config) {
        Ok(r) => r,
        Err(_) => return,
    };
    let mut space = match ScratchSpace::new(registry) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut model: Vec<u8> = Vec::new();
    let mut live: Vec<(u64, u64)> = Vec::new();
    let mut extended = 0u64;

    for op in ops.iter().take(64) {
        match op {
            Op::Extend(size) => {
                if space.extend(*size as u64).is_ok() {
                    extended += *size as u64;
                    model.resize(space.size() as usize, 0);
                }
            }
            Op::Write { offset, data } => {
                let offset = *offset as usize;
                let ok = space.write(offset as u64, data).is_ok();
                assert_eq!(ok, offset + data.len() <= model.len());
                if ok {
                    model[offset..offset + data.len()].copy_from_slice(data);
                }
            }
            Op::Read { offset, len } => {
                let offset = *offset as usize;
                let mut buf = vec![0u8; *len as usize];
                if space.read(offset as u64, &mut buf).is_ok() {
                    assert_eq!(&buf[..], &model[offset..offset + buf.len()]);
                } else {
                    assert!(offset + buf.len() > model.len());
                }
            }
            Op::Allocate(size) => {
                if let Ok(offset) = space.allocate_space(*size as u64) {
                    model.resize(space.size() as usize, 0);
                    if *size > 0 {
                        live.push((offset, *size as u64));
                    }
                }
            }
            Op::Release(pick) => {
                if !live.is_empty() {
                    let (offset, size) = live.swap_remove(*pick as usize % live.len());
                    assert!(space.release_space(offset, size).is_ok());
                }
            }
            Op::Batch { count, min, extra } => {
                let min = (*min as u64).max(1);
                if let Ok(batch) = space.allocate_batch(*count as usize % 16, min, min + *extra as u64) {
                    model.resize(space.size() as usize, 0);
                    live.extend(batch.iter().map(|s| (s.offset, s.size)));
                }
            }
        }

        let report = space.validate();
        assert!(report.ok, "{:?}", report.issues);
        let allocated: u64 = live.iter().map(|&(_, s)| s).sum();
        assert_eq!(report.total_free, space.size() - allocated - extended);
    }
});
