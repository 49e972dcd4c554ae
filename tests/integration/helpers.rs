//! Shared fixtures for integration tests.

use std::fs;
use std::path::{Path, PathBuf};

/// A small trace exercising every classification path.
///
/// Produces `0x1000_16_dist32` (offsets 0,4,8,12), `0x1000_16_dist32.1`
/// (the reused address, offset 4), `0x2000_32_dist64` (offsets 0,8,16,
/// never freed) and `0x3000_8_distVar` (offsets 0,3, never freed). The block
/// at 0x5000 sees no writes and the store to 0x9000 hits no block.
pub const SAMPLE_TRACE: &str = "\
program output before tracing
===ALLOC START===
Start 0x1000, size 16
   at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)
   by 0x400537: main (example.c:6)
===ALLOC END===
0x1000 0xaa
0x1004 0x0
0x1008 0x0
0x100c 0x0
===ALLOC START===
Start 0x2000, size 32
===ALLOC END===
0x2000 0x1
0x2008 0x2
0x2010 0x0
===ALLOC START===
Start 0x3000, size 8
===ALLOC END===
0x3000 0x1
0x3003 0x2
===FREE START===
Start 0x1000, size 16
===FREE END===
===ALLOC START===
Start 0x1000, size 16
===ALLOC END===
0x1004 0xbb
===FREE START===
Start 0x1000, size 16
===FREE END===
===ALLOC START===
Start 0x5000, size 64
===ALLOC END===
0x9000 0x1
0xnothex 0x1
Start 0xzz, size 4
";

/// Names of the artifacts produced from [`SAMPLE_TRACE`], in scan order.
pub const SAMPLE_ARTIFACTS: [&str; 4] = [
    "0x1000_16_dist32",
    "0x1000_16_dist32.1",
    "0x2000_32_dist64",
    "0x3000_8_distVar",
];

/// Write `content` to `name` inside `dir`.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write fixture");
    path
}

/// Write [`SAMPLE_TRACE`] into `dir`.
pub fn sample_trace(dir: &Path) -> PathBuf {
    write_file(dir, "app.memlog", SAMPLE_TRACE)
}

/// Sorted file names in `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to read dir")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// An executable shell script standing in for the analyzer.
///
/// The script receives `<artifact> <output>` as `$1 $2`.
#[cfg(unix)]
pub fn fake_analyzer(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-analyzer");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}
