//! Integration tests for trace classification and artifact naming

use std::fs;
use std::io::Cursor;

use memlog::artifact::scan_dir;
use memlog::trace::{classify_file, ClassifierOptions, SpoolArena, SpoolKind, TraceClassifier};
use memlog::{AlignmentLabel, BlockFinalizer};

use crate::helpers::{file_names, sample_trace, SAMPLE_ARTIFACTS, SAMPLE_TRACE};

#[test]
fn sample_trace_produces_expected_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");

    let output = classify_file(&trace, &out, SpoolKind::Disk, ClassifierOptions::default()).unwrap();

    let names: Vec<String> = output.artifacts.iter().map(|a| a.file_name()).collect();
    assert_eq!(names, SAMPLE_ARTIFACTS);
    // The disk spool is anonymous and leaves nothing behind
    assert_eq!(file_names(&out), SAMPLE_ARTIFACTS);

    let stats = &output.stats;
    assert_eq!(stats.opens, 5);
    assert_eq!(stats.closes, 2);
    assert_eq!(stats.closed_at_end, 3);
    assert_eq!(stats.empty_blocks, 1);
    assert_eq!(stats.writes_attributed, 10);
    assert_eq!(stats.writes_dropped, 1);
    assert_eq!(stats.malformed_lines, 2);
    assert_eq!(stats.artifacts.dist32, 2);
    assert_eq!(stats.artifacts.dist64, 1);
    assert_eq!(stats.artifacts.dist_var, 1);
}

#[test]
fn artifact_bodies_are_exact() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");
    classify_file(&trace, &out, SpoolKind::Memory, ClassifierOptions::default()).unwrap();

    let read = |name: &str| fs::read_to_string(out.join(name)).unwrap();
    assert_eq!(
        read("0x1000_16_dist32"),
        "0x1000 0xaa 0\n0x1004 0x0 4\n0x1008 0x0 8\n0x100c 0x0 12\n"
    );
    assert_eq!(read("0x1000_16_dist32.1"), "0x1004 0xbb 4\n");
    assert_eq!(read("0x2000_32_dist64"), "0x2000 0x1 0\n0x2008 0x2 8\n0x2010 0x0 16\n");
    assert_eq!(read("0x3000_8_distVar"), "0x3000 0x1 0\n0x3003 0x2 3\n");
}

#[test]
fn spool_kinds_agree() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let disk = dir.path().join("disk");
    let memory = dir.path().join("memory");

    classify_file(&trace, &disk, SpoolKind::Disk, ClassifierOptions::default()).unwrap();
    classify_file(&trace, &memory, SpoolKind::Memory, ClassifierOptions::default()).unwrap();

    for name in SAMPLE_ARTIFACTS {
        assert_eq!(
            fs::read(disk.join(name)).unwrap(),
            fs::read(memory.join(name)).unwrap(),
            "{} differs between spools",
            name
        );
    }
}

#[test]
fn rerun_into_same_directory_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");

    classify_file(&trace, &out, SpoolKind::Memory, ClassifierOptions::default()).unwrap();
    let second = classify_file(&trace, &out, SpoolKind::Memory, ClassifierOptions::default()).unwrap();

    let names: Vec<String> = second.artifacts.iter().map(|a| a.file_name()).collect();
    assert_eq!(
        names,
        [
            "0x1000_16_dist32.2",
            "0x1000_16_dist32.3",
            "0x2000_32_dist64.1",
            "0x3000_8_distVar.1"
        ]
    );
    assert_eq!(scan_dir(&out).unwrap().len(), 8);
    assert_eq!(
        fs::read_to_string(out.join("0x1000_16_dist32")).unwrap(),
        fs::read_to_string(out.join("0x1000_16_dist32.2")).unwrap()
    );
}

#[test]
fn min_block_size_filters_small_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");
    let options = ClassifierOptions {
        min_block_size: 16,
        ..Default::default()
    };

    let output = classify_file(&trace, &out, SpoolKind::Memory, options).unwrap();
    let labels: Vec<AlignmentLabel> = output.artifacts.iter().map(|a| a.label()).collect();
    assert_eq!(
        labels,
        [AlignmentLabel::Dist32, AlignmentLabel::Dist32, AlignmentLabel::Dist64]
    );
    // 0x3000 is gone, so its stores land nowhere
    assert_eq!(output.stats.writes_dropped, 3);
}

#[test]
fn classifier_runs_over_any_reader() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = TraceClassifier::new(
        BlockFinalizer::create(dir.path()).unwrap(),
        SpoolArena::in_memory(),
        ClassifierOptions::default(),
    );

    let output = classifier.run(Cursor::new(SAMPLE_TRACE.as_bytes())).unwrap();
    assert_eq!(output.artifacts.len(), 4);
    assert!(output.artifacts.iter().all(|a| a.write_count.unwrap_or(0) > 0));
}

#[test]
fn truncated_trace_still_finalizes_open_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = TraceClassifier::new(
        BlockFinalizer::create(dir.path()).unwrap(),
        SpoolArena::in_memory(),
        ClassifierOptions::default(),
    );

    // Cut mid-line, mid-record
    let trace = "===ALLOC START===\nStart 0x40, size 8\n===ALLOC END===\n0x40 0x1\n0x44 0x";
    let output = classifier.run(Cursor::new(trace.as_bytes())).unwrap();

    assert_eq!(output.artifacts.len(), 1);
    assert_eq!(output.artifacts[0].file_name(), "0x40_8_dist64");
    assert_eq!(output.stats.malformed_lines, 1);
}

#[test]
fn missing_trace_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = classify_file(
        &dir.path().join("nope.log"),
        &dir.path().join("out"),
        SpoolKind::Disk,
        ClassifierOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("not found"));
}
