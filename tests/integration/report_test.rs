//! Integration tests for result aggregation and rendering

use std::fs;

use chrono::{TimeZone, Utc};

use memlog::artifact::scan_dir;
use memlog::compress::output_path_for;
use memlog::report::{render_json, render_text, ResultAggregator, RowStatus};
use memlog::trace::{classify_file, ClassifierOptions, SpoolKind};

use crate::helpers::sample_trace;

/// Split the sample trace and leave analyzer output for two of its artifacts.
fn sample_report() -> memlog::report::AggregateReport {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");
    let results = dir.path().join("results");
    classify_file(&trace, &out, SpoolKind::Memory, ClassifierOptions::default()).unwrap();
    fs::create_dir_all(&results).unwrap();

    let artifacts = scan_dir(&out).unwrap();
    fs::write(
        output_path_for(&results, &artifacts[0]),
        "ULR miss qty: 7\nSize reduced by 25%\nLossless: True\n",
    )
    .unwrap();
    fs::write(output_path_for(&results, &artifacts[2]), "error: footer full\n").unwrap();

    let mut aggregator = ResultAggregator::new();
    aggregator.add_from_results_dir(&artifacts, &results);
    aggregator.finish()
}

#[test]
fn rows_follow_results_on_disk() {
    let report = sample_report();
    let statuses: Vec<RowStatus> = report.rows.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [
            RowStatus::Compressed,
            RowStatus::NotRun,
            RowStatus::Unrecoverable,
            RowStatus::Skipped
        ]
    );
    assert!(report.rows.iter().all(|r| r.all_zero == Some(false)));
    assert!(report.totals.critical_failures.is_empty());
}

#[test]
fn snapshot_text_report() {
    let report = sample_report();
    insta::with_settings!({filters => vec![
        (r"\(\d+(\.\d+)? [KMGT]?i?B\)", "[SIZE]"),
    ]}, {
        insta::assert_snapshot!(render_text(&report), @r"
        ARTIFACT                         LABEL          SIZE ZERO  STATUS          ULR MISS  REDUCED LOSSLESS
        0x1000_16_dist32                 dist32           16 no    compressed             7   25.00% yes
        0x1000_16_dist32.1               dist32           16 no    not_run                -        - -
        0x2000_32_dist64                 dist64           32 no    unrecoverable          -        - -
        0x3000_8_distVar                 distVar           8 no    skipped                -        - -

        Processed:          2
        Lossless successes: 1
        Skipped (distVar):  1
        Failed:             0
        Unrecoverable:      1
        Not run:            1
        Original bytes:     64 [SIZE]
        Compressed bytes:   60 [SIZE]
        Reduction:          6.25%
        Critical failures:  none
        ");
    });
}

#[test]
fn json_report_is_machine_readable() {
    let report = sample_report();
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let json: serde_json::Value = serde_json::from_str(&render_json(&report, at).unwrap()).unwrap();

    assert_eq!(json["generated_at"], "2024-01-02T03:04:05Z");
    assert_eq!(json["totals"]["processed"], 2);
    assert_eq!(json["totals"]["original_bytes"], 64);
    assert_eq!(json["totals"]["compressed_bytes"], 60);
    assert_eq!(json["rows"][0]["ulr_miss_qty"], 7);
    assert_eq!(json["rows"][0]["miss_counts"]["ULR"], 7);
    assert_eq!(json["rows"][3]["label"], "distVar");
    assert_eq!(json["rows"][1]["status"], "not_run");
}
