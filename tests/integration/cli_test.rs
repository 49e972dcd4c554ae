//! Integration tests for the memlog CLI

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

use crate::helpers::{file_names, sample_trace, write_file, SAMPLE_ARTIFACTS};

/// memlog with an isolated config location.
fn memlog(config_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_memlog"));
    cmd.env("MEMLOG_CONFIG", config_dir.join("config.toml"))
        .env("RUST_LOG", "warn");
    cmd
}

// ============================================================================
// Help and config
// ============================================================================

#[test]
fn help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    memlog(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("split"))
        .stdout(predicate::str::contains("compress"))
        .stdout(predicate::str::contains("report"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    memlog(dir.path()).assert().code(2);
}

#[test]
fn config_show_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    memlog(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[compress]"))
        .stdout(predicate::str::contains("analyzer = \"ulr-compress\""))
        .stdout(predicate::str::contains("max_attempts = 3"));
}

#[test]
fn config_init_writes_once() {
    let dir = tempfile::tempdir().unwrap();
    memlog(dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default config"));
    assert!(dir.path().join("config.toml").is_file());

    memlog(dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "[compress\n");
    memlog(dir.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn completions_for_bash() {
    let dir = tempfile::tempdir().unwrap();
    memlog(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memlog"));
}

// ============================================================================
// Split
// ============================================================================

#[test]
fn split_defaults_to_parsed_dir() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());

    memlog(dir.path())
        .arg("split")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("into 4 artifact(s)"))
        .stdout(predicate::str::contains("distVar: 1"));

    assert_eq!(file_names(&dir.path().join("app.memlog.parsed")), SAMPLE_ARTIFACTS);
}

#[test]
fn split_missing_trace_fails() {
    let dir = tempfile::tempdir().unwrap();
    memlog(dir.path())
        .args(["split", "does-not-exist.log"])
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ============================================================================
// Compress, report, run
// ============================================================================

#[test]
fn compress_without_analyzer_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");
    memlog(dir.path())
        .arg("split")
        .arg(&trace)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    memlog(dir.path())
        .arg("compress")
        .arg(&out)
        .args(["--analyzer", "no-such-analyzer-anywhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn report_before_compress_marks_not_run() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");
    memlog(dir.path())
        .arg("split")
        .arg(&trace)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    memlog(dir.path())
        .arg("report")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("not_run"))
        .stdout(predicate::str::contains("Not run:            3"));
}

#[cfg(unix)]
mod with_fake_analyzer {
    use super::*;
    use crate::helpers::fake_analyzer;

    const SUCCEEDS: &str =
        r#"printf 'ULR miss qty: 1\nSize reduced by 50%%\nLossless: True\n' > "$2""#;

    #[test]
    fn run_end_to_end_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let trace = sample_trace(dir.path());
        let script = fake_analyzer(dir.path(), SUCCEEDS);

        let assert = memlog(dir.path())
            .arg("run")
            .arg(&trace)
            .arg("--analyzer")
            .arg(&script)
            .args(["--format", "json", "-j", "2"])
            .assert()
            .success();

        let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        assert_eq!(json["totals"]["processed"], 3);
        assert_eq!(json["totals"]["lossless_successes"], 3);
        assert_eq!(json["totals"]["skipped_var"], 1);
        assert_eq!(json["totals"]["original_bytes"], 64);
        assert_eq!(json["totals"]["compressed_bytes"], 32);

        let results = dir.path().join("app.memlog.parsed.results");
        assert!(results.join("0x2000_32_dist64.out").is_file());
        assert!(!results.join("0x3000_8_distVar.out").exists());
    }

    #[test]
    fn critical_failures_are_listed_and_optionally_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let trace = sample_trace(dir.path());
        let out = dir.path().join("out");
        let script = fake_analyzer(dir.path(), "echo broken >&2\nexit 1");

        memlog(dir.path())
            .arg("split")
            .arg(&trace)
            .arg("-o")
            .arg(&out)
            .assert()
            .success();

        let compress = |extra: &[&str]| {
            let mut cmd = memlog(dir.path());
            cmd.arg("compress")
                .arg(&out)
                .arg("--analyzer")
                .arg(&script)
                .args(["--retry-backoff-ms", "1", "--max-attempts", "2"])
                .args(extra);
            cmd
        };

        compress(&[])
            .assert()
            .success()
            .stdout(predicate::str::contains("Critical failures:  3"))
            .stdout(predicate::str::contains("0x1000_16_dist32.1"));

        compress(&["--fail-on-critical"]).assert().code(3);

        // Diagnostics are kept next to the outputs
        let stderr = fs::read_to_string(
            dir.path().join("out.results").join("0x2000_32_dist64.err"),
        )
        .unwrap();
        assert_eq!(stderr.trim(), "broken");
    }
}
