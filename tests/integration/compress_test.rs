//! Integration tests for compression orchestration

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memlog::artifact::scan_dir;
use memlog::compress::analyzer::AnalyzerResult;
use memlog::compress::{
    output_path_for, Analyzer, AnalyzerRun, CompressionOrchestrator, MemoryMonitor,
    OrchestratorConfig, OutcomeStatus,
};
use memlog::trace::{classify_file, ClassifierOptions, SpoolKind};

use crate::helpers::sample_trace;

/// Fails every dist32 artifact, succeeds on the rest.
struct PickyAnalyzer {
    calls: AtomicUsize,
}

impl Analyzer for PickyAnalyzer {
    fn name(&self) -> &str {
        "picky"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn analyze(&self, artifact: &Path, output: &Path) -> AnalyzerResult<AnalyzerRun> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = artifact.file_name().unwrap().to_string_lossy();
        if name.contains("dist32") {
            return Ok(AnalyzerRun::failed(Some(1), "cannot compress"));
        }
        fs::write(output, "ULR miss qty: 2\nSize reduced by 50%\nLossless: True\n")?;
        Ok(AnalyzerRun::succeeded())
    }
}

struct CalmMemory;

impl MemoryMonitor for CalmMemory {
    fn pressure(&mut self) -> Option<f64> {
        Some(0.2)
    }
}

fn fast_config(results: &Path) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::new(results);
    config.workers = 2;
    config.poll_interval = Duration::from_millis(5);
    config.retry_backoff = Duration::from_millis(1);
    config.max_backoff = Duration::from_millis(4);
    config
}

#[test]
fn outcomes_partition_eligible_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");
    let split = classify_file(&trace, &out, SpoolKind::Memory, ClassifierOptions::default()).unwrap();

    let analyzer = Arc::new(PickyAnalyzer {
        calls: AtomicUsize::new(0),
    });
    let results = dir.path().join("results");
    let report = CompressionOrchestrator::new(analyzer.clone(), fast_config(&results))
        .with_monitor(Box::new(CalmMemory))
        .run(split.artifacts)
        .unwrap();

    // Two dist32, one dist64, one distVar
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.count(OutcomeStatus::Succeeded), 1);
    assert_eq!(report.count(OutcomeStatus::PermanentlyFailed), 2);
    assert_eq!(report.count(OutcomeStatus::Unrecoverable), 0);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1 + 2 * 3);

    let failed: Vec<String> = report
        .critical_failures()
        .iter()
        .map(|o| o.artifact.file_name())
        .collect();
    assert_eq!(failed, ["0x1000_16_dist32", "0x1000_16_dist32.1"]);
}

#[test]
fn rerun_over_scanned_directory() {
    let dir = tempfile::tempdir().unwrap();
    let trace = sample_trace(dir.path());
    let out = dir.path().join("out");
    classify_file(&trace, &out, SpoolKind::Memory, ClassifierOptions::default()).unwrap();
    let results = dir.path().join("results");

    for _ in 0..2 {
        let artifacts = scan_dir(&out).unwrap();
        let analyzer = Arc::new(PickyAnalyzer {
            calls: AtomicUsize::new(0),
        });
        let report = CompressionOrchestrator::new(analyzer, fast_config(&results))
            .with_monitor(Box::new(CalmMemory))
            .run(artifacts)
            .unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.count(OutcomeStatus::Succeeded), 1);
    }
}

#[cfg(unix)]
mod external {
    use super::*;
    use memlog::compress::ExternalAnalyzer;

    use crate::helpers::fake_analyzer;

    #[test]
    fn external_analyzer_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let trace = sample_trace(dir.path());
        let out = dir.path().join("out");
        let split =
            classify_file(&trace, &out, SpoolKind::Memory, ClassifierOptions::default()).unwrap();

        // Line count of the artifact stands in for the miss count
        let script = fake_analyzer(
            dir.path(),
            r#"n=$(wc -l < "$1" | tr -d ' ')
case "$1" in
  *dist64*) echo "error: footer full" > "$2"; exit 1 ;;
esac
printf 'ULR miss qty: %s\nSize reduced by 25%%\nLossless: True\n' "$n" > "$2""#,
        );

        let results = dir.path().join("results");
        let report = CompressionOrchestrator::new(
            Arc::new(ExternalAnalyzer::new(&script)),
            fast_config(&results),
        )
        .with_monitor(Box::new(CalmMemory))
        .run(split.artifacts)
        .unwrap();

        assert_eq!(report.count(OutcomeStatus::Succeeded), 2);
        assert_eq!(report.count(OutcomeStatus::Unrecoverable), 1);
        let unrecoverable = report
            .outcomes
            .iter()
            .find(|o| o.status == OutcomeStatus::Unrecoverable)
            .unwrap();
        assert_eq!(unrecoverable.attempts, 1);
        assert_eq!(unrecoverable.artifact.file_name(), "0x2000_32_dist64");

        let first = &report.outcomes[0];
        assert_eq!(first.output_path, output_path_for(&results, &first.artifact));
        assert!(fs::read_to_string(&first.output_path)
            .unwrap()
            .contains("ULR miss qty: 4"));
    }
}
