//! Text and JSON rendering of an [`AggregateReport`].

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::aggregator::{AggregateReport, ReportRow, ReportTotals};

/// Width of the label column in the summary block.
const SUMMARY_LABEL_WIDTH: usize = 20;

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    }
}

fn table_line(cols: [&str; 8]) -> String {
    let line = format!(
        "{:<32} {:<8} {:>10} {:<5} {:<14} {:>9} {:>8} {}",
        cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6], cols[7]
    );
    line.trim_end().to_string()
}

fn row_line(row: &ReportRow) -> String {
    let size = row.size.to_string();
    let miss = row
        .ulr_miss_qty
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    let reduced = row
        .reduction_pct
        .map(|p| format!("{:.2}%", p))
        .unwrap_or_else(|| "-".to_string());

    table_line([
        &row.name,
        row.label.as_str(),
        &size,
        yes_no(row.all_zero),
        row.status.as_str(),
        &miss,
        &reduced,
        yes_no(row.lossless),
    ])
}

/// Row table only.
pub fn render_table(rows: &[ReportRow]) -> String {
    let mut out = table_line([
        "ARTIFACT", "LABEL", "SIZE", "ZERO", "STATUS", "ULR MISS", "REDUCED", "LOSSLESS",
    ]);
    out.push('\n');
    for row in rows {
        out.push_str(&row_line(row));
        out.push('\n');
    }
    out
}

/// Summary block only.
pub fn render_summary(totals: &ReportTotals) -> String {
    let mut out = String::new();
    let mut field = |label: &str, value: String| {
        let _ = writeln!(out, "{:<width$}{}", label, value, width = SUMMARY_LABEL_WIDTH);
    };

    field("Processed:", totals.processed.to_string());
    field("Lossless successes:", totals.lossless_successes.to_string());
    field("Skipped (distVar):", totals.skipped_var.to_string());
    field("Failed:", totals.failed.to_string());
    field("Unrecoverable:", totals.unrecoverable.to_string());
    field("Not run:", totals.not_run.to_string());
    field(
        "Original bytes:",
        format!("{} ({})", totals.original_bytes, format_size(totals.original_bytes)),
    );
    field(
        "Compressed bytes:",
        format!("{} ({})", totals.compressed_bytes, format_size(totals.compressed_bytes)),
    );
    field(
        "Reduction:",
        totals
            .reduction_pct()
            .map(|p| format!("{:.2}%", p))
            .unwrap_or_else(|| "-".to_string()),
    );

    if totals.critical_failures.is_empty() {
        field("Critical failures:", "none".to_string());
    } else {
        field("Critical failures:", totals.critical_failures.len().to_string());
        for name in &totals.critical_failures {
            let _ = writeln!(out, "  {}", name);
        }
    }
    out
}

/// Table, a blank line, then the summary.
pub fn render_text(report: &AggregateReport) -> String {
    format!(
        "{}\n{}",
        render_table(&report.rows),
        render_summary(&report.totals)
    )
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    totals: &'a ReportTotals,
    rows: &'a [ReportRow],
}

/// Pretty-printed JSON with a generation timestamp.
pub fn render_json(report: &AggregateReport, generated_at: DateTime<Utc>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        totals: &report.totals,
        rows: &report.rows,
    })
}
