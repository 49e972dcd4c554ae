//! Analyzer result reporting.
//!
//! Parses analyzer output into counters, turns every artifact into a report
//! row and keeps run totals in an explicit accumulator.

mod aggregator;
mod diagnostic;
mod render;

pub use aggregator::{
    scan_all_zero, AggregateReport, ReportRow, ReportTotals, ResultAggregator, RowStatus,
};
pub use diagnostic::AnalyzerDiagnostic;
pub use render::{render_json, render_summary, render_table, render_text};
