//! Parsing of analyzer output text.

use std::collections::BTreeMap;

use serde::Serialize;

const MISS_QTY: &str = "miss qty:";
const SIZE_REDUCED: &str = "size reduced by";
const LOSSLESS: &str = "lossless:";
const LINE_TOO_BIG: &str = "line too big";
const FOOTER_FULL: &str = "footer full";

/// Counters recognized in one analyzer output file.
///
/// Matching is by substring and case-insensitive. Lines that match nothing are
/// ignored, so any free-form text the analyzer adds is harmless.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyzerDiagnostic {
    /// `<label> miss qty: N`, keyed by label as written.
    pub miss_counts: BTreeMap<String, u64>,
    pub reduction_pct: Option<f64>,
    pub lossless: Option<bool>,
    pub line_too_big: bool,
    pub footer_full: bool,
}

impl AnalyzerDiagnostic {
    pub fn parse(text: &str) -> Self {
        let mut diag = Self::default();

        for line in text.lines() {
            let line = line.trim();
            // ASCII lowercasing keeps byte offsets valid for `line`
            let lower = line.to_ascii_lowercase();

            if lower.contains(LINE_TOO_BIG) {
                diag.line_too_big = true;
            }
            if lower.contains(FOOTER_FULL) {
                diag.footer_full = true;
            }

            if let Some(idx) = lower.find(MISS_QTY) {
                let label = line[..idx].trim();
                if let Some(n) = first_token(&line[idx + MISS_QTY.len()..]).and_then(|t| t.parse().ok()) {
                    diag.miss_counts.insert(label.to_string(), n);
                }
            } else if let Some(idx) = lower.find(SIZE_REDUCED) {
                let rest = &line[idx + SIZE_REDUCED.len()..];
                if let Some(pct) = first_token(rest)
                    .map(|t| t.trim_end_matches('%'))
                    .and_then(|t| t.parse::<f64>().ok())
                    .filter(|p| p.is_finite())
                {
                    diag.reduction_pct = Some(pct);
                }
            } else if let Some(idx) = lower.find(LOSSLESS) {
                match first_token(&lower[idx + LOSSLESS.len()..]) {
                    Some("true") => diag.lossless = Some(true),
                    Some("false") => diag.lossless = Some(false),
                    _ => {}
                }
            }
        }

        diag
    }

    /// The `ULR` miss count, the one shown in reports.
    pub fn ulr_miss_qty(&self) -> Option<u64> {
        self.miss_counts
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case("ulr"))
            .map(|(_, n)| *n)
    }

    /// The analyzer hit a structural limit.
    pub fn is_unrecoverable(&self) -> bool {
        self.line_too_big || self.footer_full
    }

    /// Nothing recognizable was found.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn first_token(s: &str) -> Option<&str> {
    s.split_whitespace().next()
}
