use crate::convert::ConversionReport;
use crate::dates::DateFixReport;
use crate::models::{OutcomeStatus, ProcessingOutcome};
use serde::Serialize;
use std::fmt::Write;

/// Every sidecar's outcome, in processing order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<ProcessingOutcome>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub fused: usize,
    pub no_match: usize,
    pub conversion_failed: usize,
    pub fusion_failed: usize,
    pub unexpected_error: usize,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.total - self.fused
    }
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in &self.outcomes {
            match outcome.status {
                OutcomeStatus::Fused => summary.fused += 1,
                OutcomeStatus::NoMatch => summary.no_match += 1,
                OutcomeStatus::ConversionFailed => summary.conversion_failed += 1,
                OutcomeStatus::FusionFailed => summary.fusion_failed += 1,
                OutcomeStatus::UnexpectedError => summary.unexpected_error += 1,
            }
        }
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessingOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }
}

/// Console form of a fusion batch.
pub fn render_text(report: &BatchReport) -> String {
    let mut out = String::from("--- Final Report ---\n");
    let failures: Vec<_> = report.failures().collect();
    if failures.is_empty() {
        out.push_str("All JSON files were successfully processed.\n");
    } else {
        out.push_str("The following JSON files could not be processed:\n");
        for f in &failures {
            let _ = writeln!(out, "- {}: {}", f.sidecar_name, f.detail);
        }
    }
    let _ = write!(out, "\nFiles not processed: {}", failures.len());
    out
}

pub fn render_conversion(report: &ConversionReport) -> String {
    let mut out = String::from("--- Final Report ---\n");
    if report.converted.is_empty() {
        out.push_str("No HEIC files were successfully converted.\n");
    } else {
        out.push_str("The following HEIC files were successfully converted to JPEG:\n");
        for c in &report.converted {
            let _ = writeln!(out, "- {}", c.name);
        }
    }
    if report.failed.is_empty() {
        out.push_str("\nAll HEIC files were successfully processed.\n");
    } else {
        out.push_str("\nThe following HEIC files could not be processed:\n");
        for f in &report.failed {
            let _ = writeln!(out, "- {}: {}", f.name, f.reason);
        }
    }
    let _ = write!(
        out,
        "\nFiles successfully processed: {}\nFiles not processed: {}",
        report.converted.len(),
        report.failed.len()
    );
    out
}

pub fn render_dates(report: &DateFixReport) -> String {
    let mut out = String::from("--- Final Report ---\n");
    let _ = writeln!(out, "Files successfully processed: {}", report.updated.len());
    if !report.failed.is_empty() {
        let _ = writeln!(out, "Files with errors: {}", report.failed.len());
        for f in &report.failed {
            let _ = writeln!(out, "- {}: {}", f.name, f.reason);
        }
    }
    let _ = write!(
        out,
        "Files with insufficient metadata: {}",
        report.missing_metadata.len()
    );
    for name in &report.missing_metadata {
        let _ = write!(out, "\n- {name}");
    }
    out
}
