//! Counter helpers over the `metrics` facade.

use ::metrics::counter;

/// Result label for archive and upload counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Failed => "failed",
        }
    }
}

/// Why a record never reached the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Larger than a whole buffer's data region.
    Oversized,
    /// No buffer could be mapped.
    Unmapped,
    /// Submitted after shutdown.
    Closed,
}

impl DropReason {
    fn as_str(self) -> &'static str {
        match self {
            DropReason::Oversized => "oversized",
            DropReason::Unmapped => "unmapped",
            DropReason::Closed => "closed",
        }
    }
}

pub fn record_written(bytes: usize) {
    counter!("perf_issues_records_written_total").increment(1);
    counter!("perf_issues_bytes_written_total").increment(bytes as u64);
}

pub fn record_rotation() {
    counter!("perf_issues_rotations_total").increment(1);
}

pub fn record_archive(outcome: Outcome) {
    counter!("perf_issues_archives_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_upload(outcome: Outcome) {
    counter!("perf_issues_uploads_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_dropped(reason: DropReason) {
    counter!("perf_issues_records_dropped_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_stall() {
    counter!("perf_issues_stalls_total").increment(1);
}
