//! Run accounting.

use serde::Serialize;
use std::fmt;

/// Counts of one run, or of one batch before they are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rows: usize,
}

impl RunReport {
    /// Field-wise sum; associative and commutative, so batch order is irrelevant
    pub fn merge(self, other: RunReport) -> RunReport {
        RunReport {
            batches: self.batches + other.batches,
            succeeded: self.succeeded + other.succeeded,
            failed: self.failed + other.failed,
            skipped: self.skipped + other.skipped,
            rows: self.rows + other.rows,
        }
    }

    pub fn clients(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches, {} clients succeeded, {} failed, {} skipped, {} rows",
            self.batches, self.succeeded, self.failed, self.skipped, self.rows
        )
    }
}
