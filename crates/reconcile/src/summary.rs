//! Aggregator - fleet-level view over finished records

use crate::record::DeviceRecord;
use serde::Serialize;
use std::time::Duration;

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    /// Devices that never connected
    pub unreachable: usize,
    /// Connected devices with at least one recorded issue
    pub with_errors: usize,
    /// Connected devices without issues
    pub clean: usize,
    /// Connected devices whose plan changes something
    pub needing_changes: usize,
    /// Devices where the new boot configuration was saved
    pub upgraded: usize,
    pub elapsed_secs: u64,
}

impl FleetSummary {
    /// Summarize finished records
    pub fn from_records(records: &[DeviceRecord], elapsed: Duration) -> Self {
        let mut summary = Self {
            total: records.len(),
            elapsed_secs: elapsed.as_secs(),
            ..Default::default()
        };
        for record in records {
            summary.add_record(record);
        }
        summary
    }

    fn add_record(&mut self, record: &DeviceRecord) {
        if !record.is_connected() {
            self.unreachable += 1;
            return;
        }

        if record.has_errors() {
            self.with_errors += 1;
        } else {
            self.clean += 1;
        }
        if record.plan.as_ref().is_some_and(|p| p.has_changes()) {
            self.needing_changes += 1;
        }
        if record.outcome.persisted {
            self.upgraded += 1;
        }
    }

    /// Whether every device connected without issues
    pub fn is_success(&self) -> bool {
        self.unreachable == 0 && self.with_errors == 0
    }

    /// The process exit line
    pub fn line(&self) -> String {
        format!(
            "{} device(s), {} failed connection(s), {} with errors, {}",
            self.total,
            self.unreachable,
            self.with_errors,
            format_elapsed(self.elapsed_secs)
        )
    }
}

/// Records split into the three report partitions
#[derive(Debug, Default)]
pub struct Partitions<'a> {
    pub unreachable: Vec<&'a DeviceRecord>,
    pub with_errors: Vec<&'a DeviceRecord>,
    pub clean: Vec<&'a DeviceRecord>,
}

/// Split records by connectivity, then by recorded issues
///
/// A device with issues that did connect is never counted as unreachable.
pub fn partition(records: &[DeviceRecord]) -> Partitions<'_> {
    let mut parts = Partitions::default();
    for record in records {
        if !record.is_connected() {
            parts.unreachable.push(record);
        } else if record.has_errors() {
            parts.with_errors.push(record);
        } else {
            parts.clean.push(record);
        }
    }
    parts
}

/// `1h 02m 03s` style wall time
pub fn format_elapsed(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
