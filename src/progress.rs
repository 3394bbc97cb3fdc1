//! Progress display for fleet runs.
//!
//! Workers report through [`ProgressCallback`]; one bar tracks completed
//! devices and each finished device gets a line above it.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{AttemptContext, DeviceRecord, ProgressCallback, SessionError};
use std::time::Duration;

pub struct FleetProgress {
    bar: ProgressBar,
}

impl FleetProgress {
    /// A visible bar, or a hidden one when output is suppressed
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {elapsed_precise} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for FleetProgress {
    fn on_run_start(&self, devices: usize, workers: usize) {
        self.bar.set_length(devices as u64);
        self.bar.set_message(format!("{workers} worker(s)"));
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn on_device_start(&self, hostname: &str, _address: &str) {
        self.bar.set_message(hostname.to_string());
    }

    fn on_retry(&self, hostname: &str, attempt: AttemptContext, error: &SessionError, delay: Duration) {
        self.bar.println(format!(
            "{} {hostname}: attempt {}/{} failed ({error}), retrying in {}s",
            "⚠".yellow(),
            attempt.attempt,
            attempt.max_attempts,
            delay.as_secs()
        ));
    }

    fn on_device_complete(&self, record: &DeviceRecord) {
        let glyph = if record.is_unreachable() {
            "✗".red()
        } else if record.has_errors() {
            "⚠".yellow()
        } else {
            "✓".green()
        };
        self.bar.println(format!("{glyph} {}", device_line(record)));
        self.bar.inc(1);
    }
}

/// `hostname  address  comment`, columns aligned across the fleet
pub fn device_line(record: &DeviceRecord) -> String {
    format!(
        "{:25}{:17}{}",
        record.hostname,
        record.address,
        device_comment(record)
    )
}

/// Short status of a finished device
pub fn device_comment(record: &DeviceRecord) -> String {
    if let Some(error) = record.connection_error() {
        return format!("connection failed: {error}");
    }
    if record.has_errors() {
        return format!("{} issue(s)", record.issues.len());
    }
    if record.outcome.persisted {
        return "upgraded".to_string();
    }
    match &record.plan {
        Some(plan) => plan.describe(),
        None => "no plan".to_string(),
    }
}
