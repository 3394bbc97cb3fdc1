//! Report files written at the end of a run
//!
//! Layout: `<root>/<YYYY.MM.DD>/<HH.MM.SS>_<name>.txt`. A report with no
//! content is not written.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use reconcile::{DeviceRecord, format_elapsed, partition};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Render and write every report, returning the files created
pub fn write_reports(
    root: &Path,
    records: &[DeviceRecord],
    commit: bool,
    now: DateTime<Local>,
) -> Result<Vec<PathBuf>> {
    let dir = root.join(now.format("%Y.%m.%d").to_string());
    let prefix = now.format("%H.%M.%S").to_string();

    let mut reports = vec![
        ("connection_errors", connection_errors(records)),
        ("device_errors", device_errors(records)),
        ("sfp_vendors", sfp_vendors(records)),
        ("plans", plans(records)),
    ];
    if commit {
        reports.push(("transcripts", transcripts(records)));
    }

    let mut written = Vec::new();
    for (name, content) in reports {
        if content.is_empty() {
            continue;
        }
        if written.is_empty() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let path = dir.join(format!("{prefix}_{name}.txt"));
        fs::write(&path, content).with_context(|| format!("Could not write {}", path.display()))?;
        log::debug!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Unreachable devices with the raw connection error
pub fn connection_errors(records: &[DeviceRecord]) -> String {
    let mut out = String::new();
    for record in partition(records).unreachable {
        let error = record.connection_error().unwrap_or("not attempted");
        let _ = writeln!(out, "{:25}{:17}{}", record.hostname, record.address, error);
    }
    out
}

/// Connected devices and every issue recorded on them
pub fn device_errors(records: &[DeviceRecord]) -> String {
    let mut out = String::new();
    for record in partition(records).with_errors {
        let _ = writeln!(out, "{} ({})", record.hostname, record.address);
        for issue in &record.issues {
            let _ = writeln!(out, "    {issue}");
        }
    }
    out
}

/// SFP vendor readings on qualifying uplink ports
pub fn sfp_vendors(records: &[DeviceRecord]) -> String {
    let mut out = String::new();
    for record in records.iter().filter(|r| r.is_connected()) {
        for sfp in &record.facts.sfp_vendors {
            let verdict = if sfp.approved { "approved" } else { "NOT APPROVED" };
            let _ = writeln!(
                out,
                "{:25}{:17}{:12}{:20}{}",
                record.hostname, record.address, sfp.port, sfp.vendor, verdict
            );
        }
    }
    out
}

/// Planned actions per connected device
pub fn plans(records: &[DeviceRecord]) -> String {
    let mut out = String::new();
    for record in records {
        if let Some(plan) = &record.plan {
            let _ = writeln!(
                out,
                "{:25}{:17}{:8}{}{}",
                record.hostname,
                record.address,
                record.facts.topology.to_string(),
                plan.describe(),
                step_durations(record)
            );
        }
    }
    out
}

/// ` (squeeze 4m 10s, transfer 21m 03s)` for the long steps that ran
fn step_durations(record: &DeviceRecord) -> String {
    let steps: Vec<String> = [
        ("squeeze", record.outcome.squeeze_duration),
        ("transfer", record.outcome.transfer_duration),
    ]
    .into_iter()
    .filter_map(|(name, took)| took.map(|d| format!("{name} {}", format_elapsed(d.as_secs()))))
    .collect();

    if steps.is_empty() {
        String::new()
    } else {
        format!(" ({})", steps.join(", "))
    }
}

/// Every command sent and the raw response, per device
pub fn transcripts(records: &[DeviceRecord]) -> String {
    let mut out = String::new();
    for record in records.iter().filter(|r| !r.transcript.is_empty()) {
        let _ = writeln!(out, "==== {} ({}) ====", record.hostname, record.address);
        for exchange in &record.transcript {
            let _ = writeln!(out, "> {}", exchange.command);
            let _ = writeln!(out, "{}", exchange.response.trim_end());
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reconcile::{IssueKind, ReconcilePlan, SfpObservation};
    use std::time::Duration;

    fn fleet() -> Vec<DeviceRecord> {
        let mut unreachable = DeviceRecord::new("csg-00", "10.0.0.0");
        unreachable.mark_unreachable("Connection refused");

        let mut broken = DeviceRecord::new("csg-01", "10.0.0.1");
        broken.mark_connected();
        broken.add_issue(IssueKind::Precondition, "SFP vendor mismatch");
        broken.facts.sfp_vendors.push(SfpObservation {
            port: "Gi0/10".into(),
            vendor: "OEM".into(),
            approved: false,
        });
        broken.plan = Some(ReconcilePlan::default());
        broken.log_exchange("dir flash:", "Directory of flash:/");

        let mut clean = DeviceRecord::new("csg-02", "10.0.0.2");
        clean.mark_connected();
        clean.plan = Some(ReconcilePlan::default());

        vec![unreachable, broken, clean]
    }

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap()
    }

    #[test]
    fn test_connection_errors() {
        let report = connection_errors(&fleet());
        assert_eq!(report.lines().count(), 1);
        assert!(report.starts_with("csg-00"));
        assert!(report.trim_end().ends_with("Connection refused"));
    }

    #[test]
    fn test_device_errors_lists_issues() {
        let report = device_errors(&fleet());
        assert_eq!(
            report,
            "csg-01 (10.0.0.1)\n    [precondition] SFP vendor mismatch\n"
        );
    }

    #[test]
    fn test_sfp_and_plans() {
        let records = fleet();
        assert!(sfp_vendors(&records).contains("NOT APPROVED"));

        let plans = plans(&records);
        assert_eq!(plans.lines().count(), 2);
        assert!(plans.lines().all(|l| l.ends_with("no changes")));
    }

    #[test]
    fn test_plans_show_step_durations() {
        let mut record = DeviceRecord::new("csg-03", "10.0.0.3");
        record.mark_connected();
        record.plan = Some(ReconcilePlan::default());
        record.outcome.squeeze_duration = Some(Duration::from_secs(250));
        record.outcome.transfer_duration = Some(Duration::from_secs(1263));

        let report = plans(&[record]);
        assert!(
            report.trim_end().ends_with("no changes (squeeze 4m 10s, transfer 21m 03s)"),
            "{report}"
        );
    }

    #[test]
    fn test_transcripts() {
        let report = transcripts(&fleet());
        assert!(report.starts_with("==== csg-01 (10.0.0.1) ====\n> dir flash:\n"));
        assert!(!report.contains("csg-02"));
    }

    #[test]
    fn test_write_reports_layout() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_reports(dir.path(), &fleet(), false, at()).unwrap();

        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "09.05.01_connection_errors.txt",
                "09.05.01_device_errors.txt",
                "09.05.01_sfp_vendors.txt",
                "09.05.01_plans.txt",
            ]
        );
        assert!(written.iter().all(|p| p.parent().unwrap().ends_with("2024.03.07")));
    }

    #[test]
    fn test_transcripts_only_when_committing() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_reports(dir.path(), &fleet(), true, at()).unwrap();
        assert!(written.last().unwrap().ends_with("09.05.01_transcripts.txt"));
    }

    #[test]
    fn test_empty_reports_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_reports(dir.path(), &[], true, at()).unwrap();
        assert!(written.is_empty());
        assert!(!dir.path().join("2024.03.07").exists());
    }
}
