//! `firmsync run` - reconcile the whole inventory

use anyhow::{Context as AnyhowContext, Result};
use chrono::Local;
use reconcile::{FleetSummary, RunContext, RunOptions, run_fleet};
use serde::Serialize;
use sshcli::SshConnector;
use std::path::PathBuf;
use std::time::Instant;

use crate::Context;
use crate::cli::RunArgs;
use crate::config::Settings;
use crate::progress::FleetProgress;
use crate::{credentials, inventory, report, ui};

/// Machine-readable result printed with `--json`
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    commit: bool,
    policy_revision: &'a str,
    summary: &'a FleetSummary,
    reports: &'a [PathBuf],
}

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;

    let inventory_path = args
        .inventory
        .clone()
        .unwrap_or_else(|| settings.inventory_path());
    let report_dir = args
        .report_dir
        .clone()
        .unwrap_or_else(|| settings.report_dir());
    let options = RunOptions {
        workers: args.workers.unwrap_or(settings.run.workers),
        commit: args.commit,
        force_copy: args.force_copy || settings.run.force_copy,
    };
    let human = !ctx.quiet && !args.json;

    let devices = inventory::load(&inventory_path)?;
    if devices.is_empty() {
        ui::warn(&format!("No devices in {}", inventory_path.display()));
        return Ok(());
    }

    if human {
        ui::header(if options.commit {
            "Firmware reconciliation"
        } else {
            "Firmware reconciliation (dry run)"
        });
        ui::kv("Inventory", &inventory_path.display().to_string());
        ui::kv("Devices", &devices.len().to_string());
        ui::kv("Workers", &options.workers.to_string());
        ui::kv("Policy", &settings.policy.revision);
        if options.force_copy {
            ui::warn("SFP vendor check disabled (--force-copy)");
        }
        println!();
    }
    log::info!(
        "Starting run: {} device(s), policy {}, commit={}",
        devices.len(),
        settings.policy.revision,
        options.commit
    );

    let credentials = credentials::resolve(args.username, args.password)?;
    let connector = SshConnector::new(settings.transport.clone(), credentials);
    let commit = options.commit;
    let run_ctx = RunContext::new(options)
        .with_policy(settings.policy.clone())
        .with_retry(settings.retry.clone())
        .with_timeouts(settings.timeouts.clone());

    let progress = FleetProgress::new(human);
    let started = Instant::now();
    let records = run_fleet(&connector, devices, &run_ctx, &progress)?;
    progress.finish();

    let summary = FleetSummary::from_records(&records, started.elapsed());
    let written = report::write_reports(&report_dir, &records, commit, Local::now())
        .context("Failed to write reports")?;

    if args.json {
        let out = RunReport {
            commit,
            policy_revision: &settings.policy.revision,
            summary: &summary,
            reports: &written,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !ctx.quiet {
        print_summary(&summary, &written);
    }

    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} device(s) need attention",
            summary.unreachable + summary.with_errors
        )
    }
}

fn print_summary(summary: &FleetSummary, written: &[PathBuf]) {
    ui::header("Summary");
    ui::kv("Clean", &summary.clean.to_string());
    ui::kv("Needing changes", &summary.needing_changes.to_string());
    ui::kv("Upgraded", &summary.upgraded.to_string());
    ui::kv("With errors", &summary.with_errors.to_string());
    ui::kv("Failed connections", &summary.unreachable.to_string());

    if !written.is_empty() {
        println!();
        ui::info("Reports:");
        for path in written {
            ui::dim(&path.display().to_string());
        }
    }

    println!();
    if summary.is_success() {
        ui::success(&summary.line());
    } else {
        ui::warn(&summary.line());
    }
}
