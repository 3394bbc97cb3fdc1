//! `firmsync policy` - show or validate the effective firmware policy

use anyhow::{Context as AnyhowContext, Result};
use reconcile::{FirmwarePolicy, Topology};

use crate::Context;
use crate::config::Settings;
use crate::ui;

pub fn run(ctx: &Context, check: bool) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;
    let policy = &settings.policy;

    if check {
        // Settings::load already validated the table
        ui::success(&format!("Policy '{}' is valid", policy.revision));
        return Ok(());
    }

    if !ctx.quiet {
        summary(policy);
        println!();
    }

    let table = toml::to_string_pretty(policy).context("Could not render policy")?;
    print!("{table}");
    Ok(())
}

fn summary(policy: &FirmwarePolicy) {
    ui::header(&format!("Firmware policy {}", policy.revision));
    for topology in [Topology::Legacy, Topology::Modern] {
        let family = policy.family(topology);
        ui::kv(&format!("{topology} preferred"), &family.preferred);
        ui::kv(&format!("{topology} fallback"), &family.fallback);
    }
    ui::kv("Default topology", &policy.default_topology.to_string());
    ui::kv("Transfer source", &policy.transfer_source);
    ui::kv("Minimum free", &ui::format_bytes(policy.min_free_bytes));
    ui::kv("Tracked checksums", &policy.checksums.len().to_string());
}
