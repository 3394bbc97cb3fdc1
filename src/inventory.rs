//! Device inventory loading
//!
//! `devices.yaml` is a flat mapping of hostname to address. File order is
//! the processing order.

use anyhow::{Context, Result};
use reconcile::DeviceRecord;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Load the inventory file into fresh device records
pub fn load(path: &Path) -> Result<Vec<DeviceRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read inventory {}", path.display()))?;
    parse(&content).with_context(|| format!("Invalid inventory {}", path.display()))
}

pub fn parse(content: &str) -> Result<Vec<DeviceRecord>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mapping: Mapping =
        serde_yaml::from_str(content).context("Expected a mapping of hostname: address")?;

    mapping
        .iter()
        .map(|(host, address)| {
            let host = scalar(host).context("Hostname must be a string")?;
            let address = scalar(address)
                .with_context(|| format!("Address of '{host}' must be a string"))?;
            if address.is_empty() {
                anyhow::bail!("Address of '{host}' is empty");
            }
            Ok(DeviceRecord::new(host, address))
        })
        .collect()
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
