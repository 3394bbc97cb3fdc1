use anyhow::{Context, Result};
use reconcile::{FirmwarePolicy, RetryConfig, Timeouts};
use serde::{Deserialize, Serialize};
use sshcli::SshOptions;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("firmsync"))
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Contents of `config.toml`
///
/// Every section is optional; missing values fall back to the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub run: RunSettings,
    pub retry: RetryConfig,
    pub timeouts: Timeouts,
    pub policy: FirmwarePolicy,
    pub transport: SshOptions,
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub workers: usize,
    pub inventory: String,
    pub force_copy: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            inventory: "devices.yaml".to_string(),
            force_copy: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub dir: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            dir: "reports".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location
    ///
    /// An explicit path must exist. A missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_dir()?.join("config.toml"), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Settings file not found: {}", path.display());
            }
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings = Self::parse(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.policy.validate()?;
        settings.timeouts.validate()?;
        Ok(settings)
    }

    pub fn inventory_path(&self) -> PathBuf {
        expand_path(&self.run.inventory)
    }

    pub fn report_dir(&self) -> PathBuf {
        expand_path(&self.report.dir)
    }
}
