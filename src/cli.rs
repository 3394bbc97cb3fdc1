use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "firmsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile firmware across a fleet of CLI-managed devices", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: ~/.config/firmsync/config.toml)
    #[arg(short, long, global = true, env = "FIRMSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Collect facts and plan every device; apply with --commit
    Run(RunArgs),

    /// Show or check the effective firmware policy
    Policy {
        /// Only validate the policy table
        #[arg(long)]
        check: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    /// Inventory file mapping hostname to address
    #[arg(short, long)]
    pub inventory: Option<PathBuf>,

    /// Number of devices processed in parallel
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Apply the plans (default is a dry run)
    #[arg(long)]
    pub commit: bool,

    /// Transfer images even when SFP vendors are not approved
    #[arg(long)]
    pub force_copy: bool,

    /// Directory receiving the report files
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Login username
    #[arg(short, long, env = "FIRMSYNC_USERNAME")]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "FIRMSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}
