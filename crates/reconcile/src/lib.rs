//! # Reconcile
//!
//! Firmware reconciliation engine for a fleet of CLI-managed devices.
//!
//! For each device the engine collects facts over an interactive session,
//! computes a plan from a versioned firmware policy, and (when committing)
//! drives the plan through a fixed sequence of interactive steps. A bounded
//! worker pool processes the fleet with per-device connection retries.
//!
//! ## Core Concepts
//!
//! - **DeviceRecord**: per-device accumulator of facts, plan, outcome and issues
//! - **FirmwarePolicy**: the decision table, loaded from configuration
//! - **ReconcilePlan**: deletions, fetch target, checksum and boot change
//! - **Session / Connector**: the transport, supplied by the caller
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{DeviceRecord, NoProgress, RunContext, RunOptions, run_fleet};
//!
//! let devices = vec![DeviceRecord::new("csg-01", "10.0.0.1")];
//! let ctx = RunContext::new(RunOptions::default());
//! let records = run_fleet(&connector, devices, &ctx, &NoProgress)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`Connector`] / [`Session`]: open and drive device sessions
//! - [`ProgressCallback`]: receives progress updates from workers

pub mod context;
pub mod error;
pub mod executor;
pub mod facts;
pub mod parse;
pub mod plan;
pub mod policy;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod summary;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{NoProgress, ProgressCallback, RunContext, RunOptions};
pub use error::{ErrorCategory, PolicyError, Result, RunError, SessionError};
pub use executor::{ExecuteOptions, PersistOutcome, Step, execute_plan, interpret_persist};
pub use facts::collect_facts;
pub use plan::{ReconcilePlan, build_plan};
pub use policy::{FamilyPolicy, FirmwarePolicy};
pub use record::{
    CheckStatus, Connectivity, DeviceFacts, DeviceIssue, DeviceRecord, Exchange,
    ExecutionOutcome, IssueKind, SfpObservation, Topology,
};
pub use retry::{AttemptContext, RetryConfig};
pub use scheduler::{process_device, run_fleet};
pub use session::{Connector, Expect, Session, Timeouts};
pub use summary::{FleetSummary, Partitions, format_elapsed, partition};
