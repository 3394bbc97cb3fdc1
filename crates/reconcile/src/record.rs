//! Per-device record accumulated during one reconciliation run

use crate::plan::ReconcilePlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Uplink family of a device, selects the firmware family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Older aggregation neighbors
    Legacy,
    /// Newer aggregation neighbors
    Modern,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Legacy => write!(f, "legacy"),
            Topology::Modern => write!(f, "modern"),
        }
    }
}

/// Outcome of connecting to a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    /// Not tried yet
    #[default]
    Pending,
    /// Session established
    Connected,
    /// Retry budget exhausted; terminal for this run
    Unreachable { error: String },
}

/// One SFP vendor reading on a qualifying uplink port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfpObservation {
    pub port: String,
    pub vendor: String,
    pub approved: bool,
}

/// Facts discovered on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFacts {
    /// Firmware image filenames in flash
    pub images: BTreeSet<String>,
    /// Non-image, non-license files in flash
    pub strays: BTreeSet<String>,
    /// Uplink ports whose description marks them as uplinks
    pub qualifying_ports: Vec<String>,
    pub sfp_vendors: Vec<SfpObservation>,
    pub topology: Topology,
    /// Image the device booted from
    pub running_image: Option<String>,
    /// Image named by the `boot system` statement
    pub boot_image: Option<String>,
    /// Free flash bytes reported by the listing
    pub free_bytes: Option<u64>,
}

impl DeviceFacts {
    /// Empty facts with the given default topology
    pub fn new(topology: Topology) -> Self {
        Self {
            images: BTreeSet::new(),
            strays: BTreeSet::new(),
            qualifying_ports: Vec::new(),
            sfp_vendors: Vec::new(),
            topology,
            running_image: None,
            boot_image: None,
            free_bytes: None,
        }
    }

    /// True when at least one SFP was observed and every one is approved
    pub fn vendors_approved(&self) -> bool {
        !self.sfp_vendors.is_empty() && self.sfp_vendors.iter().all(|o| o.approved)
    }
}

impl Default for DeviceFacts {
    fn default() -> Self {
        Self::new(Topology::Modern)
    }
}

/// Tri-state result of a check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    #[default]
    NotAttempted,
    Passed,
    Failed,
}

impl CheckStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// What the transaction executor actually did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Files whose delete exchange completed
    pub deleted: Vec<String>,
    pub squeeze: CheckStatus,
    pub squeeze_duration: Option<Duration>,
    /// Free bytes reported right before the transfer decision
    pub free_bytes_at_copy: Option<u64>,
    /// Transfer exchange was attempted
    pub transferred: bool,
    pub checksum: CheckStatus,
    /// Copy through verification
    pub transfer_duration: Option<Duration>,
    pub boot_reconfigured: bool,
    pub persisted: bool,
}

/// One command and the raw text it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub command: String,
    pub response: String,
}

/// Class of a recorded problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Partial or unparsable facts
    FactCollection,
    /// A step skipped because its precondition failed
    Precondition,
    /// A step that ran and failed
    Transaction,
    /// Session lost mid-run
    Session,
}

impl IssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::FactCollection => "facts",
            IssueKind::Precondition => "precondition",
            IssueKind::Transaction => "transaction",
            IssueKind::Session => "session",
        }
    }
}

/// A human-readable error recorded on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for DeviceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.label(), self.message)
    }
}

/// Everything known about one device during one run
///
/// Owned by exactly one worker from dequeue until the run joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub hostname: String,
    pub address: String,
    pub connectivity: Connectivity,
    pub facts: DeviceFacts,
    pub plan: Option<ReconcilePlan>,
    pub outcome: ExecutionOutcome,
    pub transcript: Vec<Exchange>,
    pub issues: Vec<DeviceIssue>,
    pub elapsed: Option<Duration>,
}

impl DeviceRecord {
    /// Create a record for an inventory entry
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            connectivity: Connectivity::Pending,
            facts: DeviceFacts::default(),
            plan: None,
            outcome: ExecutionOutcome::default(),
            transcript: Vec::new(),
            issues: Vec::new(),
            elapsed: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity == Connectivity::Connected
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self.connectivity, Connectivity::Unreachable { .. })
    }

    /// Raw connection error text for unreachable devices
    pub fn connection_error(&self) -> Option<&str> {
        match &self.connectivity {
            Connectivity::Unreachable { error } => Some(error),
            _ => None,
        }
    }

    pub fn mark_connected(&mut self) {
        if self.connectivity == Connectivity::Pending {
            self.connectivity = Connectivity::Connected;
        }
    }

    /// Mark the device unreachable; the first error wins
    pub fn mark_unreachable(&mut self, error: impl Into<String>) {
        if !self.is_unreachable() {
            self.connectivity = Connectivity::Unreachable {
                error: error.into(),
            };
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Record a problem and keep going
    pub fn add_issue(&mut self, kind: IssueKind, message: impl Into<String>) {
        let issue = DeviceIssue {
            kind,
            message: message.into(),
        };
        log::warn!("{} ({}): {}", self.hostname, self.address, issue);
        self.issues.push(issue);
    }

    /// Append one exchange to the audit transcript
    pub fn log_exchange(&mut self, command: impl Into<String>, response: impl Into<String>) {
        self.transcript.push(Exchange {
            command: command.into(),
            response: response.into(),
        });
    }
}
