//! Fact collector - read-only inspection of a device
//!
//! Every command goes into the transcript. A command that fails or returns
//! nothing useful is recorded as a fact-collection issue and collection moves
//! on with defaults.

use crate::parse::{self, FlashClassifier};
use crate::policy::FirmwarePolicy;
use crate::record::{DeviceFacts, DeviceRecord, IssueKind, SfpObservation};
use crate::session::{Expect, Session, Timeouts};

pub const DIR_FLASH: &str = "dir flash:";
pub const SHOW_RUNNING_IMAGE: &str = "show version | include System image";
pub const SHOW_BOOT: &str = "show running-config | include boot system";
pub const SHOW_NEIGHBORS: &str = "show cdp neighbors detail";

/// Command listing interface descriptions filtered to the uplink markers
pub fn uplink_command(markers: &[String]) -> String {
    format!("show interfaces description | include {}", markers.join("|"))
}

/// Command reading the SFP vendor of one port
pub fn vendor_command(port: &str) -> String {
    format!("show controllers {port} | include vendor_name")
}

/// Populate `record.facts` from a live session
pub fn collect_facts<S: Session + ?Sized>(
    session: &mut S,
    record: &mut DeviceRecord,
    policy: &FirmwarePolicy,
    timeouts: &Timeouts,
) {
    let mut facts = DeviceFacts::new(policy.default_topology);
    let mut inspector = Inspector {
        session,
        record,
        timeout: timeouts.inspect,
    };

    inspector.flash(&mut facts, policy);
    inspector.uplinks(&mut facts, policy);
    inspector.topology(&mut facts, policy);
    inspector.images(&mut facts);

    log::info!(
        "{}: {} image(s), {} stray(s), {} SFP(s), topology {}",
        inspector.record.hostname,
        facts.images.len(),
        facts.strays.len(),
        facts.sfp_vendors.len(),
        facts.topology
    );
    inspector.record.facts = facts;
}

/// Runs show commands and keeps the transcript
struct Inspector<'a, S: Session + ?Sized> {
    session: &'a mut S,
    record: &'a mut DeviceRecord,
    timeout: std::time::Duration,
}

impl<S: Session + ?Sized> Inspector<'_, S> {
    /// Run one show command; returns the response body without echo or prompt
    fn show(&mut self, command: &str) -> Option<String> {
        log::debug!("{} > {}", self.record.hostname, command);
        match self.session.send(command, Expect::Prompt, self.timeout) {
            Ok(raw) => {
                let body = parse::response_body(&raw, command);
                self.record.log_exchange(command, raw);
                Some(body)
            }
            Err(e) => {
                let response = e.output().unwrap_or_default().to_string();
                self.record.log_exchange(command, response);
                self.record
                    .add_issue(IssueKind::FactCollection, format!("'{command}' failed: {e}"));
                None
            }
        }
    }

    fn flash(&mut self, facts: &mut DeviceFacts, policy: &FirmwarePolicy) {
        let classifier = match policy.image_regex() {
            Ok(image) => FlashClassifier::new(image, policy.license_markers.clone()),
            Err(e) => {
                self.record.add_issue(IssueKind::FactCollection, e.to_string());
                return;
            }
        };

        let Some(output) = self.show(DIR_FLASH) else {
            return;
        };
        let listing = parse::flash_listing(&output, &classifier);
        if listing.free_bytes.is_none() {
            self.record.add_issue(
                IssueKind::FactCollection,
                "flash listing did not report free space",
            );
        }

        facts.images = listing.images;
        facts.strays = listing.strays;
        facts.free_bytes = listing.free_bytes;
    }

    fn uplinks(&mut self, facts: &mut DeviceFacts, policy: &FirmwarePolicy) {
        let Some(output) = self.show(&uplink_command(&policy.uplink_markers)) else {
            return;
        };
        facts.qualifying_ports = parse::uplink_ports(&output, &policy.uplink_markers);

        for port in facts.qualifying_ports.clone() {
            let Some(output) = self.show(&vendor_command(&port)) else {
                continue;
            };
            if let Some(vendor) = parse::sfp_vendor(&output) {
                let approved = policy.is_approved_vendor(&vendor);
                facts.sfp_vendors.push(SfpObservation {
                    port,
                    vendor,
                    approved,
                });
            }
        }

        if facts.sfp_vendors.len() != facts.qualifying_ports.len() {
            self.record.add_issue(
                IssueKind::FactCollection,
                format!(
                    "{} uplink port(s) but {} SFP vendor reading(s)",
                    facts.qualifying_ports.len(),
                    facts.sfp_vendors.len()
                ),
            );
        }
    }

    fn topology(&mut self, facts: &mut DeviceFacts, policy: &FirmwarePolicy) {
        let Some(output) = self.show(SHOW_NEIGHBORS) else {
            return;
        };
        let names = parse::neighbor_names(&output);

        match policy.classify_neighbors(&names) {
            Some(topology) => facts.topology = topology,
            None => self.record.add_issue(
                IssueKind::FactCollection,
                format!(
                    "no known neighbor among {names:?}, assuming {} topology",
                    policy.default_topology
                ),
            ),
        }
    }

    fn images(&mut self, facts: &mut DeviceFacts) {
        if let Some(output) = self.show(SHOW_RUNNING_IMAGE) {
            facts.running_image = parse::running_image(&output);
            if facts.running_image.is_none() {
                self.record
                    .add_issue(IssueKind::FactCollection, "running image not reported");
            }
        }

        if let Some(output) = self.show(SHOW_BOOT) {
            facts.boot_image = parse::boot_image(&output);
        }
    }
}
