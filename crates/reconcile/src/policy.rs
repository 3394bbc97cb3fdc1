//! Firmware policy table
//!
//! The table is data, not code: it is loaded from configuration and only
//! falls back to the built-in revision below when nothing is configured.

use crate::error::PolicyError;
use crate::record::Topology;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Image pair for one firmware family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyPolicy {
    /// Image every device of the family should boot
    pub preferred: String,
    /// Known-good image kept next to the preferred one
    pub fallback: String,
}

/// Versioned decision table for the device family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwarePolicy {
    /// Free-form revision tag, logged with every run
    pub revision: String,
    pub legacy: FamilyPolicy,
    pub modern: FamilyPolicy,
    /// Topology assumed when no neighbor matches
    pub default_topology: Topology,
    /// Neighbor name fragments that mark a modern uplink
    pub modern_neighbors: Vec<String>,
    /// Neighbor name fragments that mark a legacy uplink
    pub legacy_neighbors: Vec<String>,
    /// Expected MD5 per image filename
    pub checksums: BTreeMap<String, String>,
    /// Regex a flash entry must match to count as an image
    pub image_pattern: String,
    /// Fragments identifying license files, never deleted
    pub license_markers: Vec<String>,
    /// Interface description fragments marking uplink ports
    pub uplink_markers: Vec<String>,
    /// SFP vendor fragments accepted for transfers
    pub approved_vendors: Vec<String>,
    /// URL prefix images are copied from
    pub transfer_source: String,
    /// Free flash bytes required before a transfer
    pub min_free_bytes: u64,
}

impl Default for FirmwarePolicy {
    fn default() -> Self {
        Self {
            revision: "asr901-2024.1".to_string(),
            legacy: FamilyPolicy {
                preferred: "asr901-universalk9-mz.154-3.S4.bin".to_string(),
                fallback: "asr901-universalk9-mz.153-3.S5.bin".to_string(),
            },
            modern: FamilyPolicy {
                preferred: "asr901-universalk9-mz.156-2.SP7.bin".to_string(),
                fallback: "asr901-universalk9-mz.154-3.S4.bin".to_string(),
            },
            default_topology: Topology::Modern,
            modern_neighbors: vec!["ASR-920".to_string(), "NCS".to_string()],
            legacy_neighbors: vec!["ME-3600".to_string(), "ME3600".to_string()],
            checksums: BTreeMap::from([(
                "asr901-universalk9-mz.156-2.SP7.bin".to_string(),
                "5981f0cc5a76b85a7c6643d0d2b7470a".to_string(),
            )]),
            image_pattern: r"\.bin$".to_string(),
            license_markers: vec![".lic".to_string(), "license".to_string()],
            uplink_markers: vec!["UPLINK".to_string(), "pagg".to_string()],
            approved_vendors: vec!["CISCO".to_string()],
            transfer_source: "ftp://192.0.2.10/firmware".to_string(),
            min_free_bytes: 46_000_000,
        }
    }
}

impl FirmwarePolicy {
    /// Image pair for a topology
    pub fn family(&self, topology: Topology) -> &FamilyPolicy {
        match topology {
            Topology::Legacy => &self.legacy,
            Topology::Modern => &self.modern,
        }
    }

    /// Expected checksum for an image, if the table tracks it
    pub fn checksum_for(&self, image: &str) -> Option<&str> {
        self.checksums.get(image).map(String::as_str)
    }

    /// Compile the image pattern
    pub fn image_regex(&self) -> Result<Regex, PolicyError> {
        Regex::new(&self.image_pattern).map_err(|source| PolicyError::InvalidPattern {
            pattern: self.image_pattern.clone(),
            source,
        })
    }

    /// Whether a vendor string passes the approved-vendor list
    pub fn is_approved_vendor(&self, vendor: &str) -> bool {
        let vendor = vendor.to_uppercase();
        self.approved_vendors
            .iter()
            .any(|v| vendor.contains(&v.to_uppercase()))
    }

    /// Classify a set of advertised neighbor names
    ///
    /// Returns `None` when no name matches either list.
    pub fn classify_neighbors<S: AsRef<str>>(&self, names: &[S]) -> Option<Topology> {
        let matches = |fragments: &[String]| {
            names.iter().any(|name| {
                let name = name.as_ref().to_uppercase();
                fragments.iter().any(|f| name.contains(&f.to_uppercase()))
            })
        };

        if matches(&self.modern_neighbors) {
            Some(Topology::Modern)
        } else if matches(&self.legacy_neighbors) {
            Some(Topology::Legacy)
        } else {
            None
        }
    }

    /// Full source URL for an image
    pub fn transfer_url(&self, image: &str) -> String {
        format!("{}/{}", self.transfer_source.trim_end_matches('/'), image)
    }

    /// Validate the table
    pub fn validate(&self) -> Result<(), PolicyError> {
        let image = self.image_regex()?;

        for (topology, family) in [
            (Topology::Legacy, &self.legacy),
            (Topology::Modern, &self.modern),
        ] {
            if family.preferred == family.fallback {
                return Err(PolicyError::Invalid(format!(
                    "{topology} family uses '{}' as both preferred and fallback",
                    family.preferred
                )));
            }
            for name in [&family.preferred, &family.fallback] {
                if !image.is_match(name) {
                    return Err(PolicyError::Invalid(format!(
                        "{topology} image '{name}' does not match image pattern '{}'",
                        self.image_pattern
                    )));
                }
            }
        }

        for (name, sum) in &self.checksums {
            if sum.len() != 32 || !sum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(PolicyError::Invalid(format!(
                    "checksum for '{name}' is not an MD5 digest: '{sum}'"
                )));
            }
        }

        if self.transfer_source.trim().is_empty() {
            return Err(PolicyError::Invalid("transfer_source is empty".to_string()));
        }

        Ok(())
    }
}
