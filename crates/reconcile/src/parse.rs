//! Parsers for captured CLI text
//!
//! One function per fact type. Each takes the raw response of a single
//! command and never fails: unmatched input yields an empty result.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// `    2  -rw-    41345236  Mar 1 2020 00:10:21 +00:00  asr901.bin`
static FLASH_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\s+(?P<perm>[-a-zA-Z]{3,10})\s+\d+\s+.*?(?P<name>\S+)\s*$")
        .expect("flash entry pattern is valid")
});

/// `65536000 bytes total (19387392 bytes free)`
static FREE_BYTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(?P<free>\d+)\s+bytes\s+free\s*\)").expect("free bytes pattern is valid")
});

/// `System image file is "flash:asr901-universalk9-mz.154-3.S4.bin"`
static SYSTEM_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"System image file is\s+"(?P<path>[^"]+)""#)
        .expect("system image pattern is valid")
});

/// Flash entries sorted by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashListing {
    pub images: BTreeSet<String>,
    pub strays: BTreeSet<String>,
    /// License files, kept
    pub protected: BTreeSet<String>,
    pub free_bytes: Option<u64>,
}

/// Splits flash entries into images, license files and strays
#[derive(Debug, Clone)]
pub struct FlashClassifier {
    image: Regex,
    license_markers: Vec<String>,
}

impl FlashClassifier {
    pub fn new(image: Regex, license_markers: Vec<String>) -> Self {
        Self {
            image,
            license_markers: license_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    pub fn is_image(&self, name: &str) -> bool {
        self.image.is_match(name)
    }

    pub fn is_license(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.license_markers.iter().any(|m| name.contains(m))
    }
}

/// Strip the command echo and the trailing prompt from a raw response
pub fn response_body(output: &str, command: &str) -> String {
    let mut lines: Vec<&str> = output.lines().collect();

    let command = command.trim();
    if !command.is_empty()
        && let Some(pos) = lines
            .iter()
            .take(3)
            .position(|l| l.trim_end().ends_with(command))
    {
        lines.drain(..=pos);
    }

    if lines.last().is_some_and(|l| is_prompt_line(l)) {
        lines.pop();
    }

    lines.join("\n")
}

fn is_prompt_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && !line.contains(char::is_whitespace)
        && (line.ends_with('#') || line.ends_with('>'))
}

/// Parse `dir flash:` output
pub fn flash_listing(output: &str, classifier: &FlashClassifier) -> FlashListing {
    let mut listing = FlashListing {
        free_bytes: free_bytes(output),
        ..Default::default()
    };

    for line in output.lines() {
        let Some(caps) = FLASH_ENTRY.captures(line) else {
            continue;
        };
        if caps["perm"].starts_with('d') {
            continue;
        }

        let name = strip_device_prefix(&caps["name"]).to_string();
        if classifier.is_image(&name) {
            listing.images.insert(name);
        } else if classifier.is_license(&name) {
            listing.protected.insert(name);
        } else {
            listing.strays.insert(name);
        }
    }

    listing
}

/// Parse the `(N bytes free)` figure from a flash listing
pub fn free_bytes(output: &str) -> Option<u64> {
    FREE_BYTES
        .captures(output)
        .and_then(|caps| caps["free"].parse().ok())
}

/// Uplink ports from `show interfaces description`
///
/// A port qualifies when its row carries one of `markers` and it is not a
/// port-channel.
pub fn uplink_ports(output: &str, markers: &[String]) -> Vec<String> {
    output
        .lines()
        .filter(|line| markers.iter().any(|m| line.contains(m.as_str())))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|port| !is_port_channel(port) && !port.eq_ignore_ascii_case("interface"))
        .map(str::to_string)
        .collect()
}

fn is_port_channel(port: &str) -> bool {
    let lower = port.to_ascii_lowercase();
    lower.starts_with("port-channel")
        || lower
            .strip_prefix("po")
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
}

/// Vendor name from `show controllers <port> | include vendor_name`
pub fn sfp_vendor(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|l| l.contains("vendor_name"))
        .filter_map(|l| l.split_once(['=', ':']))
        .map(|(_, value)| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Neighbor device IDs and platforms from `show cdp neighbors detail`
pub fn neighbor_names(output: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in output.lines().map(str::trim) {
        if let Some(id) = line.strip_prefix("Device ID:") {
            names.push(id.trim().to_string());
        } else if let Some(platform) = line.strip_prefix("Platform:") {
            let platform = platform.split(',').next().unwrap_or_default().trim();
            names.push(platform.to_string());
        }
    }
    names.retain(|n| !n.is_empty());
    names
}

/// Image the device booted from, from `show version`
pub fn running_image(output: &str) -> Option<String> {
    let caps = SYSTEM_IMAGE.captures(output)?;
    let name = basename(&caps["path"]);
    (!name.is_empty()).then(|| name.to_string())
}

/// Image named by the first `boot system` statement
pub fn boot_image(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("boot system"))
        .and_then(|l| l.split_whitespace().last())
        .map(basename)
        .filter(|name| !name.is_empty() && *name != "system" && *name != "flash")
        .map(str::to_string)
}

/// Whether a verification response contains the expected digest
pub fn contains_checksum(output: &str, expected: &str) -> bool {
    !expected.is_empty() && output.contains(expected)
}

fn strip_device_prefix(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, rest)| rest)
}

fn basename(path: &str) -> &str {
    let path = strip_device_prefix(path);
    path.rsplit_once('/').map_or(path, |(_, rest)| rest)
}
