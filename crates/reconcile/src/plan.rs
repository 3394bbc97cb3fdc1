//! Plan builder - turns device facts into a reconciliation plan
//!
//! Pure: no I/O, same facts and policy always give the same plan.

use crate::policy::FirmwarePolicy;
use crate::record::DeviceFacts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Actions computed for one device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Image the boot statement should name; `None` leaves boot alone
    pub target_boot: Option<String>,
    /// Image to transfer; `None` when nothing is missing
    pub fetch: Option<String>,
    /// MD5 the transferred image must verify against
    pub expected_checksum: Option<String>,
    /// Images outside the correct set, deleted first
    pub obsolete_images: Vec<String>,
    /// Non-image files, deleted after the images
    pub stray_files: Vec<String>,
    /// The correct image set for the device
    pub keep: BTreeSet<String>,
}

impl ReconcilePlan {
    /// Every file scheduled for deletion, in execution order
    pub fn deletions(&self) -> impl Iterator<Item = &str> {
        self.obsolete_images
            .iter()
            .chain(self.stray_files.iter())
            .map(String::as_str)
    }

    /// Whether the plan changes anything on the device
    pub fn has_changes(&self) -> bool {
        self.target_boot.is_some()
            || self.fetch.is_some()
            || !self.obsolete_images.is_empty()
            || !self.stray_files.is_empty()
    }

    /// One-line description for reports
    pub fn describe(&self) -> String {
        if !self.has_changes() {
            return "no changes".to_string();
        }

        let mut parts = Vec::new();
        if !self.obsolete_images.is_empty() {
            parts.push(format!("delete images {:?}", self.obsolete_images));
        }
        if !self.stray_files.is_empty() {
            parts.push(format!("delete strays {:?}", self.stray_files));
        }
        if let Some(fetch) = &self.fetch {
            parts.push(format!("fetch {fetch}"));
        }
        if let Some(boot) = &self.target_boot {
            parts.push(format!("boot {boot}"));
        }
        parts.join(", ")
    }
}

/// Compute the plan for a device
///
/// The correct set is the family's preferred image plus one image to fall
/// back on: the family fallback when the device already runs a known image,
/// otherwise whatever it is running now. At most one image is fetched.
pub fn build_plan(facts: &DeviceFacts, policy: &FirmwarePolicy) -> ReconcilePlan {
    let family = policy.family(facts.topology);
    let preferred = family.preferred.as_str();

    // The boot statement stands in when the running image was not reported
    let running = facts
        .running_image
        .as_deref()
        .or(facts.boot_image.as_deref());

    let (kept_fallback, wanted) = match running {
        Some(r) if r == preferred => (Some(family.fallback.as_str()), family.fallback.as_str()),
        Some(r) if r == family.fallback => (Some(r), preferred),
        Some(r) => (Some(r), preferred),
        None => (None, preferred),
    };

    let mut keep = BTreeSet::from([preferred.to_string()]);
    if let Some(fallback) = kept_fallback {
        keep.insert(fallback.to_string());
    }

    let fetch = (!facts.images.contains(wanted)).then(|| wanted.to_string());
    let expected_checksum = fetch
        .as_deref()
        .and_then(|image| policy.checksum_for(image))
        .map(str::to_string);

    // A guessed running image never unlocks deletions: the device may be
    // running something else entirely
    let obsolete_images = if facts.running_image.is_some() {
        facts
            .images
            .iter()
            .filter(|image| !keep.contains(*image))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    let target_boot =
        (facts.boot_image.as_deref() != Some(preferred)).then(|| preferred.to_string());

    ReconcilePlan {
        target_boot,
        fetch,
        expected_checksum,
        obsolete_images,
        stray_files: facts.strays.iter().cloned().collect(),
        keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Topology;

    const LEGACY_PREFERRED: &str = "asr901-universalk9-mz.154-3.S4.bin";
    const LEGACY_FALLBACK: &str = "asr901-universalk9-mz.153-3.S5.bin";
    const MODERN_PREFERRED: &str = "asr901-universalk9-mz.156-2.SP7.bin";
    const MODERN_FALLBACK: &str = "asr901-universalk9-mz.154-3.S4.bin";

    fn facts(topology: Topology, running: Option<&str>, images: &[&str]) -> DeviceFacts {
        let mut facts = DeviceFacts::new(topology);
        facts.running_image = running.map(str::to_string);
        facts.boot_image = running.map(str::to_string);
        facts.images = images.iter().map(|s| s.to_string()).collect();
        facts
    }

    #[test]
    fn test_preferred_running_with_fallback_present() {
        let policy = FirmwarePolicy::default();
        let facts = facts(
            Topology::Modern,
            Some(MODERN_PREFERRED),
            &[MODERN_PREFERRED, MODERN_FALLBACK],
        );
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.fetch, None);
        assert!(plan.obsolete_images.is_empty());
        assert_eq!(plan.target_boot, None);
        assert!(!plan.has_changes());
        assert_eq!(plan.describe(), "no changes");
    }

    #[test]
    fn test_preferred_running_fetches_missing_fallback() {
        let policy = FirmwarePolicy::default();
        let facts = facts(Topology::Legacy, Some(LEGACY_PREFERRED), &[LEGACY_PREFERRED]);
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.fetch.as_deref(), Some(LEGACY_FALLBACK));
        assert_eq!(
            plan.expected_checksum.as_deref(),
            policy.checksum_for(LEGACY_FALLBACK)
        );
        assert!(plan.deletions().next().is_none());
    }

    #[test]
    fn test_fetched_fallback_carries_table_checksum() {
        let mut policy = FirmwarePolicy::default();
        policy.checksums.insert(
            LEGACY_FALLBACK.to_string(),
            "0123456789abcdef0123456789abcdef".to_string(),
        );
        let facts = facts(Topology::Legacy, Some(LEGACY_PREFERRED), &[LEGACY_PREFERRED]);
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.fetch.as_deref(), Some(LEGACY_FALLBACK));
        assert_eq!(
            plan.expected_checksum.as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert!(plan.obsolete_images.is_empty());
        assert!(plan.stray_files.is_empty());
    }

    #[test]
    fn test_fallback_running_fetches_preferred() {
        let policy = FirmwarePolicy::default();
        let facts = facts(
            Topology::Modern,
            Some(MODERN_FALLBACK),
            &[MODERN_FALLBACK, "asr901-universalk9-mz.151-2.SNH.bin"],
        );
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.fetch.as_deref(), Some(MODERN_PREFERRED));
        assert_eq!(
            plan.expected_checksum.as_deref(),
            Some("5981f0cc5a76b85a7c6643d0d2b7470a")
        );
        assert_eq!(plan.obsolete_images, ["asr901-universalk9-mz.151-2.SNH.bin"]);
        assert_eq!(plan.target_boot.as_deref(), Some(MODERN_PREFERRED));
    }

    #[test]
    fn test_unknown_running_image_is_kept() {
        let policy = FirmwarePolicy::default();
        let unknown = "asr901-universalk9-mz.155-1.S.bin";
        let facts = facts(Topology::Modern, Some(unknown), &[unknown, MODERN_PREFERRED]);
        let plan = build_plan(&facts, &policy);

        assert_eq!(
            plan.keep,
            BTreeSet::from([MODERN_PREFERRED.to_string(), unknown.to_string()])
        );
        assert_eq!(plan.fetch, None);
        assert!(plan.obsolete_images.is_empty());
        assert_eq!(plan.target_boot.as_deref(), Some(MODERN_PREFERRED));
    }

    #[test]
    fn test_unknown_running_image_drops_family_fallback() {
        let policy = FirmwarePolicy::default();
        let unknown = "asr901-universalk9-mz.155-1.S.bin";
        let facts = facts(
            Topology::Modern,
            Some(unknown),
            &[unknown, MODERN_FALLBACK],
        );
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.fetch.as_deref(), Some(MODERN_PREFERRED));
        assert_eq!(plan.obsolete_images, [MODERN_FALLBACK]);
        assert!(!plan.obsolete_images.contains(&unknown.to_string()));
    }

    #[test]
    fn test_untracked_fetch_has_no_checksum() {
        let policy = FirmwarePolicy::default();
        let facts = facts(Topology::Modern, Some(MODERN_PREFERRED), &[MODERN_PREFERRED]);
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.fetch.as_deref(), Some(MODERN_FALLBACK));
        assert_eq!(plan.expected_checksum, None);
    }

    #[test]
    fn test_strays_always_deleted() {
        let policy = FirmwarePolicy::default();
        let mut facts = facts(
            Topology::Modern,
            Some(MODERN_PREFERRED),
            &[MODERN_PREFERRED, MODERN_FALLBACK],
        );
        facts.strays = ["crashinfo_1", "notes.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.stray_files, ["crashinfo_1", "notes.txt"]);
        assert_eq!(
            plan.deletions().collect::<Vec<_>>(),
            ["crashinfo_1", "notes.txt"]
        );
        assert!(plan.has_changes());
    }

    #[test]
    fn test_deletions_order_images_before_strays() {
        let policy = FirmwarePolicy::default();
        let mut facts = facts(
            Topology::Modern,
            Some(MODERN_PREFERRED),
            &[MODERN_PREFERRED, MODERN_FALLBACK, "old.bin"],
        );
        facts.strays.insert("a-stray".to_string());
        let plan = build_plan(&facts, &policy);

        assert_eq!(plan.deletions().collect::<Vec<_>>(), ["old.bin", "a-stray"]);
    }

    #[test]
    fn test_delete_list_never_holds_kept_images() {
        let policy = FirmwarePolicy::default();
        let all = [
            LEGACY_PREFERRED,
            LEGACY_FALLBACK,
            MODERN_PREFERRED,
            "asr901-universalk9-mz.151-2.SNH.bin",
        ];
        for topology in [Topology::Legacy, Topology::Modern] {
            for running in all.iter().copied().map(Some).chain([None]) {
                let facts = facts(topology, running, &all);
                let plan = build_plan(&facts, &policy);
                for image in &plan.obsolete_images {
                    assert!(!plan.keep.contains(image));
                    assert_ne!(Some(image), plan.target_boot.as_ref());
                    assert_ne!(Some(image.as_str()), running);
                }
            }
        }
    }

    #[test]
    fn test_boot_change_only_when_boot_differs() {
        let policy = FirmwarePolicy::default();
        let mut facts = facts(
            Topology::Modern,
            Some(MODERN_FALLBACK),
            &[MODERN_PREFERRED, MODERN_FALLBACK],
        );
        facts.boot_image = Some(MODERN_PREFERRED.to_string());
        let plan = build_plan(&facts, &policy);
        assert_eq!(plan.target_boot, None);

        facts.boot_image = None;
        let plan = build_plan(&facts, &policy);
        assert_eq!(plan.target_boot.as_deref(), Some(MODERN_PREFERRED));
    }

    #[test]
    fn test_nothing_known_running_deletes_no_images() {
        let policy = FirmwarePolicy::default();
        let mut facts = facts(Topology::Modern, None, &["x.bin", "y.bin"]);
        facts.strays.insert("junk".to_string());
        let plan = build_plan(&facts, &policy);

        assert!(plan.obsolete_images.is_empty());
        assert_eq!(plan.stray_files, ["junk"]);
        assert_eq!(plan.fetch.as_deref(), Some(MODERN_PREFERRED));
    }

    #[test]
    fn test_boot_statement_alone_deletes_no_images() {
        let policy = FirmwarePolicy::default();
        let maybe_running = "asr901-universalk9-mz.155-1.S.bin";
        let mut facts = facts(Topology::Modern, None, &[maybe_running, MODERN_FALLBACK]);
        facts.boot_image = Some(MODERN_FALLBACK.to_string());
        let plan = build_plan(&facts, &policy);

        assert!(plan.obsolete_images.is_empty(), "{:?}", plan.obsolete_images);
        assert!(plan.keep.contains(MODERN_FALLBACK));
        assert_eq!(plan.fetch.as_deref(), Some(MODERN_PREFERRED));
        assert_eq!(plan.target_boot.as_deref(), Some(MODERN_PREFERRED));
    }
}
