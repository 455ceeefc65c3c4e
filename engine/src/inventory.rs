//! Subject inventory seam
//!
//! The auto-trigger poller asks an inventory for the currently attached
//! disk subjects. The engine treats enumeration as a black box; the
//! default implementation reads the platform disk list via `sysinfo`.

use std::collections::BTreeSet;

use crate::errors::EngineError;

/// Enumerates the disk subjects currently attached to this machine.
pub trait SubjectInventory: Send + Sync {
    fn enumerate(&self) -> Result<Vec<String>, EngineError>;
}

/// Default inventory backed by the platform disk list.
pub struct DiskInventory;

impl SubjectInventory for DiskInventory {
    fn enumerate(&self) -> Result<Vec<String>, EngineError> {
        let disks = sysinfo::Disks::new_with_refreshed_list();

        // sysinfo reports mounted block devices (often partitions); reduce
        // to whole-disk names and dedupe.
        let subjects: BTreeSet<String> = disks
            .list()
            .iter()
            .filter_map(|disk| {
                let name = disk.name().to_string_lossy().into_owned();
                let name = name.strip_prefix("/dev/").unwrap_or(&name);
                whole_disk_name(name)
            })
            .collect();

        Ok(subjects.into_iter().collect())
    }
}

/// Strip a partition suffix: `sda1` -> `sda`, `nvme0n1p2` -> `nvme0n1`.
fn whole_disk_name(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let base = if name.starts_with("nvme") || name.starts_with("mmcblk") {
        match name.rfind('p') {
            Some(idx) if name[idx + 1..].chars().all(|c| c.is_ascii_digit()) && idx > 0 => {
                &name[..idx]
            }
            _ => name,
        }
    } else {
        name.trim_end_matches(|c: char| c.is_ascii_digit())
    };

    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}
