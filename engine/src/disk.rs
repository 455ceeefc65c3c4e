//! Local disk maintenance tasks
//!
//! Device names are interpolated into shell commands, so they pass a
//! strict allow-list before any operation row is created or process
//! spawned. The commands themselves are assembled from closed enums only.

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Allow-list for device names: alphanumerics, hyphen, underscore, at most
/// 255 characters. Anything else is rejected outright.
pub fn validate_device_name(device: &str) -> Result<&str, EngineError> {
    let valid = !device.is_empty()
        && device.len() <= 255
        && device
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(device)
    } else {
        Err(EngineError::InvalidSubject(format!(
            "invalid device name: {device:?}"
        )))
    }
}

/// Filesystems supported for formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Ext4,
    Xfs,
    Fat32,
}

impl Filesystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Filesystem::Ext4 => "ext4",
            Filesystem::Xfs => "xfs",
            Filesystem::Fat32 => "fat32",
        }
    }

    fn mkfs_invocation(&self) -> &'static str {
        match self {
            Filesystem::Ext4 => "mkfs.ext4 -F",
            Filesystem::Xfs => "mkfs.xfs -f",
            Filesystem::Fat32 => "mkfs.vfat -F 32",
        }
    }
}

impl std::str::FromStr for Filesystem {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ext4" => Ok(Filesystem::Ext4),
            "xfs" => Ok(Filesystem::Xfs),
            "fat32" => Ok(Filesystem::Fat32),
            _ => Err(EngineError::ConfigError(format!("unknown filesystem: {s}"))),
        }
    }
}

/// SMART self-test modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmartMode {
    Short,
    Long,
}

impl SmartMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmartMode::Short => "short",
            SmartMode::Long => "long",
        }
    }
}

/// A local-only, OS-independent device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskTask {
    /// Wipe signatures and create a fresh filesystem
    Format(Filesystem),

    /// Trigger a SMART self-test
    SmartTest(SmartMode),
}

impl DiskTask {
    /// Action tag stored on the operation row, e.g. `format:ext4`.
    pub fn kind(&self) -> String {
        match self {
            DiskTask::Format(fs) => format!("format:{}", fs.as_str()),
            DiskTask::SmartTest(mode) => format!("smart:{}", mode.as_str()),
        }
    }

    /// Parse an action tag back into a task.
    pub fn parse(kind: &str) -> Result<Self, EngineError> {
        match kind.split_once(':') {
            Some(("format", fs)) => Ok(DiskTask::Format(fs.parse()?)),
            Some(("smart", "short")) => Ok(DiskTask::SmartTest(SmartMode::Short)),
            Some(("smart", "long")) => Ok(DiskTask::SmartTest(SmartMode::Long)),
            _ => Err(EngineError::ConfigError(format!(
                "unknown disk task kind: {kind}"
            ))),
        }
    }

    /// Build the shell command for an already-validated device name.
    pub fn command(&self, device: &str) -> String {
        match self {
            DiskTask::Format(fs) => format!(
                "wipefs -a /dev/{device} && {} /dev/{device}",
                fs.mkfs_invocation()
            ),
            DiskTask::SmartTest(mode) => {
                format!("smartctl -t {} /dev/{device}", mode.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_device_names() {
        for name in ["sda", "sdb1", "nvme0n1", "mmcblk0", "my-disk_2"] {
            assert!(validate_device_name(name).is_ok(), "{name} should pass");
        }
    }

    #[test]
    fn test_rejected_device_names() {
        let bad = [
            "",
            "../etc",
            "sda; rm -rf /",
            "sda sdb",
            "/dev/sda",
            "sda$(reboot)",
        ];
        for name in bad {
            assert!(
                matches!(validate_device_name(name), Err(EngineError::InvalidSubject(_))),
                "{name:?} should be rejected"
            );
        }

        let too_long = "a".repeat(256);
        assert!(validate_device_name(&too_long).is_err());
        let just_fits = "a".repeat(255);
        assert!(validate_device_name(&just_fits).is_ok());
    }

    #[test]
    fn test_format_command() {
        let cmd = DiskTask::Format(Filesystem::Ext4).command("sdb");
        assert_eq!(cmd, "wipefs -a /dev/sdb && mkfs.ext4 -F /dev/sdb");

        let cmd = DiskTask::Format(Filesystem::Fat32).command("sdc");
        assert!(cmd.contains("mkfs.vfat -F 32 /dev/sdc"));
    }

    #[test]
    fn test_smart_command() {
        let cmd = DiskTask::SmartTest(SmartMode::Short).command("sda");
        assert_eq!(cmd, "smartctl -t short /dev/sda");
    }

    #[test]
    fn test_kind_round_trip() {
        let tasks = [
            DiskTask::Format(Filesystem::Ext4),
            DiskTask::Format(Filesystem::Xfs),
            DiskTask::SmartTest(SmartMode::Short),
            DiskTask::SmartTest(SmartMode::Long),
        ];
        for task in tasks {
            assert_eq!(DiskTask::parse(&task.kind()).unwrap(), task);
        }
        assert!(DiskTask::parse("update:full").is_err());
        assert!(DiskTask::parse("format:ntfs").is_err());
    }
}
