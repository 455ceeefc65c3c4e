//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::logs::LogLevel;
use crate::models::Target;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// SSH connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// OS probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Enable the auto-trigger worker
    #[serde(default = "default_true")]
    pub enable_auto_trigger: bool,

    /// Start with automatic disk handling switched on
    #[serde(default)]
    pub auto_trigger_on_start: bool,

    /// Auto-trigger configuration
    #[serde(default)]
    pub auto_trigger: AutoTriggerSettings,

    /// SSH defaults for remote targets
    #[serde(default)]
    pub ssh: SshSettings,
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    15
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            enable_auto_trigger: true,
            auto_trigger_on_start: false,
            auto_trigger: AutoTriggerSettings::default(),
            ssh: SshSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write settings to a JSON file, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}

/// Auto-trigger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTriggerSettings {
    /// Enumeration interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Subjects never auto-triggered
    #[serde(default = "default_skip_subjects")]
    pub skip_subjects: Vec<String>,

    /// Filesystem used for the default format task
    #[serde(default = "default_filesystem")]
    pub default_filesystem: String,
}

fn default_interval() -> u64 {
    10
}

fn default_skip_subjects() -> Vec<String> {
    vec!["mmcblk0".to_string()]
}

fn default_filesystem() -> String {
    "ext4".to_string()
}

impl Default for AutoTriggerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            skip_subjects: default_skip_subjects(),
            default_filesystem: default_filesystem(),
        }
    }
}

/// SSH defaults for remote targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Default remote user
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Default SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Optional path to a private key. When absent, the SSH agent is used.
    #[serde(default)]
    pub identity_file: Option<String>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

impl SshSettings {
    /// Build a remote target carrying these defaults.
    pub fn target(&self, subject: impl Into<String>, address: impl Into<String>) -> Target {
        Target {
            subject: subject.into(),
            address: address.into(),
            port: self.port,
            user: self.user.clone(),
            identity_file: self.identity_file.as_ref().map(PathBuf::from),
        }
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            identity_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.probe_timeout_secs, 15);
        assert!(settings.enable_auto_trigger);
        assert!(!settings.auto_trigger_on_start);
        assert_eq!(settings.auto_trigger.interval_secs, 10);
        assert_eq!(settings.auto_trigger.skip_subjects, vec!["mmcblk0"]);
        assert_eq!(settings.auto_trigger.default_filesystem, "ext4");
        assert_eq!(settings.ssh.port, 22);
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json"))
            .await
            .unwrap();
        assert_eq!(settings.ssh.user, "root");
    }

    #[test]
    fn test_ssh_defaults_shape_remote_targets() {
        let ssh = SshSettings {
            user: "ops".to_string(),
            port: 2222,
            identity_file: Some("/home/ops/.ssh/id_ed25519".to_string()),
        };

        let target = ssh.target("web01", "192.0.2.10");
        assert_eq!(target.subject, "web01");
        assert_eq!(target.socket_address(), "192.0.2.10:2222");
        assert_eq!(target.user, "ops");
        assert_eq!(
            target.identity_file.as_deref(),
            Some(Path::new("/home/ops/.ssh/id_ed25519"))
        );
        assert!(!target.is_loopback());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.auto_trigger.interval_secs = 3;
        settings.save(&path).await.unwrap();

        let loaded = Settings::load(&path).await.unwrap();
        assert_eq!(loaded.auto_trigger.interval_secs, 3);
    }
}
