//! Execution targets
//!
//! A target names a machine an operation acts on. Loopback addresses are
//! executed in-process; anything else goes through an SSH session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Addresses treated as the local machine.
const LOOPBACK_ADDRESSES: &[&str] = &["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// A machine to run commands against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Subject name, unique among concurrently tracked subjects.
    /// Used as the log buffer key and the `subject` column of operations.
    pub subject: String,

    /// Hostname or IP address.
    pub address: String,

    /// SSH port (ignored for loopback targets)
    #[serde(default = "default_port")]
    pub port: u16,

    /// SSH user (ignored for loopback targets)
    #[serde(default)]
    pub user: String,

    /// Private key file for SSH auth. When absent the SSH agent is used.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

impl Target {
    /// Create a target for the local machine.
    pub fn local(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            address: "localhost".to_string(),
            port: default_port(),
            user: String::new(),
            identity_file: None,
        }
    }

    /// Create a remote target with the given address and user.
    pub fn remote(
        subject: impl Into<String>,
        address: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            address: address.into(),
            port: default_port(),
            user: user.into(),
            identity_file: None,
        }
    }

    /// Whether this target resolves to the local machine.
    pub fn is_loopback(&self) -> bool {
        let addr = self.address.to_lowercase();
        LOOPBACK_ADDRESSES.contains(&addr.as_str())
    }

    /// `host:port` pair for the SSH transport.
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_detection() {
        assert!(Target::local("box").is_loopback());
        for addr in ["localhost", "LOCALHOST", "127.0.0.1", "::1", "0.0.0.0"] {
            let t = Target::remote("box", addr, "root");
            assert!(t.is_loopback(), "{addr} should be loopback");
        }
        assert!(!Target::remote("box", "192.168.1.10", "root").is_loopback());
        assert!(!Target::remote("box", "example.com", "root").is_loopback());
    }

    #[test]
    fn test_socket_address() {
        let mut t = Target::remote("web01", "10.0.0.5", "admin");
        assert_eq!(t.socket_address(), "10.0.0.5:22");
        t.port = 2222;
        assert_eq!(t.socket_address(), "10.0.0.5:2222");
    }
}
