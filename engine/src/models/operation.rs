//! Durable operation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal and in-flight states of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpStatus {
    /// Submitted and not yet finalized
    Running,

    /// Finished with exit code zero
    Ok,

    /// Finished with a non-zero exit code or an engine error
    Fail,

    /// Stopped by an explicit request; the underlying process may
    /// still be running (soft stop)
    Stopped,
}

impl OpStatus {
    /// Column representation in the operations table.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Running => "RUNNING",
            OpStatus::Ok => "OK",
            OpStatus::Fail => "FAIL",
            OpStatus::Stopped => "STOPPED",
        }
    }

    /// True once the status can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OpStatus::Running)
    }
}

impl std::str::FromStr for OpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(OpStatus::Running),
            "OK" => Ok(OpStatus::Ok),
            "FAIL" => Ok(OpStatus::Fail),
            "STOPPED" => Ok(OpStatus::Stopped),
            _ => Err(format!("Invalid operation status: {}", s)),
        }
    }
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked unit of work against a subject.
///
/// Rows are append-only history: created at submission, mutated in place
/// by the one runner task that owns the id, deleted only by a bulk
/// history clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Monotonically increasing id, assigned by the store at creation
    pub id: i64,

    /// Device or host name the operation acts on
    pub subject: String,

    /// Action tag, e.g. "update:full", "format:ext4", "smart:short"
    pub kind: String,

    /// Lifecycle state
    pub status: OpStatus,

    /// Coarse progress: 0 at start, 100 on success, 0 on failure
    pub progress: i64,

    /// Submission time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [OpStatus::Running, OpStatus::Ok, OpStatus::Fail, OpStatus::Stopped] {
            assert_eq!(status.as_str().parse::<OpStatus>().unwrap(), status);
        }
        assert!("PAUSED".parse::<OpStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OpStatus::Running.is_terminal());
        assert!(OpStatus::Ok.is_terminal());
        assert!(OpStatus::Fail.is_terminal());
        assert!(OpStatus::Stopped.is_terminal());
    }
}
