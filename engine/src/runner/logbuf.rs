//! Per-subject log buffers
//!
//! Ephemeral, ordered, timestamped output lines for the current run of
//! each subject. Reset when a new run for the same subject starts; lost
//! on restart by design.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Registry of the current run's log lines, keyed by subject.
pub struct LogRegistry {
    buffers: RwLock<HashMap<String, Vec<String>>>,
}

impl LogRegistry {
    pub fn new() -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Start a fresh buffer for a new run, discarding the previous one.
    pub async fn begin(&self, subject: &str) {
        let mut buffers = self.buffers.write().await;
        buffers.insert(subject.to_string(), Vec::new());
    }

    /// Append a line, prefixed with a wall-clock timestamp.
    pub async fn append(&self, subject: &str, message: &str) {
        let line = format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), message);
        let mut buffers = self.buffers.write().await;
        buffers.entry(subject.to_string()).or_default().push(line);
    }

    /// Ordered snapshot of the current run's lines.
    pub async fn snapshot(&self, subject: &str) -> Vec<String> {
        let buffers = self.buffers.read().await;
        buffers.get(subject).cloned().unwrap_or_default()
    }
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}
