//! Auto-trigger worker
//!
//! Periodically re-enumerates local disk subjects and, while the shared
//! auto flag is set, submits the default task pair (format, then a short
//! SMART test) for every newly observed subject that is not excluded.
//! A single enumeration failure is logged and the loop continues.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::disk::{DiskTask, Filesystem, SmartMode};
use crate::inventory::SubjectInventory;
use crate::runner::Engine;

/// Auto-trigger worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Enumeration interval
    pub interval: Duration,

    /// Initial delay before the first enumeration
    pub initial_delay: Duration,

    /// Subjects never auto-triggered (e.g. the system boot device)
    pub skip_subjects: Vec<String>,

    /// Filesystem used for the default format task
    pub default_filesystem: Filesystem,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            initial_delay: Duration::from_secs(2),
            skip_subjects: vec!["mmcblk0".to_string()],
            default_filesystem: Filesystem::Ext4,
        }
    }
}

/// Run the auto-trigger worker until the shutdown signal resolves.
///
/// The first successful enumeration seeds the known set without
/// triggering anything; only subjects that appear afterwards count as
/// newly observed.
pub async fn run<S, F>(
    options: &Options,
    engine: &Arc<Engine>,
    inventory: &dyn SubjectInventory,
    auto_enabled: &AtomicBool,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Auto-trigger worker starting...");

    sleep_fn(options.initial_delay).await;

    let mut known: Option<HashSet<String>> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Auto-trigger worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        let current: HashSet<String> = match inventory.enumerate() {
            Ok(subjects) => subjects.into_iter().collect(),
            Err(e) => {
                error!("Disk enumeration failed: {}", e);
                continue;
            }
        };

        let fresh: Vec<String> = match known.as_ref() {
            Some(prev) => current.difference(prev).cloned().collect(),
            None => {
                debug!("Seeding known disk set with {} subjects", current.len());
                known = Some(current);
                continue;
            }
        };
        known = Some(current);

        if fresh.is_empty() || !auto_enabled.load(Ordering::SeqCst) {
            continue;
        }

        for device in fresh {
            if is_excluded(options, &device) {
                debug!("Skipping excluded subject {}", device);
                continue;
            }

            info!("New disk {}: submitting default tasks", device);
            if let Err(e) = engine
                .submit_disk_task(&device, DiskTask::Format(options.default_filesystem))
                .await
            {
                error!("Auto-format for {} not submitted: {}", device, e);
                continue;
            }
            if let Err(e) = engine
                .submit_disk_task(&device, DiskTask::SmartTest(SmartMode::Short))
                .await
            {
                error!("Auto SMART test for {} not submitted: {}", device, e);
            }
        }
    }
}

fn is_excluded(options: &Options, device: &str) -> bool {
    // NVMe system disks are skipped wholesale, matching the inventory
    // policy for boot devices.
    device.starts_with("nvme") || options.skip_subjects.iter().any(|s| s == device)
}
