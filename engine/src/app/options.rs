//! Application configuration options

use std::time::Duration;

use crate::channel::ChannelOptions;
use crate::storage::layout::StorageLayout;
use crate::workers::auto_trigger;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Channel timeouts
    pub channel: ChannelOptions,

    /// Enable the auto-trigger worker
    pub enable_auto_trigger: bool,

    /// Start with automatic disk handling switched on
    pub auto_trigger_on_start: bool,

    /// Auto-trigger worker options
    pub auto_trigger: auto_trigger::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::default(),
            channel: ChannelOptions::default(),
            enable_auto_trigger: true,
            auto_trigger_on_start: false,
            auto_trigger: auto_trigger::Options::default(),
        }
    }
}

/// Lifecycle options for the engine process
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
