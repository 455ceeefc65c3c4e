//! fleetpatchd - Entry Point
//!
//! A daemon for orchestrating system updates across a fleet of hosts and
//! maintenance tasks on local disks.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use fleetpatchd::app::options::AppOptions;
use fleetpatchd::app::run::run;
use fleetpatchd::channel::ChannelOptions;
use fleetpatchd::disk::Filesystem;
use fleetpatchd::logs::init_logging;
use fleetpatchd::storage::layout::StorageLayout;
use fleetpatchd::storage::settings::Settings;
use fleetpatchd::utils::version_info;
use fleetpatchd::workers::auto_trigger;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    // Retrieve the settings file
    let layout = match cli_args.get("data-dir") {
        Some(dir) => StorageLayout::new(PathBuf::from(dir)),
        None => StorageLayout::default(),
    };
    let settings_path = match cli_args.get("settings") {
        Some(path) => PathBuf::from(path),
        None => layout.settings_file(),
    };
    let settings = match Settings::load(&settings_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {:?}: {}", settings_path, e);
            return;
        }
    };

    // Initialize logging
    if let Err(e) = init_logging(&settings.log_level) {
        println!("Failed to initialize logging: {e}");
    }

    let default_filesystem = match settings.auto_trigger.default_filesystem.parse::<Filesystem>() {
        Ok(fs) => fs,
        Err(e) => {
            warn!("{}; falling back to ext4", e);
            Filesystem::Ext4
        }
    };

    let options = AppOptions {
        storage: layout,
        channel: ChannelOptions {
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            probe_timeout: Duration::from_secs(settings.probe_timeout_secs),
        },
        enable_auto_trigger: settings.enable_auto_trigger,
        auto_trigger_on_start: settings.auto_trigger_on_start,
        auto_trigger: auto_trigger::Options {
            interval: Duration::from_secs(settings.auto_trigger.interval_secs),
            skip_subjects: settings.auto_trigger.skip_subjects.clone(),
            default_filesystem,
            ..Default::default()
        },
        ..Default::default()
    };

    info!("Running fleetpatchd with options: {:?}", options);
    let result = run(version.version, options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the engine: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
