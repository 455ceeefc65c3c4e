//! Application state management

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::channel::TransportFactory;
use crate::errors::EngineError;
use crate::inventory::{DiskInventory, SubjectInventory};
use crate::notify::LogNotifier;
use crate::runner::Engine;
use crate::store::OperationStore;

/// Main application state
pub struct AppState {
    /// Persistent operation records
    pub store: Arc<OperationStore>,

    /// Operation engine
    pub engine: Arc<Engine>,

    /// Whether new disks are handled automatically
    pub auto_enabled: Arc<AtomicBool>,

    /// Local disk inventory
    pub inventory: Arc<dyn SubjectInventory>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, EngineError> {
        info!("Initializing application state...");

        options.storage.setup().await?;

        let store = Arc::new(OperationStore::open(&options.storage.db_file())?);

        let engine = Engine::new(
            store.clone(),
            Arc::new(TransportFactory::new(options.channel.clone())),
            Arc::new(LogNotifier),
            options.channel.clone(),
        );

        Ok(Self {
            store,
            engine,
            auto_enabled: Arc::new(AtomicBool::new(options.auto_trigger_on_start)),
            inventory: Arc::new(DiskInventory),
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        info!("Shutting down application state...");
        self.engine.shutdown().await;
        Ok(())
    }
}
