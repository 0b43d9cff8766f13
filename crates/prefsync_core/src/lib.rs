//! Core of cross-window preference sync.
//! This crate owns the replica, the sync protocol and the boundary contracts
//! for durable storage and the shell event bus.

pub mod bus;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod storage;
pub mod store;
pub mod sync;

pub use bus::local_hub::{HubEndpoint, LocalEventHub};
pub use bus::{BusError, BusEvent, BusHandler, BusResult, EventBus, SubscriptionId, WindowId};
pub use config::{SyncConfig, SETTINGS_CHANGED_TOPIC, SETTINGS_STORAGE_KEY};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::preferences::{PayloadError, PreferencePatch, PreferenceSet};
pub use storage::memory_store::MemoryKeyValueStore;
pub use storage::sqlite_store::SqliteKeyValueStore;
pub use storage::{KeyValueStore, StorageError, StorageResult};
pub use store::settings_store::{ObserverId, SettingsStore};
pub use sync::controller::{
    HydrationOutcome, StartupReport, SyncController, SyncError, SyncResult, SyncStats, SyncStatus,
};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
