//! Window-level preference synchronization.
//!
//! # Responsibility
//! - Hydrate a `SettingsStore` from durable storage at startup.
//! - Persist and broadcast every local change.
//! - Apply sibling broadcasts without re-broadcasting them.
//!
//! # Invariants
//! - The bus subscription is active before the outbound watcher exists.
//! - Inbound state enters the store only through `apply_remote`, so it can
//!   never reach the outbound watcher (no echo, no O(N²) storms).
//! - Outbound writes/publishes read the store's current value at call time.
//! - A window applies its own broadcasts like any sibling's, so every replica
//!   replays the same bus order and ends on the last delivered state.
//! - An own broadcast that a newer local change has superseded is skipped,
//!   including when that newer change never reached the bus.
//! - Storage, bus and payload failures are logged and counted, never
//!   propagated; only lifecycle misuse returns `SyncError`.

use crate::bus::{BusEvent, EventBus, SubscriptionId, WindowId};
use crate::config::SyncConfig;
use crate::model::preferences::{PreferencePatch, PreferenceSet};
use crate::storage::KeyValueStore;
use crate::store::settings_store::{ObserverId, SettingsStore};
use log::{debug, info, warn};
use serde_json::Value;
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::{Rc, Weak};

pub type SyncResult<T> = Result<T, SyncError>;

/// Controller lifecycle and configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    InvalidConfig(String),
    AlreadyInitialized,
    TornDown,
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(message) => write!(f, "invalid sync config: {message}"),
            Self::AlreadyInitialized => write!(f, "sync controller already initialized"),
            Self::TornDown => write!(f, "sync controller was torn down"),
        }
    }
}

impl Error for SyncError {}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Constructed, `initialize` not called yet.
    Idle,
    /// Hydrated and wired; the store is ready for UI binding.
    Ready,
    /// `teardown` ran; no further sync happens.
    TornDown,
}

/// Result of the startup storage read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// Stored value was applied.
    Loaded,
    /// Nothing stored yet; defaults kept.
    Absent,
    /// Stored value did not decode; defaults kept.
    Malformed,
    /// Storage read failed; defaults kept.
    StorageUnavailable,
}

/// Summary of `SyncController::initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub hydration: HydrationOutcome,
    /// `false` when the bus refused the subscription; the window then runs
    /// local-only until re-created.
    pub bus_subscribed: bool,
    /// Store snapshot right after hydration.
    pub settings: PreferenceSet,
}

/// Per-controller counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub persisted: u64,
    pub published: u64,
    pub inbound_applied: u64,
    pub inbound_rejected: u64,
    pub storage_failures: u64,
    pub bus_failures: u64,
    /// Own broadcasts dropped because a newer local change superseded them.
    pub stale_echoes_skipped: u64,
}

/// State shared between the controller and its store/bus callbacks.
///
/// Callbacks hold a `Weak` to it, so dropping the controller silences them
/// even if the host never called `teardown`.
struct SyncLink {
    store: SettingsStore,
    storage: Rc<dyn KeyValueStore>,
    bus: Rc<dyn EventBus>,
    config: SyncConfig,
    window: WindowId,
    /// Accepted own publishes not yet delivered back to this window.
    own_in_flight: Cell<u64>,
    /// Set when a local change failed to publish; cleared by the next
    /// successful publish.
    ahead_of_bus: Cell<bool>,
    stats: Cell<SyncStats>,
}

impl SyncLink {
    fn bump(&self, update: impl FnOnce(&mut SyncStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    fn hydrate(&self) -> HydrationOutcome {
        let raw = match self.storage.read(&self.config.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!(
                    "event=sync_hydrate module=sync status=absent key={}",
                    self.config.storage_key
                );
                return HydrationOutcome::Absent;
            }
            Err(err) => {
                self.bump(|stats| stats.storage_failures += 1);
                warn!(
                    "event=sync_hydrate module=sync status=error key={} error={}",
                    self.config.storage_key, err
                );
                return HydrationOutcome::StorageUnavailable;
            }
        };

        match PreferencePatch::from_json(&raw) {
            Ok(patch) => {
                self.store.apply_remote(patch);
                let settings = self.store.get();
                info!(
                    "event=sync_hydrate module=sync status=ok key={} font_size={} word_wrap={}",
                    self.config.storage_key, settings.font_size, settings.word_wrap
                );
                HydrationOutcome::Loaded
            }
            Err(err) => {
                warn!(
                    "event=sync_hydrate module=sync status=malformed key={} error={}",
                    self.config.storage_key, err
                );
                HydrationOutcome::Malformed
            }
        }
    }

    fn encode_current(&self) -> Option<Value> {
        match self.store.get().to_value() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("event=sync_encode module=sync status=error error={}", err);
                None
            }
        }
    }

    /// Writes the store's current state to durable storage.
    fn persist_current(&self) {
        let Some(encoded) = self.encode_current() else {
            self.bump(|stats| stats.storage_failures += 1);
            return;
        };
        match self.storage.write(&self.config.storage_key, &encoded.to_string()) {
            Ok(()) => self.bump(|stats| stats.persisted += 1),
            Err(err) => {
                self.bump(|stats| stats.storage_failures += 1);
                warn!(
                    "event=sync_persist module=sync status=error key={} error={}",
                    self.config.storage_key, err
                );
            }
        }
    }

    /// Broadcasts the store's current state as a full set.
    fn publish_current(&self) {
        let Some(payload) = self.encode_current() else {
            self.ahead_of_bus.set(true);
            self.bump(|stats| stats.bus_failures += 1);
            return;
        };
        match self.bus.publish(&self.config.topic, payload) {
            Ok(()) => {
                self.own_in_flight.set(self.own_in_flight.get() + 1);
                self.ahead_of_bus.set(false);
                self.bump(|stats| stats.published += 1);
                debug!(
                    "event=sync_publish module=sync status=ok topic={}",
                    self.config.topic
                );
            }
            Err(err) => {
                self.ahead_of_bus.set(true);
                self.bump(|stats| stats.bus_failures += 1);
                warn!(
                    "event=sync_publish module=sync status=error topic={} error={}",
                    self.config.topic, err
                );
            }
        }
    }

    fn handle_local_change(&self) {
        self.persist_current();
        self.publish_current();
    }

    /// Consumes one own echo and reports whether local state has moved past it.
    ///
    /// Own events come back in publish order, so an echo is current only when
    /// it is the last one in flight and no later publish failed.
    fn is_stale_echo(&self) -> bool {
        let remaining = self.own_in_flight.get().saturating_sub(1);
        self.own_in_flight.set(remaining);
        remaining > 0 || self.ahead_of_bus.get()
    }

    fn handle_inbound(&self, event: &BusEvent) {
        if event.source == self.window && self.is_stale_echo() {
            self.bump(|stats| stats.stale_echoes_skipped += 1);
            debug!(
                "event=sync_inbound module=sync status=stale_echo topic={} source={}",
                event.topic, event.source
            );
            return;
        }

        let patch = match PreferencePatch::from_value(&event.payload) {
            Ok(patch) => patch,
            Err(err) => {
                self.bump(|stats| stats.inbound_rejected += 1);
                warn!(
                    "event=sync_inbound module=sync status=rejected topic={} source={} error={}",
                    event.topic, event.source, err
                );
                return;
            }
        };

        let changed = self.store.apply_remote(patch);
        self.bump(|stats| stats.inbound_applied += 1);
        debug!(
            "event=sync_inbound module=sync status=ok source={} changed={}",
            event.source, changed
        );
        self.persist_current();
    }
}

/// Bridges one window's `SettingsStore` to durable storage and the bus.
pub struct SyncController {
    link: Rc<SyncLink>,
    status: SyncStatus,
    subscription: Option<SubscriptionId>,
    watcher: Option<ObserverId>,
}

impl SyncController {
    /// Creates a controller using the default key and topic, which always
    /// pass `SyncConfig::validate`.
    pub fn new(
        store: SettingsStore,
        storage: Rc<dyn KeyValueStore>,
        bus: Rc<dyn EventBus>,
    ) -> Self {
        Self::from_parts(store, storage, bus, SyncConfig::default())
    }

    /// Creates a controller with explicit names.
    ///
    /// # Errors
    /// - `SyncError::InvalidConfig` when `config.validate()` fails.
    pub fn with_config(
        store: SettingsStore,
        storage: Rc<dyn KeyValueStore>,
        bus: Rc<dyn EventBus>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        config.validate().map_err(SyncError::InvalidConfig)?;
        Ok(Self::from_parts(store, storage, bus, config))
    }

    fn from_parts(
        store: SettingsStore,
        storage: Rc<dyn KeyValueStore>,
        bus: Rc<dyn EventBus>,
        config: SyncConfig,
    ) -> Self {
        let window = bus.window_id();
        Self {
            link: Rc::new(SyncLink {
                store,
                storage,
                bus,
                config,
                window,
                own_in_flight: Cell::new(0),
                ahead_of_bus: Cell::new(false),
                stats: Cell::new(SyncStats::default()),
            }),
            status: SyncStatus::Idle,
            subscription: None,
            watcher: None,
        }
    }

    /// Runs the startup sequence: hydrate, subscribe, then watch.
    ///
    /// # Errors
    /// - `AlreadyInitialized` / `TornDown` on repeated lifecycle calls.
    ///   I/O failures never error; they are described in the report.
    pub fn initialize(&mut self) -> SyncResult<StartupReport> {
        match self.status {
            SyncStatus::Idle => {}
            SyncStatus::Ready => return Err(SyncError::AlreadyInitialized),
            SyncStatus::TornDown => return Err(SyncError::TornDown),
        }

        let hydration = self.link.hydrate();

        let weak = Rc::downgrade(&self.link);
        let subscription = self.link.bus.subscribe(
            &self.link.config.topic,
            Rc::new(move |event: &BusEvent| {
                if let Some(link) = weak.upgrade() {
                    link.handle_inbound(event);
                }
            }),
        );
        let bus_subscribed = match subscription {
            Ok(id) => {
                self.subscription = Some(id);
                true
            }
            Err(err) => {
                self.link.bump(|stats| stats.bus_failures += 1);
                warn!(
                    "event=sync_subscribe module=sync status=error topic={} error={}",
                    self.link.config.topic, err
                );
                false
            }
        };

        let weak: Weak<SyncLink> = Rc::downgrade(&self.link);
        self.watcher = Some(self.link.store.on_local_change(move |_| {
            if let Some(link) = weak.upgrade() {
                link.handle_local_change();
            }
        }));

        self.status = SyncStatus::Ready;
        let report = StartupReport {
            hydration,
            bus_subscribed,
            settings: self.link.store.get(),
        };
        info!(
            "event=sync_init module=sync status=ok topic={} hydration={:?} bus_subscribed={}",
            self.link.config.topic, report.hydration, report.bus_subscribed
        );
        Ok(report)
    }

    /// Stops both sync directions. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.status == SyncStatus::TornDown {
            return;
        }
        if let Some(id) = self.watcher.take() {
            self.link.store.remove_observer(id);
        }
        if let Some(id) = self.subscription.take() {
            self.link.bus.unsubscribe(id);
        }
        self.status = SyncStatus::TornDown;
        info!(
            "event=sync_teardown module=sync status=ok topic={}",
            self.link.config.topic
        );
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == SyncStatus::Ready
    }

    pub fn stats(&self) -> SyncStats {
        self.link.stats.get()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.link.config
    }

    /// The replica this controller keeps in sync.
    pub fn store(&self) -> &SettingsStore {
        &self.link.store
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::{HydrationOutcome, SyncController, SyncError, SyncStatus};
    use crate::bus::local_hub::{HubEndpoint, LocalEventHub};
    use crate::bus::EventBus;
    use crate::config::SyncConfig;
    use crate::model::preferences::{PreferencePatch, PreferenceSet};
    use crate::storage::memory_store::MemoryKeyValueStore;
    use crate::store::settings_store::SettingsStore;
    use serde_json::json;
    use std::rc::Rc;

    fn window(
        hub: &LocalEventHub,
        storage: &MemoryKeyValueStore,
        label: &str,
    ) -> (SettingsStore, HubEndpoint, SyncController) {
        let store = SettingsStore::new();
        let endpoint = hub.endpoint(label);
        let controller = SyncController::new(
            store.clone(),
            Rc::new(storage.clone()),
            Rc::new(endpoint.clone()),
        );
        (store, endpoint, controller)
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::new();
        let (_, _, mut controller) = window(&hub, &storage, "main");

        controller.initialize().unwrap();
        assert_eq!(controller.initialize(), Err(SyncError::AlreadyInitialized));
        controller.teardown();
        assert_eq!(controller.initialize(), Err(SyncError::TornDown));
    }

    #[test]
    fn hydration_does_not_publish_or_rewrite_storage() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::with_entry(
            "editor-settings",
            r#"{"fontSize":20,"wordWrap":true}"#,
        );
        let (store, endpoint, mut controller) = window(&hub, &storage, "main");

        let report = controller.initialize().unwrap();
        assert_eq!(report.hydration, HydrationOutcome::Loaded);
        assert_eq!(
            store.get(),
            PreferenceSet {
                font_size: 20,
                word_wrap: true
            }
        );
        assert_eq!(hub.published_by(endpoint.window_id()), 0);
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn local_change_persists_then_publishes_once() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::new();
        let (store, endpoint, mut controller) = window(&hub, &storage, "main");
        controller.initialize().unwrap();

        store.set_font_size(18);
        hub.dispatch_pending();

        assert_eq!(hub.published_by(endpoint.window_id()), 1);
        assert_eq!(
            storage.peek("editor-settings").as_deref(),
            Some(r#"{"fontSize":18,"wordWrap":false}"#)
        );
        let stats = controller.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.inbound_applied, 1);
        assert_eq!(stats.persisted, 2);
        assert_eq!(store.font_size(), 18);
    }

    #[test]
    fn malformed_inbound_payload_is_rejected_quietly() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::new();
        let (store, _, mut controller) = window(&hub, &storage, "main");
        controller.initialize().unwrap();
        let sibling = hub.endpoint("sibling");

        sibling.publish("settings-changed", json!({"fontSize": "huge"})).unwrap();
        sibling.publish("settings-changed", json!("not an object")).unwrap();
        hub.dispatch_pending();

        assert_eq!(store.get(), PreferenceSet::default());
        assert_eq!(controller.stats().inbound_rejected, 2);
        assert_eq!(storage.write_count(), 0);

        sibling.publish("settings-changed", json!({"fontSize": 33})).unwrap();
        hub.dispatch_pending();

        assert_eq!(store.font_size(), 33);
        assert_eq!(controller.stats().inbound_applied, 1);
        assert_eq!(
            storage.peek("editor-settings").as_deref(),
            Some(r#"{"fontSize":33,"wordWrap":false}"#)
        );
    }

    #[test]
    fn stale_own_echo_does_not_revert_newer_local_edit() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::new();
        let (store, _, mut controller) = window(&hub, &storage, "main");
        controller.initialize().unwrap();

        store.set_font_size(18);
        hub.set_available(false);
        store.set_font_size(20);
        hub.set_available(true);
        hub.dispatch_pending();

        assert_eq!(store.font_size(), 20);
        assert_eq!(
            storage.peek("editor-settings").as_deref(),
            Some(r#"{"fontSize":20,"wordWrap":false}"#)
        );
        let stats = controller.stats();
        assert_eq!(stats.stale_echoes_skipped, 1);
        assert_eq!(stats.inbound_applied, 0);
        assert_eq!(stats.bus_failures, 1);

        store.set_font_size(21);
        hub.dispatch_pending();
        assert_eq!(store.font_size(), 21);
        assert_eq!(controller.stats().inbound_applied, 1);
    }

    #[test]
    fn custom_config_uses_its_key_and_topic() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::new();
        let store = SettingsStore::new();
        let endpoint = hub.endpoint("main");
        let config = SyncConfig {
            storage_key: "viewer-settings".to_string(),
            topic: "viewer:settings".to_string(),
        };
        let mut controller = SyncController::with_config(
            store.clone(),
            Rc::new(storage.clone()),
            Rc::new(endpoint),
            config,
        )
        .unwrap();
        controller.initialize().unwrap();

        store.merge(PreferencePatch::new().with_word_wrap(true));
        assert!(storage.peek("viewer-settings").is_some());
        assert_eq!(hub.subscriber_count("viewer:settings"), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let hub = LocalEventHub::new();
        let result = SyncController::with_config(
            SettingsStore::new(),
            Rc::new(MemoryKeyValueStore::new()),
            Rc::new(hub.endpoint("main")),
            SyncConfig {
                storage_key: "editor-settings".to_string(),
                topic: "settings changed".to_string(),
            },
        );
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn dropping_controller_detaches_callbacks() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::new();
        let (store, endpoint, mut controller) = window(&hub, &storage, "main");
        controller.initialize().unwrap();
        assert_eq!(store.observer_count(), 1);
        assert_eq!(endpoint.subscription_count(), 1);

        drop(controller);
        assert_eq!(store.observer_count(), 0);
        assert_eq!(endpoint.subscription_count(), 0);

        store.set_font_size(40);
        assert_eq!(hub.published_count(), 0);
        assert_eq!(storage.write_count(), 0);
        assert_eq!(store.font_size(), 40);
    }

    #[test]
    fn status_tracks_lifecycle() {
        let hub = LocalEventHub::new();
        let storage = MemoryKeyValueStore::new();
        let (_, _, mut controller) = window(&hub, &storage, "main");

        assert_eq!(controller.status(), SyncStatus::Idle);
        controller.initialize().unwrap();
        assert!(controller.is_ready());
        controller.teardown();
        controller.teardown();
        assert_eq!(controller.status(), SyncStatus::TornDown);
    }
}
