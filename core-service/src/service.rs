//! `NotebookAutomation` facade.
//!
//! Owns the event bus, the provider registry and both coordinators, and keeps
//! the bus listeners it registered so [`NotebookAutomation::shutdown`] can
//! remove them again.

use std::sync::Arc;

use bridge_traits::{
    storage::{CloudProvider, ProviderKind, SettingsStore},
    time::{Clock, SystemClock},
};
use chrono::{DateTime, Utc};
use core_export::{AutoExport, DocumentGenerator, ExportHandler};
use core_runtime::events::{
    CoreEvent, EntityKind, EntitySnapshot, EventBus, EventName, Listener, ProjectSnapshot,
    SaveEvent, StatusChangeEvent,
};
use core_sync::{AutoSync, ProviderRegistry, SyncHandler};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::AutomationConfig;
use crate::error::Result;

/// Settings key holding the auto-sync enabled flag.
pub const AUTO_SYNC_ENABLED_KEY: &str = "auto_sync.enabled";
/// Settings key holding the auto-export enabled flag.
pub const AUTO_EXPORT_ENABLED_KEY: &str = "auto_export.enabled";

/// Host-provided handles the facade is built from.
pub struct AutomationDependencies {
    pub providers: Vec<Arc<dyn CloudProvider>>,
    pub settings_store: Option<Arc<dyn SettingsStore>>,
    pub clock: Arc<dyn Clock>,
    /// Replaces the standard JSON/Markdown/plain-text generator when set.
    pub generator: Option<Arc<dyn DocumentGenerator>>,
}

impl AutomationDependencies {
    pub fn new(providers: Vec<Arc<dyn CloudProvider>>) -> Self {
        Self {
            providers,
            settings_store: None,
            clock: Arc::new(SystemClock),
            generator: None,
        }
    }

    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn DocumentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }
}

impl Default for AutomationDependencies {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

struct Inner {
    config: AutomationConfig,
    events: EventBus,
    providers: ProviderRegistry,
    auto_sync: AutoSync,
    auto_export: AutoExport,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Arc<dyn Clock>,
    listeners: Mutex<Vec<(EventName, Listener)>>,
}

/// Primary facade exposed to host applications.
///
/// Cloning is cheap and every clone drives the same coordinators.
#[derive(Clone)]
pub struct NotebookAutomation {
    inner: Arc<Inner>,
}

impl NotebookAutomation {
    /// Validates `config`, registers the providers and attaches both
    /// coordinators to a fresh event bus.
    pub fn new(config: AutomationConfig, deps: AutomationDependencies) -> Result<Self> {
        config.validate()?;

        let AutomationDependencies {
            providers: provider_list,
            settings_store,
            clock,
            generator,
        } = deps;

        let events = EventBus::new(config.event_buffer_size);
        let providers = ProviderRegistry::new();
        for provider in provider_list {
            providers.register(provider);
        }

        let sync_handler = SyncHandler::new(providers.clone())
            .with_remote_root(config.remote_root.clone())
            .with_clock(clock.clone());
        let auto_sync = AutoSync::from_handler(
            sync_handler,
            config.sync.clone(),
            Some(events.clone()),
            clock.clone(),
        )?;

        let mut export_handler =
            ExportHandler::new(config.export_settings.clone(), providers.clone());
        if let Some(generator) = generator {
            export_handler = export_handler.with_generator(generator);
        }
        let auto_export = AutoExport::from_handler(
            export_handler,
            config.export.clone(),
            Some(events.clone()),
            clock.clone(),
        )?;

        let listeners = vec![
            (EventName::EntitySaved, auto_sync.listener()),
            (EventName::ProjectStatusChanged, auto_export.listener()),
        ];
        for (name, listener) in &listeners {
            events.on(*name, listener.clone());
        }

        info!(
            providers = ?providers.kinds(),
            sync_enabled = config.sync.enabled,
            export_enabled = config.export.enabled,
            "Notebook automation initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                events,
                providers,
                auto_sync,
                auto_export,
                settings_store,
                clock,
                listeners: Mutex::new(listeners),
            }),
        })
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    pub fn auto_sync(&self) -> &AutoSync {
        &self.inner.auto_sync
    }

    pub fn auto_export(&self) -> &AutoExport {
        &self.inner.auto_export
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Publishes an `EntitySaved` event and returns the number of listeners
    /// that ran.
    pub fn emit_save_event(
        &self,
        entity_type: EntityKind,
        entity_id: impl Into<String>,
        entity: EntitySnapshot,
    ) -> usize {
        let event = SaveEvent::new(entity_type, entity_id, entity, self.now());
        self.inner.events.emit(CoreEvent::EntitySaved(event))
    }

    /// Publishes a `ProjectStatusChanged` event.
    pub fn emit_project_status_change(
        &self,
        project: ProjectSnapshot,
        previous_status: Option<String>,
    ) -> usize {
        let event = StatusChangeEvent {
            project,
            previous_status,
            timestamp: self.now(),
        };
        self.inner.events.emit(CoreEvent::ProjectStatusChanged(event))
    }

    /// Connects every registered provider. One failure never stops the
    /// others from being tried.
    pub async fn connect_providers(&self) -> Vec<(ProviderKind, core_sync::Result<()>)> {
        let results = self.inner.providers.connect_all().await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "Some providers failed to connect");
        }
        results
    }

    /// Applies the enabled flags stored in the settings store.
    ///
    /// Missing keys keep the configured value. Without a store this is a
    /// no-op.
    pub async fn load_settings(&self) -> Result<()> {
        let Some(store) = &self.inner.settings_store else {
            return Ok(());
        };

        if let Some(enabled) = store.get_bool(AUTO_SYNC_ENABLED_KEY).await? {
            self.inner.auto_sync.set_enabled(enabled);
        }
        if let Some(enabled) = store.get_bool(AUTO_EXPORT_ENABLED_KEY).await? {
            self.inner.auto_export.set_enabled(enabled);
        }

        debug!(
            sync_enabled = self.inner.auto_sync.is_enabled(),
            export_enabled = self.inner.auto_export.is_enabled(),
            "Loaded automation settings"
        );
        Ok(())
    }

    /// Writes both enabled flags to the settings store.
    pub async fn save_settings(&self) -> Result<()> {
        let Some(store) = &self.inner.settings_store else {
            return Ok(());
        };
        store
            .set_bool(AUTO_SYNC_ENABLED_KEY, self.inner.auto_sync.is_enabled())
            .await?;
        store
            .set_bool(AUTO_EXPORT_ENABLED_KEY, self.inner.auto_export.is_enabled())
            .await?;
        Ok(())
    }

    /// Enables or disables auto-sync and persists the flag.
    ///
    /// The coordinator is updated first, so a persistence error leaves the
    /// in-memory state changed.
    pub async fn set_auto_sync_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.auto_sync.set_enabled(enabled);
        if let Some(store) = &self.inner.settings_store {
            store.set_bool(AUTO_SYNC_ENABLED_KEY, enabled).await?;
        }
        Ok(())
    }

    /// Enables or disables auto-export and persists the flag.
    pub async fn set_auto_export_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.auto_export.set_enabled(enabled);
        if let Some(store) = &self.inner.settings_store {
            store.set_bool(AUTO_EXPORT_ENABLED_KEY, enabled).await?;
        }
        Ok(())
    }

    /// Detaches both coordinators from the bus and disables them, dropping
    /// queued work and pending timers. Calling it twice is harmless.
    pub fn shutdown(&self) {
        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        if listeners.is_empty() {
            return;
        }
        for (name, listener) in &listeners {
            self.inner.events.off(*name, listener);
        }
        self.inner.auto_sync.set_enabled(false);
        self.inner.auto_export.set_enabled(false);
        info!("Notebook automation shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.listeners.lock().is_empty()
    }
}

impl std::fmt::Debug for NotebookAutomation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookAutomation")
            .field("providers", &self.inner.providers.kinds())
            .field("sync_enabled", &self.inner.auto_sync.is_enabled())
            .field("export_enabled", &self.inner.auto_export.is_enabled())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Builds a facade backed by one folder provider rooted at `root`.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_service::{bootstrap_local_folder, AutomationConfig};
///
/// let automation = bootstrap_local_folder(AutomationConfig::default(), "/tmp/notebook").await?;
/// assert!(automation.auto_sync().is_enabled());
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "local-folder")]
pub async fn bootstrap_local_folder(
    config: AutomationConfig,
    root: impl Into<std::path::PathBuf>,
) -> Result<NotebookAutomation> {
    let provider = Arc::new(provider_local_folder::LocalFolderProvider::new(root));
    provider.connect().await?;
    NotebookAutomation::new(config, AutomationDependencies::new(vec![provider]))
}
