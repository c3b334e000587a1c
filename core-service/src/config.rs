//! Top-level automation configuration.
//!
//! Combines the two coordinator configurations with the export destinations
//! and the remote folder entities are synced into.
//!
//! ```
//! use core_service::config::AutomationConfig;
//!
//! let config = AutomationConfig::builder()
//!     .remote_root("/Lab")
//!     .sync_enabled(false)
//!     .build()
//!     .unwrap();
//! assert!(!config.sync.enabled);
//! ```

use core_export::ExportSettings;
use core_runtime::config::CoordinatorConfig;
use core_sync::DEFAULT_REMOTE_ROOT;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Default capacity of the event bus broadcast channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub sync: CoordinatorConfig,
    pub export: CoordinatorConfig,
    pub export_settings: ExportSettings,
    /// Folder synced entities are written under
    pub remote_root: String,
    pub event_buffer_size: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            sync: CoordinatorConfig::sync_defaults(),
            export: CoordinatorConfig::export_defaults(),
            export_settings: ExportSettings::default(),
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl AutomationConfig {
    pub fn builder() -> AutomationConfigBuilder {
        AutomationConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        self.export.validate()?;
        self.export_settings.validate()?;

        if self.remote_root.trim().is_empty() {
            return Err(ServiceError::InitializationFailed(
                "remote_root must not be empty".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(ServiceError::InitializationFailed(
                "event_buffer_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutomationConfigBuilder {
    config: AutomationConfig,
}

impl AutomationConfigBuilder {
    pub fn sync(mut self, sync: CoordinatorConfig) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn export(mut self, export: CoordinatorConfig) -> Self {
        self.config.export = export;
        self
    }

    pub fn export_settings(mut self, settings: ExportSettings) -> Self {
        self.config.export_settings = settings;
        self
    }

    pub fn remote_root(mut self, root: impl Into<String>) -> Self {
        self.config.remote_root = root.into();
        self
    }

    pub fn sync_enabled(mut self, enabled: bool) -> Self {
        self.config.sync.enabled = enabled;
        self
    }

    pub fn export_enabled(mut self, enabled: bool) -> Self {
        self.config.export.enabled = enabled;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn build(self) -> Result<AutomationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
