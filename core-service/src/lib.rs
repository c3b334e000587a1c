//! Service facade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (cloud providers,
//! settings store, clock) into the auto-sync and auto-export coordinators and
//! exposes them as a single [`NotebookAutomation`] handle. Hosts that keep
//! their notebook in a plain directory enable the default `local-folder`
//! feature and call [`bootstrap_local_folder`].
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_service::{
//!     init_logging, AutomationConfig, AutomationDependencies, LoggingConfig, NotebookAutomation,
//! };
//!
//! init_logging(LoggingConfig::default())?;
//!
//! let automation = NotebookAutomation::new(
//!     AutomationConfig::default(),
//!     AutomationDependencies::default(),
//! )?;
//! automation.load_settings().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod service;

pub use config::{AutomationConfig, AutomationConfigBuilder, DEFAULT_EVENT_BUFFER_SIZE};
pub use error::{Result, ServiceError};
pub use service::{
    AutomationDependencies, NotebookAutomation, AUTO_EXPORT_ENABLED_KEY, AUTO_SYNC_ENABLED_KEY,
};

#[cfg(feature = "local-folder")]
pub use service::bootstrap_local_folder;

pub use core_export::{ExportFormat, ExportSettings};
pub use core_runtime::config::CoordinatorConfig;
pub use core_runtime::events::{
    CoordinatorEvent, CoreEvent, EntityKind, EntitySnapshot, EventBus, EventName, ProjectSnapshot,
};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_sync::{ActionResult, CoordinatorStatus, Disposition};
