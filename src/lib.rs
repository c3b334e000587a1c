//! Workspace entry crate.
//!
//! Host applications depend on `notebook-automation` and get the service
//! facade (`core-service`) together with the bundled folder-backed provider
//! when the default `local-folder` feature is enabled.

#[cfg(feature = "local-folder")]
pub use core_service::*;

#[cfg(feature = "local-folder")]
pub use provider_local_folder::LocalFolderProvider;
