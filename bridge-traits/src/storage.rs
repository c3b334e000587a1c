//! Cloud Storage and Settings Abstractions
//!
//! Provides the traits the core uses to reach vendor storage backends and the
//! host's key-value preferences store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Supported cloud storage services.
///
/// # Examples
///
/// ```
/// use bridge_traits::storage::ProviderKind;
///
/// let provider = ProviderKind::GoogleDrive;
/// assert_eq!(provider.display_name(), "Google Drive");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Dropbox
    Dropbox,
    /// Google Drive
    GoogleDrive,
    /// Microsoft OneDrive
    OneDrive,
    /// iCloud Drive, reached through a watched local folder
    ICloud,
}

impl ProviderKind {
    /// Human-readable name for this provider.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Dropbox => "Dropbox",
            ProviderKind::GoogleDrive => "Google Drive",
            ProviderKind::OneDrive => "OneDrive",
            ProviderKind::ICloud => "iCloud",
        }
    }

    /// Stable identifier used in entity records and settings.
    ///
    /// ```
    /// use bridge_traits::storage::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::GoogleDrive.as_str(), "google_drive");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Dropbox => "dropbox",
            ProviderKind::GoogleDrive => "google_drive",
            ProviderKind::OneDrive => "onedrive",
            ProviderKind::ICloud => "icloud",
        }
    }

    /// Parse a service name as it appears on an entity's `cloud_service` field.
    ///
    /// Matching is case-insensitive and tolerates the spellings hosts commonly
    /// use (`googleDrive`, `google-drive`, `google_drive`).
    ///
    /// ```
    /// use bridge_traits::storage::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("googleDrive"), Some(ProviderKind::GoogleDrive));
    /// assert_eq!(ProviderKind::parse("ftp"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "dropbox" => Some(ProviderKind::Dropbox),
            "googledrive" | "gdrive" => Some(ProviderKind::GoogleDrive),
            "onedrive" => Some(ProviderKind::OneDrive),
            "icloud" | "iclouddrive" => Some(ProviderKind::ICloud),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A file entry returned by [`CloudProvider::list_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Path relative to the provider root
    pub path: String,
    /// File name (last path segment)
    pub name: String,
    /// Size in bytes, if known
    pub size: Option<u64>,
    /// Last modification time, if known
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether the entry is a folder
    pub is_folder: bool,
}

/// Cloud storage capability consumed by the sync and export coordinators.
///
/// Implementations wrap a vendor SDK or a local folder. Every method may be
/// slow; callers wrap them in timeouts.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::CloudProvider;
/// use bytes::Bytes;
///
/// async fn push(provider: &dyn CloudProvider) -> bridge_traits::error::Result<()> {
///     if provider.is_connected().await {
///         provider
///             .upload_file("", "/Notebook/notes/n1.json", Bytes::from_static(b"{}"))
///             .await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Which service this provider talks to
    fn kind(&self) -> ProviderKind;

    /// Establish (or re-establish) the connection to the service
    async fn connect(&self) -> Result<()>;

    /// Whether the provider is currently usable
    async fn is_connected(&self) -> bool;

    /// List files under a remote directory
    async fn list_files(&self, remote_dir: &str) -> Result<Vec<RemoteFile>>;

    /// Upload `content` to `remote_path`.
    ///
    /// `local_path_hint` names the on-disk copy when one exists and may be empty.
    /// Returns `Ok(false)` when the service rejected the upload without raising
    /// an error; callers treat that as a failure.
    async fn upload_file(
        &self,
        local_path_hint: &str,
        remote_path: &str,
        content: Bytes,
    ) -> Result<bool>;

    /// Download a file's contents
    async fn download_file(&self, remote_path: &str) -> Result<Bytes>;
}

/// Settings store trait
///
/// Key-value storage for user preferences such as whether auto-sync is on.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember(store: &dyn SettingsStore) -> Result<()> {
///     store.set_bool("auto_sync.enabled", true).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse_variants() {
        assert_eq!(ProviderKind::parse("Dropbox"), Some(ProviderKind::Dropbox));
        assert_eq!(
            ProviderKind::parse("google-drive"),
            Some(ProviderKind::GoogleDrive)
        );
        assert_eq!(ProviderKind::parse("OneDrive"), Some(ProviderKind::OneDrive));
        assert_eq!(ProviderKind::parse("iCloud"), Some(ProviderKind::ICloud));
        assert_eq!(ProviderKind::parse(""), None);
    }

    #[test]
    fn test_provider_kind_round_trips_through_as_str() {
        for kind in [
            ProviderKind::Dropbox,
            ProviderKind::GoogleDrive,
            ProviderKind::OneDrive,
            ProviderKind::ICloud,
        ] {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ProviderKind::OneDrive.to_string(), "OneDrive");
        assert_eq!(ProviderKind::ICloud.to_string(), "iCloud");
    }
}
