//! Folder-backed `CloudProvider` using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{CloudProvider, ProviderKind, RemoteFile},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Tokio-based folder provider
///
/// Provides:
/// - `connect` creating the root directory
/// - uploads written through a temp file and renamed into place
/// - listing and downloads read back from disk
pub struct LocalFolderProvider {
    root: PathBuf,
    kind: ProviderKind,
    connected: AtomicBool,
}

impl LocalFolderProvider {
    /// Create a provider rooted at `root`, reported as iCloud
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_kind(root, ProviderKind::ICloud)
    }

    /// Create a provider rooted at `root` that answers for `kind`
    pub fn with_kind(root: impl Into<PathBuf>, kind: ProviderKind) -> Self {
        Self {
            root: root.into(),
            kind,
            connected: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a remote path (`/Notebook/notes/n1.json`) under the root.
    fn resolve(&self, remote_path: &str) -> Result<PathBuf> {
        let relative = Path::new(remote_path.trim_start_matches(|c: char| c == '/' || c == '\\'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(BridgeError::InvalidPath(remote_path.to_string())),
            }
        }
        Ok(resolved)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::NotConnected(self.kind.display_name().to_string()))
        }
    }

    fn relative_display(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let joined = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        format!("/{}", joined)
    }
}

#[async_trait]
impl CloudProvider for LocalFolderProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn connect(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        self.connected.store(true, Ordering::SeqCst);
        info!(provider = %self.kind, root = ?self.root, "Local folder connected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn list_files(&self, remote_dir: &str) -> Result<Vec<RemoteFile>> {
        self.ensure_connected()?;
        let dir = self.resolve(remote_dir)?;
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            files.push(RemoteFile {
                path: self.relative_display(&entry.path()),
                name: entry.file_name().to_string_lossy().into_owned(),
                size: if metadata.is_file() { Some(metadata.len()) } else { None },
                modified_at,
                is_folder: metadata.is_dir(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn upload_file(
        &self,
        _local_path_hint: &str,
        remote_path: &str,
        content: Bytes,
    ) -> Result<bool> {
        self.ensure_connected()?;
        let target = self.resolve(remote_path)?;
        if target == self.root {
            return Err(BridgeError::InvalidPath(remote_path.to_string()));
        }
        let Some(parent) = target.parent() else {
            return Err(BridgeError::InvalidPath(remote_path.to_string()));
        };
        fs::create_dir_all(parent).await?;

        // Write beside the target then rename, so readers never see a partial file.
        let Some(file_name) = target.file_name() else {
            return Err(BridgeError::InvalidPath(remote_path.to_string()));
        };
        let staging = parent.join(format!(".{}.partial", file_name.to_string_lossy()));
        let mut file = fs::File::create(&staging).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, &target).await?;

        debug!(path = ?target, bytes = content.len(), "Wrote file to local folder");
        Ok(true)
    }

    async fn download_file(&self, remote_path: &str) -> Result<Bytes> {
        self.ensure_connected()?;
        let path = self.resolve(remote_path)?;
        Ok(Bytes::from(fs::read(&path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected(root: &Path) -> LocalFolderProvider {
        let provider = LocalFolderProvider::new(root.join("icloud"));
        provider.connect().await.unwrap();
        provider
    }

    #[tokio::test]
    async fn test_connect_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFolderProvider::new(dir.path().join("nested/root"));
        assert!(!provider.is_connected().await);

        provider.connect().await.unwrap();

        assert!(provider.is_connected().await);
        assert!(provider.root().is_dir());
        assert_eq!(provider.kind(), ProviderKind::ICloud);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFolderProvider::new(dir.path());

        let err = provider
            .upload_file("", "/a.json", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_upload_list_download_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = connected(dir.path()).await;

        assert!(provider
            .upload_file("", "/Notebook/notes/n1.json", Bytes::from_static(b"{\"id\":\"n1\"}"))
            .await
            .unwrap());
        provider
            .upload_file("", "/Notebook/notes/n2.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let files = provider.list_files("/Notebook/notes").await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["n1.json", "n2.json"]);
        assert_eq!(files[0].path, "/Notebook/notes/n1.json");
        assert_eq!(files[0].size, Some(11));
        assert!(!files[0].is_folder);

        let top = provider.list_files("/Notebook").await.unwrap();
        assert_eq!(top.len(), 1);
        assert!(top[0].is_folder);

        let body = provider.download_file("Notebook/notes/n1.json").await.unwrap();
        assert_eq!(&body[..], b"{\"id\":\"n1\"}");
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = connected(dir.path()).await;

        provider
            .upload_file("", "/a.txt", Bytes::from_static(b"first"))
            .await
            .unwrap();
        provider
            .upload_file("", "/a.txt", Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert_eq!(&provider.download_file("/a.txt").await.unwrap()[..], b"second");
        let files = provider.list_files("/").await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let provider = connected(dir.path()).await;

        for path in ["/../escape.json", "/notes/../../escape.json", "/"] {
            let err = provider
                .upload_file("", path, Bytes::from_static(b"x"))
                .await
                .unwrap_err();
            assert!(matches!(err, BridgeError::InvalidPath(_)), "{}", path);
        }
        assert!(!dir.path().join("escape.json").exists());
    }

    #[tokio::test]
    async fn test_listing_missing_folder_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let provider = connected(dir.path()).await;
        assert!(provider.list_files("/nothing/here").await.unwrap().is_empty());
    }
}
