//! Registry of cloud providers keyed by [`ProviderKind`].
//!
//! Entities name their target service as a string (`"dropbox"`,
//! `"google_drive"`, ...). The registry resolves that to a registered
//! [`CloudProvider`] so coordinators can ask `is_connected(service)` and
//! `upload_file(service, ...)` without knowing which adapters exist.

use bridge_traits::storage::{CloudProvider, ProviderKind, RemoteFile};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<ProviderKind, Arc<dyn CloudProvider>>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under its own kind, replacing any previous one.
    pub fn register(&self, provider: Arc<dyn CloudProvider>) {
        let kind = provider.kind();
        if self.providers.write().insert(kind, provider).is_some() {
            info!(provider = %kind, "Replaced cloud provider");
        } else {
            info!(provider = %kind, "Registered cloud provider");
        }
    }

    pub fn unregister(&self, kind: ProviderKind) -> bool {
        self.providers.write().remove(&kind).is_some()
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn CloudProvider>> {
        self.providers.read().get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.read().keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    fn require(&self, kind: ProviderKind) -> Result<Arc<dyn CloudProvider>> {
        self.get(kind)
            .ok_or_else(|| SyncError::ProviderNotRegistered(kind.display_name().to_string()))
    }

    /// False for unregistered kinds.
    pub async fn is_connected(&self, kind: ProviderKind) -> bool {
        match self.get(kind) {
            Some(provider) => provider.is_connected().await,
            None => false,
        }
    }

    pub async fn upload_file(
        &self,
        kind: ProviderKind,
        local_path_hint: &str,
        remote_path: &str,
        content: Bytes,
    ) -> Result<bool> {
        let provider = self.require(kind)?;
        debug!(provider = %kind, remote_path, bytes = content.len(), "Uploading");
        Ok(provider.upload_file(local_path_hint, remote_path, content).await?)
    }

    pub async fn list_files(&self, kind: ProviderKind, remote_dir: &str) -> Result<Vec<RemoteFile>> {
        let provider = self.require(kind)?;
        Ok(provider.list_files(remote_dir).await?)
    }

    pub async fn download_file(&self, kind: ProviderKind, remote_path: &str) -> Result<Bytes> {
        let provider = self.require(kind)?;
        Ok(provider.download_file(remote_path).await?)
    }

    /// Connects every registered provider, returning per-provider outcomes.
    ///
    /// A failing provider is logged and does not stop the others.
    pub async fn connect_all(&self) -> Vec<(ProviderKind, Result<()>)> {
        let providers: Vec<_> = self
            .providers
            .read()
            .iter()
            .map(|(kind, provider)| (*kind, Arc::clone(provider)))
            .collect();

        let mut outcomes = Vec::with_capacity(providers.len());
        for (kind, provider) in providers {
            let outcome = provider.connect().await.map_err(SyncError::from);
            match &outcome {
                Ok(()) => info!(provider = %kind, "Provider connected"),
                Err(e) => warn!(provider = %kind, error = %e, "Provider failed to connect"),
            }
            outcomes.push((kind, outcome));
        }
        outcomes
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}
