//! # Auto Sync
//!
//! Uploads notes, projects and tasks to their configured cloud service after
//! each save.
//!
//! An entity is eligible when `cloud_synced` is set and `cloud_service` names
//! a known [`ProviderKind`]. The serialized entity lands at
//! `{remote_root}/{collection}/{id}.json`, e.g.
//! `/ResearchNotebook/notes/n1.json`.

use async_trait::async_trait;
use bridge_traits::storage::ProviderKind;
use bridge_traits::time::{Clock, SystemClock};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::config::CoordinatorConfig;
use core_runtime::events::{CoreEvent, EntityKind, EntitySnapshot, EventBus, Listener, SaveEvent};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::action::{ActionHandler, ActionKey, ActionOutcome, Disposition, SkipReason};
use crate::coordinator::Coordinator;
use crate::error::{ActionError, Result};
use crate::providers::ProviderRegistry;
use crate::results::ActionResult;
use crate::status::CoordinatorStatus;

pub const AUTO_SYNC: &str = "auto-sync";
pub const DEFAULT_REMOTE_ROOT: &str = "/ResearchNotebook";

/// Document written for each synced entity.
#[derive(Debug, Serialize)]
struct SyncDocument<'a> {
    entity_type: EntityKind,
    synced_at: DateTime<Utc>,
    #[serde(flatten)]
    entity: &'a EntitySnapshot,
}

/// [`ActionHandler`] that uploads entity snapshots.
pub struct SyncHandler {
    providers: ProviderRegistry,
    remote_root: String,
    clock: Arc<dyn Clock>,
}

impl SyncHandler {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers,
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_remote_root(mut self, remote_root: impl Into<String>) -> Self {
        self.remote_root = remote_root.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn remote_path(&self, key: &ActionKey) -> String {
        format!(
            "{}/{}/{}.json",
            self.remote_root.trim_end_matches('/'),
            key.entity_type.collection(),
            key.entity_id
        )
    }

    fn resolve_service(entity: &EntitySnapshot) -> std::result::Result<ProviderKind, SkipReason> {
        if !entity.cloud_synced {
            return Err(SkipReason::NotEligible("cloud sync is off".to_string()));
        }
        let service = entity
            .cloud_service
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SkipReason::NotEligible("no cloud service selected".to_string()))?;
        ProviderKind::parse(service)
            .ok_or_else(|| SkipReason::NotEligible(format!("unknown cloud service '{}'", service)))
    }
}

#[async_trait]
impl ActionHandler for SyncHandler {
    type Payload = EntitySnapshot;

    fn name(&self) -> &'static str {
        AUTO_SYNC
    }

    fn target(&self, entity: &EntitySnapshot) -> String {
        match entity.cloud_service.as_deref().and_then(ProviderKind::parse) {
            Some(kind) => kind.as_str().to_string(),
            None => entity.cloud_service.clone().unwrap_or_default(),
        }
    }

    fn check_eligible(&self, key: &ActionKey, entity: &EntitySnapshot) -> std::result::Result<(), SkipReason> {
        check_entity_id(&key.entity_id)?;
        Self::resolve_service(entity).map(|_| ())
    }

    async fn check_ready(&self, entity: &EntitySnapshot) -> std::result::Result<(), SkipReason> {
        let kind = Self::resolve_service(entity)?;
        let provider = self
            .providers
            .get(kind)
            .ok_or_else(|| SkipReason::ProviderUnavailable(kind.display_name().to_string()))?;
        if provider.is_connected().await {
            Ok(())
        } else {
            Err(SkipReason::NotConnected(kind.display_name().to_string()))
        }
    }

    async fn perform(&self, key: &ActionKey, entity: &EntitySnapshot) -> std::result::Result<ActionOutcome, ActionError> {
        let kind = Self::resolve_service(entity).map_err(|reason| ActionError::Provider(reason.to_string()))?;
        let document = SyncDocument {
            entity_type: key.entity_type,
            synced_at: self.clock.now(),
            entity,
        };
        let body = serde_json::to_vec_pretty(&document)?;
        let remote_path = self.remote_path(key);

        debug!(key = %key, provider = %kind, remote_path = %remote_path, "Syncing entity");
        let uploaded = self
            .providers
            .upload_file(kind, "", &remote_path, Bytes::from(body))
            .await?;
        if !uploaded {
            return Err(ActionError::Rejected(kind.display_name().to_string()));
        }

        Ok(ActionOutcome::new(kind.as_str()).at(remote_path))
    }
}

/// Ids become a single path segment, so separators and dot segments are
/// refused.
fn check_entity_id(id: &str) -> std::result::Result<(), SkipReason> {
    let unsafe_id = id.trim().is_empty()
        || id == "."
        || id == ".."
        || id.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if unsafe_id {
        Err(SkipReason::NotEligible(format!("entity id '{}' is not a valid file name", id.escape_debug())))
    } else {
        Ok(())
    }
}

/// Auto-sync coordinator.
///
/// Feed it [`SaveEvent`]s directly or through [`AutoSync::listener`].
#[derive(Clone)]
pub struct AutoSync {
    coordinator: Coordinator<SyncHandler>,
}

impl AutoSync {
    pub fn new(config: CoordinatorConfig, providers: ProviderRegistry) -> Result<Self> {
        Self::from_handler(SyncHandler::new(providers), config, None, Arc::new(SystemClock))
    }

    pub fn from_handler(
        handler: SyncHandler,
        config: CoordinatorConfig,
        events: Option<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            coordinator: Coordinator::new(handler, config, events, clock)?,
        })
    }

    pub fn coordinator(&self) -> &Coordinator<SyncHandler> {
        &self.coordinator
    }

    /// Schedules a throttled sync for the saved entity.
    pub fn handle_save_event(&self, event: &SaveEvent) -> std::result::Result<(), SkipReason> {
        self.coordinator.enqueue(
            ActionKey::new(event.entity_type, event.entity_id.clone()),
            event.entity.clone(),
        )
    }

    /// Bus listener that schedules a sync for every `EntitySaved` event.
    pub fn listener(&self) -> Listener {
        let sync = self.clone();
        Arc::new(move |event: &CoreEvent| {
            if let CoreEvent::EntitySaved(save) = event {
                // Skips are logged by the coordinator.
                let _ = sync.handle_save_event(save);
            }
        })
    }

    /// Syncs one entity now, skipping the throttle.
    pub async fn trigger_manual_sync(
        &self,
        entity_type: EntityKind,
        entity_id: impl Into<String>,
        entity: EntitySnapshot,
    ) -> Disposition {
        self.coordinator
            .trigger_manual(ActionKey::new(entity_type, entity_id), entity)
            .await
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.coordinator.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.coordinator.is_enabled()
    }

    pub fn results(&self) -> Vec<ActionResult> {
        self.coordinator.results()
    }

    pub fn recent_results(&self, limit: usize) -> Vec<ActionResult> {
        self.coordinator.recent_results(limit)
    }

    pub fn failed_syncs(&self) -> Vec<ActionResult> {
        self.coordinator.failed_results()
    }

    pub fn clear_results(&self) {
        self.coordinator.clear_results();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::{CloudProvider, RemoteFile};
    use bridge_traits::time::FixedClock;
    use chrono::TimeZone;
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        Provider {}

        #[async_trait]
        impl CloudProvider for Provider {
            fn kind(&self) -> ProviderKind;
            async fn connect(&self) -> BridgeResult<()>;
            async fn is_connected(&self) -> bool;
            async fn list_files(&self, remote_dir: &str) -> BridgeResult<Vec<RemoteFile>>;
            async fn upload_file(&self, local_path_hint: &str, remote_path: &str, content: Bytes) -> BridgeResult<bool>;
            async fn download_file(&self, remote_path: &str) -> BridgeResult<Bytes>;
        }
    }

    fn registry_with(provider: MockProvider) -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(provider));
        registry
    }

    fn dropbox() -> MockProvider {
        let mut provider = MockProvider::new();
        provider.expect_kind().return_const(ProviderKind::Dropbox);
        provider
    }

    fn note(id: &str) -> ActionKey {
        ActionKey::new(EntityKind::Note, id)
    }

    #[test]
    fn test_eligibility_requires_flag_and_known_service() {
        let handler = SyncHandler::new(ProviderRegistry::new());

        let off = EntitySnapshot::new("n1", "Draft");
        assert!(matches!(
            handler.check_eligible(&note("n1"), &off),
            Err(SkipReason::NotEligible(_))
        ));

        let mut unknown = EntitySnapshot::new("n1", "Draft").synced_to("floppy");
        assert!(handler.check_eligible(&note("n1"), &unknown).is_err());
        unknown.cloud_service = Some("  ".to_string());
        assert!(handler.check_eligible(&note("n1"), &unknown).is_err());

        let ok = EntitySnapshot::new("n1", "Draft").synced_to("Google Drive");
        assert!(handler.check_eligible(&note("n1"), &ok).is_ok());
        assert_eq!(handler.target(&ok), "google_drive");
    }

    #[test]
    fn test_ids_that_escape_the_collection_are_not_eligible() {
        let handler = SyncHandler::new(ProviderRegistry::new());
        let entity = EntitySnapshot::new("x", "Draft").synced_to("dropbox");

        for id in ["../../x", "..", ".", "a/b", "a\\b", "", "  "] {
            assert!(
                matches!(handler.check_eligible(&note(id), &entity), Err(SkipReason::NotEligible(_))),
                "{:?}",
                id
            );
        }
        assert!(handler.check_eligible(&note("n1.v2"), &entity).is_ok());
    }

    #[test]
    fn test_remote_path_layout() {
        let handler = SyncHandler::new(ProviderRegistry::new()).with_remote_root("/Lab/");
        assert_eq!(
            handler.remote_path(&ActionKey::new(EntityKind::Task, "t9")),
            "/Lab/tasks/t9.json"
        );
        let default = SyncHandler::new(ProviderRegistry::new());
        assert_eq!(default.remote_path(&note("n1")), "/ResearchNotebook/notes/n1.json");
    }

    #[tokio::test]
    async fn test_check_ready_reports_missing_and_disconnected() {
        let entity = EntitySnapshot::new("n1", "Draft").synced_to("dropbox");

        let empty = SyncHandler::new(ProviderRegistry::new());
        assert!(matches!(
            empty.check_ready(&entity).await,
            Err(SkipReason::ProviderUnavailable(_))
        ));

        let mut provider = dropbox();
        provider.expect_is_connected().returning(|| false);
        let offline = SyncHandler::new(registry_with(provider));
        assert_eq!(
            offline.check_ready(&entity).await,
            Err(SkipReason::NotConnected("Dropbox".to_string()))
        );
    }

    #[tokio::test]
    async fn test_perform_uploads_serialized_entity() {
        let mut provider = dropbox();
        provider
            .expect_upload_file()
            .with(eq(""), eq("/ResearchNotebook/notes/n1.json"), always())
            .times(1)
            .returning(|_, _, content: Bytes| {
                let json: serde_json::Value = serde_json::from_slice(&content).unwrap();
                assert_eq!(json["entity_type"], "note");
                assert_eq!(json["id"], "n1");
                assert_eq!(json["title"], "Spectra");
                assert_eq!(json["synced_at"], "2024-03-01T12:00:00Z");
                Ok(true)
            });

        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let handler = SyncHandler::new(registry_with(provider)).with_clock(Arc::new(clock));
        let entity = EntitySnapshot::new("n1", "Spectra").synced_to("dropbox");

        let outcome = handler.perform(&note("n1"), &entity).await.unwrap();
        assert_eq!(outcome.target, "dropbox");
        assert_eq!(outcome.location.as_deref(), Some("/ResearchNotebook/notes/n1.json"));
    }

    #[tokio::test]
    async fn test_rejected_upload_is_an_error() {
        let mut provider = dropbox();
        provider.expect_upload_file().returning(|_, _, _| Ok(false));

        let handler = SyncHandler::new(registry_with(provider));
        let entity = EntitySnapshot::new("n1", "Spectra").synced_to("dropbox");

        assert_eq!(
            handler.perform(&note("n1"), &entity).await,
            Err(ActionError::Rejected("Dropbox".to_string()))
        );
    }

    #[tokio::test]
    async fn test_save_event_for_unsynced_entity_is_not_queued() {
        let sync = AutoSync::new(CoordinatorConfig::sync_defaults(), ProviderRegistry::new()).unwrap();
        let event = SaveEvent::new(EntityKind::Note, "n1", EntitySnapshot::new("n1", "Draft"), Utc::now());

        assert!(sync.handle_save_event(&event).is_err());
        assert_eq!(sync.status().pending_count, 0);
        assert!(sync.results().is_empty());
    }

    #[tokio::test]
    async fn test_manual_sync_uploads_once() {
        let mut provider = dropbox();
        provider.expect_is_connected().returning(|| true);
        provider.expect_upload_file().times(1).returning(|_, _, _| Ok(true));

        let sync = AutoSync::new(CoordinatorConfig::sync_defaults(), registry_with(provider)).unwrap();
        let entity = EntitySnapshot::new("n1", "Spectra").synced_to("dropbox");

        let disposition = sync.trigger_manual_sync(EntityKind::Note, "n1", entity).await;

        assert_eq!(disposition, Disposition::Succeeded { retry_count: 0 });
        let results = sync.recent_results(10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target, "dropbox");
        assert!(sync.failed_syncs().is_empty());
    }
}
