//! # Auto Export
//!
//! Exports a project once its status becomes "completed".
//!
//! Each configured [`ExportFormat`] is rendered by the [`DocumentGenerator`],
//! written to `export_dir` when one is set, and uploaded to
//! `{remote_root}/exports/{file}` when an upload service is set. A project
//! with neither destination configured is never queued.

use async_trait::async_trait;
use bridge_traits::storage::ProviderKind;
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::CoordinatorConfig;
use core_runtime::logging::strip_path;
use core_runtime::events::{
    CoreEvent, EntityKind, EventBus, Listener, ProjectSnapshot, StatusChangeEvent,
};
use core_sync::{
    ActionError, ActionHandler, ActionKey, ActionOutcome, ActionResult, Coordinator,
    CoordinatorStatus, Disposition, ProviderRegistry, SkipReason, DEFAULT_REMOTE_ROOT,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::format::{file_name, DocumentGenerator, ExportFormat, StandardDocumentGenerator};

pub const AUTO_EXPORT: &str = "auto-export";

/// Where and how completed projects are exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub formats: Vec<ExportFormat>,
    pub export_dir: Option<PathBuf>,
    pub upload_service: Option<ProviderKind>,
    pub remote_root: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            formats: vec![ExportFormat::Json, ExportFormat::Markdown],
            export_dir: None,
            upload_service: None,
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
        }
    }
}

impl ExportSettings {
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = ExportFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    pub fn with_upload_service(mut self, service: ProviderKind) -> Self {
        self.upload_service = Some(service);
        self
    }

    pub fn has_destination(&self) -> bool {
        self.export_dir.is_some() || self.upload_service.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.formats.is_empty() {
            return Err(ExportError::Config(
                "at least one export format is required".to_string(),
            ));
        }
        if self.remote_root.trim().is_empty() {
            return Err(ExportError::Config("remote_root must not be empty".to_string()));
        }
        Ok(())
    }

    /// Comma-separated format list, e.g. `json,markdown`.
    pub fn format_list(&self) -> String {
        self.formats
            .iter()
            .map(ExportFormat::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn remote_path(&self, file_name: &str) -> String {
        format!("{}/exports/{}", self.remote_root.trim_end_matches('/'), file_name)
    }
}

/// [`ActionHandler`] that renders and stores project exports.
pub struct ExportHandler {
    generator: Arc<dyn DocumentGenerator>,
    providers: ProviderRegistry,
    settings: ExportSettings,
}

impl ExportHandler {
    pub fn new(settings: ExportSettings, providers: ProviderRegistry) -> Self {
        Self {
            generator: Arc::new(StandardDocumentGenerator::new()),
            providers,
            settings,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn DocumentGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }
}

#[async_trait]
impl ActionHandler for ExportHandler {
    type Payload = ProjectSnapshot;

    fn name(&self) -> &'static str {
        AUTO_EXPORT
    }

    fn target(&self, _project: &ProjectSnapshot) -> String {
        self.settings.format_list()
    }

    fn check_eligible(&self, _key: &ActionKey, project: &ProjectSnapshot) -> std::result::Result<(), SkipReason> {
        if !project.is_completed() {
            return Err(SkipReason::NotEligible(format!(
                "project status is '{}'",
                project.status
            )));
        }
        if !self.settings.has_destination() {
            return Err(SkipReason::NotEligible(
                "no export directory or upload service configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_ready(&self, _project: &ProjectSnapshot) -> std::result::Result<(), SkipReason> {
        let Some(kind) = self.settings.upload_service else {
            return Ok(());
        };
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

    async fn perform(&self, key: &ActionKey, project: &ProjectSnapshot) -> std::result::Result<ActionOutcome, ActionError> {
        let mut locations = Vec::new();

        for format in &self.settings.formats {
            let content = self.generator.generate(project, *format)?;
            let name = file_name(project, *format);
            let mut local_hint = String::new();

            if let Some(dir) = &self.settings.export_dir {
                tokio::fs::create_dir_all(dir).await.map_err(ExportError::from)?;
                let path = dir.join(&name);
                tokio::fs::write(&path, &content).await.map_err(ExportError::from)?;
                local_hint = path.display().to_string();
                debug!(key = %key, format = %format, file = strip_path(&local_hint), "Wrote export");
                locations.push(local_hint.clone());
            }

            if let Some(kind) = self.settings.upload_service {
                let remote_path = self.settings.remote_path(&name);
                let uploaded = self
                    .providers
                    .upload_file(kind, &local_hint, &remote_path, content)
                    .await?;
                if !uploaded {
                    return Err(ActionError::Rejected(kind.display_name().to_string()));
                }
                debug!(key = %key, format = %format, provider = %kind, remote_path = %remote_path, "Uploaded export");
                locations.push(remote_path);
            }
        }

        Ok(ActionOutcome::new(self.settings.format_list()).at(locations.join(", ")))
    }
}

/// Auto-export coordinator.
#[derive(Clone)]
pub struct AutoExport {
    coordinator: Coordinator<ExportHandler>,
}

impl AutoExport {
    pub fn new(
        config: CoordinatorConfig,
        settings: ExportSettings,
        providers: ProviderRegistry,
    ) -> Result<Self> {
        Self::from_handler(
            ExportHandler::new(settings, providers),
            config,
            None,
            Arc::new(SystemClock),
        )
    }

    pub fn from_handler(
        handler: ExportHandler,
        config: CoordinatorConfig,
        events: Option<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        handler.settings().validate()?;
        Ok(Self {
            coordinator: Coordinator::new(handler, config, events, clock)?,
        })
    }

    pub fn coordinator(&self) -> &Coordinator<ExportHandler> {
        &self.coordinator
    }

    /// Schedules a throttled export when the project has just completed.
    pub fn handle_status_change(&self, event: &StatusChangeEvent) -> std::result::Result<(), SkipReason> {
        self.coordinator.enqueue(
            ActionKey::new(EntityKind::Project, event.project.id.clone()),
            event.project.clone(),
        )
    }

    /// Bus listener that reacts to `ProjectStatusChanged` events.
    pub fn listener(&self) -> Listener {
        let export = self.clone();
        Arc::new(move |event: &CoreEvent| {
            if let CoreEvent::ProjectStatusChanged(change) = event {
                let _ = export.handle_status_change(change);
            }
        })
    }

    /// Exports `project` now, skipping the throttle.
    ///
    /// The project must still be completed.
    pub async fn trigger_manual_export(&self, project: ProjectSnapshot) -> Disposition {
        let key = ActionKey::new(EntityKind::Project, project.id.clone());
        self.coordinator.trigger_manual(key, project).await
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

    pub fn failed_exports(&self) -> Vec<ActionResult> {
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
    use bytes::Bytes;
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

    mock! {
        Generator {}

        impl DocumentGenerator for Generator {
            fn generate(&self, project: &ProjectSnapshot, format: ExportFormat) -> Result<Bytes>;
        }
    }

    fn key() -> ActionKey {
        ActionKey::new(EntityKind::Project, "p1")
    }

    fn completed() -> ProjectSnapshot {
        ProjectSnapshot::new("p1", "Enzyme Assay", "Completed")
    }

    #[test]
    fn test_only_completed_projects_with_destination_are_eligible() {
        let local = ExportHandler::new(
            ExportSettings::default().with_export_dir("/tmp/exports"),
            ProviderRegistry::new(),
        );
        assert!(local.check_eligible(&key(), &completed()).is_ok());

        let active = ProjectSnapshot::new("p1", "Enzyme Assay", "active");
        assert!(matches!(
            local.check_eligible(&key(), &active),
            Err(SkipReason::NotEligible(_))
        ));

        let nowhere = ExportHandler::new(ExportSettings::default(), ProviderRegistry::new());
        assert!(nowhere.check_eligible(&key(), &completed()).is_err());
    }

    #[test]
    fn test_settings_validation_and_target() {
        let settings = ExportSettings::default().with_formats([]);
        assert!(matches!(settings.validate(), Err(ExportError::Config(_))));

        let settings = ExportSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.format_list(), "json,markdown");
        assert_eq!(
            settings.remote_path("a.json"),
            "/ResearchNotebook/exports/a.json"
        );
    }

    #[tokio::test]
    async fn test_check_ready_only_gates_on_upload_service() {
        let local = ExportHandler::new(
            ExportSettings::default().with_export_dir("/tmp/exports"),
            ProviderRegistry::new(),
        );
        assert!(local.check_ready(&completed()).await.is_ok());

        let upload = ExportHandler::new(
            ExportSettings::default().with_upload_service(ProviderKind::OneDrive),
            ProviderRegistry::new(),
        );
        assert!(matches!(
            upload.check_ready(&completed()).await,
            Err(SkipReason::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_perform_writes_each_format_to_export_dir() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ExportHandler::new(
            ExportSettings::default()
                .with_formats([ExportFormat::Json, ExportFormat::PlainText])
                .with_export_dir(dir.path().join("out")),
            ProviderRegistry::new(),
        );

        let outcome = handler.perform(&key(), &completed()).await.unwrap();

        assert_eq!(outcome.target, "json,plain_text");
        let json = std::fs::read(dir.path().join("out/enzyme-assay-p1.json")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(json["title"], "Enzyme Assay");
        let txt = std::fs::read_to_string(dir.path().join("out/enzyme-assay-p1.txt")).unwrap();
        assert!(txt.starts_with("Enzyme Assay\n"));
    }

    #[tokio::test]
    async fn test_perform_uploads_under_exports_folder() {
        let mut provider = MockProvider::new();
        provider.expect_kind().return_const(ProviderKind::Dropbox);
        provider
            .expect_upload_file()
            .with(eq(""), eq("/ResearchNotebook/exports/enzyme-assay-p1.md"), always())
            .times(1)
            .returning(|_, _, _| Ok(true));
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(provider));

        let handler = ExportHandler::new(
            ExportSettings::default()
                .with_formats([ExportFormat::Markdown])
                .with_upload_service(ProviderKind::Dropbox),
            registry,
        );

        let outcome = handler.perform(&key(), &completed()).await.unwrap();
        assert_eq!(
            outcome.location.as_deref(),
            Some("/ResearchNotebook/exports/enzyme-assay-p1.md")
        );
    }

    #[tokio::test]
    async fn test_generator_failure_becomes_action_error() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Err(ExportError::Generation("template missing".to_string())));

        let dir = tempfile::tempdir().unwrap();
        let handler = ExportHandler::new(
            ExportSettings::default().with_export_dir(dir.path()),
            ProviderRegistry::new(),
        )
        .with_generator(Arc::new(generator));

        let err = handler.perform(&key(), &completed()).await.unwrap_err();
        assert!(matches!(err, ActionError::Generation(message) if message.contains("template missing")));
    }

    #[tokio::test]
    async fn test_status_change_for_active_project_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let export = AutoExport::new(
            CoordinatorConfig::export_defaults(),
            ExportSettings::default().with_export_dir(dir.path()),
            ProviderRegistry::new(),
        )
        .unwrap();

        let change = StatusChangeEvent {
            project: ProjectSnapshot::new("p1", "Enzyme Assay", "in progress"),
            previous_status: Some("planning".to_string()),
            timestamp: chrono::Utc::now(),
        };
        assert!(export.handle_status_change(&change).is_err());
        assert_eq!(export.status().pending_count, 0);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let result = AutoExport::new(
            CoordinatorConfig::export_defaults(),
            ExportSettings::default().with_formats([]),
            ProviderRegistry::new(),
        );
        assert!(matches!(result, Err(ExportError::Config(_))));
    }
}
