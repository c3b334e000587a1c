//! End-to-end flow through the facade with a folder-backed provider.
#![cfg(feature = "local-folder")]

use std::sync::Arc;
use std::time::Duration;

use core_runtime::config::CoordinatorConfigBuilder;
use core_service::{
    bootstrap_local_folder, AutomationConfig, AutomationDependencies, CoordinatorConfig,
    CoordinatorEvent, CoreEvent, EntityKind, EntitySnapshot, ExportFormat, ExportSettings,
    NotebookAutomation, ProjectSnapshot,
};
use provider_local_folder::LocalFolderProvider;
use serde_json::json;

fn fast(base: CoordinatorConfig) -> CoordinatorConfig {
    CoordinatorConfigBuilder::new(base)
        .throttle_delay_ms(20)
        .retry_delay_ms(20)
        .build()
        .unwrap()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..250 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn test_saved_note_lands_in_folder() {
    let dir = tempfile::tempdir().unwrap();
    let config = AutomationConfig::builder()
        .sync(fast(CoordinatorConfig::sync_defaults()))
        .remote_root("/Lab")
        .build()
        .unwrap();
    let automation = bootstrap_local_folder(config, dir.path()).await.unwrap();

    let note = EntitySnapshot::new("n1", "Field notes")
        .synced_to("icloud")
        .with_content(json!({ "body": "first draft" }));
    assert_eq!(automation.emit_save_event(EntityKind::Note, "n1", note.clone()), 1);
    let revised = note.with_content(json!({ "body": "second draft" }));
    automation.emit_save_event(EntityKind::Note, "n1", revised);

    let sync = automation.auto_sync().clone();
    wait_until(|| !sync.results().is_empty()).await;

    let written = std::fs::read_to_string(dir.path().join("Lab/notes/n1.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(document["entity_type"], "note");
    assert_eq!(document["content"]["body"], "second draft");

    let results = sync.results();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].target, "icloud");
    assert_eq!(results[0].location.as_deref(), Some("/Lab/notes/n1.json"));
}

#[tokio::test]
async fn test_completed_project_exports_and_reports_on_bus() {
    let dir = tempfile::tempdir().unwrap();
    let exports = dir.path().join("exports");
    let config = AutomationConfig::builder()
        .export(fast(CoordinatorConfig::export_defaults()))
        .export_settings(
            ExportSettings::default()
                .with_formats([ExportFormat::Json, ExportFormat::PlainText])
                .with_export_dir(&exports),
        )
        .build()
        .unwrap();
    let automation =
        NotebookAutomation::new(config, AutomationDependencies::default()).unwrap();
    let mut outcomes = automation.events().subscribe();

    let project = ProjectSnapshot::new("p1", "Reef Census", "Completed")
        .with_content(json!({ "summary": "done" }));
    automation.emit_project_status_change(project, Some("active".to_string()));

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(CoreEvent::Coordinator(event)) = outcomes.recv().await {
                return event;
            }
        }
    })
    .await
    .unwrap();

    match event {
        CoordinatorEvent::ActionSucceeded {
            coordinator, key, ..
        } => {
            assert_eq!(coordinator, "auto-export");
            assert_eq!(key, "project:p1");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(exports.join("reef-census-p1.json").exists());
    assert!(exports.join("reef-census-p1.txt").exists());
}

#[tokio::test]
async fn test_unconnected_provider_skips_sync() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(LocalFolderProvider::new(dir.path().join("cloud")));
    let config = AutomationConfig::builder()
        .sync(fast(CoordinatorConfig::sync_defaults()))
        .build()
        .unwrap();
    let automation =
        NotebookAutomation::new(config, AutomationDependencies::new(vec![provider])).unwrap();

    automation.emit_save_event(
        EntityKind::Task,
        "t1",
        EntitySnapshot::new("t1", "Calibrate probe").synced_to("iCloud"),
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(automation.auto_sync().results().is_empty());
    assert_eq!(automation.auto_sync().status().pending_count, 0);
    assert!(!dir.path().join("cloud").exists());

    let connected = automation.connect_providers().await;
    assert_eq!(connected.len(), 1);
    assert!(connected[0].1.is_ok());

    automation.emit_save_event(
        EntityKind::Task,
        "t1",
        EntitySnapshot::new("t1", "Calibrate probe").synced_to("iCloud"),
    );
    let sync = automation.auto_sync().clone();
    wait_until(|| !sync.results().is_empty()).await;
    assert!(dir
        .path()
        .join("cloud/ResearchNotebook/tasks/t1.json")
        .exists());
}

#[tokio::test]
async fn test_shutdown_stops_reacting_to_events() {
    let dir = tempfile::tempdir().unwrap();
    let config = AutomationConfig::builder()
        .sync(fast(CoordinatorConfig::sync_defaults()))
        .build()
        .unwrap();
    let automation = bootstrap_local_folder(config, dir.path()).await.unwrap();

    automation.emit_save_event(
        EntityKind::Note,
        "n9",
        EntitySnapshot::new("n9", "Pending").synced_to("icloud"),
    );
    automation.shutdown();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(automation.auto_sync().results().is_empty());
    assert!(!dir.path().join("ResearchNotebook").exists());
    assert_eq!(
        automation.emit_save_event(EntityKind::Note, "n9", EntitySnapshot::new("n9", "Later")),
        0
    );
}
