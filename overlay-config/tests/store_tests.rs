use overlay_config::{ConfigError, ConfigStore, DisplayConfig, Pixels, MAX_CONFIG_FILE_BYTES};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn test_missing_file_uses_and_writes_defaults() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("overlay.json");

    let store = ConfigStore::open(&path).await;

    assert_eq!(store.get().await, DisplayConfig::default());
    assert!(path.exists(), "Defaults should be written on first start");
}

#[tokio::test]
async fn test_valid_update_changes_only_supplied_field() {
    let temp_dir = tempdir().unwrap();
    let store = ConfigStore::open(temp_dir.path().join("overlay.json")).await;
    let before = store.get().await;

    let after = store.update(&json!({ "fontSize": "30px" })).await.unwrap();

    assert_eq!(after.font_size, Pixels(30));
    assert_eq!(
        DisplayConfig {
            font_size: before.font_size,
            ..after.clone()
        },
        before
    );
    assert_eq!(store.get().await, after);
}

#[tokio::test]
async fn test_invalid_field_leaves_record_unchanged() {
    let temp_dir = tempdir().unwrap();
    let store = ConfigStore::open(temp_dir.path().join("overlay.json")).await;
    let before = store.get().await;

    // One valid and one invalid field: nothing may be merged
    let result = store
        .update(&json!({ "color": "#000000", "fontSize": "8px" }))
        .await;

    match result {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.details().len(), 1);
            assert!(errors.details()[0].contains("fontSize"));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }
    assert_eq!(store.get().await, before);
}

#[tokio::test]
async fn test_update_is_idempotent() {
    let temp_dir = tempdir().unwrap();
    let store = ConfigStore::open(temp_dir.path().join("overlay.json")).await;
    let update = json!({ "textAlign": "left", "marginLeft": 40 });

    let first = store.update(&update).await.unwrap();
    let second = store.update(&update).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unknown_fields_are_a_no_op() {
    let temp_dir = tempdir().unwrap();
    let store = ConfigStore::open(temp_dir.path().join("overlay.json")).await;
    let mut updates = store.subscribe().await;
    let before = store.get().await;

    let after = store.update(&json!({ "unknown": true })).await.unwrap();

    assert_eq!(after, before);
    assert!(updates.try_recv().is_err(), "No-op merge should not notify");
}

#[tokio::test]
async fn test_update_persists_full_record() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("overlay.json");

    let store = ConfigStore::open(&path).await;
    let updated = store
        .update(&json!({ "backgroundColor": "#112233", "backgroundOpacity": 40 }))
        .await
        .unwrap();

    let reopened = ConfigStore::open(&path).await;
    assert_eq!(reopened.get().await, updated);

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["backgroundColor"], "#112233");
    assert_eq!(on_disk["fontFamily"], "Arial, sans-serif");
}

#[tokio::test]
async fn test_listeners_receive_accepted_records_in_order() {
    let temp_dir = tempdir().unwrap();
    let store = ConfigStore::open(temp_dir.path().join("overlay.json")).await;
    let mut updates = store.subscribe().await;

    store.update(&json!({ "maxLines": 2 })).await.unwrap();
    let _ = store.update(&json!({ "maxLines": 0 })).await;
    store.update(&json!({ "maxLines": 3 })).await.unwrap();

    assert_eq!(updates.recv().await.unwrap().max_lines, 2);
    assert_eq!(updates.recv().await.unwrap().max_lines, 3);
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_oversized_file_falls_back_to_defaults() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("overlay.json");

    let padding = "x".repeat(MAX_CONFIG_FILE_BYTES as usize + 1);
    let contents = json!({ "fontSize": "40px", "fontFamily": "Inter", "junk": padding });
    std::fs::write(&path, contents.to_string()).unwrap();

    let store = ConfigStore::open(&path).await;
    assert_eq!(store.get().await, DisplayConfig::default());
}

#[tokio::test]
async fn test_malformed_file_falls_back_to_defaults() {
    let temp_dir = tempdir().unwrap();

    let not_json = temp_dir.path().join("broken.json");
    std::fs::write(&not_json, "{ \"fontSize\": ").unwrap();
    assert_eq!(ConfigStore::open(&not_json).await.get().await, DisplayConfig::default());

    let wrong_types = temp_dir.path().join("types.json");
    std::fs::write(&wrong_types, r##"{ "fontSize": "huge", "color": "#123456" }"##).unwrap();
    assert_eq!(ConfigStore::open(&wrong_types).await.get().await, DisplayConfig::default());

    let array = temp_dir.path().join("array.json");
    std::fs::write(&array, "[1, 2, 3]").unwrap();
    assert_eq!(ConfigStore::open(&array).await.get().await, DisplayConfig::default());
}

#[tokio::test]
async fn test_persist_failure_is_reported_and_not_rolled_back() {
    let temp_dir = tempdir().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let store = ConfigStore::open(blocker.join("overlay.json")).await;
    let mut updates = store.subscribe().await;

    let result = store.update(&json!({ "fontSize": "50px" })).await;

    assert!(matches!(result, Err(ConfigError::Persist { .. })));
    assert_eq!(store.get().await.font_size, Pixels(50));
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_external_edit_is_reloaded_and_announced() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("overlay.json");

    let store = Arc::new(ConfigStore::open(&path).await);
    let mut updates = store.subscribe().await;
    store.start_watching().await.unwrap();

    // Give the watcher time to register
    tokio::time::sleep(Duration::from_millis(100)).await;

    let edited = json!({ "color": "#00FF00", "fontSize": "48px" });
    std::fs::write(&path, serde_json::to_string_pretty(&edited).unwrap()).unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("Reload should be announced")
        .unwrap();

    assert_eq!(received.font_size, Pixels(48));
    assert_eq!(store.get().await, received);

    store.stop_watching().await;
}

#[tokio::test]
async fn test_reload_ignores_invalid_edit() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("overlay.json");

    let store = ConfigStore::open(&path).await;
    store.update(&json!({ "maxLines": 7 })).await.unwrap();

    std::fs::write(&path, "garbage").unwrap();

    assert!(store.reload().await.is_err());
    assert_eq!(store.get().await.max_lines, 7);
}

#[tokio::test]
async fn test_reload_of_own_write_is_silent() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("overlay.json");

    let store = ConfigStore::open(&path).await;
    store.update(&json!({ "padding": "12px" })).await.unwrap();
    let mut updates = store.subscribe().await;

    assert!(!store.reload().await.unwrap());
    assert!(updates.try_recv().is_err());
}
