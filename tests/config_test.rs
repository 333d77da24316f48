// ==========================================
// 导入参数配置测试
// ==========================================

use crm_import::app::{AppState, RunnerMode};
use crm_import::config::{config_keys, ConfigManager, ImportConfigReader};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_app_state_reads_overrides_from_config() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crm.db").to_string_lossy().to_string();

    let config = ConfigManager::new(&db_path).unwrap();
    config
        .set_global_config_value(config_keys::PREVIEW_CHUNK_SIZE, "50")
        .unwrap();
    config
        .set_global_config_value(config_keys::HEARTBEAT_TIMEOUT_SECS, "5")
        .unwrap();
    drop(config);

    let state = AppState::new(db_path, RunnerMode::Inline, None).await.unwrap();
    assert_eq!(state.settings.preview_chunk_size, 50);
    assert_eq!(state.settings.heartbeat_timeout, Duration::from_secs(5));
    assert_eq!(state.settings.execution_chunk_size, 100);
}

#[tokio::test]
async fn test_invalid_override_fails_startup() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crm.db").to_string_lossy().to_string();

    let config = ConfigManager::new(&db_path).unwrap();
    config
        .set_global_config_value(config_keys::MAX_ROWS, "lots")
        .unwrap();
    assert!(config.get_max_rows().await.is_err());
    drop(config);

    assert!(AppState::new(db_path, RunnerMode::Inline, None).await.is_err());
}
