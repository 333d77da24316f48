// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、应用组装、CSV 文件与种子记录
// ==========================================

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crm_import::app::{AppState, RunnerMode};
use crm_import::config::{ConfigManager, ImportSettings};
use crm_import::db::open_shared_connection;
use crm_import::domain::types::EntityType;
use crm_import::logging;
use crm_import::repository::{CustomFieldStore, RecordRepository};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

pub const TEAM_ID: &str = "team-1";
pub const USER_ID: &str = "user-1";

/// 测试应用（TempDir 需要保持存活）
pub struct TestApp {
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    /// 在临时目录下写入 CSV
    pub fn write_csv(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("写入 CSV 失败");
        path
    }

    /// 新建一条 CRM 记录（可带自定义字段）
    pub fn seed_record(&self, entity: EntityType, name: &str, custom: &[(&str, Value)]) -> String {
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), json!(name));
        let record = self
            .state
            .records
            .create(TEAM_ID, entity, attributes)
            .expect("新建记录失败");
        for (code, value) in custom {
            self.state
                .custom_fields
                .set_value(&record.id, code, value)
                .expect("写入自定义字段失败");
        }
        record.id
    }

    /// 某实体的记录数
    pub fn count(&self, entity: EntityType) -> u64 {
        self.state.records.count(TEAM_ID, entity).expect("统计记录失败")
    }
}

/// 测试用导入参数（小分块，工作文件写入临时目录）
pub fn test_settings(dir: &TempDir) -> ImportSettings {
    ImportSettings {
        preview_chunk_size: 2,
        execution_chunk_size: 2,
        heartbeat_timeout: Duration::from_secs(30),
        session_retention: Duration::from_secs(3600),
        max_rows: 100,
        working_dir: dir.path().join("work"),
    }
}

/// 创建测试应用
pub fn create_test_app(mode: RunnerMode) -> TestApp {
    create_test_app_with(mode, |_| {})
}

/// 创建测试应用（可调整导入参数）
pub fn create_test_app_with(mode: RunnerMode, tweak: impl FnOnce(&mut ImportSettings)) -> TestApp {
    logging::init_test();

    let dir = TempDir::new().expect("创建临时目录失败");
    let db_path = dir.path().join("crm.db").to_string_lossy().to_string();

    let conn = open_shared_connection(&db_path).expect("打开测试数据库失败");
    let config = Arc::new(ConfigManager::from_connection(conn.clone()).expect("创建配置管理失败"));

    let mut settings = test_settings(&dir);
    tweak(&mut settings);

    let state = AppState::with_settings(db_path, conn, config, settings, mode, None);
    TestApp { state, dir }
}
