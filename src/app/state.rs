// ==========================================
// CRM 导入向导 - 应用状态
// ==========================================
// 职责: 组装共享连接、仓储、管道阶段、任务执行器与向导接口
// ==========================================

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::api::ImportWizardApi;
use crate::config::{ConfigManager, ImportSettings};
use crate::db::{open_shared_connection, SharedConnection};
use crate::engine::{
    ExecutionEngine, FailureCallback, InlineTaskRunner, PreviewProcessor, TaskExecutor, TaskRunner,
    TokioTaskRunner,
};
use crate::repository::{
    CustomFieldStore, RecordRepository, SqliteCustomFieldStore, SqliteRecordRepository,
};

/// 后台任务执行方式
#[derive(Clone)]
pub enum RunnerMode {
    /// 提交时在当前线程执行（命令行 / 测试）
    Inline,
    /// tokio 阻塞线程池
    Tokio(Handle),
}

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: SharedConnection,

    /// 导入参数（启动时读取一次）
    pub settings: ImportSettings,

    /// 配置管理
    pub config: Arc<ConfigManager>,

    /// CRM 记录仓储
    pub records: Arc<dyn RecordRepository>,

    /// 自定义字段存储
    pub custom_fields: Arc<dyn CustomFieldStore>,

    /// 任务执行器（预览 / 落库）
    pub executor: TaskExecutor,

    /// 向导接口
    pub wizard_api: Arc<ImportWizardApi>,
}

impl AppState {
    /// 创建 AppState
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - mode: 后台任务执行方式
    /// - on_failure: 任务失败回调（可选）
    ///
    /// # 说明
    /// 导入参数从 config_kv 读取，未配置的使用默认值
    pub async fn new(
        db_path: String,
        mode: RunnerMode,
        on_failure: Option<FailureCallback>,
    ) -> anyhow::Result<Self> {
        use crate::config::ImportConfigReader;

        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = open_shared_connection(&db_path)?;
        let config = Arc::new(ConfigManager::from_connection(conn.clone())?);
        let settings = config.load_settings().await?;

        Ok(Self::with_settings(db_path, conn, config, settings, mode, on_failure))
    }

    /// 使用给定参数组装（测试中直接传入参数）
    pub fn with_settings(
        db_path: String,
        conn: SharedConnection,
        config: Arc<ConfigManager>,
        settings: ImportSettings,
        mode: RunnerMode,
        on_failure: Option<FailureCallback>,
    ) -> Self {
        let records: Arc<dyn RecordRepository> = Arc::new(SqliteRecordRepository::new(conn.clone()));
        let custom_fields: Arc<dyn CustomFieldStore> =
            Arc::new(SqliteCustomFieldStore::new(conn.clone()));

        let preview = Arc::new(PreviewProcessor::new(
            conn.clone(),
            records.clone(),
            settings.clone(),
        ));
        let execution = Arc::new(ExecutionEngine::new(
            conn.clone(),
            records.clone(),
            custom_fields.clone(),
            settings.clone(),
        ));
        let executor = TaskExecutor::new(preview, execution);

        let runner: Arc<dyn TaskRunner> = match mode {
            RunnerMode::Inline => {
                let runner = InlineTaskRunner::new(executor.clone());
                Arc::new(match on_failure {
                    Some(callback) => runner.with_failure_callback(callback),
                    None => runner,
                })
            }
            RunnerMode::Tokio(handle) => {
                let runner = TokioTaskRunner::new(executor.clone(), handle);
                Arc::new(match on_failure {
                    Some(callback) => runner.with_failure_callback(callback),
                    None => runner,
                })
            }
        };

        let wizard_api = Arc::new(ImportWizardApi::new(
            conn.clone(),
            records.clone(),
            runner,
            settings.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Self {
            db_path,
            conn,
            settings,
            config,
            records,
            custom_fields,
            executor,
            wizard_api,
        }
    }
}

/// 默认数据库路径
///
/// 优先使用环境变量 CRM_IMPORT_DB_PATH，否则放在用户数据目录下
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("CRM_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./crm_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("crm-import");
        // 目录创建失败时 SQLite 打开会报错，这里不提前中断
        std::fs::create_dir_all(&dir).ok();
        path = dir.join("crm_import.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ImportStatus;
    use tempfile::TempDir;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(path.ends_with(".db"));
    }

    #[tokio::test]
    async fn test_app_state_wires_wizard() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("app.db").to_string_lossy().to_string();
        let state = AppState::new(db_path, RunnerMode::Inline, None).await.unwrap();

        let csv = dir.path().join("companies.csv");
        std::fs::write(&csv, "Name,Domain\nAcme,acme.com\n").unwrap();

        let upload = state
            .wizard_api
            .upload("team-1", "user-1", crate::domain::types::EntityType::Company, &csv)
            .unwrap();
        assert_eq!(upload.total_rows, 1);

        let report = state.wizard_api.status("team-1", &upload.import_id).unwrap();
        assert_eq!(report.status, ImportStatus::Mapping);
    }
}
