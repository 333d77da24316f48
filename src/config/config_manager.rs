// ==========================================
// CRM 导入向导 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::import_config_trait::ImportConfigReader;
use crate::config::settings::{
    ImportSettings, DEFAULT_EXECUTION_CHUNK_SIZE, DEFAULT_HEARTBEAT_TIMEOUT_SECS,
    DEFAULT_MAX_ROWS, DEFAULT_PREVIEW_CHUNK_SIZE, DEFAULT_SESSION_RETENTION_HOURS,
};
use crate::db::{open_shared_connection, SharedConnection};
use async_trait::async_trait;
use rusqlite::params;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        Ok(Self {
            conn: open_shared_connection(db_path)?,
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: SharedConnection) -> ConfigResult<Self> {
        {
            let guard = conn.lock()?;
            crate::db::configure_sqlite_connection(&guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 获取所有 global 配置（按键排序）
    pub fn get_config_snapshot(&self) -> ConfigResult<BTreeMap<String, String>> {
        let conn = self.conn.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    /// 读取正整数配置
    ///
    /// # 返回
    /// - 未配置时返回默认值
    /// - 非正整数返回 ConfigValueError
    fn get_positive_or_default(&self, key: &str, default: u64) -> ConfigResult<u64> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::ConfigValueError {
                key: key.to_string(),
                value: raw,
                reason: "expected a positive integer".to_string(),
            }),
        }
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    // ===== 分块 =====

    async fn get_preview_chunk_size(&self) -> ConfigResult<usize> {
        let value = self.get_positive_or_default(
            config_keys::PREVIEW_CHUNK_SIZE,
            DEFAULT_PREVIEW_CHUNK_SIZE as u64,
        )?;
        Ok(value as usize)
    }

    async fn get_execution_chunk_size(&self) -> ConfigResult<usize> {
        let value = self.get_positive_or_default(
            config_keys::EXECUTION_CHUNK_SIZE,
            DEFAULT_EXECUTION_CHUNK_SIZE as u64,
        )?;
        Ok(value as usize)
    }

    // ===== 会话生命周期 =====

    async fn get_heartbeat_timeout(&self) -> ConfigResult<Duration> {
        let secs = self.get_positive_or_default(
            config_keys::HEARTBEAT_TIMEOUT_SECS,
            DEFAULT_HEARTBEAT_TIMEOUT_SECS,
        )?;
        Ok(Duration::from_secs(secs))
    }

    async fn get_session_retention(&self) -> ConfigResult<Duration> {
        let hours = self.get_positive_or_default(
            config_keys::SESSION_RETENTION_HOURS,
            DEFAULT_SESSION_RETENTION_HOURS,
        )?;
        Ok(Duration::from_secs(hours.saturating_mul(3600)))
    }

    // ===== 上传 =====

    async fn get_max_rows(&self) -> ConfigResult<usize> {
        let value = self.get_positive_or_default(config_keys::MAX_ROWS, DEFAULT_MAX_ROWS as u64)?;
        Ok(value as usize)
    }

    async fn get_working_dir(&self) -> ConfigResult<PathBuf> {
        match self.get_global_config_value(config_keys::WORKING_DIR)? {
            Some(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir.trim())),
            _ => Ok(ImportSettings::default_working_dir()),
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分块
    pub const PREVIEW_CHUNK_SIZE: &str = "import/preview_chunk_size";
    pub const EXECUTION_CHUNK_SIZE: &str = "import/execution_chunk_size";

    // 会话生命周期
    pub const HEARTBEAT_TIMEOUT_SECS: &str = "import/heartbeat_timeout_secs";
    pub const SESSION_RETENTION_HOURS: &str = "import/session_retention_hours";

    // 上传
    pub const MAX_ROWS: &str = "import/max_rows";
    pub const WORKING_DIR: &str = "import/working_dir";
}
