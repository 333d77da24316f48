// ==========================================
// CRM 导入向导 - 导入运行参数快照
// ==========================================
// 由 ImportConfigReader::load_settings 解析得到，显式传入管道各阶段
// ==========================================

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PREVIEW_CHUNK_SIZE: usize = 500;
pub const DEFAULT_EXECUTION_CHUNK_SIZE: usize = 100;
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_RETENTION_HOURS: u64 = 24;
pub const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    /// 预览每块行数
    pub preview_chunk_size: usize,
    /// 落库每块行数
    pub execution_chunk_size: usize,
    /// 心跳超时（超时视为用户离开）
    pub heartbeat_timeout: Duration,
    /// 会话保留期（心跳超过保留期的会话被清理）
    pub session_retention: Duration,
    /// 上传行数上限
    pub max_rows: usize,
    /// 预览工作文件目录
    pub working_dir: PathBuf,
}

impl ImportSettings {
    pub fn default_working_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("crm-import")
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            preview_chunk_size: DEFAULT_PREVIEW_CHUNK_SIZE,
            execution_chunk_size: DEFAULT_EXECUTION_CHUNK_SIZE,
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            session_retention: Duration::from_secs(DEFAULT_SESSION_RETENTION_HOURS * 3600),
            max_rows: DEFAULT_MAX_ROWS,
            working_dir: Self::default_working_dir(),
        }
    }
}
