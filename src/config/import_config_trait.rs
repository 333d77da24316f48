// ==========================================
// CRM 导入向导 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::error::ConfigResult;
use crate::config::settings::ImportSettings;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取预览分块大小
    ///
    /// # 默认值
    /// - 500
    async fn get_preview_chunk_size(&self) -> ConfigResult<usize>;

    /// 获取落库分块大小
    ///
    /// # 默认值
    /// - 100
    async fn get_execution_chunk_size(&self) -> ConfigResult<usize>;

    /// 获取心跳超时
    ///
    /// # 默认值
    /// - 30 秒
    async fn get_heartbeat_timeout(&self) -> ConfigResult<Duration>;

    /// 获取会话保留期
    ///
    /// # 默认值
    /// - 24 小时
    async fn get_session_retention(&self) -> ConfigResult<Duration>;

    /// 获取上传行数上限
    ///
    /// # 默认值
    /// - 10000
    async fn get_max_rows(&self) -> ConfigResult<usize>;

    /// 获取工作文件目录
    ///
    /// # 默认值
    /// - <本地数据目录>/crm-import
    async fn get_working_dir(&self) -> ConfigResult<PathBuf>;

    /// 一次性解析全部导入参数
    async fn load_settings(&self) -> ConfigResult<ImportSettings> {
        Ok(ImportSettings {
            preview_chunk_size: self.get_preview_chunk_size().await?,
            execution_chunk_size: self.get_execution_chunk_size().await?,
            heartbeat_timeout: self.get_heartbeat_timeout().await?,
            session_retention: self.get_session_retention().await?,
            max_rows: self.get_max_rows().await?,
            working_dir: self.get_working_dir().await?,
        })
    }
}
