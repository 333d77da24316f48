// ==========================================
// CRM 导入向导 - 配置层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config value (key={key}, value={value}): {reason}")]
    ConfigValueError {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for ConfigError {
    fn from(err: rusqlite::Error) -> Self {
        ConfigError::Repository(RepositoryError::from(err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for ConfigError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ConfigError::Repository(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
