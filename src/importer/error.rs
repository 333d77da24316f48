// ==========================================
// CRM 导入向导 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 单元格校验失败不是错误（返回 ValidationError 数据），
//       这里只描述真正的异常（文件 / 映射 / 存储 / 内部错误）
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0} (expected .csv/.xlsx/.xls)")]
    UnsupportedFormat(String),

    #[error("Failed to read file: {0}")]
    FileReadError(String),

    #[error("Failed to parse Excel file: {0}")]
    ExcelParseError(String),

    #[error("Failed to parse CSV file: {0}")]
    CsvParseError(String),

    #[error("Invalid header row: {0}")]
    InvalidHeader(String),

    #[error("File has {actual} rows, the limit is {limit}")]
    TooManyRows { actual: usize, limit: usize },

    // ===== 映射错误 =====
    #[error("Column mapping error: {0}")]
    FieldMappingError(String),

    // ===== 会话错误 =====
    #[error("Import session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid status transition: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ===== 预览工作文件 =====
    #[error("Working file error: {0}")]
    WorkingFileError(String),

    // ===== 存储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ===== 通用错误 =====
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
