// ==========================================
// CRM 导入向导 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 流程: 上传 → 列映射 → 值评审 → 匹配预览 → 落库
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 会话 / 字段 / 关联 / 映射
pub mod domain;

// 数据仓储层 - 暂存库与 CRM 记录
pub mod repository;

// 引擎层 - 匹配 / 预览 / 落库 / 后台任务
pub mod engine;

// 导入层 - 解析 / 映射 / 校验 / 实体声明
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 向导接口
pub mod api;

// 应用层 - 组件组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    DateFormat, EntityType, ImportStatus, MatchBehavior, MatchMethod, NumberFormat, RowAction,
};

// 领域实体
pub use domain::{
    ColumnMapping, CrmRecord, ImportResults, ImportRow, ImportSession, PreviewProgress,
    ValidationError, ValueCorrection,
};

// 引擎
pub use engine::{ExecutionEngine, ImportTask, MatchResolver, PreviewProcessor, TaskRunner};

// API
pub use api::{ApiError, ApiResult, ImportWizardApi};

// 应用
pub use app::{AppState, RunnerMode};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "CRM 导入向导";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
