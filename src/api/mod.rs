// ==========================================
// CRM 导入向导 - API 层
// ==========================================
// 职责: 提供向导各步骤接口,供前端 / 命令行调用
// ==========================================

pub mod error;
pub mod import_wizard_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_wizard_api::{ImportStatusReport, ImportWizardApi, ReviewSummary, UploadResponse};
