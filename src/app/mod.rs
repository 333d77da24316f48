// ==========================================
// CRM 导入向导 - 应用层
// ==========================================
// 职责: 组装各层组件，供命令行与宿主应用使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, RunnerMode};
