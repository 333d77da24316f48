// ==========================================
// CRM 导入向导 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod custom_field_repo;
pub mod error;
pub mod import_store;
pub mod record_repo;

// 重导出核心仓储
pub use custom_field_repo::{CustomFieldStore, SqliteCustomFieldStore};
pub use error::{RepositoryError, RepositoryResult};
pub use import_store::{ImportStore, NewImportSession, UniqueValue};
pub use record_repo::{Normalizer, RecordRepository, SqliteRecordRepository};
