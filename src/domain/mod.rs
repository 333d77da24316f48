// ==========================================
// CRM 导入向导 - 领域层
// ==========================================
// 职责: 导入会话 / 字段 / 关联 / 映射等领域类型
// ==========================================

pub mod entity_link;
pub mod field;
pub mod mapping;
pub mod record;
pub mod session;
pub mod types;

// 重导出核心类型
pub use entity_link::{EntityLink, LinkSource, LinkStorage, MatchKind, MatchableField};
pub use field::{ChoiceOption, FieldType, ImportField, Rule, CUSTOM_FIELD_PREFIX};
pub use mapping::{ColumnMapping, CorrectionSet, EntityLinkMapping, FieldMapping, ValueCorrection};
pub use record::{CrmRecord, RecordId, RecordPayload};
pub use session::{
    ImportResults, ImportRow, ImportSession, LinkResolution, LinkTarget, PreviewProgress,
    ValidationError,
};
pub use types::{
    DateFormat, EntityType, ImportStatus, MatchBehavior, MatchMethod, NumberFormat, RowAction,
};
