// ==========================================
// CRM 导入向导 - 导入层
// ==========================================
// 职责: 导入管道中不依赖会话状态的纯组件
// - 文件解析 / 格式解析 / 列映射 / 列值校验 / 类型转换
// - 实体关联解析 / 同文件重复检测 / 实体导入声明
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod column_mapper;
pub mod column_validator;
pub mod definitions;
pub mod duplicate_detector;
pub mod entity_link_resolver;
pub mod error;
pub mod file_parser;
pub mod formats;
pub mod importer_trait;
pub mod normalize;
pub mod value_caster;

// 重导出核心类型
pub use column_mapper::{ColumnMapper, ColumnSpec, FieldColumn, LinkColumn};
pub use column_validator::ColumnValidator;
pub use definitions::importer_for;
pub use duplicate_detector::DuplicateDetector;
pub use entity_link_resolver::EntityLinkResolver;
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, ParsedSheet, UniversalFileParser};
pub use value_caster::ValueCaster;

// 重导出 Trait 接口
pub use importer_trait::{EntityImporter, FileParser, ImporterDefinition};
