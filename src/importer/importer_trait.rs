// ==========================================
// CRM 导入向导 - 导入器 Trait
// ==========================================
// 职责: 定义导入管道的接口（不包含实现）
// - FileParser: 上传文件 → 表头 + 原始行
// - EntityImporter: 每种实体的字段 / 匹配字段 / 关联声明 + 保存钩子
// ==========================================

use crate::domain::entity_link::{EntityLink, MatchableField};
use crate::domain::field::ImportField;
use crate::domain::record::{CrmRecord, RecordPayload};
use crate::domain::types::EntityType;
use crate::importer::error::ImportResult;
use crate::importer::file_parser::ParsedSheet;
use std::path::Path;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（上传阶段）
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件为表头 + 按列顺序排列的原始行
    ///
    /// # 参数
    /// - file_path: 文件路径
    ///
    /// # 返回
    /// - Ok(ParsedSheet): 表头与行
    /// - Err: 文件读取错误、格式错误、表头非法
    fn parse(&self, file_path: &Path) -> ImportResult<ParsedSheet>;
}

// ==========================================
// ImporterDefinition - 实体导入声明
// ==========================================
#[derive(Debug, Clone)]
pub struct ImporterDefinition {
    pub entity_type: EntityType,
    pub fields: Vec<ImportField>,
    /// 主记录匹配字段（空 → 每行都新建）
    pub matchable_fields: Vec<MatchableField>,
    pub links: Vec<EntityLink>,
}

impl ImporterDefinition {
    pub fn field(&self, key: &str) -> Option<&ImportField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn link(&self, key: &str) -> Option<&EntityLink> {
        self.links.iter().find(|l| l.key == key)
    }

    /// 按映射目标 key 查找主记录匹配字段（匹配字段的 field 与映射字段 key 相同）
    pub fn matchable_for_field(&self, field_key: &str) -> Option<&MatchableField> {
        self.matchable_fields.iter().find(|m| m.field == field_key)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &ImportField> {
        self.fields.iter().filter(|f| f.required)
    }
}

// ==========================================
// EntityImporter Trait
// ==========================================
// 用途: 每种实体一个实现（company / person / opportunity / task / note）
// 实现者: importer::definitions::*
pub trait EntityImporter: Send + Sync {
    /// 字段、匹配字段与关联声明
    fn definition(&self) -> &ImporterDefinition;

    fn entity_type(&self) -> EntityType {
        self.definition().entity_type
    }

    /// 保存前的数据准备（归一化 / 默认值）
    ///
    /// # 参数
    /// - payload: 核心属性 + 自定义字段（已去前缀）
    /// - is_update: 是否为更新已有记录
    fn prepare_for_save(&self, _payload: &mut RecordPayload, _is_update: bool) {}

    /// 保存后钩子（关联已写入）
    fn after_save(&self, _record: &CrmRecord, _payload: &RecordPayload) -> ImportResult<()> {
        Ok(())
    }
}
