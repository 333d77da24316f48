// ==========================================
// CRM 导入向导 - 导入会话 / 暂存行 / 进度
// ==========================================
// 依据: 导入向导数据模型（ImportSession / ImportRow / ImportResult）
// ==========================================

use crate::domain::types::{EntityType, ImportStatus, MatchMethod, RowAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// ImportSession - 一次导入
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub entity_type: EntityType,
    /// 上传文件路径
    pub file_path: String,
    /// 预览阶段输出的工作文件（JSON Lines）
    pub working_file_path: Option<String>,
    pub headers: Vec<String>,
    pub total_rows: u32,
    pub status: ImportStatus,
    /// 映射 + 修正的指纹，用于判断后台任务是否过期
    pub input_hash: Option<String>,
    pub heartbeat_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportSession {
    /// 表头所在列下标
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

// ==========================================
// 单元格校验错误
// ==========================================
// Message: 标量错误
// Items: 多值字段，仅包含无效项 → 错误消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationError {
    Message(String),
    Items(BTreeMap<String, String>),
}

impl ValidationError {
    pub fn message(msg: impl Into<String>) -> Self {
        ValidationError::Message(msg.into())
    }

    /// 单行摘要（日志 / 列表展示）
    pub fn summary(&self) -> String {
        match self {
            ValidationError::Message(msg) => msg.clone(),
            ValidationError::Items(items) => items
                .iter()
                .map(|(item, msg)| format!("{}: {}", item, msg))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

// ==========================================
// 实体关联解析结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkTarget {
    /// 已存在的记录
    Existing { id: String },
    /// 需新建（按名称）
    Create { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkResolution {
    /// EntityLink.key
    pub link: String,
    /// 匹配键
    pub matcher: String,
    pub value: String,
    pub target: LinkTarget,
}

// ==========================================
// ImportRow - 暂存行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub row_number: u32,
    /// 原始单元格（按原始列顺序）
    pub raw: Vec<String>,
    /// 修正并类型转换后的字段值（匹配阶段写入）
    pub values: Option<Map<String, Value>>,
    pub action: Option<RowAction>,
    pub matched_id: Option<String>,
    pub match_method: Option<MatchMethod>,
    pub relationships: Vec<LinkResolution>,
    /// 列表头 → 校验错误（无错误的列不出现）
    pub validation: BTreeMap<String, ValidationError>,
    pub skipped: bool,
}

impl ImportRow {
    pub fn new(row_number: u32, raw: Vec<String>) -> Self {
        Self {
            row_number,
            raw,
            values: None,
            action: None,
            matched_id: None,
            match_method: None,
            relationships: Vec::new(),
            validation: BTreeMap::new(),
            skipped: false,
        }
    }

    pub fn cell(&self, index: usize) -> &str {
        self.raw.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        !self.validation.is_empty()
    }
}

// ==========================================
// 预览进度（轮询接口）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewProgress {
    /// 已处理行数（也是续跑偏移）
    pub processed: u32,
    pub creates: u32,
    pub updates: u32,
    pub skips: u32,
    /// 将被自动新建的公司名（集合，避免同名多次计数）
    pub new_companies: BTreeSet<String>,
    pub completed: bool,
}

// ==========================================
// 导入结果（落库阶段）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportResults {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    /// 已处理到的行号（续跑偏移）
    pub last_row_number: u32,
}

impl ImportResults {
    pub fn total(&self) -> u32 {
        self.created + self.updated + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_untagged_serde() {
        let msg = ValidationError::message("bad");
        assert_eq!(serde_json::to_string(&msg).unwrap(), "\"bad\"");

        let mut items = BTreeMap::new();
        items.insert("x@".to_string(), "invalid".to_string());
        let err = ValidationError::Items(items);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["x@"], "invalid");

        let back: ValidationError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_row_cell_out_of_range_is_blank() {
        let row = ImportRow::new(1, vec!["a".to_string()]);
        assert_eq!(row.cell(0), "a");
        assert_eq!(row.cell(3), "");
    }

    #[test]
    fn test_progress_and_results_from_empty_object() {
        let progress: PreviewProgress = serde_json::from_str("{}").unwrap();
        assert_eq!(progress, PreviewProgress::default());

        let results: ImportResults = serde_json::from_str(r#"{"created":3}"#).unwrap();
        assert_eq!(results.created, 3);
        assert_eq!(results.total(), 3);
    }
}
