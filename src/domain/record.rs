// ==========================================
// CRM 导入向导 - 目标记录
// ==========================================
// 说明: CRM 本体的 ORM 不在本仓库范围内，这里只保留导入所需的最小记录形态
// ==========================================

use crate::domain::types::EntityType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type RecordId = String;

/// CRM 记录（核心属性，自定义字段另存）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmRecord {
    pub id: RecordId,
    pub team_id: String,
    pub entity_type: EntityType,
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrmRecord {
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }
}

/// 一行待保存的数据：核心属性 + 自定义字段（已去掉前缀）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPayload {
    pub core: Map<String, Value>,
    pub custom: Map<String, Value>,
}
