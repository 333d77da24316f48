// ==========================================
// CRM 导入向导 - 领域类型定义
// ==========================================
// 职责: 实体类型 / 会话状态 / 匹配决策 / 格式约定
// 序列化格式: 小写 snake_case（与前端轮询接口一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入目标实体 (Entity Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Company,
    Person,
    Opportunity,
    Task,
    Note,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Company,
        EntityType::Person,
        EntityType::Opportunity,
        EntityType::Task,
        EntityType::Note,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::Person => "person",
            EntityType::Opportunity => "opportunity",
            EntityType::Task => "task",
            EntityType::Note => "note",
        }
    }

    /// 单数显示名（用于校验消息）
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Company => "Company",
            EntityType::Person => "Person",
            EntityType::Opportunity => "Opportunity",
            EntityType::Task => "Task",
            EntityType::Note => "Note",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "company" | "companies" => Ok(EntityType::Company),
            "person" | "people" => Ok(EntityType::Person),
            "opportunity" | "opportunities" => Ok(EntityType::Opportunity),
            "task" | "tasks" => Ok(EntityType::Task),
            "note" | "notes" => Ok(EntityType::Note),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

// ==========================================
// 导入会话状态 (Import Status)
// ==========================================
// 生命周期: Uploading → Mapping → Reviewing → Previewing → Importing → Completed | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Uploading,
    Mapping,
    Reviewing,
    Previewing,
    Importing,
    Completed,
    Failed,
}

impl ImportStatus {
    /// 线上取值（数据库 / 轮询接口）
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Uploading => "uploading",
            ImportStatus::Mapping => "mapping",
            ImportStatus::Reviewing => "reviewing",
            ImportStatus::Previewing => "previewing",
            ImportStatus::Importing => "importing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }

    /// 向导允许的状态迁移
    ///
    /// 说明: Reviewing/Previewing 之间可以来回（用户回到上一步修改映射或修正值）
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        match (self, next) {
            (Uploading, Mapping) => true,
            (Mapping, Reviewing) => true,
            (Reviewing, Mapping | Reviewing | Previewing) => true,
            (Previewing, Mapping | Reviewing | Previewing | Importing) => true,
            (Importing, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "uploading" => Ok(ImportStatus::Uploading),
            "mapping" => Ok(ImportStatus::Mapping),
            "reviewing" => Ok(ImportStatus::Reviewing),
            "previewing" => Ok(ImportStatus::Previewing),
            "importing" => Ok(ImportStatus::Importing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(format!("unknown import status: {}", other)),
        }
    }
}

// ==========================================
// 行匹配决策 (Row Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    Create,
    Update,
    Skip,
}

impl RowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::Create => "create",
            RowAction::Update => "update",
            RowAction::Skip => "skip",
        }
    }
}

impl FromStr for RowAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "create" => Ok(RowAction::Create),
            "update" => Ok(RowAction::Update),
            "skip" => Ok(RowAction::Skip),
            other => Err(format!("unknown row action: {}", other)),
        }
    }
}

// ==========================================
// 匹配方式 (Match Method)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Id,
    Domain,
    Email,
    Name,
    None,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Id => "id",
            MatchMethod::Domain => "domain",
            MatchMethod::Email => "email",
            MatchMethod::Name => "name",
            MatchMethod::None => "none",
        }
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "id" => Ok(MatchMethod::Id),
            "domain" => Ok(MatchMethod::Domain),
            "email" => Ok(MatchMethod::Email),
            "name" => Ok(MatchMethod::Name),
            "none" => Ok(MatchMethod::None),
            other => Err(format!("unknown match method: {}", other)),
        }
    }
}

// ==========================================
// 匹配字段行为 (Match Behavior)
// ==========================================
// UpdateOnly: 仅更新已有记录（未命中 → Skip）
// MatchOrCreate: 命中更新，未命中新建
// Create: 不查找，总是新建（名称不保证唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBehavior {
    UpdateOnly,
    MatchOrCreate,
    Create,
}

impl MatchBehavior {
    pub fn allows_create(&self) -> bool {
        !matches!(self, MatchBehavior::UpdateOnly)
    }

    pub fn requires_lookup(&self) -> bool {
        !matches!(self, MatchBehavior::Create)
    }
}

// ==========================================
// 日期格式约定 (Date Format)
// ==========================================
// ISO: 时间在后; European / American: 时间在前（兼容常见外部导出格式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    #[default]
    Iso,
    European,
    American,
}

// ==========================================
// 数字格式约定 (Number Format)
// ==========================================
// Point: 1,234.56（小数点为 .）
// Comma: 1.234,56（小数点为 ,）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    #[default]
    Point,
    Comma,
}
