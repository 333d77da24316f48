// ==========================================
// CRM 导入向导 - 实体关联声明
// ==========================================
// 职责: EntityLink（关联到公司/联系人/商机）+ MatchableField（匹配策略）
// 说明: 声明式描述，解析逻辑见 importer::entity_link_resolver
// ==========================================

use crate::domain::field::CUSTOM_FIELD_PREFIX;
use crate::domain::types::{EntityType, MatchBehavior, MatchMethod};
use serde::{Deserialize, Serialize};

/// 匹配语义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Id,
    Domain,
    Email,
    Name,
}

impl MatchKind {
    pub fn method(&self) -> MatchMethod {
        match self {
            MatchKind::Id => MatchMethod::Id,
            MatchKind::Domain => MatchMethod::Domain,
            MatchKind::Email => MatchMethod::Email,
            MatchKind::Name => MatchMethod::Name,
        }
    }
}

/// 匹配字段（一种解析记录的策略）
///
/// priority 越大越优先；同一实体内各匹配字段的 priority 互不相同。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchableField {
    /// 目标记录上的字段 key（id / name / custom_fields_xxx）
    pub field: String,
    pub label: String,
    pub kind: MatchKind,
    pub priority: u32,
    pub behavior: MatchBehavior,
}

impl MatchableField {
    pub fn id() -> Self {
        Self {
            field: "id".to_string(),
            label: "Record ID".to_string(),
            kind: MatchKind::Id,
            priority: 100,
            behavior: MatchBehavior::UpdateOnly,
        }
    }

    pub fn domain() -> Self {
        Self {
            field: format!("{}domains", CUSTOM_FIELD_PREFIX),
            label: "Domain".to_string(),
            kind: MatchKind::Domain,
            priority: 50,
            behavior: MatchBehavior::MatchOrCreate,
        }
    }

    pub fn email() -> Self {
        Self {
            field: format!("{}emails", CUSTOM_FIELD_PREFIX),
            label: "Email".to_string(),
            kind: MatchKind::Email,
            priority: 50,
            behavior: MatchBehavior::MatchOrCreate,
        }
    }

    pub fn name() -> Self {
        Self {
            field: "name".to_string(),
            label: "Name".to_string(),
            kind: MatchKind::Name,
            priority: 10,
            behavior: MatchBehavior::Create,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_behavior(mut self, behavior: MatchBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// 只新建、不查找（例如按名称匹配）
    pub fn is_create_only(&self) -> bool {
        !self.behavior.requires_lookup()
    }

    /// 匹配键（映射与前端使用）
    pub fn key(&self) -> &'static str {
        match self.kind {
            MatchKind::Id => "id",
            MatchKind::Domain => "domain",
            MatchKind::Email => "email",
            MatchKind::Name => "name",
        }
    }
}

/// 关联来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    /// 模型上硬编码的关联
    Relationship,
    /// 由自定义字段（记录引用类型）承载的关联
    CustomField,
}

/// 关联存储方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkStorage {
    /// 外键写在记录核心属性上
    ForeignKey { column: String },
    /// 多对多中间表（crm_record_link.relation）
    ManyToMany { relation: String },
    /// 写入自定义字段值
    CustomFieldValue { code: String },
}

/// 实体关联声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub key: String,
    pub label: String,
    pub source: LinkSource,
    pub target: EntityType,
    pub storage: LinkStorage,
    pub matchers: Vec<MatchableField>,
    pub can_create: bool,
}

impl EntityLink {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        target: EntityType,
        storage: LinkStorage,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            source: LinkSource::Relationship,
            target,
            storage,
            matchers: Vec::new(),
            can_create: false,
        }
    }

    pub fn from_custom_field(mut self) -> Self {
        self.source = LinkSource::CustomField;
        self
    }

    pub fn matchers(mut self, matchers: impl IntoIterator<Item = MatchableField>) -> Self {
        self.matchers.extend(matchers);
        self.can_create = self.matchers.iter().any(|m| m.behavior.allows_create());
        self
    }

    /// 按匹配键查找（id / domain / email / name）
    pub fn matcher(&self, key: &str) -> Option<&MatchableField> {
        self.matchers.iter().find(|m| m.key() == key)
    }
}
