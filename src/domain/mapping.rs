// ==========================================
// CRM 导入向导 - 列映射与值修正
// ==========================================
// ColumnMapping: 一个 CSV 表头 → 字段 / 实体关联匹配槽
// ValueCorrection: 按 (列, 原始值) 作用域的修正，对所有同值行生效
// ==========================================

use crate::domain::types::{DateFormat, NumberFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 映射到字段
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldMapping {
    /// CSV 表头
    pub source: String,
    /// 目标字段 key
    pub field: String,
    #[serde(default)]
    pub date_format: DateFormat,
    #[serde(default)]
    pub number_format: NumberFormat,
}

/// 映射到实体关联（例如 company via domain）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityLinkMapping {
    pub source: String,
    /// EntityLink.key
    pub link: String,
    /// MatchableField 匹配键（id / domain / email / name）
    pub matcher: String,
}

/// 列映射
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnMapping {
    Field(FieldMapping),
    EntityLink(EntityLinkMapping),
}

impl ColumnMapping {
    pub fn field(source: impl Into<String>, field: impl Into<String>) -> Self {
        ColumnMapping::Field(FieldMapping {
            source: source.into(),
            field: field.into(),
            date_format: DateFormat::default(),
            number_format: NumberFormat::default(),
        })
    }

    pub fn entity_link(
        source: impl Into<String>,
        link: impl Into<String>,
        matcher: impl Into<String>,
    ) -> Self {
        ColumnMapping::EntityLink(EntityLinkMapping {
            source: source.into(),
            link: link.into(),
            matcher: matcher.into(),
        })
    }

    pub fn with_date_format(mut self, format: DateFormat) -> Self {
        if let ColumnMapping::Field(m) = &mut self {
            m.date_format = format;
        }
        self
    }

    pub fn with_number_format(mut self, format: NumberFormat) -> Self {
        if let ColumnMapping::Field(m) = &mut self {
            m.number_format = format;
        }
        self
    }

    pub fn source(&self) -> &str {
        match self {
            ColumnMapping::Field(m) => &m.source,
            ColumnMapping::EntityLink(m) => &m.source,
        }
    }
}

/// 值修正
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCorrection {
    /// CSV 表头
    pub column: String,
    pub raw_value: String,
    pub corrected_value: Option<String>,
    /// 跳过该值（视为空）
    #[serde(default)]
    pub skipped: bool,
}

impl ValueCorrection {
    pub fn replace(
        column: impl Into<String>,
        raw_value: impl Into<String>,
        corrected_value: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            raw_value: raw_value.into(),
            corrected_value: Some(corrected_value.into()),
            skipped: false,
        }
    }

    pub fn skip(column: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            raw_value: raw_value.into(),
            corrected_value: None,
            skipped: true,
        }
    }

    /// 修正后的有效值
    pub fn effective_value(&self) -> &str {
        if self.skipped {
            return "";
        }
        self.corrected_value.as_deref().unwrap_or(&self.raw_value)
    }
}

/// 会话内全部修正，按 (列, 原始值) 索引
#[derive(Debug, Clone, Default)]
pub struct CorrectionSet {
    by_value: HashMap<(String, String), ValueCorrection>,
}

impl CorrectionSet {
    pub fn new(corrections: impl IntoIterator<Item = ValueCorrection>) -> Self {
        let by_value = corrections
            .into_iter()
            .map(|c| ((c.column.clone(), c.raw_value.clone()), c))
            .collect();
        Self { by_value }
    }

    /// 应用修正：无修正时返回原值
    pub fn apply<'a>(&'a self, column: &str, raw: &'a str) -> &'a str {
        self.by_value
            .get(&(column.to_string(), raw.to_string()))
            .map(|c| c.effective_value())
            .unwrap_or(raw)
    }

    pub fn get(&self, column: &str, raw: &str) -> Option<&ValueCorrection> {
        self.by_value.get(&(column.to_string(), raw.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_mapping_serde_tagged() {
        let mapping = ColumnMapping::entity_link("Company Domain", "company", "domain");
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["kind"], "entity_link");
        assert_eq!(json["matcher"], "domain");

        let back: ColumnMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn test_correction_set_applies_by_value() {
        let set = CorrectionSet::new([
            ValueCorrection::replace("Birthday", "31/02/1990", "28/02/1990"),
            ValueCorrection::skip("Phone", "n/a"),
        ]);

        assert_eq!(set.apply("Birthday", "31/02/1990"), "28/02/1990");
        assert_eq!(set.apply("Birthday", "01/01/1990"), "01/01/1990");
        assert_eq!(set.apply("Phone", "n/a"), "");
        // 修正按列隔离
        assert_eq!(set.apply("Other", "31/02/1990"), "31/02/1990");
    }
}
