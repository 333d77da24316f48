// ==========================================
// CRM 导入向导 - 匹配决策
// ==========================================
// 职责: 为每一行确定 Create / Update / Skip，并解析行内实体关联
// 规则:
// - 未映射任何匹配字段 → 全部 Create
// - 映射了多个匹配字段 → 取 priority 最高的一个（不是声明顺序）
// - 命中 → Update；未命中 → Create（允许新建）或 Skip（仅更新）
// - 同文件重复匹配键 / 重复更新同一记录 → 后出现的行 Skip
// - 关联解析与主记录决策互相独立
// ==========================================

use crate::domain::entity_link::MatchableField;
use crate::domain::mapping::CorrectionSet;
use crate::domain::session::{ImportRow, LinkResolution, LinkTarget};
use crate::domain::types::{EntityType, MatchMethod, RowAction};
use crate::importer::column_mapper::{ColumnSpec, FieldColumn, LinkColumn};
use crate::importer::column_validator::split_items;
use crate::importer::duplicate_detector::DuplicateDetector;
use crate::importer::entity_link_resolver::EntityLinkResolver;
use crate::importer::error::ImportResult;
use crate::importer::importer_trait::ImporterDefinition;
use crate::importer::normalize::normalizer_for;
use crate::importer::value_caster::ValueCaster;
use serde_json::Map;
use std::collections::HashMap;
use tracing::debug;

/// 主记录匹配列
#[derive(Debug, Clone)]
struct PrimaryMatcher {
    column: FieldColumn,
    matcher: MatchableField,
}

pub struct MatchResolver {
    entity_type: EntityType,
    columns: Vec<ColumnSpec>,
    corrections: CorrectionSet,
    links: EntityLinkResolver,
    primary: Option<PrimaryMatcher>,
    detector: DuplicateDetector,
}

impl MatchResolver {
    /// # 参数
    /// - definition: 实体导入声明
    /// - columns: 已解析的列规格
    /// - corrections: 会话内全部值修正
    /// - links: 关联解析器（主记录查找也走它）
    pub fn new(
        definition: &ImporterDefinition,
        columns: Vec<ColumnSpec>,
        corrections: CorrectionSet,
        links: EntityLinkResolver,
    ) -> Self {
        let primary = columns
            .iter()
            .filter_map(|spec| match spec {
                ColumnSpec::Field(column) => definition
                    .matchable_for_field(&column.field.key)
                    .map(|matcher| PrimaryMatcher {
                        column: column.clone(),
                        matcher: matcher.clone(),
                    }),
                ColumnSpec::Link(_) => None,
            })
            .max_by_key(|p| p.matcher.priority);

        Self {
            entity_type: definition.entity_type,
            columns,
            corrections,
            links,
            primary,
            detector: DuplicateDetector::new(),
        }
    }

    /// 生效的主匹配字段（None → 每行新建）
    pub fn primary_matcher(&self) -> Option<&MatchableField> {
        self.primary.as_ref().map(|p| &p.matcher)
    }

    /// 续跑时回放已处理的行，恢复同文件重复检测状态
    pub fn replay(&mut self, row: &ImportRow) {
        if row.skipped {
            return;
        }
        if let Some(key) = self.primary_key(row) {
            self.detector.check_key(&key, row.row_number);
        }
        if let (Some(RowAction::Update), Some(id)) = (row.action, row.matched_id.as_deref()) {
            self.detector.check_target(id, row.row_number);
        }
    }

    /// 处理一块行（按行号顺序）
    ///
    /// # 返回
    /// - 写入了 values / action / matched_id / relationships 的行
    pub fn resolve_chunk(&mut self, rows: Vec<ImportRow>) -> ImportResult<Vec<ImportRow>> {
        let primary_hits = self.lookup_primary(&rows)?;
        let link_hits = self.lookup_links(&rows)?;

        let mut resolved = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.values = None;
            row.action = None;
            row.matched_id = None;
            row.match_method = None;
            row.relationships = Vec::new();

            if row.skipped {
                row.action = Some(RowAction::Skip);
                resolved.push(row);
                continue;
            }

            row.values = Some(self.cast_values(&row));
            self.decide(&mut row, &primary_hits);
            row.relationships = self.resolve_links(&row, &link_hits);
            resolved.push(row);
        }

        Ok(resolved)
    }

    /// 单元格修正后的有效值
    fn effective<'a>(&'a self, source: &str, row: &'a ImportRow, index: usize) -> &'a str {
        self.corrections.apply(source, row.cell(index)).trim()
    }

    fn cast_values(&self, row: &ImportRow) -> Map<String, serde_json::Value> {
        let mut values = Map::new();
        for spec in &self.columns {
            if let ColumnSpec::Field(column) = spec {
                let raw = self.effective(&column.source, row, column.index);
                if let Some(value) = ValueCaster::cast(column, raw) {
                    values.insert(column.field.key.clone(), value);
                }
            }
        }
        values
    }

    /// 主匹配值（多值字段取第一项）
    fn primary_value(&self, row: &ImportRow) -> Option<String> {
        let primary = self.primary.as_ref()?;
        let raw = self.effective(&primary.column.source, row, primary.column.index);
        let value = if primary.column.field.field_type.is_multi_value() {
            split_items(raw).into_iter().next()?
        } else {
            raw.to_string()
        };
        (!value.is_empty()).then_some(value)
    }

    /// 同文件重复检测键（仅查找型匹配字段）
    fn primary_key(&self, row: &ImportRow) -> Option<String> {
        let primary = self.primary.as_ref()?;
        if primary.matcher.is_create_only() {
            return None;
        }
        self.primary_value(row)
            .map(|value| normalizer_for(primary.matcher.kind)(&value))
    }

    fn lookup_primary(&self, rows: &[ImportRow]) -> ImportResult<HashMap<String, String>> {
        let Some(primary) = self.primary.as_ref() else {
            return Ok(HashMap::new());
        };
        if primary.matcher.is_create_only() {
            return Ok(HashMap::new());
        }

        let values: Vec<String> = rows
            .iter()
            .filter(|row| !row.skipped)
            .filter_map(|row| self.primary_value(row))
            .collect();
        self.links.lookup(self.entity_type, &primary.matcher, &values)
    }

    /// 每个关联列一次批量查找
    ///
    /// # 返回
    /// - 列表头 → (有效值 → 记录 id)
    fn lookup_links(
        &self,
        rows: &[ImportRow],
    ) -> ImportResult<HashMap<String, HashMap<String, String>>> {
        let mut hits = HashMap::new();
        for spec in &self.columns {
            let ColumnSpec::Link(column) = spec else {
                continue;
            };
            let values: Vec<String> = rows
                .iter()
                .filter(|row| !row.skipped)
                .map(|row| self.effective(&column.source, row, column.index).to_string())
                .filter(|value| !value.is_empty())
                .collect();
            let found = self
                .links
                .batch_resolve(&column.link, &column.matcher, &values)?;
            hits.insert(column.source.clone(), found);
        }
        Ok(hits)
    }

    fn decide(&mut self, row: &mut ImportRow, primary_hits: &HashMap<String, String>) {
        let Some(primary) = self.primary.clone() else {
            row.action = Some(RowAction::Create);
            row.match_method = Some(MatchMethod::None);
            return;
        };

        let Some(value) = self.primary_value(row) else {
            row.action = Some(RowAction::Create);
            row.match_method = Some(MatchMethod::None);
            return;
        };

        if primary.matcher.is_create_only() {
            row.action = Some(RowAction::Create);
            row.match_method = Some(MatchMethod::None);
            return;
        }

        let key = normalizer_for(primary.matcher.kind)(&value);
        if let Some(first) = self.detector.check_key(&key, row.row_number) {
            debug!(row_number = row.row_number, first_row = first, key = %key, "同文件重复匹配键");
            row.action = Some(RowAction::Skip);
            return;
        }

        match primary_hits.get(&value) {
            Some(id) => {
                if let Some(first) = self.detector.check_target(id, row.row_number) {
                    debug!(row_number = row.row_number, first_row = first, record_id = %id, "重复更新同一记录");
                    row.action = Some(RowAction::Skip);
                    return;
                }
                row.action = Some(RowAction::Update);
                row.matched_id = Some(id.clone());
                row.match_method = Some(primary.matcher.kind.method());
            }
            None if primary.matcher.behavior.allows_create() => {
                row.action = Some(RowAction::Create);
                row.match_method = Some(MatchMethod::None);
            }
            None => {
                debug!(row_number = row.row_number, value = %value, "仅更新的匹配字段未命中");
                row.action = Some(RowAction::Skip);
            }
        }
    }

    fn resolve_links(
        &self,
        row: &ImportRow,
        link_hits: &HashMap<String, HashMap<String, String>>,
    ) -> Vec<LinkResolution> {
        self.columns
            .iter()
            .filter_map(|spec| match spec {
                ColumnSpec::Link(column) => self.resolve_link(row, column, link_hits),
                ColumnSpec::Field(_) => None,
            })
            .collect()
    }

    fn resolve_link(
        &self,
        row: &ImportRow,
        column: &LinkColumn,
        link_hits: &HashMap<String, HashMap<String, String>>,
    ) -> Option<LinkResolution> {
        let value = self.effective(&column.source, row, column.index);
        if value.is_empty() {
            return None;
        }

        let found = link_hits
            .get(&column.source)
            .and_then(|hits| hits.get(value));
        let target = match found {
            Some(id) => LinkTarget::Existing { id: id.clone() },
            None if column.matcher.behavior.allows_create() && column.link.can_create => {
                LinkTarget::Create {
                    name: value.to_string(),
                }
            }
            None => return None,
        };

        Some(LinkResolution {
            link: column.link.key.clone(),
            matcher: column.matcher.key().to_string(),
            value: value.to_string(),
            target,
        })
    }
}
