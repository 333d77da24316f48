// ==========================================
// CRM 导入向导 - 列映射器
// ==========================================
// 职责: 表头 → 字段 / 实体关联匹配槽
// - guess_mappings: 按表头别名猜测映射
// - validate_mappings: 映射约束校验
// - resolve: 映射 → 带列下标的列规格（ColumnSpec）
// ==========================================

use crate::domain::entity_link::{EntityLink, MatchableField};
use crate::domain::field::ImportField;
use crate::domain::mapping::ColumnMapping;
use crate::domain::types::{DateFormat, MatchBehavior, NumberFormat};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::ImporterDefinition;
use std::collections::HashSet;

// ==========================================
// ColumnSpec - 已解析的列规格
// ==========================================

/// 映射到字段的列
#[derive(Debug, Clone)]
pub struct FieldColumn {
    pub source: String,
    pub index: usize,
    pub field: ImportField,
    pub date_format: DateFormat,
    pub number_format: NumberFormat,
}

/// 映射到实体关联的列
#[derive(Debug, Clone)]
pub struct LinkColumn {
    pub source: String,
    pub index: usize,
    pub link: EntityLink,
    pub matcher: MatchableField,
}

#[derive(Debug, Clone)]
pub enum ColumnSpec {
    Field(FieldColumn),
    Link(LinkColumn),
}

impl ColumnSpec {
    pub fn source(&self) -> &str {
        match self {
            ColumnSpec::Field(c) => &c.source,
            ColumnSpec::Link(c) => &c.source,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            ColumnSpec::Field(c) => c.index,
            ColumnSpec::Link(c) => c.index,
        }
    }
}

/// 表头归一化: 小写，`_` / `-` 视为空格，折叠空白
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ==========================================
// ColumnMapper
// ==========================================
pub struct ColumnMapper<'a> {
    definition: &'a ImporterDefinition,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(definition: &'a ImporterDefinition) -> Self {
        Self { definition }
    }

    /// 按表头猜测映射（先到先得，每个目标最多一列）
    pub fn guess_mappings(&self, headers: &[String]) -> Vec<ColumnMapping> {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut mappings = Vec::new();

        for header in headers {
            let normalized = normalize_header(header);
            if normalized.is_empty() {
                continue;
            }

            let field = self
                .definition
                .fields
                .iter()
                .find(|f| !claimed.contains(&f.key) && field_aliases(f).contains(&normalized));
            if let Some(field) = field {
                claimed.insert(field.key.clone());
                mappings.push(ColumnMapping::field(header.clone(), field.key.clone()));
                continue;
            }

            let link = self.definition.links.iter().find_map(|link| {
                if claimed.contains(&link_target(&link.key)) {
                    return None;
                }
                link.matchers
                    .iter()
                    .find(|m| link_aliases(link, m).contains(&normalized))
                    .map(|m| (link, m))
            });
            if let Some((link, matcher)) = link {
                claimed.insert(link_target(&link.key));
                mappings.push(ColumnMapping::entity_link(
                    header.clone(),
                    link.key.clone(),
                    matcher.key(),
                ));
            }
        }

        mappings
    }

    /// 映射约束校验
    ///
    /// # 规则
    /// - 映射的表头必须存在，且每个表头最多映射一次
    /// - 每个字段最多映射一列
    /// - 每个实体关联最多一个匹配字段
    /// - 必填字段必须映射（映射了仅更新的匹配字段时除外）
    pub fn validate_mappings(&self, headers: &[String], mappings: &[ColumnMapping]) -> ImportResult<()> {
        let mut sources = HashSet::new();
        let mut fields = HashSet::new();
        let mut links = HashSet::new();

        for mapping in mappings {
            let source = mapping.source();
            if !headers.iter().any(|h| h == source) {
                return Err(mapping_error(format!("column \"{}\" does not exist in the file", source)));
            }
            if !sources.insert(source) {
                return Err(mapping_error(format!("column \"{}\" is mapped more than once", source)));
            }

            match mapping {
                ColumnMapping::Field(m) => {
                    let field = self
                        .definition
                        .field(&m.field)
                        .ok_or_else(|| mapping_error(format!("unknown field \"{}\"", m.field)))?;
                    if !fields.insert(field.key.as_str()) {
                        return Err(mapping_error(format!(
                            "field \"{}\" is mapped to more than one column",
                            field.label
                        )));
                    }
                }
                ColumnMapping::EntityLink(m) => {
                    let link = self
                        .definition
                        .link(&m.link)
                        .ok_or_else(|| mapping_error(format!("unknown relationship \"{}\"", m.link)))?;
                    if link.matcher(&m.matcher).is_none() {
                        return Err(mapping_error(format!(
                            "{} cannot be matched by \"{}\"",
                            link.label, m.matcher
                        )));
                    }
                    if !links.insert(link.key.as_str()) {
                        return Err(mapping_error(format!(
                            "{} can only be matched by one column",
                            link.label
                        )));
                    }
                }
            }
        }

        let update_only_mapped = self.definition.matchable_fields.iter().any(|m| {
            m.behavior == MatchBehavior::UpdateOnly && fields.contains(m.field.as_str())
        });
        if !update_only_mapped {
            if let Some(missing) = self
                .definition
                .required_fields()
                .find(|f| !fields.contains(f.key.as_str()))
            {
                return Err(mapping_error(format!(
                    "required field \"{}\" is not mapped",
                    missing.label
                )));
            }
        }

        Ok(())
    }

    /// 校验并解析为列规格（按表头顺序）
    pub fn resolve(&self, headers: &[String], mappings: &[ColumnMapping]) -> ImportResult<Vec<ColumnSpec>> {
        self.validate_mappings(headers, mappings)?;

        let mut specs = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let index = headers
                .iter()
                .position(|h| h == mapping.source())
                .ok_or_else(|| mapping_error(format!("column \"{}\" does not exist", mapping.source())))?;

            let spec = match mapping {
                ColumnMapping::Field(m) => {
                    let field = self
                        .definition
                        .field(&m.field)
                        .ok_or_else(|| mapping_error(format!("unknown field \"{}\"", m.field)))?;
                    ColumnSpec::Field(FieldColumn {
                        source: m.source.clone(),
                        index,
                        field: field.clone(),
                        date_format: m.date_format,
                        number_format: m.number_format,
                    })
                }
                ColumnMapping::EntityLink(m) => {
                    let link = self
                        .definition
                        .link(&m.link)
                        .ok_or_else(|| mapping_error(format!("unknown relationship \"{}\"", m.link)))?;
                    let matcher = link
                        .matcher(&m.matcher)
                        .ok_or_else(|| mapping_error(format!("unknown matcher \"{}\"", m.matcher)))?;
                    ColumnSpec::Link(LinkColumn {
                        source: m.source.clone(),
                        index,
                        link: link.clone(),
                        matcher: matcher.clone(),
                    })
                }
            };
            specs.push(spec);
        }

        specs.sort_by_key(ColumnSpec::index);
        Ok(specs)
    }
}

fn mapping_error(message: String) -> ImportError {
    ImportError::FieldMappingError(message)
}

fn link_target(key: &str) -> String {
    format!("link:{}", key)
}

fn field_aliases(field: &ImportField) -> Vec<String> {
    let key = field.custom_code().unwrap_or(&field.key);
    let mut aliases = vec![normalize_header(key), normalize_header(&field.label)];
    aliases.extend(field.guesses.iter().map(|g| normalize_header(g)));
    // 多值字段常以单数表头出现（Email / Domain）
    if field.field_type.is_multi_value() {
        if let Some(singular) = normalize_header(&field.label).strip_suffix('s') {
            aliases.push(singular.to_string());
        }
    }
    aliases
}

fn link_aliases(link: &EntityLink, matcher: &MatchableField) -> Vec<String> {
    let mut aliases = Vec::new();
    for base in [&link.key, &link.label] {
        for suffix in [matcher.key(), matcher.label.as_str()] {
            aliases.push(normalize_header(&format!("{} {}", base, suffix)));
        }
        // "Company" 本身视为按名称关联
        if matcher.key() == "name" {
            aliases.push(normalize_header(base));
        }
    }
    aliases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::EntityType;
    use crate::importer::definitions::importer_for;

    fn headers(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Company_Domain "), "company domain");
        assert_eq!(normalize_header("E-Mail"), "e mail");
    }

    #[test]
    fn test_guess_person_mappings() {
        let importer = importer_for(EntityType::Person);
        let mapper = ColumnMapper::new(importer.definition());
        let headers = headers(&["Full Name", "Email", "Company Domain", "Notes"]);

        let mappings = mapper.guess_mappings(&headers);

        assert!(mappings.contains(&ColumnMapping::field("Full Name", "name")));
        assert!(mappings.contains(&ColumnMapping::field("Email", "custom_fields_emails")));
        assert!(mappings.contains(&ColumnMapping::entity_link("Company Domain", "company", "domain")));
        assert_eq!(mappings.len(), 3);
        mapper.validate_mappings(&headers, &mappings).unwrap();
    }

    #[test]
    fn test_first_header_claiming_target_wins() {
        let importer = importer_for(EntityType::Company);
        let mapper = ColumnMapper::new(importer.definition());
        let mappings = mapper.guess_mappings(&headers(&["Name", "Company Name"]));

        assert_eq!(mappings, vec![ColumnMapping::field("Name", "name")]);
    }

    #[test]
    fn test_validate_rejects_missing_required_field() {
        let importer = importer_for(EntityType::Person);
        let mapper = ColumnMapper::new(importer.definition());
        let headers = headers(&["Email"]);

        let result = mapper.validate_mappings(&headers, &[ColumnMapping::field("Email", "custom_fields_emails")]);
        assert!(matches!(result, Err(ImportError::FieldMappingError(_))));
    }

    #[test]
    fn test_validate_allows_missing_required_with_record_id() {
        let importer = importer_for(EntityType::Person);
        let mapper = ColumnMapper::new(importer.definition());
        let headers = headers(&["ID", "Phone"]);

        mapper
            .validate_mappings(
                &headers,
                &[
                    ColumnMapping::field("ID", "id"),
                    ColumnMapping::field("Phone", "custom_fields_phone"),
                ],
            )
            .unwrap();
    }

    #[test]
    fn test_validate_one_matcher_per_link() {
        let importer = importer_for(EntityType::Person);
        let mapper = ColumnMapper::new(importer.definition());
        let headers = headers(&["Name", "Company", "Company Domain"]);

        let result = mapper.validate_mappings(
            &headers,
            &[
                ColumnMapping::field("Name", "name"),
                ColumnMapping::entity_link("Company", "company", "name"),
                ColumnMapping::entity_link("Company Domain", "company", "domain"),
            ],
        );
        assert!(matches!(result, Err(ImportError::FieldMappingError(_))));
    }

    #[test]
    fn test_resolve_orders_by_column() {
        let importer = importer_for(EntityType::Person);
        let mapper = ColumnMapper::new(importer.definition());
        let headers = headers(&["Birthday", "Name"]);

        let specs = mapper
            .resolve(
                &headers,
                &[
                    ColumnMapping::field("Name", "name"),
                    ColumnMapping::field("Birthday", "custom_fields_birthday")
                        .with_date_format(DateFormat::European),
                ],
            )
            .unwrap();

        assert_eq!(specs[0].source(), "Birthday");
        assert_eq!(specs[1].index(), 1);
        match &specs[0] {
            ColumnSpec::Field(c) => assert_eq!(c.date_format, DateFormat::European),
            ColumnSpec::Link(_) => panic!("expected field column"),
        }
    }
}
