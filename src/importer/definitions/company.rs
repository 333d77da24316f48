// ==========================================
// CRM 导入向导 - 公司导入声明
// ==========================================
// 匹配: Record ID（仅更新）> 域名（命中更新，否则新建）> 名称（总是新建）
// ==========================================

use crate::domain::entity_link::MatchableField;
use crate::domain::field::{FieldType, ImportField, Rule};
use crate::domain::record::RecordPayload;
use crate::domain::types::EntityType;
use crate::importer::definitions::record_id_field;
use crate::importer::importer_trait::{EntityImporter, ImporterDefinition};
use crate::importer::normalize::normalize_domain;
use serde_json::Value;

pub struct CompanyImporter {
    definition: ImporterDefinition,
}

impl CompanyImporter {
    pub fn new() -> Self {
        let fields = vec![
            record_id_field().guesses(["record id", "company id"]),
            ImportField::new("name", "Name", FieldType::Text)
                .required()
                .rules([Rule::Max(255)])
                .guesses(["company name", "company", "organization", "organisation", "account name"]),
            ImportField::custom("domains", "Domains", FieldType::Tags)
                .rules([Rule::Domain])
                .guesses(["website", "web site", "url", "company domain"]),
            ImportField::custom("industry", "Industry", FieldType::SingleChoice)
                .options([
                    ("technology", "Technology"),
                    ("finance", "Finance"),
                    ("healthcare", "Healthcare"),
                    ("retail", "Retail"),
                    ("manufacturing", "Manufacturing"),
                    ("education", "Education"),
                    ("other", "Other"),
                ])
                .guesses(["sector", "vertical"]),
            ImportField::custom("employees", "Employees", FieldType::Number)
                .rules([Rule::Integer])
                .guesses(["employee count", "headcount", "company size", "number of employees"]),
            ImportField::custom("account_owner", "Account Owner Email", FieldType::Text)
                .rules([Rule::Email])
                .guesses(["account owner", "owner", "owner email"]),
        ];

        Self {
            definition: ImporterDefinition {
                entity_type: EntityType::Company,
                fields,
                matchable_fields: vec![
                    MatchableField::id(),
                    MatchableField::domain(),
                    MatchableField::name(),
                ],
                links: Vec::new(),
            },
        }
    }
}

impl Default for CompanyImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityImporter for CompanyImporter {
    fn definition(&self) -> &ImporterDefinition {
        &self.definition
    }

    /// 域名统一为裸域名并去重
    fn prepare_for_save(&self, payload: &mut RecordPayload, _is_update: bool) {
        let Some(Value::Array(items)) = payload.custom.get_mut("domains") else {
            return;
        };

        let mut seen = Vec::new();
        for item in items.iter() {
            if let Some(domain) = item.as_str().map(normalize_domain) {
                if !domain.is_empty() && !seen.contains(&domain) {
                    seen.push(domain);
                }
            }
        }
        *items = seen.into_iter().map(Value::String).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_normalizes_domains() {
        let importer = CompanyImporter::new();
        let mut payload = RecordPayload::default();
        payload.custom.insert(
            "domains".to_string(),
            json!(["https://www.Acme.com/", "acme.com", "shop.acme.com"]),
        );

        importer.prepare_for_save(&mut payload, false);

        assert_eq!(payload.custom["domains"], json!(["acme.com", "shop.acme.com"]));
    }

    #[test]
    fn test_domain_matcher_targets_domain_field() {
        let importer = CompanyImporter::new();
        let definition = importer.definition();
        let domain = definition.matchable_for_field("custom_fields_domains").unwrap();
        assert_eq!(domain.key(), "domain");
        assert!(definition.field("custom_fields_domains").unwrap().field_type.is_multi_value());
    }
}
