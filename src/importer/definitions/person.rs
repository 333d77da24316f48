// ==========================================
// CRM 导入向导 - 联系人导入声明
// ==========================================
// 匹配: Record ID（仅更新）> 邮箱（命中更新，否则新建）
// 关联: company（外键 company_id）
// ==========================================

use crate::domain::entity_link::{LinkStorage, MatchableField};
use crate::domain::field::{FieldType, ImportField, Rule};
use crate::domain::record::RecordPayload;
use crate::domain::types::EntityType;
use crate::importer::definitions::{company_link, record_id_field};
use crate::importer::importer_trait::{EntityImporter, ImporterDefinition};
use serde_json::Value;

pub struct PersonImporter {
    definition: ImporterDefinition,
}

impl PersonImporter {
    pub fn new() -> Self {
        let fields = vec![
            record_id_field().guesses(["record id", "person id", "contact id"]),
            ImportField::new("name", "Name", FieldType::Text)
                .required()
                .rules([Rule::Max(255)])
                .guesses(["full name", "contact name", "person", "contact"]),
            ImportField::custom("emails", "Emails", FieldType::Tags)
                .rules([Rule::Email])
                .guesses(["email address", "e mail", "email addresses", "work email"]),
            ImportField::custom("phone", "Phone", FieldType::Text)
                .rules([Rule::Max(50)])
                .guesses(["phone number", "mobile", "telephone", "tel"]),
            ImportField::custom("job_title", "Job Title", FieldType::Text)
                .rules([Rule::Max(255)])
                .guesses(["title", "position", "role"]),
            ImportField::custom("birthday", "Birthday", FieldType::Date)
                .guesses(["date of birth", "dob", "birth date"]),
        ];

        Self {
            definition: ImporterDefinition {
                entity_type: EntityType::Person,
                fields,
                matchable_fields: vec![MatchableField::id(), MatchableField::email()],
                links: vec![company_link(LinkStorage::ForeignKey {
                    column: "company_id".to_string(),
                })],
            },
        }
    }
}

impl Default for PersonImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityImporter for PersonImporter {
    fn definition(&self) -> &ImporterDefinition {
        &self.definition
    }

    /// 邮箱统一小写
    fn prepare_for_save(&self, payload: &mut RecordPayload, _is_update: bool) {
        if let Some(Value::Array(items)) = payload.custom.get_mut("emails") {
            for item in items.iter_mut() {
                if let Some(email) = item.as_str() {
                    *item = Value::String(email.trim().to_lowercase());
                }
            }
        }
    }
}
