// ==========================================
// CRM 导入向导 - 任务导入声明
// ==========================================
// 匹配: Record ID（仅更新）
// 关联: companies / people（多对多）
// ==========================================

use crate::domain::entity_link::{EntityLink, LinkStorage, MatchableField};
use crate::domain::field::{FieldType, ImportField, Rule};
use crate::domain::record::RecordPayload;
use crate::domain::types::EntityType;
use crate::importer::definitions::{person_link, record_id_field};
use crate::importer::importer_trait::{EntityImporter, ImporterDefinition};
use serde_json::Value;

pub struct TaskImporter {
    definition: ImporterDefinition,
}

impl TaskImporter {
    pub fn new() -> Self {
        let fields = vec![
            record_id_field().guesses(["record id", "task id"]),
            ImportField::new("title", "Title", FieldType::Text)
                .required()
                .rules([Rule::Max(255)])
                .guesses(["task", "subject", "name", "task name"]),
            ImportField::new("description", "Description", FieldType::Text)
                .guesses(["details", "notes", "body"]),
            ImportField::custom("due_date", "Due Date", FieldType::DateTime)
                .guesses(["due", "deadline", "due at"]),
            ImportField::custom("priority", "Priority", FieldType::SingleChoice)
                .options([
                    ("low", "Low"),
                    ("medium", "Medium"),
                    ("high", "High"),
                    ("urgent", "Urgent"),
                ]),
            ImportField::custom("status", "Status", FieldType::SingleChoice)
                .options([
                    ("to_do", "To do"),
                    ("in_progress", "In progress"),
                    ("done", "Done"),
                ])
                .guesses(["state"]),
        ];

        Self {
            definition: ImporterDefinition {
                entity_type: EntityType::Task,
                fields,
                matchable_fields: vec![MatchableField::id()],
                links: vec![
                    EntityLink::new(
                        "companies",
                        "Company",
                        EntityType::Company,
                        LinkStorage::ManyToMany {
                            relation: "task_companies".to_string(),
                        },
                    )
                    .matchers([MatchableField::id(), MatchableField::name()]),
                    person_link(
                        "people",
                        "Person",
                        LinkStorage::ManyToMany {
                            relation: "task_people".to_string(),
                        },
                    ),
                ],
            },
        }
    }
}

impl Default for TaskImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityImporter for TaskImporter {
    fn definition(&self) -> &ImporterDefinition {
        &self.definition
    }

    /// 新建任务默认状态为 to_do
    fn prepare_for_save(&self, payload: &mut RecordPayload, is_update: bool) {
        if !is_update && !payload.custom.contains_key("status") {
            payload
                .custom
                .insert("status".to_string(), Value::String("to_do".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_only_on_create() {
        let importer = TaskImporter::new();

        let mut created = RecordPayload::default();
        importer.prepare_for_save(&mut created, false);
        assert_eq!(created.custom["status"], "to_do");

        let mut updated = RecordPayload::default();
        importer.prepare_for_save(&mut updated, true);
        assert!(!updated.custom.contains_key("status"));
    }
}
