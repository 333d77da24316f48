// ==========================================
// CRM 导入向导 - 笔记导入声明
// ==========================================
// 无匹配字段: 每行都新建
// 关联: companies / people（多对多）
// ==========================================

use crate::domain::entity_link::{EntityLink, LinkStorage, MatchableField};
use crate::domain::field::{FieldType, ImportField, Rule};
use crate::domain::types::EntityType;
use crate::importer::definitions::person_link;
use crate::importer::importer_trait::{EntityImporter, ImporterDefinition};

pub struct NoteImporter {
    definition: ImporterDefinition,
}

impl NoteImporter {
    pub fn new() -> Self {
        Self {
            definition: ImporterDefinition {
                entity_type: EntityType::Note,
                fields: vec![
                    ImportField::new("title", "Title", FieldType::Text)
                        .required()
                        .rules([Rule::Max(255)])
                        .guesses(["subject", "name", "note title"]),
                    ImportField::new("body", "Body", FieldType::Text)
                        .guesses(["content", "note", "text", "notes"]),
                ],
                matchable_fields: Vec::new(),
                links: vec![
                    EntityLink::new(
                        "companies",
                        "Company",
                        EntityType::Company,
                        LinkStorage::ManyToMany {
                            relation: "note_companies".to_string(),
                        },
                    )
                    .matchers([MatchableField::id(), MatchableField::name()]),
                    person_link(
                        "people",
                        "Person",
                        LinkStorage::ManyToMany {
                            relation: "note_people".to_string(),
                        },
                    ),
                ],
            },
        }
    }
}

impl Default for NoteImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityImporter for NoteImporter {
    fn definition(&self) -> &ImporterDefinition {
        &self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_has_no_primary_matchers() {
        let importer = NoteImporter::new();
        assert!(importer.definition().matchable_fields.is_empty());
        assert_eq!(importer.definition().links.len(), 2);
    }
}
