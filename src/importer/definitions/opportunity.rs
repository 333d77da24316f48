// ==========================================
// CRM 导入向导 - 商机导入声明
// ==========================================
// 匹配: Record ID（仅更新）
// 关联: company（外键 company_id）/ contact（外键 contact_id）
// ==========================================

use crate::domain::entity_link::{LinkStorage, MatchableField};
use crate::domain::field::{FieldType, ImportField, Rule};
use crate::domain::types::EntityType;
use crate::importer::definitions::{company_link, person_link, record_id_field};
use crate::importer::importer_trait::{EntityImporter, ImporterDefinition};

pub struct OpportunityImporter {
    definition: ImporterDefinition,
}

impl OpportunityImporter {
    pub fn new() -> Self {
        let fields = vec![
            record_id_field().guesses(["record id", "opportunity id", "deal id"]),
            ImportField::new("name", "Name", FieldType::Text)
                .required()
                .rules([Rule::Max(255)])
                .guesses(["opportunity", "opportunity name", "deal", "deal name"]),
            ImportField::custom("amount", "Amount", FieldType::Number)
                .guesses(["value", "deal value", "deal amount", "revenue"]),
            ImportField::custom("close_date", "Close Date", FieldType::Date)
                .guesses(["expected close", "expected close date", "closing date"]),
            ImportField::custom("stage", "Stage", FieldType::SingleChoice)
                .options([
                    ("lead", "Lead"),
                    ("qualified", "Qualified"),
                    ("proposal", "Proposal"),
                    ("negotiation", "Negotiation"),
                    ("won", "Won"),
                    ("lost", "Lost"),
                ])
                .guesses(["pipeline stage", "deal stage", "status"]),
        ];

        Self {
            definition: ImporterDefinition {
                entity_type: EntityType::Opportunity,
                fields,
                matchable_fields: vec![MatchableField::id()],
                links: vec![
                    company_link(LinkStorage::ForeignKey {
                        column: "company_id".to_string(),
                    }),
                    person_link(
                        "contact",
                        "Contact",
                        LinkStorage::ForeignKey {
                            column: "contact_id".to_string(),
                        },
                    ),
                ],
            },
        }
    }
}

impl Default for OpportunityImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityImporter for OpportunityImporter {
    fn definition(&self) -> &ImporterDefinition {
        &self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_link_is_lookup_only() {
        let importer = OpportunityImporter::new();
        let contact = importer.definition().link("contact").unwrap();
        assert_eq!(contact.target, EntityType::Person);
        assert!(contact.can_create);
        assert!(contact.matcher("name").is_none());
        assert!(!contact.matcher("id").unwrap().behavior.allows_create());
    }
}
