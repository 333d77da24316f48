// ==========================================
// CRM 导入向导 - 实体导入声明注册表
// ==========================================
// 每种实体一个 EntityImporter 实现；importer_for 显式构造，无全局状态
// ==========================================

pub mod company;
pub mod note;
pub mod opportunity;
pub mod person;
pub mod task;

pub use company::CompanyImporter;
pub use note::NoteImporter;
pub use opportunity::OpportunityImporter;
pub use person::PersonImporter;
pub use task::TaskImporter;

use crate::domain::entity_link::{EntityLink, LinkStorage, MatchableField};
use crate::domain::field::{FieldType, ImportField};
use crate::domain::types::EntityType;
use crate::importer::importer_trait::EntityImporter;

/// 按实体类型构造导入声明
pub fn importer_for(entity: EntityType) -> Box<dyn EntityImporter> {
    match entity {
        EntityType::Company => Box::new(CompanyImporter::new()),
        EntityType::Person => Box::new(PersonImporter::new()),
        EntityType::Opportunity => Box::new(OpportunityImporter::new()),
        EntityType::Task => Box::new(TaskImporter::new()),
        EntityType::Note => Box::new(NoteImporter::new()),
    }
}

/// 记录 id 列（仅更新已有记录）
pub(crate) fn record_id_field() -> ImportField {
    ImportField::new("id", "Record ID", FieldType::Text).guesses(["record id", "uuid"])
}

/// 关联到公司（外键）: id / 域名 / 名称
pub(crate) fn company_link(storage: LinkStorage) -> EntityLink {
    EntityLink::new("company", "Company", EntityType::Company, storage).matchers([
        MatchableField::id(),
        MatchableField::domain(),
        MatchableField::name(),
    ])
}

/// 关联到联系人: id / 邮箱
pub(crate) fn person_link(
    key: &str,
    label: &str,
    storage: LinkStorage,
) -> EntityLink {
    EntityLink::new(key, label, EntityType::Person, storage)
        .matchers([MatchableField::id(), MatchableField::email()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_entity_has_importer() {
        for entity in EntityType::ALL {
            let importer = importer_for(entity);
            assert_eq!(importer.entity_type(), entity);
            assert!(importer.definition().required_fields().count() >= 1);
        }
    }

    #[test]
    fn test_matcher_priorities_are_distinct() {
        for entity in EntityType::ALL {
            let importer = importer_for(entity);
            let definition = importer.definition();

            let primary: HashSet<u32> = definition.matchable_fields.iter().map(|m| m.priority).collect();
            assert_eq!(primary.len(), definition.matchable_fields.len(), "{}", entity);

            for link in &definition.links {
                let priorities: HashSet<u32> = link.matchers.iter().map(|m| m.priority).collect();
                assert_eq!(priorities.len(), link.matchers.len(), "{}.{}", entity, link.key);
            }
        }
    }

    #[test]
    fn test_primary_matchers_are_mappable_fields() {
        for entity in EntityType::ALL {
            let importer = importer_for(entity);
            let definition = importer.definition();
            for matcher in &definition.matchable_fields {
                assert!(definition.field(&matcher.field).is_some(), "{} {}", entity, matcher.field);
            }
        }
    }
}
