// ==========================================
// CRM 导入向导 - 实体关联解析器
// ==========================================
// 职责: 按匹配策略把单元格值解析为已有记录
// - validate / batch_validate: 评审阶段，返回校验错误（数据）
// - resolved_id / batch_resolve: 匹配与落库阶段，返回命中的记录 id
// 两组接口共用同一查找逻辑，保证"校验通过 ⇔ 可解析出 id"
// 约定:
// - 只新建的匹配字段（按名称）总是通过，不查找
// - 空白值总是通过
// - 查找按 team 隔离
// ==========================================

use crate::domain::entity_link::{EntityLink, MatchableField};
use crate::domain::record::RecordId;
use crate::domain::session::ValidationError;
use crate::domain::types::EntityType;
use crate::i18n::t_with_args;
use crate::importer::error::ImportResult;
use crate::importer::normalize::normalizer_for;
use crate::repository::record_repo::RecordRepository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub struct EntityLinkResolver {
    records: Arc<dyn RecordRepository>,
    team_id: String,
}

impl EntityLinkResolver {
    pub fn new(records: Arc<dyn RecordRepository>, team_id: impl Into<String>) -> Self {
        Self {
            records,
            team_id: team_id.into(),
        }
    }

    /// 校验单个值
    pub fn validate(
        &self,
        link: &EntityLink,
        matcher: &MatchableField,
        raw: &str,
    ) -> ImportResult<Option<ValidationError>> {
        let mut results = self.batch_validate(link, matcher, &[raw.to_string()])?;
        Ok(results.remove(raw).flatten())
    }

    /// 批量校验
    ///
    /// # 返回
    /// - 原始值 → 错误（None 表示通过）；全部为空白时不发起查找
    pub fn batch_validate(
        &self,
        link: &EntityLink,
        matcher: &MatchableField,
        values: &[String],
    ) -> ImportResult<HashMap<String, Option<ValidationError>>> {
        if matcher.is_create_only() {
            return Ok(values.iter().map(|v| (v.clone(), None)).collect());
        }

        let found = self.lookup(link.target, matcher, values)?;

        Ok(values
            .iter()
            .map(|raw| {
                let value = raw.trim();
                let error = if value.is_empty() || found.contains_key(raw) {
                    None
                } else {
                    Some(ValidationError::message(t_with_args(
                        "validation.link_not_found",
                        &[
                            ("link", link.label.as_str()),
                            ("matcher", matcher.label.as_str()),
                            ("value", value),
                        ],
                    )))
                };
                (raw.clone(), error)
            })
            .collect())
    }

    /// 解析单个值为已有记录 id（只新建的匹配字段返回 None）
    pub fn resolved_id(
        &self,
        link: &EntityLink,
        matcher: &MatchableField,
        raw: &str,
    ) -> ImportResult<Option<RecordId>> {
        let mut found = self.batch_resolve(link, matcher, &[raw.to_string()])?;
        Ok(found.remove(raw))
    }

    /// 批量解析
    ///
    /// # 返回
    /// - 原始值 → 记录 id（未命中 / 空白 / 只新建的匹配字段不出现）
    pub fn batch_resolve(
        &self,
        link: &EntityLink,
        matcher: &MatchableField,
        values: &[String],
    ) -> ImportResult<HashMap<String, RecordId>> {
        if matcher.is_create_only() {
            return Ok(HashMap::new());
        }
        self.lookup(link.target, matcher, values)
    }

    /// 按匹配字段查找实体记录（主记录匹配也走这里）
    ///
    /// # 返回
    /// - 原始值 → 记录 id
    pub fn lookup(
        &self,
        entity: EntityType,
        matcher: &MatchableField,
        values: &[String],
    ) -> ImportResult<HashMap<String, RecordId>> {
        let normalize = normalizer_for(matcher.kind);

        let mut normalized_by_raw: HashMap<&str, String> = HashMap::new();
        let mut wanted: HashSet<String> = HashSet::new();
        for raw in values {
            if raw.trim().is_empty() {
                continue;
            }
            let key = normalize(raw);
            wanted.insert(key.clone());
            normalized_by_raw.insert(raw.as_str(), key);
        }

        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let wanted: Vec<String> = wanted.into_iter().collect();
        let found = self.records.find_ids_by_field(
            &self.team_id,
            entity,
            &matcher.field,
            &wanted,
            normalize,
        )?;

        debug!(
            team_id = %self.team_id,
            entity = %entity,
            matcher = matcher.key(),
            wanted = wanted.len(),
            found = found.len(),
            "关联查找完成"
        );

        Ok(normalized_by_raw
            .into_iter()
            .filter_map(|(raw, key)| found.get(&key).map(|id| (raw.to_string(), id.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity_link::LinkStorage;
    use crate::domain::record::CrmRecord;
    use crate::repository::error::RepositoryResult;
    use crate::repository::record_repo::Normalizer;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 内存记录仓储（统计查找次数）
    #[derive(Default)]
    struct CountingRepo {
        rows: Vec<(EntityType, &'static str, &'static str, &'static str)>,
        lookups: AtomicUsize,
    }

    impl RecordRepository for CountingRepo {
        fn find_by_id(&self, _: &str, _: EntityType, _: &str) -> RepositoryResult<Option<CrmRecord>> {
            Ok(None)
        }

        fn find_ids_by_field(
            &self,
            _team_id: &str,
            entity: EntityType,
            field: &str,
            values: &[String],
            normalize: Normalizer,
        ) -> RepositoryResult<HashMap<String, RecordId>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .rows
                .iter()
                .filter(|(e, f, _, _)| *e == entity && *f == field)
                .map(|(_, _, v, id)| (normalize(*v), id.to_string()))
                .filter(|(v, _)| values.contains(v))
                .collect())
        }

        fn create(&self, _: &str, _: EntityType, _: Map<String, Value>) -> RepositoryResult<CrmRecord> {
            unimplemented!()
        }

        fn update(&self, _: &str, _: EntityType, _: &str, _: Map<String, Value>) -> RepositoryResult<CrmRecord> {
            unimplemented!()
        }

        fn attach(&self, _: &str, _: &str, _: &str) -> RepositoryResult<()> {
            Ok(())
        }

        fn linked_ids(&self, _: &str, _: &str) -> RepositoryResult<Vec<RecordId>> {
            Ok(Vec::new())
        }

        fn count(&self, _: &str, _: EntityType) -> RepositoryResult<u64> {
            Ok(0)
        }
    }

    fn company_link() -> EntityLink {
        EntityLink::new(
            "company",
            "Company",
            EntityType::Company,
            LinkStorage::ForeignKey {
                column: "company_id".to_string(),
            },
        )
        .matchers([MatchableField::id(), MatchableField::domain(), MatchableField::name()])
    }

    fn resolver() -> (EntityLinkResolver, Arc<CountingRepo>) {
        let repo = Arc::new(CountingRepo {
            rows: vec![
                (EntityType::Company, "id", "c-1", "c-1"),
                (EntityType::Company, "custom_fields_domains", "acme.com", "c-1"),
            ],
            ..Default::default()
        });
        (EntityLinkResolver::new(repo.clone(), "team-1"), repo)
    }

    #[test]
    fn test_create_only_matcher_always_valid() {
        let (resolver, repo) = resolver();
        let link = company_link();
        let name = MatchableField::name();

        assert!(resolver.validate(&link, &name, "Nonexistent Corp").unwrap().is_none());
        assert!(resolver.resolved_id(&link, &name, "Nonexistent Corp").unwrap().is_none());
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lookup_blank_is_valid() {
        let (resolver, _) = resolver();
        let link = company_link();

        assert!(resolver.validate(&link, &MatchableField::id(), "").unwrap().is_none());
        assert!(resolver.validate(&link, &MatchableField::id(), "   ").unwrap().is_none());
    }

    #[test]
    fn test_missing_id_error_names_value_and_matcher() {
        let (resolver, _) = resolver();
        let link = company_link();

        let err = resolver
            .validate(&link, &MatchableField::id(), "does-not-exist-42")
            .unwrap()
            .unwrap()
            .summary();
        assert!(err.contains("does-not-exist-42"));
        assert!(err.contains("Record ID"));
        assert!(err.contains("Company"));
    }

    #[test]
    fn test_batch_all_blank_issues_no_lookup() {
        let (resolver, repo) = resolver();
        let link = company_link();
        let values = vec!["".to_string(), "  ".to_string(), "\t".to_string()];

        let results = resolver
            .batch_validate(&link, &MatchableField::domain(), &values)
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.values().all(Option::is_none));
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_validate_and_resolved_id_agree() {
        let (resolver, _) = resolver();
        let link = company_link();
        let domain = MatchableField::domain();

        for value in ["acme.com", "https://www.ACME.com/", "globex.com"] {
            let valid = resolver.validate(&link, &domain, value).unwrap().is_none();
            let resolved = resolver.resolved_id(&link, &domain, value).unwrap();
            assert_eq!(valid, resolved.is_some(), "value {}", value);
        }
        assert_eq!(
            resolver.resolved_id(&link, &domain, "https://www.ACME.com/").unwrap(),
            Some("c-1".to_string())
        );
    }

    #[test]
    fn test_batch_validate_single_query() {
        let (resolver, repo) = resolver();
        let link = company_link();
        let values = vec!["acme.com".to_string(), "globex.com".to_string(), "".to_string()];

        let results = resolver
            .batch_validate(&link, &MatchableField::domain(), &values)
            .unwrap();

        assert!(results["acme.com"].is_none());
        assert!(results["globex.com"].is_some());
        assert!(results[""].is_none());
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 1);
    }
}
