// ==========================================
// CRM 导入向导 - CRM 记录仓储
// ==========================================
// 职责: 导入目标记录的查找 / 新建 / 更新 / 多对多关联
// 红线: Repository 不含业务规则，只做数据 CRUD
// 说明: 记录按 team 隔离，所有查询都带 team_id
// ==========================================

use crate::db::SharedConnection;
use crate::domain::field::CUSTOM_FIELD_PREFIX;
use crate::domain::record::{CrmRecord, RecordId};
use crate::domain::types::EntityType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// 值归一化函数（匹配前对两侧取值做同样处理）
pub type Normalizer = fn(&str) -> String;

// ==========================================
// RecordRepository Trait
// ==========================================
pub trait RecordRepository: Send + Sync {
    /// 按 id 查找（team 隔离）
    fn find_by_id(
        &self,
        team_id: &str,
        entity: EntityType,
        id: &str,
    ) -> RepositoryResult<Option<CrmRecord>>;

    /// 批量按字段值查找
    ///
    /// # 参数
    /// - field: "id" / 核心属性 key / custom_fields_xxx
    /// - values: 待查找的取值（已归一化）
    /// - normalize: 对库内取值做同样的归一化
    ///
    /// # 返回
    /// - 归一化取值 → 记录 id（多条命中取最早创建的一条）
    ///
    /// 非 id 字段的查找会扫描该实体在 team 下的全部记录
    fn find_ids_by_field(
        &self,
        team_id: &str,
        entity: EntityType,
        field: &str,
        values: &[String],
        normalize: Normalizer,
    ) -> RepositoryResult<HashMap<String, RecordId>>;

    fn create(
        &self,
        team_id: &str,
        entity: EntityType,
        attributes: Map<String, Value>,
    ) -> RepositoryResult<CrmRecord>;

    /// 合并更新核心属性（未出现的 key 保持不变）
    fn update(
        &self,
        team_id: &str,
        entity: EntityType,
        id: &str,
        attributes: Map<String, Value>,
    ) -> RepositoryResult<CrmRecord>;

    /// 多对多关联（幂等）
    fn attach(&self, relation: &str, from_id: &str, to_id: &str) -> RepositoryResult<()>;

    fn linked_ids(&self, relation: &str, from_id: &str) -> RepositoryResult<Vec<RecordId>>;

    fn count(&self, team_id: &str, entity: EntityType) -> RepositoryResult<u64>;
}

// ==========================================
// SqliteRecordRepository
// ==========================================
pub struct SqliteRecordRepository {
    conn: SharedConnection,
}

impl SqliteRecordRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    #[allow(clippy::type_complexity)]
    fn map_record(
        row: &Row,
    ) -> rusqlite::Result<(String, String, String, String, DateTime<Utc>, DateTime<Utc>)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn build_record(
        raw: (String, String, String, String, DateTime<Utc>, DateTime<Utc>),
    ) -> RepositoryResult<CrmRecord> {
        let (id, team_id, entity_type, attributes, created_at, updated_at) = raw;
        let entity_type = entity_type
            .parse::<EntityType>()
            .map_err(|message| RepositoryError::FieldValueError {
                field: "entity_type".to_string(),
                message,
            })?;
        let attributes: Map<String, Value> = serde_json::from_str(&attributes)?;

        Ok(CrmRecord {
            id,
            team_id,
            entity_type,
            attributes,
            created_at,
            updated_at,
        })
    }
}

/// 把 JSON 值展开为字符串候选（数组取每个元素，标量取自身）
fn candidate_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(candidate_strings).collect(),
        _ => Vec::new(),
    }
}

impl RecordRepository for SqliteRecordRepository {
    fn find_by_id(
        &self,
        team_id: &str,
        entity: EntityType,
        id: &str,
    ) -> RepositoryResult<Option<CrmRecord>> {
        let conn = self.conn.lock()?;
        let raw = conn
            .query_row(
                r#"
                SELECT id, team_id, entity_type, attributes, created_at, updated_at
                FROM crm_record
                WHERE id = ?1 AND team_id = ?2 AND entity_type = ?3
                "#,
                params![id, team_id, entity.as_str()],
                Self::map_record,
            )
            .optional()?;

        raw.map(Self::build_record).transpose()
    }

    fn find_ids_by_field(
        &self,
        team_id: &str,
        entity: EntityType,
        field: &str,
        values: &[String],
        normalize: Normalizer,
    ) -> RepositoryResult<HashMap<String, RecordId>> {
        let wanted: HashSet<&str> = values.iter().map(String::as_str).collect();
        let mut found = HashMap::new();
        if wanted.is_empty() {
            return Ok(found);
        }

        let conn = self.conn.lock()?;

        // id 直接走主键
        if field == "id" {
            let placeholders = vec!["?"; wanted.len()].join(", ");
            let sql = format!(
                "SELECT id FROM crm_record WHERE team_id = ? AND entity_type = ? AND id IN ({})",
                placeholders
            );
            let mut bind: Vec<String> = vec![team_id.to_string(), entity.as_str().to_string()];
            bind.extend(wanted.iter().map(|v| v.to_string()));

            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt.query_map(params_from_iter(bind.iter()), |row| row.get::<_, String>(0))?;
            for id in ids {
                let id = id?;
                found.insert(normalize(&id), id);
            }
            return Ok(found);
        }

        // 其它字段：取出 (id, 值) 后在内存中归一化比较
        // 代价: 每次调用扫描该 team 下该实体的全部记录，预览每块调用一次，即 O(记录数 × 块数)
        // 库内取值未归一化存储（如带协议的域名），无法直接用 SQL 等值匹配
        let (sql, key) = match field.strip_prefix(CUSTOM_FIELD_PREFIX) {
            Some(code) => (
                r#"
                SELECT r.id, v.value
                FROM crm_record r
                JOIN custom_field_value v ON v.record_id = r.id
                WHERE r.team_id = ?1 AND r.entity_type = ?2 AND v.field_code = ?3
                ORDER BY r.created_at, r.id
                "#,
                code.to_string(),
            ),
            None => (
                r#"
                SELECT r.id, CAST(json_extract(r.attributes, '$."' || ?3 || '"') AS TEXT)
                FROM crm_record r
                WHERE r.team_id = ?1 AND r.entity_type = ?2
                ORDER BY r.created_at, r.id
                "#,
                field.to_string(),
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![team_id, entity.as_str(), key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        for row in rows {
            let (id, stored) = row?;
            let Some(stored) = stored else { continue };
            // 自定义字段值统一存 JSON；核心属性 json_extract 后为标量文本
            let candidates = match serde_json::from_str::<Value>(&stored) {
                Ok(value @ (Value::Array(_) | Value::String(_))) => candidate_strings(&value),
                _ => vec![stored],
            };
            for candidate in candidates {
                let key = normalize(&candidate);
                if wanted.contains(key.as_str()) {
                    found.entry(key).or_insert_with(|| id.clone());
                }
            }
        }

        Ok(found)
    }

    fn create(
        &self,
        team_id: &str,
        entity: EntityType,
        attributes: Map<String, Value>,
    ) -> RepositoryResult<CrmRecord> {
        let now = Utc::now();
        let record = CrmRecord {
            id: Uuid::new_v4().to_string(),
            team_id: team_id.to_string(),
            entity_type: entity,
            attributes,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            INSERT INTO crm_record (id, team_id, entity_type, attributes, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id,
                record.team_id,
                entity.as_str(),
                serde_json::to_string(&record.attributes)?,
                record.created_at,
                record.updated_at,
            ],
        )?;

        Ok(record)
    }

    fn update(
        &self,
        team_id: &str,
        entity: EntityType,
        id: &str,
        attributes: Map<String, Value>,
    ) -> RepositoryResult<CrmRecord> {
        let mut record = self
            .find_by_id(team_id, entity, id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            })?;

        for (key, value) in attributes {
            record.attributes.insert(key, value);
        }
        record.updated_at = Utc::now();

        let conn = self.conn.lock()?;
        conn.execute(
            "UPDATE crm_record SET attributes = ?1, updated_at = ?2 WHERE id = ?3 AND team_id = ?4",
            params![
                serde_json::to_string(&record.attributes)?,
                record.updated_at,
                record.id,
                team_id,
            ],
        )?;

        Ok(record)
    }

    fn attach(&self, relation: &str, from_id: &str, to_id: &str) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO crm_record_link (relation, from_id, to_id) VALUES (?1, ?2, ?3)",
            params![relation, from_id, to_id],
        )?;
        Ok(())
    }

    fn linked_ids(&self, relation: &str, from_id: &str) -> RepositoryResult<Vec<RecordId>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT to_id FROM crm_record_link WHERE relation = ?1 AND from_id = ?2 ORDER BY to_id",
        )?;
        let ids = stmt
            .query_map(params![relation, from_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn count(&self, team_id: &str, entity: EntityType) -> RepositoryResult<u64> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM crm_record WHERE team_id = ?1 AND entity_type = ?2",
            params![team_id, entity.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use rusqlite::Connection;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn lower(s: &str) -> String {
        s.trim().to_lowercase()
    }

    fn repo() -> (SqliteRecordRepository, SharedConnection) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        let shared = Arc::new(Mutex::new(conn));
        (SqliteRecordRepository::new(shared.clone()), shared)
    }

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_and_find_by_id_is_team_scoped() {
        let (repo, _) = repo();
        let record = repo
            .create("team-1", EntityType::Company, attrs(json!({"name": "Acme"})))
            .unwrap();

        let found = repo.find_by_id("team-1", EntityType::Company, &record.id).unwrap();
        assert_eq!(found.unwrap().name(), Some("Acme"));

        assert!(repo.find_by_id("team-2", EntityType::Company, &record.id).unwrap().is_none());
        assert!(repo.find_by_id("team-1", EntityType::Person, &record.id).unwrap().is_none());
    }

    #[test]
    fn test_find_ids_by_core_field_normalized() {
        let (repo, _) = repo();
        let acme = repo
            .create("team-1", EntityType::Company, attrs(json!({"name": "Acme Inc"})))
            .unwrap();
        repo.create("team-1", EntityType::Company, attrs(json!({"name": "Globex"})))
            .unwrap();

        let found = repo
            .find_ids_by_field(
                "team-1",
                EntityType::Company,
                "name",
                &["acme inc".to_string(), "initech".to_string()],
                lower,
            )
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found.get("acme inc"), Some(&acme.id));
    }

    #[test]
    fn test_find_ids_by_custom_field_array() {
        let (repo, shared) = repo();
        let person = repo
            .create("team-1", EntityType::Person, attrs(json!({"name": "Ada"})))
            .unwrap();
        {
            let conn = shared.lock().unwrap();
            conn.execute(
                "INSERT INTO custom_field_value (record_id, field_code, value) VALUES (?1, 'emails', ?2)",
                params![person.id, json!(["Ada@Example.com", "ada@work.io"]).to_string()],
            )
            .unwrap();
        }

        let found = repo
            .find_ids_by_field(
                "team-1",
                EntityType::Person,
                "custom_fields_emails",
                &["ada@work.io".to_string()],
                lower,
            )
            .unwrap();
        assert_eq!(found.get("ada@work.io"), Some(&person.id));
    }

    #[test]
    fn test_update_merges_attributes() {
        let (repo, _) = repo();
        let record = repo
            .create(
                "team-1",
                EntityType::Company,
                attrs(json!({"name": "Acme", "industry": "tech"})),
            )
            .unwrap();

        let updated = repo
            .update("team-1", EntityType::Company, &record.id, attrs(json!({"name": "Acme 2"})))
            .unwrap();
        assert_eq!(updated.name(), Some("Acme 2"));
        assert_eq!(updated.attributes["industry"], "tech");

        let missing = repo.update("team-1", EntityType::Company, "nope", Map::new());
        assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (repo, _) = repo();
        let task = repo.create("t", EntityType::Task, Map::new()).unwrap();
        let company = repo.create("t", EntityType::Company, Map::new()).unwrap();

        repo.attach("companies", &task.id, &company.id).unwrap();
        repo.attach("companies", &task.id, &company.id).unwrap();

        assert_eq!(repo.linked_ids("companies", &task.id).unwrap(), vec![company.id]);
    }
}
