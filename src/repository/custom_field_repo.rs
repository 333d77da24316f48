// ==========================================
// CRM 导入向导 - 自定义字段存储
// ==========================================
// 外部协作方契约: get_value / set_value / set_multiple
// 导入核心只知道字段 code 与类型化取值，不关心存储结构
// ==========================================

use crate::db::SharedConnection;
use crate::repository::error::RepositoryResult;
use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};

// ==========================================
// CustomFieldStore Trait
// ==========================================
pub trait CustomFieldStore: Send + Sync {
    fn get_value(&self, record_id: &str, field_code: &str) -> RepositoryResult<Option<Value>>;

    /// Null 视为删除
    fn set_value(&self, record_id: &str, field_code: &str, value: &Value) -> RepositoryResult<()>;

    /// 批量写入（单事务）
    fn set_multiple(&self, record_id: &str, values: &Map<String, Value>) -> RepositoryResult<()>;
}

// ==========================================
// SqliteCustomFieldStore
// ==========================================
pub struct SqliteCustomFieldStore {
    conn: SharedConnection,
}

impl SqliteCustomFieldStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn write(
        conn: &rusqlite::Connection,
        record_id: &str,
        field_code: &str,
        value: &Value,
    ) -> RepositoryResult<()> {
        if value.is_null() {
            conn.execute(
                "DELETE FROM custom_field_value WHERE record_id = ?1 AND field_code = ?2",
                params![record_id, field_code],
            )?;
            return Ok(());
        }

        conn.execute(
            r#"
            INSERT INTO custom_field_value (record_id, field_code, value)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(record_id, field_code) DO UPDATE SET value = excluded.value
            "#,
            params![record_id, field_code, serde_json::to_string(value)?],
        )?;
        Ok(())
    }
}

impl CustomFieldStore for SqliteCustomFieldStore {
    fn get_value(&self, record_id: &str, field_code: &str) -> RepositoryResult<Option<Value>> {
        let conn = self.conn.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM custom_field_value WHERE record_id = ?1 AND field_code = ?2",
                params![record_id, field_code],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    fn set_value(&self, record_id: &str, field_code: &str, value: &Value) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        Self::write(&conn, record_id, field_code, value)
    }

    fn set_multiple(&self, record_id: &str, values: &Map<String, Value>) -> RepositoryResult<()> {
        if values.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock()?;
        let tx = conn.savepoint()?;
        for (code, value) in values {
            Self::write(&tx, record_id, code, value)?;
        }
        tx.commit()?;
        Ok(())
    }
}
