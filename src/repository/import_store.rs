// ==========================================
// CRM 导入向导 - 导入暂存库 (Import Store)
// ==========================================
// 职责: 一个导入会话的全部暂存状态
// - 原始行（按行号寻址，按行号顺序分块流式读取）
// - 每行匹配结果与按列的校验状态（批量写入）
// - 会话级可变状态: status / column_mappings / preview_progress / results
// 说明: load() 对不存在或已过期的会话返回 None（调用方安静退出）
// ==========================================

use crate::db::SharedConnection;
use crate::domain::mapping::{ColumnMapping, ValueCorrection};
use crate::domain::session::{
    ImportResults, ImportRow, ImportSession, LinkResolution, PreviewProgress, ValidationError,
};
use crate::domain::types::{EntityType, ImportStatus, MatchMethod, RowAction};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 新建会话参数（上传阶段）
#[derive(Debug, Clone)]
pub struct NewImportSession {
    pub team_id: String,
    pub user_id: String,
    pub entity_type: EntityType,
    pub file_path: String,
    pub headers: Vec<String>,
}

/// 列内去重取值（评审界面）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueValue {
    pub value: String,
    pub count: u32,
    pub error: Option<ValidationError>,
}

const SESSION_COLUMNS: &str = "id, team_id, user_id, entity_type, file_path, working_file_path, \
     headers, total_rows, status, input_hash, heartbeat_at, error_message, created_at, updated_at";

const ROW_COLUMNS: &str = "row_number, raw_data, final_values, action, matched_id, match_method, \
     relationships, validation, skipped";

// ==========================================
// ImportStore
// ==========================================
pub struct ImportStore {
    conn: SharedConnection,
    session_id: String,
    team_id: String,
}

impl ImportStore {
    // ==========================================
    // 生命周期
    // ==========================================

    /// 新建会话（状态 Uploading）
    pub fn create(
        conn: SharedConnection,
        new: NewImportSession,
        retention: Duration,
    ) -> RepositoryResult<Self> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        {
            let guard = conn.lock()?;
            guard.execute(
                r#"
                INSERT INTO import_session (
                    id, team_id, user_id, entity_type, file_path, headers,
                    total_rows, status, retention_secs, heartbeat_at, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?9, ?9)
                "#,
                params![
                    id,
                    new.team_id,
                    new.user_id,
                    new.entity_type.as_str(),
                    new.file_path,
                    serde_json::to_string(&new.headers)?,
                    ImportStatus::Uploading.as_str(),
                    retention.as_secs() as i64,
                    now,
                ],
            )?;
        }

        info!(import_id = %id, team_id = %new.team_id, entity = %new.entity_type, "导入会话已创建");

        Ok(Self {
            conn,
            session_id: id,
            team_id: new.team_id,
        })
    }

    /// 加载会话；不存在 / 不属于该 team / 已过期 → None
    pub fn load(
        conn: SharedConnection,
        import_id: &str,
        team_id: &str,
    ) -> RepositoryResult<Option<Self>> {
        let alive = {
            let guard = conn.lock()?;
            let found: Option<(DateTime<Utc>, i64)> = guard
                .query_row(
                    "SELECT heartbeat_at, retention_secs FROM import_session WHERE id = ?1 AND team_id = ?2",
                    params![import_id, team_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match found {
                Some((heartbeat_at, retention_secs)) => {
                    !is_expired(heartbeat_at, Duration::from_secs(retention_secs.max(0) as u64))
                }
                None => false,
            }
        };

        if !alive {
            debug!(import_id, team_id, "导入会话不存在或已过期");
            return Ok(None);
        }

        Ok(Some(Self {
            conn,
            session_id: import_id.to_string(),
            team_id: team_id.to_string(),
        }))
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// 删除会话的全部产物（暂存行 / 修正 / 会话 / 工作文件）
    pub fn destroy(self) -> RepositoryResult<()> {
        let mut conn = self.conn.lock()?;
        destroy_session(&mut conn, &self.session_id)
    }

    /// 清理心跳超过保留期的会话
    ///
    /// # 返回
    /// - 被清理的会话数
    pub fn sweep_expired(conn: &SharedConnection, retention: Duration) -> RepositoryResult<usize> {
        let mut guard = conn.lock()?;

        let expired: Vec<String> = {
            let mut stmt = guard.prepare("SELECT id, heartbeat_at FROM import_session")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, DateTime<Utc>>(1)?))
            })?;

            let mut expired = Vec::new();
            for row in rows {
                let (id, heartbeat_at) = row?;
                if is_expired(heartbeat_at, retention) {
                    expired.push(id);
                }
            }
            expired
        };

        for id in &expired {
            destroy_session(&mut guard, id)?;
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "已清理过期导入会话");
        }
        Ok(expired.len())
    }

    // ==========================================
    // 会话状态
    // ==========================================

    pub fn session(&self) -> RepositoryResult<ImportSession> {
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT {} FROM import_session WHERE id = ?1 AND team_id = ?2",
            SESSION_COLUMNS
        );
        conn.query_row(&sql, params![self.session_id, self.team_id], map_session)
            .optional()?
            .ok_or_else(|| self.not_found())?
    }

    pub fn status(&self) -> RepositoryResult<ImportStatus> {
        let raw: String = self.read_column("status")?;
        raw.parse().map_err(|message| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message,
        })
    }

    pub fn set_status(&self, status: ImportStatus) -> RepositoryResult<()> {
        self.update_session("status = ?1", params![status.as_str()])?;
        debug!(import_id = %self.session_id, status = %status, "会话状态已更新");
        Ok(())
    }

    /// 标记失败并记录错误信息
    pub fn fail(&self, message: &str) -> RepositoryResult<()> {
        self.update_session(
            "status = ?1, error_message = ?2",
            params![ImportStatus::Failed.as_str(), message],
        )?;
        warn!(import_id = %self.session_id, error = message, "导入会话失败");
        Ok(())
    }

    pub fn touch_heartbeat(&self) -> RepositoryResult<()> {
        self.update_session("heartbeat_at = ?1", params![Utc::now()])
    }

    pub fn set_working_file(&self, path: &Path) -> RepositoryResult<()> {
        self.update_session(
            "working_file_path = ?1",
            params![path.display().to_string()],
        )
    }

    pub fn input_hash(&self) -> RepositoryResult<Option<String>> {
        self.read_column("input_hash")
    }

    pub fn set_input_hash(&self, hash: &str) -> RepositoryResult<()> {
        self.update_session("input_hash = ?1", params![hash])
    }

    /// 清空指纹（运行中的预览任务据此停止）
    pub fn clear_input_hash(&self) -> RepositoryResult<()> {
        self.update_session("input_hash = NULL", &[])
    }

    pub fn column_mappings(&self) -> RepositoryResult<Vec<ColumnMapping>> {
        self.read_json_column("column_mappings")
    }

    pub fn set_column_mappings(&self, mappings: &[ColumnMapping]) -> RepositoryResult<()> {
        self.update_session(
            "column_mappings = ?1",
            params![serde_json::to_string(mappings)?],
        )
    }

    pub fn preview_progress(&self) -> RepositoryResult<PreviewProgress> {
        self.read_json_column("preview_progress")
    }

    pub fn set_preview_progress(&self, progress: &PreviewProgress) -> RepositoryResult<()> {
        self.update_session(
            "preview_progress = ?1",
            params![serde_json::to_string(progress)?],
        )
    }

    pub fn results(&self) -> RepositoryResult<ImportResults> {
        self.read_json_column("results")
    }

    pub fn set_results(&self, results: &ImportResults) -> RepositoryResult<()> {
        self.update_session("results = ?1", params![serde_json::to_string(results)?])
    }

    // ==========================================
    // 暂存行
    // ==========================================

    /// 写入原始行（替换已有行），行号从 1 开始
    ///
    /// # 返回
    /// - 写入行数
    pub fn insert_rows(&self, rows: &[Vec<String>]) -> RepositoryResult<u32> {
        let mut conn = self.conn.lock()?;
        let tx = conn.savepoint()?;

        tx.execute(
            "DELETE FROM import_row WHERE session_id = ?1",
            params![self.session_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO import_row (session_id, row_number, raw_data) VALUES (?1, ?2, ?3)",
            )?;
            for (idx, raw) in rows.iter().enumerate() {
                stmt.execute(params![
                    self.session_id,
                    (idx + 1) as i64,
                    serde_json::to_string(raw)?
                ])?;
            }
        }

        let total = rows.len() as u32;
        tx.execute(
            "UPDATE import_session SET total_rows = ?1, updated_at = ?2 WHERE id = ?3",
            params![total, Utc::now(), self.session_id],
        )?;
        tx.commit()?;

        info!(import_id = %self.session_id, rows = total, "原始行已写入暂存库");
        Ok(total)
    }

    pub fn row(&self, row_number: u32) -> RepositoryResult<Option<ImportRow>> {
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT {} FROM import_row WHERE session_id = ?1 AND row_number = ?2",
            ROW_COLUMNS
        );
        conn.query_row(&sql, params![self.session_id, row_number], map_row)
            .optional()?
            .transpose()
    }

    /// 按行号顺序分块遍历（行号 > after_row）
    ///
    /// 每块读取后释放连接锁再调用回调；回调返回 Break 时停止。
    ///
    /// # 返回
    /// - Continue: 遍历完成
    /// - Break: 回调要求停止
    pub fn chunk<E, F>(&self, size: usize, after_row: u32, mut callback: F) -> Result<ControlFlow<()>, E>
    where
        E: From<RepositoryError>,
        F: FnMut(Vec<ImportRow>) -> Result<ControlFlow<()>, E>,
    {
        let size = size.max(1);
        let mut last = after_row;

        loop {
            let rows = self.rows_after(last, size)?;
            let Some(tail) = rows.last() else {
                return Ok(ControlFlow::Continue(()));
            };
            last = tail.row_number;
            let exhausted = rows.len() < size;

            if callback(rows)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
            if exhausted {
                return Ok(ControlFlow::Continue(()));
            }
        }
    }

    fn rows_after(&self, after_row: u32, limit: usize) -> RepositoryResult<Vec<ImportRow>> {
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT {} FROM import_row WHERE session_id = ?1 AND row_number > ?2 ORDER BY row_number LIMIT ?3",
            ROW_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![self.session_id, after_row, limit as i64], map_row)?;

        let mut out = Vec::with_capacity(limit);
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    pub fn set_row_skipped(&self, row_number: u32, skipped: bool) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        let changed = conn.execute(
            "UPDATE import_row SET skipped = ?1 WHERE session_id = ?2 AND row_number = ?3",
            params![skipped, self.session_id, row_number],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ImportRow".to_string(),
                id: row_number.to_string(),
            });
        }
        Ok(())
    }

    /// 被用户跳过的行号（升序）
    pub fn skipped_rows(&self) -> RepositoryResult<Vec<u32>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT row_number FROM import_row WHERE session_id = ?1 AND skipped = 1 ORDER BY row_number",
        )?;
        let rows = stmt
            .query_map(params![self.session_id], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 批量写回匹配结果（单事务）
    pub fn save_matches(&self, rows: &[ImportRow]) -> RepositoryResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock()?;
        let tx = conn.savepoint()?;
        {
            let mut stmt = tx.prepare(
                r#"
                UPDATE import_row
                SET final_values = ?1, action = ?2, matched_id = ?3, match_method = ?4, relationships = ?5
                WHERE session_id = ?6 AND row_number = ?7
                "#,
            )?;
            for row in rows {
                let values = row.values.as_ref().map(serde_json::to_string).transpose()?;
                stmt.execute(params![
                    values,
                    row.action.map(|a| a.as_str()),
                    row.matched_id,
                    row.match_method.map(|m| m.as_str()),
                    serde_json::to_string(&row.relationships)?,
                    self.session_id,
                    row.row_number,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// 清除所有行的匹配结果（重新预览前）
    pub fn clear_matches(&self) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            UPDATE import_row
            SET final_values = NULL, action = NULL, matched_id = NULL, match_method = NULL, relationships = '[]'
            WHERE session_id = ?1
            "#,
            params![self.session_id],
        )?;
        Ok(())
    }

    // ==========================================
    // 校验状态
    // ==========================================

    /// 列内去重取值 + 出现次数 + 当前错误
    pub fn unique_values(&self, header: &str) -> RepositoryResult<Vec<UniqueValue>> {
        let index = self.header_index(header)?;

        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT raw_data, validation FROM import_row WHERE session_id = ?1 ORDER BY row_number",
        )?;
        let rows = stmt.query_map(params![self.session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut by_value: BTreeMap<String, UniqueValue> = BTreeMap::new();
        for row in rows {
            let (raw, validation) = row?;
            let raw: Vec<String> = serde_json::from_str(&raw)?;
            let value = raw.get(index).cloned().unwrap_or_default();

            let entry = by_value.entry(value.clone()).or_insert_with(|| UniqueValue {
                value,
                count: 0,
                error: None,
            });
            entry.count += 1;
            if entry.error.is_none() {
                entry.error = parse_validation(validation.as_deref())?.remove(header);
            }
        }

        Ok(by_value.into_values().collect())
    }

    /// 批量写入某列的校验结果（按原始值寻址，单事务）
    ///
    /// # 参数
    /// - header: 列表头（校验状态的键）
    /// - results: 原始值 → 错误（None 表示通过，清除旧错误）
    ///
    /// # 返回
    /// - 受影响行数
    pub fn bulk_set_validation(
        &self,
        header: &str,
        results: &[(String, Option<ValidationError>)],
    ) -> RepositoryResult<usize> {
        if results.is_empty() {
            return Ok(0);
        }
        let index = self.header_index(header)?;
        let path = format!("$[{}]", index);

        let mut conn = self.conn.lock()?;
        let tx = conn.savepoint()?;
        let mut touched = 0usize;
        {
            let mut select = tx.prepare(
                "SELECT row_number, validation FROM import_row WHERE session_id = ?1 AND json_extract(raw_data, ?2) = ?3",
            )?;
            let mut update = tx.prepare(
                "UPDATE import_row SET validation = ?1 WHERE session_id = ?2 AND row_number = ?3",
            )?;

            for (raw_value, error) in results {
                let hits = select
                    .query_map(params![self.session_id, path, raw_value], |row| {
                        Ok((row.get::<_, u32>(0)?, row.get::<_, Option<String>>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                for (row_number, validation) in hits {
                    let mut state = parse_validation(validation.as_deref())?;
                    match error {
                        Some(err) => {
                            state.insert(header.to_string(), err.clone());
                        }
                        None => {
                            state.remove(header);
                        }
                    }
                    let stored = if state.is_empty() {
                        None
                    } else {
                        Some(serde_json::to_string(&state)?)
                    };
                    update.execute(params![stored, self.session_id, row_number])?;
                    touched += 1;
                }
            }
        }
        tx.commit()?;

        debug!(import_id = %self.session_id, column = header, rows = touched, "列校验结果已写入");
        Ok(touched)
    }

    /// 清除某列（None 为全部列）的校验状态
    pub fn clear_validation(&self, header: Option<&str>) -> RepositoryResult<()> {
        let Some(header) = header else {
            let conn = self.conn.lock()?;
            conn.execute(
                "UPDATE import_row SET validation = NULL WHERE session_id = ?1",
                params![self.session_id],
            )?;
            return Ok(());
        };

        let values: Vec<(String, Option<ValidationError>)> = self
            .unique_values(header)?
            .into_iter()
            .filter(|v| v.error.is_some())
            .map(|v| (v.value, None))
            .collect();
        self.bulk_set_validation(header, &values)?;
        Ok(())
    }

    /// 存在校验错误的行数
    pub fn error_row_count(&self) -> RepositoryResult<u32> {
        let conn = self.conn.lock()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM import_row WHERE session_id = ?1 AND validation IS NOT NULL AND skipped = 0",
            params![self.session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==========================================
    // 值修正
    // ==========================================

    pub fn corrections(&self) -> RepositoryResult<Vec<ValueCorrection>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT column_name, raw_value, corrected_value, skipped
            FROM import_value_correction
            WHERE session_id = ?1
            ORDER BY column_name, raw_value
            "#,
        )?;
        let corrections = stmt
            .query_map(params![self.session_id], |row| {
                Ok(ValueCorrection {
                    column: row.get(0)?,
                    raw_value: row.get(1)?,
                    corrected_value: row.get(2)?,
                    skipped: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(corrections)
    }

    pub fn upsert_correction(&self, correction: &ValueCorrection) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            INSERT INTO import_value_correction (session_id, column_name, raw_value, corrected_value, skipped)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id, column_name, raw_value)
            DO UPDATE SET corrected_value = excluded.corrected_value, skipped = excluded.skipped
            "#,
            params![
                self.session_id,
                correction.column,
                correction.raw_value,
                correction.corrected_value,
                correction.skipped,
            ],
        )?;
        Ok(())
    }

    pub fn remove_correction(&self, column: &str, raw_value: &str) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "DELETE FROM import_value_correction WHERE session_id = ?1 AND column_name = ?2 AND raw_value = ?3",
            params![self.session_id, column, raw_value],
        )?;
        Ok(())
    }

    // ==========================================
    // 行级保存点（落库阶段）
    // ==========================================

    /// 在保存点内执行一组写入: 闭包返回 Err 时回滚保存点之后的全部写入
    ///
    /// 闭包内的仓储调用各自加锁，保存点作用于同一共享连接
    pub fn with_savepoint<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<RepositoryError>,
    {
        let name = format!("\"row_{}\"", self.session_id);
        self.conn
            .lock()
            .map_err(RepositoryError::from)?
            .execute_batch(&format!("SAVEPOINT {}", name))
            .map_err(RepositoryError::from)?;

        let result = f();

        let conn = self.conn.lock().map_err(RepositoryError::from)?;
        match result {
            Ok(value) => {
                conn.execute_batch(&format!("RELEASE {}", name))
                    .map_err(RepositoryError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) =
                    conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name))
                {
                    warn!(error = %rollback_err, "回滚行级保存点失败");
                }
                Err(err)
            }
        }
    }

    // ==========================================
    // 内部工具
    // ==========================================

    fn not_found(&self) -> RepositoryError {
        RepositoryError::NotFound {
            entity: "ImportSession".to_string(),
            id: self.session_id.clone(),
        }
    }

    fn header_index(&self, header: &str) -> RepositoryResult<usize> {
        let headers: Vec<String> = self.read_json_column("headers")?;
        headers
            .iter()
            .position(|h| h == header)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "ImportColumn".to_string(),
                id: header.to_string(),
            })
    }

    fn read_column<T: rusqlite::types::FromSql>(&self, column: &str) -> RepositoryResult<T> {
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT {} FROM import_session WHERE id = ?1 AND team_id = ?2",
            column
        );
        conn.query_row(&sql, params![self.session_id, self.team_id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| self.not_found())
    }

    fn read_json_column<T: DeserializeOwned>(&self, column: &str) -> RepositoryResult<T> {
        let raw: String = self.read_column(column)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn update_session(&self, assignments: &str, values: &[&dyn rusqlite::ToSql]) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        let next = values.len() + 1;
        let sql = format!(
            "UPDATE import_session SET {}, updated_at = ?{} WHERE id = ?{} AND team_id = ?{}",
            assignments,
            next,
            next + 1,
            next + 2
        );

        let now = Utc::now();
        let mut bind: Vec<&dyn rusqlite::ToSql> = values.to_vec();
        bind.push(&now);
        bind.push(&self.session_id);
        bind.push(&self.team_id);

        let changed = conn.execute(&sql, bind.as_slice())?;
        if changed == 0 {
            return Err(self.not_found());
        }
        Ok(())
    }
}

fn is_expired(heartbeat_at: DateTime<Utc>, retention: Duration) -> bool {
    let retention = chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
    match heartbeat_at.checked_add_signed(retention) {
        Some(deadline) => deadline < Utc::now(),
        None => false,
    }
}

fn destroy_session(conn: &mut Connection, session_id: &str) -> RepositoryResult<()> {
    let working_file: Option<Option<String>> = conn
        .query_row(
            "SELECT working_file_path FROM import_session WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    let tx = conn.savepoint()?;
    tx.execute("DELETE FROM import_row WHERE session_id = ?1", params![session_id])?;
    tx.execute(
        "DELETE FROM import_value_correction WHERE session_id = ?1",
        params![session_id],
    )?;
    tx.execute("DELETE FROM import_session WHERE id = ?1", params![session_id])?;
    tx.commit()?;

    if let Some(Some(path)) = working_file {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(import_id = session_id, path = %path, error = %e, "删除工作文件失败"),
        }
    }

    info!(import_id = session_id, "导入会话已删除");
    Ok(())
}

fn parse_validation(raw: Option<&str>) -> RepositoryResult<BTreeMap<String, ValidationError>> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(BTreeMap::new()),
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(
    field: &str,
    raw: Option<String>,
) -> RepositoryResult<Option<T>> {
    raw.map(|s| {
        s.parse::<T>().map_err(|message| RepositoryError::FieldValueError {
            field: field.to_string(),
            message,
        })
    })
    .transpose()
}

fn map_session(row: &Row) -> rusqlite::Result<RepositoryResult<ImportSession>> {
    let entity_type: String = row.get(3)?;
    let headers: String = row.get(6)?;
    let status: String = row.get(8)?;

    let id: String = row.get(0)?;
    let team_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let file_path: String = row.get(4)?;
    let working_file_path: Option<String> = row.get(5)?;
    let total_rows: u32 = row.get(7)?;
    let input_hash: Option<String> = row.get(9)?;
    let heartbeat_at: DateTime<Utc> = row.get(10)?;
    let error_message: Option<String> = row.get(11)?;
    let created_at: DateTime<Utc> = row.get(12)?;
    let updated_at: DateTime<Utc> = row.get(13)?;

    let build = || -> RepositoryResult<ImportSession> {
        Ok(ImportSession {
            id,
            team_id,
            user_id,
            entity_type: parse_enum::<EntityType>("entity_type", Some(entity_type))?
                .ok_or_else(|| RepositoryError::InternalError("entity_type missing".to_string()))?,
            file_path,
            working_file_path,
            headers: serde_json::from_str(&headers)?,
            total_rows,
            status: parse_enum::<ImportStatus>("status", Some(status))?
                .ok_or_else(|| RepositoryError::InternalError("status missing".to_string()))?,
            input_hash,
            heartbeat_at,
            error_message,
            created_at,
            updated_at,
        })
    };
    Ok(build())
}

fn map_row(row: &Row) -> rusqlite::Result<RepositoryResult<ImportRow>> {
    let row_number: u32 = row.get(0)?;
    let raw_data: String = row.get(1)?;
    let final_values: Option<String> = row.get(2)?;
    let action: Option<String> = row.get(3)?;
    let matched_id: Option<String> = row.get(4)?;
    let match_method: Option<String> = row.get(5)?;
    let relationships: String = row.get(6)?;
    let validation: Option<String> = row.get(7)?;
    let skipped: bool = row.get(8)?;

    let build = || -> RepositoryResult<ImportRow> {
        let values: Option<Map<String, Value>> =
            final_values.map(|v| serde_json::from_str(&v)).transpose()?;
        let relationships: Vec<LinkResolution> = serde_json::from_str(&relationships)?;

        Ok(ImportRow {
            row_number,
            raw: serde_json::from_str(&raw_data)?,
            values,
            action: parse_enum::<RowAction>("action", action)?,
            matched_id,
            match_method: parse_enum::<MatchMethod>("match_method", match_method)?,
            relationships,
            validation: parse_validation(validation.as_deref())?,
            skipped,
        })
    };
    Ok(build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use std::sync::{Arc, Mutex};

    fn shared() -> SharedConnection {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn new_store(conn: &SharedConnection) -> ImportStore {
        let store = ImportStore::create(
            conn.clone(),
            NewImportSession {
                team_id: "team-1".to_string(),
                user_id: "user-1".to_string(),
                entity_type: EntityType::Person,
                file_path: "/tmp/people.csv".to_string(),
                headers: vec!["Name".to_string(), "Birthday".to_string()],
            },
            Duration::from_secs(3600),
        )
        .unwrap();
        store
            .insert_rows(&[
                vec!["Ada".to_string(), "31/02/1990".to_string()],
                vec!["Grace".to_string(), "1906-12-09".to_string()],
                vec!["Linus".to_string(), "31/02/1990".to_string()],
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_load_is_team_scoped() {
        let conn = shared();
        let store = new_store(&conn);

        assert!(ImportStore::load(conn.clone(), store.id(), "team-1").unwrap().is_some());
        assert!(ImportStore::load(conn.clone(), store.id(), "team-2").unwrap().is_none());
        assert!(ImportStore::load(conn, "missing", "team-1").unwrap().is_none());
    }

    #[test]
    fn test_load_expired_returns_none() {
        let conn = shared();
        let store = new_store(&conn);
        {
            let guard = conn.lock().unwrap();
            guard
                .execute(
                    "UPDATE import_session SET heartbeat_at = ?1 WHERE id = ?2",
                    params![Utc::now() - chrono::Duration::hours(2), store.id()],
                )
                .unwrap();
        }
        assert!(ImportStore::load(conn, store.id(), "team-1").unwrap().is_none());
    }

    #[test]
    fn test_chunk_streams_in_row_order() {
        let conn = shared();
        let store = new_store(&conn);

        let mut seen = Vec::new();
        let mut chunks = 0;
        let flow = store
            .chunk::<RepositoryError, _>(2, 0, |rows| {
                chunks += 1;
                seen.extend(rows.iter().map(|r| r.row_number));
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();

        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(chunks, 2);

        // 从偏移续跑
        let mut resumed = Vec::new();
        store
            .chunk::<RepositoryError, _>(10, 2, |rows| {
                resumed.extend(rows.iter().map(|r| r.row_number));
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        assert_eq!(resumed, vec![3]);
    }

    #[test]
    fn test_chunk_break_stops_iteration() {
        let conn = shared();
        let store = new_store(&conn);

        let mut calls = 0;
        let flow = store
            .chunk::<RepositoryError, _>(1, 0, |_| {
                calls += 1;
                Ok(ControlFlow::Break(()))
            })
            .unwrap();
        assert!(flow.is_break());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_bulk_validation_by_value() {
        let conn = shared();
        let store = new_store(&conn);

        let touched = store
            .bulk_set_validation(
                "Birthday",
                &[
                    ("31/02/1990".to_string(), Some(ValidationError::message("Invalid date"))),
                    ("1906-12-09".to_string(), None),
                ],
            )
            .unwrap();
        assert_eq!(touched, 3);

        let values = store.unique_values("Birthday").unwrap();
        let bad = values.iter().find(|v| v.value == "31/02/1990").unwrap();
        assert_eq!(bad.count, 2);
        assert!(bad.error.is_some());
        assert_eq!(store.error_row_count().unwrap(), 2);

        // 修正后清除
        store
            .bulk_set_validation("Birthday", &[("31/02/1990".to_string(), None)])
            .unwrap();
        assert_eq!(store.error_row_count().unwrap(), 0);
        assert!(store.row(1).unwrap().unwrap().validation.is_empty());
    }

    #[test]
    fn test_corrections_upsert() {
        let conn = shared();
        let store = new_store(&conn);

        store
            .upsert_correction(&ValueCorrection::replace("Birthday", "31/02/1990", "1990-02-28"))
            .unwrap();
        store
            .upsert_correction(&ValueCorrection::replace("Birthday", "31/02/1990", "1990-02-27"))
            .unwrap();

        let corrections = store.corrections().unwrap();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].corrected_value.as_deref(), Some("1990-02-27"));

        store.remove_correction("Birthday", "31/02/1990").unwrap();
        assert!(store.corrections().unwrap().is_empty());
    }

    #[test]
    fn test_session_state_and_destroy() {
        let conn = shared();
        let store = new_store(&conn);

        store.set_status(ImportStatus::Mapping).unwrap();
        store.set_row_skipped(2, true).unwrap();
        assert!(store.set_row_skipped(99, true).is_err());

        let session = store.session().unwrap();
        assert_eq!(session.status, ImportStatus::Mapping);
        assert_eq!(session.total_rows, 3);
        assert_eq!(store.skipped_rows().unwrap(), vec![2]);

        let id = store.id().to_string();
        store.destroy().unwrap();
        assert!(ImportStore::load(conn.clone(), &id, "team-1").unwrap().is_none());

        let guard = conn.lock().unwrap();
        let rows: i64 = guard
            .query_row("SELECT COUNT(*) FROM import_row", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_sweep_expired() {
        let conn = shared();
        let stale = new_store(&conn);
        let fresh = new_store(&conn);
        {
            let guard = conn.lock().unwrap();
            guard
                .execute(
                    "UPDATE import_session SET heartbeat_at = ?1 WHERE id = ?2",
                    params![Utc::now() - chrono::Duration::hours(30), stale.id()],
                )
                .unwrap();
        }

        let removed = ImportStore::sweep_expired(&conn, Duration::from_secs(24 * 3600)).unwrap();
        assert_eq!(removed, 1);
        assert!(ImportStore::load(conn, fresh.id(), "team-1").unwrap().is_some());
    }

    #[test]
    fn test_savepoint_rolls_back_on_err() {
        let conn = shared();
        let store = new_store(&conn);

        let failed: RepositoryResult<()> = store.with_savepoint(|| {
            store.set_row_skipped(1, true)?;
            Err(RepositoryError::InternalError("boom".to_string()))
        });
        assert!(failed.is_err());
        assert!(!store.row(1).unwrap().unwrap().skipped);

        let kept: RepositoryResult<u32> = store.with_savepoint(|| {
            store.set_row_skipped(2, true)?;
            Ok(2)
        });
        assert_eq!(kept.unwrap(), 2);
        assert!(store.row(2).unwrap().unwrap().skipped);
    }

    #[test]
    fn test_new_session_has_empty_progress_and_results() {
        let conn = shared();
        let store = new_store(&conn);

        assert_eq!(store.preview_progress().unwrap(), PreviewProgress::default());
        assert_eq!(store.results().unwrap(), ImportResults::default());
        assert_eq!(store.input_hash().unwrap(), None);

        store.set_input_hash("abc").unwrap();
        store.clear_input_hash().unwrap();
        assert_eq!(store.input_hash().unwrap(), None);
    }
}
