// ==========================================
// CRM 导入向导 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表入口（暂存表 / CRM 记录 / 自定义字段 / 配置）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 共享连接（仓储层统一使用）
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表并包装为共享连接
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<SharedConnection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 初始化 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- 导入会话
        CREATE TABLE IF NOT EXISTS import_session (
            id TEXT PRIMARY KEY,
            team_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            file_path TEXT NOT NULL,
            working_file_path TEXT,
            headers TEXT NOT NULL,
            total_rows INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            input_hash TEXT,
            column_mappings TEXT NOT NULL DEFAULT '[]',
            preview_progress TEXT NOT NULL DEFAULT '{}',
            results TEXT NOT NULL DEFAULT '{}',
            error_message TEXT,
            retention_secs INTEGER NOT NULL,
            heartbeat_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_import_session_team ON import_session(team_id);

        -- 暂存行（raw_data 为按列顺序的 JSON 数组，validation 以表头为键）
        CREATE TABLE IF NOT EXISTS import_row (
            session_id TEXT NOT NULL REFERENCES import_session(id) ON DELETE CASCADE,
            row_number INTEGER NOT NULL,
            raw_data TEXT NOT NULL,
            final_values TEXT,
            action TEXT,
            matched_id TEXT,
            match_method TEXT,
            relationships TEXT NOT NULL DEFAULT '[]',
            validation TEXT,
            skipped INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, row_number)
        );

        -- 值修正（按 列 + 原始值 作用域）
        CREATE TABLE IF NOT EXISTS import_value_correction (
            session_id TEXT NOT NULL REFERENCES import_session(id) ON DELETE CASCADE,
            column_name TEXT NOT NULL,
            raw_value TEXT NOT NULL,
            corrected_value TEXT,
            skipped INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, column_name, raw_value)
        );

        -- CRM 记录（导入目标）
        CREATE TABLE IF NOT EXISTS crm_record (
            id TEXT PRIMARY KEY,
            team_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_crm_record_team_entity ON crm_record(team_id, entity_type);

        -- 多对多关联
        CREATE TABLE IF NOT EXISTS crm_record_link (
            relation TEXT NOT NULL,
            from_id TEXT NOT NULL REFERENCES crm_record(id) ON DELETE CASCADE,
            to_id TEXT NOT NULL REFERENCES crm_record(id) ON DELETE CASCADE,
            PRIMARY KEY (relation, from_id, to_id)
        );

        -- 自定义字段值
        CREATE TABLE IF NOT EXISTS custom_field_value (
            record_id TEXT NOT NULL REFERENCES crm_record(id) ON DELETE CASCADE,
            field_code TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (record_id, field_code)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
