// ==========================================
// CRM 导入向导 - 预览处理器
// ==========================================
// 职责: 后台分块计算预览（新建/更新/跳过计数、待新建公司）
// 流程:
// 1. 每块开始前检查是否应停止（输入指纹变化 / 心跳超时）
// 2. 匹配决策写回暂存行，结果行追加到工作文件（JSON Lines）
// 3. 每块结束持久化进度，供轮询接口展示
// 红线:
// - 停止时直接返回，不删除任何文件（清理由取消或定期清理负责）
// - 出错时记录错误、会话置为 Failed 并向上抛出（任务只执行一次）
// ==========================================

use crate::config::ImportSettings;
use crate::db::SharedConnection;
use crate::domain::mapping::CorrectionSet;
use crate::domain::session::{ImportRow, LinkTarget, PreviewProgress};
use crate::domain::types::{EntityType, RowAction};
use crate::engine::match_resolver::MatchResolver;
use crate::importer::column_mapper::ColumnMapper;
use crate::importer::definitions::importer_for;
use crate::importer::entity_link_resolver::EntityLinkResolver;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::ImporterDefinition;
use crate::importer::normalize::link_dedup_value;
use crate::repository::import_store::ImportStore;
use crate::repository::record_repo::RecordRepository;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 用户修改了映射 / 修正 / 跳过标记
    InputChanged,
    /// 用户离开（心跳超时）
    HeartbeatTimeout,
}

/// 预览任务结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Completed(PreviewProgress),
    Stopped(StopReason),
    /// 会话不存在或已过期
    SessionGone,
}

pub struct PreviewProcessor {
    conn: SharedConnection,
    records: Arc<dyn RecordRepository>,
    settings: ImportSettings,
}

impl PreviewProcessor {
    pub fn new(
        conn: SharedConnection,
        records: Arc<dyn RecordRepository>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            conn,
            records,
            settings,
        }
    }

    /// 工作文件路径
    pub fn working_file_path(&self, import_id: &str) -> PathBuf {
        self.settings
            .working_dir
            .join(format!("{}.preview.jsonl", import_id))
    }

    /// 执行（或续跑）预览
    ///
    /// # 参数
    /// - input_hash: 任务创建时捕获的输入指纹
    #[instrument(skip(self, input_hash))]
    pub fn run(
        &self,
        import_id: &str,
        team_id: &str,
        input_hash: &str,
    ) -> ImportResult<PreviewOutcome> {
        let Some(store) = ImportStore::load(self.conn.clone(), import_id, team_id)? else {
            debug!("导入会话不存在或已过期，预览任务退出");
            return Ok(PreviewOutcome::SessionGone);
        };

        match self.process(&store, input_hash) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if let Err(fail_err) = store.fail(&err.to_string()) {
                    warn!(error = %fail_err, "记录预览失败状态时出错");
                }
                Err(err)
            }
        }
    }

    fn process(&self, store: &ImportStore, input_hash: &str) -> ImportResult<PreviewOutcome> {
        if let Some(reason) = self.should_stop(store, input_hash)? {
            info!(reason = ?reason, "预览任务停止");
            return Ok(PreviewOutcome::Stopped(reason));
        }

        let session = store.session()?;
        let importer = importer_for(session.entity_type);
        let definition = importer.definition();

        let mappings = store.column_mappings()?;
        let columns = ColumnMapper::new(definition).resolve(&session.headers, &mappings)?;
        let corrections = CorrectionSet::new(store.corrections()?);

        let mut progress = store.preview_progress()?;
        if progress.completed {
            return Ok(PreviewOutcome::Completed(progress));
        }

        let mut resolver = MatchResolver::new(
            definition,
            columns,
            corrections,
            EntityLinkResolver::new(self.records.clone(), store.team_id()),
        );

        let path = self.working_file_path(store.id());
        let mut writer = self.open_working_file(&path, progress.processed == 0)?;
        store.set_working_file(&path)?;

        // 续跑: 回放已处理的行
        if progress.processed > 0 {
            let processed = progress.processed;
            store.chunk::<ImportError, _>(self.settings.preview_chunk_size, 0, |rows| {
                for row in &rows {
                    if row.row_number > processed {
                        return Ok(ControlFlow::Break(()));
                    }
                    resolver.replay(row);
                }
                Ok(ControlFlow::Continue(()))
            })?;
            info!(processed, "预览续跑");
        }

        let mut stopped = None;
        let mut chunk_no = 0u32;
        store.chunk::<ImportError, _>(
            self.settings.preview_chunk_size,
            progress.processed,
            |rows| {
                if let Some(reason) = self.should_stop(store, input_hash)? {
                    stopped = Some(reason);
                    return Ok(ControlFlow::Break(()));
                }

                let resolved = resolver.resolve_chunk(rows)?;
                store.save_matches(&resolved)?;
                append_rows(&mut writer, &resolved)?;
                accumulate(&mut progress, definition, &resolved);
                store.set_preview_progress(&progress)?;

                chunk_no += 1;
                info!(
                    chunk = chunk_no,
                    processed = progress.processed,
                    creates = progress.creates,
                    updates = progress.updates,
                    skips = progress.skips,
                    "预览分块完成"
                );
                Ok(ControlFlow::Continue(()))
            },
        )?;

        // 最后一块期间输入可能已变化
        if stopped.is_none() {
            stopped = self.should_stop(store, input_hash)?;
        }
        if let Some(reason) = stopped {
            info!(reason = ?reason, processed = progress.processed, "预览任务停止");
            return Ok(PreviewOutcome::Stopped(reason));
        }

        progress.completed = true;
        store.set_preview_progress(&progress)?;
        info!(
            processed = progress.processed,
            creates = progress.creates,
            updates = progress.updates,
            new_companies = progress.new_companies.len(),
            "预览完成"
        );
        Ok(PreviewOutcome::Completed(progress))
    }

    /// 是否应停止
    ///
    /// # 返回
    /// - Some(InputChanged): 会话指纹与任务捕获的指纹不一致
    /// - Some(HeartbeatTimeout): 心跳超过超时时间
    pub fn should_stop(
        &self,
        store: &ImportStore,
        input_hash: &str,
    ) -> ImportResult<Option<StopReason>> {
        if store.input_hash()?.as_deref() != Some(input_hash) {
            return Ok(Some(StopReason::InputChanged));
        }

        let heartbeat_at = store.session()?.heartbeat_at;
        let idle = Utc::now().signed_duration_since(heartbeat_at);
        let timeout = chrono::Duration::from_std(self.settings.heartbeat_timeout)
            .map_err(|e| ImportError::InternalError(e.to_string()))?;
        if idle > timeout {
            return Ok(Some(StopReason::HeartbeatTimeout));
        }

        Ok(None)
    }

    fn open_working_file(&self, path: &Path, fresh: bool) -> ImportResult<BufWriter<File>> {
        let working_err = |e: std::io::Error| {
            ImportError::WorkingFileError(format!("{}: {}", path.display(), e))
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(working_err)?;
        }

        let file = if fresh {
            File::create(path).map_err(working_err)?
        } else {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(working_err)?
        };
        Ok(BufWriter::new(file))
    }
}

/// 追加一块结果行（每行一个 JSON 对象）
fn append_rows(writer: &mut BufWriter<File>, rows: &[ImportRow]) -> ImportResult<()> {
    let io_err = |e: std::io::Error| ImportError::WorkingFileError(e.to_string());
    for row in rows {
        serde_json::to_writer(&mut *writer, row)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)
}

/// 累加进度计数
fn accumulate(progress: &mut PreviewProgress, definition: &ImporterDefinition, rows: &[ImportRow]) {
    for row in rows {
        progress.processed = progress.processed.max(row.row_number);
        match row.action {
            Some(RowAction::Create) => progress.creates += 1,
            Some(RowAction::Update) => progress.updates += 1,
            Some(RowAction::Skip) | None => progress.skips += 1,
        }

        for resolution in &row.relationships {
            let LinkTarget::Create { name } = &resolution.target else {
                continue;
            };
            let Some(link) = definition.link(&resolution.link) else {
                continue;
            };
            if link.target != EntityType::Company {
                continue;
            }
            let dedup = link_dedup_value(link, &resolution.matcher, name);
            let seen = progress
                .new_companies
                .iter()
                .any(|known| link_dedup_value(link, &resolution.matcher, known) == dedup);
            if !seen {
                progress.new_companies.insert(name.trim().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::ColumnMapping;
    use crate::domain::types::ImportStatus;
    use crate::engine::input_hash::current_input_hash;
    use crate::repository::import_store::NewImportSession;
    use crate::repository::record_repo::SqliteRecordRepository;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(chunk_size: usize) -> (PreviewProcessor, SharedConnection, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("preview.db");
        let conn = crate::db::open_shared_connection(db.to_str().unwrap()).unwrap();
        let settings = ImportSettings {
            preview_chunk_size: chunk_size,
            working_dir: dir.path().join("work"),
            ..ImportSettings::default()
        };
        let records = Arc::new(SqliteRecordRepository::new(conn.clone()));
        (PreviewProcessor::new(conn.clone(), records, settings), conn, dir)
    }

    fn person_import(conn: &SharedConnection, rows: &[[&str; 2]]) -> ImportStore {
        let store = ImportStore::create(
            conn.clone(),
            NewImportSession {
                team_id: "team-1".to_string(),
                user_id: "user-1".to_string(),
                entity_type: EntityType::Person,
                file_path: "people.csv".to_string(),
                headers: vec!["Name".to_string(), "Company".to_string()],
            },
            Duration::from_secs(3600),
        )
        .unwrap();
        let raw: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        store.insert_rows(&raw).unwrap();
        store
            .set_column_mappings(&[
                ColumnMapping::field("Name", "name"),
                ColumnMapping::entity_link("Company", "company", "name"),
            ])
            .unwrap();
        store.set_status(ImportStatus::Previewing).unwrap();
        store
    }

    #[test]
    fn test_preview_counts_and_distinct_new_companies() {
        let (processor, conn, _dir) = setup(2);
        let store = person_import(
            &conn,
            &[["Ada", "Acme"], ["Bob", "Acme"], ["Cy", "Globex"], ["Di", ""], ["Ed", "Acme "]],
        );
        let hash = current_input_hash(&store).unwrap();
        store.set_input_hash(&hash).unwrap();

        let outcome = processor.run(store.id(), "team-1", &hash).unwrap();
        let PreviewOutcome::Completed(progress) = outcome else {
            panic!("expected completed preview, got {:?}", outcome);
        };

        assert_eq!(progress.processed, 5);
        assert_eq!(progress.creates, 5);
        assert_eq!(progress.new_companies.len(), 2);
        assert!(progress.completed);
        assert!(progress.new_companies.contains("Acme"));

        let written = fs::read_to_string(processor.working_file_path(store.id())).unwrap();
        assert_eq!(written.lines().count(), 5);
        assert_eq!(store.row(3).unwrap().unwrap().action, Some(RowAction::Create));
    }

    #[test]
    fn test_hash_mismatch_stops_without_output_or_deletion() {
        let (processor, conn, _dir) = setup(2);
        let store = person_import(&conn, &[["Ada", "Acme"], ["Bob", "Globex"]]);
        store.set_input_hash("current-hash").unwrap();

        let path = processor.working_file_path(store.id());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{\"earlier\":true}\n").unwrap();

        let outcome = processor.run(store.id(), "team-1", "stale-hash").unwrap();
        assert_eq!(outcome, PreviewOutcome::Stopped(StopReason::InputChanged));

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"earlier\":true}\n");
        assert_eq!(store.preview_progress().unwrap().processed, 0);
        assert_eq!(store.row(1).unwrap().unwrap().action, None);
    }

    #[test]
    fn test_stale_heartbeat_stops() {
        let (mut processor, conn, _dir) = setup(2);
        processor.settings.heartbeat_timeout = Duration::from_secs(0);
        let store = person_import(&conn, &[["Ada", "Acme"]]);
        let hash = current_input_hash(&store).unwrap();
        store.set_input_hash(&hash).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let outcome = processor.run(store.id(), "team-1", &hash).unwrap();
        assert_eq!(outcome, PreviewOutcome::Stopped(StopReason::HeartbeatTimeout));
    }

    #[test]
    fn test_missing_session_is_quiet() {
        let (processor, _conn, _dir) = setup(2);
        let outcome = processor.run("nope", "team-1", "hash").unwrap();
        assert_eq!(outcome, PreviewOutcome::SessionGone);
    }

    #[test]
    fn test_resume_continues_from_processed() {
        let (processor, conn, _dir) = setup(1);
        let store = person_import(&conn, &[["Ada", "Acme"], ["Bob", "Acme"], ["Cy", "Initech"]]);
        let hash = current_input_hash(&store).unwrap();
        store.set_input_hash(&hash).unwrap();

        let mut partial = PreviewProgress {
            processed: 1,
            creates: 1,
            ..PreviewProgress::default()
        };
        partial.new_companies.insert("Acme".to_string());
        store.set_preview_progress(&partial).unwrap();

        let PreviewOutcome::Completed(progress) = processor.run(store.id(), "team-1", &hash).unwrap()
        else {
            panic!("expected completed preview");
        };
        assert_eq!(progress.processed, 3);
        assert_eq!(progress.creates, 3);
        assert_eq!(progress.new_companies.len(), 2);

        let written = fs::read_to_string(processor.working_file_path(store.id())).unwrap();
        assert_eq!(written.lines().count(), 2);
    }
}
