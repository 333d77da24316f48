// ==========================================
// CRM 导入向导 - 向导接口
// ==========================================
// 职责: 前端调用的向导步骤
// - 上传 → 映射 → 评审（修正/跳过）→ 预览 → 落库 / 取消
// - 每一步先检查会话状态是否允许该迁移
// 说明: 预览与落库提交为后台任务，前端通过 status 轮询
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ImportSettings;
use crate::db::SharedConnection;
use crate::domain::mapping::{ColumnMapping, CorrectionSet, ValueCorrection};
use crate::domain::session::{ImportResults, PreviewProgress, ValidationError};
use crate::domain::types::{EntityType, ImportStatus};
use crate::engine::input_hash::current_input_hash;
use crate::engine::task_runner::{ImportTask, TaskRunner};
use crate::importer::column_mapper::{ColumnMapper, ColumnSpec};
use crate::importer::column_validator::ColumnValidator;
use crate::importer::definitions::importer_for;
use crate::importer::entity_link_resolver::EntityLinkResolver;
use crate::importer::error::ImportError;
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::FileParser;
use crate::repository::import_store::{ImportStore, NewImportSession, UniqueValue};
use crate::repository::record_repo::RecordRepository;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// 上传响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub import_id: String,
    pub headers: Vec<String>,
    pub total_rows: u32,
    /// 按表头猜测的映射（已保存为初始映射）
    pub suggested_mappings: Vec<ColumnMapping>,
}

/// 评审摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total_rows: u32,
    /// 存在校验错误的行数（不含已跳过的行）
    pub error_rows: u32,
}

/// 轮询接口
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStatusReport {
    pub status: ImportStatus,
    pub progress: PreviewProgress,
    pub results: ImportResults,
    pub error: Option<String>,
}

/// 向导接口
pub struct ImportWizardApi {
    conn: SharedConnection,
    records: Arc<dyn RecordRepository>,
    parser: Arc<dyn FileParser>,
    runner: Arc<dyn TaskRunner>,
    settings: ImportSettings,
}

impl ImportWizardApi {
    /// 创建向导接口（默认按扩展名解析 CSV / Excel）
    pub fn new(
        conn: SharedConnection,
        records: Arc<dyn RecordRepository>,
        runner: Arc<dyn TaskRunner>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            conn,
            records,
            parser: Arc::new(UniversalFileParser),
            runner,
            settings,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn FileParser>) -> Self {
        self.parser = parser;
        self
    }

    // ==========================================
    // 上传
    // ==========================================

    /// 上传文件并写入暂存库
    ///
    /// # 参数
    /// - entity: 导入目标实体
    /// - file_path: 上传文件（.csv / .xlsx / .xls）
    ///
    /// # 返回
    /// - UploadResponse: 会话 id、表头、行数、猜测的映射
    #[instrument(skip(self, file_path), fields(file = %file_path.display()))]
    pub fn upload(
        &self,
        team_id: &str,
        user_id: &str,
        entity: EntityType,
        file_path: &Path,
    ) -> ApiResult<UploadResponse> {
        let sheet = self.parser.parse(file_path)?;
        if sheet.rows.len() > self.settings.max_rows {
            return Err(ImportError::TooManyRows {
                actual: sheet.rows.len(),
                limit: self.settings.max_rows,
            }
            .into());
        }

        let store = ImportStore::create(
            self.conn.clone(),
            NewImportSession {
                team_id: team_id.to_string(),
                user_id: user_id.to_string(),
                entity_type: entity,
                file_path: file_path.display().to_string(),
                headers: sheet.headers.clone(),
            },
            self.settings.session_retention,
        )?;
        let total_rows = store.insert_rows(&sheet.rows)?;

        let importer = importer_for(entity);
        let suggested = ColumnMapper::new(importer.definition()).guess_mappings(&sheet.headers);
        store.set_column_mappings(&suggested)?;
        transition(&store, ImportStatus::Mapping)?;

        info!(
            import_id = store.id(),
            rows = total_rows,
            guessed = suggested.len(),
            "文件已上传"
        );

        Ok(UploadResponse {
            import_id: store.id().to_string(),
            headers: sheet.headers,
            total_rows,
            suggested_mappings: suggested,
        })
    }

    // ==========================================
    // 映射与评审
    // ==========================================

    /// 保存映射并校验所有映射列（每列按去重后的取值校验一次）
    #[instrument(skip(self, mappings))]
    pub fn set_column_mappings(
        &self,
        team_id: &str,
        import_id: &str,
        mappings: Vec<ColumnMapping>,
    ) -> ApiResult<ReviewSummary> {
        let store = self.open(team_id, import_id)?;
        let current = store.status()?;
        ensure_status(
            current,
            &[ImportStatus::Mapping, ImportStatus::Reviewing, ImportStatus::Previewing],
            ImportStatus::Reviewing,
        )?;

        let session = store.session()?;
        let importer = importer_for(session.entity_type);
        let columns = ColumnMapper::new(importer.definition()).resolve(&session.headers, &mappings)?;

        reset_preview(&store)?;
        store.set_column_mappings(&mappings)?;
        store.clear_validation(None)?;

        let corrections = CorrectionSet::new(store.corrections()?);
        let links = EntityLinkResolver::new(self.records.clone(), team_id);
        for column in &columns {
            validate_column(&store, column, &corrections, &links, None)?;
        }

        transition(&store, ImportStatus::Reviewing)?;
        let summary = review_summary(&store)?;
        info!(columns = columns.len(), error_rows = summary.error_rows, "映射已保存并完成校验");
        Ok(summary)
    }

    /// 保存值修正，并只重新校验带该原始值的行
    ///
    /// # 返回
    /// - 修正后该值的校验错误（None 表示通过）
    #[instrument(skip(self, correction), fields(column = %correction.column))]
    pub fn correct_value(
        &self,
        team_id: &str,
        import_id: &str,
        correction: ValueCorrection,
    ) -> ApiResult<Option<ValidationError>> {
        let store = self.open(team_id, import_id)?;
        let column = self.begin_review_edit(&store, &correction.column)?;
        store.upsert_correction(&correction)?;
        self.revalidate_value(&store, &column, &correction.raw_value)
    }

    /// 撤销某个原始值的修正
    #[instrument(skip(self))]
    pub fn remove_correction(
        &self,
        team_id: &str,
        import_id: &str,
        column: &str,
        raw_value: &str,
    ) -> ApiResult<Option<ValidationError>> {
        let store = self.open(team_id, import_id)?;
        let spec = self.begin_review_edit(&store, column)?;
        store.remove_correction(column, raw_value)?;
        self.revalidate_value(&store, &spec, raw_value)
    }

    /// 行级跳过标记
    pub fn set_row_skipped(
        &self,
        team_id: &str,
        import_id: &str,
        row_number: u32,
        skipped: bool,
    ) -> ApiResult<()> {
        let store = self.open(team_id, import_id)?;
        let current = store.status()?;
        ensure_status(
            current,
            &[ImportStatus::Reviewing, ImportStatus::Previewing],
            ImportStatus::Reviewing,
        )?;

        reset_preview(&store)?;
        store.set_row_skipped(row_number, skipped)?;
        transition(&store, ImportStatus::Reviewing)?;
        Ok(())
    }

    /// 列内去重取值（评审界面）
    pub fn unique_values(
        &self,
        team_id: &str,
        import_id: &str,
        column: &str,
    ) -> ApiResult<Vec<UniqueValue>> {
        let store = self.open(team_id, import_id)?;
        Ok(store.unique_values(column)?)
    }

    /// 前端存活心跳
    pub fn heartbeat(&self, team_id: &str, import_id: &str) -> ApiResult<()> {
        let store = self.open(team_id, import_id)?;
        store.touch_heartbeat()?;
        Ok(())
    }

    // ==========================================
    // 预览与落库
    // ==========================================

    /// 提交预览任务
    ///
    /// 输入指纹未变化时沿用已有进度（续跑或直接完成）
    ///
    /// # 返回
    /// - 任务捕获的输入指纹
    #[instrument(skip(self))]
    pub fn start_preview(&self, team_id: &str, import_id: &str) -> ApiResult<String> {
        let store = self.open(team_id, import_id)?;
        let current = store.status()?;
        ensure_status(
            current,
            &[ImportStatus::Reviewing, ImportStatus::Previewing],
            ImportStatus::Previewing,
        )?;

        let input_hash = current_input_hash(&store)?;
        if store.input_hash()?.as_deref() != Some(input_hash.as_str()) {
            reset_preview(&store)?;
            store.set_input_hash(&input_hash)?;
        }
        transition(&store, ImportStatus::Previewing)?;
        store.touch_heartbeat()?;

        self.runner.dispatch(ImportTask::ProcessPreview {
            import_id: import_id.to_string(),
            team_id: team_id.to_string(),
            input_hash: input_hash.clone(),
        })?;
        Ok(input_hash)
    }

    /// 轮询状态
    pub fn status(&self, team_id: &str, import_id: &str) -> ApiResult<ImportStatusReport> {
        let store = self.open(team_id, import_id)?;
        let session = store.session()?;
        Ok(ImportStatusReport {
            status: session.status,
            progress: store.preview_progress()?,
            results: store.results()?,
            error: session.error_message,
        })
    }

    /// 提交落库任务（预览必须已完成且输入未变化）
    #[instrument(skip(self))]
    pub fn start_import(&self, team_id: &str, import_id: &str) -> ApiResult<()> {
        let store = self.open(team_id, import_id)?;
        let current = store.status()?;
        ensure_status(current, &[ImportStatus::Previewing], ImportStatus::Importing)?;

        if !store.preview_progress()?.completed {
            return Err(ApiError::PreviewNotReady(
                "the preview has not finished".to_string(),
            ));
        }
        if store.input_hash()?.as_deref() != Some(current_input_hash(&store)?.as_str()) {
            return Err(ApiError::PreviewNotReady(
                "inputs changed since the preview was computed".to_string(),
            ));
        }

        store.set_results(&ImportResults::default())?;
        transition(&store, ImportStatus::Importing)?;

        self.runner.dispatch(ImportTask::ExecuteImport {
            import_id: import_id.to_string(),
            team_id: team_id.to_string(),
        })?;
        Ok(())
    }

    /// 取消并删除会话全部产物（落库中不可取消）
    #[instrument(skip(self))]
    pub fn cancel(&self, team_id: &str, import_id: &str) -> ApiResult<()> {
        let store = self.open(team_id, import_id)?;
        let current = store.status()?;
        if current == ImportStatus::Importing {
            return Err(ApiError::InvalidStateTransition {
                from: current.to_string(),
                to: "cancelled".to_string(),
            });
        }

        store.destroy()?;
        info!("导入会话已取消");
        Ok(())
    }

    /// 清理过期会话
    pub fn sweep_expired(&self) -> ApiResult<usize> {
        Ok(ImportStore::sweep_expired(
            &self.conn,
            self.settings.session_retention,
        )?)
    }

    /// 评审编辑前置: 状态检查、列必须已映射；作废已有预览并回到 Reviewing
    fn begin_review_edit(&self, store: &ImportStore, column: &str) -> ApiResult<ColumnSpec> {
        let current = store.status()?;
        ensure_status(
            current,
            &[ImportStatus::Reviewing, ImportStatus::Previewing],
            ImportStatus::Reviewing,
        )?;

        let session = store.session()?;
        let importer = importer_for(session.entity_type);
        let spec = ColumnMapper::new(importer.definition())
            .resolve(&session.headers, &store.column_mappings()?)?
            .into_iter()
            .find(|c| c.source() == column)
            .ok_or_else(|| ApiError::InvalidInput(format!("column \"{}\" is not mapped", column)))?;

        reset_preview(store)?;
        transition(store, ImportStatus::Reviewing)?;
        Ok(spec)
    }

    fn revalidate_value(
        &self,
        store: &ImportStore,
        column: &ColumnSpec,
        raw_value: &str,
    ) -> ApiResult<Option<ValidationError>> {
        let corrections = CorrectionSet::new(store.corrections()?);
        let links = EntityLinkResolver::new(self.records.clone(), store.team_id());
        validate_column(store, column, &corrections, &links, Some(raw_value))?;

        Ok(store
            .unique_values(column.source())?
            .into_iter()
            .find(|v| v.value == raw_value)
            .and_then(|v| v.error))
    }

    fn open(&self, team_id: &str, import_id: &str) -> ApiResult<ImportStore> {
        ImportStore::load(self.conn.clone(), import_id, team_id)?
            .ok_or_else(|| ApiError::SessionNotFound(import_id.to_string()))
    }
}

// ==========================================
// 内部工具
// ==========================================

/// 当前状态必须在 allowed 中，且允许迁移到 next
fn ensure_status(current: ImportStatus, allowed: &[ImportStatus], next: ImportStatus) -> ApiResult<()> {
    if allowed.contains(&current) && current.can_transition_to(next) {
        return Ok(());
    }
    Err(ApiError::InvalidStateTransition {
        from: current.to_string(),
        to: next.to_string(),
    })
}

fn transition(store: &ImportStore, next: ImportStatus) -> ApiResult<()> {
    let current = store.status()?;
    if current == next {
        return Ok(());
    }
    ensure_status(current, &[current], next)?;
    store.set_status(next)?;
    Ok(())
}

/// 输入变化后预览结果作废
///
/// 先清空指纹: 运行中的预览任务在下一个分块前停止，下次提交预览时重算
fn reset_preview(store: &ImportStore) -> ApiResult<()> {
    store.clear_input_hash()?;
    store.clear_matches()?;
    store.set_preview_progress(&PreviewProgress::default())?;
    Ok(())
}

fn review_summary(store: &ImportStore) -> ApiResult<ReviewSummary> {
    Ok(ReviewSummary {
        total_rows: store.session()?.total_rows,
        error_rows: store.error_row_count()?,
    })
}

/// 校验一列（only 为 Some 时只校验该原始值）并批量写回
fn validate_column(
    store: &ImportStore,
    column: &ColumnSpec,
    corrections: &CorrectionSet,
    links: &EntityLinkResolver,
    only: Option<&str>,
) -> ApiResult<()> {
    let raw_values: Vec<String> = match only {
        Some(raw) => vec![raw.to_string()],
        None => store
            .unique_values(column.source())?
            .into_iter()
            .map(|v| v.value)
            .collect(),
    };

    let results: Vec<(String, Option<ValidationError>)> = match column {
        ColumnSpec::Field(field) => raw_values
            .into_iter()
            .map(|raw| {
                let error = ColumnValidator::validate(field, corrections.apply(&field.source, &raw));
                (raw, error)
            })
            .collect(),
        ColumnSpec::Link(link) => {
            let effective: Vec<String> = raw_values
                .iter()
                .map(|raw| corrections.apply(&link.source, raw).to_string())
                .collect();
            let errors = links.batch_validate(&link.link, &link.matcher, &effective)?;
            raw_values
                .into_iter()
                .zip(effective)
                .map(|(raw, value)| {
                    let error = errors.get(&value).cloned().flatten();
                    (raw, error)
                })
                .collect()
        }
    };

    store.bulk_set_validation(column.source(), &results)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_status_rejects_illegal_moves() {
        assert!(ensure_status(
            ImportStatus::Reviewing,
            &[ImportStatus::Reviewing],
            ImportStatus::Previewing
        )
        .is_ok());

        let err = ensure_status(
            ImportStatus::Mapping,
            &[ImportStatus::Previewing],
            ImportStatus::Importing,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ApiError::InvalidStateTransition { ref from, ref to } if from == "mapping" && to == "importing"
        ));

        assert!(ensure_status(
            ImportStatus::Completed,
            &[ImportStatus::Completed],
            ImportStatus::Reviewing
        )
        .is_err());
    }
}
