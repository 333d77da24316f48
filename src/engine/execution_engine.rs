// ==========================================
// CRM 导入向导 - 落库引擎
// ==========================================
// 职责: 按行号顺序分块提交所有未跳过的行
// 流程（每行）:
// 1. 取匹配阶段写入的最终字段值
// 2. Update: 按 matched_id 取已有记录；记录已被删除 → 视为 Skip
// 3. 解析关联: 已有记录直接用 id；需新建的按 (关联, 名称) 去重后新建
// 4. 实体钩子 prepare_for_save，拆分核心属性 / 自定义字段
// 5. 保存记录、自定义字段、多对多关联，调用 after_save
// 红线:
// - 每行在独立保存点内写入；单行失败整行回滚，只计入 failed，不中断整批
// - 分块循环本身出错 → 会话 Failed 并向上抛出
// ==========================================

use crate::config::ImportSettings;
use crate::db::SharedConnection;
use crate::domain::entity_link::{EntityLink, LinkStorage};
use crate::domain::field::CUSTOM_FIELD_PREFIX;
use crate::domain::record::{CrmRecord, RecordId, RecordPayload};
use crate::domain::session::{ImportResults, ImportRow, LinkResolution, LinkTarget};
use crate::domain::types::{ImportStatus, RowAction};
use crate::engine::context::ImportContext;
use crate::importer::definitions::importer_for;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::EntityImporter;
use crate::importer::normalize::{link_dedup_value, normalizer_for};
use crate::repository::custom_field_repo::CustomFieldStore;
use crate::repository::import_store::ImportStore;
use crate::repository::record_repo::RecordRepository;
use serde_json::{Map, Value};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 单行落库结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Created,
    Updated,
    Skipped,
}

pub struct ExecutionEngine {
    conn: SharedConnection,
    records: Arc<dyn RecordRepository>,
    custom_fields: Arc<dyn CustomFieldStore>,
    settings: ImportSettings,
}

impl ExecutionEngine {
    pub fn new(
        conn: SharedConnection,
        records: Arc<dyn RecordRepository>,
        custom_fields: Arc<dyn CustomFieldStore>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            conn,
            records,
            custom_fields,
            settings,
        }
    }

    /// 执行落库
    ///
    /// # 返回
    /// - Ok(Some(results)): 完成（可能含失败行）
    /// - Ok(None): 会话不存在或已过期
    /// - Err: 分块循环出错（会话已置为 Failed）
    #[instrument(skip(self))]
    pub fn run(&self, import_id: &str, team_id: &str) -> ImportResult<Option<ImportResults>> {
        let Some(store) = ImportStore::load(self.conn.clone(), import_id, team_id)? else {
            debug!("导入会话不存在或已过期，落库任务退出");
            return Ok(None);
        };

        let mut ctx = ImportContext::new(import_id, team_id, self.settings.clone());
        match self.execute(&store, &mut ctx) {
            Ok(results) => {
                store.set_status(ImportStatus::Completed)?;
                info!(
                    created = results.created,
                    updated = results.updated,
                    skipped = results.skipped,
                    failed = results.failed,
                    new_links = ctx.created_link_count(),
                    "导入完成"
                );
                Ok(Some(results))
            }
            Err(err) => {
                if let Err(fail_err) = store.fail(&err.to_string()) {
                    warn!(error = %fail_err, "记录落库失败状态时出错");
                }
                Err(err)
            }
        }
    }

    fn execute(&self, store: &ImportStore, ctx: &mut ImportContext) -> ImportResult<ImportResults> {
        let session = store.session()?;
        let importer = importer_for(session.entity_type);
        let mut results = store.results()?;

        store.chunk::<ImportError, _>(
            ctx.settings.execution_chunk_size,
            results.last_row_number,
            |rows| {
                for row in rows {
                    let row_number = row.row_number;
                    if row.skipped || row.action == Some(RowAction::Skip) {
                        results.skipped += 1;
                    } else {
                        let mark = ctx.link_mark();
                        let outcome = store
                            .with_savepoint(|| self.import_row(importer.as_ref(), &mut *ctx, &row));
                        match outcome {
                            Ok(RowOutcome::Created) => results.created += 1,
                            Ok(RowOutcome::Updated) => results.updated += 1,
                            Ok(RowOutcome::Skipped) => results.skipped += 1,
                            Err(err) => {
                                ctx.forget_links_since(mark);
                                results.failed += 1;
                                warn!(
                                    import_id = %ctx.import_id,
                                    row_number,
                                    error = %err,
                                    "行导入失败，已回滚"
                                );
                            }
                        }
                    }
                    results.last_row_number = row_number;
                }

                store.set_results(&results)?;
                debug!(
                    import_id = %ctx.import_id,
                    last_row = results.last_row_number,
                    total = results.total(),
                    "落库分块完成"
                );
                Ok(ControlFlow::Continue(()))
            },
        )?;

        Ok(results)
    }

    fn import_row(
        &self,
        importer: &dyn EntityImporter,
        ctx: &mut ImportContext,
        row: &ImportRow,
    ) -> ImportResult<RowOutcome> {
        let entity = importer.entity_type();

        let existing = match row.action {
            Some(RowAction::Update) => {
                let id = row.matched_id.as_deref().ok_or_else(|| {
                    ImportError::InternalError(format!("row {} has no matched record", row.row_number))
                })?;
                match self.records.find_by_id(&ctx.team_id, entity, id)? {
                    Some(record) => Some(record),
                    None => {
                        debug!(row_number = row.row_number, record_id = id, "待更新记录已被删除，跳过");
                        return Ok(RowOutcome::Skipped);
                    }
                }
            }
            Some(RowAction::Create) => None,
            Some(RowAction::Skip) => return Ok(RowOutcome::Skipped),
            None => {
                return Err(ImportError::InternalError(format!(
                    "row {} has not been matched",
                    row.row_number
                )))
            }
        };

        let mut payload = split_payload(row.values.clone().unwrap_or_default());
        let mut attachments: Vec<(String, RecordId)> = Vec::new();

        for resolution in &row.relationships {
            let Some(link) = importer.definition().link(&resolution.link) else {
                continue;
            };
            let target_id = self.link_target_id(ctx, link, resolution)?;
            match &link.storage {
                LinkStorage::ForeignKey { column } => {
                    payload.core.insert(column.clone(), Value::String(target_id));
                }
                LinkStorage::ManyToMany { relation } => attachments.push((relation.clone(), target_id)),
                LinkStorage::CustomFieldValue { code } => {
                    payload.custom.insert(code.clone(), Value::String(target_id));
                }
            }
        }

        importer.prepare_for_save(&mut payload, existing.is_some());

        let record = match &existing {
            Some(record) => self
                .records
                .update(&ctx.team_id, entity, &record.id, payload.core.clone())?,
            None => self.records.create(&ctx.team_id, entity, payload.core.clone())?,
        };

        self.save_custom_fields(&record, &payload)?;
        for (relation, target_id) in &attachments {
            self.records.attach(relation, &record.id, target_id)?;
        }
        importer.after_save(&record, &payload)?;

        Ok(if existing.is_some() {
            RowOutcome::Updated
        } else {
            RowOutcome::Created
        })
    }

    fn save_custom_fields(&self, record: &CrmRecord, payload: &RecordPayload) -> ImportResult<()> {
        if payload.custom.is_empty() {
            return Ok(());
        }
        self.custom_fields.set_multiple(&record.id, &payload.custom)?;
        Ok(())
    }

    /// 关联目标 id（需新建时按 (关联, 归一化取值) 去重）
    fn link_target_id(
        &self,
        ctx: &mut ImportContext,
        link: &EntityLink,
        resolution: &LinkResolution,
    ) -> ImportResult<RecordId> {
        let name = match &resolution.target {
            LinkTarget::Existing { id } => return Ok(id.clone()),
            LinkTarget::Create { name } => name,
        };

        let dedup = link_dedup_value(link, &resolution.matcher, name);
        if let Some(id) = ctx.created_link(&link.key, &dedup) {
            return Ok(id.clone());
        }

        let mut attributes = Map::new();
        attributes.insert("name".to_string(), Value::String(name.trim().to_string()));
        let record = self.records.create(&ctx.team_id, link.target, attributes)?;

        // 按域名 / 邮箱新建时，把取值写入对应的自定义字段，后续导入可再次匹配
        if let Some(matcher) = link.matcher(&resolution.matcher) {
            if let Some(code) = matcher.field.strip_prefix(CUSTOM_FIELD_PREFIX) {
                let value = normalizer_for(matcher.kind)(name);
                self.custom_fields
                    .set_value(&record.id, code, &Value::Array(vec![Value::String(value)]))?;
            }
        }

        info!(
            import_id = %ctx.import_id,
            link = %link.key,
            target = %link.target,
            record_id = %record.id,
            name = %name,
            "已新建关联记录"
        );
        ctx.remember_created_link(&link.key, &dedup, record.id.clone());
        Ok(record.id)
    }
}

/// 拆分核心属性与自定义字段（自定义字段去前缀；记录 id 列不写入属性）
fn split_payload(values: Map<String, Value>) -> RecordPayload {
    let mut payload = RecordPayload::default();
    for (key, value) in values {
        if key == "id" {
            continue;
        }
        match key.strip_prefix(CUSTOM_FIELD_PREFIX) {
            Some(code) => {
                payload.custom.insert(code.to_string(), value);
            }
            None => {
                payload.core.insert(key, value);
            }
        }
    }
    payload
}
