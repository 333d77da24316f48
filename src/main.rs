// ==========================================
// CRM 导入向导 - 命令行入口
// ==========================================
// 用法:
//   crm-import <entity> <file> [db_path]
//
// 按表头自动映射，有校验错误时只打印摘要并退出；
// 否则依次预览、落库并打印结果
// ==========================================

use anyhow::{anyhow, bail, Context};
use crm_import::app::{get_default_db_path, AppState, RunnerMode};
use crm_import::domain::types::EntityType;
use crm_import::{logging, VERSION};
use std::path::PathBuf;

const TEAM_ID: &str = "local";
const USER_ID: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let entity: EntityType = args
        .next()
        .ok_or_else(|| anyhow!("usage: crm-import <entity> <file> [db_path]"))?
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    let file = PathBuf::from(
        args.next()
            .ok_or_else(|| anyhow!("usage: crm-import <entity> <file> [db_path]"))?,
    );
    let db_path = args.next().unwrap_or_else(get_default_db_path);

    tracing::info!(version = VERSION, entity = %entity, file = %file.display(), db_path = %db_path, "CRM 导入开始");

    let state = AppState::new(db_path, RunnerMode::Inline, None)
        .await
        .context("初始化失败")?;
    let api = state.wizard_api.clone();

    let upload = api.upload(TEAM_ID, USER_ID, entity, &file)?;
    let import_id = upload.import_id.clone();
    println!(
        "import_id={} rows={} mapped_columns={}/{}",
        import_id,
        upload.total_rows,
        upload.suggested_mappings.len(),
        upload.headers.len()
    );

    let review = api.set_column_mappings(TEAM_ID, &import_id, upload.suggested_mappings)?;
    if review.error_rows > 0 {
        println!("error_rows={} (fix the file and retry)", review.error_rows);
        api.cancel(TEAM_ID, &import_id)?;
        bail!("{} rows failed validation", review.error_rows);
    }

    api.heartbeat(TEAM_ID, &import_id)?;
    api.start_preview(TEAM_ID, &import_id)?;
    let preview = api.status(TEAM_ID, &import_id)?.progress;
    println!(
        "preview: creates={} updates={} skips={} new_companies={}",
        preview.creates,
        preview.updates,
        preview.skips,
        preview.new_companies.len()
    );

    api.start_import(TEAM_ID, &import_id)?;
    let report = api.status(TEAM_ID, &import_id)?;
    println!(
        "status={} created={} updated={} skipped={} failed={}",
        report.status,
        report.results.created,
        report.results.updated,
        report.results.skipped,
        report.results.failed
    );

    Ok(())
}
