use crate::app::CliApp;
use crate::utils::format_time;
use backup_core::{BackupError, Result, database::RecordFilter, ledger::RecordLedger};
use serde::Serialize;
use tracing::info;

/// JSON 输出写到标准输出，便于脚本处理
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| BackupError::custom(format!("JSON 序列化失败: {e}")))?;
    println!("{content}");
    Ok(())
}

/// 列出备份记录，最新的在前
pub async fn list_records(app: &CliApp, job_id: Option<i64>, json: bool) -> Result<()> {
    let filter = RecordFilter {
        cronjob_id: job_id,
        ..Default::default()
    };
    let records = app.database.list_records(&filter).await?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        info!("📦 暂无备份记录");
        return Ok(());
    }

    info!("📦 备份记录 ({} 条):", records.len());
    for record in records {
        info!(
            "   {:>4}  {} {:<10} {:<16} {:<16} {}/{}",
            record.id,
            format_time(record.created_at),
            record.record_type,
            record.name,
            record.detail_name,
            record.file_dir,
            record.file_name
        );
    }
    Ok(())
}

pub async fn list_executions(app: &CliApp, job_id: i64, json: bool) -> Result<()> {
    let executions = app.database.list_executions(job_id).await?;
    if json {
        return print_json(&executions);
    }
    if executions.is_empty() {
        info!("📝 任务 {} 暂无执行记录", job_id);
        return Ok(());
    }

    info!("📝 任务 {} 的执行记录:", job_id);
    for execution in executions {
        info!(
            "   {:>4}  {} ~ {}  {:<9} {}",
            execution.id,
            format_time(Some(execution.start_time)),
            format_time(execution.end_time),
            execution.status.as_str(),
            execution.message
        );
    }
    Ok(())
}
