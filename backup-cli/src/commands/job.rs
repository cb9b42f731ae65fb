use crate::app::CliApp;
use crate::cli::{JobAddArgs, JobCommand};
use crate::utils::format_time;
use backup_core::{
    BackupError, Result,
    database::{CronJob, ExecutionRecord, ExecutionStatus, JobType},
};
use tracing::{error, info};

pub async fn run_job_command(app: &CliApp, cmd: JobCommand) -> Result<()> {
    match cmd {
        JobCommand::Add(args) => {
            let job = build_job(args)?;
            let id = app.database.create_cronjob(&job).await?;
            info!("✅ 已添加 {} 任务 {}，ID: {}", job.job_type, job.name, id);
            Ok(())
        }
        JobCommand::List => {
            let jobs = app.database.list_cronjobs().await?;
            if jobs.is_empty() {
                info!("📋 暂无任务");
                return Ok(());
            }
            info!("📋 任务列表:");
            for job in jobs {
                info!(
                    "   {:>4}  {:<20} {:<14} 账号: {:<8} 保留: {}",
                    job.id,
                    job.name,
                    job.job_type.as_str(),
                    if job.source_account_ids.is_empty() {
                        "-"
                    } else {
                        job.source_account_ids.as_str()
                    },
                    job.retain_copies
                );
            }
            Ok(())
        }
    }
}

fn build_job(args: JobAddArgs) -> Result<CronJob> {
    let job_type: JobType = args.job_type.parse()?;
    let mut job = CronJob::new(args.name, job_type);
    job.app_id = args.app_id;
    job.website = args.website;
    job.db_type = args.db_type;
    job.db_name = args.db_name;
    job.source_dir = args.source_dir;
    job.is_dir = !args.files;
    job.script = args.script;
    job.executor = args.executor;
    job.url = args.url;
    job.source_account_ids = args.accounts;
    job.download_account_id = args.download_account;
    job.secret = args.secret.filter(|s| !s.is_empty());
    job.exclusion_rules = args.exclusion_rules;
    job.retain_copies = args.retain;
    Ok(job)
}

/// 触发任务并等待结束，失败的执行以错误返回
pub async fn run_job(app: &CliApp, job_id: i64) -> Result<ExecutionRecord> {
    let job = app
        .database
        .get_cronjob(job_id)
        .await?
        .ok_or_else(|| BackupError::custom(format!("任务 {job_id} 不存在")))?;

    info!("🚀 运行任务 {} ({})", job.name, job.job_type);
    let execution = app.dispatcher.trigger(job).await??;

    info!("   执行记录ID: {}", execution.id);
    info!("   开始时间: {}", format_time(Some(execution.start_time)));
    info!("   结束时间: {}", format_time(execution.end_time));
    if !execution.records.is_empty() {
        info!("   输出日志: {}", execution.records);
    }

    match execution.status {
        ExecutionStatus::Failed => {
            error!("❌ 任务执行失败: {}", execution.message);
            Err(BackupError::custom(execution.message))
        }
        _ => {
            info!("✅ 任务执行成功");
            Ok(execution)
        }
    }
}
