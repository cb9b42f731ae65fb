//! 非备份类任务：脚本、URL 请求、网站日志切割

use super::{JobDispatcher, TaskOutput};
use crate::{
    BackupError, Result,
    archive::compress,
    command,
    constants::{
        command::{CURL, DEFAULT_EXECUTOR},
        logs::WEBSITE_LOG_FILES,
        time::DATE_TIME_SLIM_LAYOUT,
    },
    database::CronJob,
    retention::remove_expired_logs,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{error, info};

impl JobDispatcher {
    /// `<base_dir>/task/<type>/<name>/<timestamp>.log`
    fn task_log_path(&self, job: &CronJob, start_time: DateTime<Utc>) -> PathBuf {
        self.config
            .base_dir()
            .join("task")
            .join(job.job_type.as_str())
            .join(&job.name)
            .join(format!("{}.log", start_time.format(DATE_TIME_SLIM_LAYOUT)))
    }

    pub(super) async fn write_task_log(
        &self,
        job: &CronJob,
        start_time: DateTime<Utc>,
        content: &str,
    ) -> Result<String> {
        let path = self.task_log_path(job, start_time);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path.to_string_lossy().to_string())
    }

    /// 先登记输出日志路径，再运行命令
    async fn open_task_log(
        &self,
        job: &CronJob,
        execution_id: i64,
        start_time: DateTime<Utc>,
        output: &mut TaskOutput,
    ) -> Result<PathBuf> {
        let path = self.task_log_path(job, start_time);
        output.records = path.to_string_lossy().to_string();
        self.ledger
            .update_execution(execution_id, &output.records)
            .await?;
        Ok(path)
    }

    pub(super) async fn run_shell(
        &self,
        job: &CronJob,
        execution_id: i64,
        start_time: DateTime<Utc>,
        output: &mut TaskOutput,
    ) -> Result<()> {
        if job.script.trim().is_empty() {
            return Ok(());
        }
        let log_path = self.open_task_log(job, execution_id, start_time, output).await?;

        let executor = if job.executor.trim().is_empty() {
            DEFAULT_EXECUTOR
        } else {
            job.executor.trim()
        };
        let script = if Path::new(job.script.trim()).is_file() {
            PathBuf::from(job.script.trim())
        } else {
            // 内联脚本先落盘
            let file = self
                .config
                .base_dir()
                .join("task")
                .join("shell")
                .join(&job.name)
                .join(format!("{}.sh", job.name));
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&file, &job.script).await?;
            file
        };

        let result =
            command::run_to_log(executor, [&script], &log_path, self.config.command_timeout())
                .await;
        remove_expired_logs(self.ledger.as_ref(), job).await;
        result
    }

    pub(super) async fn run_curl(
        &self,
        job: &CronJob,
        execution_id: i64,
        start_time: DateTime<Utc>,
        output: &mut TaskOutput,
    ) -> Result<()> {
        if job.url.trim().is_empty() {
            return Ok(());
        }
        let log_path = self.open_task_log(job, execution_id, start_time, output).await?;

        let result = command::run_to_log(
            CURL,
            [job.url.trim()],
            &log_path,
            self.config.command_timeout(),
        )
        .await;
        remove_expired_logs(self.ledger.as_ref(), job).await;
        result
    }

    /// 打包网站的 access.log/error.log 并清空原文件
    ///
    /// 单个网站失败不影响其他网站，但最后一个错误会让任务记为失败。
    pub(super) async fn cut_website_logs(
        &self,
        job: &CronJob,
        start_time: DateTime<Utc>,
        output: &mut TaskOutput,
    ) -> Result<()> {
        let selector = crate::archive::parse_selector(&job.website, "网站")?;
        let websites = self.catalog.list_websites(selector).await?;

        let mut files = Vec::new();
        let mut last_error: Option<BackupError> = None;
        for site in &websites {
            let log_dir = Path::new(&site.site_dir).join("log");
            let target_dir = self
                .config
                .backup_dir()
                .join("log")
                .join("website")
                .join(&site.alias);
            let target = target_dir.join(format!(
                "{}_log_{}.gz",
                site.primary_domain,
                start_time.format(DATE_TIME_SLIM_LAYOUT)
            ));
            files.push(target.to_string_lossy().to_string());

            let sources: Vec<PathBuf> = WEBSITE_LOG_FILES.iter().map(|f| log_dir.join(f)).collect();
            match compress::tar_gz_files(sources.clone(), &target).await {
                Ok(()) => {
                    for source in &sources {
                        let _ = tokio::fs::write(source, b"").await;
                    }
                    let msg = format!(
                        "网站 {} 日志已切割到 {}",
                        site.primary_domain,
                        target.display()
                    );
                    info!("{}", msg);
                    output.message.push(msg);
                }
                Err(e) => {
                    let msg = format!("网站 {} 日志切割失败: {}", site.primary_domain, e);
                    error!("{}", msg);
                    output.message.push(msg);
                    last_error = Some(e);
                }
            }
        }
        output.file = files.join(",");

        remove_expired_logs(self.ledger.as_ref(), job).await;
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
