use super::{
    ArchiveProducer, Artifact, BackupItem, ItemSource, SourceCatalog,
    compress::{self, ExclusionRules},
    name_stamp,
};
use crate::{
    Result,
    config::AppConfig,
    constants::logs::LOGIN_LOG_PREFIXES,
    database::CronJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// 日志备份：网站日志、系统日志、登录日志
///
/// 每类日志的收集失败只记录警告，不影响其他日志和最终打包。
pub struct LogProducer {
    catalog: Arc<dyn SourceCatalog>,
    config: Arc<AppConfig>,
}

impl LogProducer {
    pub fn new(catalog: Arc<dyn SourceCatalog>, config: Arc<AppConfig>) -> Self {
        Self { catalog, config }
    }

    async fn collect_website_logs(&self, staging: &Path) -> Result<()> {
        let websites = self.catalog.list_websites(None).await?;
        let backup_log_root = self.config.backup_dir().join("log").join("website");
        for site in &websites {
            let target = staging.join("website").join(&site.alias);
            tokio::fs::create_dir_all(&target).await?;
            copy_files(&Path::new(&site.site_dir).join("log"), &target, |_| true).await;
            copy_files(&backup_log_root.join(&site.alias), &target, |_| true).await;
        }
        debug!("网站日志收集完成");
        Ok(())
    }

    async fn collect_system_logs(&self, staging: &Path) -> Result<()> {
        let target = staging.join("system");
        tokio::fs::create_dir_all(&target).await?;
        copy_files(&self.config.base_dir().join("log"), &target, |_| true).await;
        debug!("系统日志收集完成");
        Ok(())
    }

    async fn collect_login_logs(&self, staging: &Path) -> Result<()> {
        let target = staging.join("login");
        tokio::fs::create_dir_all(&target).await?;
        copy_files(&self.config.login_log_dir(), &target, |name| {
            LOGIN_LOG_PREFIXES.iter().any(|p| name.starts_with(p))
        })
        .await;
        debug!("登录日志收集完成");
        Ok(())
    }
}

/// 复制目录下的普通文件，单个文件失败时跳过
async fn copy_files(source: &Path, target: &Path, accept: impl Fn(&str) -> bool) {
    let Ok(mut entries) = tokio::fs::read_dir(source).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_file || !accept(&name) {
            continue;
        }
        if let Err(e) = tokio::fs::copy(entry.path(), target.join(&name)).await {
            debug!("跳过日志文件 {}: {}", entry.path().display(), e);
        }
    }
}

#[async_trait]
impl ArchiveProducer for LogProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        Ok(vec![BackupItem::new("log", job.name.clone(), "", ItemSource::Log)])
    }

    async fn produce(
        &self,
        job: &CronJob,
        _item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        let stamp = name_stamp(start_time);
        let file_name = format!("system_log_{stamp}.tar.gz");
        let log_root = self.config.tmp_dir().join("log");
        let staging = log_root.join(&stamp);
        let path = log_root.join(&file_name);

        if let Err(e) = self.collect_website_logs(&staging).await {
            warn!("收集网站日志失败: {}", e);
        }
        if let Err(e) = self.collect_system_logs(&staging).await {
            warn!("收集系统日志失败: {}", e);
        }
        if let Err(e) = self.collect_login_logs(&staging).await {
            warn!("收集登录日志失败: {}", e);
        }
        tokio::fs::create_dir_all(&staging).await?;

        let result = compress::tar_gz_dir(&staging, &path, ExclusionRules::default(), false).await;
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!("清理日志暂存目录失败: {}", e);
        }
        result?;

        if let Some(secret) = job.secret() {
            compress::encrypt_file(&path, secret, self.config.command_timeout()).await?;
        }

        Ok(Artifact { path, file_name })
    }
}
