use super::{
    ArchiveProducer, Artifact, BackupItem, ItemSource, artifact_name,
    compress::{self, ExclusionRules},
};
use crate::{
    Result, config::AppConfig, constants::record::TAR_GZ_EXTENSION, database::CronJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// 目录备份：整个目录，或逗号分隔的文件列表
pub struct DirectoryProducer {
    config: Arc<AppConfig>,
}

impl DirectoryProducer {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

/// 源路径转换成文件名中的条目名
fn item_name(source_dir: &str) -> String {
    source_dir
        .trim()
        .trim_matches('/')
        .replace(['/', ','], "_")
}

#[async_trait]
impl ArchiveProducer for DirectoryProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        Ok(vec![BackupItem::new(
            "directory",
            job.name.clone(),
            "",
            ItemSource::Directory,
        )])
    }

    async fn produce(
        &self,
        job: &CronJob,
        _item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        let file_name = artifact_name(
            "directory",
            &item_name(&job.source_dir),
            start_time,
            TAR_GZ_EXTENSION,
        );
        let path = self
            .config
            .tmp_dir()
            .join(job.job_type.as_str())
            .join(&job.name)
            .join(&file_name);

        if job.is_dir {
            info!("备份目录 {}", job.source_dir);
            let rules = ExclusionRules::parse(&job.exclusion_rules)?;
            compress::tar_gz_dir(Path::new(job.source_dir.trim()), &path, rules, true).await?;
        } else {
            let files: Vec<PathBuf> = job
                .source_dir
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(PathBuf::from)
                .collect();
            info!("备份 {} 个文件", files.len());
            compress::tar_gz_files(files, &path).await?;
        }

        if let Some(secret) = job.secret() {
            compress::encrypt_file(&path, secret, self.config.command_timeout()).await?;
        }

        Ok(Artifact { path, file_name })
    }
}
