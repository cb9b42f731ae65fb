use super::{
    ArchiveProducer, Artifact, BackupItem, ItemSource, SourceCatalog, artifact_name,
    compress::{self, ExclusionRules},
    parse_selector, unexpected_item,
};
use crate::{
    BackupError, Result, config::AppConfig, constants::record::TAR_GZ_EXTENSION,
    database::CronJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// 应用备份：打包应用安装目录
pub struct AppProducer {
    catalog: Arc<dyn SourceCatalog>,
    config: Arc<AppConfig>,
}

impl AppProducer {
    pub fn new(catalog: Arc<dyn SourceCatalog>, config: Arc<AppConfig>) -> Self {
        Self { catalog, config }
    }
}

#[async_trait]
impl ArchiveProducer for AppProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        let selector = parse_selector(&job.app_id, "应用")?;
        let apps = self.catalog.list_apps(selector).await?;
        if apps.is_empty() {
            return Err(BackupError::source_not_found(format!(
                "没有可备份的应用: {}",
                job.app_id
            )));
        }

        Ok(apps
            .into_iter()
            .map(|app| {
                BackupItem::new("app", app.app_key.clone(), app.name.clone(), ItemSource::App(app))
            })
            .collect())
    }

    async fn produce(
        &self,
        job: &CronJob,
        item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        let ItemSource::App(app) = &item.source else {
            return Err(unexpected_item("app", item));
        };

        let file_name = artifact_name("app", &app.name, start_time, TAR_GZ_EXTENSION);
        let path = self
            .config
            .tmp_dir()
            .join("app")
            .join(&app.app_key)
            .join(&app.name)
            .join(&file_name);

        info!("备份应用 {} ({})", app.name, app.app_key);
        let rules = ExclusionRules::parse(&job.exclusion_rules)?;
        compress::tar_gz_dir(Path::new(&app.install_path), &path, rules, true).await?;
        if let Some(secret) = job.secret() {
            compress::encrypt_file(&path, secret, self.config.command_timeout()).await?;
        }

        Ok(Artifact { path, file_name })
    }
}
