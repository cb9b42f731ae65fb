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

/// 网站备份：打包站点目录
pub struct WebsiteProducer {
    catalog: Arc<dyn SourceCatalog>,
    config: Arc<AppConfig>,
}

impl WebsiteProducer {
    pub fn new(catalog: Arc<dyn SourceCatalog>, config: Arc<AppConfig>) -> Self {
        Self { catalog, config }
    }
}

#[async_trait]
impl ArchiveProducer for WebsiteProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        let selector = parse_selector(&job.website, "网站")?;
        let websites = self.catalog.list_websites(selector).await?;
        if websites.is_empty() {
            return Err(BackupError::source_not_found(format!(
                "没有可备份的网站: {}",
                job.website
            )));
        }

        Ok(websites
            .into_iter()
            .map(|site| {
                BackupItem::new(
                    "website",
                    site.primary_domain.clone(),
                    site.alias.clone(),
                    ItemSource::Website(site),
                )
            })
            .collect())
    }

    async fn produce(
        &self,
        job: &CronJob,
        item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        let ItemSource::Website(site) = &item.source else {
            return Err(unexpected_item("website", item));
        };

        let file_name = artifact_name(
            "website",
            &site.primary_domain,
            start_time,
            TAR_GZ_EXTENSION,
        );
        let path = self
            .config
            .tmp_dir()
            .join("website")
            .join(&site.primary_domain)
            .join(&file_name);

        info!("备份网站 {}", site.primary_domain);
        let rules = ExclusionRules::parse(&job.exclusion_rules)?;
        compress::tar_gz_dir(Path::new(&site.site_dir), &path, rules, true).await?;
        if let Some(secret) = job.secret() {
            compress::encrypt_file(&path, secret, self.config.command_timeout()).await?;
        }

        Ok(Artifact { path, file_name })
    }
}
