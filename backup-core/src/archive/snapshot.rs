use super::{
    ArchiveProducer, Artifact, BackupItem, ItemSource,
    compress::{self, ExclusionRules},
    name_stamp,
};
use crate::{
    Result,
    config::AppConfig,
    constants::record::{SNAPSHOT_DIR, TAR_GZ_EXTENSION},
    database::{CronJob, Database, SnapshotEntry},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// 快照元数据存储
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn create_snapshot(&self, entry: SnapshotEntry) -> Result<i64>;

    async fn delete_snapshot_by_name(&self, name: &str) -> Result<()>;
}

#[async_trait]
impl SnapshotStore for Database {
    async fn create_snapshot(&self, entry: SnapshotEntry) -> Result<i64> {
        self.manager().create_snapshot(entry).await
    }

    async fn delete_snapshot_by_name(&self, name: &str) -> Result<()> {
        self.manager().delete_snapshot_by_name(name.to_string()).await
    }
}

/// 快照生成器，负责组装快照内容
#[async_trait]
pub trait SnapshotCreator: Send + Sync {
    /// 生成快照归档到 `target`，`name` 为不带扩展名的快照名
    async fn create(&self, job: &CronJob, name: &str, target: &Path) -> Result<()>;
}

/// 默认快照生成器：打包面板数据目录并登记快照
pub struct ArchiveSnapshotCreator {
    config: Arc<AppConfig>,
    store: Arc<dyn SnapshotStore>,
}

impl ArchiveSnapshotCreator {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { config, store }
    }
}

#[async_trait]
impl SnapshotCreator for ArchiveSnapshotCreator {
    async fn create(&self, job: &CronJob, name: &str, target: &Path) -> Result<()> {
        info!("创建系统快照 {}", name);
        compress::tar_gz_dir(
            &self.config.data_dir(),
            target,
            ExclusionRules::default(),
            true,
        )
        .await?;
        if let Some(secret) = job.secret() {
            compress::encrypt_file(target, secret, self.config.command_timeout()).await?;
        }

        self.store
            .create_snapshot(SnapshotEntry {
                id: 0,
                name: name.to_string(),
                source_account_ids: job.source_account_ids.clone(),
                download_account_id: job.download_account_id,
            })
            .await?;
        Ok(())
    }
}

/// 快照文件名去掉扩展名即为快照名
pub fn snapshot_name_of(file_name: &str) -> &str {
    file_name
        .strip_suffix(&format!(".{TAR_GZ_EXTENSION}"))
        .unwrap_or(file_name)
}

fn os_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "armv7",
        other => other,
    }
}

/// 快照备份：委托给 [`SnapshotCreator`]
pub struct SnapshotProducer {
    creator: Arc<dyn SnapshotCreator>,
    config: Arc<AppConfig>,
}

impl SnapshotProducer {
    pub fn new(creator: Arc<dyn SnapshotCreator>, config: Arc<AppConfig>) -> Self {
        Self { creator, config }
    }

    fn snapshot_name(&self, start_time: DateTime<Utc>) -> String {
        format!(
            "snapshot-{}-{}-linux-{}-{}",
            self.config.snapshot.scope,
            self.config.snapshot.version,
            os_arch(),
            name_stamp(start_time)
        )
    }
}

#[async_trait]
impl ArchiveProducer for SnapshotProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        Ok(vec![BackupItem::new(
            "snapshot",
            job.name.clone(),
            "",
            ItemSource::Snapshot,
        )])
    }

    async fn produce(
        &self,
        job: &CronJob,
        _item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        let name = self.snapshot_name(start_time);
        let file_name = format!("{name}.{TAR_GZ_EXTENSION}");
        // 临时目录下的相对路径与远端的 system_snapshot/<file> 一致
        let path = self.config.tmp_dir().join(SNAPSHOT_DIR).join(&file_name);

        self.creator.create(job, &name, &path).await?;
        Ok(Artifact { path, file_name })
    }
}
