//! 备份文件生成
//!
//! 每种备份类型对应一个 [`ArchiveProducer`] 实现：先枚举本次要备份的条目，
//! 再为每个条目在临时目录下生成一个压缩文件。临时目录下的相对路径即远端键。

mod app;
pub mod compress;
mod database;
mod directory;
mod log;
mod snapshot;
mod website;

pub use app::AppProducer;
pub use database::DatabaseProducer;
pub use directory::DirectoryProducer;
pub use log::LogProducer;
pub use snapshot::{
    ArchiveSnapshotCreator, SnapshotCreator, SnapshotProducer, SnapshotStore, snapshot_name_of,
};
pub use website::WebsiteProducer;

use crate::{
    BackupError, Result,
    constants::time::{DATE_TIME_SLIM_LAYOUT, RANDOM_SUFFIX_LEN},
    database::{AppInstall, CronJob, Database, DatabaseInstance, Website},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use std::path::PathBuf;

/// 备份源清单查询
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// `id` 为空时返回全部
    async fn list_apps(&self, id: Option<i64>) -> Result<Vec<AppInstall>>;

    async fn list_websites(&self, id: Option<i64>) -> Result<Vec<Website>>;

    /// 指定引擎族内的数据库
    async fn list_databases(
        &self,
        engines: &[&str],
        id: Option<i64>,
    ) -> Result<Vec<DatabaseInstance>>;
}

#[async_trait]
impl SourceCatalog for Database {
    async fn list_apps(&self, id: Option<i64>) -> Result<Vec<AppInstall>> {
        self.manager().list_app_installs(id).await
    }

    async fn list_websites(&self, id: Option<i64>) -> Result<Vec<Website>> {
        self.manager().list_websites(id).await
    }

    async fn list_databases(
        &self,
        engines: &[&str],
        id: Option<i64>,
    ) -> Result<Vec<DatabaseInstance>> {
        let engines = engines.iter().map(|e| e.to_string()).collect();
        self.manager().list_database_instances(engines, id).await
    }
}

/// 本次运行要备份的一个条目
#[derive(Debug, Clone)]
pub struct BackupItem {
    /// 备份记录类型
    pub record_type: String,
    pub name: String,
    pub detail_name: String,
    pub source: ItemSource,
}

impl BackupItem {
    pub fn new(
        record_type: impl Into<String>,
        name: impl Into<String>,
        detail_name: impl Into<String>,
        source: ItemSource,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            detail_name: detail_name.into(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemSource {
    App(AppInstall),
    Website(Website),
    Database(DatabaseInstance),
    Directory,
    Log,
    Snapshot,
}

/// 已生成的本地备份文件
#[derive(Debug, Clone)]
pub struct Artifact {
    /// 位于临时目录下的文件路径
    pub path: PathBuf,
    pub file_name: String,
}

#[async_trait]
pub trait ArchiveProducer: Send + Sync {
    /// 枚举条目；需要枚举的类型在结果为空时返回 `SourceNotFound`
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>>;

    /// 为单个条目生成备份文件
    async fn produce(
        &self,
        job: &CronJob,
        item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact>;
}

/// 解析 "all" 或单个ID的选择器
pub(crate) fn parse_selector(selector: &str, kind: &str) -> Result<Option<i64>> {
    let selector = selector.trim();
    if selector == "all" {
        return Ok(None);
    }
    selector
        .parse::<i64>()
        .map(Some)
        .map_err(|_| BackupError::source_not_found(format!("{kind} 选择器无效: {selector:?}")))
}

/// 5位字母数字随机后缀
pub fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect()
}

/// 紧凑时间戳加随机后缀
pub fn name_stamp(start_time: DateTime<Utc>) -> String {
    format!(
        "{}{}",
        start_time.format(DATE_TIME_SLIM_LAYOUT),
        random_suffix()
    )
}

/// `<prefix>_<item>_<timestamp><rand5>.<ext>`
pub fn artifact_name(prefix: &str, item: &str, start_time: DateTime<Utc>, ext: &str) -> String {
    format!("{prefix}_{item}_{}.{ext}", name_stamp(start_time))
}

pub(crate) fn unexpected_item(kind: &str, item: &BackupItem) -> BackupError {
    BackupError::produce(format!("{kind} 任务收到了不匹配的条目: {}", item.name))
}
