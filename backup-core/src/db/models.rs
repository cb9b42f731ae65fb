use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 定时任务原始行
#[derive(Debug, Clone, Default)]
pub struct CronjobRow {
    pub id: i64,
    pub name: String,
    pub job_type: String,
    pub app_id: String,
    pub website: String,
    pub db_type: String,
    pub db_name: String,
    pub source_dir: String,
    pub is_dir: bool,
    pub script: String,
    pub executor: String,
    pub url: String,
    pub source_account_ids: String,
    pub download_account_id: i64,
    pub secret: String,
    pub exclusion_rules: String,
    pub retain_copies: i32,
}

/// 任务执行记录原始行
#[derive(Debug, Clone)]
pub struct JobRecordRow {
    pub id: i64,
    pub cronjob_id: i64,
    pub status: String,
    pub message: String,
    pub records: String,
    pub file: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// 备份记录
///
/// `id == 0` 表示尚未写入数据库。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: i64,
    pub origin: String,
    pub record_type: String,
    pub name: String,
    pub detail_name: String,
    pub cronjob_id: i64,
    pub source_account_ids: String,
    pub download_account_id: i64,
    pub file_dir: String,
    pub file_name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// 备份记录查询条件，结果按创建时间倒序
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub origin: Option<String>,
    pub cronjob_id: Option<i64>,
    pub record_type: Option<String>,
    pub name: Option<String>,
    pub detail_name: Option<String>,
}

/// 存储账号
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupAccount {
    pub id: i64,
    pub name: String,
    pub account_type: String,
    pub bucket: String,
    pub access_key: String,
    pub credential: String,
    pub backup_path: String,
    pub vars: String,
}

/// 快照元数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: i64,
    pub name: String,
    pub source_account_ids: String,
    pub download_account_id: i64,
}

/// 已安装应用
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppInstall {
    pub id: i64,
    pub app_key: String,
    pub name: String,
    pub install_path: String,
}

/// 网站
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Website {
    pub id: i64,
    pub primary_domain: String,
    pub alias: String,
    pub site_dir: String,
}

/// 数据库实例，`server` 为数据库服务名，`name` 为具体库名
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseInstance {
    pub id: i64,
    pub engine: String,
    pub server: String,
    pub name: String,
    pub container_name: String,
    pub username: String,
    pub password: String,
}
