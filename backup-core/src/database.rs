use crate::{
    BackupError, Result,
    db::{CronjobRow, DuckDbManager, JobRecordRow},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use crate::db::{
    AppInstall, BackupAccount, BackupRecord, DatabaseInstance, RecordFilter, SnapshotEntry,
    Website,
};

/// 数据库管理器 - DuckDB适配器
#[derive(Debug, Clone)]
pub struct Database {
    manager: DuckDbManager,
}

/// 定时任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    App,
    Website,
    Database,
    Directory,
    Log,
    Snapshot,
    Shell,
    Curl,
    Ntp,
    Clean,
    CutWebsiteLog,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::App => "app",
            JobType::Website => "website",
            JobType::Database => "database",
            JobType::Directory => "directory",
            JobType::Log => "log",
            JobType::Snapshot => "snapshot",
            JobType::Shell => "shell",
            JobType::Curl => "curl",
            JobType::Ntp => "ntp",
            JobType::Clean => "clean",
            JobType::CutWebsiteLog => "cutWebsiteLog",
        }
    }

    /// 是否为产生备份文件的任务类型
    pub fn is_backup(&self) -> bool {
        matches!(
            self,
            JobType::App
                | JobType::Website
                | JobType::Database
                | JobType::Directory
                | JobType::Log
                | JobType::Snapshot
        )
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        let job_type = match s {
            "app" => JobType::App,
            "website" => JobType::Website,
            "database" => JobType::Database,
            "directory" => JobType::Directory,
            "log" => JobType::Log,
            "snapshot" => JobType::Snapshot,
            "shell" => JobType::Shell,
            "curl" => JobType::Curl,
            "ntp" => JobType::Ntp,
            "clean" => JobType::Clean,
            "cutWebsiteLog" => JobType::CutWebsiteLog,
            other => return Err(BackupError::custom(format!("未知的任务类型: {other}"))),
        };
        Ok(job_type)
    }
}

/// 定时任务定义，备份引擎每次运行只读取
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: i64,
    pub name: String,
    pub job_type: JobType,
    /// "all" 或单个应用ID
    pub app_id: String,
    /// "all" 或单个网站ID
    pub website: String,
    /// 数据库引擎：mysql / mariadb / postgresql
    pub db_type: String,
    /// "all" 或单个数据库实例ID
    pub db_name: String,
    /// 目录，或逗号分隔的文件列表
    pub source_dir: String,
    pub is_dir: bool,
    pub script: String,
    pub executor: String,
    pub url: String,
    /// 逗号分隔的存储账号ID，空项会被跳过
    pub source_account_ids: String,
    pub download_account_id: i64,
    pub secret: Option<String>,
    pub exclusion_rules: String,
    pub retain_copies: u32,
}

impl CronJob {
    /// 新建指定类型的空任务定义
    pub fn new(name: impl Into<String>, job_type: JobType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            job_type,
            app_id: String::new(),
            website: String::new(),
            db_type: String::new(),
            db_name: String::new(),
            source_dir: String::new(),
            is_dir: true,
            script: String::new(),
            executor: String::new(),
            url: String::new(),
            source_account_ids: String::new(),
            download_account_id: 0,
            secret: None,
            exclusion_rules: String::new(),
            retain_copies: 7,
        }
    }

    /// 非空的存储账号ID列表
    pub fn source_accounts(&self) -> Vec<&str> {
        self.source_account_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// 非空的加密密码
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    fn to_row(&self) -> CronjobRow {
        CronjobRow {
            id: self.id,
            name: self.name.clone(),
            job_type: self.job_type.as_str().to_string(),
            app_id: self.app_id.clone(),
            website: self.website.clone(),
            db_type: self.db_type.clone(),
            db_name: self.db_name.clone(),
            source_dir: self.source_dir.clone(),
            is_dir: self.is_dir,
            script: self.script.clone(),
            executor: self.executor.clone(),
            url: self.url.clone(),
            source_account_ids: self.source_account_ids.clone(),
            download_account_id: self.download_account_id,
            secret: self.secret.clone().unwrap_or_default(),
            exclusion_rules: self.exclusion_rules.clone(),
            retain_copies: i32::try_from(self.retain_copies).unwrap_or(i32::MAX),
        }
    }

    fn from_row(row: CronjobRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            job_type: row.job_type.parse()?,
            app_id: row.app_id,
            website: row.website,
            db_type: row.db_type,
            db_name: row.db_name,
            source_dir: row.source_dir,
            is_dir: row.is_dir,
            script: row.script,
            executor: row.executor,
            url: row.url,
            source_account_ids: row.source_account_ids,
            download_account_id: row.download_account_id,
            secret: Some(row.secret).filter(|s| !s.is_empty()),
            exclusion_rules: row.exclusion_rules,
            retain_copies: u32::try_from(row.retain_copies).unwrap_or(0),
        })
    }
}

/// 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Waiting,
    Executing,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Waiting => "Waiting",
            ExecutionStatus::Executing => "Executing",
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Failed => "Failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "Waiting" => ExecutionStatus::Waiting,
            "Executing" => ExecutionStatus::Executing,
            "Success" => ExecutionStatus::Success,
            _ => ExecutionStatus::Failed,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务执行记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub cronjob_id: i64,
    pub status: ExecutionStatus,
    /// 失败时的错误信息
    pub message: String,
    /// 执行输出日志路径
    pub records: String,
    /// 任务产生的本地文件（逗号分隔）
    pub file: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<JobRecordRow> for ExecutionRecord {
    fn from(row: JobRecordRow) -> Self {
        Self {
            id: row.id,
            cronjob_id: row.cronjob_id,
            status: ExecutionStatus::parse(&row.status),
            message: row.message,
            records: row.records,
            file: row.file,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}

impl Database {
    /// 连接到数据库
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = DuckDbManager::new(db_path).await?;
        Ok(Database { manager })
    }

    /// 连接到内存数据库 (主要用于测试)
    pub async fn connect_memory() -> Result<Self> {
        let manager = DuckDbManager::new_memory().await?;
        Ok(Database { manager })
    }

    pub(crate) fn manager(&self) -> &DuckDbManager {
        &self.manager
    }

    // ========== 定时任务 ==========

    /// 保存任务定义，返回新ID
    pub async fn create_cronjob(&self, job: &CronJob) -> Result<i64> {
        self.manager.create_cronjob(job.to_row()).await
    }

    pub async fn get_cronjob(&self, id: i64) -> Result<Option<CronJob>> {
        match self.manager.get_cronjob(id).await? {
            Some(row) => Ok(Some(CronJob::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_cronjobs(&self) -> Result<Vec<CronJob>> {
        self.manager
            .list_cronjobs()
            .await?
            .into_iter()
            .map(CronJob::from_row)
            .collect()
    }

    // ========== 执行记录 ==========

    pub async fn get_execution(&self, record_id: i64) -> Result<Option<ExecutionRecord>> {
        Ok(self
            .manager
            .get_job_record(record_id)
            .await?
            .map(ExecutionRecord::from))
    }

    /// 按任务列出执行记录，最新的在前
    pub async fn list_executions(&self, cronjob_id: i64) -> Result<Vec<ExecutionRecord>> {
        Ok(self
            .manager
            .list_job_records(cronjob_id)
            .await?
            .into_iter()
            .map(ExecutionRecord::from)
            .collect())
    }

    // ========== 存储账号 ==========

    pub async fn create_account(&self, account: BackupAccount) -> Result<i64> {
        self.manager.create_account(account).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<BackupAccount>> {
        self.manager.list_accounts().await
    }

    // ========== 快照 ==========

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotEntry>> {
        self.manager.list_snapshots().await
    }

    // ========== 备份源清单 ==========

    pub async fn create_app_install(&self, app: AppInstall) -> Result<i64> {
        self.manager.create_app_install(app).await
    }

    pub async fn create_website(&self, website: Website) -> Result<i64> {
        self.manager.create_website(website).await
    }

    pub async fn create_database_instance(&self, instance: DatabaseInstance) -> Result<i64> {
        self.manager.create_database_instance(instance).await
    }
}
