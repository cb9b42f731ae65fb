use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::DuckDbActor;
use super::messages::DbMessage;
use super::models::{
    AppInstall, BackupAccount, BackupRecord, CronjobRow, DatabaseInstance, JobRecordRow,
    RecordFilter, SnapshotEntry, Website,
};

/// DuckDB数据库管理器
#[derive(Debug, Clone)]
pub struct DuckDbManager {
    sender: mpsc::Sender<DbMessage>,
}

impl DuckDbManager {
    /// 创建新的DuckDB管理器
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let actor = DuckDbActor::new(db_path)?;
        Self::start(actor).await
    }

    /// 创建内存数据库管理器
    pub async fn new_memory() -> Result<Self> {
        let actor = DuckDbActor::new_memory()?;
        Self::start(actor).await
    }

    /// 启动Actor并初始化数据库表
    async fn start(actor: DuckDbActor) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };
        manager
            .request(|respond_to| DbMessage::InitTables { respond_to })
            .await?;

        Ok(manager)
    }

    /// 发送消息并等待Actor响应
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| BackupError::custom("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| BackupError::custom("等待数据库响应失败"))?
    }

    // ========== 定时任务 ==========

    pub async fn create_cronjob(&self, job: CronjobRow) -> Result<i64> {
        self.request(|respond_to| DbMessage::CreateCronjob { job, respond_to })
            .await
    }

    pub async fn get_cronjob(&self, id: i64) -> Result<Option<CronjobRow>> {
        self.request(|respond_to| DbMessage::GetCronjob { id, respond_to })
            .await
    }

    pub async fn list_cronjobs(&self) -> Result<Vec<CronjobRow>> {
        self.request(|respond_to| DbMessage::ListCronjobs { respond_to })
            .await
    }

    // ========== 执行记录 ==========

    pub async fn start_job_record(
        &self,
        cronjob_id: i64,
        status: &str,
        start_time: DateTime<Utc>,
    ) -> Result<i64> {
        self.request(|respond_to| DbMessage::StartJobRecord {
            cronjob_id,
            status: status.to_string(),
            start_time,
            respond_to,
        })
        .await
    }

    pub async fn update_job_record_log(&self, record_id: i64, records: String) -> Result<()> {
        self.request(|respond_to| DbMessage::UpdateJobRecordLog {
            record_id,
            records,
            respond_to,
        })
        .await
    }

    pub async fn end_job_record(
        &self,
        record_id: i64,
        status: &str,
        message: String,
        records: String,
        file: String,
        end_time: DateTime<Utc>,
    ) -> Result<()> {
        self.request(|respond_to| DbMessage::EndJobRecord {
            record_id,
            status: status.to_string(),
            message,
            records,
            file,
            end_time,
            respond_to,
        })
        .await
    }

    pub async fn get_job_record(&self, record_id: i64) -> Result<Option<JobRecordRow>> {
        self.request(|respond_to| DbMessage::GetJobRecord {
            record_id,
            respond_to,
        })
        .await
    }

    pub async fn list_job_records(&self, cronjob_id: i64) -> Result<Vec<JobRecordRow>> {
        self.request(|respond_to| DbMessage::ListJobRecords {
            cronjob_id,
            respond_to,
        })
        .await
    }

    pub async fn delete_job_record(&self, record_id: i64) -> Result<()> {
        self.request(|respond_to| DbMessage::DeleteJobRecord {
            record_id,
            respond_to,
        })
        .await
    }

    // ========== 备份记录 ==========

    pub async fn create_backup_record(&self, record: BackupRecord) -> Result<i64> {
        self.request(|respond_to| DbMessage::CreateBackupRecord { record, respond_to })
            .await
    }

    pub async fn list_backup_records(&self, filter: RecordFilter) -> Result<Vec<BackupRecord>> {
        self.request(|respond_to| DbMessage::ListBackupRecords { filter, respond_to })
            .await
    }

    pub async fn delete_backup_record(&self, record_id: i64) -> Result<()> {
        self.request(|respond_to| DbMessage::DeleteBackupRecord {
            record_id,
            respond_to,
        })
        .await
    }

    // ========== 存储账号 ==========

    pub async fn create_account(&self, account: BackupAccount) -> Result<i64> {
        self.request(|respond_to| DbMessage::CreateAccount {
            account,
            respond_to,
        })
        .await
    }

    pub async fn get_account(&self, id: i64) -> Result<Option<BackupAccount>> {
        self.request(|respond_to| DbMessage::GetAccount { id, respond_to })
            .await
    }

    pub async fn list_accounts(&self) -> Result<Vec<BackupAccount>> {
        self.request(|respond_to| DbMessage::ListAccounts { respond_to })
            .await
    }

    // ========== 快照 ==========

    pub async fn create_snapshot(&self, snapshot: SnapshotEntry) -> Result<i64> {
        self.request(|respond_to| DbMessage::CreateSnapshot {
            snapshot,
            respond_to,
        })
        .await
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotEntry>> {
        self.request(|respond_to| DbMessage::ListSnapshots { respond_to })
            .await
    }

    pub async fn delete_snapshot_by_name(&self, name: String) -> Result<()> {
        self.request(|respond_to| DbMessage::DeleteSnapshotByName { name, respond_to })
            .await
    }

    // ========== 备份源清单 ==========

    pub async fn create_app_install(&self, app: AppInstall) -> Result<i64> {
        self.request(|respond_to| DbMessage::CreateAppInstall { app, respond_to })
            .await
    }

    pub async fn list_app_installs(&self, id: Option<i64>) -> Result<Vec<AppInstall>> {
        self.request(|respond_to| DbMessage::ListAppInstalls { id, respond_to })
            .await
    }

    pub async fn create_website(&self, website: Website) -> Result<i64> {
        self.request(|respond_to| DbMessage::CreateWebsite {
            website,
            respond_to,
        })
        .await
    }

    pub async fn list_websites(&self, id: Option<i64>) -> Result<Vec<Website>> {
        self.request(|respond_to| DbMessage::ListWebsites { id, respond_to })
            .await
    }

    pub async fn create_database_instance(&self, instance: DatabaseInstance) -> Result<i64> {
        self.request(|respond_to| DbMessage::CreateDatabaseInstance {
            instance,
            respond_to,
        })
        .await
    }

    pub async fn list_database_instances(
        &self,
        engines: Vec<String>,
        id: Option<i64>,
    ) -> Result<Vec<DatabaseInstance>> {
        self.request(|respond_to| DbMessage::ListDatabaseInstances {
            engines,
            id,
            respond_to,
        })
        .await
    }
}
