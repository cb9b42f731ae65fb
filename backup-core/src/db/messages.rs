use crate::Result;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::models::{
    AppInstall, BackupAccount, BackupRecord, CronjobRow, DatabaseInstance, JobRecordRow,
    RecordFilter, SnapshotEntry, Website,
};

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 定时任务 ==========
    CreateCronjob {
        job: CronjobRow,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    GetCronjob {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<CronjobRow>>>,
    },
    ListCronjobs {
        respond_to: oneshot::Sender<Result<Vec<CronjobRow>>>,
    },

    // ========== 执行记录 ==========
    /// 创建执行中的记录
    StartJobRecord {
        cronjob_id: i64,
        status: String,
        start_time: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 更新执行日志路径
    UpdateJobRecordLog {
        record_id: i64,
        records: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 结束执行记录
    EndJobRecord {
        record_id: i64,
        status: String,
        message: String,
        records: String,
        file: String,
        end_time: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    GetJobRecord {
        record_id: i64,
        respond_to: oneshot::Sender<Result<Option<JobRecordRow>>>,
    },
    /// 按任务获取执行记录（倒序）
    ListJobRecords {
        cronjob_id: i64,
        respond_to: oneshot::Sender<Result<Vec<JobRecordRow>>>,
    },
    DeleteJobRecord {
        record_id: i64,
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 备份记录 ==========
    CreateBackupRecord {
        record: BackupRecord,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    ListBackupRecords {
        filter: RecordFilter,
        respond_to: oneshot::Sender<Result<Vec<BackupRecord>>>,
    },
    DeleteBackupRecord {
        record_id: i64,
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 存储账号 ==========
    CreateAccount {
        account: BackupAccount,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    GetAccount {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<BackupAccount>>>,
    },
    ListAccounts {
        respond_to: oneshot::Sender<Result<Vec<BackupAccount>>>,
    },

    // ========== 快照 ==========
    CreateSnapshot {
        snapshot: SnapshotEntry,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    ListSnapshots {
        respond_to: oneshot::Sender<Result<Vec<SnapshotEntry>>>,
    },
    DeleteSnapshotByName {
        name: String,
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 备份源清单 ==========
    CreateAppInstall {
        app: AppInstall,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    ListAppInstalls {
        id: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<AppInstall>>>,
    },
    CreateWebsite {
        website: Website,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    ListWebsites {
        id: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<Website>>>,
    },
    CreateDatabaseInstance {
        instance: DatabaseInstance,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 按引擎列出实例，`id` 为空时列出全部
    ListDatabaseInstances {
        engines: Vec<String>,
        id: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<DatabaseInstance>>>,
    },
}
