//! 备份记录与执行记录的持久化边界
//!
//! 备份记录只在产物上传到全部存储账号后写入；执行记录在任务开始时以
//! `Executing` 创建，结束时只转换一次到 `Success` 或 `Failed`。

use crate::{
    Result,
    database::{BackupRecord, Database, ExecutionStatus, RecordFilter},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait RecordLedger: Send + Sync {
    /// 追加一条备份记录，返回新ID
    async fn create_record(&self, record: &BackupRecord) -> Result<i64>;

    /// 按条件列出备份记录，按创建时间倒序
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<BackupRecord>>;

    async fn delete_record(&self, record_id: i64) -> Result<()>;

    /// 以 `Executing` 状态打开一条执行记录
    async fn start_execution(&self, cronjob_id: i64, start_time: DateTime<Utc>) -> Result<i64>;

    /// 记录执行输出日志路径
    async fn update_execution(&self, execution_id: i64, records: &str) -> Result<()>;

    /// 关闭执行记录
    async fn end_execution(
        &self,
        execution_id: i64,
        status: ExecutionStatus,
        message: &str,
        records: &str,
        file: &str,
    ) -> Result<()>;

    /// 任务的执行记录，最新的在前，返回 `(id, records, file)`
    async fn list_execution_logs(&self, cronjob_id: i64) -> Result<Vec<(i64, String, String)>>;

    async fn delete_execution(&self, execution_id: i64) -> Result<()>;
}

#[async_trait]
impl RecordLedger for Database {
    async fn create_record(&self, record: &BackupRecord) -> Result<i64> {
        self.manager().create_backup_record(record.clone()).await
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<BackupRecord>> {
        self.manager().list_backup_records(filter.clone()).await
    }

    async fn delete_record(&self, record_id: i64) -> Result<()> {
        self.manager().delete_backup_record(record_id).await
    }

    async fn start_execution(&self, cronjob_id: i64, start_time: DateTime<Utc>) -> Result<i64> {
        self.manager()
            .start_job_record(cronjob_id, ExecutionStatus::Executing.as_str(), start_time)
            .await
    }

    async fn update_execution(&self, execution_id: i64, records: &str) -> Result<()> {
        self.manager()
            .update_job_record_log(execution_id, records.to_string())
            .await
    }

    async fn end_execution(
        &self,
        execution_id: i64,
        status: ExecutionStatus,
        message: &str,
        records: &str,
        file: &str,
    ) -> Result<()> {
        self.manager()
            .end_job_record(
                execution_id,
                status.as_str(),
                message.to_string(),
                records.to_string(),
                file.to_string(),
                Utc::now(),
            )
            .await
    }

    async fn list_execution_logs(&self, cronjob_id: i64) -> Result<Vec<(i64, String, String)>> {
        Ok(self
            .manager()
            .list_job_records(cronjob_id)
            .await?
            .into_iter()
            .map(|row| (row.id, row.records, row.file))
            .collect())
    }

    async fn delete_execution(&self, execution_id: i64) -> Result<()> {
        self.manager().delete_job_record(execution_id).await
    }
}
