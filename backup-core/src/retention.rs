//! 过期备份清理
//!
//! 清理在备份记录写入之后执行，所有删除都是尽力而为：远端删除失败只记录
//! 日志，本地记录照常删除，清理本身不会让任务失败。

use crate::{
    archive::{SnapshotStore, snapshot_name_of},
    constants::record::{ORIGIN_CRONJOB, SNAPSHOT_DIR},
    database::{BackupRecord, CronJob, JobType, RecordFilter},
    ledger::RecordLedger,
    storage::{StorageClientPool, join_remote},
};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RetentionEnforcer<'a> {
    ledger: &'a dyn RecordLedger,
    snapshots: &'a dyn SnapshotStore,
    pool: &'a StorageClientPool,
    timeout: Duration,
}

impl<'a> RetentionEnforcer<'a> {
    pub fn new(
        ledger: &'a dyn RecordLedger,
        snapshots: &'a dyn SnapshotStore,
        pool: &'a StorageClientPool,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            snapshots,
            pool,
            timeout,
        }
    }

    /// 按任务保留份数清理旧备份
    ///
    /// `record.id` 非零时只清理同类型、同名称、同详情名的记录。
    pub async fn sweep(&self, job: &CronJob, record: &BackupRecord) {
        let mut filter = RecordFilter {
            origin: Some(ORIGIN_CRONJOB.to_string()),
            cronjob_id: Some(job.id),
            ..Default::default()
        };
        if record.id != 0 {
            filter.record_type = Some(record.record_type.clone());
            filter.name = Some(record.name.clone());
            filter.detail_name = Some(record.detail_name.clone());
        }

        let records = match self.ledger.list_records(&filter).await {
            Ok(records) => records,
            Err(e) => {
                warn!("查询备份记录失败，跳过清理: {}", e);
                return;
            }
        };
        let retain = job.retain_copies as usize;
        if records.len() <= retain {
            return;
        }

        info!(
            "任务 {} 共有 {} 份备份，保留 {} 份",
            job.name,
            records.len(),
            retain
        );
        for expired in &records[retain..] {
            self.delete_remote(job, expired).await;
            if job.job_type == JobType::Snapshot {
                let name = snapshot_name_of(&expired.file_name);
                if let Err(e) = self.snapshots.delete_snapshot_by_name(name).await {
                    warn!("删除快照记录 {} 失败: {}", name, e);
                }
            }
            if let Err(e) = self.ledger.delete_record(expired.id).await {
                warn!("删除备份记录 {} 失败: {}", expired.id, e);
            }
        }
    }

    async fn delete_remote(&self, job: &CronJob, expired: &BackupRecord) {
        for account_id in job.source_accounts() {
            let Some(account) = self.pool.get(account_id) else {
                warn!("账号 {} 未解析，跳过远端删除", account_id);
                continue;
            };
            let remote_path = if job.job_type == JobType::Snapshot {
                join_remote(&[
                    account.backup_path.as_str(),
                    SNAPSHOT_DIR,
                    expired.file_name.as_str(),
                ])
            } else {
                join_remote(&[
                    account.backup_path.as_str(),
                    expired.file_dir.as_str(),
                    expired.file_name.as_str(),
                ])
            };

            match tokio::time::timeout(self.timeout, account.client.delete(&remote_path)).await {
                Ok(Ok(true)) => debug!("已删除 {} 上的 {}", account.name, remote_path),
                Ok(Ok(false)) => debug!("{} 上不存在 {}", account.name, remote_path),
                Ok(Err(e)) => warn!("删除 {} 上的 {} 失败: {}", account.name, remote_path, e),
                Err(_) => warn!("删除 {} 上的 {} 超时", account.name, remote_path),
            }
        }
    }
}

/// 清理超出保留份数的执行记录及其日志文件
pub async fn remove_expired_logs(ledger: &dyn RecordLedger, job: &CronJob) {
    let executions = match ledger.list_execution_logs(job.id).await {
        Ok(executions) => executions,
        Err(e) => {
            warn!("查询执行记录失败: {}", e);
            return;
        }
    };
    let retain = job.retain_copies as usize;
    if executions.len() <= retain {
        return;
    }

    for (id, records, files) in &executions[retain..] {
        for file in files.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let _ = tokio::fs::remove_file(file).await;
        }
        if let Err(e) = ledger.delete_execution(*id).await {
            warn!("删除执行记录 {} 失败: {}", id, e);
        }
        if !records.is_empty() {
            let _ = tokio::fs::remove_file(records).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, SnapshotEntry};
    use crate::storage::{ACCOUNT_TYPE_LOCAL, DefaultClientFactory};
    use chrono::Utc;
    use tempfile::tempdir;

    async fn local_pool(db: &Database, root: &std::path::Path) -> (StorageClientPool, String) {
        let id = db
            .create_account(crate::database::BackupAccount {
                name: "local".to_string(),
                account_type: ACCOUNT_TYPE_LOCAL.to_string(),
                bucket: root.to_string_lossy().to_string(),
                backup_path: "bk".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .to_string();
        let factory = DefaultClientFactory::new(Duration::from_secs(5));
        let pool = StorageClientPool::resolve(db, &factory, &[id.as_str()])
            .await
            .unwrap();
        (pool, id)
    }

    #[tokio::test]
    async fn test_sweep_deletes_oldest_beyond_retain() {
        let db = Database::connect_memory().await.unwrap();
        let remote = tempdir().unwrap();
        let (pool, account_id) = local_pool(&db, remote.path()).await;

        let mut job = CronJob::new("site", JobType::Website);
        job.id = 3;
        job.retain_copies = 1;
        job.source_account_ids = account_id;

        let mut last = BackupRecord::default();
        for name in ["old", "new"] {
            let file = remote.path().join("bk/website/a.com").join(name);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(&file, b"x").unwrap();

            let mut record = BackupRecord {
                origin: ORIGIN_CRONJOB.to_string(),
                record_type: "website".to_string(),
                name: "a.com".to_string(),
                detail_name: "a".to_string(),
                cronjob_id: 3,
                file_dir: "website/a.com".to_string(),
                file_name: name.to_string(),
                ..Default::default()
            };
            record.id = db.create_record(&record).await.unwrap();
            last = record;
        }

        RetentionEnforcer::new(&db, &db, &pool, Duration::from_secs(5))
            .sweep(&job, &last)
            .await;

        let left = db
            .list_records(&RecordFilter {
                cronjob_id: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].file_name, "new");
        assert!(!remote.path().join("bk/website/a.com/old").exists());
        assert!(remote.path().join("bk/website/a.com/new").exists());
    }

    #[tokio::test]
    async fn test_sweep_skips_unresolved_account() {
        let db = Database::connect_memory().await.unwrap();
        let remote = tempdir().unwrap();
        let (pool, account_id) = local_pool(&db, remote.path()).await;

        let mut job = CronJob::new("logs", JobType::Log);
        job.id = 4;
        job.retain_copies = 1;
        // 第二个账号不在本次解析的客户端池里
        job.source_account_ids = format!("{account_id},404");

        let mut last = BackupRecord::default();
        for name in ["first.tar.gz", "second.tar.gz"] {
            let file = remote.path().join("bk/log").join(name);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(&file, b"x").unwrap();

            let mut record = BackupRecord {
                origin: ORIGIN_CRONJOB.to_string(),
                record_type: "log".to_string(),
                name: "logs".to_string(),
                cronjob_id: 4,
                file_dir: "log".to_string(),
                file_name: name.to_string(),
                ..Default::default()
            };
            record.id = db.create_record(&record).await.unwrap();
            last = record;
        }

        RetentionEnforcer::new(&db, &db, &pool, Duration::from_secs(5))
            .sweep(&job, &last)
            .await;

        let left = db
            .list_records(&RecordFilter {
                cronjob_id: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].file_name, "second.tar.gz");
        assert!(!remote.path().join("bk/log/first.tar.gz").exists());
        assert!(remote.path().join("bk/log/second.tar.gz").exists());
    }

    #[tokio::test]
    async fn test_snapshot_sweep_removes_metadata() {
        let db = Database::connect_memory().await.unwrap();
        let remote = tempdir().unwrap();
        let (pool, account_id) = local_pool(&db, remote.path()).await;

        let mut job = CronJob::new("snap", JobType::Snapshot);
        job.id = 5;
        job.retain_copies = 1;
        job.source_account_ids = account_id;

        let mut last = BackupRecord::default();
        for name in ["snapshot-a", "snapshot-b"] {
            db.manager()
                .create_snapshot(SnapshotEntry {
                    name: name.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            let mut record = BackupRecord {
                origin: ORIGIN_CRONJOB.to_string(),
                record_type: "snapshot".to_string(),
                name: "snap".to_string(),
                cronjob_id: 5,
                file_dir: SNAPSHOT_DIR.to_string(),
                file_name: format!("{name}.tar.gz"),
                ..Default::default()
            };
            record.id = db.create_record(&record).await.unwrap();
            last = record;
        }

        RetentionEnforcer::new(&db, &db, &pool, Duration::from_secs(5))
            .sweep(&job, &last)
            .await;

        let names: Vec<_> = db
            .list_snapshots()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["snapshot-b"]);
    }

    #[tokio::test]
    async fn test_remove_expired_logs() {
        let db = Database::connect_memory().await.unwrap();
        let dir = tempdir().unwrap();

        let mut job = CronJob::new("echo", JobType::Shell);
        job.id = 9;
        job.retain_copies = 1;

        let mut logs = Vec::new();
        for i in 0..3 {
            let log = dir.path().join(format!("{i}.log"));
            std::fs::write(&log, b"out").unwrap();
            let id = db.start_execution(9, Utc::now()).await.unwrap();
            db.update_execution(id, &log.to_string_lossy()).await.unwrap();
            logs.push(log);
        }

        remove_expired_logs(&db, &job).await;

        assert_eq!(db.list_executions(9).await.unwrap().len(), 1);
        assert!(!logs[0].exists());
        assert!(!logs[1].exists());
        assert!(logs[2].exists());
    }
}
