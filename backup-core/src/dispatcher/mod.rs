//! 定时任务调度
//!
//! 一次运行的流程：打开执行记录 → 生成备份文件 → 分发上传 → 写备份记录 →
//! 清理过期备份 → 关闭执行记录。同一任务同一时间只允许一个运行。

mod tasks;
#[cfg(test)]
mod tests;

use crate::{
    BackupError, Result,
    archive::{
        AppProducer, ArchiveProducer, ArchiveSnapshotCreator, Artifact, BackupItem,
        DatabaseProducer, DirectoryProducer, LogProducer, SnapshotProducer, SnapshotStore,
        SourceCatalog, WebsiteProducer, snapshot_name_of,
    },
    config::AppConfig,
    constants::record::ORIGIN_CRONJOB,
    database::{BackupRecord, CronJob, Database, ExecutionRecord, ExecutionStatus, JobType},
    ledger::RecordLedger,
    retention::RetentionEnforcer,
    storage::{AccountStore, ClientFactory, DefaultClientFactory, StorageClientPool},
    upload::{TempFileGuard, UploadFanOut},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// 同一任务重复触发时写入执行记录的错误信息
pub const ALREADY_RUNNING: &str = "job is already running";

/// 任务处理结果：输出日志路径、产生的文件、需要写入日志的消息
#[derive(Debug, Default)]
struct TaskOutput {
    records: String,
    file: String,
    message: Vec<String>,
}

#[derive(Clone)]
pub struct JobDispatcher {
    config: Arc<AppConfig>,
    ledger: Arc<dyn RecordLedger>,
    catalog: Arc<dyn SourceCatalog>,
    accounts: Arc<dyn AccountStore>,
    snapshots: Arc<dyn SnapshotStore>,
    factory: Arc<dyn ClientFactory>,
    producers: HashMap<JobType, Arc<dyn ArchiveProducer>>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl JobDispatcher {
    /// 以数据库作为全部存储边界创建调度器
    pub fn new(config: Arc<AppConfig>, db: Database) -> Self {
        let db = Arc::new(db);
        let catalog: Arc<dyn SourceCatalog> = db.clone();
        let snapshots: Arc<dyn SnapshotStore> = db.clone();

        let mut producers: HashMap<JobType, Arc<dyn ArchiveProducer>> = HashMap::new();
        producers.insert(
            JobType::App,
            Arc::new(AppProducer::new(catalog.clone(), config.clone())),
        );
        producers.insert(
            JobType::Website,
            Arc::new(WebsiteProducer::new(catalog.clone(), config.clone())),
        );
        producers.insert(
            JobType::Database,
            Arc::new(DatabaseProducer::new(catalog.clone(), config.clone())),
        );
        producers.insert(
            JobType::Directory,
            Arc::new(DirectoryProducer::new(config.clone())),
        );
        producers.insert(
            JobType::Log,
            Arc::new(LogProducer::new(catalog.clone(), config.clone())),
        );
        let creator = Arc::new(ArchiveSnapshotCreator::new(config.clone(), snapshots.clone()));
        producers.insert(
            JobType::Snapshot,
            Arc::new(SnapshotProducer::new(creator, config.clone())),
        );

        let factory = Arc::new(DefaultClientFactory::new(config.command_timeout()));
        Self {
            config,
            ledger: db.clone(),
            catalog,
            accounts: db,
            snapshots,
            factory,
            producers,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn RecordLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// 替换某种备份类型的生成策略
    pub fn with_producer(mut self, job_type: JobType, producer: Arc<dyn ArchiveProducer>) -> Self {
        self.producers.insert(job_type, producer);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 后台运行任务，调用方不等待完成
    pub fn trigger(&self, job: CronJob) -> JoinHandle<Result<ExecutionRecord>> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = dispatcher.run(job).await;
            if let Err(e) = &result {
                error!("任务执行记录写入失败: {}", e);
            }
            result
        })
    }

    /// 运行一次任务，返回关闭后的执行记录
    #[instrument(skip(self, job), fields(job_id = job.id, job_type = %job.job_type, job_name = %job.name))]
    pub async fn run(&self, job: CronJob) -> Result<ExecutionRecord> {
        let lock = Arc::clone(&self.locks.entry(job.id).or_default());
        let result = self.run_exclusive(&job, &lock).await;
        drop(lock);
        // 没有其他运行引用时移除该任务的锁
        self.locks
            .remove_if(&job.id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn run_exclusive(&self, job: &CronJob, lock: &Mutex<()>) -> Result<ExecutionRecord> {
        let start_time = Utc::now();
        let execution_id = self.ledger.start_execution(job.id, start_time).await?;

        let Ok(_running) = lock.try_lock() else {
            warn!("任务 {} 正在运行，忽略本次触发", job.name);
            let rejected = Err(BackupError::custom(ALREADY_RUNNING));
            return self
                .close(job, execution_id, start_time, rejected, TaskOutput::default())
                .await;
        };

        info!("开始执行任务 {}", job.name);
        let mut output = TaskOutput::default();
        let result = self.execute(job, execution_id, start_time, &mut output).await;
        self.close(job, execution_id, start_time, result, output).await
    }

    async fn execute(
        &self,
        job: &CronJob,
        execution_id: i64,
        start_time: DateTime<Utc>,
        output: &mut TaskOutput,
    ) -> Result<()> {
        match job.job_type {
            JobType::Directory if job.source_dir.trim().is_empty() => Ok(()),
            job_type if job_type.is_backup() => self.run_backup(job, start_time).await,
            JobType::Shell => self.run_shell(job, execution_id, start_time, output).await,
            JobType::Curl => self.run_curl(job, execution_id, start_time, output).await,
            JobType::CutWebsiteLog => self.cut_website_logs(job, start_time, output).await,
            JobType::Ntp | JobType::Clean => {
                crate::retention::remove_expired_logs(self.ledger.as_ref(), job).await;
                Err(BackupError::custom(format!(
                    "{} 任务在此引擎中不受支持",
                    job.job_type
                )))
            }
            _ => Ok(()),
        }
    }

    /// 关闭执行记录；有消息时先写入输出日志
    async fn close(
        &self,
        job: &CronJob,
        execution_id: i64,
        start_time: DateTime<Utc>,
        result: Result<()>,
        mut output: TaskOutput,
    ) -> Result<ExecutionRecord> {
        if !output.message.is_empty() {
            match self
                .write_task_log(job, start_time, &output.message.join("\n"))
                .await
            {
                Ok(path) => output.records = path,
                Err(e) => error!("保存任务输出失败: {}", e),
            }
        }

        let (status, message) = match result {
            Ok(()) => {
                info!("任务 {} 执行成功", job.name);
                (ExecutionStatus::Success, String::new())
            }
            Err(e) => {
                error!("任务 {} 执行失败: {}", job.name, e);
                (ExecutionStatus::Failed, e.to_string())
            }
        };

        self.ledger
            .end_execution(execution_id, status, &message, &output.records, &output.file)
            .await?;

        Ok(ExecutionRecord {
            id: execution_id,
            cronjob_id: job.id,
            status,
            message,
            records: output.records,
            file: output.file,
            start_time,
            end_time: Some(Utc::now()),
        })
    }

    fn producer_for(&self, job_type: JobType) -> Result<Arc<dyn ArchiveProducer>> {
        self.producers
            .get(&job_type)
            .cloned()
            .ok_or_else(|| BackupError::custom(format!("未注册 {job_type} 类型的备份策略")))
    }

    /// 备份类任务，任一条目失败即终止整个运行
    async fn run_backup(&self, job: &CronJob, start_time: DateTime<Utc>) -> Result<()> {
        let producer = self.producer_for(job.job_type)?;
        let items = producer.items(job).await?;

        let pool = StorageClientPool::resolve(
            self.accounts.as_ref(),
            self.factory.as_ref(),
            &job.source_accounts(),
        )
        .await?;

        // 全部条目生成成功后才开始上传，中途失败时已生成的文件随守卫删除
        let mut produced: Vec<(BackupItem, Artifact, TempFileGuard)> =
            Vec::with_capacity(items.len());
        for item in items {
            let artifact = producer.produce(job, &item, start_time).await?;
            let guard = TempFileGuard::new(&artifact.path);
            produced.push((item, artifact, guard));
        }

        let tmp_dir = self.config.tmp_dir();
        let timeout = self.config.command_timeout();
        let fan_out = UploadFanOut::new(&pool, &tmp_dir, timeout);
        let retention =
            RetentionEnforcer::new(self.ledger.as_ref(), self.snapshots.as_ref(), &pool, timeout);

        for (item, artifact, _guard) in produced {
            let key = match fan_out.upload(job, &artifact.path).await {
                Ok(key) => key,
                Err(e) => {
                    if job.job_type == JobType::Snapshot {
                        self.discard_snapshot(&artifact.file_name).await;
                    }
                    return Err(e);
                }
            };
            let file_dir = key
                .rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_default();

            let mut record = BackupRecord {
                origin: ORIGIN_CRONJOB.to_string(),
                record_type: item.record_type,
                name: item.name,
                detail_name: item.detail_name,
                cronjob_id: job.id,
                source_account_ids: job.source_account_ids.clone(),
                download_account_id: job.download_account_id,
                file_dir,
                file_name: artifact.file_name,
                ..Default::default()
            };

            match self.ledger.create_record(&record).await {
                Ok(id) => {
                    record.id = id;
                    info!("已保存备份记录 {}/{}", record.file_dir, record.file_name);
                    retention.sweep(job, &record).await;
                }
                Err(e) => {
                    // 远端文件已存在但没有记录，后续清理看不到它
                    error!("保存备份记录失败，远端文件 {} 成为孤儿: {}", key, e);
                }
            }
        }
        Ok(())
    }

    /// 上传失败的快照没有备份记录，清理不会再碰到它的元数据
    async fn discard_snapshot(&self, file_name: &str) {
        let name = snapshot_name_of(file_name);
        if let Err(e) = self.snapshots.delete_snapshot_by_name(name).await {
            warn!("删除未上传的快照记录 {} 失败: {}", name, e);
        }
    }
}
