use super::*;
use crate::{
    archive::{ItemSource, artifact_name},
    constants::record::SQL_GZ_EXTENSION,
    database::{AppInstall, BackupAccount, DatabaseInstance, RecordFilter},
    storage::StorageClient,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use tempfile::TempDir;
use tokio::sync::Notify;

/// 记录所有上传和删除调用的存储客户端
#[derive(Default)]
struct RecordingClient {
    fail_upload: bool,
    uploads: StdMutex<Vec<String>>,
    deletes: StdMutex<Vec<String>>,
}

impl RecordingClient {
    fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for RecordingClient {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<String> {
        assert!(local_path.exists());
        self.uploads.lock().unwrap().push(remote_path.to_string());
        if self.fail_upload {
            return Err(BackupError::upload("remote refused the file"));
        }
        Ok(remote_path.to_string())
    }

    async fn delete(&self, remote_path: &str) -> Result<bool> {
        self.deletes.lock().unwrap().push(remote_path.to_string());
        Ok(true)
    }
}

/// 按账号名返回预置客户端
struct MockFactory {
    clients: HashMap<String, Arc<RecordingClient>>,
}

impl ClientFactory for MockFactory {
    fn build(&self, account: &BackupAccount) -> Result<Arc<dyn StorageClient>> {
        let client: Arc<dyn StorageClient> = self
            .clients
            .get(&account.name)
            .cloned()
            .ok_or_else(|| BackupError::account(format!("unknown account {}", account.name)))?;
        Ok(client)
    }
}

struct Harness {
    _root: TempDir,
    config: Arc<AppConfig>,
    db: Database,
    clients: HashMap<String, Arc<RecordingClient>>,
    /// 逗号分隔的账号ID，按传入顺序
    account_ids: String,
    dispatcher: JobDispatcher,
}

impl Harness {
    async fn new(accounts: &[(&str, bool)]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = Arc::new(AppConfig::with_root(root.path()));
        config.ensure_dirs().unwrap();
        let db = Database::connect_memory().await.unwrap();

        let mut clients = HashMap::new();
        let mut ids = Vec::new();
        for (name, fail_upload) in accounts {
            let id = db
                .create_account(BackupAccount {
                    name: name.to_string(),
                    account_type: "MOCK".to_string(),
                    backup_path: "bk".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(id.to_string());
            clients.insert(
                name.to_string(),
                Arc::new(RecordingClient {
                    fail_upload: *fail_upload,
                    ..Default::default()
                }),
            );
        }

        let dispatcher = JobDispatcher::new(config.clone(), db.clone()).with_client_factory(
            Arc::new(MockFactory {
                clients: clients.clone(),
            }),
        );

        Self {
            _root: root,
            config,
            db,
            clients,
            account_ids: ids.join(","),
            dispatcher,
        }
    }

    fn client(&self, name: &str) -> &RecordingClient {
        self.clients.get(name).unwrap()
    }

    async fn records(&self, cronjob_id: i64) -> Vec<BackupRecord> {
        self.db
            .list_records(&RecordFilter {
                cronjob_id: Some(cronjob_id),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn files_under(&self, dir: &str) -> usize {
        walkdir::WalkDir::new(self.config.tmp_dir().join(dir))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }
}

/// 不依赖容器的数据库导出，条目枚举沿用真实实现
struct FakeDumpProducer {
    inner: DatabaseProducer,
    config: Arc<AppConfig>,
}

#[async_trait]
impl ArchiveProducer for FakeDumpProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        self.inner.items(job).await
    }

    async fn produce(
        &self,
        job: &CronJob,
        item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        let ItemSource::Database(db) = &item.source else {
            return Err(BackupError::produce("not a database"));
        };
        let file_name = artifact_name("db", &db.name, start_time, SQL_GZ_EXTENSION);
        let dir = self
            .config
            .tmp_dir()
            .join("database")
            .join(&job.db_type)
            .join(&db.server)
            .join(&db.name);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&file_name);
        tokio::fs::write(&path, b"-- dump").await?;
        Ok(Artifact { path, file_name })
    }
}

/// 生成时阻塞，直到测试放行
struct BlockingProducer {
    inner: DirectoryProducer,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ArchiveProducer for BlockingProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        self.inner.items(job).await
    }

    async fn produce(
        &self,
        job: &CronJob,
        item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        self.started.notify_one();
        self.release.notified().await;
        self.inner.produce(job, item, start_time).await
    }
}

/// 备份记录写入总是失败的账本
struct FailingLedger {
    db: Database,
}

#[async_trait]
impl RecordLedger for FailingLedger {
    async fn create_record(&self, _record: &BackupRecord) -> Result<i64> {
        Err(BackupError::ledger("disk full"))
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<BackupRecord>> {
        self.db.list_records(filter).await
    }

    async fn delete_record(&self, record_id: i64) -> Result<()> {
        self.db.delete_record(record_id).await
    }

    async fn start_execution(&self, cronjob_id: i64, start_time: DateTime<Utc>) -> Result<i64> {
        self.db.start_execution(cronjob_id, start_time).await
    }

    async fn update_execution(&self, execution_id: i64, records: &str) -> Result<()> {
        self.db.update_execution(execution_id, records).await
    }

    async fn end_execution(
        &self,
        execution_id: i64,
        status: ExecutionStatus,
        message: &str,
        records: &str,
        file: &str,
    ) -> Result<()> {
        self.db
            .end_execution(execution_id, status, message, records, file)
            .await
    }

    async fn list_execution_logs(&self, cronjob_id: i64) -> Result<Vec<(i64, String, String)>> {
        self.db.list_execution_logs(cronjob_id).await
    }

    async fn delete_execution(&self, execution_id: i64) -> Result<()> {
        self.db.delete_execution(execution_id).await
    }
}

fn directory_job(h: &Harness, id: i64, source: &Path) -> CronJob {
    std::fs::create_dir_all(source).unwrap();
    std::fs::write(source.join("data.txt"), b"payload").unwrap();

    let mut job = CronJob::new("data", JobType::Directory);
    job.id = id;
    job.source_dir = source.to_string_lossy().to_string();
    job.source_account_ids = h.account_ids.clone();
    job
}

#[tokio::test]
async fn test_database_retention_scenario() {
    let h = Harness::new(&[("primary", false)]).await;
    h.db.create_database_instance(DatabaseInstance {
        engine: "mysql".to_string(),
        server: "mysql-main".to_string(),
        name: "main".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();

    let catalog: Arc<dyn SourceCatalog> = Arc::new(h.db.clone());
    let dispatcher = h.dispatcher.clone().with_producer(
        JobType::Database,
        Arc::new(FakeDumpProducer {
            inner: DatabaseProducer::new(catalog, h.config.clone()),
            config: h.config.clone(),
        }),
    );

    let mut job = CronJob::new("nightly-mysql", JobType::Database);
    job.id = 1;
    job.db_type = "mysql".to_string();
    job.db_name = "all".to_string();
    job.retain_copies = 2;
    job.source_account_ids = h.account_ids.clone();

    for _ in 0..3 {
        let report = dispatcher.run(job.clone()).await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Success, "{}", report.message);
    }

    let scoped = h
        .db
        .list_records(&RecordFilter {
            origin: Some(ORIGIN_CRONJOB.to_string()),
            cronjob_id: Some(1),
            record_type: Some("mysql".to_string()),
            name: Some("mysql-main".to_string()),
            detail_name: Some("main".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(scoped.len(), 2);
    assert!(
        scoped
            .iter()
            .all(|r| r.file_dir == "database/mysql/mysql-main/main")
    );

    let client = h.client("primary");
    let uploads = client.uploads();
    assert_eq!(uploads.len(), 3);
    assert_eq!(client.deletes(), vec![uploads[0].clone()]);
    assert!(uploads[0].starts_with("bk/database/mysql/mysql-main/main/db_main_"));
}

#[tokio::test]
async fn test_fail_fast_leaves_no_records() {
    let h = Harness::new(&[("primary", false)]).await;
    let root = h.config.base_dir();
    for (i, name) in ["one", "two", "three"].iter().enumerate() {
        let install = root.join("apps").join(name);
        // 第二个应用目录不存在，生成时失败
        if i != 1 {
            std::fs::create_dir_all(&install).unwrap();
            std::fs::write(install.join("conf.yml"), b"x").unwrap();
        }
        h.db.create_app_install(AppInstall {
            app_key: name.to_string(),
            name: format!("{name}-1"),
            install_path: install.to_string_lossy().to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    let mut job = CronJob::new("all-apps", JobType::App);
    job.id = 2;
    job.app_id = "all".to_string();
    job.source_account_ids = h.account_ids.clone();

    let report = h.dispatcher.run(job).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(h.records(2).await.is_empty());
    assert!(h.client("primary").uploads().is_empty());
    assert_eq!(h.files_under("app"), 0);

    let stored = h.db.get_execution(report.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert_eq!(stored.message, report.message);
}

#[tokio::test]
async fn test_upload_failure_on_second_account() {
    let h = Harness::new(&[("a", false), ("b", true)]).await;
    let job = directory_job(&h, 3, &h.config.base_dir().join("srv"));

    let report = h.dispatcher.run(job).await.unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(report.message.contains("remote refused"));
    assert_eq!(h.client("a").uploads().len(), 1);
    assert_eq!(h.client("b").uploads().len(), 1);
    assert!(h.records(3).await.is_empty());
    assert_eq!(h.files_under("directory"), 0);
}

#[tokio::test]
async fn test_snapshot_retention_removes_metadata() {
    let h = Harness::new(&[("primary", false)]).await;
    std::fs::create_dir_all(h.config.data_dir()).unwrap();
    std::fs::write(h.config.data_dir().join("panel.db"), b"db").unwrap();

    let mut job = CronJob::new("snap", JobType::Snapshot);
    job.id = 4;
    job.retain_copies = 1;
    job.source_account_ids = h.account_ids.clone();

    for _ in 0..2 {
        let report = h.dispatcher.run(job.clone()).await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Success, "{}", report.message);
    }

    let records = h.records(4).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_dir, SNAPSHOT_DIR_NAME);

    let snapshots = h.db.list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(format!("{}.tar.gz", snapshots[0].name), records[0].file_name);

    let client = h.client("primary");
    let uploads = client.uploads();
    assert!(uploads[0].starts_with("bk/system_snapshot/snapshot-"));
    assert_eq!(client.deletes(), vec![uploads[0].clone()]);
}

const SNAPSHOT_DIR_NAME: &str = crate::constants::record::SNAPSHOT_DIR;

#[tokio::test]
async fn test_snapshot_upload_failure_drops_metadata() {
    let h = Harness::new(&[("primary", true)]).await;
    std::fs::create_dir_all(h.config.data_dir()).unwrap();
    std::fs::write(h.config.data_dir().join("panel.db"), b"db").unwrap();

    let mut job = CronJob::new("snap", JobType::Snapshot);
    job.id = 13;
    job.source_account_ids = h.account_ids.clone();

    let report = h.dispatcher.run(job).await.unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(h.client("primary").uploads().len(), 1);
    assert!(h.records(13).await.is_empty());
    assert!(h.db.list_snapshots().await.unwrap().is_empty());
    assert_eq!(h.files_under(SNAPSHOT_DIR_NAME), 0);
}

#[tokio::test]
async fn test_retention_deletes_from_every_account() {
    let h = Harness::new(&[("a", false), ("b", false)]).await;
    let mut job = directory_job(&h, 14, &h.config.base_dir().join("mirror"));
    job.retain_copies = 1;

    for _ in 0..3 {
        let report = h.dispatcher.run(job.clone()).await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Success, "{}", report.message);
    }

    let records = h.records(14).await;
    assert_eq!(records.len(), 1);

    let a = h.client("a");
    let b = h.client("b");
    let uploads = a.uploads();
    assert_eq!(uploads.len(), 3);
    assert_eq!(b.uploads(), uploads);

    let pruned = uploads[..2].to_vec();
    assert_eq!(a.deletes(), pruned);
    assert_eq!(b.deletes(), pruned);
    assert!(uploads[2].ends_with(&records[0].file_name));
    assert!(h.dispatcher.locks.is_empty());
}

#[tokio::test]
async fn test_retrigger_while_running_is_rejected() {
    let h = Harness::new(&[("primary", false)]).await;
    let job = directory_job(&h, 5, &h.config.base_dir().join("busy"));

    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let dispatcher = h.dispatcher.clone().with_producer(
        JobType::Directory,
        Arc::new(BlockingProducer {
            inner: DirectoryProducer::new(h.config.clone()),
            started: started.clone(),
            release: release.clone(),
        }),
    );

    let first = dispatcher.trigger(job.clone());
    started.notified().await;

    let second = dispatcher.run(job.clone()).await.unwrap();
    assert_eq!(second.status, ExecutionStatus::Failed);
    assert!(second.message.contains(ALREADY_RUNNING));

    // 其他任务不受影响
    let mut other = job.clone();
    other.id = 6;
    other.source_dir = String::new();
    let report = dispatcher.run(other).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Success);

    // 被拒绝的触发和已结束的任务不保留锁，运行中的任务保留
    assert_eq!(dispatcher.locks.len(), 1);
    assert!(dispatcher.locks.contains_key(&5));

    release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, ExecutionStatus::Success, "{}", first.message);
    assert_eq!(h.records(5).await.len(), 1);
    assert_eq!(h.db.list_executions(5).await.unwrap().len(), 2);
    assert!(dispatcher.locks.is_empty());
}

#[tokio::test]
async fn test_ledger_write_failure_keeps_run_successful() {
    let h = Harness::new(&[("primary", false)]).await;
    let job = directory_job(&h, 7, &h.config.base_dir().join("ledger"));
    let dispatcher = h
        .dispatcher
        .clone()
        .with_ledger(Arc::new(FailingLedger { db: h.db.clone() }));

    let report = dispatcher.run(job).await.unwrap();

    assert_eq!(report.status, ExecutionStatus::Success);
    assert_eq!(h.client("primary").uploads().len(), 1);
    assert!(h.client("primary").deletes().is_empty());
    assert!(h.records(7).await.is_empty());
}

#[tokio::test]
async fn test_unknown_account_aborts_before_archiving() {
    let h = Harness::new(&[("primary", false)]).await;
    let mut job = directory_job(&h, 8, &h.config.base_dir().join("acct"));
    job.source_account_ids = format!("{},999", h.account_ids);

    let report = h.dispatcher.run(job).await.unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(report.message.contains("999"));
    assert!(h.client("primary").uploads().is_empty());
    assert_eq!(h.files_under("directory"), 0);
}

#[tokio::test]
async fn test_shell_job_captures_output() {
    let h = Harness::new(&[]).await;
    let mut job = CronJob::new("hello", JobType::Shell);
    job.id = 9;
    job.executor = "sh".to_string();
    job.script = "echo hello-from-shell".to_string();

    let report = h.dispatcher.run(job).await.unwrap();

    assert_eq!(report.status, ExecutionStatus::Success, "{}", report.message);
    let log = std::fs::read_to_string(&report.records).unwrap();
    assert!(log.contains("hello-from-shell"));
    assert!(report.records.contains("task/shell/hello"));
}

#[tokio::test]
async fn test_unsupported_and_empty_jobs() {
    let h = Harness::new(&[]).await;

    let mut ntp = CronJob::new("sync-time", JobType::Ntp);
    ntp.id = 10;
    let report = h.dispatcher.run(ntp).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(report.message.contains("ntp"));

    let mut curl = CronJob::new("ping", JobType::Curl);
    curl.id = 11;
    let report = h.dispatcher.run(curl).await.unwrap();
    assert_eq!(report.status, ExecutionStatus::Success);
    assert!(report.records.is_empty());
}

#[tokio::test]
async fn test_cut_website_log() {
    let h = Harness::new(&[]).await;
    let site_dir = h.config.base_dir().join("sites/shop");
    std::fs::create_dir_all(site_dir.join("log")).unwrap();
    std::fs::write(site_dir.join("log/access.log"), b"GET /").unwrap();
    std::fs::write(site_dir.join("log/error.log"), b"oops").unwrap();
    h.db.create_website(crate::database::Website {
        primary_domain: "shop.example.com".to_string(),
        alias: "shop".to_string(),
        site_dir: site_dir.to_string_lossy().to_string(),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut job = CronJob::new("rotate", JobType::CutWebsiteLog);
    job.id = 12;
    job.website = "all".to_string();

    let report = h.dispatcher.run(job).await.unwrap();

    assert_eq!(report.status, ExecutionStatus::Success, "{}", report.message);
    assert!(Path::new(&report.file).exists());
    assert!(report.file.contains("log/website/shop/shop.example.com_log_"));
    assert_eq!(std::fs::read(site_dir.join("log/access.log")).unwrap(), b"");
    let captured = std::fs::read_to_string(&report.records).unwrap();
    assert!(captured.contains("shop.example.com"));
}
