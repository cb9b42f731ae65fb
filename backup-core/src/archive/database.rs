use super::{
    ArchiveProducer, Artifact, BackupItem, ItemSource, SourceCatalog, artifact_name,
    parse_selector, unexpected_item,
};
use crate::{
    BackupError, Result,
    command,
    config::AppConfig,
    constants::{
        command::{DOCKER, MYSQL_DUMP, PG_DUMP},
        record::SQL_GZ_EXTENSION,
    },
    database::{CronJob, DatabaseInstance},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

const DUMP_CHUNK_SIZE: usize = 64 * 1024;
const DUMP_CHANNEL_CAPACITY: usize = 16;

const MYSQL_FAMILY: [&str; 2] = ["mysql", "mariadb"];

fn is_mysql_family(engine: &str) -> bool {
    MYSQL_FAMILY.contains(&engine)
}

/// 数据库备份：在容器内导出并 gzip 压缩
pub struct DatabaseProducer {
    catalog: Arc<dyn SourceCatalog>,
    config: Arc<AppConfig>,
}

impl DatabaseProducer {
    pub fn new(catalog: Arc<dyn SourceCatalog>, config: Arc<AppConfig>) -> Self {
        Self { catalog, config }
    }

    fn dump_command(engine: &str, instance: &DatabaseInstance) -> Command {
        let mut cmd = Command::new(DOCKER);
        cmd.arg("exec");
        if is_mysql_family(engine) {
            cmd.arg("-e")
                .arg(format!("MYSQL_PWD={}", instance.password))
                .arg(&instance.container_name)
                .arg(MYSQL_DUMP)
                .args(["--single-transaction", "--routines", "--default-character-set=utf8mb4"])
                .arg(format!("-u{}", instance.username))
                .arg(&instance.name);
        } else {
            cmd.arg("-e")
                .arg(format!("PGPASSWORD={}", instance.password))
                .arg(&instance.container_name)
                .arg(PG_DUMP)
                .args(["--no-owner", "-U"])
                .arg(&instance.username)
                .arg("-d")
                .arg(&instance.name);
        }
        cmd
    }

    /// 导出输出经通道交给阻塞线程上的 GzEncoder 写入目标文件
    async fn dump_to_file(mut cmd: Command, target: &Path, timeout: Duration) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| BackupError::produce(format!("启动导出命令失败: {e}")))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackupError::produce("无法获取导出命令输出"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackupError::produce("无法获取导出命令错误输出"))?;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(DUMP_CHANNEL_CAPACITY);
        let target_path = target.to_path_buf();
        let writer = tokio::task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::create(&target_path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            while let Some(chunk) = rx.blocking_recv() {
                encoder.write_all(&chunk)?;
            }
            encoder.finish()?;
            Ok(())
        });

        // 超时时整个 future 被丢弃，发送端随之关闭，子进程被杀掉
        let stream = async move {
            let stderr_task = tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            });

            let mut buf = vec![0u8; DUMP_CHUNK_SIZE];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    return Err(BackupError::produce("压缩写入线程已退出"));
                }
            }
            drop(tx);
            let status = child.wait().await?;
            let stderr_output = stderr_task.await?;
            Ok::<_, BackupError>((status, stderr_output))
        };

        let streamed = tokio::time::timeout(timeout, stream).await;
        writer
            .await?
            .map_err(|e| BackupError::produce(format!("写入压缩文件失败: {e}")))?;
        let (status, stderr_output) =
            streamed.map_err(|_| BackupError::Timeout("数据库导出".to_string()))??;

        if !status.success() {
            return Err(BackupError::produce(format!(
                "数据库导出失败 ({status}): {}",
                stderr_output.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveProducer for DatabaseProducer {
    async fn items(&self, job: &CronJob) -> Result<Vec<BackupItem>> {
        let selector = parse_selector(&job.db_name, "数据库")?;
        let engines: Vec<&str> = if is_mysql_family(&job.db_type) {
            MYSQL_FAMILY.to_vec()
        } else {
            vec![job.db_type.as_str()]
        };

        let instances = self.catalog.list_databases(&engines, selector).await?;
        if instances.is_empty() {
            return Err(BackupError::source_not_found(format!(
                "没有可备份的 {} 数据库: {}",
                job.db_type, job.db_name
            )));
        }

        Ok(instances
            .into_iter()
            .map(|db| {
                BackupItem::new(
                    job.db_type.clone(),
                    db.server.clone(),
                    db.name.clone(),
                    ItemSource::Database(db),
                )
            })
            .collect())
    }

    async fn produce(
        &self,
        job: &CronJob,
        item: &BackupItem,
        start_time: DateTime<Utc>,
    ) -> Result<Artifact> {
        let ItemSource::Database(instance) = &item.source else {
            return Err(unexpected_item("database", item));
        };

        let file_name = artifact_name("db", &instance.name, start_time, SQL_GZ_EXTENSION);
        let path = self
            .config
            .tmp_dir()
            .join("database")
            .join(&job.db_type)
            .join(&instance.server)
            .join(&instance.name)
            .join(&file_name);

        command::locate(DOCKER)?;
        info!("导出数据库 {}/{}", instance.server, instance.name);
        let cmd = Self::dump_command(&job.db_type, instance);
        if let Err(e) = Self::dump_to_file(cmd, &path, self.config.command_timeout()).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        debug!("数据库导出完成: {}", path.display());

        Ok(Artifact { path, file_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, JobType};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    fn instance(engine: &str, server: &str, name: &str) -> DatabaseInstance {
        DatabaseInstance {
            engine: engine.to_string(),
            server: server.to_string(),
            name: name.to_string(),
            container_name: format!("{server}-container"),
            username: "root".to_string(),
            password: "pw".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_items_follow_engine_family() {
        let db = Arc::new(Database::connect_memory().await.unwrap());
        db.create_database_instance(instance("mysql", "mysql-main", "shop"))
            .await
            .unwrap();
        db.create_database_instance(instance("mariadb", "maria", "blog"))
            .await
            .unwrap();
        db.create_database_instance(instance("postgresql", "pg", "analytics"))
            .await
            .unwrap();

        let root = tempdir().unwrap();
        let producer = DatabaseProducer::new(db, Arc::new(AppConfig::with_root(root.path())));

        let mut job = CronJob::new("dbs", JobType::Database);
        job.db_type = "mysql".to_string();
        job.db_name = "all".to_string();
        let items = producer.items(&job).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.record_type == "mysql"));

        job.db_type = "postgresql".to_string();
        let items = producer.items(&job).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "pg");
        assert_eq!(items[0].detail_name, "analytics");

        job.db_type = "redis".to_string();
        let err = producer.items(&job).await.unwrap_err();
        assert!(matches!(err, BackupError::SourceNotFound(_)));
    }

    #[test]
    fn test_dump_command_by_engine() {
        let mysql = DatabaseProducer::dump_command("mariadb", &instance("mariadb", "m", "shop"));
        let args: Vec<String> = mysql
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&MYSQL_DUMP.to_string()));
        assert!(args.contains(&"MYSQL_PWD=pw".to_string()));

        let pg = DatabaseProducer::dump_command("postgresql", &instance("postgresql", "p", "a"));
        let args: Vec<String> = pg
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&PG_DUMP.to_string()));
    }

    #[tokio::test]
    async fn test_dump_to_file_gzips_stdout() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out/db.sql.gz");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'CREATE TABLE t (id int);'"]);
        DatabaseProducer::dump_to_file(cmd, &target, Duration::from_secs(10))
            .await
            .unwrap();

        let mut content = String::new();
        GzDecoder::new(std::fs::File::open(&target).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content.trim(), "CREATE TABLE t (id int);");

        let mut failing = Command::new("sh");
        failing.args(["-c", "echo denied >&2; exit 2"]);
        let err = DatabaseProducer::dump_to_file(failing, &target, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("denied"));
    }

    #[tokio::test]
    async fn test_dump_to_file_large_output_and_timeout() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("big.sql.gz");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "head -c 1048576 /dev/zero"]);
        DatabaseProducer::dump_to_file(cmd, &target, Duration::from_secs(10))
            .await
            .unwrap();

        let mut content = Vec::new();
        GzDecoder::new(std::fs::File::open(&target).unwrap())
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content.len(), 1024 * 1024);
        assert!(content.iter().all(|b| *b == 0));

        let mut slow = Command::new("sh");
        slow.args(["-c", "echo partial; sleep 5"]);
        let err = DatabaseProducer::dump_to_file(slow, &target, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Timeout(_)));
    }
}
