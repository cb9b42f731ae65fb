use crate::Result;
use chrono::{DateTime, Utc};
use duckdb::types::Value;
use duckdb::{Connection, Row, params, params_from_iter};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::DbMessage;
use super::models::{
    AppInstall, BackupAccount, BackupRecord, CronjobRow, DatabaseInstance, JobRecordRow,
    RecordFilter, SnapshotEntry, Website,
};

const CRONJOB_COLUMNS: &str = "id, name, job_type, app_id, website, db_type, db_name, \
     source_dir, is_dir, script, executor, url, source_account_ids, download_account_id, \
     secret, exclusion_rules, retain_copies";

const JOB_RECORD_COLUMNS: &str =
    "id, cronjob_id, status, message, records, file, start_time, end_time";

const BACKUP_RECORD_COLUMNS: &str = "id, origin, record_type, name, detail_name, cronjob_id, \
     source_account_ids, download_account_id, file_dir, file_name, created_at";

const ACCOUNT_COLUMNS: &str =
    "id, name, account_type, bucket, access_key, credential, backup_path, vars";

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct DuckDbActor {
    connection: Connection,
}

impl DuckDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("DuckDB Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("DuckDB Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let _ = respond_to.send(self.init_tables());
            }
            DbMessage::CreateCronjob { job, respond_to } => {
                let _ = respond_to.send(self.create_cronjob(&job));
            }
            DbMessage::GetCronjob { id, respond_to } => {
                let _ = respond_to.send(self.get_cronjob(id));
            }
            DbMessage::ListCronjobs { respond_to } => {
                let _ = respond_to.send(self.list_cronjobs());
            }
            DbMessage::StartJobRecord {
                cronjob_id,
                status,
                start_time,
                respond_to,
            } => {
                let _ = respond_to.send(self.start_job_record(cronjob_id, &status, start_time));
            }
            DbMessage::UpdateJobRecordLog {
                record_id,
                records,
                respond_to,
            } => {
                let _ = respond_to.send(self.update_job_record_log(record_id, &records));
            }
            DbMessage::EndJobRecord {
                record_id,
                status,
                message,
                records,
                file,
                end_time,
                respond_to,
            } => {
                let result =
                    self.end_job_record(record_id, &status, &message, &records, &file, end_time);
                let _ = respond_to.send(result);
            }
            DbMessage::GetJobRecord {
                record_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_job_record(record_id));
            }
            DbMessage::ListJobRecords {
                cronjob_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_job_records(cronjob_id));
            }
            DbMessage::DeleteJobRecord {
                record_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.delete_by_id("job_records", record_id));
            }
            DbMessage::CreateBackupRecord { record, respond_to } => {
                let _ = respond_to.send(self.create_backup_record(&record));
            }
            DbMessage::ListBackupRecords { filter, respond_to } => {
                let _ = respond_to.send(self.list_backup_records(&filter));
            }
            DbMessage::DeleteBackupRecord {
                record_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.delete_by_id("backup_records", record_id));
            }
            DbMessage::CreateAccount {
                account,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_account(&account));
            }
            DbMessage::GetAccount { id, respond_to } => {
                let _ = respond_to.send(self.get_account(id));
            }
            DbMessage::ListAccounts { respond_to } => {
                let _ = respond_to.send(self.list_accounts());
            }
            DbMessage::CreateSnapshot {
                snapshot,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_snapshot(&snapshot));
            }
            DbMessage::ListSnapshots { respond_to } => {
                let _ = respond_to.send(self.list_snapshots());
            }
            DbMessage::DeleteSnapshotByName { name, respond_to } => {
                let _ = respond_to.send(self.delete_snapshot_by_name(&name));
            }
            DbMessage::CreateAppInstall { app, respond_to } => {
                let _ = respond_to.send(self.create_app_install(&app));
            }
            DbMessage::ListAppInstalls { id, respond_to } => {
                let _ = respond_to.send(self.list_app_installs(id));
            }
            DbMessage::CreateWebsite {
                website,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_website(&website));
            }
            DbMessage::ListWebsites { id, respond_to } => {
                let _ = respond_to.send(self.list_websites(id));
            }
            DbMessage::CreateDatabaseInstance {
                instance,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_database_instance(&instance));
            }
            DbMessage::ListDatabaseInstances {
                engines,
                id,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_database_instances(&engines, id));
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行，跳过只有注释的片段
        for statement in sql_content.split(';') {
            let trimmed = statement.trim();
            let is_only_comments = trimmed
                .lines()
                .map(|line| line.trim())
                .all(|line| line.is_empty() || line.starts_with("--"));
            if !is_only_comments {
                self.connection.execute(trimmed, [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    /// 获取序列当前值，即刚插入行的ID
    fn last_id(&self, sequence: &str) -> Result<i64> {
        let id: i64 = self.connection.query_row(
            &format!("SELECT currval('{sequence}')"),
            [],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn delete_by_id(&mut self, table: &str, id: i64) -> Result<()> {
        self.connection
            .execute(&format!("DELETE FROM {table} WHERE id = ?"), params![id])?;
        Ok(())
    }

    // ========== 定时任务 ==========

    fn create_cronjob(&mut self, job: &CronjobRow) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO cronjobs (name, job_type, app_id, website, db_type, db_name, source_dir,
                 is_dir, script, executor, url, source_account_ids, download_account_id, secret,
                 exclusion_rules, retain_copies)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                job.name,
                job.job_type,
                job.app_id,
                job.website,
                job.db_type,
                job.db_name,
                job.source_dir,
                job.is_dir,
                job.script,
                job.executor,
                job.url,
                job.source_account_ids,
                job.download_account_id,
                job.secret,
                job.exclusion_rules,
                job.retain_copies,
            ],
        )?;
        self.last_id("cronjob_id_seq")
    }

    fn cronjob_from_row(row: &Row<'_>) -> duckdb::Result<CronjobRow> {
        Ok(CronjobRow {
            id: row.get(0)?,
            name: row.get(1)?,
            job_type: row.get(2)?,
            app_id: row.get(3)?,
            website: row.get(4)?,
            db_type: row.get(5)?,
            db_name: row.get(6)?,
            source_dir: row.get(7)?,
            is_dir: row.get(8)?,
            script: row.get(9)?,
            executor: row.get(10)?,
            url: row.get(11)?,
            source_account_ids: row.get(12)?,
            download_account_id: row.get(13)?,
            secret: row.get(14)?,
            exclusion_rules: row.get(15)?,
            retain_copies: row.get(16)?,
        })
    }

    fn get_cronjob(&mut self, id: i64) -> Result<Option<CronjobRow>> {
        let mut stmt = self
            .connection
            .prepare(&format!("SELECT {CRONJOB_COLUMNS} FROM cronjobs WHERE id = ?"))?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::cronjob_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_cronjobs(&mut self) -> Result<Vec<CronjobRow>> {
        let mut stmt = self
            .connection
            .prepare(&format!("SELECT {CRONJOB_COLUMNS} FROM cronjobs ORDER BY id"))?;
        let jobs = stmt
            .query_map([], Self::cronjob_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    // ========== 执行记录 ==========

    fn start_job_record(
        &mut self,
        cronjob_id: i64,
        status: &str,
        start_time: DateTime<Utc>,
    ) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO job_records (cronjob_id, status, start_time) VALUES (?, ?, ?)",
            params![cronjob_id, status, start_time],
        )?;
        self.last_id("job_record_id_seq")
    }

    fn update_job_record_log(&mut self, record_id: i64, records: &str) -> Result<()> {
        self.connection.execute(
            "UPDATE job_records SET records = ? WHERE id = ?",
            params![records, record_id],
        )?;
        Ok(())
    }

    fn end_job_record(
        &mut self,
        record_id: i64,
        status: &str,
        message: &str,
        records: &str,
        file: &str,
        end_time: DateTime<Utc>,
    ) -> Result<()> {
        self.connection.execute(
            "UPDATE job_records SET status = ?, message = ?, records = ?, file = ?, end_time = ?
             WHERE id = ?",
            params![status, message, records, file, end_time, record_id],
        )?;
        Ok(())
    }

    fn job_record_from_row(row: &Row<'_>) -> duckdb::Result<JobRecordRow> {
        Ok(JobRecordRow {
            id: row.get(0)?,
            cronjob_id: row.get(1)?,
            status: row.get(2)?,
            message: row.get(3)?,
            records: row.get(4)?,
            file: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
        })
    }

    fn get_job_record(&mut self, record_id: i64) -> Result<Option<JobRecordRow>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {JOB_RECORD_COLUMNS} FROM job_records WHERE id = ?"
        ))?;
        let mut rows = stmt.query(params![record_id])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::job_record_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_job_records(&mut self, cronjob_id: i64) -> Result<Vec<JobRecordRow>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {JOB_RECORD_COLUMNS} FROM job_records WHERE cronjob_id = ?
             ORDER BY created_at DESC, id DESC"
        ))?;
        let records = stmt
            .query_map(params![cronjob_id], Self::job_record_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }

    // ========== 备份记录 ==========

    fn create_backup_record(&mut self, record: &BackupRecord) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO backup_records (origin, record_type, name, detail_name, cronjob_id,
                 source_account_ids, download_account_id, file_dir, file_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.origin,
                record.record_type,
                record.name,
                record.detail_name,
                record.cronjob_id,
                record.source_account_ids,
                record.download_account_id,
                record.file_dir,
                record.file_name,
            ],
        )?;
        self.last_id("backup_record_id_seq")
    }

    fn list_backup_records(&mut self, filter: &RecordFilter) -> Result<Vec<BackupRecord>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(origin) = &filter.origin {
            conditions.push("origin = ?");
            values.push(Value::Text(origin.clone()));
        }
        if let Some(cronjob_id) = filter.cronjob_id {
            conditions.push("cronjob_id = ?");
            values.push(Value::BigInt(cronjob_id));
        }
        if let Some(record_type) = &filter.record_type {
            conditions.push("record_type = ?");
            values.push(Value::Text(record_type.clone()));
        }
        if let Some(name) = &filter.name {
            conditions.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(detail_name) = &filter.detail_name {
            conditions.push("detail_name = ?");
            values.push(Value::Text(detail_name.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // 创建时间相同时以自增ID决定先后
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {BACKUP_RECORD_COLUMNS} FROM backup_records {where_clause}
             ORDER BY created_at DESC, id DESC"
        ))?;

        let records = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(BackupRecord {
                    id: row.get(0)?,
                    origin: row.get(1)?,
                    record_type: row.get(2)?,
                    name: row.get(3)?,
                    detail_name: row.get(4)?,
                    cronjob_id: row.get(5)?,
                    source_account_ids: row.get(6)?,
                    download_account_id: row.get(7)?,
                    file_dir: row.get(8)?,
                    file_name: row.get(9)?,
                    created_at: row.get(10)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        Ok(records)
    }

    // ========== 存储账号 ==========

    fn create_account(&mut self, account: &BackupAccount) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO backup_accounts (name, account_type, bucket, access_key, credential,
                 backup_path, vars)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                account.name,
                account.account_type,
                account.bucket,
                account.access_key,
                account.credential,
                account.backup_path,
                account.vars,
            ],
        )?;
        self.last_id("backup_account_id_seq")
    }

    fn account_from_row(row: &Row<'_>) -> duckdb::Result<BackupAccount> {
        Ok(BackupAccount {
            id: row.get(0)?,
            name: row.get(1)?,
            account_type: row.get(2)?,
            bucket: row.get(3)?,
            access_key: row.get(4)?,
            credential: row.get(5)?,
            backup_path: row.get(6)?,
            vars: row.get(7)?,
        })
    }

    fn get_account(&mut self, id: i64) -> Result<Option<BackupAccount>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM backup_accounts WHERE id = ?"
        ))?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::account_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_accounts(&mut self) -> Result<Vec<BackupAccount>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM backup_accounts ORDER BY id"
        ))?;
        let accounts = stmt
            .query_map([], Self::account_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    // ========== 快照 ==========

    fn create_snapshot(&mut self, snapshot: &SnapshotEntry) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO snapshots (name, source_account_ids, download_account_id)
             VALUES (?, ?, ?)",
            params![
                snapshot.name,
                snapshot.source_account_ids,
                snapshot.download_account_id,
            ],
        )?;
        self.last_id("snapshot_id_seq")
    }

    fn list_snapshots(&mut self) -> Result<Vec<SnapshotEntry>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, name, source_account_ids, download_account_id FROM snapshots
             ORDER BY id",
        )?;
        let snapshots = stmt
            .query_map([], |row| {
                Ok(SnapshotEntry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    source_account_ids: row.get(2)?,
                    download_account_id: row.get(3)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(snapshots)
    }

    fn delete_snapshot_by_name(&mut self, name: &str) -> Result<()> {
        self.connection
            .execute("DELETE FROM snapshots WHERE name = ?", params![name])?;
        Ok(())
    }

    // ========== 备份源清单 ==========

    fn create_app_install(&mut self, app: &AppInstall) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO app_installs (app_key, name, install_path) VALUES (?, ?, ?)",
            params![app.app_key, app.name, app.install_path],
        )?;
        self.last_id("app_install_id_seq")
    }

    fn list_app_installs(&mut self, id: Option<i64>) -> Result<Vec<AppInstall>> {
        let (sql, values) = with_optional_id(
            "SELECT id, app_key, name, install_path FROM app_installs",
            Vec::new(),
            id,
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let apps = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(AppInstall {
                    id: row.get(0)?,
                    app_key: row.get(1)?,
                    name: row.get(2)?,
                    install_path: row.get(3)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(apps)
    }

    fn create_website(&mut self, website: &Website) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO websites (primary_domain, alias, site_dir) VALUES (?, ?, ?)",
            params![website.primary_domain, website.alias, website.site_dir],
        )?;
        self.last_id("website_id_seq")
    }

    fn list_websites(&mut self, id: Option<i64>) -> Result<Vec<Website>> {
        let (sql, values) = with_optional_id(
            "SELECT id, primary_domain, alias, site_dir FROM websites",
            Vec::new(),
            id,
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let websites = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(Website {
                    id: row.get(0)?,
                    primary_domain: row.get(1)?,
                    alias: row.get(2)?,
                    site_dir: row.get(3)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(websites)
    }

    fn create_database_instance(&mut self, instance: &DatabaseInstance) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO database_instances (engine, server, name, container_name, username,
                 password)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                instance.engine,
                instance.server,
                instance.name,
                instance.container_name,
                instance.username,
                instance.password,
            ],
        )?;
        self.last_id("database_instance_id_seq")
    }

    fn list_database_instances(
        &mut self,
        engines: &[String],
        id: Option<i64>,
    ) -> Result<Vec<DatabaseInstance>> {
        let mut sql = String::from(
            "SELECT id, engine, server, name, container_name, username, password
             FROM database_instances",
        );
        let mut values: Vec<Value> = Vec::new();
        if !engines.is_empty() {
            let placeholders = vec!["?"; engines.len()].join(", ");
            sql.push_str(&format!(" WHERE engine IN ({placeholders})"));
            values.extend(engines.iter().cloned().map(Value::Text));
        }
        let (sql, values) = with_optional_id(&sql, values, id);

        let mut stmt = self.connection.prepare(&sql)?;
        let instances = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(DatabaseInstance {
                    id: row.get(0)?,
                    engine: row.get(1)?,
                    server: row.get(2)?,
                    name: row.get(3)?,
                    container_name: row.get(4)?,
                    username: row.get(5)?,
                    password: row.get(6)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(instances)
    }
}

/// 为查询追加可选的ID条件，并按ID排序
fn with_optional_id(base: &str, mut values: Vec<Value>, id: Option<i64>) -> (String, Vec<Value>) {
    let mut sql = base.to_string();
    if let Some(id) = id {
        let keyword = if sql.contains(" WHERE ") { "AND" } else { "WHERE" };
        sql.push_str(&format!(" {keyword} id = ?"));
        values.push(Value::BigInt(id));
    }
    sql.push_str(" ORDER BY id");
    (sql, values)
}
