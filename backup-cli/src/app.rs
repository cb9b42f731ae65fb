use backup_core::{JobDispatcher, Result, config::AppConfig, database::Database};
use std::path::Path;
use std::sync::Arc;

use crate::cli::Commands;
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: Arc<AppConfig>,
    pub database: Database,
    pub dispatcher: JobDispatcher,
}

impl CliApp {
    /// 加载配置并初始化CLI应用；未指定配置文件时按默认文件名查找
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::find_and_load_config()?,
        };
        config.ensure_dirs()?;
        Self::with_config(config).await
    }

    pub async fn with_config(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);
        let database = Database::connect(&config.database.path).await?;
        let dispatcher = JobDispatcher::new(config.clone(), database.clone());
        Ok(Self {
            config,
            database,
            dispatcher,
        })
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { .. } => Ok(()), // 已经在 main.rs 中处理
            Commands::Account(cmd) => commands::run_account_command(self, cmd).await,
            Commands::Job(cmd) => commands::run_job_command(self, cmd).await,
            Commands::Run { job_id } => commands::run_job(self, job_id).await.map(|_| ()),
            Commands::Records { job, json } => commands::list_records(self, job, json).await,
            Commands::Executions { job_id, json } => {
                commands::list_executions(self, job_id, json).await
            }
            Commands::Inventory(cmd) => commands::run_inventory_command(self, cmd).await,
        }
    }
}
