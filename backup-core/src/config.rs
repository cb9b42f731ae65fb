use crate::constants::{command, config, logs};
use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub system: SystemConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// 目录相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SystemConfig {
    /// 备份产物的本地临时根目录，远端路径与其下的相对路径一致
    pub tmp_dir: String,
    /// 面板基础目录（系统日志、任务日志）
    pub base_dir: String,
    /// 本地备份目录（网站日志切割结果）
    pub backup_dir: String,
    /// 快照打包的数据目录
    pub data_dir: String,
}

/// 数据库配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// 外部命令配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExecutorConfig {
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_login_log_dir")]
    pub login_log_dir: String,
}

/// 快照命名配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_version")]
    pub version: String,
    #[serde(default = "default_snapshot_scope")]
    pub scope: String,
}

fn default_command_timeout() -> u64 {
    command::DEFAULT_TIMEOUT_SECS
}

fn default_login_log_dir() -> String {
    logs::DEFAULT_LOGIN_LOG_DIR.to_string()
}

fn default_snapshot_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_snapshot_scope() -> String {
    "core".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            login_log_dir: default_login_log_dir(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            version: default_snapshot_version(),
            scope: default_snapshot_scope(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let base_dir = config::get_default_base_dir();
        Self {
            system: SystemConfig {
                tmp_dir: base_dir.join("tmp").to_string_lossy().to_string(),
                base_dir: base_dir.to_string_lossy().to_string(),
                backup_dir: base_dir.join("backup").to_string_lossy().to_string(),
                data_dir: base_dir.join("panel").to_string_lossy().to_string(),
            },
            database: DatabaseConfig {
                path: config::get_default_database_path()
                    .to_string_lossy()
                    .to_string(),
            },
            executor: ExecutorConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> panel-backup.toml -> .panel-backup.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_FILE_NAMES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }
        Err(BackupError::ConfigNotFound)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{tmp_dir}", &self.system.tmp_dir)
            .replace("{base_dir}", &self.system.base_dir)
            .replace("{backup_dir}", &self.system.backup_dir)
            .replace("{data_dir}", &self.system.data_dir)
            .replace("{database_path}", &self.database.path)
            .replace(
                "{command_timeout_secs}",
                &self.executor.command_timeout_secs.to_string(),
            )
            .replace("{login_log_dir}", &self.executor.login_log_dir)
            .replace("{snapshot_version}", &self.snapshot.version)
            .replace("{snapshot_scope}", &self.snapshot.scope)
    }

    /// 确保工作目录存在
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.system.tmp_dir)?;
        fs::create_dir_all(&self.system.base_dir)?;
        fs::create_dir_all(&self.system.backup_dir)?;
        Ok(())
    }

    pub fn tmp_dir(&self) -> PathBuf {
        PathBuf::from(&self.system.tmp_dir)
    }

    pub fn base_dir(&self) -> PathBuf {
        PathBuf::from(&self.system.base_dir)
    }

    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.system.backup_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.system.data_dir)
    }

    pub fn login_log_dir(&self) -> PathBuf {
        PathBuf::from(&self.executor.login_log_dir)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.command_timeout_secs)
    }

    /// 以指定根目录构造配置，所有工作目录都位于其下
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let path = |name: &str| root.join(name).to_string_lossy().to_string();
        Self {
            system: SystemConfig {
                tmp_dir: path("tmp"),
                base_dir: path("base"),
                backup_dir: path("backup"),
                data_dir: path("panel"),
            },
            database: DatabaseConfig {
                path: path("backup.db"),
            },
            executor: ExecutorConfig {
                command_timeout_secs: default_command_timeout(),
                login_log_dir: path("var_log"),
            },
            snapshot: SnapshotConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_round_trip_through_template() {
        let dir = tempdir().unwrap();
        let config = AppConfig::with_root(dir.path());
        let file = dir.path().join("config.toml");

        config.save_to_file(&file).unwrap();
        let loaded = AppConfig::load_from_file(&file).unwrap();

        assert_eq!(loaded.system.tmp_dir, config.system.tmp_dir);
        assert_eq!(loaded.database.path, config.database.path);
        assert_eq!(loaded.executor.command_timeout_secs, 86400);
        assert_eq!(loaded.snapshot.scope, "core");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let content = r#"
[system]
tmp_dir = "/tmp/panel"
base_dir = "/opt/panel"
backup_dir = "/opt/panel/backup"
data_dir = "/opt/panel/data"

[database]
path = "/opt/panel/db/backup.db"
"#;
        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config.command_timeout(), Duration::from_secs(86400));
        assert_eq!(config.login_log_dir(), PathBuf::from("/var/log"));
    }
}
