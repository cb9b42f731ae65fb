/// 备份记录相关常量
pub mod record {
    /// 定时任务产生的备份记录来源
    pub const ORIGIN_CRONJOB: &str = "cronjob";

    /// 快照在远端的固定目录
    pub const SNAPSHOT_DIR: &str = "system_snapshot";

    /// 压缩目录树的扩展名
    pub const TAR_GZ_EXTENSION: &str = "tar.gz";

    /// 数据库导出文件扩展名
    pub const SQL_GZ_EXTENSION: &str = "sql.gz";
}

/// 时间格式
pub mod time {
    /// 文件名使用的紧凑时间格式，定宽且按字典序可排序
    pub const DATE_TIME_SLIM_LAYOUT: &str = "%Y%m%d%H%M%S";

    /// 常规时间格式
    pub const DATE_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

    /// 文件名随机后缀长度
    pub const RANDOM_SUFFIX_LEN: usize = 5;
}

/// 外部命令相关常量
pub mod command {
    /// 子进程与上传的默认超时（一天）
    pub const DEFAULT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

    /// shell 任务默认解释器
    pub const DEFAULT_EXECUTOR: &str = "bash";

    pub const DOCKER: &str = "docker";
    pub const OPENSSL: &str = "openssl";
    pub const CURL: &str = "curl";
    pub const MYSQL_DUMP: &str = "mysqldump";
    pub const PG_DUMP: &str = "pg_dump";
}

/// 日志归档相关常量
pub mod logs {
    /// 系统登录日志默认目录
    pub const DEFAULT_LOGIN_LOG_DIR: &str = "/var/log";

    /// 登录日志文件前缀
    pub const LOGIN_LOG_PREFIXES: [&str; 2] = ["secure", "auth.log"];

    /// 网站日志文件
    pub const WEBSITE_LOG_FILES: [&str; 2] = ["access.log", "error.log"];
}

/// 配置相关常量
pub mod config {
    use std::path::{Path, PathBuf};

    /// 按优先级查找的配置文件名
    pub const CONFIG_FILE_NAMES: [&str; 3] =
        ["config.toml", "panel-backup.toml", ".panel-backup.toml"];

    /// 默认数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 默认数据库文件名
    pub const DATABASE_FILE_NAME: &str = "backup.db";

    /// 日志目录环境变量
    pub const LOG_DIR_ENV: &str = "PANEL_BACKUP_LOG_DIR";

    /// 获取默认数据库路径
    pub fn get_default_database_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(DATABASE_FILE_NAME)
    }

    /// 获取默认基础目录
    pub fn get_default_base_dir() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME)
    }
}
