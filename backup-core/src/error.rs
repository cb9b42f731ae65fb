use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("备份源不存在: {0}")]
    SourceNotFound(String),

    #[error("生成备份文件失败: {0}")]
    Produce(String),

    #[error("存储账号解析失败: {0}")]
    AccountResolution(String),

    #[error("上传备份文件失败: {0}")]
    Upload(String),

    #[error("保存备份记录失败: {0}")]
    LedgerWrite(String),

    #[error("命令执行超时: {0}")]
    Timeout(String),

    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("HTTP 请求错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("路径错误: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("排除规则无效: {0}")]
    Pattern(#[from] regex::Error),

    #[error("配置文件未找到")]
    ConfigNotFound,

    #[error("自定义错误: {0}")]
    Custom(String),
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for BackupError {
    fn from(err: duckdb::Error) -> Self {
        BackupError::DuckDb(err.to_string())
    }
}

impl BackupError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn source_not_found(msg: impl Into<String>) -> Self {
        Self::SourceNotFound(msg.into())
    }

    pub fn produce(msg: impl Into<String>) -> Self {
        Self::Produce(msg.into())
    }

    pub fn account(msg: impl Into<String>) -> Self {
        Self::AccountResolution(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::LedgerWrite(msg.into())
    }
}
