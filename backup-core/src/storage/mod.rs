//! 存储账号客户端
//!
//! 备份引擎对存储后端只依赖两个能力：上传与删除。任何实现了
//! [`StorageClient`] 的后端都可以接入。

mod local;
mod pool;
mod webdav;

pub use local::LocalStorageClient;
pub use pool::{AccountStore, ResolvedAccount, StorageClientPool};
pub use webdav::WebDavStorageClient;

use crate::{BackupError, Result, database::BackupAccount};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 本地目录账号类型
pub const ACCOUNT_TYPE_LOCAL: &str = "LOCAL";
/// WebDAV 账号类型
pub const ACCOUNT_TYPE_WEBDAV: &str = "WebDAV";

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// 上传本地文件到远端路径，返回远端路径
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<String>;

    /// 删除远端文件，文件不存在时返回 `false`
    async fn delete(&self, remote_path: &str) -> Result<bool>;
}

/// 根据账号配置构造客户端
pub trait ClientFactory: Send + Sync {
    fn build(&self, account: &BackupAccount) -> Result<Arc<dyn StorageClient>>;
}

/// 默认客户端工厂，支持本地目录与 WebDAV
#[derive(Debug, Clone)]
pub struct DefaultClientFactory {
    timeout: Duration,
}

impl DefaultClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ClientFactory for DefaultClientFactory {
    fn build(&self, account: &BackupAccount) -> Result<Arc<dyn StorageClient>> {
        match account.account_type.as_str() {
            ACCOUNT_TYPE_LOCAL => Ok(Arc::new(LocalStorageClient::new(&account.bucket)?)),
            ACCOUNT_TYPE_WEBDAV => Ok(Arc::new(WebDavStorageClient::new(
                &account.bucket,
                &account.access_key,
                &account.credential,
                self.timeout,
            )?)),
            other => Err(BackupError::account(format!(
                "账号 {} 的类型 {} 不受支持",
                account.name, other
            ))),
        }
    }
}

/// 拼接远端路径，忽略空段和多余的斜杠
pub fn join_remote(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote() {
        assert_eq!(
            join_remote(&["/backups/", "app/redis/redis-1", "app_x.tar.gz"]),
            "backups/app/redis/redis-1/app_x.tar.gz"
        );
        assert_eq!(join_remote(&["", "log", "system_log.tar.gz"]), "log/system_log.tar.gz");
        assert_eq!(join_remote(&["./a//b", "c"]), "a/b/c");
    }

    #[test]
    fn test_factory_rejects_unknown_type() {
        let factory = DefaultClientFactory::new(Duration::from_secs(5));
        let account = BackupAccount {
            name: "cos".to_string(),
            account_type: "COS".to_string(),
            ..Default::default()
        };
        let err = factory.build(&account).err().unwrap();
        assert!(matches!(err, BackupError::AccountResolution(_)));
    }

    #[test]
    fn test_factory_rejects_invalid_credentials() {
        let factory = DefaultClientFactory::new(Duration::from_secs(5));
        let local = BackupAccount {
            account_type: ACCOUNT_TYPE_LOCAL.to_string(),
            ..Default::default()
        };
        assert!(factory.build(&local).is_err());

        let webdav = BackupAccount {
            account_type: ACCOUNT_TYPE_WEBDAV.to_string(),
            bucket: "ftp://example.com".to_string(),
            access_key: "user".to_string(),
            ..Default::default()
        };
        assert!(factory.build(&webdav).is_err());
    }
}
