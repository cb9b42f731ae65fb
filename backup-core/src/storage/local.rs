use super::StorageClient;
use crate::{BackupError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 本地目录存储，远端路径映射到根目录下的相对路径
#[derive(Debug, Clone)]
pub struct LocalStorageClient {
    root: PathBuf,
}

impl LocalStorageClient {
    pub fn new(root: &str) -> Result<Self> {
        if root.trim().is_empty() {
            return Err(BackupError::account("本地存储账号未配置根目录"));
        }
        Ok(Self {
            root: PathBuf::from(root),
        })
    }

    fn target(&self, remote_path: &str) -> PathBuf {
        self.root.join(remote_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl StorageClient for LocalStorageClient {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<String> {
        let target = self.target(remote_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &target).await.map_err(|e| {
            BackupError::upload(format!("复制到 {} 失败: {e}", target.display()))
        })?;
        debug!("已复制到本地存储: {}", target.display());
        Ok(remote_path.to_string())
    }

    async fn delete(&self, remote_path: &str) -> Result<bool> {
        let target = self.target(remote_path);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_and_delete() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        let file = src.path().join("a.tar.gz");
        std::fs::write(&file, b"payload").unwrap();

        let client = LocalStorageClient::new(root.path().to_str().unwrap()).unwrap();
        let key = client.upload(&file, "backups/app/a.tar.gz").await.unwrap();
        assert_eq!(key, "backups/app/a.tar.gz");
        assert_eq!(
            std::fs::read(root.path().join("backups/app/a.tar.gz")).unwrap(),
            b"payload"
        );

        assert!(client.delete("backups/app/a.tar.gz").await.unwrap());
        assert!(!client.delete("backups/app/a.tar.gz").await.unwrap());
    }
}
