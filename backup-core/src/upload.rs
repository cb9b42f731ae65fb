//! 备份文件分发
//!
//! 同一个本地文件按任务中的账号顺序依次上传，遇到第一个失败立即停止。
//! 无论成功与否，本地文件在返回前都会被删除。

use crate::{
    BackupError, Result,
    database::CronJob,
    storage::{StorageClientPool, join_remote},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// 离开作用域时删除本地文件
pub(crate) struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("已清理临时文件: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("清理临时文件 {} 失败: {}", self.path.display(), e),
        }
    }
}

/// 备份文件上传器
pub struct UploadFanOut<'a> {
    pool: &'a StorageClientPool,
    tmp_dir: &'a Path,
    timeout: Duration,
}

impl<'a> UploadFanOut<'a> {
    pub fn new(pool: &'a StorageClientPool, tmp_dir: &'a Path, timeout: Duration) -> Self {
        Self {
            pool,
            tmp_dir,
            timeout,
        }
    }

    /// 上传到任务的全部存储账号，返回相对临时目录的远端键
    pub async fn upload(&self, job: &CronJob, local_path: &Path) -> Result<String> {
        let _guard = TempFileGuard::new(local_path);

        let relative = local_path.strip_prefix(self.tmp_dir)?.to_string_lossy();
        let key = join_remote(&[&*relative]);

        for account_id in job.source_accounts() {
            let account = self.pool.get(account_id).ok_or_else(|| {
                BackupError::account(format!("账号 {account_id} 未在本次运行中解析"))
            })?;
            let remote_path = join_remote(&[account.backup_path.as_str(), key.as_str()]);

            debug!("开始上传到 {}，路径: {}", account.name, remote_path);
            tokio::time::timeout(
                self.timeout,
                account.client.upload(local_path, &remote_path),
            )
            .await
            .map_err(|_| BackupError::Timeout(format!("上传到 {} 超时", account.name)))?
            .map_err(|e| match e {
                BackupError::Upload(_) => e,
                other => BackupError::upload(format!("{}: {other}", account.name)),
            })?;
            debug!("上传到 {} 成功", account.name);
        }

        Ok(key)
    }
}
