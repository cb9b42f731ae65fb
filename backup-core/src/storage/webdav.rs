use super::StorageClient;
use crate::{BackupError, Result};
use async_trait::async_trait;
use reqwest::{Body, Client, Method, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// WebDAV 存储客户端
#[derive(Debug, Clone)]
pub struct WebDavStorageClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
}

impl WebDavStorageClient {
    pub fn new(endpoint: &str, username: &str, password: &str, timeout: Duration) -> Result<Self> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(BackupError::account(format!(
                "WebDAV 地址无效: {endpoint}"
            )));
        }
        if username.is_empty() {
            return Err(BackupError::account("WebDAV 账号未配置用户名"));
        }
        if password.is_empty() {
            return Err(BackupError::account("WebDAV 账号未配置密码"));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn url(&self, remote_path: &str) -> String {
        format!("{}/{}", self.endpoint, remote_path.trim_start_matches('/'))
    }

    /// 逐级创建上级目录，已存在的目录会返回 405
    async fn ensure_collections(&self, remote_path: &str) -> Result<()> {
        let mkcol = Method::from_bytes(b"MKCOL")
            .map_err(|e| BackupError::custom(format!("无效的HTTP方法: {e}")))?;

        let segments: Vec<&str> = remote_path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let mut current = String::new();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            current = if current.is_empty() {
                segment.to_string()
            } else {
                format!("{current}/{segment}")
            };
            let response = self
                .client
                .request(mkcol.clone(), format!("{}/", self.url(&current)))
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await?;
            let status = response.status();
            if !(status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED) {
                return Err(BackupError::upload(format!(
                    "创建目录 {current} 失败: {status}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageClient for WebDavStorageClient {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<String> {
        self.ensure_collections(remote_path).await?;

        let file = tokio::fs::File::open(local_path).await?;
        let response = self
            .client
            .put(self.url(remote_path))
            .basic_auth(&self.username, Some(&self.password))
            .body(Body::from(file))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackupError::upload(format!(
                "上传 {} 失败: {}",
                remote_path,
                response.status()
            )));
        }
        debug!("WebDAV 上传完成: {}", remote_path);
        Ok(remote_path.to_string())
    }

    async fn delete(&self, remote_path: &str) -> Result<bool> {
        let response = self
            .client
            .delete(self.url(remote_path))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(BackupError::custom(format!(
                "删除 {remote_path} 失败: {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = WebDavStorageClient::new(
            "https://dav.example.com/remote.php/",
            "user",
            "pass",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.url("/backups/log/a.tar.gz"),
            "https://dav.example.com/remote.php/backups/log/a.tar.gz"
        );
    }
}
