use super::{ClientFactory, StorageClient};
use crate::{
    BackupError, Result,
    database::{BackupAccount, Database},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 存储账号查询
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, id: i64) -> Result<Option<BackupAccount>>;
}

#[async_trait]
impl AccountStore for Database {
    async fn get_account(&self, id: i64) -> Result<Option<BackupAccount>> {
        self.manager().get_account(id).await
    }
}

/// 已解析的存储账号
#[derive(Clone)]
pub struct ResolvedAccount {
    pub id: i64,
    pub name: String,
    /// 账号配置的远端根路径
    pub backup_path: String,
    pub client: Arc<dyn StorageClient>,
}

impl fmt::Debug for ResolvedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedAccount")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("backup_path", &self.backup_path)
            .finish_non_exhaustive()
    }
}

/// 单次运行内共享的存储客户端集合，以任务中的账号ID字符串为键
#[derive(Debug, Default, Clone)]
pub struct StorageClientPool {
    accounts: HashMap<String, ResolvedAccount>,
}

impl StorageClientPool {
    /// 解析账号ID列表，任一账号不存在或无法构造客户端即失败
    pub async fn resolve(
        store: &dyn AccountStore,
        factory: &dyn ClientFactory,
        account_ids: &[&str],
    ) -> Result<Self> {
        let mut accounts: HashMap<String, ResolvedAccount> = HashMap::new();
        for raw_id in account_ids {
            let raw_id = raw_id.trim();
            if raw_id.is_empty() || accounts.contains_key(raw_id) {
                continue;
            }
            let id: i64 = raw_id
                .parse()
                .map_err(|_| BackupError::account(format!("无效的账号ID: {raw_id}")))?;
            let account = store
                .get_account(id)
                .await?
                .ok_or_else(|| BackupError::account(format!("账号 {id} 不存在")))?;
            let client = factory.build(&account)?;

            debug!("已解析存储账号 {} ({})", account.name, account.account_type);
            accounts.insert(
                raw_id.to_string(),
                ResolvedAccount {
                    id,
                    name: account.name,
                    backup_path: account.backup_path,
                    client,
                },
            );
        }
        Ok(Self { accounts })
    }

    pub fn get(&self, account_id: &str) -> Option<&ResolvedAccount> {
        self.accounts.get(account_id.trim())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
