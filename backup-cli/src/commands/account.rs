use crate::app::CliApp;
use crate::cli::AccountCommand;
use backup_core::{Result, database::BackupAccount};
use tracing::info;

pub async fn run_account_command(app: &CliApp, cmd: AccountCommand) -> Result<()> {
    match cmd {
        AccountCommand::Add {
            name,
            account_type,
            bucket,
            access_key,
            credential,
            backup_path,
        } => {
            let account = BackupAccount {
                name,
                account_type,
                bucket,
                access_key,
                credential,
                backup_path,
                ..Default::default()
            };
            let id = app.database.create_account(account).await?;
            info!("✅ 已添加存储账号，ID: {}", id);
            Ok(())
        }
        AccountCommand::List => {
            let accounts = app.database.list_accounts().await?;
            if accounts.is_empty() {
                info!("📦 暂无存储账号");
                return Ok(());
            }
            info!("📦 存储账号列表:");
            for account in accounts {
                info!(
                    "   {:>4}  {:<16} {:<8} {} (路径: {})",
                    account.id,
                    account.name,
                    account.account_type,
                    account.bucket,
                    if account.backup_path.is_empty() {
                        "/"
                    } else {
                        account.backup_path.as_str()
                    }
                );
            }
            Ok(())
        }
    }
}
