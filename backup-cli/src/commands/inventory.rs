use crate::app::CliApp;
use crate::cli::InventoryCommand;
use backup_core::{
    Result,
    database::{AppInstall, DatabaseInstance, Website},
};
use tracing::info;

pub async fn run_inventory_command(app: &CliApp, cmd: InventoryCommand) -> Result<()> {
    match cmd {
        InventoryCommand::AddApp {
            key,
            name,
            install_path,
        } => {
            let id = app
                .database
                .create_app_install(AppInstall {
                    app_key: key,
                    name,
                    install_path,
                    ..Default::default()
                })
                .await?;
            info!("✅ 已登记应用，ID: {}", id);
        }
        InventoryCommand::AddWebsite {
            domain,
            alias,
            site_dir,
        } => {
            let id = app
                .database
                .create_website(Website {
                    primary_domain: domain,
                    alias,
                    site_dir,
                    ..Default::default()
                })
                .await?;
            info!("✅ 已登记网站，ID: {}", id);
        }
        InventoryCommand::AddDatabase {
            engine,
            server,
            name,
            container,
            username,
            password,
        } => {
            let id = app
                .database
                .create_database_instance(DatabaseInstance {
                    engine,
                    server,
                    name,
                    container_name: container,
                    username,
                    password,
                    ..Default::default()
                })
                .await?;
            info!("✅ 已登记数据库，ID: {}", id);
        }
    }
    Ok(())
}
