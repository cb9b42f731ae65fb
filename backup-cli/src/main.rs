use anyhow::Context;
use backup_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use backup_core::BackupError;
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录，文件日志的守卫需要保持到退出
    let _log_guard = setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("❌ 操作失败: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        return run_init(cli.config.as_deref(), force)
            .await
            .context("初始化失败");
    }

    let app = match CliApp::new(cli.config.as_deref()).await {
        Ok(app) => app,
        Err(BackupError::ConfigNotFound) => {
            anyhow::bail!("配置文件未找到，请先运行 'panel-backup init' 命令来创建配置文件");
        }
        Err(e) => return Err(e).context("应用初始化失败"),
    };

    app.run_command(cli.command).await?;
    Ok(())
}
