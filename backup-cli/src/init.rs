use backup_core::{
    Result,
    config::AppConfig,
    constants::config::CONFIG_FILE_NAMES,
    database::Database,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 运行独立的初始化流程
pub async fn run_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    info!("🗄️  Panel Backup 初始化");
    info!("======================");

    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAMES[0]));

    // 检查是否已经初始化过
    if !force && config_file.exists() {
        warn!("⚠️  检测到已存在的配置文件: {}", config_file.display());
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: panel-backup init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件和目录结构");
    let config = AppConfig::default();
    config.save_to_file(&config_file)?;
    info!("   ✅ 创建配置文件: {}", config_file.display());

    config.ensure_dirs()?;
    info!("   ✅ 创建目录结构:");
    info!("      - {}  (临时目录)", config.system.tmp_dir);
    info!("      - {}  (基础目录)", config.system.base_dir);
    info!("      - {}  (本地备份目录)", config.system.backup_dir);

    info!("📋 步骤 2: 初始化数据库");
    Database::connect(&config.database.path).await?;
    info!("   ✅ 创建DuckDB数据库: {}", config.database.path);

    info!("🎉 初始化完成！");
    info!("");
    info!("📝 接下来的步骤:");
    info!("   1️⃣  运行 'panel-backup account add <name> --bucket <dir>' 添加存储账号");
    info!("   2️⃣  运行 'panel-backup job add <name> --type <type> --accounts <id>' 添加任务");
    info!("   3️⃣  运行 'panel-backup run <job-id>' 立即执行一次");

    Ok(())
}
