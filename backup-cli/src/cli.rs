use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// 存储账号相关命令
#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// 添加存储账号
    Add {
        /// 账号名称
        name: String,
        /// 账号类型：LOCAL 或 WebDAV
        #[arg(long = "type", default_value = "LOCAL")]
        account_type: String,
        /// 本地根目录，或 WebDAV 服务地址
        #[arg(long)]
        bucket: String,
        /// WebDAV 用户名
        #[arg(long, default_value = "")]
        access_key: String,
        /// WebDAV 密码
        #[arg(long, default_value = "")]
        credential: String,
        /// 账号下的远端基础路径
        #[arg(long, default_value = "")]
        backup_path: String,
    },
    /// 列出存储账号
    List,
}

/// 定时任务相关命令
#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// 添加任务定义
    Add(JobAddArgs),
    /// 列出任务定义
    List,
}

#[derive(Args, Debug)]
pub struct JobAddArgs {
    /// 任务名称
    pub name: String,
    /// 任务类型：app, website, database, directory, log, snapshot, shell, curl, cutWebsiteLog
    #[arg(long = "type")]
    pub job_type: String,
    /// 应用ID或 all
    #[arg(long, default_value = "")]
    pub app_id: String,
    /// 网站ID或 all
    #[arg(long, default_value = "")]
    pub website: String,
    /// 数据库引擎：mysql, mariadb, postgresql
    #[arg(long, default_value = "")]
    pub db_type: String,
    /// 数据库实例ID或 all
    #[arg(long, default_value = "")]
    pub db_name: String,
    /// 备份目录，或逗号分隔的文件列表（配合 --files）
    #[arg(long, default_value = "")]
    pub source_dir: String,
    /// source_dir 是文件列表而不是目录
    #[arg(long)]
    pub files: bool,
    /// shell 任务的脚本内容或脚本路径
    #[arg(long, default_value = "")]
    pub script: String,
    /// shell 任务的解释器，默认 bash
    #[arg(long, default_value = "")]
    pub executor: String,
    /// curl 任务请求的地址
    #[arg(long, default_value = "")]
    pub url: String,
    /// 逗号分隔的存储账号ID
    #[arg(long, default_value = "")]
    pub accounts: String,
    /// 下载使用的账号ID
    #[arg(long, default_value_t = 0)]
    pub download_account: i64,
    /// 备份文件加密密码
    #[arg(long)]
    pub secret: Option<String>,
    /// 逗号分隔的排除规则
    #[arg(long, default_value = "")]
    pub exclusion_rules: String,
    /// 保留份数
    #[arg(long, default_value_t = 7)]
    pub retain: u32,
}

/// 备份源登记命令
#[derive(Subcommand, Debug)]
pub enum InventoryCommand {
    /// 登记已安装应用
    AddApp {
        /// 应用标识，如 redis
        #[arg(long)]
        key: String,
        /// 安装名称
        #[arg(long)]
        name: String,
        /// 安装目录
        #[arg(long)]
        install_path: String,
    },
    /// 登记网站
    AddWebsite {
        #[arg(long)]
        domain: String,
        #[arg(long)]
        alias: String,
        /// 网站目录，日志位于其下的 log 目录
        #[arg(long)]
        site_dir: String,
    },
    /// 登记数据库实例
    AddDatabase {
        /// 数据库引擎：mysql, mariadb, postgresql
        #[arg(long)]
        engine: String,
        /// 数据库服务名
        #[arg(long)]
        server: String,
        /// 库名
        #[arg(long)]
        name: String,
        /// 数据库所在容器
        #[arg(long)]
        container: String,
        #[arg(long, default_value = "root")]
        username: String,
        #[arg(long, default_value = "")]
        password: String,
    },
}

/// Panel Backup CLI - 定时备份任务管理工具
#[derive(Parser)]
#[command(name = "panel-backup")]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    /// 配置文件路径，不指定时按默认文件名查找
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 首次使用时创建配置文件和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 存储账号管理
    #[command(subcommand)]
    Account(AccountCommand),
    /// 定时任务管理
    #[command(subcommand)]
    Job(JobCommand),
    /// 立即运行一次任务并等待结束
    Run {
        /// 任务ID
        job_id: i64,
    },
    /// 列出备份记录
    Records {
        /// 只显示指定任务的记录
        #[arg(long)]
        job: Option<i64>,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 列出任务的执行记录
    Executions {
        /// 任务ID
        job_id: i64,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 备份源登记
    #[command(subcommand)]
    Inventory(InventoryCommand),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_add() {
        let cli = Cli::try_parse_from([
            "panel-backup",
            "job",
            "add",
            "nightly-db",
            "--type",
            "database",
            "--db-type",
            "mysql",
            "--db-name",
            "all",
            "--accounts",
            "1,2",
            "--retain",
            "2",
        ])
        .unwrap();

        let Commands::Job(JobCommand::Add(args)) = cli.command else {
            panic!("expected job add");
        };
        assert_eq!(args.name, "nightly-db");
        assert_eq!(args.job_type, "database");
        assert_eq!(args.accounts, "1,2");
        assert_eq!(args.retain, 2);
        assert!(!args.files);
        assert!(args.secret.is_none());
    }

    #[test]
    fn test_parse_records_filter() {
        let cli = Cli::try_parse_from(["panel-backup", "-v", "records", "--job", "4", "--json"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Records {
                job: Some(4),
                json: true
            }
        ));
    }

    #[test]
    fn test_account_add_requires_bucket() {
        assert!(Cli::try_parse_from(["panel-backup", "account", "add", "local"]).is_err());
    }
}
