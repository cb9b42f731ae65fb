use backup_core::constants::config::LOG_DIR_ENV;
use tracing_appender::non_blocking::WorkerGuard;

/// 日志文件名前缀，按天滚动
const LOG_FILE_PREFIX: &str = "panel-backup.log";

/// 设置日志记录系统
///
/// - 库代码只使用 tracing 宏记录日志
/// - 支持 RUST_LOG 环境变量控制日志级别，`-v` 时默认 debug
/// - 设置 `PANEL_BACKUP_LOG_DIR` 后日志写入该目录下按天滚动的文件
///
/// 返回的守卫需要保持到程序退出，否则文件日志可能丢失。
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match std::env::var(LOG_DIR_ENV) {
        Ok(log_dir) if !log_dir.trim().is_empty() => {
            // 输出到文件 - 使用详细格式便于调试
            let appender = tracing_appender::rolling::daily(log_dir.trim(), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_line_number(true)
                .init();
            Some(guard)
        }
        _ => {
            // 输出到终端 - 使用简洁格式
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_thread_names(false)
                .with_line_number(false)
                .without_time()
                .compact()
                .init();
            None
        }
    }
}

/// 格式化时间，缺失时显示为 "-"
pub(crate) fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    use backup_core::constants::time::DATE_TIME_LAYOUT;

    time.map(|t| t.format(DATE_TIME_LAYOUT).to_string())
        .unwrap_or_else(|| "-".to_string())
}
