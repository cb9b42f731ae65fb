//! 外部命令执行
//!
//! 所有子进程都带统一的超时上限，超时后子进程随句柄一起被杀掉。

use crate::{BackupError, Result};
use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// 在 PATH 中查找命令
pub fn locate(program: &str) -> Result<PathBuf> {
    which::which(program)
        .map_err(|_| BackupError::produce(format!("{program} 未安装或不在 PATH 中")))
}

fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().to_string()
}

/// 执行命令并收集输出
pub async fn output(mut cmd: Command, timeout: Duration) -> Result<Output> {
    let program = program_name(&cmd);
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("执行命令: {}", program);
    tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| BackupError::Timeout(program.clone()))?
        .map_err(|e| BackupError::produce(format!("启动 {program} 失败: {e}")))
}

/// 非零退出码转换为错误，错误信息带上 stderr
pub fn check_status(output: &Output, program: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(BackupError::produce(format!(
        "{program} 执行失败 ({}): {}",
        output.status,
        stderr.trim()
    )))
}

/// 执行命令，stdout 和 stderr 追加写入日志文件
pub async fn run_to_log<I, S>(program: &str, args: I, log_path: &Path, timeout: Duration) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if let Some(parent) = log_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file))
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| BackupError::custom(format!("启动 {program} 失败: {e}")))?;
    let status = tokio::time::timeout(timeout, child.wait())
        .await
        .map_err(|_| BackupError::Timeout(program.to_string()))??;

    if !status.success() {
        return Err(BackupError::custom(format!(
            "{program} 执行失败 ({status})，详见 {}",
            log_path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_to_log_captures_output() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("task/shell/demo/1.log");

        run_to_log("sh", ["-c", "echo hello; echo oops >&2"], &log, Duration::from_secs(10))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("hello"));
        assert!(content.contains("oops"));
    }

    #[tokio::test]
    async fn test_run_to_log_reports_failure_and_timeout() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("fail.log");

        let err = run_to_log("sh", ["-c", "exit 3"], &log, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Custom(_)));

        let err = run_to_log("sh", ["-c", "sleep 5"], &log, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_output_and_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo bad >&2; exit 1"]);
        let out = output(cmd, Duration::from_secs(10)).await.unwrap();
        let err = check_status(&out, "sh").unwrap_err();
        assert!(err.to_string().contains("bad"));
    }
}
