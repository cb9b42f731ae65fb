//! tar.gz 打包、排除规则与加密

use crate::{
    BackupError, Result,
    command,
    constants::command::OPENSSL,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tar::Builder;
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

const SECRET_ENV: &str = "PANEL_BACKUP_SECRET";

#[derive(Debug, Clone)]
enum Rule {
    Literal(String),
    Glob(Regex),
}

impl Rule {
    fn matches(&self, relative: &str) -> bool {
        match self {
            Rule::Literal(pattern) => {
                relative == pattern
                    || relative.starts_with(&format!("{pattern}/"))
                    || relative.split('/').any(|c| c == pattern)
            }
            Rule::Glob(re) => re.is_match(relative) || relative.split('/').any(|c| re.is_match(c)),
        }
    }
}

/// 排除规则，逗号或换行分隔
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    rules: Vec<Rule>,
}

impl ExclusionRules {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for pattern in raw.split([',', '\n']) {
            let pattern = pattern.trim();
            let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
            let pattern = pattern.trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }

            if pattern.contains(['*', '?']) {
                let mut expr = String::from("^");
                for ch in pattern.chars() {
                    match ch {
                        '*' => expr.push_str("[^/]*"),
                        '?' => expr.push_str("[^/]"),
                        other => expr.push_str(&regex::escape(&other.to_string())),
                    }
                }
                expr.push('$');
                rules.push(Rule::Glob(Regex::new(&expr)?));
            } else {
                rules.push(Rule::Literal(pattern.to_string()));
            }
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 相对路径是否被排除
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let relative = relative.to_string_lossy().replace('\\', "/");
        self.rules.iter().any(|rule| rule.matches(&relative))
    }
}

fn produce_err(context: &str, err: impl std::fmt::Display) -> BackupError {
    BackupError::produce(format!("{context}: {err}"))
}

/// 打包目录，`with_root` 为真时归档内保留目录名
pub async fn tar_gz_dir(
    source: &Path,
    target: &Path,
    rules: ExclusionRules,
    with_root: bool,
) -> Result<()> {
    if !source.exists() {
        return Err(BackupError::produce(format!(
            "备份源不存在: {}",
            source.display()
        )));
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let source = source.to_path_buf();
    let archive_path = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file =
            File::create(&archive_path).map_err(|e| produce_err("创建归档文件失败", e))?;
        let mut archive = Builder::new(GzEncoder::new(file, Compression::default()));

        let root_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if source.is_file() {
            archive
                .append_path_with_name(&source, &root_name)
                .map_err(|e| produce_err("添加文件到归档失败", e))?;
        } else {
            let walker = WalkDir::new(&source).into_iter().filter_entry(|entry| {
                entry
                    .path()
                    .strip_prefix(&source)
                    .map(|rel| rel.as_os_str().is_empty() || !rules.is_excluded(rel))
                    .unwrap_or(true)
            });

            for entry in walker {
                let entry = entry?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let relative = path
                    .strip_prefix(&source)?
                    .to_string_lossy()
                    .replace('\\', "/");
                let name = if with_root && !root_name.is_empty() {
                    format!("{root_name}/{relative}")
                } else {
                    relative
                };
                archive
                    .append_path_with_name(path, name)
                    .map_err(|e| produce_err("添加文件到归档失败", e))?;
            }
        }

        archive
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| produce_err("完成归档失败", e))?;
        Ok::<(), BackupError>(())
    })
    .await??;

    debug!("归档完成: {}", target.display());
    Ok(())
}

/// 打包文件列表，归档内只保留文件名
pub async fn tar_gz_files(files: Vec<PathBuf>, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = File::create(&target).map_err(|e| produce_err("创建归档文件失败", e))?;
        let mut archive = Builder::new(GzEncoder::new(file, Compression::default()));

        for path in &files {
            let name = path
                .file_name()
                .ok_or_else(|| BackupError::produce(format!("无效的文件路径: {}", path.display())))?;
            if path.is_dir() {
                archive
                    .append_dir_all(name, path)
                    .map_err(|e| produce_err("添加目录到归档失败", e))?;
            } else {
                archive
                    .append_path_with_name(path, name)
                    .map_err(|e| produce_err(&format!("添加 {} 失败", path.display()), e))?;
            }
        }

        archive
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| produce_err("完成归档失败", e))?;
        Ok::<(), BackupError>(())
    })
    .await??;

    Ok(())
}

/// 用 openssl 原地加密文件，文件名不变
pub async fn encrypt_file(path: &Path, secret: &str, timeout: Duration) -> Result<()> {
    let openssl = command::locate(OPENSSL)?;
    let encrypted = PathBuf::from(format!("{}.enc", path.display()));

    let mut cmd = Command::new(openssl);
    cmd.args(["enc", "-aes-256-cbc", "-salt", "-pbkdf2", "-in"])
        .arg(path)
        .arg("-out")
        .arg(&encrypted)
        .arg("-pass")
        .arg(format!("env:{SECRET_ENV}"))
        .env(SECRET_ENV, secret);

    let output = command::output(cmd, timeout).await;
    let result = output.and_then(|out| command::check_status(&out, OPENSSL));
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&encrypted).await;
        return Err(e);
    }

    tokio::fs::rename(&encrypted, path).await?;
    debug!("已加密备份文件: {}", path.display());
    Ok(())
}
