use super::{local_naive, FileMeta, Storage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

/// 本地目录
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let base_path = path.as_ref().to_path_buf();
        let name = format!("local:{}", base_path.display());
        Self { base_path, name }
    }

    /// 相对路径基于 base_path，绝对路径原样使用
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else if path.is_empty() || path == "." {
            self.base_path.clone()
        } else {
            self.base_path.join(p)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let base = self.resolve_path(dir);

        // 使用 spawn_blocking 避免阻塞 async runtime
        let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut names = Vec::new();
            for entry in WalkDir::new(&base)
                .min_depth(1)
                .max_depth(1)
                .follow_links(false)
            {
                let entry =
                    entry.with_context(|| format!("cannot list {}", base.display()))?;
                // 名称不是 UTF-8 的条目无法在远程路径中表示，跳过
                match entry.file_name().to_str() {
                    Some(name) => names.push(name.to_string()),
                    None => warn!("跳过非 UTF-8 文件名: {}", entry.path().display()),
                }
            }
            Ok(names)
        })
        .await??;

        Ok(names)
    }

    async fn stat(&self, path: &str) -> Result<FileMeta> {
        let full_path = self.resolve_path(path);
        let metadata = fs::metadata(&full_path)
            .await
            .with_context(|| format!("cannot stat {}", full_path.display()))?;

        let accessed = metadata
            .accessed()
            .or_else(|_| metadata.modified())
            .with_context(|| format!("no access time for {}", full_path.display()))?;

        Ok(FileMeta {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            accessed: local_naive(accessed),
            is_dir: metadata.is_dir(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
