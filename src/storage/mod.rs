pub mod local;
pub mod memory;
pub mod sftp;

use crate::config::TransferConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime};
use std::path::Path;
use std::time::SystemTime;

pub use local::LocalStorage;
pub use memory::{MemoryConnector, MemorySession};
pub use sftp::{SftpConnector, SftpStorage};

/// 文件元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    /// 最后访问时间（本地日历 naive 时间）
    pub accessed: NaiveDateTime,
    pub is_dir: bool,
}

/// 把系统时间转换成本地 naive 时间
pub fn local_naive(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// 把 unix 秒转换成本地 naive 时间
pub fn local_naive_from_unix(secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(secs, 0)
        .map(|utc| utc.with_timezone(&Local).naive_local())
        .unwrap_or_default()
}

/// 目录存储抽象（本地或远程）
#[async_trait]
pub trait Storage: Send + Sync {
    /// 非递归列出目录中的条目名（不含 `.` 和 `..`），保持底层顺序
    async fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// 获取元数据，文件不存在时返回错误
    async fn stat(&self, path: &str) -> Result<FileMeta>;

    /// 检查文件是否存在
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 已认证的远程会话
#[async_trait]
pub trait RemoteSession: Storage {
    /// 切换远程工作目录，之后的相对路径都基于它
    async fn change_dir(&mut self, path: &str) -> Result<()>;

    /// 下载远程文件到本地路径，返回字节数
    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64>;

    /// 上传本地文件到远程路径，返回字节数
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64>;

    /// 关闭会话
    async fn close(&mut self) -> Result<()>;

    fn as_storage(&self) -> &dyn Storage;
}

/// 建立远程会话
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &TransferConfig) -> Result<Box<dyn RemoteSession>>;
}
