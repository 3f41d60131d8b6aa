//! 内存中的远程目录，实现完整的远程会话接口
//!
//! 支持故障注入（连接失败、指定文件传输失败、上传截断），
//! 用于测试和演练。

use super::{Connector, FileMeta, RemoteSession, Storage};
use crate::config::TransferConfig;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Vec<u8>,
    accessed: NaiveDateTime,
    is_dir: bool,
}

#[derive(Debug, Default)]
struct Faults {
    connect_failures: usize,
    /// 文件名 -> 剩余失败次数
    transfer_failures: HashMap<String, usize>,
    truncate_uploads: bool,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

#[derive(Default)]
struct Shared {
    /// 按插入顺序保存，list 时保持该顺序
    entries: Mutex<Vec<(String, MemoryEntry)>>,
    faults: Mutex<Faults>,
    counters: Counters,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 规范化绝对路径：去掉多余的 `/`、`.`，处理 `..`
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// 内存远程目录的连接器，同时作为测试时的观察入口
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建目录（含父目录）
    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let mut entries = lock(&self.shared.entries);
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            if !entries.iter().any(|(p, _)| *p == current) {
                entries.push((
                    current.clone(),
                    MemoryEntry {
                        data: Vec::new(),
                        accessed: Local::now().naive_local(),
                        is_dir: true,
                    },
                ));
            }
        }
    }

    /// 写入文件（父目录自动创建）
    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>, accessed: NaiveDateTime) {
        let path = normalize(path);
        self.add_dir(parent_of(&path));
        let entry = MemoryEntry {
            data: data.into(),
            accessed,
            is_dir: false,
        };
        let mut entries = lock(&self.shared.entries);
        match entries.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => *existing = entry,
            None => entries.push((path, entry)),
        }
    }

    /// 读取文件内容
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize(path);
        lock(&self.shared.entries)
            .iter()
            .find(|(p, e)| *p == path && !e.is_dir)
            .map(|(_, e)| e.data.clone())
    }

    /// 前 n 次连接失败
    pub fn fail_connects(&self, n: usize) {
        lock(&self.shared.faults).connect_failures = n;
    }

    /// 指定文件名的前 n 次 get/put 失败
    pub fn fail_transfers_of(&self, name: &str, n: usize) {
        lock(&self.shared.faults)
            .transfer_failures
            .insert(name.to_string(), n);
    }

    /// 上传时丢弃最后一个字节，制造大小不一致
    pub fn truncate_uploads(&self, enabled: bool) {
        lock(&self.shared.faults).truncate_uploads = enabled;
    }

    pub fn connects(&self) -> usize {
        self.shared.counters.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.counters.closes.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.shared.counters.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.shared.counters.puts.load(Ordering::SeqCst)
    }

    /// 打开一个会话（不经过故障注入）
    pub fn session(&self, host: &str) -> MemorySession {
        MemorySession {
            shared: self.shared.clone(),
            cwd: "/".to_string(),
            name: format!("memory://{}", host),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &TransferConfig) -> Result<Box<dyn RemoteSession>> {
        {
            let mut faults = lock(&self.shared.faults);
            if faults.connect_failures > 0 {
                faults.connect_failures -= 1;
                bail!(
                    "connection to {}:{} refused (injected)",
                    config.host,
                    config.port
                );
            }
        }
        self.shared.counters.connects.fetch_add(1, Ordering::SeqCst);
        debug!("内存会话已连接: {}@{}", config.username, config.host);
        Ok(Box::new(self.session(&config.host)))
    }
}

/// 内存远程会话
pub struct MemorySession {
    shared: Arc<Shared>,
    cwd: String,
    name: String,
    closed: AtomicBool,
}

impl MemorySession {
    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            normalize(path)
        } else {
            normalize(&format!("{}/{}", self.cwd, path))
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("session {} is closed", self.name);
        }
        Ok(())
    }

    fn lookup(&self, path: &str) -> Option<MemoryEntry> {
        if path == "/" {
            return Some(MemoryEntry {
                data: Vec::new(),
                accessed: NaiveDateTime::default(),
                is_dir: true,
            });
        }
        lock(&self.shared.entries)
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, e)| e.clone())
    }

    /// 消耗一次注入的传输失败
    fn take_transfer_fault(&self, name: &str) -> bool {
        let mut faults = lock(&self.shared.faults);
        match faults.transfer_failures.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Storage for MemorySession {
    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let dir = self.resolve(dir);
        match self.lookup(&dir) {
            Some(e) if e.is_dir => {}
            Some(_) => bail!("{} is not a directory", dir),
            None => bail!("no such directory: {}", dir),
        }
        Ok(lock(&self.shared.entries)
            .iter()
            .filter(|(p, _)| p != "/" && parent_of(p) == dir)
            .map(|(p, _)| file_name(p).to_string())
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileMeta> {
        self.ensure_open()?;
        let full = self.resolve(path);
        let entry = self
            .lookup(&full)
            .ok_or_else(|| anyhow!("no such file: {}", full))?;
        Ok(FileMeta {
            size: entry.data.len() as u64,
            accessed: entry.accessed,
            is_dir: entry.is_dir,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn change_dir(&mut self, path: &str) -> Result<()> {
        self.ensure_open()?;
        let target = self.resolve(path);
        match self.lookup(&target) {
            Some(e) if e.is_dir => {
                self.cwd = target;
                Ok(())
            }
            _ => bail!("no such directory: {}", target),
        }
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        self.ensure_open()?;
        let full = self.resolve(remote_path);
        self.shared.counters.gets.fetch_add(1, Ordering::SeqCst);
        if self.take_transfer_fault(file_name(&full)) {
            bail!("read of {} failed (injected)", full);
        }
        let entry = self
            .lookup(&full)
            .filter(|e| !e.is_dir)
            .ok_or_else(|| anyhow!("no such file: {}", full))?;
        tokio::fs::write(local_path, &entry.data).await?;
        Ok(entry.data.len() as u64)
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64> {
        self.ensure_open()?;
        let full = self.resolve(remote_path);
        self.shared.counters.puts.fetch_add(1, Ordering::SeqCst);
        if self.take_transfer_fault(file_name(&full)) {
            bail!("write of {} failed (injected)", full);
        }
        match self.lookup(parent_of(&full)) {
            Some(e) if e.is_dir => {}
            _ => bail!("no such directory: {}", parent_of(&full)),
        }

        let mut data = tokio::fs::read(local_path).await?;
        let written = data.len() as u64;
        if lock(&self.shared.faults).truncate_uploads {
            data.pop();
        }

        let entry = MemoryEntry {
            data,
            accessed: Local::now().naive_local(),
            is_dir: false,
        };
        let mut entries = lock(&self.shared.entries);
        match entries.iter_mut().find(|(p, _)| *p == full) {
            Some((_, existing)) => *existing = entry,
            None => entries.push((full, entry)),
        }
        Ok(written)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn as_storage(&self) -> &dyn Storage {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c"), "/a/b/c");
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/"), "/");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a");
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let remote = MemoryConnector::new();
        remote.add_file("/outbox/z.csv", "z", ts(1));
        remote.add_file("/outbox/a.csv", "a", ts(2));
        remote.add_dir("/outbox/archive");

        let mut session = remote.session("h");
        session.change_dir("outbox").await.unwrap();
        assert_eq!(
            session.list(".").await.unwrap(),
            vec!["z.csv", "a.csv", "archive"]
        );
    }

    #[tokio::test]
    async fn test_change_dir_and_stat() {
        let remote = MemoryConnector::new();
        remote.add_file("/in/data.csv", vec![0u8; 42], ts(5));

        let mut session = remote.session("h");
        assert!(session.change_dir("missing").await.is_err());
        session.change_dir("/in").await.unwrap();

        let meta = session.stat("data.csv").await.unwrap();
        assert_eq!(meta.size, 42);
        assert_eq!(meta.accessed, ts(5));
        assert!(!meta.is_dir);
        assert!(session.stat("nope.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_put_get_and_faults() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("up.csv");
        std::fs::write(&local, b"12345").unwrap();

        let remote = MemoryConnector::new();
        remote.add_dir("/drop");
        remote.fail_transfers_of("up.csv", 1);

        let mut session = remote.session("h");
        session.change_dir("/drop").await.unwrap();
        assert!(session.put(&local, "up.csv").await.is_err());
        assert_eq!(session.put(&local, "up.csv").await.unwrap(), 5);
        assert_eq!(remote.file("/drop/up.csv").unwrap(), b"12345");
        assert_eq!(remote.puts(), 2);

        let back = dir.path().join("back.csv");
        assert_eq!(session.get("up.csv", &back).await.unwrap(), 5);
        assert_eq!(std::fs::read(&back).unwrap(), b"12345");

        remote.truncate_uploads(true);
        session.put(&local, "short.csv").await.unwrap();
        assert_eq!(session.stat("short.csv").await.unwrap().size, 4);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_operations() {
        let remote = MemoryConnector::new();
        remote.add_dir("/x");
        let mut session = remote.session("h");
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(remote.closes(), 1);
        assert!(session.list("/x").await.is_err());
    }
}
