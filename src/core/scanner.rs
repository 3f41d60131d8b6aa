use crate::error::SyncError;
use crate::storage::{FileMeta, Storage};
use chrono::NaiveDateTime;
use futures::{future, stream, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::debug;

/// 待传输的文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCandidate {
    pub name: String,
    /// 相对于被扫描存储的路径
    pub source_path: String,
    pub last_access_time: NaiveDateTime,
    pub size_bytes: u64,
    pub is_directory: bool,
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Directory,
    BeforeCutoff,
}

/// 扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    Selected(FileCandidate),
    Skipped { name: String, reason: SkipReason },
}

impl ScanEntry {
    pub fn into_selected(self) -> Option<FileCandidate> {
        match self {
            ScanEntry::Selected(c) => Some(c),
            ScanEntry::Skipped { .. } => None,
        }
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// 文件扫描器：单层目录，按访问时间筛选
#[derive(Debug, Clone, Copy)]
pub struct FileScanner {
    cutoff: NaiveDateTime,
}

impl FileScanner {
    pub fn new(cutoff: NaiveDateTime) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> NaiveDateTime {
        self.cutoff
    }

    /// 目录一律跳过；访问时间 >= cutoff 的文件才入选（相等也算）
    pub fn classify(&self, meta: &FileMeta) -> Option<SkipReason> {
        if meta.is_dir {
            Some(SkipReason::Directory)
        } else if meta.accessed < self.cutoff {
            Some(SkipReason::BeforeCutoff)
        } else {
            None
        }
    }

    /// 列出一次目录，然后逐个 stat；惰性、只能遍历一次
    pub fn scan<'a>(
        &'a self,
        storage: &'a dyn Storage,
        dir: &'a str,
    ) -> impl Stream<Item = Result<ScanEntry, SyncError>> + 'a {
        let listing = async move {
            let names = storage.list(dir).await.map_err(|e| SyncError::Enumeration {
                location: format!("{} ({})", dir, storage.name()),
                source: e,
            })?;
            debug!("{} 下共 {} 个条目", storage.name(), names.len());
            Ok::<_, SyncError>(stream::iter(names).map(Ok::<_, SyncError>))
        };

        stream::once(listing)
            .try_flatten()
            .and_then(move |name| async move {
                let path = join(dir, &name);
                let meta = storage
                    .stat(&path)
                    .await
                    .map_err(|e| SyncError::Enumeration {
                        location: format!("{} ({})", path, storage.name()),
                        source: e,
                    })?;
                Ok::<_, SyncError>((name, path, meta))
            })
            .map_ok(move |(name, path, meta)| match self.classify(&meta) {
                Some(reason) => {
                    debug!("跳过 {}: {:?}", name, reason);
                    ScanEntry::Skipped { name, reason }
                }
                None => ScanEntry::Selected(FileCandidate {
                    name,
                    source_path: path,
                    last_access_time: meta.accessed,
                    size_bytes: meta.size,
                    is_directory: false,
                }),
            })
    }

    /// 只返回入选文件
    pub fn candidates<'a>(
        &'a self,
        storage: &'a dyn Storage,
        dir: &'a str,
    ) -> impl Stream<Item = Result<FileCandidate, SyncError>> + 'a {
        self.scan(storage, dir)
            .try_filter_map(|entry| future::ready(Ok(entry.into_selected())))
    }
}
