//! 运行报告 - 带时间戳的进度行，写入日志文件并回显到控制台
//!
//! 格式: `OPENBRIDGE[<ISO-8601 时间>]: <消息>`

use crate::logging::AppendLogFile;
use chrono::{Local, NaiveDateTime};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

pub const REPORT_PREFIX: &str = "OPENBRIDGE";

/// 生成一行报告
pub fn format_line(at: NaiveDateTime, message: &str) -> String {
    format!(
        "{}[{}]: {}",
        REPORT_PREFIX,
        at.format("%Y-%m-%dT%H:%M:%S%.6f"),
        message
    )
}

struct ReporterInner {
    sink: Mutex<Option<Box<dyn Write + Send>>>,
    echo_stdout: bool,
    /// 本次运行输出过的所有行（跨尝试累计）
    history: Mutex<Vec<String>>,
}

/// 报告器，显式传递给每个组件
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<ReporterInner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Reporter {
    /// 追加写入 `log_path` 并回显到 stdout
    pub fn open(log_path: &Path) -> io::Result<Self> {
        let file = AppendLogFile::open(log_path)?;
        Ok(Self::with_sink(Box::new(file), true))
    }

    pub fn with_sink(sink: Box<dyn Write + Send>, echo_stdout: bool) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                sink: Mutex::new(Some(sink)),
                echo_stdout,
                history: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 只保存在内存中
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                sink: Mutex::new(None),
                echo_stdout: false,
                history: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 输出一条报告
    pub fn update(&self, message: impl AsRef<str>) {
        let line = format_line(Local::now().naive_local(), message.as_ref());

        if self.inner.echo_stdout {
            println!("{}", line);
        }

        {
            let mut sink = lock(&self.inner.sink);
            if let Some(w) = sink.as_mut() {
                if let Err(e) = writeln!(w, "{}", line) {
                    warn!("写入报告日志失败: {}", e);
                }
            }
        }

        lock(&self.inner.history).push(line);
    }

    /// 仅输出到控制台，不写入日志文件
    pub fn console(&self, message: impl AsRef<str>) {
        if self.inner.echo_stdout {
            println!("{}", message.as_ref());
        }
    }

    /// 已输出的所有报告行
    pub fn lines(&self) -> Vec<String> {
        lock(&self.inner.history).clone()
    }

    /// 统计消息以 `prefix` 开头的报告行数
    pub fn count_messages(&self, prefix: &str) -> usize {
        lock(&self.inner.history)
            .iter()
            .filter_map(|line| line.split_once("]: ").map(|(_, msg)| msg))
            .filter(|msg| msg.starts_with(prefix))
            .count()
    }

    /// 刷新并释放日志文件
    pub fn close(&self) {
        if let Some(mut w) = lock(&self.inner.sink).take() {
            if let Err(e) = w.flush() {
                warn!("关闭报告日志失败: {}", e);
            }
        }
    }
}
