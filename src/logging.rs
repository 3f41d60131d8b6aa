//! 日志模块 - 诊断日志（tracing）与报告日志文件写入器

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;

/// 诊断日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 是否输出 ANSI 颜色
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_level() -> String {
    "warn".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            ansi: default_ansi(),
        }
    }
}

impl LogConfig {
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "info" => tracing::Level::INFO,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::WARN,
        }
    }
}

/// 初始化诊断日志（输出到 stderr，stdout 留给运行报告）
pub fn init_tracing(config: &LogConfig) {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into());
    // russh 的握手细节太多，最多显示警告
    for directive in ["russh=warn", "russh_sftp=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 追加模式的日志文件写入器，每次写入后立即刷新
pub struct AppendLogFile {
    file_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AppendLogFile {
    pub fn open(file_path: &Path) -> io::Result<Self> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            file_path: file_path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// 刷新并关闭文件，之后的写入会失败
    pub fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl Write for AppendLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => {
                let written = writer.write(buf)?;
                writer.flush()?;
                Ok(written)
            }
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("log file {} already closed", self.file_path.display()),
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for AppendLogFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
