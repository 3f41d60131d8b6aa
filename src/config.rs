//! 传输配置

use crate::core::cutoff::CutoffSpec;
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 远程 -> 本地（命令行中的 `get`）
    #[serde(alias = "get")]
    Download,
    /// 本地 -> 远程（命令行中的 `post`）
    #[serde(alias = "post")]
    Upload,
}

impl Direction {
    /// 命令行动作名
    pub fn action(&self) -> &'static str {
        match self {
            Direction::Download => "get",
            Direction::Upload => "post",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

impl FromStr for Direction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" | "download" => Ok(Direction::Download),
            "post" | "upload" => Ok(Direction::Upload),
            other => Err(SyncError::Config(format!(
                "unknown action '{}', expected 'get' or 'post'",
                other
            ))),
        }
    }
}

/// 重试策略：固定间隔，最多 `max_attempts` 次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    60
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay_secs: u64) -> Result<Self, SyncError> {
        let policy = Self {
            max_attempts,
            retry_delay_secs,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "retry number must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// 一次运行的完整配置，构建后不再修改
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub remote_dir: String,
    pub local_dir: PathBuf,
    pub direction: Direction,
    #[serde(default)]
    pub cutoff: CutoffSpec,
    #[serde(flatten)]
    pub retry: RetryPolicy,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl TransferConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.host.trim().is_empty() {
            return Err(SyncError::Config("host must not be empty".to_string()));
        }
        if self.remote_dir.is_empty() {
            return Err(SyncError::Config(
                "remote directory must not be empty".to_string(),
            ));
        }
        self.retry.validate()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remote_dir", &self.remote_dir)
            .field("local_dir", &self.local_dir)
            .field("direction", &self.direction)
            .field("cutoff", &self.cutoff)
            .field("retry", &self.retry)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}
