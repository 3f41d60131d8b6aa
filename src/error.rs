//! 错误类型
//!
//! 一次尝试（attempt）内的任何失败都会向上传播到重试控制器，
//! 只有 `Config` 不可重试。

use thiserror::Error;

/// 同步过程中的错误
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection to {host}:{port} failed: {source:#}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to enumerate {location}: {source:#}")]
    Enumeration {
        location: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Transfer of {file} failed: {source:#}")]
    Transfer {
        file: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Report sink error: {0}")]
    Report(#[from] std::io::Error),
}

impl SyncError {
    /// 配置错误在每次重试中都会以相同方式失败，因此不重试
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Config(_))
    }

    /// 稳定的错误类别名（用于运行报告）
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "config",
            SyncError::Connection { .. } => "connection",
            SyncError::Enumeration { .. } => "enumeration",
            SyncError::Transfer { .. } => "transfer",
            SyncError::Verification(_) => "verification",
            SyncError::Report(_) => "report",
        }
    }

    pub fn transfer(file: impl Into<String>, source: anyhow::Error) -> Self {
        SyncError::Transfer {
            file: file.into(),
            source,
        }
    }
}

/// 传输后大小校验失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("missing-remote: no {path} exists on remote")]
    MissingRemote { path: String },

    #[error("missing-local: no {path} exists on local")]
    MissingLocal { path: String },

    #[error("size-mismatch: local {local_path} is {local}, remote {remote_path} is {remote}")]
    SizeMismatch {
        local_path: String,
        local: u64,
        remote_path: String,
        remote: u64,
    },
}

impl VerificationError {
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::MissingRemote { .. } => "missing-remote",
            VerificationError::MissingLocal { .. } => "missing-local",
            VerificationError::SizeMismatch { .. } => "size-mismatch",
        }
    }

    /// 大小不一致时返回 (local, remote)
    pub fn sizes(&self) -> Option<(u64, u64)> {
        match self {
            VerificationError::SizeMismatch { local, remote, .. } => Some((*local, *remote)),
            _ => None,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
