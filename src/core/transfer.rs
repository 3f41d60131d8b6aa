//! 单文件传输

use crate::config::Direction;
use crate::core::scanner::{FileCandidate, SkipReason};
use crate::error::SyncError;
use crate::report::Reporter;
use crate::storage::RemoteSession;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 一个文件的源与目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPlan {
    pub direction: Direction,
    pub name: String,
    pub local_path: PathBuf,
    /// 相对于远程工作目录
    pub remote_path: String,
}

impl TransferPlan {
    pub fn new(direction: Direction, candidate: &FileCandidate, local_dir: &Path) -> Self {
        Self {
            direction,
            name: candidate.name.clone(),
            local_path: local_dir.join(&candidate.name),
            remote_path: candidate.name.clone(),
        }
    }

    pub fn local_display(&self) -> String {
        self.local_path.display().to_string()
    }
}

/// 单个文件的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TransferResult {
    TransferredVerified { name: String, bytes: u64 },
    Skipped { name: String, reason: SkipReason },
    Failed { name: String, error: String },
}

impl TransferResult {
    pub fn is_transferred(&self) -> bool {
        matches!(self, TransferResult::TransferredVerified { .. })
    }
}

/// 通过远程会话执行定向复制
pub struct TransferExecutor<'a> {
    session: &'a dyn RemoteSession,
    direction: Direction,
    local_dir: &'a Path,
    remote_dir: &'a str,
    reporter: &'a Reporter,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        session: &'a dyn RemoteSession,
        direction: Direction,
        local_dir: &'a Path,
        remote_dir: &'a str,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            session,
            direction,
            local_dir,
            remote_dir,
            reporter,
        }
    }

    /// 复制一个文件，失败时中止本次尝试
    pub async fn execute(
        &self,
        candidate: &FileCandidate,
    ) -> Result<(TransferPlan, u64), SyncError> {
        let plan = TransferPlan::new(self.direction, candidate, self.local_dir);

        let bytes = match self.direction {
            Direction::Upload => {
                self.reporter.update(format!(
                    "Uploading {} to {}",
                    plan.local_display(),
                    self.remote_dir
                ));
                self.session
                    .put(&plan.local_path, &plan.remote_path)
                    .await
                    .map_err(|e| SyncError::transfer(&plan.name, e))?
            }
            Direction::Download => {
                self.reporter.update(format!(
                    "Downloading {} to {}",
                    plan.remote_path,
                    self.local_dir.display()
                ));
                self.session
                    .get(&plan.remote_path, &plan.local_path)
                    .await
                    .map_err(|e| SyncError::transfer(&plan.name, e))?
            }
        };

        debug!("{} 复制完成: {} 字节", plan.name, bytes);
        Ok((plan, bytes))
    }

    /// 校验通过后报告成功
    pub fn report_success(&self, plan: &TransferPlan) {
        let message = match self.direction {
            Direction::Upload => {
                format!("Successfully uploaded {} to {}", plan.name, self.remote_dir)
            }
            Direction::Download => format!(
                "Successfully downloaded {} to {}",
                plan.name,
                self.local_dir.display()
            ),
        };
        self.reporter.update(message);
    }
}
