//! 传输后大小校验
//!
//! 先 stat 远程，再 stat 本地，任何一边失败都视为文件缺失。

use crate::core::transfer::TransferPlan;
use crate::error::{SyncError, VerificationError};
use crate::report::Reporter;
use crate::storage::Storage;
use tracing::debug;

pub struct SizeVerifier<'a> {
    local: &'a dyn Storage,
    remote: &'a dyn Storage,
    reporter: &'a Reporter,
}

impl<'a> SizeVerifier<'a> {
    pub fn new(local: &'a dyn Storage, remote: &'a dyn Storage, reporter: &'a Reporter) -> Self {
        Self {
            local,
            remote,
            reporter,
        }
    }

    /// 比较两边大小，一致时返回该大小
    pub async fn verify(&self, local_path: &str, remote_path: &str) -> Result<u64, SyncError> {
        self.compare(local_path, local_path, remote_path).await
    }

    /// 本地存储以本地目录为根：按文件名 stat，报告中显示完整路径
    pub async fn verify_plan(&self, plan: &TransferPlan) -> Result<u64, SyncError> {
        self.compare(&plan.name, &plan.local_display(), &plan.remote_path)
            .await
    }

    async fn compare(
        &self,
        local_path: &str,
        local_label: &str,
        remote_path: &str,
    ) -> Result<u64, SyncError> {
        let remote_size = match self.remote.stat(remote_path).await {
            Ok(meta) => meta.size,
            Err(e) => {
                debug!("远程 stat 失败 {}: {:#}", remote_path, e);
                self.reporter
                    .update(format!("No {} exists on remote", remote_path));
                return Err(VerificationError::MissingRemote {
                    path: remote_path.to_string(),
                }
                .into());
            }
        };

        let local_size = match self.local.stat(local_path).await {
            Ok(meta) => meta.size,
            Err(e) => {
                debug!("本地 stat 失败 {}: {:#}", local_path, e);
                self.reporter
                    .update(format!("No {} exists on local", local_label));
                return Err(VerificationError::MissingLocal {
                    path: local_label.to_string(),
                }
                .into());
            }
        };

        if local_size == remote_size {
            self.reporter.update(format!(
                "File sizes for {} and {} match ({})",
                local_label, remote_path, local_size
            ));
            Ok(local_size)
        } else {
            self.reporter.update(format!(
                "Mismatching files sizes: local {} is {}, remote {} is {}",
                local_label, local_size, remote_path, remote_size
            ));
            Err(VerificationError::SizeMismatch {
                local_path: local_label.to_string(),
                local: local_size,
                remote_path: remote_path.to_string(),
                remote: remote_size,
            }
            .into())
        }
    }
}
