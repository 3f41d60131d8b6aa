//! 重试控制器
//!
//! 状态: Idle -> Attempting -> {Succeeded, Retrying, Exhausted}
//!
//! 每次尝试都是完整的 连接 -> 筛选 -> 传输 -> 校验 -> 关闭，
//! 尝试之间固定等待 `retry_delay_secs`。

use crate::config::{Direction, RetryPolicy};
use crate::core::transfer::TransferResult;
use crate::error::SyncError;
use crate::report::Reporter;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Idle,
    Attempting,
    Retrying,
    Succeeded,
    Exhausted,
}

/// 一次尝试失败，附带失败前已完成的文件
#[derive(Debug)]
pub struct AttemptError {
    pub error: SyncError,
    pub files: Vec<TransferResult>,
}

impl From<SyncError> for AttemptError {
    fn from(error: SyncError) -> Self {
        Self {
            error,
            files: Vec::new(),
        }
    }
}

/// 单次尝试的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub attempt_index: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<&'static str>,
    pub files: Vec<TransferResult>,
}

/// 整次运行的报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub direction: Direction,
    pub state: RunState,
    pub max_attempts: u32,
    pub retries: u32,
    pub attempts: Vec<AttemptOutcome>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    /// 成功为 0，否则为 1
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    /// 最后一次尝试的序号（从 1 开始）
    pub fn attempt_index(&self) -> u32 {
        self.last_outcome().map_or(0, |o| o.attempt_index)
    }

    pub fn last_outcome(&self) -> Option<&AttemptOutcome> {
        self.attempts.last()
    }

    /// 所有尝试中校验通过的文件数
    pub fn files_transferred(&self) -> usize {
        self.attempts
            .iter()
            .flat_map(|a| a.files.iter())
            .filter(|f| f.is_transferred())
            .count()
    }
}

pub struct RetryController {
    policy: RetryPolicy,
    direction: Direction,
    reporter: Reporter,
    state: RunState,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, direction: Direction, reporter: Reporter) -> Self {
        Self {
            policy,
            direction,
            reporter,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!("重试状态: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// 运行直到成功或用尽尝试次数
    pub async fn run<F, Fut>(&mut self, mut attempt: F) -> RunReport
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Vec<TransferResult>, AttemptError>>,
    {
        let started_at = Local::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut retries = 0;

        for index in 1..=max_attempts {
            self.transition(RunState::Attempting);
            self.reporter
                .update(format!("Attempt {} of {}", index, max_attempts));

            match attempt(index).await {
                Ok(files) => {
                    info!("第 {} 次尝试成功, {} 个文件", index, files.len());
                    attempts.push(AttemptOutcome {
                        attempt_index: index,
                        success: true,
                        error: None,
                        error_category: None,
                        files,
                    });
                    self.transition(RunState::Succeeded);
                    break;
                }
                Err(AttemptError { error: err, files }) => {
                    error!("第 {} 次尝试失败: {:?}", index, err);
                    self.reporter
                        .update(format!("Attempt {} failed: {}", index, err));
                    attempts.push(AttemptOutcome {
                        attempt_index: index,
                        success: false,
                        error: Some(err.to_string()),
                        error_category: Some(err.category()),
                        files,
                    });

                    if index == max_attempts {
                        self.transition(RunState::Exhausted);
                        break;
                    }
                    if !err.is_retryable() {
                        self.reporter
                            .update(format!("Not retrying after {} error", err.category()));
                        self.transition(RunState::Exhausted);
                        break;
                    }

                    self.transition(RunState::Retrying);
                    retries += 1;
                    self.reporter
                        .update(format!("Waiting {} seconds", self.policy.retry_delay_secs));
                    tokio::time::sleep(self.policy.delay()).await;
                }
            }
        }

        if self.state == RunState::Exhausted {
            self.reporter
                .update(format!("All {} attempts failed", attempts.len()));
        }

        RunReport {
            run_id: Uuid::new_v4(),
            direction: self.direction,
            state: self.state,
            max_attempts,
            retries,
            attempts,
            started_at,
            finished_at: Local::now(),
        }
    }
}
