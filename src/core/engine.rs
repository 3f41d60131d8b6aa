use crate::config::{Direction, TransferConfig};
use crate::core::cutoff::{select_window, Clock, SystemClock};
use crate::core::retry::{AttemptError, RetryController, RunReport};
use crate::core::scanner::{FileScanner, ScanEntry};
use crate::core::transfer::{TransferExecutor, TransferResult};
use crate::core::verify::SizeVerifier;
use crate::error::SyncError;
use crate::report::Reporter;
use crate::storage::{Connector, LocalStorage, RemoteSession, Storage};
use chrono::NaiveDateTime;
use futures::TryStreamExt;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 同步引擎
pub struct SyncEngine {
    config: Arc<TransferConfig>,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    reporter: Reporter,
}

impl SyncEngine {
    pub fn new(
        config: TransferConfig,
        connector: Arc<dyn Connector>,
        reporter: Reporter,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            clock: Arc::new(SystemClock),
            reporter,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 带重试地运行整个同步
    pub async fn run(&self) -> RunReport {
        info!(
            "开始同步: {} {}:{} remote={} local={}",
            self.config.direction,
            self.config.host,
            self.config.port,
            self.config.remote_dir,
            self.config.local_dir.display()
        );

        let mut controller = RetryController::new(
            self.config.retry,
            self.config.direction,
            self.reporter.clone(),
        );
        let report = controller.run(|_| self.run_attempt()).await;

        info!(
            "同步结束: {:?}, {} 次尝试, {} 个文件",
            report.state,
            report.attempts.len(),
            report.files_transferred()
        );
        report
    }

    /// 一次完整尝试：计算截止时间 -> 连接 -> 筛选/传输/校验 -> 关闭
    ///
    /// 会话在成功和失败路径上都会关闭。
    pub async fn run_attempt(&self) -> Result<Vec<TransferResult>, AttemptError> {
        let config = &self.config;
        let cutoff = select_window(&config.cutoff, self.clock.as_ref(), &self.reporter)?;

        let mut session = self
            .connector
            .connect(config)
            .await
            .map_err(|e| SyncError::Connection {
                host: config.host.clone(),
                port: config.port,
                source: e,
            })?;

        let action = config.direction.action().to_uppercase();
        self.reporter
            .update(format!("{} TRANSACTION STARTED", action));
        self.reporter.update(format!(
            "Connected to host {} on port {}",
            config.host, config.port
        ));
        self.reporter.update(format!(
            "action={} local dir={} remote dir={}",
            config.direction,
            config.local_dir.display(),
            config.remote_dir
        ));

        let mut files = Vec::new();
        let result = self
            .transfer_all(session.as_mut(), cutoff, &mut files)
            .await;

        match session.close().await {
            Ok(()) => self
                .reporter
                .update(format!("Connection to host {} closed.", config.host)),
            Err(e) => warn!("关闭会话失败 {}: {:#}", session.name(), e),
        }

        match result {
            Ok(()) => {
                self.reporter
                    .update(format!("{} TRANSACTION ENDED", action));
                Ok(files)
            }
            Err(error) => Err(AttemptError { error, files }),
        }
    }

    async fn transfer_all(
        &self,
        session: &mut dyn RemoteSession,
        cutoff: NaiveDateTime,
        files: &mut Vec<TransferResult>,
    ) -> Result<(), SyncError> {
        let config = &self.config;
        session
            .change_dir(&config.remote_dir)
            .await
            .map_err(|e| SyncError::Enumeration {
                location: format!("remote directory {}", config.remote_dir),
                source: e,
            })?;
        let session: &dyn RemoteSession = session;

        let local = LocalStorage::new(&config.local_dir);
        let (source, banner) = match config.direction {
            Direction::Upload => (&local as &dyn Storage, "Post Log:"),
            Direction::Download => (session.as_storage(), "Get Log:"),
        };
        self.reporter.console(format!("\n{}", banner));

        let scanner = FileScanner::new(cutoff);
        let executor = TransferExecutor::new(
            session,
            config.direction,
            &config.local_dir,
            &config.remote_dir,
            &self.reporter,
        );
        let verifier = SizeVerifier::new(&local, session.as_storage(), &self.reporter);

        let mut entries = pin!(scanner.scan(source, "."));
        while let Some(entry) = entries.try_next().await? {
            let candidate = match entry {
                ScanEntry::Selected(candidate) => candidate,
                ScanEntry::Skipped { name, reason } => {
                    files.push(TransferResult::Skipped { name, reason });
                    continue;
                }
            };

            // 每个文件传输后立即校验，任何失败都中止本次尝试
            let outcome = match executor.execute(&candidate).await {
                Ok((plan, _)) => verifier.verify_plan(&plan).await.map(|size| (plan, size)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((plan, size)) => {
                    executor.report_success(&plan);
                    files.push(TransferResult::TransferredVerified {
                        name: candidate.name,
                        bytes: size,
                    });
                }
                Err(e) => {
                    files.push(TransferResult::Failed {
                        name: candidate.name,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        debug!(
            "本次尝试处理 {} 个条目, 截止时间 {}",
            files.len(),
            scanner.cutoff()
        );
        Ok(())
    }
}
