use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use sftpsync_lib::cli::Cli;
use sftpsync_lib::logging::init_tracing;
use sftpsync_lib::storage::SftpConnector;
use sftpsync_lib::{Reporter, RunReport, SyncEngine, SyncError, TransferConfig};

/// 写入 JSON 摘要
fn write_summary(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// 日志文件无法打开时输出到 stderr 的内容；配置错误也只能写在这里
fn startup_failure_lines(
    log_path: &Path,
    log_error: &SyncError,
    config: &Result<TransferConfig, SyncError>,
) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", log_error, log_path.display())];
    if let Err(e) = config {
        lines.push(format!("Invalid configuration: {}", e));
    }
    lines
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse_normalized();
    init_tracing(&cli.log_config());

    let config = cli.to_config();

    let reporter = match Reporter::open(&cli.log_path) {
        Ok(r) => r,
        Err(e) => {
            let err = SyncError::from(e);
            tracing::error!("无法打开日志文件 {}: {:?}", cli.log_path.display(), err);
            for line in startup_failure_lines(&cli.log_path, &err, &config) {
                eprintln!("{}", line);
            }
            return ExitCode::FAILURE;
        }
    };
    // 任何退出路径都要刷新并关闭日志文件
    let reporter = scopeguard::guard(reporter, |r| r.close());

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("配置错误: {:?}", e);
            reporter.update(format!("Invalid configuration: {}", e));
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("配置: {:?}", config);

    let engine = SyncEngine::new(config, Arc::new(SftpConnector), (*reporter).clone());
    let report = engine.run().await;

    if let Some(path) = &cli.summary {
        if let Err(e) = write_summary(path, &report) {
            tracing::warn!("写入摘要失败 {}: {:#}", path.display(), e);
        }
    }

    ExitCode::from(report.exit_code() as u8)
}
