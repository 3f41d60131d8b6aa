//! 命令行参数
//!
//! `-rn` / `-rd` 是多字符短参数，clap 不支持，解析前先改写成长参数。

use crate::config::{Direction, RetryPolicy, TransferConfig};
use crate::core::cutoff::CutoffSpec;
use crate::error::SyncError;
use crate::logging::LogConfig;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "One-way SFTP sync of recently accessed files with size verification"
)]
pub struct Cli {
    /// SFTP 主机
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// 远程目录
    pub remote_dir: String,
    /// 本地目录
    pub local_dir: PathBuf,
    /// get = 下载, post = 上传
    pub action: String,
    /// 报告日志文件（追加）
    pub log_path: PathBuf,

    /// `-H`（H 小时前）或 `YYYY-MM-DD HH:MM`
    #[arg(short = 't', long = "time", default_value = "-1", allow_hyphen_values = true)]
    pub time: String,

    #[arg(long = "retry_number", default_value_t = 5)]
    pub retry_number: u32,

    /// 两次尝试之间的等待秒数
    #[arg(long = "retry_delay", default_value_t = 60)]
    pub retry_delay: u64,

    /// 诊断日志级别（stderr）
    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    /// SSH 握手超时秒数
    #[arg(long = "connect-timeout", default_value_t = 30)]
    pub connect_timeout: u64,

    /// 运行结束后把 JSON 摘要写到此路径
    #[arg(long = "summary")]
    pub summary: Option<PathBuf>,
}

/// 把 `-rn` / `-rd`（含 `-rn=5` 形式）改写成 clap 能识别的长参数
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let Some(s) = arg.to_str() else {
                return arg;
            };
            for (short, long) in [("-rn", "--retry_number"), ("-rd", "--retry_delay")] {
                if s == short {
                    return OsString::from(long);
                }
                if let Some(value) = s.strip_prefix(short).and_then(|r| r.strip_prefix('=')) {
                    return OsString::from(format!("{}={}", long, value));
                }
            }
            arg
        })
        .collect()
}

impl Cli {
    /// 从进程参数解析，出错时由 clap 打印用法并退出
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    pub fn try_parse_normalized<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::with_level(&self.log_level)
    }

    /// 构建并校验传输配置；时间格式错误在这里就是致命错误
    pub fn to_config(&self) -> Result<TransferConfig, SyncError> {
        let direction: Direction = self.action.parse()?;
        let cutoff: CutoffSpec = self.time.parse()?;
        let retry = RetryPolicy::new(self.retry_number, self.retry_delay)?;

        let config = TransferConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone(),
            password: self.password.clone(),
            remote_dir: self.remote_dir.clone(),
            local_dir: self.local_dir.clone(),
            direction,
            cutoff,
            retry,
            connect_timeout_secs: self.connect_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const BASE: [&str; 9] = [
        "sftpsync", "sftp.example.com", "2222", "bridge", "pw", "/outbox", "./data", "post",
        "sync.log",
    ];

    fn parse(extra: &[&str]) -> Cli {
        let args: Vec<&str> = BASE.iter().chain(extra.iter()).copied().collect();
        Cli::try_parse_normalized(args).unwrap()
    }

    #[test]
    fn test_normalize_multichar_flags() {
        let args = normalize_args(["x", "-rn", "3", "-rd=10", "-t", "-2", "-rnx"]);
        assert_eq!(
            args,
            vec!["x", "--retry_number", "3", "--retry_delay=10", "-t", "-2", "-rnx"]
        );
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.port, 2222);
        assert_eq!(cli.time, "-1");
        assert_eq!(cli.retry_number, 5);
        assert_eq!(cli.retry_delay, 60);
        assert_eq!(cli.log_level, "warn");
        assert!(cli.summary.is_none());

        let config = cli.to_config().unwrap();
        assert_eq!(config.direction, Direction::Upload);
        assert_eq!(config.cutoff, CutoffSpec::HoursAgo(1));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.connect_timeout_secs, 30);
    }

    #[test]
    fn test_short_and_long_options() {
        let cli = parse(&["-t", "-3", "-rn", "2", "-rd", "5", "--summary", "out.json"]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.cutoff, CutoffSpec::HoursAgo(3));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.retry_delay_secs, 5);
        assert_eq!(cli.summary, Some(PathBuf::from("out.json")));

        let cli = parse(&["--time", "2024-03-01 08:30", "--retry_number=1"]);
        let config = cli.to_config().unwrap();
        assert_eq!(
            config.cutoff,
            CutoffSpec::Absolute(
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(8, 30, 0)
                    .unwrap()
            )
        );
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = parse(&["-t", "yesterday"]).to_config().unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(!err.is_retryable());

        let err = parse(&["-rn", "0"]).to_config().unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));

        let mut args = BASE.to_vec();
        args[7] = "push";
        let err = Cli::try_parse_normalized(args).unwrap().to_config().unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_missing_positional_is_rejected() {
        assert!(Cli::try_parse_normalized(BASE[..5].iter().copied()).is_err());
    }
}
