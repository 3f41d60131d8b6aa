//! 时间窗口选择 - 把 `-H` / `YYYY-MM-DD HH:MM` 解析成截止时间
//!
//! 所有时间都按本地日历的 naive 时间比较，不做时区转换。
//! 相对形式在每次尝试开始时都会基于当前时间重新计算，
//! 所以重试时截止时间会比第一次尝试更晚。

use crate::error::SyncError;
use crate::report::Reporter;
use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// 绝对时间格式
pub const ABSOLUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// `-H` 允许的最大小时数（约一万年）
pub const MAX_HOURS_AGO: u32 = 24 * 366 * 10_000;

/// 截止时间配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CutoffSpec {
    /// 当前时间往前 N 小时
    HoursAgo(u32),
    /// 固定时间点
    Absolute(NaiveDateTime),
}

impl Default for CutoffSpec {
    fn default() -> Self {
        CutoffSpec::HoursAgo(1)
    }
}

impl CutoffSpec {
    /// 基于给定的当前时间计算截止时间，超出日期范围时返回配置错误
    pub fn resolve(&self, now: NaiveDateTime) -> Result<NaiveDateTime, SyncError> {
        match self {
            CutoffSpec::HoursAgo(hours) => TimeDelta::try_hours(i64::from(*hours))
                .and_then(|delta| now.checked_sub_signed(delta))
                .ok_or_else(|| {
                    SyncError::Config(format!(
                        "{} hours before {} is out of range",
                        hours, now
                    ))
                }),
            CutoffSpec::Absolute(at) => Ok(*at),
        }
    }
}

impl FromStr for CutoffSpec {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hours) = s.strip_prefix('-') {
            let hours = hours
                .trim()
                .parse::<u32>()
                .map_err(|e| SyncError::Config(format!("invalid relative time '{}': {}", s, e)))?;
            if hours > MAX_HOURS_AGO {
                return Err(SyncError::Config(format!(
                    "relative time '{}' exceeds {} hours",
                    s, MAX_HOURS_AGO
                )));
            }
            return Ok(CutoffSpec::HoursAgo(hours));
        }

        NaiveDateTime::parse_from_str(s.trim(), ABSOLUTE_FORMAT)
            .map(CutoffSpec::Absolute)
            .map_err(|e| {
                SyncError::Config(format!(
                    "invalid time '{}': expected \"YYYY-MM-DD HH:MM\" or \"-HOURS\" ({})",
                    s, e
                ))
            })
    }
}

impl fmt::Display for CutoffSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutoffSpec::HoursAgo(hours) => write!(f, "-{}", hours),
            CutoffSpec::Absolute(at) => write!(f, "{}", at.format(ABSOLUTE_FORMAT)),
        }
    }
}

impl TryFrom<String> for CutoffSpec {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CutoffSpec> for String {
    fn from(spec: CutoffSpec) -> Self {
        spec.to_string()
    }
}

/// 时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 本地墙上时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 计算本次尝试的截止时间并写入报告
pub fn select_window(
    spec: &CutoffSpec,
    clock: &dyn Clock,
    reporter: &Reporter,
) -> Result<NaiveDateTime, SyncError> {
    let now = clock.now();
    let cutoff = spec.resolve(now)?;
    debug!("截止时间: spec={}, now={}, cutoff={}", spec, now, cutoff);
    reporter.update(format!(
        "Processing files from time {}",
        cutoff.format("%Y-%m-%d %H:%M:%S")
    ));
    Ok(cutoff)
}
