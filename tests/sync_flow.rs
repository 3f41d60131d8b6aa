use std::fs::{File, FileTimes};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{Local, NaiveDate, NaiveDateTime};
use sftpsync_lib::core::{CutoffSpec, RunState, TransferResult};
use sftpsync_lib::storage::MemoryConnector;
use sftpsync_lib::{Direction, Reporter, RetryPolicy, SyncEngine, TransferConfig};

fn config(
    direction: Direction,
    local_dir: &Path,
    cutoff: CutoffSpec,
    attempts: u32,
) -> TransferConfig {
    TransferConfig {
        host: "sftp.partner.test".into(),
        port: 2222,
        username: "bridge".into(),
        password: "secret".into(),
        remote_dir: "/exchange".into(),
        local_dir: local_dir.to_path_buf(),
        direction,
        cutoff,
        retry: RetryPolicy::new(attempts, 0).unwrap(),
        connect_timeout_secs: 5,
    }
}

fn write_with_atime(path: &Path, data: &[u8], accessed: SystemTime) {
    std::fs::write(path, data).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_accessed(accessed))
        .unwrap();
}

fn days_ago(days: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(days * 24 * 3600)
}

fn jan(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

#[tokio::test]
async fn test_upload_only_recent_files() {
    let local = tempfile::tempdir().unwrap();
    for name in ["old1.csv", "old2.csv", "old3.csv"] {
        write_with_atime(&local.path().join(name), b"stale", days_ago(30));
    }
    for name in ["new1.csv", "new2.csv"] {
        write_with_atime(&local.path().join(name), b"fresh-data", SystemTime::now());
    }
    std::fs::create_dir(local.path().join("archive")).unwrap();

    let remote = MemoryConnector::new();
    remote.add_dir("/exchange");

    let log_dir = tempfile::tempdir().unwrap();
    let log_path = log_dir.path().join("logs").join("post.log");
    let reporter = Reporter::open(&log_path).unwrap();

    let engine = SyncEngine::new(
        config(Direction::Upload, local.path(), CutoffSpec::HoursAgo(1), 3),
        Arc::new(remote.clone()),
        reporter.clone(),
    );
    let report = engine.run().await;
    reporter.close();

    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(remote.puts(), 2);
    assert_eq!(remote.file("/exchange/new1.csv").unwrap(), b"fresh-data");
    assert_eq!(remote.file("/exchange/new2.csv").unwrap(), b"fresh-data");
    assert!(remote.file("/exchange/old1.csv").is_none());
    assert_eq!(remote.closes(), 1);

    let skipped = report.attempts[0]
        .files
        .iter()
        .filter(|f| matches!(f, TransferResult::Skipped { .. }))
        .count();
    assert_eq!(skipped, 4);

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.lines().all(|l| l.starts_with("OPENBRIDGE[") && l.contains("]: ")));
    assert!(log.contains("]: POST TRANSACTION STARTED"));
    assert!(log.contains("]: Connected to host sftp.partner.test on port 2222"));
    assert_eq!(log.matches("Successfully uploaded").count(), 2);
    assert!(log.contains("]: POST TRANSACTION ENDED"));
    assert!(!log.contains("Post Log:"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_ignores_non_utf8_local_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let local = tempfile::tempdir().unwrap();
    write_with_atime(&local.path().join("good.csv"), b"good", SystemTime::now());
    write_with_atime(
        &local.path().join(OsStr::from_bytes(b"caf\xe9.csv")),
        b"latin-1 name",
        SystemTime::now(),
    );

    let remote = MemoryConnector::new();
    remote.add_dir("/exchange");

    let engine = SyncEngine::new(
        config(Direction::Upload, local.path(), CutoffSpec::HoursAgo(1), 2),
        Arc::new(remote.clone()),
        Reporter::memory(),
    );
    let report = engine.run().await;

    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(remote.puts(), 1);
    assert_eq!(remote.file("/exchange/good.csv").unwrap(), b"good");
}

#[tokio::test]
async fn test_relative_local_dir() {
    let local = tempfile::tempdir_in(".").unwrap();
    write_with_atime(&local.path().join("rel.csv"), b"relative", SystemTime::now());
    let cwd = std::env::current_dir().unwrap();
    let relative = local
        .path()
        .strip_prefix(&cwd)
        .unwrap_or(local.path())
        .to_path_buf();
    assert!(relative.is_relative());

    let remote = MemoryConnector::new();
    remote.add_dir("/exchange");

    let reporter = Reporter::memory();
    let engine = SyncEngine::new(
        config(Direction::Upload, &relative, CutoffSpec::HoursAgo(1), 1),
        Arc::new(remote.clone()),
        reporter.clone(),
    );
    let report = engine.run().await;

    assert!(report.succeeded());
    assert_eq!(remote.file("/exchange/rel.csv").unwrap(), b"relative");
    assert_eq!(reporter.count_messages("File sizes for"), 1);
}

#[tokio::test]
async fn test_download_with_absolute_cutoff() {
    let local = tempfile::tempdir().unwrap();
    let remote = MemoryConnector::new();
    remote.add_file("/exchange/before.csv", "b", jan(1));
    remote.add_file("/exchange/boundary.csv", "exact", jan(5));
    remote.add_file("/exchange/after.csv", "after!", jan(9));
    remote.add_dir("/exchange/sub");

    let reporter = Reporter::memory();
    let engine = SyncEngine::new(
        config(Direction::Download, local.path(), CutoffSpec::Absolute(jan(5)), 1),
        Arc::new(remote.clone()),
        reporter.clone(),
    );
    let report = engine.run().await;

    assert!(report.succeeded());
    assert_eq!(remote.gets(), 2);
    assert_eq!(
        std::fs::read(local.path().join("boundary.csv")).unwrap(),
        b"exact"
    );
    assert_eq!(std::fs::read(local.path().join("after.csv")).unwrap(), b"after!");
    assert!(!local.path().join("before.csv").exists());
    assert!(!local.path().join("sub").exists());

    assert_eq!(
        reporter.count_messages("Processing files from time 2024-01-05 09:00:00"),
        1
    );
    assert_eq!(reporter.count_messages("Downloading"), 2);
    assert_eq!(reporter.count_messages("File sizes for"), 2);
    assert_eq!(reporter.count_messages("GET TRANSACTION ENDED"), 1);
}

#[tokio::test]
async fn test_connect_failures_then_success() {
    let local = tempfile::tempdir().unwrap();
    let remote = MemoryConnector::new();
    remote.add_file("/exchange/a.csv", "abc", jan(9));
    remote.fail_connects(2);

    let reporter = Reporter::memory();
    let engine = SyncEngine::new(
        config(Direction::Download, local.path(), CutoffSpec::Absolute(jan(1)), 5),
        Arc::new(remote.clone()),
        reporter.clone(),
    );
    let report = engine.run().await;

    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(report.attempt_index(), 3);
    assert_eq!(report.retries, 2);
    assert_eq!(reporter.count_messages("Waiting 0 seconds"), 2);
    assert_eq!(reporter.count_messages("Processing files from time"), 3);
    assert_eq!(remote.connects(), 1);
    assert_eq!(remote.closes(), 1);
    assert_eq!(report.attempts[0].error_category, Some("connection"));
    assert_eq!(report.files_transferred(), 1);
}

#[tokio::test]
async fn test_size_mismatch_exhausts_and_closes_every_session() {
    let local = tempfile::tempdir().unwrap();
    write_with_atime(&local.path().join("big.csv"), &[b'x'; 100], SystemTime::now());

    let remote = MemoryConnector::new();
    remote.add_dir("/exchange");
    remote.truncate_uploads(true);

    let reporter = Reporter::memory();
    let engine = SyncEngine::new(
        config(Direction::Upload, local.path(), CutoffSpec::HoursAgo(1), 2),
        Arc::new(remote.clone()),
        reporter.clone(),
    );
    let report = engine.run().await;

    assert_eq!(report.state, RunState::Exhausted);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(remote.connects(), 2);
    assert_eq!(remote.closes(), 2);
    assert_eq!(remote.puts(), 2);
    assert_eq!(report.files_transferred(), 0);
    assert!(report
        .attempts
        .iter()
        .all(|a| a.error_category == Some("verification")));
    assert_eq!(reporter.count_messages("Mismatching files sizes"), 2);
    assert_eq!(reporter.count_messages("Successfully uploaded"), 0);
    assert_eq!(reporter.count_messages("All 2 attempts failed"), 1);
}

#[tokio::test]
async fn test_retry_reselects_already_transferred_files() {
    let local = tempfile::tempdir().unwrap();
    let remote = MemoryConnector::new();
    remote.add_file("/exchange/a.csv", "aaa", jan(9));
    remote.add_file("/exchange/b.csv", "bbbb", jan(9));
    remote.fail_transfers_of("b.csv", 1);

    let reporter = Reporter::memory();
    let engine = SyncEngine::new(
        config(Direction::Download, local.path(), CutoffSpec::Absolute(jan(1)), 3),
        Arc::new(remote.clone()),
        reporter.clone(),
    );
    let report = engine.run().await;

    assert!(report.succeeded());
    assert_eq!(report.attempts.len(), 2);
    // 第一次: a 成功, b 失败; 第二次两个都重新传输
    assert_eq!(remote.gets(), 4);
    assert_eq!(reporter.count_messages("Successfully downloaded a.csv"), 2);
    assert_eq!(report.files_transferred(), 3);
    assert_eq!(remote.closes(), 2);

    let first = &report.attempts[0];
    assert_eq!(first.error_category, Some("transfer"));
    assert!(matches!(
        first.files.last(),
        Some(TransferResult::Failed { name, .. }) if name == "b.csv"
    ));
}

#[tokio::test]
async fn test_missing_remote_directory_fails_every_attempt() {
    let local = tempfile::tempdir().unwrap();
    let remote = MemoryConnector::new();

    let engine = SyncEngine::new(
        config(Direction::Upload, local.path(), CutoffSpec::HoursAgo(1), 2),
        Arc::new(remote.clone()),
        Reporter::memory(),
    );
    let report = engine.run().await;

    assert_eq!(report.state, RunState::Exhausted);
    assert_eq!(remote.closes(), 2);
    assert_eq!(report.attempts[1].error_category, Some("enumeration"));
}

#[tokio::test]
async fn test_summary_serializes_run() {
    let local = tempfile::tempdir().unwrap();
    let remote = MemoryConnector::new();
    remote.add_file("/exchange/a.csv", "abc", Local::now().naive_local());

    let engine = SyncEngine::new(
        config(Direction::Download, local.path(), CutoffSpec::HoursAgo(2), 1),
        Arc::new(remote),
        Reporter::memory(),
    );
    let report = engine.run().await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["state"], "succeeded");
    assert_eq!(json["direction"], "download");
    assert_eq!(json["maxAttempts"], 1);
    assert_eq!(json["attempts"][0]["files"][0]["name"], "a.csv");
    assert_eq!(json["attempts"][0]["files"][0]["bytes"], 3);
    assert!(json["runId"].as_str().is_some());
}
