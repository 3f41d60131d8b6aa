//! SSH/SFTP 远程会话（russh + russh-sftp）

use super::{local_naive_from_unix, Connector, FileMeta, RemoteSession, Storage};
use crate::config::TransferConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use russh::client;
use russh::keys::ssh_key;
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// 已建立会话的空闲超时
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// 接受服务端主机密钥，只记录指纹
struct AcceptingHandler {
    host: String,
    port: u16,
}

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        info!(
            "服务端主机密钥 {}:{} {}",
            self.host,
            self.port,
            server_public_key.fingerprint(ssh_key::HashAlg::Sha256)
        );
        Ok(true)
    }
}

/// 通过密码认证建立 SFTP 会话
#[derive(Debug, Default, Clone, Copy)]
pub struct SftpConnector;

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self, config: &TransferConfig) -> Result<Box<dyn RemoteSession>> {
        Ok(Box::new(SftpStorage::connect(config).await?))
    }
}

/// 一个 SSH 连接上的 SFTP 会话
pub struct SftpStorage {
    sftp: SftpSession,
    handle: client::Handle<AcceptingHandler>,
    cwd: String,
    name: String,
}

impl SftpStorage {
    pub async fn connect(config: &TransferConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..Default::default()
        });
        let handler = AcceptingHandler {
            host: config.host.clone(),
            port: config.port,
        };

        debug!("连接 SSH 服务器 {}:{}", config.host, config.port);
        let addr = (config.host.as_str(), config.port);
        let mut handle = tokio::time::timeout(
            config.connect_timeout(),
            client::connect(ssh_config, addr, handler),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "SSH handshake timed out after {}s",
                config.connect_timeout_secs
            )
        })?
        .context("SSH handshake failed")?;

        let auth = handle
            .authenticate_password(&config.username, &config.password)
            .await
            .context("password authentication failed")?;
        if !auth.success() {
            bail!(
                "authentication rejected for user '{}' on {}:{}",
                config.username,
                config.host,
                config.port
            );
        }

        let channel = handle
            .channel_open_session()
            .await
            .context("failed to open session channel")?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .context("failed to request sftp subsystem")?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .context("failed to start sftp session")?;

        let cwd = sftp
            .canonicalize(".")
            .await
            .context("failed to resolve initial directory")?;
        debug!("SFTP 会话已建立, 初始目录: {}", cwd);

        Ok(Self {
            sftp,
            handle,
            cwd,
            name: format!("sftp://{}@{}:{}", config.username, config.host, config.port),
        })
    }

    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else if path.is_empty() || path == "." {
            self.cwd.clone()
        } else {
            format!("{}/{}", self.cwd.trim_end_matches('/'), path)
        }
    }
}

#[async_trait]
impl Storage for SftpStorage {
    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let full = self.resolve(dir);
        let entries = self
            .sftp
            .read_dir(&full)
            .await
            .with_context(|| format!("cannot list remote {}", full))?;

        Ok(entries
            .map(|entry| entry.file_name())
            .filter(|name| name != "." && name != "..")
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileMeta> {
        let full = self.resolve(path);
        let attrs = self
            .sftp
            .metadata(&full)
            .await
            .with_context(|| format!("cannot stat remote {}", full))?;

        let accessed = attrs
            .atime
            .or(attrs.mtime)
            .ok_or_else(|| anyhow!("server reported no access time for {}", full))?;

        Ok(FileMeta {
            size: attrs.size.unwrap_or(0),
            accessed: local_naive_from_unix(i64::from(accessed)),
            is_dir: attrs.is_dir(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl RemoteSession for SftpStorage {
    async fn change_dir(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let canonical = self
            .sftp
            .canonicalize(&target)
            .await
            .with_context(|| format!("cannot resolve remote directory {}", target))?;
        let attrs = self
            .sftp
            .metadata(&canonical)
            .await
            .with_context(|| format!("cannot stat remote directory {}", canonical))?;
        if !attrs.is_dir() {
            bail!("remote path {} is not a directory", canonical);
        }
        debug!("远程工作目录: {} -> {}", self.cwd, canonical);
        self.cwd = canonical;
        Ok(())
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let full = self.resolve(remote_path);
        let mut remote = self
            .sftp
            .open(&full)
            .await
            .with_context(|| format!("cannot open remote {}", full))?;
        let mut local = tokio::fs::File::create(local_path)
            .await
            .with_context(|| format!("cannot create {}", local_path.display()))?;

        let copied = tokio::io::copy(&mut remote, &mut local)
            .await
            .with_context(|| format!("copy {} -> {} failed", full, local_path.display()))?;
        local.flush().await?;
        if let Err(e) = remote.shutdown().await {
            warn!("关闭远程文件 {} 失败: {}", full, e);
        }
        Ok(copied)
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64> {
        let full = self.resolve(remote_path);
        let mut local = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("cannot open {}", local_path.display()))?;
        let mut remote = self
            .sftp
            .create(&full)
            .await
            .with_context(|| format!("cannot create remote {}", full))?;

        let copied = tokio::io::copy(&mut local, &mut remote)
            .await
            .with_context(|| format!("copy {} -> {} failed", local_path.display(), full))?;
        remote
            .shutdown()
            .await
            .with_context(|| format!("cannot finish writing remote {}", full))?;
        Ok(copied)
    }

    async fn close(&mut self) -> Result<()> {
        let sftp_result = self.sftp.close().await;
        let ssh_result = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;

        sftp_result.context("failed to close sftp session")?;
        ssh_result.context("failed to disconnect")?;
        Ok(())
    }

    fn as_storage(&self) -> &dyn Storage {
        self
    }
}
