//! 基于 russh 的 SSH 传输实现
//!
//! 负责 TCP 连接、握手、主机密钥校验、密码认证以及 shell/exec/sftp 通道；
//! 会话与通道的生命周期由运行器控制。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use async_trait::async_trait;
use russh::client;
use russh::client::{Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use sha2::Digest;

use common::{AppError, ConnectionParameters, HostKeyVerification, Result, RunnerOptions};

use super::transport::{
    join_remote, ChannelEvent, CommandChannel, FileChannel, RemoteReader, RemoteSession,
    RemoteWriter, Transport,
};

/// 生产环境使用的 SSH 传输
#[derive(Debug, Clone)]
pub struct RusshTransport {
    channel_ready_timeout: Option<Duration>,
}

impl RusshTransport {
    pub fn new(options: &RunnerOptions) -> Self {
        Self {
            channel_ready_timeout: options.channel_ready_timeout(),
        }
    }
}

impl Default for RusshTransport {
    fn default() -> Self {
        Self::new(&RunnerOptions::default())
    }
}

#[async_trait]
impl Transport for RusshTransport {
    type Session = RusshSession;

    async fn connect(&self, params: &ConnectionParameters) -> Result<RusshSession> {
        debug!(
            host = %params.host(),
            port = params.port(),
            user = %params.username(),
            "Opening SSH transport"
        );

        // 创建 SSH 客户端配置
        let client_config = Arc::new(Config {
            preferred: russh::Preferred::default(),
            ..Default::default()
        });

        let handler = HostKeyPolicy::new(params);
        let limit = params.connect_timeout() + params.handshake_timeout();

        let handle = timeout(
            limit,
            client::connect(
                client_config,
                (params.host().to_string(), params.port()),
                handler,
            ),
        )
        .await
        .map_err(|_| {
            AppError::Timeout(format!(
                "SSH connect/handshake to {} exceeded {}s",
                params.target(),
                limit.as_secs()
            ))
        })?
        .map_err(|e| {
            error!(error = %e, host = %params.host(), "SSH connection failed");
            if matches!(e, russh::Error::UnknownKey) {
                AppError::SshConnectionError(format!(
                    "host key rejected for {}: {}",
                    params.host_key(),
                    e
                ))
            } else {
                AppError::SshConnectionError(format!("{}: {}", params.host_key(), e))
            }
        })?;

        Ok(RusshSession {
            handle,
            ready_timeout: self.channel_ready_timeout,
            disconnected: false,
        })
    }
}

/// russh 会话
pub struct RusshSession {
    handle: Handle<HostKeyPolicy>,
    ready_timeout: Option<Duration>,
    disconnected: bool,
}

impl RusshSession {
    async fn open_session_channel(&mut self) -> Result<Channel<Msg>> {
        self.handle.channel_open_session().await.map_err(|e| {
            error!(error = %e, "打开SSH通道失败");
            AppError::SshChannelError(format!("failed to open session channel: {}", e))
        })
    }
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn authenticate_password(&mut self, username: &str, password: &str) -> Result<bool> {
        self.handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| AppError::SshAuthenticationError(e.to_string()))
    }

    async fn open_shell(&mut self, payload: &str) -> Result<Box<dyn CommandChannel>> {
        let mut channel = self.open_session_channel().await?;

        match start_shell(&mut channel, payload, self.ready_timeout).await {
            Ok(early) => Ok(Box::new(RusshCommandChannel::new(channel, early))),
            Err(e) => {
                let _ = channel.close().await;
                Err(e)
            }
        }
    }

    async fn open_exec(&mut self, command: &str) -> Result<Box<dyn CommandChannel>> {
        let mut channel = self.open_session_channel().await?;

        match start_exec(&mut channel, command, self.ready_timeout).await {
            Ok(early) => Ok(Box::new(RusshCommandChannel::new(channel, early))),
            Err(e) => {
                let _ = channel.close().await;
                Err(e)
            }
        }
    }

    async fn open_sftp(&mut self) -> Result<Box<dyn FileChannel>> {
        let mut channel = self.open_session_channel().await?;

        let requested = match channel.request_subsystem(true, "sftp").await {
            Ok(()) => await_reply(&mut channel, "sftp subsystem", self.ready_timeout).await,
            Err(e) => Err(AppError::SshChannelError(format!(
                "sftp subsystem request failed: {}",
                e
            ))),
        };
        if let Err(e) = requested {
            let _ = channel.close().await;
            return Err(e);
        }

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| AppError::SftpError(format!("sftp handshake failed: {}", e)))?;

        Ok(Box::new(RusshFileChannel {
            sftp,
            cwd: None,
            closed: false,
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.disconnected {
            return Ok(());
        }
        self.disconnected = true;

        self.handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await
            .map_err(|e| AppError::SshConnectionError(format!("disconnect failed: {}", e)))
    }
}

async fn start_shell(
    channel: &mut Channel<Msg>,
    payload: &str,
    ready_timeout: Option<Duration>,
) -> Result<Vec<ChannelEvent>> {
    channel
        .request_shell(true)
        .await
        .map_err(|e| AppError::SshChannelError(format!("shell request failed: {}", e)))?;
    let early = await_reply(channel, "shell", ready_timeout).await?;

    channel
        .data(payload.as_bytes())
        .await
        .map_err(|e| AppError::SshExecutionError(format!("failed to send script: {}", e)))?;
    channel
        .eof()
        .await
        .map_err(|e| AppError::SshExecutionError(format!("failed to send EOF: {}", e)))?;

    Ok(early)
}

async fn start_exec(
    channel: &mut Channel<Msg>,
    command: &str,
    ready_timeout: Option<Duration>,
) -> Result<Vec<ChannelEvent>> {
    channel.exec(true, command).await.map_err(|e| {
        error!(error = %e, "执行命令失败");
        AppError::SshExecutionError(format!("exec request failed: {}", e))
    })?;
    await_reply(channel, "exec", ready_timeout).await
}

/// 等待服务端对通道请求的确认
///
/// 确认之前到达的数据原样保留并返回，交给后续的事件读取。
async fn await_reply(
    channel: &mut Channel<Msg>,
    request: &str,
    limit: Option<Duration>,
) -> Result<Vec<ChannelEvent>> {
    let wait = async {
        let mut early = Vec::new();
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Success) => return Ok(early),
                Some(ChannelMsg::Failure) => {
                    return Err(AppError::SshChannelError(format!(
                        "server refused {} request",
                        request
                    )))
                }
                Some(ChannelMsg::Close) | None => {
                    return Err(AppError::SshChannelError(format!(
                        "channel closed while waiting for {} request",
                        request
                    )))
                }
                Some(msg) => {
                    if let Some(event) = convert_message(msg) {
                        early.push(event);
                    }
                }
            }
        }
    };

    match limit {
        Some(limit) => timeout(limit, wait).await.map_err(|_| {
            AppError::Timeout(format!(
                "{} request not confirmed within {}s",
                request,
                limit.as_secs()
            ))
        })?,
        None => wait.await,
    }
}

fn convert_message(msg: ChannelMsg) -> Option<ChannelEvent> {
    match msg {
        ChannelMsg::Data { ref data } => Some(ChannelEvent::Stdout(data.to_vec())),
        // SSH_EXTENDED_DATA_STDERR
        ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
            Some(ChannelEvent::Stderr(data.to_vec()))
        }
        ChannelMsg::ExitStatus { exit_status } => Some(ChannelEvent::ExitStatus(exit_status)),
        ChannelMsg::Eof => Some(ChannelEvent::Eof),
        ChannelMsg::Close => Some(ChannelEvent::Closed),
        _ => None,
    }
}

/// russh shell/exec 通道
struct RusshCommandChannel {
    channel: Channel<Msg>,
    pending: VecDeque<ChannelEvent>,
    closed: bool,
}

impl RusshCommandChannel {
    fn new(channel: Channel<Msg>, early: Vec<ChannelEvent>) -> Self {
        Self {
            channel,
            pending: early.into(),
            closed: false,
        }
    }
}

#[async_trait]
impl CommandChannel for RusshCommandChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        loop {
            let msg = self.channel.wait().await?;
            if let Some(event) = convert_message(msg) {
                return Some(event);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel
            .close()
            .await
            .map_err(|e| AppError::SshChannelError(format!("channel close failed: {}", e)))
    }
}

/// russh-sftp 文件通道
struct RusshFileChannel {
    sftp: SftpSession,
    cwd: Option<String>,
    closed: bool,
}

fn sftp_error(action: &str, path: &str, e: impl std::fmt::Display) -> AppError {
    AppError::SftpError(format!("{} {}: {}", action, path, e))
}

#[async_trait]
impl FileChannel for RusshFileChannel {
    async fn change_dir(&mut self, dir: &str) -> Result<()> {
        let resolved = self
            .sftp
            .canonicalize(dir)
            .await
            .map_err(|e| sftp_error("cannot resolve", dir, e))?;
        let attrs = self
            .sftp
            .metadata(&resolved)
            .await
            .map_err(|e| sftp_error("cannot stat", &resolved, e))?;
        if !attrs.is_dir() {
            return Err(AppError::SftpError(format!("{} is not a directory", resolved)));
        }

        debug!(dir = %resolved, "SFTP working directory changed");
        self.cwd = Some(resolved);
        Ok(())
    }

    fn resolve(&self, file_name: &str) -> String {
        join_remote(self.cwd.as_deref().unwrap_or(""), file_name)
    }

    async fn create(&mut self, path: &str, mode: u32) -> Result<RemoteWriter> {
        let file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| sftp_error("cannot create", path, e))?;

        let attrs = FileAttributes {
            size: None,
            uid: None,
            user: None,
            gid: None,
            group: None,
            permissions: Some(mode),
            atime: None,
            mtime: None,
        };
        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(|e| sftp_error("cannot chmod", path, e))?;

        Ok(Box::new(file))
    }

    async fn open(&mut self, path: &str) -> Result<RemoteReader> {
        let file = self
            .sftp
            .open_with_flags(path, OpenFlags::READ)
            .await
            .map_err(|e| sftp_error("cannot open", path, e))?;
        Ok(Box::new(file))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sftp
            .close()
            .await
            .map_err(|e| AppError::SftpError(format!("sftp close failed: {}", e)))
    }
}

/// SSH 客户端会话处理器，按策略校验主机密钥
struct HostKeyPolicy {
    verification_mode: HostKeyVerification,
    known_fingerprint: Option<String>,
    host_key: String,
}

impl HostKeyPolicy {
    fn new(params: &ConnectionParameters) -> Self {
        Self {
            verification_mode: params.host_key_verification().clone(),
            known_fingerprint: params.known_fingerprint().map(str::to_string),
            host_key: params.host_key(),
        }
    }

    /// 对照已知指纹；`None` 表示未登记
    fn verify(&self, fingerprint: &str) -> Option<bool> {
        let expected = self.known_fingerprint.as_deref()?;
        if expected == fingerprint {
            debug!(host = %self.host_key, "Host key verified");
            Some(true)
        } else {
            error!(
                host = %self.host_key,
                expected = %expected,
                actual = %fingerprint,
                "Host key mismatch - REJECTING CONNECTION"
            );
            Some(false)
        }
    }

    /// 按验证策略决定是否接受该指纹
    fn accepts(&self, fingerprint: &str) -> bool {
        match self.verification_mode {
            HostKeyVerification::Disabled => {
                warn!(
                    host = %self.host_key,
                    "Host key verification DISABLED - accepting all keys"
                );
                true
            }
            HostKeyVerification::Accept => match self.verify(fingerprint) {
                Some(accepted) => accepted,
                None => {
                    info!(
                        host = %self.host_key,
                        fingerprint = %fingerprint,
                        "Unknown host - accepting host key"
                    );
                    true
                }
            },
            HostKeyVerification::Strict => match self.verify(fingerprint) {
                Some(accepted) => accepted,
                None => {
                    error!(
                        host = %self.host_key,
                        fingerprint = %fingerprint,
                        "Unknown host in strict mode - rejecting connection"
                    );
                    false
                }
            },
        }
    }
}

/// 主机公钥的 SHA-256 十六进制指纹
fn fingerprint(key: &PublicKey) -> String {
    let key_data = key.public_key_base64();
    let mut hasher = sha2::Sha256::new();
    hasher.update(key_data.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.accepts(&fingerprint(server_public_key)))
    }
}
