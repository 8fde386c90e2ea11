//! 远程操作运行器
//!
//! 每个公开操作独立建立会话和通道，结束时（无论成功与否）各关闭一次；
//! 诊断信息写入调用方的 transcript，错误原样返回。

use secrecy::ExposeSecret;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncRead;
use tracing::{error, info, instrument, warn};

use common::{
    AppError, ConnectionParameters, ExecutionMode, ExecutionResult, Result, RunnerOptions,
    ServerGroup, TransferDirection, TransferResult,
};

use super::completion::CompletionWatcher;
use super::executor::RusshTransport;
use super::sentinel::{ScriptWrapper, SentinelMarker};
use super::transfer::{self, Transferred};
use super::transport::{CommandChannel, FileChannel, RemoteSession, Transport};
use crate::transcript::{default_sanitizer, OutputSanitizer, Transcript, TranscriptSink};

/// 远程命令运行器
pub struct RemoteRunner<T: Transport = RusshTransport> {
    params: ConnectionParameters,
    options: RunnerOptions,
    transport: T,
    sanitizer: OutputSanitizer,
}

impl RemoteRunner<RusshTransport> {
    /// 使用 russh 传输创建运行器
    pub fn new(params: ConnectionParameters, options: RunnerOptions) -> Self {
        let transport = RusshTransport::new(&options);
        Self::with_transport(params, options, transport)
    }

    /// 使用凭据组连接指定主机
    pub fn for_group(group: &ServerGroup, host: &str, options: RunnerOptions) -> Self {
        Self::new(group.for_host(host), options)
    }
}

fn status_text(status: Option<u32>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

impl<T: Transport> RemoteRunner<T> {
    pub fn with_transport(params: ConnectionParameters, options: RunnerOptions, transport: T) -> Self {
        let sanitizer = default_sanitizer()
            .as_ref()
            .clone()
            .with_literal(params.credential().expose_secret());
        Self {
            params,
            options,
            transport,
            sanitizer,
        }
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn transcript<'a>(&'a self, sink: &'a mut dyn TranscriptSink) -> Transcript<'a> {
        Transcript::new(sink, &self.sanitizer)
    }

    /// 建立并认证会话
    ///
    /// 失败时写入 `create ssh session failed with ...`，认证失败的会话会先断开。
    pub async fn create_session(&self, transcript: &mut Transcript<'_>) -> Result<T::Session> {
        match self.open_session().await {
            Ok(session) => Ok(session),
            Err(e) => {
                error!(
                    host = %self.params.host(),
                    port = self.params.port(),
                    user = %self.params.username(),
                    error = %e,
                    "Failed to create SSH session"
                );
                transcript.line(format!("create ssh session failed with {}", self.params));
                transcript.line(e.to_string());
                Err(e)
            }
        }
    }

    async fn open_session(&self) -> Result<T::Session> {
        self.params.validate().map_err(AppError::Validation)?;

        let mut session = self.transport.connect(&self.params).await?;

        let authenticated = session
            .authenticate_password(
                self.params.username(),
                self.params.credential().expose_secret(),
            )
            .await;

        match authenticated {
            Ok(true) => {
                info!(
                    host = %self.params.host(),
                    port = self.params.port(),
                    user = %self.params.username(),
                    "SSH session established"
                );
                Ok(session)
            }
            Ok(false) => {
                self.disconnect(&mut session).await;
                Err(AppError::SshAuthenticationError(format!(
                    "server rejected credentials for {}",
                    self.params.target()
                )))
            }
            Err(e) => {
                self.disconnect(&mut session).await;
                Err(e)
            }
        }
    }

    async fn disconnect(&self, session: &mut T::Session) {
        if let Err(e) = session.disconnect().await {
            warn!(host = %self.params.host(), error = %e, "SSH disconnect failed");
        }
    }

    /// 连通性检测，失败只写入 transcript
    #[instrument(skip_all, fields(host = %self.params.host(), port = self.params.port()))]
    pub async fn test_connection(&self, sink: &mut dyn TranscriptSink) -> bool {
        let mut transcript = self.transcript(sink);
        match self.create_session(&mut transcript).await {
            Ok(mut session) => {
                self.disconnect(&mut session).await;
                info!("SSH connection test succeeded");
                true
            }
            Err(e) => {
                transcript.line("test ssh connection failed !");
                transcript.line(e.to_string());
                false
            }
        }
    }

    /// 上传到 `remote_dir/file_name`
    #[instrument(skip_all, fields(host = %self.params.host(), file_name = %file_name))]
    pub async fn upload_file<R>(
        &self,
        sink: &mut dyn TranscriptSink,
        file_name: &str,
        source: &mut R,
        remote_dir: &str,
    ) -> Result<TransferResult>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let started = Instant::now();
        let mut transcript = self.transcript(sink);

        let mut session = match self.create_session(&mut transcript).await {
            Ok(session) => session,
            Err(e) => return Err(self.sftp_failed(&mut transcript, e)),
        };

        let (outcome, status) = match session.open_sftp().await {
            Ok(mut channel) => {
                let outcome = transfer::upload(
                    channel.as_mut(),
                    file_name,
                    source,
                    remote_dir,
                    &self.options,
                )
                .await;
                let status = channel.exit_status();
                self.close_file_channel(channel.as_mut()).await;
                (outcome, Some(status))
            }
            Err(e) => (Err(e), None),
        };

        let outcome = match outcome {
            Ok(done) => {
                transcript.line(format!(
                    "upload file [{}] to remote [{}] success",
                    file_name, remote_dir
                ));
                Ok(done)
            }
            Err(e) => Err(self.sftp_failed(&mut transcript, e)),
        };
        if let Some(status) = status {
            transcript.line(format!("[GSSH]-SFTP exit status is {}", status_text(status)));
        }
        self.disconnect(&mut session).await;

        outcome.map(|done| self.transfer_result(TransferDirection::Upload, done, started))
    }

    /// 下载 `remote_file` 到 `local_folder/file_name`
    #[instrument(skip_all, fields(host = %self.params.host(), remote_file = %remote_file))]
    pub async fn download_file(
        &self,
        sink: &mut dyn TranscriptSink,
        remote_file: &str,
        local_folder: &Path,
        file_name: &str,
    ) -> Result<TransferResult> {
        let started = Instant::now();
        let mut transcript = self.transcript(sink);

        let mut session = match self.create_session(&mut transcript).await {
            Ok(session) => session,
            Err(e) => return Err(self.sftp_failed(&mut transcript, e)),
        };

        let (outcome, status) = match session.open_sftp().await {
            Ok(mut channel) => {
                let outcome = transfer::download(
                    channel.as_mut(),
                    remote_file,
                    local_folder,
                    file_name,
                    self.options.chunk_size,
                )
                .await;
                let status = channel.exit_status();
                self.close_file_channel(channel.as_mut()).await;
                (outcome, Some(status))
            }
            Err(e) => (Err(e), None),
        };

        let outcome = match outcome {
            Ok(done) => {
                transcript.line(format!(
                    "download remote file [{}] to local [{}] with file name [{}]",
                    remote_file,
                    local_folder.display(),
                    file_name
                ));
                Ok(done)
            }
            Err(e) => Err(self.sftp_failed(&mut transcript, e)),
        };
        if let Some(status) = status {
            transcript.line(format!("[GSSH]-SFTP exit status is {}", status_text(status)));
        }
        self.disconnect(&mut session).await;

        outcome.map(|done| self.transfer_result(TransferDirection::Download, done, started))
    }

    /// 以交互式 shell 执行脚本，脚本作为标准输入
    pub async fn execute_shell(
        &self,
        sink: &mut dyn TranscriptSink,
        script: &str,
    ) -> Result<ExecutionResult> {
        self.execute(sink, script, ExecutionMode::Shell).await
    }

    /// 以 exec 通道执行命令
    pub async fn execute_command(
        &self,
        sink: &mut dyn TranscriptSink,
        command: &str,
    ) -> Result<ExecutionResult> {
        self.execute(sink, command, ExecutionMode::Exec).await
    }

    #[instrument(skip_all, fields(host = %self.params.host(), mode = %mode))]
    async fn execute(
        &self,
        sink: &mut dyn TranscriptSink,
        input: &str,
        mode: ExecutionMode,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let mut transcript = self.transcript(sink);

        let wrapper = ScriptWrapper::new(&self.options.profile_prologue, SentinelMarker::new());
        let payload = wrapper.wrap(input);
        let watcher = CompletionWatcher::new(
            wrapper.marker().clone(),
            self.options.idle_timeout(),
            self.options.command_timeout(),
        );

        let mut session = match self.create_session(&mut transcript).await {
            Ok(session) => session,
            Err(e) => return Err(self.execution_failed(&mut transcript, mode, e)),
        };

        let opened = match mode {
            ExecutionMode::Shell => session.open_shell(&payload).await,
            ExecutionMode::Exec => {
                transcript.line("execute below commands:");
                transcript.line(&payload);
                session.open_exec(&payload).await
            }
        };

        let (outcome, opened) = match opened {
            Ok(mut channel) => {
                let outcome = watcher.watch(channel.as_mut(), &mut transcript).await;
                self.close_command_channel(channel.as_mut()).await;
                (outcome, true)
            }
            Err(e) => (Err(e), false),
        };

        let outcome = outcome.map_err(|e| self.execution_failed(&mut transcript, mode, e));
        if opened {
            let status = outcome.as_ref().ok().and_then(|done| done.exit_status);
            transcript.line(format!("[GSSH]-{} exit status is {}", mode, status_text(status)));
        }
        self.disconnect(&mut session).await;

        let completion = outcome?;
        let duration_secs = started.elapsed().as_secs_f64();
        info!(
            host = %self.params.host(),
            mode = %mode,
            lines = completion.lines,
            duration_secs,
            "Remote execution completed"
        );

        Ok(ExecutionResult {
            mode,
            exit_status: completion.exit_status,
            lines: completion.lines,
            duration_secs,
        })
    }

    async fn close_file_channel(&self, channel: &mut dyn FileChannel) {
        if let Err(e) = channel.close().await {
            warn!(error = %e, "SFTP channel close failed");
        }
    }

    async fn close_command_channel(&self, channel: &mut dyn CommandChannel) {
        if let Err(e) = channel.close().await {
            warn!(error = %e, "SSH channel close failed");
        }
    }

    fn sftp_failed(&self, transcript: &mut Transcript<'_>, e: AppError) -> AppError {
        error!(host = %self.params.host(), error = %e, "SFTP operation failed");
        transcript.line(format!("[GSSH - SFTP] Exception: {}", e));
        e
    }

    fn execution_failed(
        &self,
        transcript: &mut Transcript<'_>,
        mode: ExecutionMode,
        e: AppError,
    ) -> AppError {
        error!(host = %self.params.host(), mode = %mode, error = %e, "Remote execution failed");
        transcript.line(format!("[GSSH]-{} Exception: {}", mode, e));
        e
    }

    fn transfer_result(
        &self,
        direction: TransferDirection,
        done: Transferred,
        started: Instant,
    ) -> TransferResult {
        let duration_secs = started.elapsed().as_secs_f64();
        info!(
            host = %self.params.host(),
            direction = ?direction,
            bytes = done.bytes,
            duration_secs,
            "File transfer completed"
        );
        TransferResult {
            direction,
            remote_path: done.remote_path,
            local_path: done.local_path,
            bytes: done.bytes,
            duration_secs,
        }
    }
}
