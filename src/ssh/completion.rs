//! 完成检测
//!
//! 逐个等待通道事件，把远端输出按行写入 transcript，
//! 直到标准输出中出现完成标记、通道提前结束或超时。

use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use common::{AppError, Result};

use super::sentinel::{SentinelMarker, STOP_LINE};
use super::transport::{ChannelEvent, CommandChannel};
use crate::transcript::Transcript;

/// 把字节流切分成行
///
/// 以 LF 分行，去掉行尾的 CR，非法 UTF-8 按替换字符解码。
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加数据，返回已完整的行
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let raw = std::mem::replace(&mut self.pending, rest);
            lines.push(decode_line(&raw[..pos]));
        }
        lines
    }

    /// 取出没有换行结尾的剩余内容
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// 检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// 标记出现前收到的退出码
    pub exit_status: Option<u32>,
    /// 写入 transcript 的远端输出行数（含标记行）
    pub lines: usize,
}

/// 等待完成标记
pub struct CompletionWatcher {
    marker: SentinelMarker,
    idle: Option<Duration>,
    overall: Option<Duration>,
}

enum Wait {
    Event(Option<ChannelEvent>),
    Idle,
    Overall,
}

impl CompletionWatcher {
    pub fn new(marker: SentinelMarker, idle: Option<Duration>, overall: Option<Duration>) -> Self {
        Self {
            marker,
            idle,
            overall,
        }
    }

    pub fn marker(&self) -> &SentinelMarker {
        &self.marker
    }

    pub async fn watch(
        &self,
        channel: &mut dyn CommandChannel,
        transcript: &mut Transcript<'_>,
    ) -> Result<Completion> {
        let deadline = self.overall.map(|limit| Instant::now() + limit);
        let mut stdout = LineBuffer::new();
        let mut stderr = LineBuffer::new();
        let mut exit_status = None;
        let mut lines = 0usize;

        loop {
            match self.next(channel, deadline).await {
                Wait::Event(Some(ChannelEvent::Stdout(data))) => {
                    for line in stdout.push(&data) {
                        transcript.remote(&line);
                        lines += 1;
                        if self.marker.matches(&line) {
                            transcript.line(STOP_LINE);
                            debug!(lines, "Completion marker received");
                            return Ok(Completion { exit_status, lines });
                        }
                    }
                }
                Wait::Event(Some(ChannelEvent::Stderr(data))) => {
                    for line in stderr.push(&data) {
                        transcript.remote(&line);
                        lines += 1;
                    }
                }
                Wait::Event(Some(ChannelEvent::ExitStatus(code))) => {
                    debug!(exit_status = code, "Remote process exited");
                    exit_status = Some(code);
                }
                Wait::Event(Some(ChannelEvent::Eof)) => {
                    // 没有换行结尾的最后一行也可能带着标记
                    if let Some(line) = stdout.finish() {
                        transcript.remote(&line);
                        lines += 1;
                        if self.marker.matches(&line) {
                            transcript.line(STOP_LINE);
                            return Ok(Completion { exit_status, lines });
                        }
                    }
                    // EOF 之后仍可能收到退出码，继续等待
                    lines += flush(&mut stderr, transcript);
                }
                Wait::Event(Some(ChannelEvent::Closed)) | Wait::Event(None) => {
                    lines += flush(&mut stdout, transcript) + flush(&mut stderr, transcript);
                    let status = exit_status
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "n/a".to_string());
                    warn!(exit_status = %status, "Channel closed without completion marker");
                    return Err(AppError::SshExecutionError(format!(
                        "channel closed before completion marker (exit status: {})",
                        status
                    )));
                }
                Wait::Idle => {
                    let secs = self.idle.map(|d| d.as_secs()).unwrap_or_default();
                    return Err(AppError::Timeout(format!(
                        "no output from remote for {}s",
                        secs
                    )));
                }
                Wait::Overall => {
                    let secs = self.overall.map(|d| d.as_secs()).unwrap_or_default();
                    return Err(AppError::Timeout(format!(
                        "command did not complete within {}s",
                        secs
                    )));
                }
            }
        }
    }

    async fn next(&self, channel: &mut dyn CommandChannel, deadline: Option<Instant>) -> Wait {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        if remaining == Some(Duration::ZERO) {
            return Wait::Overall;
        }

        // 取空闲超时与剩余总时长中较小者
        let (limit, on_timeout) = match (self.idle, remaining) {
            (Some(idle), Some(rest)) if rest < idle => (Some(rest), Wait::Overall),
            (Some(idle), _) => (Some(idle), Wait::Idle),
            (None, Some(rest)) => (Some(rest), Wait::Overall),
            (None, None) => (None, Wait::Idle),
        };

        match limit {
            Some(limit) => match timeout(limit, channel.next_event()).await {
                Ok(event) => Wait::Event(event),
                Err(_) => on_timeout,
            },
            None => Wait::Event(channel.next_event().await),
        }
    }
}

/// 写出不完整的尾行
fn flush(buffer: &mut LineBuffer, transcript: &mut Transcript<'_>) -> usize {
    match buffer.finish() {
        Some(line) => {
            transcript.remote(&line);
            1
        }
        None => 0,
    }
}
