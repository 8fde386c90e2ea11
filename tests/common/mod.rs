//! 测试公共模块
//! 提供内存中的 SSH 传输，统计连接与通道的打开/关闭次数

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use gssh::ssh::transport::{
    join_remote, ChannelEvent, CommandChannel, FileChannel, RemoteReader, RemoteSession,
    RemoteWriter, Transport,
};
use gssh::{AppError, ConnectionParameters, RemoteRunner, Result, RunnerOptions};

pub const TEST_PASSWORD: &str = "Tr0ub4dor&3";

/// 连接与通道计数
#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub auth_attempts: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub channel_opens: AtomicUsize,
    pub channel_closes: AtomicUsize,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn channel_opens(&self) -> usize {
        self.channel_opens.load(Ordering::SeqCst)
    }

    pub fn channel_closes(&self) -> usize {
        self.channel_closes.load(Ordering::SeqCst)
    }

    pub fn auth_attempts(&self) -> usize {
        self.auth_attempts.load(Ordering::SeqCst)
    }

    /// 每个会话、每个通道都恰好关闭一次
    pub fn assert_balanced(&self) {
        assert_eq!(self.connects(), self.disconnects(), "sessions not closed exactly once");
        assert_eq!(
            self.channel_opens(),
            self.channel_closes(),
            "channels not closed exactly once"
        );
    }
}

/// 远端行为
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// 连接阶段直接失败
    pub fail_connect: Option<AppError>,
    /// 服务端拒绝密码
    pub reject_auth: bool,
    /// 打开通道失败
    pub fail_channel_open: bool,
    /// 替代模拟 shell 的固定事件序列
    pub events: Option<Vec<ChannelEvent>>,
    /// 事件耗尽后挂起而不是结束
    pub hang_after_events: bool,
    /// 写入超过该字节数后写失败
    pub fail_write_after: Option<usize>,
}

/// 内存中的远端文件系统
#[derive(Debug, Default)]
pub struct RemoteFs {
    pub dirs: HashSet<String>,
    pub files: HashMap<String, Vec<u8>>,
    pub modes: HashMap<String, u32>,
    pub writes: Vec<usize>,
}

/// 内存 SSH 传输
#[derive(Clone)]
pub struct MockTransport {
    pub counters: Arc<Counters>,
    pub fs: Arc<Mutex<RemoteFs>>,
    pub payloads: Arc<Mutex<Vec<String>>>,
    pub sessions: Arc<Mutex<Vec<String>>>,
    pub behavior: MockBehavior,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let mut fs = RemoteFs::default();
        fs.dirs.insert("/".to_string());
        fs.dirs.insert("/opt/app".to_string());
        fs.dirs.insert("/tmp".to_string());

        Self {
            counters: Arc::new(Counters::default()),
            fs: Arc::new(Mutex::new(fs)),
            payloads: Arc::new(Mutex::new(Vec::new())),
            sessions: Arc::new(Mutex::new(Vec::new())),
            behavior,
        }
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn remote_file(&self, path: &str) -> Option<Vec<u8>> {
        self.fs.lock().unwrap().files.get(path).cloned()
    }

    pub fn put_remote_file(&self, path: &str, data: &[u8]) {
        self.fs
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), data.to_vec());
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Session = MockSession;

    async fn connect(&self, params: &ConnectionParameters) -> Result<MockSession> {
        if let Some(e) = &self.behavior.fail_connect {
            return Err(e.clone());
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().push(params.target());

        Ok(MockSession {
            counters: Arc::clone(&self.counters),
            fs: Arc::clone(&self.fs),
            payloads: Arc::clone(&self.payloads),
            behavior: self.behavior.clone(),
            expected_password: TEST_PASSWORD.to_string(),
        })
    }
}

pub struct MockSession {
    counters: Arc<Counters>,
    fs: Arc<Mutex<RemoteFs>>,
    payloads: Arc<Mutex<Vec<String>>>,
    behavior: MockBehavior,
    expected_password: String,
}

impl MockSession {
    fn open_channel(&self) -> Result<()> {
        if self.behavior.fail_channel_open {
            return Err(AppError::SshChannelError("administratively prohibited".to_string()));
        }
        self.counters.channel_opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn command_channel(&self, payload: &str) -> Box<dyn CommandChannel> {
        self.payloads.lock().unwrap().push(payload.to_string());
        let events = match &self.behavior.events {
            Some(events) => events.clone(),
            None => simulate_shell(payload),
        };
        Box::new(MockCommandChannel {
            events: events.into(),
            hang: self.behavior.hang_after_events,
            counters: Arc::clone(&self.counters),
        })
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn authenticate_password(&mut self, _username: &str, password: &str) -> Result<bool> {
        self.counters.auth_attempts.fetch_add(1, Ordering::SeqCst);
        Ok(!self.behavior.reject_auth && password == self.expected_password)
    }

    async fn open_shell(&mut self, payload: &str) -> Result<Box<dyn CommandChannel>> {
        self.open_channel()?;
        Ok(self.command_channel(payload))
    }

    async fn open_exec(&mut self, command: &str) -> Result<Box<dyn CommandChannel>> {
        self.open_channel()?;
        Ok(self.command_channel(command))
    }

    async fn open_sftp(&mut self) -> Result<Box<dyn FileChannel>> {
        self.open_channel()?;
        Ok(Box::new(MockFileChannel {
            fs: Arc::clone(&self.fs),
            cwd: String::new(),
            fail_write_after: self.behavior.fail_write_after,
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 极简 shell：只执行 `echo`，单引号按 shell 规则拼接
pub fn simulate_shell(payload: &str) -> Vec<ChannelEvent> {
    let mut events = Vec::new();
    for line in payload.lines() {
        let line = line.trim();
        if let Some(args) = line.strip_prefix("echo ") {
            let output = args.replace('\'', "");
            events.push(ChannelEvent::Stdout(format!("{}\n", output).into_bytes()));
        }
    }
    events.push(ChannelEvent::ExitStatus(0));
    events.push(ChannelEvent::Eof);
    events.push(ChannelEvent::Closed);
    events
}

pub struct MockCommandChannel {
    events: VecDeque<ChannelEvent>,
    hang: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl CommandChannel for MockCommandChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        match self.events.pop_front() {
            Some(event) => Some(event),
            None if self.hang => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.counters.channel_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockFileChannel {
    fs: Arc<Mutex<RemoteFs>>,
    cwd: String,
    fail_write_after: Option<usize>,
    counters: Arc<Counters>,
}

#[async_trait]
impl FileChannel for MockFileChannel {
    async fn change_dir(&mut self, dir: &str) -> Result<()> {
        let normalized = match dir.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        if !self.fs.lock().unwrap().dirs.contains(normalized) {
            return Err(AppError::SftpError(format!("No such file: {}", dir)));
        }
        self.cwd = normalized.to_string();
        Ok(())
    }

    fn resolve(&self, file_name: &str) -> String {
        join_remote(&self.cwd, file_name)
    }

    async fn create(&mut self, path: &str, mode: u32) -> Result<RemoteWriter> {
        let mut fs = self.fs.lock().unwrap();
        fs.files.insert(path.to_string(), Vec::new());
        fs.modes.insert(path.to_string(), mode);
        Ok(Box::new(MemoryWriter {
            fs: Arc::clone(&self.fs),
            path: path.to_string(),
            written: 0,
            fail_after: self.fail_write_after,
        }))
    }

    async fn open(&mut self, path: &str) -> Result<RemoteReader> {
        match self.fs.lock().unwrap().files.get(path) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(AppError::SftpError(format!("No such file: {}", path))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.counters.channel_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryWriter {
    fs: Arc<Mutex<RemoteFs>>,
    path: String,
    written: usize,
    fail_after: Option<usize>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if let Some(limit) = self.fail_after {
            if self.written + buf.len() > limit {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection lost",
                )));
            }
        }

        let mut fs = self.fs.lock().unwrap();
        fs.writes.push(buf.len());
        fs.files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        drop(fs);

        self.written += buf.len();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// 创建测试连接参数
pub fn test_params() -> ConnectionParameters {
    ConnectionParameters::with_password("10.0.0.5", 22, "deploy", TEST_PASSWORD)
}

/// 创建测试运行器
pub fn create_test_runner(transport: MockTransport) -> RemoteRunner<MockTransport> {
    RemoteRunner::with_transport(test_params(), RunnerOptions::default(), transport)
}
