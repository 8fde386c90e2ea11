//! SSH 传输抽象
//!
//! 运行器只依赖这些 trait；生产实现见 [`super::executor::RusshTransport`]，
//! 测试使用内存实现统计连接与通道的打开/关闭次数。

use async_trait::async_trait;
use common::{ConnectionParameters, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// 命令通道上的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// 标准输出数据
    Stdout(Vec<u8>),
    /// 标准错误数据
    Stderr(Vec<u8>),
    /// 远端进程退出码
    ExitStatus(u32),
    /// 远端不再发送数据
    Eof,
    /// 通道已关闭
    Closed,
}

/// 远端可写文件
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 远端可读文件
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// 建立到远端主机的传输
#[async_trait]
pub trait Transport: Send + Sync {
    type Session: RemoteSession;

    /// 完成 TCP 连接与 SSH 握手（含主机密钥校验），尚未认证
    async fn connect(&self, params: &ConnectionParameters) -> Result<Self::Session>;
}

/// 已建立的会话，由创建它的操作独占
#[async_trait]
pub trait RemoteSession: Send {
    /// 密码认证；`Ok(false)` 表示服务端拒绝
    async fn authenticate_password(&mut self, username: &str, password: &str) -> Result<bool>;

    /// 打开交互式 shell（不分配 PTY），并把 `payload` 作为其标准输入
    async fn open_shell(&mut self, payload: &str) -> Result<Box<dyn CommandChannel>>;

    /// 打开 exec 通道（不分配 PTY），以 `command` 作为命令
    async fn open_exec(&mut self, command: &str) -> Result<Box<dyn CommandChannel>>;

    /// 打开 sftp 子系统
    async fn open_sftp(&mut self) -> Result<Box<dyn FileChannel>>;

    /// 断开会话
    async fn disconnect(&mut self) -> Result<()>;
}

/// shell/exec 通道
#[async_trait]
pub trait CommandChannel: Send {
    /// 等待下一个事件；`None` 表示通道已结束
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn close(&mut self) -> Result<()>;
}

/// sftp 通道
#[async_trait]
pub trait FileChannel: Send {
    /// 切换远端工作目录，目录必须存在
    async fn change_dir(&mut self, dir: &str) -> Result<()>;

    /// 当前远端工作目录下的完整路径
    fn resolve(&self, file_name: &str) -> String;

    /// 创建（或截断）远端文件并设置权限位
    async fn create(&mut self, path: &str, mode: u32) -> Result<RemoteWriter>;

    /// 打开远端文件读取
    async fn open(&mut self, path: &str) -> Result<RemoteReader>;

    /// 通道退出码（sftp 子系统通常没有）
    fn exit_status(&self) -> Option<u32> {
        None
    }

    async fn close(&mut self) -> Result<()>;
}

/// 拼接远端目录与文件名
pub fn join_remote(dir: &str, file_name: &str) -> String {
    if dir.is_empty() {
        file_name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, file_name)
    } else {
        format!("{}/{}", dir, file_name)
    }
}
