//! SSH 连接参数模型
//!
//! 连接参数、凭据组与运行选项，可被库和命令行入口共享

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// 主机密钥验证策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// 严格模式：只接受已知的主机密钥
    #[default]
    Strict,
    /// 接受模式：已知主机校验指纹，未知主机接受并记录指纹（必须显式开启）
    Accept,
    /// 禁用验证（接受任何主机密钥，必须显式开启）
    Disabled,
}

impl std::str::FromStr for HostKeyVerification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "accept" => Ok(Self::Accept),
            "disabled" | "none" | "false" | "no" => Ok(Self::Disabled),
            _ => Err(format!("Unknown host key verification mode: {}", s)),
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

/// SSH 连接参数
///
/// 构造后不可变；凭据使用 `Secret` 包装，`Debug` 与 `Display` 都不会输出明文。
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionParameters {
    host: String,

    #[serde(default = "default_ssh_port")]
    port: u16,

    username: String,

    credential: Secret<String>,

    /// TCP 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    connect_timeout_secs: u64,

    /// 握手与认证超时（秒）
    #[serde(default = "default_connect_timeout")]
    handshake_timeout_secs: u64,

    #[serde(default)]
    host_key_verification: HostKeyVerification,

    /// 已知主机指纹，键为 `host:port`，值为 SHA-256 十六进制指纹
    #[serde(default)]
    known_hosts: Option<HashMap<String, String>>,
}

impl ConnectionParameters {
    /// 创建使用密码认证的连接参数
    pub fn new(host: String, port: u16, username: String, credential: Secret<String>) -> Self {
        Self {
            host,
            port,
            username,
            credential,
            connect_timeout_secs: default_connect_timeout(),
            handshake_timeout_secs: default_connect_timeout(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts: None,
        }
    }

    /// 明文密码的便捷构造
    pub fn with_password(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self::new(
            host.to_string(),
            port,
            username.to_string(),
            Secret::new(password.to_string()),
        )
    }

    pub fn with_connect_timeout(mut self, timeout_secs: u64) -> Self {
        self.connect_timeout_secs = timeout_secs;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout_secs: u64) -> Self {
        self.handshake_timeout_secs = timeout_secs;
        self
    }

    pub fn with_host_key_verification(mut self, verification: HostKeyVerification) -> Self {
        self.host_key_verification = verification;
        self
    }

    /// 登记一个已知主机指纹
    pub fn with_known_host(mut self, fingerprint: &str) -> Self {
        let key = self.host_key();
        self.known_hosts
            .get_or_insert_with(HashMap::new)
            .insert(key, fingerprint.to_lowercase());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn credential(&self) -> &Secret<String> {
        &self.credential
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn host_key_verification(&self) -> &HostKeyVerification {
        &self.host_key_verification
    }

    /// 查询已知主机指纹
    pub fn known_fingerprint(&self) -> Option<&str> {
        self.known_hosts
            .as_ref()
            .and_then(|hosts| hosts.get(&self.host_key()))
            .map(String::as_str)
    }

    /// known_hosts 的键
    pub fn host_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 获取目标地址字符串
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// 校验参数合法性
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("Port must be between 1 and 65535".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("Username must not be empty".to_string());
        }
        if self.connect_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return Err("Connect and handshake timeouts must be positive".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Server Info [{} ,{},{},***]",
            self.host, self.port, self.username
        )
    }
}

/// 凭据组：同一组服务器共享端口、用户名和密码
#[derive(Debug, Clone, Deserialize)]
pub struct ServerGroup {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub username: String,

    pub password: Secret<String>,
}

impl ServerGroup {
    pub fn new(name: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            name: name.to_string(),
            port,
            username: username.to_string(),
            password: Secret::new(password.to_string()),
        }
    }

    /// 创建用于特定主机的连接参数
    pub fn for_host(&self, host: &str) -> ConnectionParameters {
        ConnectionParameters::new(
            host.to_string(),
            self.port,
            self.username.clone(),
            Secret::new(self.password.expose_secret().clone()),
        )
    }
}

fn default_channel_ready_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_command_timeout() -> u64 {
    3600
}

fn default_chunk_size() -> usize {
    2048
}

fn default_remote_file_mode() -> u32 {
    0o777
}

/// 默认的环境准备脚本，使远端环境与登录 shell 一致
pub const DEFAULT_PROFILE_PROLOGUE: &str =
    "source /etc/profile;source ~/.bash_profile;source ~/.bashrc\n";

fn default_profile_prologue() -> String {
    DEFAULT_PROFILE_PROLOGUE.to_string()
}

/// 运行选项
///
/// 超时为 0 表示不限制。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerOptions {
    /// 等待 shell/exec/sftp 请求确认的超时（秒）
    #[serde(default = "default_channel_ready_timeout")]
    pub channel_ready_timeout_secs: u64,

    /// 远端无任何输出的最长时间（秒）
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// 单次命令执行的总超时（秒）
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// 上传分块大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// 上传文件的权限位
    #[serde(default = "default_remote_file_mode")]
    pub remote_file_mode: u32,

    /// 脚本前置的环境准备语句
    #[serde(default = "default_profile_prologue")]
    pub profile_prologue: String,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            channel_ready_timeout_secs: default_channel_ready_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            command_timeout_secs: default_command_timeout(),
            chunk_size: default_chunk_size(),
            remote_file_mode: default_remote_file_mode(),
            profile_prologue: default_profile_prologue(),
        }
    }
}

fn optional_duration(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl RunnerOptions {
    pub fn channel_ready_timeout(&self) -> Option<Duration> {
        optional_duration(self.channel_ready_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        optional_duration(self.idle_timeout_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        optional_duration(self.command_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 || self.chunk_size > 1024 * 1024 {
            return Err("chunk_size must be between 1 and 1048576".to_string());
        }
        if self.remote_file_mode > 0o7777 {
            return Err(format!(
                "remote_file_mode {:o} is not a valid permission mode",
                self.remote_file_mode
            ));
        }
        Ok(())
    }
}
