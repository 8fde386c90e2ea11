//! 统一错误模型
//!
//! 远程操作失败时只有一种领域错误，变体标明失败的阶段，并携带底层原因的描述

/// 远程操作错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("SSH connection error: {0}")]
    SshConnectionError(String),

    #[error("SSH authentication failed: {0}")]
    SshAuthenticationError(String),

    #[error("SSH channel error: {0}")]
    SshChannelError(String),

    #[error("SFTP error: {0}")]
    SftpError(String),

    #[error("SSH execution error: {0}")]
    SshExecutionError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl AppError {
    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::SshConnectionError(_) => "SSH connection failed".to_string(),
            AppError::SshAuthenticationError(_) => "SSH authentication failed".to_string(),
            AppError::SshChannelError(_) => "SSH channel could not be opened".to_string(),
            AppError::SftpError(_) => "SFTP transfer failed".to_string(),
            AppError::SshExecutionError(_) => "SSH command execution failed".to_string(),
            AppError::Timeout(msg) => format!("Operation timed out: {}", msg),
            AppError::IoError(msg) => format!("IO error: {}", msg),
        }
    }

    /// 超时类错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout(_))
    }

    // 便捷方法
    pub fn validation(msg: &str) -> Self {
        AppError::Validation(msg.to_string())
    }

    pub fn connection(msg: &str) -> Self {
        AppError::SshConnectionError(msg.to_string())
    }

    pub fn channel(msg: &str) -> Self {
        AppError::SshChannelError(msg.to_string())
    }

    pub fn sftp(msg: &str) -> Self {
        AppError::SftpError(msg.to_string())
    }

    pub fn execution(msg: &str) -> Self {
        AppError::SshExecutionError(msg.to_string())
    }

    pub fn timeout(msg: &str) -> Self {
        AppError::Timeout(msg.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 从 std::io::Error 转换
impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            AppError::Timeout(e.to_string())
        } else {
            AppError::IoError(e.to_string())
        }
    }
}
