//! 执行结果模型
//!
//! 远程命令与文件传输成功时返回的摘要；完整记录以 transcript 为准

use serde::{Deserialize, Serialize};
use std::fmt;

/// 命令执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// 交互式 shell 通道，脚本作为标准输入
    Shell,
    /// 一次性 exec 通道，脚本作为命令
    Exec,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Shell => write!(f, "shell"),
            ExecutionMode::Exec => write!(f, "cmd"),
        }
    }
}

/// 执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// 执行方式
    pub mode: ExecutionMode,

    /// 远端上报的退出码（交互式 shell 通常在完成标记出现时尚未退出）
    pub exit_status: Option<u32>,

    /// 写入 transcript 的远端输出行数
    pub lines: usize,

    /// 执行时长（秒）
    pub duration_secs: f64,
}

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// 文件传输结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub direction: TransferDirection,

    /// 远端文件完整路径
    pub remote_path: String,

    /// 本地文件路径（上传时为调用方给出的文件名）
    pub local_path: String,

    /// 传输字节数
    pub bytes: u64,

    /// 传输时长（秒）
    pub duration_secs: f64,
}
