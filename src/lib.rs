//! gssh：通过 SSH 在远端主机上传/下载文件、执行脚本
//! 输出逐行写入调用方提供的 transcript

pub mod config;
pub mod ssh;
pub mod telemetry;
pub mod transcript;

pub use common::{
    AppError, ConnectionParameters, ExecutionMode, ExecutionResult, HostKeyVerification, Result,
    RunnerOptions, ServerGroup, TransferDirection, TransferResult,
};
pub use ssh::RemoteRunner;
pub use transcript::{MemorySink, StdoutSink, Transcript, TranscriptSink};
