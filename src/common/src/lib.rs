//! Common types shared between the gssh library and its command-line front end

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod error;
pub mod execution;
pub mod ssh;

pub use error::{AppError, Result};

pub use execution::{ExecutionMode, ExecutionResult, TransferDirection, TransferResult};

pub use ssh::{ConnectionParameters, HostKeyVerification, RunnerOptions, ServerGroup};
