//! SSH 远程执行
//!
//! 会话建立、SFTP 传输、shell/exec 执行与完成检测

pub mod completion;
pub mod escape;
pub mod executor;
pub mod runner;
pub mod sentinel;
pub mod transfer;
pub mod transport;

pub use completion::{Completion, CompletionWatcher, LineBuffer};
pub use escape::unescape_input;
pub use executor::{RusshSession, RusshTransport};
pub use runner::RemoteRunner;
pub use sentinel::{ScriptWrapper, SentinelMarker, STOP_LINE};
pub use transport::{
    ChannelEvent, CommandChannel, FileChannel, RemoteReader, RemoteSession, RemoteWriter,
    Transport,
};
