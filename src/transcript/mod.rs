//! 构建日志（transcript）
//!
//! 调用方提供只追加、按行写入的输出目标；诊断信息与远端输出交错写入。
//! 诊断行写入前经过脱敏，远端输出原样写入。

pub mod sanitize;

use std::io::Write;
use std::sync::{Arc, Mutex};

pub use sanitize::{default_sanitizer, OutputSanitizer, SanitizeRule};

/// 按行写入的输出目标
pub trait TranscriptSink: Send {
    fn write_line(&mut self, line: &str);
}

/// 写到标准输出
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl TranscriptSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        // 标准输出关闭时无处可写，忽略错误
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

/// 内存中的 transcript，克隆后共享同一缓冲区
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有行的快照
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 以换行连接的全文
    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }
}

impl TranscriptSink for MemorySink {
    fn write_line(&mut self, line: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line.to_string()),
            Err(poisoned) => poisoned.into_inner().push(line.to_string()),
        }
    }
}

/// 一次操作对 transcript 的写入句柄
pub struct Transcript<'a> {
    sink: &'a mut dyn TranscriptSink,
    sanitizer: &'a OutputSanitizer,
}

impl<'a> Transcript<'a> {
    pub fn new(sink: &'a mut dyn TranscriptSink, sanitizer: &'a OutputSanitizer) -> Self {
        Self { sink, sanitizer }
    }

    /// 写入诊断文本，多行文本按行拆分并脱敏
    pub fn line(&mut self, text: impl AsRef<str>) {
        for line in text.as_ref().split('\n') {
            let sanitized = self.sanitizer.sanitize(line);
            self.sink.write_line(&sanitized);
        }
    }

    /// 写入一行远端输出，不做任何改写
    pub fn remote(&mut self, line: &str) {
        self.sink.write_line(line);
    }
}
