//! 完成标记
//!
//! 交互式登录 shell 不会自行退出，通道 EOF/退出码都不可靠；
//! 因此在脚本末尾回显一个标记，输出中出现该标记即视为脚本执行完毕。

use uuid::Uuid;

use super::escape::unescape_input;

const MARKER_PREFIX: &str = "gssh-done-";

/// 检测到完成标记后写入 transcript 的分隔行
pub const STOP_LINE: &str = "##############STOP###############";

/// 每次调用唯一的完成标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelMarker {
    token: String,
}

impl SentinelMarker {
    /// 生成新的随机标记
    pub fn new() -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    /// 使用固定 token，便于测试
    pub fn from_token(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }

    /// 完整标记文本
    pub fn text(&self) -> String {
        format!("{}{}", MARKER_PREFIX, self.token)
    }

    /// 行中是否包含标记
    pub fn matches(&self, line: &str) -> bool {
        line.contains(&self.text())
    }

    /// 回显标记的结尾语句
    ///
    /// 标记被拆成两个相邻的单引号字符串，shell 拼接后才是完整标记，
    /// 命令本身的回显（如 `set -x`）不会命中。
    pub fn epilogue(&self) -> String {
        format!("\necho '{}''{}'\necho ''", MARKER_PREFIX, self.token)
    }
}

impl Default for SentinelMarker {
    fn default() -> Self {
        Self::new()
    }
}

/// 把用户脚本包装成实际发送到远端的内容
#[derive(Debug, Clone)]
pub struct ScriptWrapper {
    prologue: String,
    marker: SentinelMarker,
}

impl ScriptWrapper {
    pub fn new(prologue: &str, marker: SentinelMarker) -> Self {
        Self {
            prologue: prologue.to_string(),
            marker,
        }
    }

    pub fn marker(&self) -> &SentinelMarker {
        &self.marker
    }

    /// prologue + 还原后的脚本 + 标记回显
    pub fn wrap(&self, input: &str) -> String {
        let body = unescape_input(input);
        let epilogue = self.marker.epilogue();

        let mut wrapped = String::with_capacity(self.prologue.len() + body.len() + epilogue.len());
        wrapped.push_str(&self.prologue);
        wrapped.push_str(&body);
        wrapped.push_str(&epilogue);
        wrapped
    }
}
