//! 输出脱敏
//!
//! 运行器自己写入的诊断行经过脱敏：连接凭据原文替换为 `***`，
//! 常见的 `password=...` / `token=...` 形式也会被遮盖。远端输出不经过这里。

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// 短于该长度的凭据不做原文替换，否则会误伤普通输出
const MIN_LITERAL_LEN: usize = 4;

/// 输出脱敏器
#[derive(Clone, Debug)]
pub struct OutputSanitizer {
    /// 脱敏规则
    rules: Vec<SanitizeRule>,
}

/// 脱敏规则
#[derive(Clone, Debug)]
pub struct SanitizeRule {
    /// 名称（用于调试和规则识别）
    #[allow(dead_code)]
    name: String,
    /// 正则表达式
    pattern: Regex,
    /// 替换字符串
    replacement: String,
}

impl SanitizeRule {
    pub fn new(name: &str, pattern: Regex, replacement: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern,
            replacement: replacement.to_string(),
        }
    }
}

fn default_rules() -> Vec<SanitizeRule> {
    vec![
        // 密码相关
        SanitizeRule::new(
            "password",
            Regex::new(r"(?i)(password|passwd)[\s=:]+[^\s]+").unwrap(),
            "$1=***",
        ),
        // API Key
        SanitizeRule::new(
            "api_key",
            Regex::new(r"(?i)(api[_-]?key|apikey)[\s=:]+[^\s]+").unwrap(),
            "$1=***",
        ),
        // Token
        SanitizeRule::new(
            "token",
            Regex::new(r"(?i)(access[_-]?token|refresh[_-]?token|token)[\s=:]+[^\s]+").unwrap(),
            "$1=***",
        ),
        // Secret
        SanitizeRule::new(
            "secret",
            Regex::new(r"(?i)(secret[_-]?key|private[_-]?key|secret)[\s=:]+[^\s]+").unwrap(),
            "$1=***",
        ),
    ]
}

impl OutputSanitizer {
    /// 创建默认脱敏器
    pub fn new_default() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// 创建自定义脱敏器
    pub fn new(rules: Vec<SanitizeRule>) -> Self {
        Self { rules }
    }

    /// 追加一条按原文匹配的规则，优先于其他规则执行
    pub fn with_literal(mut self, secret: &str) -> Self {
        if secret.chars().count() < MIN_LITERAL_LEN {
            return self;
        }
        match Regex::new(&regex::escape(secret)) {
            Ok(pattern) => self.rules.insert(0, SanitizeRule::new("literal", pattern, "***")),
            Err(e) => tracing::warn!(error = %e, "Failed to build literal sanitize rule"),
        }
        self
    }

    /// 脱敏输出
    pub fn sanitize(&self, output: &str) -> String {
        let mut result = output.to_string();

        for rule in &self.rules {
            if rule.pattern.is_match(&result) {
                result = rule
                    .pattern
                    .replace_all(&result, rule.replacement.as_str())
                    .into_owned();
            }
        }

        result
    }
}

/// 全局默认脱敏器
static DEFAULT_SANITIZER: Lazy<Arc<OutputSanitizer>> =
    Lazy::new(|| Arc::new(OutputSanitizer::new_default()));

/// 获取默认脱敏器
pub fn default_sanitizer() -> Arc<OutputSanitizer> {
    Arc::clone(&DEFAULT_SANITIZER)
}
