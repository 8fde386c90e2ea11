//! 输入还原
//!
//! 构建页面提交的脚本可能被编码成 HTML 字符引用，换行也可能变成 CRLF；
//! 执行前先还原成原始文本。

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static CHAR_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});")
        .expect("character reference pattern is valid")
});

fn named_reference(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "tab" | "Tab" => '\t',
        "NewLine" => '\n',
        _ => return None,
    };
    Some(c)
}

fn decode_reference(body: &str) -> Option<char> {
    if let Some(numeric) = body.strip_prefix('#') {
        let code = match numeric.strip_prefix(&['x', 'X'][..]) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        char::from_u32(code)
    } else {
        named_reference(body)
    }
}

/// 解码 HTML 字符引用，未知引用保持原样
pub fn decode_char_references(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    CHAR_REFERENCE.replace_all(input, |caps: &Captures<'_>| match decode_reference(&caps[1]) {
        Some(c) => c.to_string(),
        None => caps[0].to_string(),
    })
}

/// 统一换行为 LF
pub fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
}

/// 还原经过传输编码的脚本文本
pub fn unescape_input(input: &str) -> String {
    let decoded = decode_char_references(input);
    normalize_newlines(&decoded).into_owned()
}
