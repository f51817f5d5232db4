//! 连接错误类型
//!
//! 将 HTTP 错误响应（含结构化错误体 `{"error":{"message","code"}}`）
//! 和传输层异常统一翻译为 `ConnectionError`。

use serde::Deserialize;
use std::error::Error;
use std::fmt;

/// OpenAI 兼容 API 的无效 API Key 错误码
pub const INVALID_API_KEY_CODE: &str = "invalid_api_key";

/// 统一的连接错误
///
/// 携带人类可读的消息和可选的机器可读错误码。
/// `status` 在错误来自 HTTP 响应时存在。
#[derive(Debug)]
pub struct ConnectionError {
    /// 错误消息
    pub message: String,
    /// 机器可读错误码（来自结构化错误体）
    pub code: Option<String>,
    /// HTTP 状态码（如果适用）
    pub status: Option<u16>,
    /// 底层错误
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ConnectionError {
    /// 创建新的连接错误
    pub fn new(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
            status: None,
            source: None,
        }
    }

    /// 从非 2xx 的 HTTP 响应创建错误
    ///
    /// 优先解析结构化错误体 `{"error":{"message","code"}}`；
    /// 解析失败时回退到由状态码生成的通用消息。
    pub fn from_http_error(status: u16, body: Option<&str>) -> Self {
        let fallback = || {
            let reason = reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed");
            format!("HTTP {status} {reason}")
        };

        let mut message = fallback();
        let mut code = None;

        if let Some(body) = body {
            if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
                if let Some(detail) = parsed.error {
                    if let Some(msg) = detail.message {
                        message = msg;
                    }
                    code = detail.code;
                }
            }
        }

        Self {
            message,
            code,
            status: Some(status),
            source: None,
        }
    }

    /// 包装传输层异常（连接拒绝、超时等）
    ///
    /// 错误码为空，状态码在 reqwest 能提供时保留。
    pub fn from_transport(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            code: None,
            status: err.status().map(|s| s.as_u16()),
            source: Some(Box::new(err)),
        }
    }

    /// 判断此错误是否代表无效的 API Key
    pub fn is_invalid_api_key(&self) -> bool {
        self.status
            .map(|status| is_invalid_api_key(self.code.as_deref(), status))
            .unwrap_or(false)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (code: {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<reqwest::Error> for ConnectionError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_transport(err)
    }
}

/// 判断错误码组合是否为无效 API Key
///
/// 当 HTTP 状态为 401 且错误码缺失或等于 `invalid_api_key` 时成立。
pub fn is_invalid_api_key(code: Option<&str>, status: u16) -> bool {
    status == 401 && (code.is_none() || code == Some(INVALID_API_KEY_CODE))
}

/// 请求失败时的结构化错误体
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// 错误详情
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

/// 错误详情
#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    /// 错误消息
    #[serde(default)]
    pub message: Option<String>,
    /// 错误码
    #[serde(default)]
    pub code: Option<String>,
}
