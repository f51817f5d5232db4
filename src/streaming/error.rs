//! 流式传输错误类型

use crate::error::ConnectionError;
use thiserror::Error;

/// 流式传输过程中可能发生的错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// 网络错误（连接失败、连接被重置等）
    #[error("网络错误: {0}")]
    Network(String),

    /// 流式响应超时
    #[error("流式响应超时")]
    Timeout,

    /// 上游返回 HTTP 错误响应
    #[error("HTTP 错误 ({status}): {message}")]
    Http {
        /// HTTP 状态码
        status: u16,
        /// 翻译后的错误消息
        message: String,
    },

    /// SSE 框架协议违规或非 SSE 内容无法解析
    #[error("无效的 SSE 格式: {0}")]
    Format(String),

    /// 单个事件载荷反序列化失败
    #[error("数据解析失败: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout
        } else if err.is_connect() {
            StreamError::Network(format!("连接失败: {err}"))
        } else {
            StreamError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Parse(err.to_string())
    }
}

impl From<ConnectionError> for StreamError {
    fn from(err: ConnectionError) -> Self {
        match err.status {
            Some(status) => StreamError::Http {
                status,
                message: err.message,
            },
            None => StreamError::Network(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StreamError::Http {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 错误 (429): rate limited");

        let err = StreamError::Format("bogus line".to_string());
        assert!(err.to_string().contains("bogus line"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: StreamError = json_err.into();
        assert!(matches!(err, StreamError::Parse(_)));
    }

    #[test]
    fn test_from_connection_error_keeps_status() {
        let conn = ConnectionError::from_http_error(503, None);
        let err: StreamError = conn.into();
        assert_eq!(
            err,
            StreamError::Http {
                status: 503,
                message: "HTTP 503 Service Unavailable".to_string()
            }
        );

        let conn = ConnectionError::new("connection refused", None);
        let err: StreamError = conn.into();
        assert!(matches!(err, StreamError::Network(_)));
    }
}
