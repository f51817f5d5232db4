//! 认证错误类型

use crate::error::ConnectionError;
use thiserror::Error;

/// 认证过程中的错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// 配置错误：缺少必要的认证参数（不可重试）
    #[error("API Key 或 OAuth Client Credentials 未配置，缺少: {0}")]
    MissingParameter(String),

    /// 令牌端点返回非 2xx 响应
    #[error("认证请求失败: status={status}; message={message}")]
    RequestFailed {
        /// HTTP 状态码
        status: u16,
        /// 响应体或状态消息
        message: String,
    },

    /// 令牌响应缺少 access_token 字段
    #[error("认证响应中没有 access_token")]
    MissingAccessToken,

    /// 令牌响应解析失败
    #[error("认证响应解析失败: {0}")]
    Parse(String),

    /// 令牌端点不可达
    #[error("认证请求网络错误: {0}")]
    Network(String),
}

impl AuthError {
    /// 是否为配置错误（缺少必要参数，需要用户修正配置）
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, AuthError::MissingParameter(_))
    }
}

impl From<AuthError> for ConnectionError {
    fn from(err: AuthError) -> Self {
        ConnectionError::new(err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_names_field() {
        let err = AuthError::MissingParameter("AICONNECT_AUTH_CLIENT_ID".to_string());
        assert!(err.to_string().contains("AICONNECT_AUTH_CLIENT_ID"));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_request_failed_display() {
        let err = AuthError::RequestFailed {
            status: 403,
            message: "forbidden".to_string(),
        };
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("forbidden"));
        assert!(!err.is_configuration_error());
    }
}
