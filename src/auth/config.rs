//! OAuth2 Client Credentials 配置
//!
//! 配置来源是进程环境变量，每次获取令牌时重新读取，
//! 读取后的快照在单次获取内不再变化。

use crate::auth::error::AuthError;

/// 认证用的 client id
pub const AUTH_CLIENT_ID: &str = "AICONNECT_AUTH_CLIENT_ID";

/// 认证用的 client secret
pub const AUTH_CLIENT_SECRET: &str = "AICONNECT_AUTH_CLIENT_SECRET";

/// 认证域名（用于派生令牌端点）
pub const AUTH_DOMAIN: &str = "AICONNECT_AUTH_DOMAIN";

/// 显式的令牌端点 URL（优先于域名派生）
pub const AUTH_TOKEN_URL: &str = "AICONNECT_AUTH_TOKEN_URL";

/// 可选的 scope
pub const AUTH_SCOPE: &str = "AICONNECT_AUTH_SCOPE";

/// 可选的 audience
pub const AUTH_AUDIENCE: &str = "AICONNECT_AUTH_AUDIENCE";

/// 可选的 organization
pub const AUTH_ORGANIZATION: &str = "AICONNECT_AUTH_ORGANIZATION";

/// OAuth2 Client Credentials 流程的配置
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// 显式的令牌端点 URL
    pub token_url: Option<String>,
    /// 认证域名；无显式端点时派生 `https://{domain}/oauth/token`
    pub domain: Option<String>,
    /// client id
    pub client_id: Option<String>,
    /// client secret
    pub client_secret: Option<String>,
    /// 可选 scope
    pub scope: Option<String>,
    /// 可选 audience
    pub audience: Option<String>,
    /// 可选 organization
    pub organization: Option<String>,
}

impl AuthConfig {
    /// 从环境变量读取配置快照
    pub fn from_env() -> Self {
        Self {
            token_url: read_env(AUTH_TOKEN_URL),
            domain: read_env(AUTH_DOMAIN),
            client_id: read_env(AUTH_CLIENT_ID),
            client_secret: read_env(AUTH_CLIENT_SECRET),
            scope: read_env(AUTH_SCOPE),
            audience: read_env(AUTH_AUDIENCE),
            organization: read_env(AUTH_ORGANIZATION),
        }
    }

    /// 校验必要字段并解析出实际使用的令牌端点
    ///
    /// 缺少必要字段时返回配置错误，并指出第一个缺失的字段。
    /// 校验顺序：令牌端点（URL 或域名）、client id、client secret。
    pub fn resolve(&self) -> Result<ResolvedAuthConfig, AuthError> {
        let token_url = match (&self.token_url, &self.domain) {
            (Some(url), _) => url.clone(),
            (None, Some(domain)) => format!("https://{domain}/oauth/token"),
            (None, None) => {
                return Err(missing(&format!("{AUTH_TOKEN_URL} 或 {AUTH_DOMAIN}")));
            }
        };

        let client_id = self.client_id.clone().ok_or_else(|| missing(AUTH_CLIENT_ID))?;
        let client_secret = self
            .client_secret
            .clone()
            .ok_or_else(|| missing(AUTH_CLIENT_SECRET))?;

        Ok(ResolvedAuthConfig {
            token_url,
            client_id,
            client_secret,
            scope: self.scope.clone(),
            audience: self.audience.clone(),
            organization: self.organization.clone(),
        })
    }
}

/// 校验完成、可直接用于令牌请求的配置
#[derive(Debug, Clone)]
pub struct ResolvedAuthConfig {
    /// 令牌端点 URL
    pub token_url: String,
    /// client id
    pub client_id: String,
    /// client secret
    pub client_secret: String,
    /// 可选 scope
    pub scope: Option<String>,
    /// 可选 audience
    pub audience: Option<String>,
    /// 可选 organization
    pub organization: Option<String>,
}

fn missing(name: &str) -> AuthError {
    AuthError::MissingParameter(name.to_string())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
