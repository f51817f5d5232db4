//! 访问令牌获取器
//!
//! 对配置的（或由域名派生的）令牌端点执行 OAuth2 client_credentials
//! 交换，成功后把新令牌写入共享的 [`TokenStore`]。
//! 令牌请求与普通请求使用相同的按 URL 代理选择规则。

use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;
use crate::auth::token_store::TokenStore;
use crate::request::{build_http_client, ProxyResolver};
use std::sync::Arc;
use std::time::Duration;

/// 令牌请求的独立超时
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 访问令牌获取器
pub struct AccessTokenProvider {
    /// 共享令牌存储
    store: TokenStore,
    /// 代理解析器
    proxy_resolver: Option<Arc<dyn ProxyResolver>>,
    /// 显式配置；`None` 时每次从环境变量读取
    config_override: Option<AuthConfig>,
}

impl AccessTokenProvider {
    /// 创建令牌获取器
    pub fn new(store: TokenStore, proxy_resolver: Option<Arc<dyn ProxyResolver>>) -> Self {
        Self {
            store,
            proxy_resolver,
            config_override: None,
        }
    }

    /// 使用显式配置代替环境变量
    pub fn with_config(mut self, config: AuthConfig) -> Self {
        self.config_override = Some(config);
        self
    }

    /// 令牌存储的句柄
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// 当前缓存的令牌
    pub fn cached_token(&self) -> Option<String> {
        self.store.get()
    }

    /// 执行 client_credentials 交换并缓存新令牌
    ///
    /// 缺少必要配置时返回 `MissingParameter`（配置错误，不重试）；
    /// 端点拒绝或不可达时返回对应的请求/网络错误。
    pub async fn acquire(&self) -> Result<String, AuthError> {
        tracing::debug!("[AUTH] 使用 client credentials 获取访问令牌");

        let config = match &self.config_override {
            Some(config) => config.clone(),
            None => AuthConfig::from_env(),
        };
        let resolved = config.resolve()?;

        let client = build_http_client(
            &resolved.token_url,
            self.proxy_resolver.as_deref(),
            Some(TOKEN_REQUEST_TIMEOUT),
        );

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("client_id", &resolved.client_id),
            ("client_secret", &resolved.client_secret),
        ];
        if let Some(scope) = &resolved.scope {
            form.push(("scope", scope));
        }
        if let Some(audience) = &resolved.audience {
            form.push(("audience", audience));
        }
        if let Some(organization) = &resolved.organization {
            form.push(("organization", organization));
        }

        let response = client
            .post(&resolved.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.text().await {
                Ok(body) if !body.is_empty() => body,
                _ => status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            };
            tracing::warn!(
                "[AUTH] 令牌请求失败: status={} message={}",
                status.as_u16(),
                message
            );
            return Err(AuthError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| AuthError::Parse(e.to_string()))?;

        let token = value
            .get("access_token")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingAccessToken)?
            .to_string();

        self.store.set(Some(token.clone()));
        tracing::debug!("[AUTH] 访问令牌获取成功");
        Ok(token)
    }
}
