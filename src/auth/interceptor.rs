//! 认证流水线
//!
//! 两级可组合的认证阶段：
//! - 预先认证：发送前附加缓存的（或新获取的）令牌
//! - 刷新重试：收到 401 后强制刷新令牌并重试，次数有上限
//!
//! 配置了静态 API Key 时两级都不参与，每个请求附加固定的 Bearer 头。

use crate::auth::provider::AccessTokenProvider;
use crate::error::ConnectionError;
use reqwest::header::HeaderValue;
use reqwest::{Client, Request, RequestBuilder, Response, StatusCode};
use std::sync::Arc;

/// 认证头名称
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// 单个逻辑请求内允许的最大认证尝试次数
///
/// 收到第 3 个 401 后放弃重试，原样返回最后一次失败响应，
/// 防止认证循环。
pub const MAX_AUTH_ATTEMPTS: u32 = 3;

/// 出站请求使用的认证方式
#[derive(Clone)]
pub enum AuthScheme {
    /// 静态 API Key：固定的 Bearer 头，无刷新逻辑
    ApiKey(String),
    /// OAuth2 Client Credentials：预先认证 + 401 刷新重试
    ClientCredentials(Arc<AccessTokenProvider>),
}

impl AuthScheme {
    /// 预先认证阶段
    ///
    /// 请求未携带 Authorization 头时：无缓存令牌则先获取一次；
    /// 这一步之后只要有令牌就附加 Bearer 头，仍然没有令牌时
    /// 不附加，让下游的 401 暴露问题。
    pub async fn apply_preemptive(&self, request: &mut Request) -> Result<(), ConnectionError> {
        match self {
            AuthScheme::ApiKey(key) => {
                append_bearer(request, key)?;
            }
            AuthScheme::ClientCredentials(provider) => {
                if request.headers().get(AUTHORIZATION_HEADER).is_none() {
                    if provider.cached_token().is_none() {
                        provider.acquire().await.map_err(ConnectionError::from)?;
                    }
                    if let Some(token) = provider.cached_token() {
                        append_bearer(request, &token)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// 刷新重试阶段：响应未授权时的决策
    ///
    /// `attempts` 为本逻辑请求内已收到的未授权响应数。
    /// 返回 `Ok(true)` 表示已刷新令牌、应该重试；`Ok(false)` 表示放弃。
    /// 令牌获取失败时错误原样上抛，不静默吞掉。
    pub async fn on_unauthorized(
        &self,
        attempts: u32,
        request_had_auth_header: bool,
        status: u16,
    ) -> Result<bool, ConnectionError> {
        let provider = match self {
            AuthScheme::ClientCredentials(provider) => provider,
            AuthScheme::ApiKey(_) => return Ok(false),
        };

        if attempts >= MAX_AUTH_ATTEMPTS {
            tracing::warn!("[AUTH] 认证重试达到上限({MAX_AUTH_ATTEMPTS})，放弃");
            return Ok(false);
        }

        if provider.cached_token().is_none() || !request_had_auth_header || status == 401 {
            tracing::info!("[AUTH] 收到未授权响应，强制刷新访问令牌");
            provider.acquire().await.map_err(|e| {
                tracing::error!("[AUTH] 令牌刷新失败: {}", e);
                ConnectionError::from(e)
            })?;
        }

        Ok(provider.cached_token().is_some())
    }
}

/// 发送请求并按认证方式处理 401 重试
///
/// 重试时基于原始请求重建，由预先认证阶段附加刷新后的令牌。
/// 达到重试上限后原样返回最后一次未授权响应，由调用方翻译。
pub async fn send_with_auth(
    client: &Client,
    scheme: &AuthScheme,
    builder: RequestBuilder,
) -> Result<Response, ConnectionError> {
    let base = builder.build().map_err(ConnectionError::from_transport)?;
    let mut attempts: u32 = 0;

    loop {
        let mut request = base
            .try_clone()
            .ok_or_else(|| ConnectionError::new("request body is not retryable", None))?;
        scheme.apply_preemptive(&mut request).await?;
        let had_auth_header = request.headers().contains_key(AUTHORIZATION_HEADER);

        tracing::debug!("[HTTP] --> {} {}", request.method(), request.url());
        let response = client
            .execute(request)
            .await
            .map_err(ConnectionError::from_transport)?;
        tracing::debug!("[HTTP] <-- status={}", response.status());

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        attempts += 1;
        let should_retry = scheme
            .on_unauthorized(attempts, had_auth_header, response.status().as_u16())
            .await?;
        if !should_retry {
            return Ok(response);
        }
    }
}

fn append_bearer(request: &mut Request, token: &str) -> Result<(), ConnectionError> {
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| ConnectionError::new(format!("无效的认证令牌: {e}"), None))?;
    request.headers_mut().append(AUTHORIZATION_HEADER, value);
    Ok(())
}
