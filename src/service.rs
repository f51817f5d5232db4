//! AI 服务入口
//!
//! 把配置、认证方式、请求增强和流式解码组装成一个服务实例，
//! 提供聊天完成（同步/流式）和内容审核三个操作。

use crate::auth::{send_with_auth, AccessTokenProvider, AuthConfig, AuthScheme, TokenStore};
use crate::error::ConnectionError;
use crate::models::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ModerationRequest,
    ModerationResult,
};
use crate::request::{build_http_client, KeyValuePairs, ProxyResolver, RequestAugmenter};
use crate::streaming::decoder::{response_byte_stream, run_decoder, EventStream};
use crate::streaming::{StreamError, DEFAULT_CHANNEL_CAPACITY};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 默认请求读超时（毫秒）
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 600_000;

/// AI 服务配置
///
/// 由外部配置层提供；`api_key` 缺失（或为空白、字面量 `"null"`）时
/// 选择 OAuth Client Credentials 认证流程。
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// API 基础 URL
    pub base_url: String,
    /// 静态 API Key（可选）
    pub api_key: Option<String>,
    /// 默认模型名称
    pub model: String,
    /// 是否启用内容审核
    pub moderation_enabled: bool,
    /// 是否允许流式传输
    pub streaming_enabled: bool,
    /// 额外的请求 header（有序，允许重复键）
    pub extra_headers: KeyValuePairs,
    /// 额外的 query 参数（有序，允许重复键）
    pub extra_query_params: KeyValuePairs,
    /// 读超时（毫秒）
    pub read_timeout_ms: u64,
}

impl ServiceConfig {
    /// 创建配置
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            moderation_enabled: false,
            streaming_enabled: true,
            extra_headers: Vec::new(),
            extra_query_params: Vec::new(),
            read_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    /// 设置静态 API Key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// 设置是否启用审核
    pub fn with_moderation(mut self, enabled: bool) -> Self {
        self.moderation_enabled = enabled;
        self
    }

    /// 设置是否允许流式传输
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming_enabled = enabled;
        self
    }

    /// 设置额外 header
    pub fn with_extra_headers(mut self, headers: KeyValuePairs) -> Self {
        self.extra_headers = headers;
        self
    }

    /// 设置额外 query 参数
    pub fn with_extra_query_params(mut self, params: KeyValuePairs) -> Self {
        self.extra_query_params = params;
        self
    }

    /// 设置读超时（毫秒）
    pub fn with_read_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.read_timeout_ms = timeout_ms;
        self
    }

    /// 有效的静态 API Key：空白和字面量 "null" 视为未配置
    fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != "null")
    }
}

/// 聊天完成服务
///
/// 每个实例持有自己的 HTTP 客户端和（OAuth 流程下的）共享令牌状态。
pub struct AiService {
    config: ServiceConfig,
    augmenter: RequestAugmenter,
    auth: AuthScheme,
    client: reqwest::Client,
}

impl AiService {
    /// 创建服务实例
    ///
    /// 配置了静态 API Key 时每个请求附加固定 Bearer 头；
    /// 否则启用 OAuth 预先认证与 401 刷新重试，配置从环境变量读取。
    pub fn new(config: ServiceConfig, proxy_resolver: Option<Arc<dyn ProxyResolver>>) -> Self {
        let auth = match config.effective_api_key() {
            Some(key) => {
                tracing::debug!("[CHAT_API] 使用配置的静态 API Key");
                AuthScheme::ApiKey(key.to_string())
            }
            None => AuthScheme::ClientCredentials(Arc::new(AccessTokenProvider::new(
                TokenStore::new(),
                proxy_resolver.clone(),
            ))),
        };
        Self::with_auth_scheme(config, proxy_resolver, auth)
    }

    /// 使用显式 OAuth 配置创建服务实例（代替环境变量）
    pub fn with_auth_config(
        config: ServiceConfig,
        proxy_resolver: Option<Arc<dyn ProxyResolver>>,
        auth_config: AuthConfig,
    ) -> Self {
        let provider = AccessTokenProvider::new(TokenStore::new(), proxy_resolver.clone())
            .with_config(auth_config);
        let auth = AuthScheme::ClientCredentials(Arc::new(provider));
        Self::with_auth_scheme(config, proxy_resolver, auth)
    }

    fn with_auth_scheme(
        config: ServiceConfig,
        proxy_resolver: Option<Arc<dyn ProxyResolver>>,
        auth: AuthScheme,
    ) -> Self {
        let client = build_http_client(
            &config.base_url,
            proxy_resolver.as_deref(),
            Some(Duration::from_millis(config.read_timeout_ms)),
        );
        let augmenter = RequestAugmenter::new(
            config.extra_headers.clone(),
            config.extra_query_params.clone(),
        );
        Self {
            config,
            augmenter,
            auth,
            client,
        }
    }

    /// 服务配置
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// 是否需要对内容应用审核
    pub fn is_moderation_required(&self) -> bool {
        self.config.moderation_enabled
    }

    /// OAuth 流程下共享令牌存储的句柄；静态 API Key 时为 `None`
    pub fn token_store(&self) -> Option<TokenStore> {
        match &self.auth {
            AuthScheme::ClientCredentials(provider) => Some(provider.store().clone()),
            AuthScheme::ApiKey(_) => None,
        }
    }

    /// 是否允许流式传输
    pub fn is_streaming_supported(&self) -> bool {
        self.config.streaming_enabled
    }

    /// 聊天完成（非流式）
    ///
    /// 非 2xx 响应和传输失败统一翻译为 [`ConnectionError`]。
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ConnectionError> {
        let url = self.endpoint("chat/completions");
        tracing::debug!(
            "[CHAT_API] 发送请求: url={} model={}",
            url,
            request.model
        );
        self.execute(&url, request).await
    }

    /// 内容审核
    ///
    /// 任一结果被标记即返回 `true`；结果列表为空或缺失返回 `false`。
    pub async fn moderate(&self, request: &ModerationRequest) -> Result<bool, ConnectionError> {
        let url = self.endpoint("moderations");
        let result: ModerationResult = self.execute(&url, request).await?;
        Ok(result.any_flagged())
    }

    /// 聊天完成（流式）
    ///
    /// 立即返回事件流；请求在独立 worker 上发送并解码。
    /// HTTP/传输失败通过通道异常关闭传递给消费端。
    ///
    /// `streaming_enabled` 只是能力声明，由调用方通过
    /// [`is_streaming_supported`](Self::is_streaming_supported) 检查；
    /// 本方法不做拦截。
    pub fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> EventStream<ChatCompletionChunk> {
        let mut stream_request = request.clone();
        stream_request.stream = true;

        let url = self.endpoint("chat/completions");
        tracing::info!(
            "[CHAT_API] 发起流式请求: url={} model={}",
            url,
            stream_request.model
        );

        let builder = self.augmenter.apply(
            self.client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Accept", "text/event-stream")
                .json(&stream_request),
        );
        let client = self.client.clone();
        let scheme = self.auth.clone();

        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let response = match send_with_auth(&client, &scheme, builder).await {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(Err(StreamError::from(e))).await;
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = ConnectionError::from_http_error(
                    status.as_u16(),
                    (!body.is_empty()).then_some(body.as_str()),
                );
                tracing::error!("[CHAT_API] 流式请求失败: {} - {}", status, error);
                let _ = tx.send(Err(StreamError::from(error))).await;
                return;
            }

            tracing::info!("[CHAT_API] 流式响应开始: status={}", status);
            run_decoder(response_byte_stream(response), tx).await;
        });

        EventStream::new(rx)
    }

    /// 执行非流式调用并翻译失败
    async fn execute<B, T>(&self, url: &str, body: &B) -> Result<T, ConnectionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.augmenter.apply(
            self.client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body),
        );
        let response = send_with_auth(&self.client, &self.auth, builder).await?;

        let status = response.status();
        tracing::debug!("[CHAT_API] 响应状态: status={}", status);
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(ConnectionError::from_transport)?;
            return Err(ConnectionError::from_http_error(
                status.as_u16(),
                (!body.is_empty()).then_some(body.as_str()),
            ));
        }

        response.json().await.map_err(ConnectionError::from_transport)
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_api_key_filters_blank_and_null() {
        let config = ServiceConfig::new("https://api.example.com/v1", "gpt-4o");
        assert!(config.effective_api_key().is_none());

        let config = config.with_api_key("  ");
        assert!(config.effective_api_key().is_none());

        let config = config.with_api_key("null");
        assert!(config.effective_api_key().is_none());

        let config = config.with_api_key("sk-real");
        assert_eq!(config.effective_api_key(), Some("sk-real"));
    }

    #[test]
    fn test_api_key_selects_static_scheme() {
        let config = ServiceConfig::new("https://api.example.com/v1", "gpt-4o")
            .with_api_key("sk-test");
        let service = AiService::new(config, None);
        assert!(matches!(service.auth, AuthScheme::ApiKey(_)));
    }

    #[test]
    fn test_missing_api_key_selects_oauth_scheme() {
        let config = ServiceConfig::new("https://api.example.com/v1", "gpt-4o");
        let service = AiService::new(config, None);
        assert!(matches!(service.auth, AuthScheme::ClientCredentials(_)));
    }

    #[test]
    fn test_endpoint_join_handles_trailing_slash() {
        let config = ServiceConfig::new("https://api.example.com/v1/", "gpt-4o");
        let service = AiService::new(config, None);
        assert_eq!(
            service.endpoint("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_moderation_flag_comes_from_config() {
        let config =
            ServiceConfig::new("https://api.example.com/v1", "gpt-4o").with_moderation(true);
        let service = AiService::new(config, None);
        assert!(service.is_moderation_required());
        assert!(service.is_streaming_supported());
    }
}
