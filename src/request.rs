//! 请求增强模块
//!
//! 为每个出站请求追加动态 header / query 参数，并按目标 URL 选择代理。

use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use url::Url;

/// 有序键值对列表
///
/// 允许重复键；追加时保持配置顺序，不与已有值合并或覆盖。
pub type KeyValuePairs = Vec<(String, String)>;

/// 代理地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddress {
    /// 代理主机
    pub host: String,
    /// 代理端口
    pub port: u16,
}

/// 按目标 URL 解析代理配置的能力
///
/// 由外部配置层提供实现；返回 `None` 表示直连。
pub trait ProxyResolver: Send + Sync {
    /// 解析给定目标 URL 应使用的代理
    fn resolve(&self, url: &Url) -> Option<ProxyAddress>;
}

/// 请求增强器
///
/// 持有调用方配置的额外 header 与 query 参数，
/// 应用到 `RequestBuilder` 时只追加，不移除、不重排已有的项。
#[derive(Debug, Clone, Default)]
pub struct RequestAugmenter {
    headers: KeyValuePairs,
    query_params: KeyValuePairs,
}

impl RequestAugmenter {
    /// 创建请求增强器
    pub fn new(headers: KeyValuePairs, query_params: KeyValuePairs) -> Self {
        Self {
            headers,
            query_params,
        }
    }

    /// 是否没有任何额外配置
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.query_params.is_empty()
    }

    /// 将额外 header 和 query 参数追加到请求上
    pub fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.query_params {
            builder = builder.query(&[(name.as_str(), value.as_str())]);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

/// 为目标 URL 构建 HTTP 客户端
///
/// 通过 `resolver` 解析代理；解析不到或代理配置无效时降级为直连，
/// 不让请求本身失败。
pub fn build_http_client(
    target_url: &str,
    resolver: Option<&dyn ProxyResolver>,
    read_timeout: Option<Duration>,
) -> Client {
    let mut builder = Client::builder();

    if let Some(timeout) = read_timeout {
        builder = builder.read_timeout(timeout);
    }

    if let Some(address) = resolve_proxy(target_url, resolver) {
        let proxy_url = format!("http://{}:{}", address.host, address.port);
        match reqwest::Proxy::all(&proxy_url) {
            Ok(proxy) => {
                tracing::debug!("[HTTP] 使用代理: {} -> {}", target_url, proxy_url);
                builder = builder.proxy(proxy);
            }
            Err(e) => {
                // 代理配置无效时降级为直连
                tracing::warn!("[HTTP] 代理配置无效，降级为直连: {}", e);
            }
        }
    }

    builder.build().unwrap_or_else(|e| {
        tracing::warn!("[HTTP] 客户端构建失败，使用默认客户端: {}", e);
        Client::new()
    })
}

fn resolve_proxy(target_url: &str, resolver: Option<&dyn ProxyResolver>) -> Option<ProxyAddress> {
    let resolver = resolver?;
    match Url::parse(target_url) {
        Ok(url) => resolver.resolve(&url),
        Err(e) => {
            tracing::debug!("[HTTP] 目标 URL 无法解析，跳过代理选择: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(Option<ProxyAddress>);

    impl ProxyResolver for FixedResolver {
        fn resolve(&self, _url: &Url) -> Option<ProxyAddress> {
            self.0.clone()
        }
    }

    #[test]
    fn test_augmenter_appends_query_params() {
        let augmenter = RequestAugmenter::new(
            vec![],
            vec![
                ("api-version".to_string(), "v1".to_string()),
                ("api-version".to_string(), "v2".to_string()),
            ],
        );
        let client = Client::new();
        let builder = augmenter.apply(client.get("http://example.com/path?fixed=1"));
        let request = builder.build().unwrap();
        assert_eq!(
            request.url().query(),
            Some("fixed=1&api-version=v1&api-version=v2")
        );
    }

    #[test]
    fn test_augmenter_appends_headers_additively() {
        let augmenter = RequestAugmenter::new(
            vec![
                ("x-extra".to_string(), "one".to_string()),
                ("x-extra".to_string(), "two".to_string()),
            ],
            vec![],
        );
        let client = Client::new();
        let builder = augmenter.apply(client.get("http://example.com").header("x-extra", "zero"));
        let request = builder.build().unwrap();
        let values: Vec<_> = request
            .headers()
            .get_all("x-extra")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["zero", "one", "two"]);
    }

    #[test]
    fn test_build_client_without_resolver() {
        // 无解析器时直连，不会 panic
        let _client = build_http_client("https://api.openai.com", None, None);
    }

    #[test]
    fn test_build_client_with_proxy() {
        let resolver = FixedResolver(Some(ProxyAddress {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }));
        let _client = build_http_client(
            "https://api.openai.com",
            Some(&resolver),
            Some(Duration::from_secs(600)),
        );
    }

    #[test]
    fn test_invalid_target_url_degrades_to_direct() {
        let resolver = FixedResolver(Some(ProxyAddress {
            host: "proxy.local".to_string(),
            port: 3128,
        }));
        assert!(resolve_proxy("not a url", Some(&resolver)).is_none());
    }
}
