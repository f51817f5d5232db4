//! aiconnect
//!
//! OpenAI 兼容聊天完成 API 的弹性客户端：
//!
//! - 认证：静态 API Key，或 OAuth2 client_credentials（预先认证 +
//!   401 后的刷新重试，次数有上限）
//! - 请求增强：动态 header / query 参数追加，按目标 URL 选择代理
//! - 流式解码：把分块响应体解码为可取消、带背压的类型化事件流
//!   （SSE 事件框架与单 JSON 文档两种模式，从内容中自动发现）
//! - 错误翻译：HTTP 错误响应与传输异常统一为携带消息和错误码的
//!   连接错误

pub mod auth;
pub mod error;
pub mod models;
pub mod request;
pub mod service;
pub mod streaming;

pub use auth::{AccessTokenProvider, AuthConfig, AuthError, AuthScheme, TokenStore};
pub use error::{is_invalid_api_key, ConnectionError};
pub use models::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Message,
    ModerationRequest, ModerationResult,
};
pub use request::{KeyValuePairs, ProxyAddress, ProxyResolver, RequestAugmenter};
pub use service::{AiService, ServiceConfig, DEFAULT_REQUEST_TIMEOUT_MS};
pub use streaming::{EventStream, StreamError};
