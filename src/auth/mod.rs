//! 认证模块
//!
//! 支持两种认证方式：
//! - 静态 API Key：每个请求附加固定的 `Authorization: Bearer <key>`
//! - OAuth2 Client Credentials：预先认证 + 401 响应后的刷新重试
//!
//! # 主要组件
//!
//! - `config`: 从环境变量读取的 OAuth 配置
//! - `token_store`: 共享的访问令牌缓存
//! - `provider`: 令牌获取器（client_credentials 交换）
//! - `interceptor`: 预先认证与 401 刷新重试两级流水线
//! - `error`: 认证错误类型

pub mod config;
pub mod error;
pub mod interceptor;
pub mod provider;
pub mod token_store;

pub use config::{
    AuthConfig, AUTH_AUDIENCE, AUTH_CLIENT_ID, AUTH_CLIENT_SECRET, AUTH_DOMAIN, AUTH_ORGANIZATION,
    AUTH_SCOPE, AUTH_TOKEN_URL,
};
pub use error::AuthError;
pub use interceptor::{send_with_auth, AuthScheme, AUTHORIZATION_HEADER, MAX_AUTH_ATTEMPTS};
pub use provider::AccessTokenProvider;
pub use token_store::TokenStore;
