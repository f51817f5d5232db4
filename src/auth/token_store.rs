//! 访问令牌缓存
//!
//! 每个服务实例共享一份令牌状态，最多缓存一个令牌，后写覆盖先写。
//! 令牌不记录过期时间，失效只能通过 401 响应发现。

use parking_lot::Mutex;
use std::sync::Arc;

/// 共享的访问令牌存储
///
/// `clone` 得到的是同一份状态的句柄，预先认证与刷新重试两级共用。
/// 并发刷新时允许竞争，后写覆盖先写。
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<Mutex<Option<String>>>,
}

impl TokenStore {
    /// 创建空的令牌存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取当前缓存的令牌
    pub fn get(&self) -> Option<String> {
        self.inner.lock().clone()
    }

    /// 设置或清空令牌
    pub fn set(&self, token: Option<String>) {
        *self.inner.lock() = token;
    }
}
