//! 流式传输核心模块
//!
//! 把一条长连接的分块 HTTP 响应体解码为可取消、带背压的类型化事件序列。
//!
//! # 主要组件
//!
//! - `error`: 流式错误类型定义
//! - `decoder`: 行协议解码器（SSE 事件框架与单文档回退两种模式）

pub mod decoder;
pub mod error;

pub use decoder::{
    decode_stream, response_byte_stream, ByteStream, EventStream, DEFAULT_CHANNEL_CAPACITY,
    DONE_SENTINEL,
};
pub use error::StreamError;
