//! 数据模型模块
//!
//! OpenAI 兼容 API 的请求/响应类型定义。

pub mod openai;

pub use openai::{
    ChatCompletionChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChunkChoice, Delta, Message, Moderation, ModerationRequest, ModerationResult, Usage,
};
