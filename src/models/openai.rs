//! OpenAI 兼容 API 数据模型
//!
//! 序列化时省略 `None` 字段，反序列化时忽略未知字段，
//! 以兼容不同提供商对协议的扩展。

use serde::{Deserialize, Serialize};

/// 聊天完成请求
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatCompletionRequest {
    /// 模型名称
    pub model: String,
    /// 消息列表
    pub messages: Vec<Message>,
    /// 是否启用流式传输
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    /// 最大生成 token 数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// 采样温度
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Message {
    /// 角色：system / user / assistant
    pub role: String,
    /// 消息内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    /// 创建用户消息
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }

    /// 创建系统消息
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }
}

/// 聊天完成响应（非流式）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatCompletionResponse {
    /// 响应 ID
    #[serde(default)]
    pub id: Option<String>,
    /// 模型名称
    #[serde(default)]
    pub model: Option<String>,
    /// 候选回复列表
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    /// token 用量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// 候选回复
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatCompletionChoice {
    /// 序号
    #[serde(default)]
    pub index: u32,
    /// 完整消息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// 结束原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// token 用量统计
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    /// 输入 token 数
    #[serde(default)]
    pub prompt_tokens: u64,
    /// 输出 token 数
    #[serde(default)]
    pub completion_tokens: u64,
    /// 总 token 数
    #[serde(default)]
    pub total_tokens: u64,
}

/// 流式聊天完成分块
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatCompletionChunk {
    /// 响应 ID
    #[serde(default)]
    pub id: Option<String>,
    /// 模型名称
    #[serde(default)]
    pub model: Option<String>,
    /// 增量候选列表
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// 流式增量候选
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkChoice {
    /// 序号
    #[serde(default)]
    pub index: u32,
    /// 内容增量
    #[serde(default)]
    pub delta: Delta,
    /// 结束原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// 内容增量
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Delta {
    /// 角色（仅首个分块携带）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// 文本增量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// 内容审核请求
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModerationRequest {
    /// 待审核的内容
    pub input: String,
    /// 审核模型
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// 内容审核响应
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModerationResult {
    /// 审核 ID
    #[serde(default)]
    pub id: Option<String>,
    /// 逐项审核结果
    #[serde(default)]
    pub results: Option<Vec<Moderation>>,
}

impl ModerationResult {
    /// 任一结果被标记即视为整体被标记；结果列表为空或缺失时不标记
    pub fn any_flagged(&self) -> bool {
        self.results
            .as_ref()
            .map(|results| results.iter().any(|m| m.flagged))
            .unwrap_or(false)
    }
}

/// 单项审核结果
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Moderation {
    /// 是否被标记
    #[serde(default)]
    pub flagged: bool,
}
