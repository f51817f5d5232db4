//! 行协议解码器
//!
//! 在独立的 worker 任务上逐行消费响应体，按两种互斥的框架模式解码：
//!
//! - **事件框架（SSE）**：`event:` 行仅作框架、直接跳过（部分提供商会发送）；
//!   `data:` 行去掉前缀并修剪空白后作为待发送载荷；紧随的空行把载荷作为
//!   一个事件发出，哨兵 `[DONE]` 则正常结束流且不发出事件。
//! - **单文档回退**：在流结束前没有出现过任何 `data:` 事件时，把累积的
//!   非空行整体按单个 JSON 文档解析，成功则恰好发出一个事件。
//!
//! 解码结果发布到有界通道上：消费慢时 worker 被背压阻塞；消费端关闭后
//! worker 在下一次行读取前感知并停止。每个流恰好发生一次终止：
//! 正常关闭（哨兵或干净的 EOF）或异常关闭（携带错误的最后一个条目）。

use crate::streaming::error::StreamError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// 字节流类型别名
///
/// 每个 Item 是一个 chunk 的字节数据或错误。
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// 输出通道的默认容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// 流结束哨兵：出现在 `data:` 载荷中时表示正常完成，不会作为事件发出
pub const DONE_SENTINEL: &str = "[DONE]";

/// 将 reqwest 响应转换为统一的字节流
pub fn response_byte_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|r| r.map_err(StreamError::from)))
}

/// 解码后的事件流（消费端）
///
/// 底层是有界 mpsc 通道的接收端。丢弃或调用 [`EventStream::cancel`]
/// 即为协作式取消：worker 在下一次行读取前观察到并停止，
/// 之后不再发出任何条目。
pub struct EventStream<T> {
    receiver: mpsc::Receiver<Result<T, StreamError>>,
}

impl<T> EventStream<T> {
    pub(crate) fn new(receiver: mpsc::Receiver<Result<T, StreamError>>) -> Self {
        Self { receiver }
    }

    /// 接收下一个事件
    ///
    /// 通道正常关闭后返回 `None`；异常关闭时最后一个条目是 `Err`。
    pub async fn next_event(&mut self) -> Option<Result<T, StreamError>> {
        self.receiver.recv().await
    }

    /// 取消消费：关闭接收端，通知 worker 停止读取
    pub fn cancel(&mut self) {
        self.receiver.close();
    }
}

impl<T> Stream for EventStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// 在独立 worker 上解码字节流，返回事件流
pub fn decode_stream<T>(source: ByteStream, capacity: usize) -> EventStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(run_decoder(source, tx));
    EventStream::new(rx)
}

/// worker 主体：逐行驱动状态机并发布事件
///
/// 所有退出路径都会 drop `source`（释放底层连接）和 `tx`（关闭通道）。
pub(crate) async fn run_decoder<T>(mut source: ByteStream, tx: mpsc::Sender<Result<T, StreamError>>)
where
    T: DeserializeOwned + Send + 'static,
{
    let mut machine = SseStateMachine::new();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        // 每次读取前轮询取消标志
        if tx.is_closed() {
            tracing::debug!("[SSE] 消费端已取消，停止读取");
            return;
        }

        match source.next().await {
            None => break,
            Some(Err(e)) => {
                tracing::warn!("[SSE] 读取响应体失败: {}", e);
                let _ = tx.send(Err(e)).await;
                return;
            }
            Some(Ok(chunk)) => {
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                    if tx.is_closed() {
                        tracing::debug!("[SSE] 消费端已取消，停止读取");
                        return;
                    }
                    let line = to_line(&line_bytes);
                    if !feed_line(&mut machine, &line, &tx).await {
                        return;
                    }
                }
            }
        }
    }

    // EOF：处理没有换行结尾的最后一行
    if !buffer.is_empty() && !tx.is_closed() {
        let line = to_line(&buffer);
        if !feed_line(&mut machine, &line, &tx).await {
            return;
        }
    }

    // 单文档回退：整体按一个 JSON 文档解析
    if let Some(content) = machine.into_non_sse_content() {
        match serde_json::from_str::<T>(&content) {
            Ok(item) => {
                let _ = tx.send(Ok(item)).await;
            }
            Err(e) => {
                tracing::warn!("[SSE] 非 SSE 内容解析失败: {}", e);
                let _ = tx
                    .send(Err(StreamError::Format(format!(
                        "非 SSE 内容无法解析: {e}"
                    ))))
                    .await;
            }
        }
    }
}

/// 把一行喂给状态机并处理结果；返回 `false` 表示 worker 应停止
async fn feed_line<T>(
    machine: &mut SseStateMachine,
    line: &str,
    tx: &mpsc::Sender<Result<T, StreamError>>,
) -> bool
where
    T: DeserializeOwned + Send + 'static,
{
    match machine.feed(line) {
        LineOutcome::Ignore => true,
        LineOutcome::Emit(payload) => match serde_json::from_str::<T>(&payload) {
            Ok(item) => tx.send(Ok(item)).await.is_ok(),
            Err(e) => {
                // 单个事件解析失败即异常关闭，不跳过继续
                let _ = tx.send(Err(StreamError::Parse(e.to_string()))).await;
                false
            }
        },
        LineOutcome::Done => {
            tracing::debug!("[SSE] 收到结束哨兵，流正常完成");
            false
        }
        LineOutcome::Fail(e) => {
            tracing::warn!("[SSE] 协议违规: {}", e);
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

fn to_line(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// ============================================================================
// 行状态机
// ============================================================================

/// 一行输入驱动出的状态迁移结果
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    /// 无需动作
    Ignore,
    /// 发出一个事件载荷
    Emit(String),
    /// 流正常结束（哨兵）
    Done,
    /// 协议违规，异常结束
    Fail(StreamError),
}

/// 双框架模式的行状态机
///
/// 框架模式从内容中发现：出现过 `data:` 事件即进入事件框架；
/// 否则累积非空行，留给流结束时的单文档回退。
struct SseStateMachine {
    /// 待 flush 的 `data:` 载荷
    pending: Option<String>,
    /// 是否已进入事件框架模式
    saw_event_framing: bool,
    /// 非 SSE 模式下累积的内容
    non_sse: String,
}

impl SseStateMachine {
    fn new() -> Self {
        Self {
            pending: None,
            saw_event_framing: false,
            non_sse: String::new(),
        }
    }

    fn feed(&mut self, line: &str) -> LineOutcome {
        if line.starts_with("event:") {
            // 跳过部分提供商发送的 event 框架行
            LineOutcome::Ignore
        } else if let Some(data) = line.strip_prefix("data:") {
            self.saw_event_framing = true;
            self.pending = Some(data.trim().to_string());
            LineOutcome::Ignore
        } else if line.is_empty() {
            match self.pending.take() {
                Some(payload) if payload == DONE_SENTINEL => LineOutcome::Done,
                Some(payload) => LineOutcome::Emit(payload),
                // 事件之间或流开头的空行
                None => LineOutcome::Ignore,
            }
        } else if !self.saw_event_framing && self.pending.is_none() {
            self.non_sse.push_str(line);
            LineOutcome::Ignore
        } else {
            LineOutcome::Fail(StreamError::Format(format!("无效的 SSE 行: {line}")))
        }
    }

    /// 流结束时取出累积的非 SSE 内容（事件框架模式下为 `None`）
    fn into_non_sse_content(self) -> Option<String> {
        if !self.saw_event_framing && !self.non_sse.is_empty() {
            Some(self.non_sse)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        a: i32,
    }

    fn byte_stream(chunks: Vec<&str>) -> ByteStream {
        let owned: Vec<Result<Bytes, StreamError>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        Box::pin(futures::stream::iter(owned))
    }

    async fn collect(mut stream: EventStream<Item>) -> Vec<Result<Item, StreamError>> {
        let mut items = Vec::new();
        while let Some(item) = stream.next_event().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_event_framing_emits_items_and_stops_at_sentinel() {
        let source = byte_stream(vec![
            "data: {\"a\":1}\n\ndata: {\"a\":2}\n\ndata: [DONE]\n\n",
        ]);
        let items = collect(decode_stream(source, 16)).await;
        assert_eq!(items.len(), 2);
        assert_eq!(*items[0].as_ref().unwrap(), Item { a: 1 });
        assert_eq!(*items[1].as_ref().unwrap(), Item { a: 2 });
    }

    #[tokio::test]
    async fn test_event_framing_across_chunk_boundaries() {
        // 行被拆在多个 chunk 中
        let source = byte_stream(vec!["data: {\"a\"", ":1}\n", "\ndata: [DONE]\n\n"]);
        let items = collect(decode_stream(source, 16)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(*items[0].as_ref().unwrap(), Item { a: 1 });
    }

    #[tokio::test]
    async fn test_event_lines_are_skipped() {
        let source = byte_stream(vec![
            "event: message\ndata: {\"a\":7}\n\ndata: [DONE]\n\n",
        ]);
        let items = collect(decode_stream(source, 16)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(*items[0].as_ref().unwrap(), Item { a: 7 });
    }

    #[tokio::test]
    async fn test_sentinel_is_never_emitted_on_clean_eof() {
        // 没有哨兵、EOF 结束也算正常完成
        let source = byte_stream(vec!["data: {\"a\":3}\n\n"]);
        let items = collect(decode_stream(source, 16)).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn test_non_sse_fallback_emits_single_document() {
        let source = byte_stream(vec!["{\"a\"", ":42}\n"]);
        let items = collect(decode_stream(source, 16)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(*items[0].as_ref().unwrap(), Item { a: 42 });
    }

    #[tokio::test]
    async fn test_non_sse_fallback_invalid_json_fails_stream() {
        let source = byte_stream(vec!["this is not json\n"]);
        let items = collect(decode_stream::<Item>(source, 16)).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamError::Format(_))));
    }

    #[tokio::test]
    async fn test_invalid_line_after_event_framing_fails_stream() {
        let source = byte_stream(vec!["data: {\"a\":1}\n\ngarbage line\n"]);
        let items = collect(decode_stream::<Item>(source, 16)).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(StreamError::Format(_))));
    }

    #[tokio::test]
    async fn test_undecodable_payload_closes_exceptionally() {
        let source = byte_stream(vec!["data: {\"a\":1}\n\ndata: {broken\n\n"]);
        let items = collect(decode_stream::<Item>(source, 16)).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(StreamError::Parse(_))));
    }

    #[tokio::test]
    async fn test_transport_error_closes_exceptionally() {
        let chunks: Vec<Result<Bytes, StreamError>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\":1}\n\n")),
            Err(StreamError::Network("connection reset".to_string())),
        ];
        let source: ByteStream = Box::pin(futures::stream::iter(chunks));
        let items = collect(decode_stream::<Item>(source, 16)).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(StreamError::Network(_))));
    }

    #[tokio::test]
    async fn test_cancel_stops_emission() {
        let source = byte_stream(vec![
            "data: {\"a\":1}\n\ndata: {\"a\":2}\n\ndata: {\"a\":3}\n\ndata: [DONE]\n\n",
        ]);
        // 容量 1 保证 worker 在通道上阻塞，取消后不再有新事件
        let mut stream = decode_stream::<Item>(source, 1);
        let first = stream.next_event().await.unwrap().unwrap();
        assert_eq!(first, Item { a: 1 });

        stream.cancel();
        // 关闭后通道中最多还残留一个已缓冲的条目，随后必须结束
        let mut remaining = 0;
        while stream.next_event().await.is_some() {
            remaining += 1;
        }
        assert!(remaining <= 1);
    }

    #[tokio::test]
    async fn test_crlf_lines_are_handled() {
        let source = byte_stream(vec!["data: {\"a\":9}\r\n\r\ndata: [DONE]\r\n\r\n"]);
        let items = collect(decode_stream(source, 16)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(*items[0].as_ref().unwrap(), Item { a: 9 });
    }

    #[test]
    fn test_state_machine_blank_line_without_pending_is_ignored() {
        let mut machine = SseStateMachine::new();
        assert_eq!(machine.feed(""), LineOutcome::Ignore);
        assert_eq!(machine.feed("data: x"), LineOutcome::Ignore);
        assert_eq!(machine.feed(""), LineOutcome::Emit("x".to_string()));
        assert_eq!(machine.feed(""), LineOutcome::Ignore);
    }

    #[test]
    fn test_state_machine_data_prefix_is_trimmed() {
        let mut machine = SseStateMachine::new();
        machine.feed("data:   {\"a\":1}  ");
        assert_eq!(machine.feed(""), LineOutcome::Emit("{\"a\":1}".to_string()));
    }
}
