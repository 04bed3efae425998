//! 推送通道连接
//!
//! 每个任务一条 WebSocket：`/ws/<job_id>`，只接收不发送

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Url;
use std::pin::Pin;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// 文本帧流；流结束即连接关闭，丢弃即断开连接
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// 打开推送连接的能力
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn open(&self, job_id: &str) -> Result<FrameStream>;
}

/// 由上游地址推导某个任务的推送地址
///
/// `http` → `ws`，`https` → `wss`，路径为 `/ws/<百分号编码的任务 ID>`
pub fn push_url(base: &Url, job_id: &str) -> Result<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::Config(format!("不支持的上游协议: {}", other)));
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Config(format!("无法切换到 {} 协议: {}", scheme, base)))?;
    url.set_path(&format!("/ws/{}", urlencoding::encode(job_id)));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// 基于 tokio-tungstenite 的推送连接
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: Url,
}

impl WsConnector {
    pub fn new(upstream_url: &str) -> Result<Self> {
        let base_url = Url::parse(upstream_url)
            .map_err(|e| ClientError::Config(format!("上游地址无效 {}: {}", upstream_url, e)))?;
        Ok(Self { base_url })
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn open(&self, job_id: &str) -> Result<FrameStream> {
        let url = push_url(&self.base_url, job_id)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Connect {
                job_id: job_id.to_string(),
                reason: e.to_string(),
            })?;
        debug!("推送通道已建立: {}", url);

        let job = job_id.to_string();
        let frames = ws_stream.filter_map(move |message| {
            let job = job.clone();
            async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => Some(Ok(text)),
                        Err(_) => {
                            warn!("忽略非 UTF-8 二进制帧: {}", job);
                            None
                        }
                    },
                    // Ping/Pong 由 tungstenite 自动应答，Close 之后流自然结束
                    Ok(_) => None,
                    Err(e) => Some(Err(ClientError::Transport(e.to_string()))),
                }
            }
        });

        Ok(Box::pin(frames))
    }
}
