//! 推送通道桥接
//!
//! 页面连接 `/ws/<job_id>`，代理再连上游同名地址，文本/二进制/关闭帧双向转发

use crate::server::state::ProxyState;
use crate::tracker::push_url;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame},
    tungstenite::Message as UpstreamMessage,
};
use tracing::{debug, info, warn};

/// WebSocket 路由处理器
pub async fn handle_push_bridge(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<ProxyState>,
) -> Response {
    let url = match push_url(&state.upstream_url, &job_id) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    };
    ws.on_upgrade(move |socket| async move {
        // 推送连接期间算作一个打开的页面
        let client = state.host.client_opened();
        bridge_socket(socket, url, &job_id).await;
        drop(client);
        state.host.activate_if_ready().await;
    })
}

async fn bridge_socket(socket: WebSocket, url: Url, job_id: &str) {
    let upstream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            // 丢弃 socket 即关闭页面一侧，页面按连接失败处理
            warn!("推送桥接连接上游失败: {} - {}", job_id, e);
            return;
        }
    };
    info!("推送桥接已建立: {}", job_id);

    let (mut client_tx, mut client_rx) = socket.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    // 上游 → 页面
    let mut downstream_task = tokio::spawn(async move {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client_message(message) else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    });

    // 页面 → 上游
    let mut upstream_task = tokio::spawn(async move {
        while let Some(Ok(message)) = client_rx.next().await {
            let Some(message) = to_upstream_message(message) else {
                continue;
            };
            let closing = matches!(message, UpstreamMessage::Close(_));
            if upstream_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    });

    // 任一方向结束就拆掉整条桥
    tokio::select! {
        _ = &mut downstream_task => {
            debug!("上游方向结束: {}", job_id);
            upstream_task.abort();
        }
        _ = &mut upstream_task => {
            debug!("页面方向结束: {}", job_id);
            downstream_task.abort();
        }
    }

    info!("推送桥接已关闭: {}", job_id);
}

/// Ping/Pong 由两端各自应答，不转发
fn to_client_message(message: UpstreamMessage) -> Option<Message> {
    match message {
        UpstreamMessage::Text(text) => Some(Message::Text(text)),
        UpstreamMessage::Binary(data) => Some(Message::Binary(data)),
        UpstreamMessage::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason,
        }))),
        _ => None,
    }
}

fn to_upstream_message(message: Message) -> Option<UpstreamMessage> {
    match message {
        Message::Text(text) => Some(UpstreamMessage::Text(text)),
        Message::Binary(data) => Some(UpstreamMessage::Binary(data)),
        Message::Close(frame) => Some(UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason,
        }))),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}
