use super::AppState;
use crate::distribution::{ChunkSink, SinkError};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// WebSocket 观看者：每个分块作为一条二进制消息发送
struct WsSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl ChunkSink for WsSink {
    async fn send_chunk(&self, chunk: Bytes) -> Result<(), SinkError> {
        self.tx
            .lock()
            .await
            .send(Message::Binary(chunk.to_vec()))
            .await
            .map_err(|e| SinkError::Write(e.to_string()))
    }

    async fn close(&self) {
        let _ = self.tx.lock().await.close().await;
    }

    fn label(&self) -> String {
        "websocket".to_string()
    }
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// 注册为观看者，读到关闭或出错后注销
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = socket.split();
    let hub = state.session.hub().clone();
    let id = hub.register(Arc::new(WsSink { tx: Mutex::new(tx) })).await;

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            // 客户端发来的其它消息忽略
            Ok(_) => {}
        }
    }

    // 分发失败时可能已被移除
    hub.deregister(id).await;
    debug!("WebSocket viewer {} disconnected", id);
}
