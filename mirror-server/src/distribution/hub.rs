// 屏幕镜像中继 - 广播中心
//
// 观看者集合与会话状态共用同一把锁；锁内只做集合的增删与快照，
// 所有写操作都在锁外完成。
//
// 已知限制：没有缓冲和背压，某个观看者写得慢会拖住本轮分发，
// 其余观看者要等它写完才能收到同一分块。

use crate::session::SharedState;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ViewerId = Uuid;

/// 观看者写入失败
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("viewer closed")]
    Closed,

    #[error("viewer write failed: {0}")]
    Write(String),
}

/// 接收有序字节分块的观看者
///
/// 与具体传输无关：WebSocket、播放器子进程、测试替身都实现它。
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// 写入一个分块，失败后该观看者会被移除
    async fn send_chunk(&self, chunk: Bytes) -> Result<(), SinkError>;

    /// 关闭底层传输
    async fn close(&self);

    /// 日志里使用的名称
    fn label(&self) -> String {
        "viewer".to_string()
    }
}

/// 广播中心
#[derive(Clone)]
pub struct BroadcastHub {
    state: SharedState,
}

impl BroadcastHub {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// 注册观看者，只接收注册之后发布的分块
    pub async fn register(&self, sink: Arc<dyn ChunkSink>) -> ViewerId {
        let id = Uuid::new_v4();
        let label = sink.label();
        let total = {
            let mut state = self.state.lock().await;
            state.viewers.insert(id, sink);
            state.viewers.len()
        };
        info!("👀 Viewer {} registered ({}), {} active", id, label, total);
        id
    }

    /// 注销并关闭观看者；返回它是否仍在集合中
    pub async fn deregister(&self, id: ViewerId) -> bool {
        let removed = self.state.lock().await.viewers.remove(&id);
        match removed {
            Some(sink) => {
                sink.close().await;
                debug!("Viewer {} deregistered", id);
                true
            }
            None => false,
        }
    }

    pub async fn viewer_count(&self) -> usize {
        self.state.lock().await.viewers.len()
    }

    /// 把分块发给当前所有观看者
    ///
    /// 单个观看者写失败只会移除它自己，不影响其余观看者；
    /// 返回成功送达的观看者数。
    pub async fn publish(&self, chunk: Bytes) -> usize {
        let targets: Vec<(ViewerId, Arc<dyn ChunkSink>)> = {
            let state = self.state.lock().await;
            state
                .viewers
                .iter()
                .map(|(id, sink)| (*id, sink.clone()))
                .collect()
        };

        if targets.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, sink) in targets {
            match sink.send_chunk(chunk.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping viewer {} ({}): {}", id, sink.label(), e);
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.deregister(id).await;
        }

        delivered
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// 把收到的分块记下来的观看者替身
    #[derive(Default)]
    pub struct RecordingSink {
        pub received: Mutex<Vec<Bytes>>,
        pub fail: AtomicBool,
        pub closed: AtomicBool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            let sink = Self::default();
            sink.fail.store(true, Ordering::SeqCst);
            sink
        }

        pub fn received(&self) -> Vec<Bytes> {
            self.received.lock().unwrap().clone()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn send_chunk(&self, chunk: Bytes) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Write("broken pipe".to_string()));
            }
            self.received.lock().unwrap().push(chunk);
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
