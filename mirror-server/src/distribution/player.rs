// 屏幕镜像中继 - ffplay 播放器观看者
//
// 独立模式下把原始码流写进 ffplay 的标准输入，
// 中继只负责按序交付字节，解码和显示由 ffplay 完成。

use super::hub::{ChunkSink, SinkError};
use async_trait::async_trait;
use bytes::Bytes;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 低延迟播放参数
pub fn ffplay_args(window_title: &str) -> Vec<String> {
    [
        "-fflags",
        "nobuffer+discardcorrupt",
        "-flags",
        "low_delay",
        "-framedrop",
        "-vf",
        "setpts=0",
        "-i",
        "pipe:0",
        "-window_title",
        window_title,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 以 ffplay 子进程为观看者
pub struct FfplaySink {
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Child>,
}

impl FfplaySink {
    /// 启动播放器进程
    pub fn spawn(program: &str, window_title: &str) -> std::io::Result<Self> {
        let mut child = TokioCommand::new(program)
            .args(ffplay_args(window_title))
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "player stdin unavailable")
        })?;

        info!("🎬 Player started: {} (pid {:?})", program, child.id());

        Ok(Self {
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(child),
        })
    }
}

#[async_trait]
impl ChunkSink for FfplaySink {
    async fn send_chunk(&self, chunk: Bytes) -> Result<(), SinkError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(SinkError::Closed)?;
        stdin
            .write_all(&chunk)
            .await
            .map_err(|e| SinkError::Write(e.to_string()))
    }

    async fn close(&self) {
        // 先关闭stdin让播放器读到EOF
        self.stdin.lock().await.take();

        let mut child = self.child.lock().await;
        match child.wait().await {
            Ok(status) => info!("Player exited: {}", status),
            Err(e) => warn!("Failed to wait for player: {}", e),
        }
    }

    fn label(&self) -> String {
        "ffplay".to_string()
    }
}
