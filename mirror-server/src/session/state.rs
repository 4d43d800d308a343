// 屏幕镜像中继 - 会话共享状态
//
// 所有会话字段（状态、活动设备、分辨率、传输句柄、观看者集合）都在这一把锁后面。
// 锁内只做纯读写，不做任何网络I/O。

use crate::distribution::{ChunkSink, ViewerId};
use common::{Resolution, SessionStatus, StatusSnapshot};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type SharedState = Arc<Mutex<RelayState>>;

/// 控制通道写端，推送分辨率时在锁外使用
pub(crate) type ControlWriter = Arc<Mutex<OwnedWriteHalf>>;

/// 当前视频传输连接
#[derive(Debug)]
pub(crate) struct VideoHandle {
    pub peer: SocketAddr,
    /// 取消后读循环丢弃（关闭）该连接
    pub closer: CancellationToken,
}

pub struct RelayState {
    pub(crate) status: SessionStatus,
    pub(crate) active_id: Option<String>,
    pub(crate) serial: Option<String>,
    pub(crate) resolution: Resolution,
    /// 每次 start() 递增，旧会话的任务凭它判断自己是否过期
    pub(crate) generation: u64,
    /// 每次 start() 新建，从不复用
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) video: Option<VideoHandle>,
    pub(crate) video_port: Option<u16>,
    pub(crate) control: Option<ControlWriter>,
    /// 正在运行控制握手的会话代数
    pub(crate) control_generation: Option<u64>,
    pub(crate) viewers: HashMap<ViewerId, Arc<dyn ChunkSink>>,
    pub(crate) reconnects: u32,
    pub(crate) last_error: Option<String>,
}

impl RelayState {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            status: SessionStatus::Idle,
            active_id: None,
            serial: None,
            resolution,
            generation: 0,
            cancel: None,
            video: None,
            video_port: None,
            control: None,
            control_generation: None,
            viewers: HashMap::new(),
            reconnects: 0,
            last_error: None,
        }
    }

    pub fn shared(resolution: Resolution) -> SharedState {
        Arc::new(Mutex::new(Self::new(resolution)))
    }

    /// 任务所属的会话是否仍是当前会话且未被停止
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
            && self
                .cancel
                .as_ref()
                .map(|token| !token.is_cancelled())
                .unwrap_or(false)
    }

    /// 回到空闲并释放本会话的所有传输
    ///
    /// 观看者保留，下一次会话开始后继续接收。
    pub(crate) fn reset_to_idle(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.control.take();
        if let Some(video) = self.video.take() {
            debug!("Closing video transport from {}", video.peer);
            video.closer.cancel();
        }
        self.status = SessionStatus::Idle;
        self.active_id = None;
        self.serial = None;
        self.video_port = None;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            width: self.resolution.width,
            height: self.resolution.height,
            active_id: self.active_id.clone().unwrap_or_default(),
            video_port: self.video_port,
            viewers: self.viewers.len(),
            reconnects: self.reconnects,
            last_error: self.last_error.clone(),
        }
    }
}
