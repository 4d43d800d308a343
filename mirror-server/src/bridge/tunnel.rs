use super::DeviceBridge;
use crate::session::SessionError;
use std::sync::Arc;
use tracing::{debug, info};

/// 隧道管理器
///
/// 每次会话启动和每次重连都会原样重新下发转发请求，
/// 设备侧重连后桥的转发状态不保证仍然存在。
#[derive(Clone)]
pub struct TunnelManager {
    bridge: Arc<dyn DeviceBridge>,
    /// 采集代理连接的设备侧视频端口
    device_video_port: u16,
    /// 重连时顺带恢复的HTTP端口转发
    http_port: Option<u16>,
}

impl TunnelManager {
    pub fn new(bridge: Arc<dyn DeviceBridge>, device_video_port: u16) -> Self {
        Self {
            bridge,
            device_video_port,
            http_port: None,
        }
    }

    pub fn with_http_port(mut self, http_port: Option<u16>) -> Self {
        self.http_port = http_port;
        self
    }

    /// 建立视频与控制两条反向隧道
    ///
    /// 视频：设备固定端口 -> 主机临时端口；控制：设备固定端口 -> 主机同号端口。
    pub async fn establish(
        &self,
        serial: &str,
        video_local_port: u16,
        control_port: u16,
    ) -> Result<(), SessionError> {
        self.forward(serial, self.device_video_port, video_local_port).await?;
        self.forward(serial, control_port, control_port).await?;

        if let Some(http_port) = self.http_port {
            self.forward(serial, http_port, http_port).await?;
        }

        info!(
            "✓ Tunnels active for {}: video {}->{}, control {}",
            display_serial(serial),
            self.device_video_port,
            video_local_port,
            control_port
        );
        Ok(())
    }

    async fn forward(&self, serial: &str, remote: u16, local: u16) -> Result<(), SessionError> {
        debug!("reverse tcp:{} -> tcp:{} for {}", remote, local, display_serial(serial));
        self.bridge
            .reverse(serial, remote, local)
            .await
            .map_err(|e| SessionError::Tunnel {
                reason: e.to_string(),
            })
    }
}

fn display_serial(serial: &str) -> &str {
    if serial.is_empty() {
        "<default device>"
    } else {
        serial
    }
}
