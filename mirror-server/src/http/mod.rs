// 屏幕镜像中继 - HTTP / WebSocket 接口

mod handlers;
mod routes;
mod server;
mod ws;

use crate::bridge::DeviceBridge;
use crate::device::DeviceManager;
use crate::pairing::PairingManager;
use crate::session::CaptureSession;
use std::sync::Arc;

pub use routes::create_router;
pub use server::HttpServer;

/// 处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub session: CaptureSession,
    pub devices: DeviceManager,
    pub pairing: PairingManager,
    pub bridge: Arc<dyn DeviceBridge>,
    /// 页面所在端口，配对时反向转发给设备
    pub http_port: u16,
}
