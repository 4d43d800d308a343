use super::registry::DeviceStore;
use crate::bridge::DeviceBridge;
use crate::session::SessionError;
use common::{DeviceRecord, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 设备管理：注册表 + 通过设备桥维护在线状态
#[derive(Clone)]
pub struct DeviceManager {
    store: DeviceStore,
    bridge: Arc<dyn DeviceBridge>,
}

impl DeviceManager {
    pub fn new(store: DeviceStore, bridge: Arc<dyn DeviceBridge>) -> Self {
        Self { store, bridge }
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    /// 查找可以开始采集的设备
    pub async fn lookup_for_capture(&self, id: &str) -> std::result::Result<DeviceRecord, SessionError> {
        let device = self
            .store
            .get(id)
            .await
            .ok_or_else(|| SessionError::InvalidRequest("device not found".to_string()))?;
        if !device.online {
            return Err(SessionError::InvalidRequest("device offline".to_string()));
        }
        Ok(device)
    }

    /// 当前通过设备桥连接的序列号
    pub async fn connected_serials(&self) -> Result<Vec<String>> {
        self.bridge.connected_serials().await
    }

    /// 轮询一次在线状态，返回在线的已配对设备数
    ///
    /// 设备桥不可用时保持原有状态不变。
    pub async fn poll_online(&self) -> Result<usize> {
        let serials: HashSet<String> = self.bridge.connected_serials().await?.into_iter().collect();
        Ok(self.store.apply_online(&serials).await)
    }

    /// 启动周期性在线轮询
    pub fn spawn_poller(&self, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            info!("Device liveness poll every {:?}", interval);
            let mut last_online = None;
            loop {
                match manager.poll_online().await {
                    Ok(online) => {
                        if last_online != Some(online) {
                            info!("{} paired device(s) online", online);
                            last_online = Some(online);
                        }
                    }
                    Err(e) => debug!("Device poll skipped: {}", e),
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            warn!("Device liveness poll stopped");
        })
    }
}
