// 屏幕镜像中继 - 已配对设备注册表
//
// 以JSON文件持久化的键控列表，每次修改后整体写回。

use chrono::Utc;
use common::{DeviceRecord, MirrorError, Result};
use rand::RngCore;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
pub struct DeviceStore {
    path: PathBuf,
    devices: Arc<Mutex<Vec<DeviceRecord>>>,
}

impl DeviceStore {
    /// 打开注册表；文件不存在或无法解析时从空列表开始
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let devices = match tokio::fs::read(&path).await {
            Ok(data) => match serde_json::from_slice::<Vec<DeviceRecord>>(&data) {
                Ok(devices) => {
                    info!("Loaded {} paired device(s) from {:?}", devices.len(), path);
                    devices
                }
                Err(e) => {
                    warn!("Ignoring unreadable device file {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path,
            devices: Arc::new(Mutex::new(devices)),
        }
    }

    async fn save(&self, devices: &[DeviceRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(devices)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }

    /// 添加设备
    pub async fn add(&self, name: &str, serial: &str) -> Result<DeviceRecord> {
        let mut devices = self.devices.lock().await;
        let record = DeviceRecord {
            id: generate_id(),
            name: name.to_string(),
            serial: serial.to_string(),
            online: false,
            paired_at: Some(Utc::now()),
        };
        devices.push(record.clone());
        self.save(&devices).await?;
        info!("✓ Device paired: {} ({})", record.name, record.id);
        Ok(record)
    }

    /// 删除设备
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut devices = self.devices.lock().await;
        let before = devices.len();
        devices.retain(|d| d.id != id);
        if devices.len() == before {
            return Err(MirrorError::DeviceNotFound(id.to_string()));
        }
        self.save(&devices).await
    }

    /// 重命名设备
    pub async fn rename(&self, id: &str, name: &str) -> Result<()> {
        let mut devices = self.devices.lock().await;
        let device = devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| MirrorError::DeviceNotFound(id.to_string()))?;
        device.name = name.to_string();
        self.save(&devices).await
    }

    pub async fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.lock().await.iter().find(|d| d.id == id).cloned()
    }

    pub async fn all(&self) -> Vec<DeviceRecord> {
        self.devices.lock().await.clone()
    }

    /// 按在线序列号集合刷新所有设备，返回在线设备数
    pub async fn apply_online(&self, online_serials: &HashSet<String>) -> usize {
        let mut devices = self.devices.lock().await;
        let mut count = 0;
        for device in devices.iter_mut() {
            device.online = online_serials.contains(&device.serial);
            if device.online {
                count += 1;
            }
        }
        count
    }
}

/// 8位十六进制设备ID
fn generate_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
