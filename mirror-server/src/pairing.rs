// 屏幕镜像中继 - 配对
//
// 页面显示六位配对码，设备端输入后确认；配对码只能使用一次。

use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct PairingManager {
    code: Arc<Mutex<Option<String>>>,
}

impl PairingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成新的配对码，替换之前未使用的配对码
    pub async fn generate_code(&self) -> String {
        let code = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        *self.code.lock().await = Some(code.clone());
        info!("🔑 Pairing code issued");
        code
    }

    /// 校验配对码；成功后配对码失效
    pub async fn confirm(&self, code: &str) -> bool {
        let mut current = self.code.lock().await;
        match current.as_deref() {
            Some(expected) if !code.is_empty() && expected == code => {
                *current = None;
                true
            }
            _ => {
                warn!("⚠️  Pairing attempt with invalid code");
                false
            }
        }
    }
}

/// 本机名称，用于设备端展示
pub fn pc_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "PC".to_string())
}
