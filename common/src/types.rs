use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 镜像分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD_1080: Resolution = Resolution::new(1920, 1080);
    pub const HD_720: Resolution = Resolution::new(1280, 720);
    pub const SD_480: Resolution = Resolution::new(854, 480);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 按预设名称解析（"1080" / "720" / "480"），未知值回落到720p
    pub fn from_preset(preset: Option<&str>) -> Self {
        match preset {
            Some("1080") => Self::HD_1080,
            Some("480") => Self::SD_480,
            _ => Self::HD_720,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD_720
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 采集会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Streaming,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Streaming => "streaming",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会话快照（/api/status 的响应体）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub width: u32,
    pub height: u32,
    pub active_id: String,
    /// 主机侧视频监听端口（未监听时为None）
    pub video_port: Option<u16>,
    pub viewers: usize,
    /// 本次会话的重连次数
    pub reconnects: u32,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// 已配对设备记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    /// ADB序列号
    pub serial: String,
    /// 在线状态由轮询维护
    #[serde(default)]
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_at: Option<DateTime<Utc>>,
}
