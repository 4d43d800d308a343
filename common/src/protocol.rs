use crate::error::{MirrorError, Result};
use crate::types::Resolution;
use serde::{Deserialize, Serialize};

/// 设备端采集代理连接的视频端口（adb reverse 的设备侧端口）
pub const DEVICE_VIDEO_PORT: u16 = 15557;

/// 控制通道端口（设备侧与主机侧相同）
pub const CONTROL_PORT: u16 = 15558;

/// 视频读取分块大小
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// 控制指令：主机 -> 设备，每次控制握手发送一行JSON
///
/// 线上格式为 `{"width":W,"height":H}\n`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDirective {
    pub width: u32,
    pub height: u32,
}

impl ControlDirective {
    /// 编码为以换行结尾的一行
    pub fn encode_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// 解析一行（容忍结尾的换行和空白）
    pub fn parse_line(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(MirrorError::ProtocolError("empty control line".to_string()));
        }
        let directive: Self = serde_json::from_str(trimmed)?;
        if directive.width == 0 || directive.height == 0 {
            return Err(MirrorError::InvalidParameter(format!(
                "zero dimension in directive: {}x{}",
                directive.width, directive.height
            )));
        }
        Ok(directive)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl From<Resolution> for ControlDirective {
    fn from(res: Resolution) -> Self {
        Self {
            width: res.width,
            height: res.height,
        }
    }
}
