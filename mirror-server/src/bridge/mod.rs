// 屏幕镜像中继 - 设备桥
//
// 设备桥（adb）以子进程方式调用，负责两件事：
// 建立 `adb reverse` 端口转发，以及枚举当前在线的设备序列号。

mod tunnel;

pub use tunnel::TunnelManager;

use async_trait::async_trait;
use common::{MirrorError, Result};
use tokio::process::Command;
use tracing::debug;

/// 设备桥抽象
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// 把设备侧 `remote_port` 反向转发到主机侧 `local_port`
    ///
    /// `serial` 为空时不指定设备（adb 使用唯一连接的设备）。
    async fn reverse(&self, serial: &str, remote_port: u16, local_port: u16) -> Result<()>;

    /// 当前处于 `device` 状态的序列号
    async fn connected_serials(&self) -> Result<Vec<String>>;
}

/// 基于 adb 命令行的设备桥
#[derive(Debug, Clone)]
pub struct AdbBridge {
    program: String,
}

impl AdbBridge {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn reverse_args(serial: &str, remote_port: u16, local_port: u16) -> Vec<String> {
        let mut args = Vec::with_capacity(5);
        if !serial.is_empty() {
            args.push("-s".to_string());
            args.push(serial.to_string());
        }
        args.push("reverse".to_string());
        args.push(format!("tcp:{}", remote_port));
        args.push(format!("tcp:{}", local_port));
        args
    }
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::new("adb")
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn reverse(&self, serial: &str, remote_port: u16, local_port: u16) -> Result<()> {
        let args = Self::reverse_args(serial, remote_port, local_port);
        debug!("{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| MirrorError::BridgeError(format!("failed to run {}: {}", self.program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MirrorError::BridgeError(format!(
                "{} reverse tcp:{} tcp:{} exited with {}: {}",
                self.program,
                remote_port,
                local_port,
                output.status,
                stderr.trim()
            )))
        }
    }

    async fn connected_serials(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.program)
            .arg("devices")
            .output()
            .await
            .map_err(|e| MirrorError::BridgeError(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(MirrorError::BridgeError(format!(
                "{} devices exited with {}",
                self.program, output.status
            )));
        }

        Ok(parse_device_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// 解析 `adb devices` 输出
///
/// 跳过首行标题，只保留第二列为 `device` 的序列号
/// （`offline`、`unauthorized` 等状态视为不在线）。
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}
