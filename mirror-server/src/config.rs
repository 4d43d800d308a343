use crate::session::{ReconnectPolicy, RetryStrategy, SessionSettings};
use anyhow::{Context, Result};
use common::{CONTROL_PORT, DEFAULT_CHUNK_SIZE, DEVICE_VIDEO_PORT};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "mirror.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,
    /// 设备端视频端口（adb reverse 的设备侧）
    pub device_video_port: u16,
    pub control_port: u16,
    pub chunk_size: usize,
    pub devices_path: PathBuf,
    pub web_root: PathBuf,
    pub poll_interval: Duration,
    pub adb_path: String,
    /// 本地 ffplay 窗口
    pub player_enabled: bool,
    pub ffplay_path: String,
    /// 建立隧道时一并转发HTTP端口
    pub forward_http: bool,
    pub reconnect: ReconnectPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            device_video_port: DEVICE_VIDEO_PORT,
            control_port: CONTROL_PORT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            devices_path: PathBuf::from("devices.json"),
            web_root: PathBuf::from("web"),
            poll_interval: Duration::from_secs(3),
            adb_path: "adb".to_string(),
            player_enabled: false,
            ffplay_path: "ffplay".to_string(),
            forward_http: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// 配置文件内容，所有字段可选，时长单位为毫秒
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    http_host: Option<String>,
    http_port: Option<u16>,
    device_video_port: Option<u16>,
    control_port: Option<u16>,
    chunk_size: Option<usize>,
    devices_path: Option<PathBuf>,
    web_root: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
    adb_path: Option<String>,
    player: Option<bool>,
    ffplay_path: Option<String>,
    forward_http: Option<bool>,
    reconnect: Option<FileReconnect>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileReconnect {
    max_attempts: Option<u32>,
    strategy: Option<String>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    accept_timeout_ms: Option<u64>,
}

impl Config {
    /// 加载配置：默认值，再由 `$MIRROR_CONFIG` 或 `mirror.toml` 覆盖
    pub fn load() -> Result<Self> {
        match std::env::var_os("MIRROR_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// 命令行指定的配置文件优先
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&text).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(text)?;
        let mut config = Self::default();

        if let Some(v) = file.http_host {
            config.http_host = v;
        }
        if let Some(v) = file.http_port {
            config.http_port = v;
        }
        if let Some(v) = file.device_video_port {
            config.device_video_port = v;
        }
        if let Some(v) = file.control_port {
            config.control_port = v;
        }
        if let Some(v) = file.chunk_size {
            anyhow::ensure!(v > 0, "chunk_size must be positive");
            config.chunk_size = v;
        }
        if let Some(v) = file.devices_path {
            config.devices_path = v;
        }
        if let Some(v) = file.web_root {
            config.web_root = v;
        }
        if let Some(v) = file.poll_interval_ms {
            config.poll_interval = Duration::from_millis(v.max(1));
        }
        if let Some(v) = file.adb_path {
            config.adb_path = v;
        }
        if let Some(v) = file.player {
            config.player_enabled = v;
        }
        if let Some(v) = file.ffplay_path {
            config.ffplay_path = v;
        }
        if let Some(v) = file.forward_http {
            config.forward_http = v;
        }

        if let Some(r) = file.reconnect {
            let policy = &mut config.reconnect;
            if let Some(v) = r.max_attempts {
                policy.max_attempts = v;
            }
            if let Some(v) = r.strategy {
                policy.retry_strategy = parse_strategy(&v)?;
            }
            if let Some(v) = r.backoff_base_ms {
                policy.backoff_base = Duration::from_millis(v);
            }
            if let Some(v) = r.backoff_max_ms {
                policy.backoff_max = Duration::from_millis(v);
            }
            if let Some(v) = r.accept_timeout_ms {
                policy.accept_timeout = Duration::from_millis(v);
            }
        }

        Ok(config)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            control_port: self.control_port,
            chunk_size: self.chunk_size,
            reconnect: self.reconnect.clone(),
        }
    }
}

fn parse_strategy(value: &str) -> Result<RetryStrategy> {
    match value.to_ascii_lowercase().as_str() {
        "immediate" => Ok(RetryStrategy::Immediate),
        "exponential" => Ok(RetryStrategy::ExponentialBackoff),
        "linear" => Ok(RetryStrategy::LinearBackoff),
        other => anyhow::bail!("unknown reconnect strategy: {}", other),
    }
}
