use anyhow::{Context, Result};
use common::{CONTROL_PORT, DEFAULT_CHUNK_SIZE, DEVICE_VIDEO_PORT};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// 隧道的设备侧地址
    pub host: String,
    pub video_port: u16,
    pub control_port: u16,
    pub chunk_size: usize,
    /// 两个分块之间的间隔
    pub chunk_interval: Duration,
    /// 循环发送的码流文件，未设置时发送合成数据
    pub source_file: Option<PathBuf>,
    pub redial_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            video_port: DEVICE_VIDEO_PORT,
            control_port: CONTROL_PORT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_interval: Duration::from_millis(33),
            source_file: None,
            redial_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    host: Option<String>,
    video_port: Option<u16>,
    control_port: Option<u16>,
    chunk_size: Option<usize>,
    chunk_interval_ms: Option<u64>,
    source_file: Option<PathBuf>,
    redial_interval_ms: Option<u64>,
}

impl Config {
    /// 默认值，`$SIMULATOR_CONFIG` 指向的TOML文件可覆盖
    pub fn load() -> Result<Self> {
        match std::env::var_os("SIMULATOR_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(text)?;
        let defaults = Self::default();
        let chunk_size = file.chunk_size.unwrap_or(defaults.chunk_size);
        anyhow::ensure!(chunk_size > 0, "chunk_size must be positive");

        Ok(Self {
            host: file.host.unwrap_or(defaults.host),
            video_port: file.video_port.unwrap_or(defaults.video_port),
            control_port: file.control_port.unwrap_or(defaults.control_port),
            chunk_size,
            chunk_interval: file
                .chunk_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.chunk_interval),
            source_file: file.source_file.or(defaults.source_file),
            redial_interval: file
                .redial_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.redial_interval),
        })
    }

    pub fn video_addr(&self) -> String {
        format!("{}:{}", self.host, self.video_port)
    }

    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.host, self.control_port)
    }
}
