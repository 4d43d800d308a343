mod agent;
mod config;

use anyhow::Result;
use clap::{value_parser, Arg, Command};
use common::Resolution;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("📱 Device simulator starting...");

    // 解析命令行参数
    let matches = Command::new("device-simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stands in for the on-device capture agent")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Raw stream file to send in a loop")
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    // 加载配置
    let mut config =
        config::Config::load_from(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    if let Some(file) = matches.get_one::<PathBuf>("file") {
        config.source_file = Some(file.clone());
    }
    info!("✓ Configuration loaded");
    info!("  Video: {}", config.video_addr());
    info!("  Control: {}", config.control_addr());

    let source = agent::ChunkSource::open(config.source_file.as_deref()).await?;
    match &config.source_file {
        Some(path) => info!("✓ Streaming file {:?}", path),
        None => info!("⚠️  No source file configured, sending synthetic data"),
    }

    let token = CancellationToken::new();
    let (resolution_tx, _resolution_rx) = watch::channel(Resolution::default());

    let video = tokio::spawn(agent::run_video(config.clone(), source, token.clone()));
    let control = tokio::spawn(agent::run_control(config, resolution_tx, token.clone()));

    info!("✅ Device simulator ready!");
    info!("   Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    token.cancel();
    let _ = tokio::join!(video, control);

    Ok(())
}
