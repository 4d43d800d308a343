use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use mirror_server::bridge::{AdbBridge, DeviceBridge, TunnelManager};
use mirror_server::config::Config;
use mirror_server::device::{DeviceManager, DeviceStore};
use mirror_server::distribution::FfplaySink;
use mirror_server::http::{AppState, HttpServer};
use mirror_server::pairing::PairingManager;
use mirror_server::session::{CaptureSession, RelayState};
use common::Resolution;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("🚀 Screen mirror server starting...");

    // 解析命令行参数
    let matches = Command::new("mirror-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Relays an Android screen capture stream to browser and player viewers")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("HTTP listening port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("player")
                .long("player")
                .help("Open a local ffplay window as a viewer")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // 加载配置
    let mut config = Config::load_from(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    if let Some(port) = matches.get_one::<u16>("port") {
        config.http_port = *port;
    }
    if matches.get_flag("player") {
        config.player_enabled = true;
    }
    info!("✓ Configuration loaded");

    let store = DeviceStore::open(&config.devices_path).await;
    let bridge: Arc<dyn DeviceBridge> = Arc::new(AdbBridge::new(config.adb_path.clone()));
    let devices = DeviceManager::new(store, bridge.clone());

    let http_port = config.forward_http.then_some(config.http_port);
    let tunnel = TunnelManager::new(bridge.clone(), config.device_video_port).with_http_port(http_port);
    let session = CaptureSession::new(
        RelayState::shared(Resolution::default()),
        tunnel,
        config.session_settings(),
    );
    info!("✓ Session initialized");

    if config.player_enabled {
        match FfplaySink::spawn(&config.ffplay_path, "Screen Mirror") {
            Ok(player) => {
                session.hub().register(Arc::new(player)).await;
            }
            Err(e) => warn!("⚠️  Player not started: {}", e),
        }
    }

    let shutdown = CancellationToken::new();
    let poller = devices.spawn_poller(config.poll_interval, shutdown.child_token());

    let state = AppState {
        session: session.clone(),
        devices,
        pairing: PairingManager::new(),
        bridge,
        http_port: config.http_port,
    };
    let server = HttpServer::new(config.http_addr(), config.web_root.clone(), state);
    let mut server_handle = tokio::spawn(server.run(shutdown.child_token()));

    info!("✅ Screen mirror server ready!");

    let server_finished = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
            false
        }
        result = &mut server_handle => {
            log_server_exit(result);
            true
        }
    };

    session.stop().await;
    shutdown.cancel();
    let _ = poller.await;

    // 等待HTTP服务器完成优雅关闭
    if !server_finished {
        log_server_exit(server_handle.await);
    }

    Ok(())
}

fn log_server_exit(result: Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
        Ok(Ok(())) => info!("✓ HTTP server stopped"),
    }
}
