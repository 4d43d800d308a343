// 屏幕镜像中继 - 控制通道
//
// 每个会话只握手一次：在固定端口上接受一个连接，立即推送当前分辨率，
// 然后阻塞读取以检测对端断开。断开后不会自动重建，下一次 start() 才会重新握手。

use super::error::SessionError;
use super::state::{ControlWriter, SharedState};
use common::{ControlDirective, Resolution};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 端口被占用时的重新绑定间隔
const REBIND_INTERVAL: Duration = Duration::from_millis(500);

pub(crate) struct ControlContext {
    pub state: SharedState,
    pub generation: u64,
    pub token: CancellationToken,
    pub bind_host: IpAddr,
    pub port: u16,
}

/// 启动本会话的控制握手
///
/// 同一会话重复调用会被拒绝（`ControlBusy`），不会排队。
pub(crate) async fn spawn_handshake(ctx: ControlContext) -> Result<JoinHandle<()>, SessionError> {
    {
        let mut state = ctx.state.lock().await;
        if !state.is_current(ctx.generation) {
            return Err(SessionError::Cancelled);
        }
        if state.control_generation == Some(ctx.generation) {
            warn!("Control handshake already running, skipping");
            return Err(SessionError::ControlBusy);
        }
        state.control_generation = Some(ctx.generation);
    }

    Ok(tokio::spawn(run(ctx)))
}

async fn run(ctx: ControlContext) {
    match handshake(&ctx).await {
        Ok(()) => info!("Control channel closed"),
        Err(SessionError::Cancelled) => debug!("Control handshake cancelled"),
        Err(e) => warn!("Control channel ended: {}", e),
    }

    let mut state = ctx.state.lock().await;
    if state.control_generation == Some(ctx.generation) {
        state.control_generation = None;
    }
    if state.generation == ctx.generation {
        state.control = None;
    }
}

async fn handshake(ctx: &ControlContext) -> Result<(), SessionError> {
    let listener = bind_with_retry(ctx).await?;

    let accepted = tokio::select! {
        _ = ctx.token.cancelled() => return Err(SessionError::Cancelled),
        accepted = listener.accept() => accepted,
    };
    let (stream, peer) = accepted.map_err(|e| SessionError::Accept(e.to_string()))?;
    // 每轮握手一个监听端点，接受后即关闭
    drop(listener);

    info!("🎛️  Control channel established with {}", peer);
    let (mut reader, writer) = stream.into_split();
    let writer: ControlWriter = Arc::new(Mutex::new(writer));

    {
        // 先占住写端再读取分辨率，保证并发的 set_resolution 推送排在首条指令之后
        let mut guard = writer.lock().await;
        let resolution = {
            let mut state = ctx.state.lock().await;
            if !state.is_current(ctx.generation) {
                return Err(SessionError::Cancelled);
            }
            state.control = Some(writer.clone());
            state.resolution
        };
        write_directive(&mut guard, resolution).await?;
    }

    // 设备端不会发送控制消息，读取只用于检测断开
    let mut buf = [0u8; 1];
    loop {
        let read = tokio::select! {
            _ = ctx.token.cancelled() => return Err(SessionError::Cancelled),
            read = reader.read(&mut buf) => read,
        };
        match read {
            Ok(0) => return Ok(()),
            Ok(_) => debug!("Ignoring unexpected byte on control channel"),
            Err(e) => return Err(SessionError::TransientDisconnect(e.to_string())),
        }
    }
}

async fn bind_with_retry(ctx: &ControlContext) -> Result<TcpListener, SessionError> {
    let addr = SocketAddr::new(ctx.bind_host, ctx.port);
    loop {
        let bound = tokio::select! {
            _ = ctx.token.cancelled() => return Err(SessionError::Cancelled),
            bound = TcpListener::bind(addr) => bound,
        };
        match bound {
            Ok(listener) => {
                debug!("Control listener bound on {}", addr);
                return Ok(listener);
            }
            Err(e) => {
                warn!("Control listen on {} failed: {}, retrying", addr, e);
                tokio::select! {
                    _ = ctx.token.cancelled() => return Err(SessionError::Cancelled),
                    _ = tokio::time::sleep(REBIND_INTERVAL) => {}
                }
            }
        }
    }
}

/// 在已持有的写端上写一条分辨率指令
pub(crate) async fn write_directive(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    resolution: Resolution,
) -> Result<(), SessionError> {
    let line = ControlDirective::from(resolution)
        .encode_line()
        .map_err(|e| SessionError::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
    info!("Sending resolution: {}", resolution);
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// 推送分辨率到已建立的控制通道
pub(crate) async fn push_directive(writer: &ControlWriter, resolution: Resolution) -> Result<(), SessionError> {
    let mut guard = writer.lock().await;
    write_directive(&mut guard, resolution).await
}
