// 屏幕镜像中继 - 视频接入循环
//
// 同一时刻只持有一个视频传输连接：
// 首次激活 accept -> 推流；读失败后若未被停止则在同一监听端点上重连，
// 每次重连都重新下发隧道转发。被接受的连接在任何退出路径上都会被丢弃（关闭）。

use super::error::{ReconnectPolicy, SessionError};
use super::state::{SharedState, VideoHandle};
use crate::bridge::TunnelManager;
use crate::distribution::BroadcastHub;
use bytes::Bytes;
use common::SessionStatus;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) struct IngestContext {
    pub state: SharedState,
    pub hub: BroadcastHub,
    pub tunnel: TunnelManager,
    pub serial: String,
    pub generation: u64,
    pub token: CancellationToken,
    pub control_port: u16,
    pub chunk_size: usize,
    pub policy: ReconnectPolicy,
}

/// 一次读循环的结束方式
enum PumpEnd {
    /// 连接被本会话主动关闭
    Closed,
    /// 对端断开或读出错
    Disconnected(SessionError),
}

/// 接入循环主体，监听端点由 start() 绑定并移交进来
pub(crate) async fn run(ctx: IngestContext, listener: TcpListener) {
    info!("Waiting for device video connection...");

    // 首次激活：accept失败是致命的，不重试
    let accepted = tokio::select! {
        _ = ctx.token.cancelled() => {
            debug!("Session stopped before device connected");
            return;
        }
        accepted = listener.accept() => accepted,
    };
    let (mut stream, mut peer) = match accepted {
        Ok(pair) => pair,
        Err(e) => {
            fail(&ctx, SessionError::Accept(e.to_string())).await;
            return;
        }
    };

    loop {
        let closer = match mark_streaming(&ctx, peer).await {
            Some(closer) => closer,
            None => return,
        };

        let end = pump(&ctx, stream, &closer).await;

        if ctx.token.is_cancelled() {
            info!("Stop requested, not reconnecting");
            return;
        }

        match end {
            PumpEnd::Closed => return,
            PumpEnd::Disconnected(e) => warn!("Video transport from {} dropped: {}", peer, e),
        }

        if !mark_reconnecting(&ctx).await {
            return;
        }

        match reconnect(&ctx, &listener).await {
            Ok((next, next_peer)) => {
                stream = next;
                peer = next_peer;
            }
            Err(SessionError::Cancelled) => {
                info!("Stop requested during reconnection");
                return;
            }
            Err(e) => {
                fail(&ctx, e).await;
                return;
            }
        }
    }
}

/// 读取分块并发布，直到读失败或连接被关闭
async fn pump(ctx: &IngestContext, mut stream: TcpStream, closer: &CancellationToken) -> PumpEnd {
    let mut buf = vec![0u8; ctx.chunk_size];
    let mut total: u64 = 0;

    let end = loop {
        let read = tokio::select! {
            _ = closer.cancelled() => break PumpEnd::Closed,
            read = stream.read(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                break PumpEnd::Disconnected(SessionError::TransientDisconnect(
                    "peer closed the connection".to_string(),
                ))
            }
            Ok(n) => {
                total += n as u64;
                ctx.hub.publish(Bytes::copy_from_slice(&buf[..n])).await;
            }
            Err(e) => break PumpEnd::Disconnected(SessionError::TransientDisconnect(e.to_string())),
        }
    };

    debug!("Video transport finished after {} bytes", total);
    end
}

/// 在同一监听端点上有界重连
async fn reconnect(
    ctx: &IngestContext,
    listener: &TcpListener,
) -> Result<(TcpStream, SocketAddr), SessionError> {
    let port = listener.local_addr()?.port();
    let mut attempt: u32 = 0;

    loop {
        let result = attempt_once(ctx, listener, port).await;
        let err = match result {
            Ok(accepted) => {
                info!("✓ Streaming re-established after {} attempt(s)", attempt + 1);
                return Ok(accepted);
            }
            Err(SessionError::Cancelled) => return Err(SessionError::Cancelled),
            Err(e) => e,
        };

        attempt += 1;
        if !ctx.policy.should_retry(&err, attempt) {
            error!("Reconnection attempt #{} failed: {}, giving up", attempt, err);
            return Err(SessionError::ReconnectExhausted { attempts: attempt });
        }

        let delay = ctx.policy.calculate_delay(attempt - 1);
        warn!(
            "Reconnection attempt #{} failed: {}, retrying in {:?}",
            attempt, err, delay
        );
        tokio::select! {
            _ = ctx.token.cancelled() => return Err(SessionError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn attempt_once(
    ctx: &IngestContext,
    listener: &TcpListener,
    port: u16,
) -> Result<(TcpStream, SocketAddr), SessionError> {
    // 设备侧重连后桥的转发状态不可靠，每次都重新下发
    tokio::select! {
        _ = ctx.token.cancelled() => return Err(SessionError::Cancelled),
        established = ctx.tunnel.establish(&ctx.serial, port, ctx.control_port) => established?,
    }

    info!("Re-waiting for device video connection on port {}...", port);
    tokio::select! {
        _ = ctx.token.cancelled() => Err(SessionError::Cancelled),
        accepted = tokio::time::timeout(ctx.policy.accept_timeout, listener.accept()) => match accepted {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => Err(SessionError::Accept(e.to_string())),
            Err(_) => Err(SessionError::Accept(format!(
                "no connection within {:?}",
                ctx.policy.accept_timeout
            ))),
        },
    }
}

/// 进入推流状态，返回该连接的关闭令牌；会话已过期时返回None
async fn mark_streaming(ctx: &IngestContext, peer: SocketAddr) -> Option<CancellationToken> {
    let mut state = ctx.state.lock().await;
    if !state.is_current(ctx.generation) {
        return None;
    }
    let closer = ctx.token.child_token();
    state.video = Some(VideoHandle {
        peer,
        closer: closer.clone(),
    });
    state.status = SessionStatus::Streaming;
    info!("📺 Streaming started from {}", peer);
    Some(closer)
}

async fn mark_reconnecting(ctx: &IngestContext) -> bool {
    let mut state = ctx.state.lock().await;
    if !state.is_current(ctx.generation) {
        return false;
    }
    state.video = None;
    state.status = SessionStatus::Connecting;
    state.reconnects += 1;
    true
}

/// 致命失败：回到空闲并记录原因
async fn fail(ctx: &IngestContext, err: SessionError) {
    error!("Capture session failed: {}", err);
    let mut state = ctx.state.lock().await;
    if state.is_current(ctx.generation) {
        state.last_error = Some(err.to_string());
        state.reset_to_idle();
    }
}
