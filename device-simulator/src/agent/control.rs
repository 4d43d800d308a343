use crate::config::Config;
use common::{ControlDirective, Resolution};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 控制循环：连接后逐行读取分辨率指令，当前分辨率通过 `resolution` 发布
///
/// 连接断开后重新拨号，和真实代理一样等待下一次会话。
pub async fn run_control(
    config: Config,
    resolution: watch::Sender<Resolution>,
    token: CancellationToken,
) {
    let addr = config.control_addr();

    loop {
        let stream = tokio::select! {
            _ = token.cancelled() => break,
            result = TcpStream::connect(&addr) => result,
        };

        match stream {
            Ok(stream) => {
                info!("✓ Control connected to {}", addr);
                read_directives(stream, &resolution, &token).await;
                info!("Control connection closed");
            }
            Err(e) => debug!("Control dial {} failed: {}", addr, e),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(config.redial_interval) => {}
        }
    }
}

async fn read_directives(
    stream: TcpStream,
    resolution: &watch::Sender<Resolution>,
    token: &CancellationToken,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => return,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => match ControlDirective::parse_line(&line) {
                Ok(directive) => {
                    let res = directive.resolution();
                    info!("📐 Resolution directive: {}", res);
                    resolution.send_replace(res);
                }
                Err(e) => warn!("⚠️  Ignoring control line {:?}: {}", line, e),
            },
            Ok(None) => return,
            Err(e) => {
                warn!("Control read failed: {}", e);
                return;
            }
        }
    }
}
