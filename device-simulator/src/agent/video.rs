use super::ChunkSource;
use crate::config::Config;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 视频推流循环：拨号、写分块，断开后重新拨号，直到被取消
pub async fn run_video(config: Config, mut source: ChunkSource, token: CancellationToken) {
    let addr = config.video_addr();
    let mut connections = 0u32;

    loop {
        let Some(mut stream) = dial(&addr, &config, &token).await else {
            break;
        };
        connections += 1;
        info!("✓ Video connected to {} (connection #{})", addr, connections);

        let mut sent = 0u64;
        let reason = loop {
            let chunk = source.next_chunk(config.chunk_size);
            tokio::select! {
                _ = token.cancelled() => break None,
                result = stream.write_all(&chunk) => {
                    if let Err(e) = result {
                        break Some(e);
                    }
                    sent += chunk.len() as u64;
                }
            }

            tokio::select! {
                _ = token.cancelled() => break None,
                _ = tokio::time::sleep(config.chunk_interval) => {}
            }
        };

        match reason {
            Some(e) => warn!("⚠️  Video write failed after {} bytes: {}, redialing", sent, e),
            None => break,
        }
    }

    info!("Video loop stopped");
}

/// 按固定间隔重试拨号；取消时返回None
async fn dial(addr: &str, config: &Config, token: &CancellationToken) -> Option<TcpStream> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return None,
            result = TcpStream::connect(addr) => match result {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Some(stream);
                }
                Err(e) => debug!("Video dial {} failed: {}", addr, e),
            }
        }

        tokio::select! {
            _ = token.cancelled() => return None,
            _ = tokio::time::sleep(config.redial_interval) => {}
        }
    }
}
