use super::{create_router, AppState};
use anyhow::Result;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct HttpServer {
    addr: String,
    web_root: PathBuf,
    state: AppState,
}

impl HttpServer {
    pub fn new(addr: String, web_root: PathBuf, state: AppState) -> Self {
        Self {
            addr,
            web_root,
            state,
        }
    }

    /// 运行直到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let app = create_router(self.state, &self.web_root);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("✓ HTTP server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}
