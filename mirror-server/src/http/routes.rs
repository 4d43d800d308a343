use super::{handlers, ws, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState, web_root: &Path) -> Router {
    Router::new()
        // 设备管理
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/devices/rename", post(handlers::rename_device))
        .route("/api/devices/remove", post(handlers::remove_device))
        // 配对
        .route("/api/pair/code", get(handlers::pair_code))
        .route("/api/pair/confirm", post(handlers::pair_confirm))
        .route("/api/pair/ready", get(handlers::pair_ready))
        // 采集会话
        .route("/api/stream/start", post(handlers::start_stream))
        .route("/api/stream/stop", post(handlers::stop_stream))
        .route("/api/setres", post(handlers::set_resolution))
        .route("/api/status", get(handlers::status))
        // 视频分发
        .route("/ws", get(ws::ws_upgrade))
        // 健康检查
        .route("/health", get(handlers::health_check))
        // 页面静态文件
        .fallback_service(ServeDir::new(web_root).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
