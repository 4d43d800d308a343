use super::AppState;
use crate::session::StartOutcome;
use axum::extract::{Query, State};
use axum::Json;
use common::{DeviceRecord, MirrorError, Resolution, StatusSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 通用应答：`{"ok":true}` 或 `{"ok":false,"msg":"..."}`
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

impl ApiResponse {
    fn success() -> Self {
        Self { ok: true, msg: None }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: Some(msg.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairCodeResponse {
    code: String,
    pc_name: String,
}

#[derive(Debug, Serialize)]
pub struct PairConfirmResponse {
    ok: bool,
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeviceParams {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PairParams {
    code: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartParams {
    id: String,
    res: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResolutionParams {
    res: Option<String>,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 已配对设备列表
pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceRecord>> {
    Json(state.devices.store().all().await)
}

/// 重命名设备
pub async fn rename_device(
    State(state): State<AppState>,
    Query(params): Query<DeviceParams>,
) -> Json<ApiResponse> {
    match state.devices.store().rename(&params.id, &params.name).await {
        Ok(()) => Json(ApiResponse::success()),
        Err(e) => Json(ApiResponse::error(store_error_message(e))),
    }
}

/// 删除设备
pub async fn remove_device(
    State(state): State<AppState>,
    Query(params): Query<DeviceParams>,
) -> Json<ApiResponse> {
    match state.devices.store().remove(&params.id).await {
        Ok(()) => Json(ApiResponse::success()),
        Err(e) => Json(ApiResponse::error(store_error_message(e))),
    }
}

/// 生成配对码
pub async fn pair_code(State(state): State<AppState>) -> Json<PairCodeResponse> {
    let code = state.pairing.generate_code().await;
    Json(PairCodeResponse {
        code,
        pc_name: crate::pairing::pc_name(),
    })
}

/// 确认配对：登记当前连接的第一台设备
pub async fn pair_confirm(
    State(state): State<AppState>,
    Query(params): Query<PairParams>,
) -> Result<Json<PairConfirmResponse>, Json<ApiResponse>> {
    if !state.pairing.confirm(&params.code).await {
        return Err(Json(ApiResponse::error("invalid code")));
    }

    let serial = match state.devices.connected_serials().await {
        Ok(serials) => serials.into_iter().next().unwrap_or_default(),
        Err(e) => {
            warn!("⚠️  Could not list devices while pairing: {}", e);
            String::new()
        }
    };
    let name = if params.name.is_empty() {
        "Android Device"
    } else {
        params.name.as_str()
    };

    let device = state
        .devices
        .store()
        .add(name, &serial)
        .await
        .map_err(|e| Json(ApiResponse::error(e.to_string())))?;

    Ok(Json(PairConfirmResponse {
        ok: true,
        id: device.id,
        name: device.name,
    }))
}

/// 设备端打开配对页面前，为所有已连接设备转发HTTP端口
pub async fn pair_ready(State(state): State<AppState>) -> Json<ApiResponse> {
    let serials = match state.bridge.connected_serials().await {
        Ok(serials) => serials,
        Err(e) => return Json(ApiResponse::error(e.to_string())),
    };
    for serial in serials {
        if let Err(e) = state.bridge.reverse(&serial, state.http_port, state.http_port).await {
            warn!("⚠️  HTTP reverse failed for {}: {}", serial, e);
        }
    }
    Json(ApiResponse::success())
}

/// 开始采集
pub async fn start_stream(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Json<ApiResponse> {
    let device = match state.devices.lookup_for_capture(&params.id).await {
        Ok(device) => device,
        Err(e) => return Json(ApiResponse::error(e.to_string())),
    };

    let resolution = params
        .res
        .as_deref()
        .map(|preset| Resolution::from_preset(Some(preset)));

    match state.session.start(&device.id, &device.serial, resolution).await {
        Ok(StartOutcome::Started { video_port }) => {
            info!("✅ Capture started for {} (video port {})", device.name, video_port);
            Json(ApiResponse::success())
        }
        Ok(StartOutcome::AlreadyStreaming) => Json(ApiResponse::success()),
        Err(e) => {
            if !e.is_invalid_request() {
                warn!("⚠️  Capture start failed: {}", e);
            }
            Json(ApiResponse::error(e.to_string()))
        }
    }
}

/// 停止采集
pub async fn stop_stream(State(state): State<AppState>) -> Json<ApiResponse> {
    state.session.stop().await;
    Json(ApiResponse::success())
}

/// 修改分辨率
pub async fn set_resolution(
    State(state): State<AppState>,
    Query(params): Query<ResolutionParams>,
) -> Json<ApiResponse> {
    let resolution = Resolution::from_preset(params.res.as_deref());
    state.session.set_resolution(resolution).await;
    Json(ApiResponse::success())
}

/// 会话状态
pub async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.session.snapshot().await)
}

fn store_error_message(e: MirrorError) -> String {
    match e {
        MirrorError::DeviceNotFound(_) => "device not found".to_string(),
        other => other.to_string(),
    }
}
