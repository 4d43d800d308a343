// 屏幕镜像中继 - 采集会话模块
//
// # 核心组件
//
// - `CaptureSession`: 会话状态机（idle / connecting / streaming）
// - `ingest`: 视频接入循环，读取码流并交给广播中心，负责断线重连
// - `control`: 控制通道，单次握手推送分辨率
// - `RelayState`: 单锁保护的共享状态

mod control;
mod error;
mod ingest;
mod machine;
mod state;

pub use error::{ReconnectPolicy, RetryStrategy, SessionError};
pub use machine::{CaptureSession, SessionSettings, StartOutcome};
pub use state::{RelayState, SharedState};
