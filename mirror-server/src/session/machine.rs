// 屏幕镜像中继 - 会话状态机
//
// idle -> connecting -> streaming -> idle，以及重连时的 streaming -> connecting -> streaming。
// 同一时刻最多一个会话；所有状态修改都经过这里的操作。

use super::control::{self, ControlContext};
use super::error::{ReconnectPolicy, SessionError};
use super::ingest::{self, IngestContext};
use super::state::SharedState;
use crate::bridge::TunnelManager;
use crate::distribution::BroadcastHub;
use common::{Resolution, SessionStatus, StatusSnapshot, CONTROL_PORT, DEFAULT_CHUNK_SIZE};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 会话参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// 视频与控制监听绑定的地址
    pub bind_host: IpAddr,
    pub control_port: u16,
    pub chunk_size: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            control_port: CONTROL_PORT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// start() 的成功结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// 新会话已启动，等待设备连接
    Started { video_port: u16 },
    /// 已在推流，直接复用（第二个观看者接入）
    AlreadyStreaming,
}

/// 采集会话
#[derive(Clone)]
pub struct CaptureSession {
    state: SharedState,
    hub: BroadcastHub,
    tunnel: TunnelManager,
    settings: SessionSettings,
}

impl CaptureSession {
    pub fn new(state: SharedState, tunnel: TunnelManager, settings: SessionSettings) -> Self {
        let hub = BroadcastHub::new(state.clone());
        Self {
            state,
            hub,
            tunnel,
            settings,
        }
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// 开始采集
    ///
    /// 设备查找（不存在、离线）由调用方在此之前完成。
    /// `resolution` 为None时沿用空闲期间设置的分辨率。
    pub async fn start(
        &self,
        device_id: &str,
        serial: &str,
        resolution: Option<Resolution>,
    ) -> Result<StartOutcome, SessionError> {
        let (generation, token) = {
            let mut state = self.state.lock().await;
            match state.status {
                SessionStatus::Connecting => return Err(SessionError::AlreadyConnecting),
                SessionStatus::Streaming => {
                    info!("Already streaming, attaching to existing session");
                    return Ok(StartOutcome::AlreadyStreaming);
                }
                SessionStatus::Idle => {}
            }

            let token = CancellationToken::new();
            state.generation += 1;
            state.cancel = Some(token.clone());
            state.status = SessionStatus::Connecting;
            state.active_id = Some(device_id.to_string());
            state.serial = Some(serial.to_string());
            if let Some(resolution) = resolution {
                state.resolution = resolution;
            }
            state.reconnects = 0;
            state.last_error = None;
            info!("▶️  Starting capture for {} at {}", device_id, state.resolution);
            (state.generation, token)
        };

        // 每个会话一个视频监听端点，重连时复用
        let listener = match TcpListener::bind(SocketAddr::new(self.settings.bind_host, 0)).await {
            Ok(listener) => listener,
            Err(e) => return Err(self.abort(generation, SessionError::Accept(e.to_string())).await),
        };
        let video_port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => return Err(self.abort(generation, SessionError::Io(e)).await),
        };

        if let Err(e) = self
            .tunnel
            .establish(serial, video_port, self.settings.control_port)
            .await
        {
            return Err(self.abort(generation, e).await);
        }

        {
            let mut state = self.state.lock().await;
            if !state.is_current(generation) {
                info!("Session stopped while tunnels were being set up");
                return Err(SessionError::Cancelled);
            }
            state.video_port = Some(video_port);
        }

        match self.open_control_channel(generation, token.clone()).await {
            Ok(()) | Err(SessionError::ControlBusy) => {}
            Err(e) => warn!("Control channel not started: {}", e),
        }

        let ctx = IngestContext {
            state: self.state.clone(),
            hub: self.hub.clone(),
            tunnel: self.tunnel.clone(),
            serial: serial.to_string(),
            generation,
            token,
            control_port: self.settings.control_port,
            chunk_size: self.settings.chunk_size,
            policy: self.settings.reconnect.clone(),
        };
        tokio::spawn(ingest::run(ctx, listener));

        Ok(StartOutcome::Started { video_port })
    }

    /// 启动当前会话的控制握手；同一会话重复调用返回 `ControlBusy`
    pub(crate) async fn open_control_channel(
        &self,
        generation: u64,
        token: CancellationToken,
    ) -> Result<(), SessionError> {
        let ctx = ControlContext {
            state: self.state.clone(),
            generation,
            token,
            bind_host: self.settings.bind_host,
            port: self.settings.control_port,
        };
        control::spawn_handshake(ctx).await.map(|_| ())
    }

    /// 停止采集；空闲时为空操作，返回是否真的停止了一个会话
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.status == SessionStatus::Idle {
            return false;
        }
        info!("⏹️  Stopping capture (status: {})", state.status);
        state.reset_to_idle();
        true
    }

    /// 修改分辨率；控制通道在线时立即推送，返回是否已推送
    pub async fn set_resolution(&self, resolution: Resolution) -> bool {
        let writer = {
            let mut state = self.state.lock().await;
            state.resolution = resolution;
            state.control.clone()
        };

        let Some(writer) = writer else {
            info!("Resolution set to {}, applied on next control handshake", resolution);
            return false;
        };

        match control::push_directive(&writer, resolution).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to push resolution: {}", e);
                let mut state = self.state.lock().await;
                if state
                    .control
                    .as_ref()
                    .map(|current| std::sync::Arc::ptr_eq(current, &writer))
                    .unwrap_or(false)
                {
                    state.control = None;
                }
                false
            }
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    /// 启动阶段失败：回到空闲，状态不残留
    async fn abort(&self, generation: u64, err: SessionError) -> SessionError {
        warn!("Capture start failed: {}", err);
        let mut state = self.state.lock().await;
        if state.is_current(generation) {
            state.last_error = Some(err.to_string());
            state.reset_to_idle();
        }
        err
    }

    #[cfg(test)]
    pub(crate) async fn current_session(&self) -> (u64, Option<CancellationToken>) {
        let state = self.state.lock().await;
        (state.generation, state.cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::FakeBridge;
    use crate::distribution::testing::RecordingSink;
    use crate::session::RelayState;
    use common::DEVICE_VIDEO_PORT;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn test_session(bridge: Arc<FakeBridge>, policy: ReconnectPolicy) -> CaptureSession {
        let settings = SessionSettings {
            control_port: free_port(),
            reconnect: policy,
            ..Default::default()
        };
        CaptureSession::new(
            RelayState::shared(Resolution::HD_720),
            TunnelManager::new(bridge, DEVICE_VIDEO_PORT),
            settings,
        )
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            retry_strategy: crate::session::RetryStrategy::Immediate,
            accept_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    async fn wait_for_status(session: &CaptureSession, expected: SessionStatus) {
        for _ in 0..300 {
            if session.status().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "status never became {}, last snapshot: {:?}",
            expected,
            session.snapshot().await
        );
    }

    async fn wait_for_chunks(sink: &RecordingSink, bytes: usize) -> Vec<u8> {
        for _ in 0..300 {
            let received: Vec<u8> = sink.received().iter().flat_map(|c| c.to_vec()).collect();
            if received.len() >= bytes {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("viewer never received {} bytes", bytes);
    }

    async fn connect_with_retry(port: u16) -> TcpStream {
        for _ in 0..200 {
            if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("could not connect to port {}", port);
    }

    async fn start_streaming(session: &CaptureSession, id: &str) -> (u16, TcpStream) {
        let video_port = match session.start(id, "emulator-5554", None).await.unwrap() {
            StartOutcome::Started { video_port } => video_port,
            other => panic!("unexpected outcome {:?}", other),
        };
        let device = TcpStream::connect(("127.0.0.1", video_port)).await.unwrap();
        wait_for_status(session, SessionStatus::Streaming).await;
        (video_port, device)
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let session = test_session(Arc::new(FakeBridge::default()), fast_policy());
        assert!(!session.stop().await);
        assert!(!session.stop().await);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(snapshot.active_id, "");
    }

    #[tokio::test]
    async fn test_start_streams_chunks_to_viewers() {
        let bridge = Arc::new(FakeBridge::default());
        let session = test_session(bridge.clone(), fast_policy());
        let sink = Arc::new(RecordingSink::default());
        session.hub().register(sink.clone()).await;

        let (video_port, mut device) = start_streaming(&session, "a1b2c3d4").await;
        device.write_all(b"\x00\x00\x00\x01\x67\x42").await.unwrap();

        assert_eq!(wait_for_chunks(&sink, 6).await, b"\x00\x00\x00\x01\x67\x42");

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Streaming);
        assert_eq!(snapshot.active_id, "a1b2c3d4");
        assert_eq!(snapshot.video_port, Some(video_port));
        assert_eq!(
            bridge.reverse_calls()[0],
            ("emulator-5554".to_string(), DEVICE_VIDEO_PORT, video_port)
        );
        assert_eq!(bridge.reverse_calls().len(), 2);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_start_while_connecting_is_rejected() {
        let session = test_session(Arc::new(FakeBridge::default()), fast_policy());
        session.start("first", "s1", None).await.unwrap();
        assert_eq!(session.status().await, SessionStatus::Connecting);

        let err = session.start("second", "s2", Some(Resolution::HD_1080)).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyConnecting));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Connecting);
        assert_eq!(snapshot.active_id, "first");
        assert_eq!(snapshot.resolution(), Resolution::HD_720);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_start_while_streaming_attaches() {
        let bridge = Arc::new(FakeBridge::default());
        let session = test_session(bridge.clone(), fast_policy());
        let sink = Arc::new(RecordingSink::default());
        session.hub().register(sink.clone()).await;
        let (video_port, mut device) = start_streaming(&session, "first").await;

        let outcome = session.start("second", "s2", Some(Resolution::SD_480)).await.unwrap();
        assert_eq!(outcome, StartOutcome::AlreadyStreaming);

        // 已有传输不受影响
        device.write_all(b"still here").await.unwrap();
        assert_eq!(wait_for_chunks(&sink, 10).await, b"still here");

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.active_id, "first");
        assert_eq!(snapshot.video_port, Some(video_port));
        assert_eq!(snapshot.resolution(), Resolution::HD_720);
        assert_eq!(bridge.reverse_calls().len(), 2);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_transient_drop_reconnects_on_same_endpoint() {
        let bridge = Arc::new(FakeBridge::default());
        let session = test_session(bridge.clone(), fast_policy());
        let sink = Arc::new(RecordingSink::default());
        session.hub().register(sink.clone()).await;

        let (video_port, device) = start_streaming(&session, "a1b2c3d4").await;
        drop(device);

        // 设备在同一端口上回连
        let mut device = TcpStream::connect(("127.0.0.1", video_port)).await.unwrap();
        wait_for_status(&session, SessionStatus::Streaming).await;
        device.write_all(b"after reconnect").await.unwrap();
        assert_eq!(wait_for_chunks(&sink, 15).await, b"after reconnect");

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.video_port, Some(video_port));
        assert_eq!(snapshot.active_id, "a1b2c3d4");
        assert_eq!(snapshot.reconnects, 1);

        // 转发被重新下发，且指向同一个本地端点
        let video_forwards: Vec<_> = bridge
            .reverse_calls()
            .into_iter()
            .filter(|(_, remote, _)| *remote == DEVICE_VIDEO_PORT)
            .collect();
        assert_eq!(video_forwards.len(), 2);
        assert!(video_forwards.iter().all(|(_, _, local)| *local == video_port));

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_during_streaming_prevents_reconnect() {
        let bridge = Arc::new(FakeBridge::default());
        let session = test_session(bridge.clone(), fast_policy());
        let (video_port, mut device) = start_streaming(&session, "a1b2c3d4").await;
        let calls_before = bridge.reverse_calls().len();

        assert!(session.stop().await);
        assert_eq!(session.status().await, SessionStatus::Idle);

        // 视频连接被关闭
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), device.read(&mut buf))
            .await
            .expect("video transport was not closed");
        assert!(matches!(read, Ok(0) | Err(_)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.status().await, SessionStatus::Idle);
        assert_eq!(bridge.reverse_calls().len(), calls_before);

        // 监听端点随会话一起关闭
        let mut refused = false;
        for _ in 0..100 {
            if TcpStream::connect(("127.0.0.1", video_port)).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refused);
        assert_eq!(session.snapshot().await.active_id, "");
    }

    #[tokio::test]
    async fn test_each_start_mints_fresh_token() {
        let bridge = Arc::new(FakeBridge::default());
        let session = test_session(bridge.clone(), fast_policy());

        session.start("first", "s1", None).await.unwrap();
        let (first_gen, first_token) = session.current_session().await;
        session.stop().await;
        assert!(first_token.as_ref().unwrap().is_cancelled());

        let sink = Arc::new(RecordingSink::default());
        session.hub().register(sink.clone()).await;
        let (video_port, device) = start_streaming(&session, "second").await;
        let (second_gen, second_token) = session.current_session().await;
        assert!(second_gen > first_gen);
        assert!(!second_token.as_ref().unwrap().is_cancelled());

        // 上一个会话的停止信号不能抑制本会话的重连
        drop(device);
        let mut device = TcpStream::connect(("127.0.0.1", video_port)).await.unwrap();
        wait_for_status(&session, SessionStatus::Streaming).await;
        device.write_all(b"ok").await.unwrap();
        assert_eq!(wait_for_chunks(&sink, 2).await, b"ok");

        session.stop().await;
    }

    #[tokio::test]
    async fn test_tunnel_failure_reverts_to_idle() {
        let bridge = Arc::new(FakeBridge::default());
        bridge.set_failing(true);
        let session = test_session(bridge, fast_policy());

        let err = session.start("a1b2c3d4", "s1", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Tunnel { .. }));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(snapshot.active_id, "");
        assert_eq!(snapshot.video_port, None);
        assert!(snapshot.last_error.unwrap().contains("tunnel"));
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_bound() {
        let bridge = Arc::new(FakeBridge::default());
        let policy = ReconnectPolicy {
            max_attempts: 2,
            retry_strategy: crate::session::RetryStrategy::Immediate,
            accept_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let session = test_session(bridge.clone(), policy);
        let (_, device) = start_streaming(&session, "a1b2c3d4").await;

        drop(device);
        wait_for_status(&session, SessionStatus::Idle).await;

        let snapshot = session.snapshot().await;
        assert!(snapshot.last_error.unwrap().contains("gave up after 2"));
        assert_eq!(snapshot.active_id, "");
        // 初始一次加两次重连
        assert_eq!(bridge.count_remote(DEVICE_VIDEO_PORT), 3);
    }

    #[tokio::test]
    async fn test_idle_resolution_used_in_next_handshake() {
        let session = test_session(Arc::new(FakeBridge::default()), fast_policy());
        assert!(!session.set_resolution(Resolution::SD_480).await);

        session.start("a1b2c3d4", "s1", None).await.unwrap();
        let control = connect_with_retry(session.settings.control_port).await;
        let mut lines = BufReader::new(control).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "{\"width\":854,\"height\":480}");

        session.stop().await;
    }

    #[tokio::test]
    async fn test_live_resolution_change_is_pushed() {
        let session = test_session(Arc::new(FakeBridge::default()), fast_policy());
        session
            .start("a1b2c3d4", "s1", Some(Resolution::HD_720))
            .await
            .unwrap();

        let control = connect_with_retry(session.settings.control_port).await;
        let mut lines = BufReader::new(control).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "{\"width\":1280,\"height\":720}"
        );

        assert!(session.set_resolution(Resolution::HD_1080).await);
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "{\"width\":1920,\"height\":1080}"
        );
        assert_eq!(session.snapshot().await.resolution(), Resolution::HD_1080);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_control_handshake_rejected() {
        let session = test_session(Arc::new(FakeBridge::default()), fast_policy());
        session.start("a1b2c3d4", "s1", None).await.unwrap();

        let (generation, token) = session.current_session().await;
        let err = session
            .open_control_channel(generation, token.unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ControlBusy));

        session.stop().await;
    }

    #[tokio::test]
    async fn test_control_disconnect_is_not_reestablished() {
        let session = test_session(Arc::new(FakeBridge::default()), fast_policy());
        let port = session.settings.control_port;
        session.start("a1b2c3d4", "s1", None).await.unwrap();

        let control = connect_with_retry(port).await;
        let mut lines = BufReader::new(control).lines();
        lines.next_line().await.unwrap().unwrap();
        drop(lines);

        // 断开后写端被清除，分辨率只记录不推送
        let mut pushed = true;
        for _ in 0..100 {
            pushed = session.set_resolution(Resolution::SD_480).await;
            if !pushed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!pushed);
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_during_tunnel_setup_reports_cancelled() {
        let bridge = Arc::new(FakeBridge::default());
        bridge.set_reverse_delay(Duration::from_millis(200));
        let session = test_session(bridge.clone(), fast_policy());

        let starter = {
            let session = session.clone();
            tokio::spawn(async move { session.start("a1b2c3d4", "s1", None).await })
        };
        wait_for_status(&session, SessionStatus::Connecting).await;
        assert!(session.stop().await);

        let result = starter.await.unwrap();
        assert!(matches!(result, Err(SessionError::Cancelled)));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(snapshot.active_id, "");
        assert_eq!(snapshot.video_port, None);
    }

    #[tokio::test]
    async fn test_stop_during_reconnect_stops_retrying() {
        let bridge = Arc::new(FakeBridge::default());
        let policy = ReconnectPolicy {
            max_attempts: 50,
            retry_strategy: crate::session::RetryStrategy::Immediate,
            accept_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let session = test_session(bridge.clone(), policy);
        let (video_port, device) = start_streaming(&session, "a1b2c3d4").await;
        drop(device);

        // 至少一次重连尝试已经重新下发了转发
        for _ in 0..300 {
            if bridge.count_remote(DEVICE_VIDEO_PORT) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(bridge.count_remote(DEVICE_VIDEO_PORT) >= 2);
        assert_eq!(session.status().await, SessionStatus::Connecting);

        assert!(session.stop().await);
        let calls_at_stop = bridge.reverse_calls().len();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // 停止后不再有新的转发，状态保持空闲
        assert!(bridge.reverse_calls().len() <= calls_at_stop + 1);
        let settled = bridge.reverse_calls().len();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(bridge.reverse_calls().len(), settled);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.last_error.is_none());

        let mut refused = false;
        for _ in 0..100 {
            if TcpStream::connect(("127.0.0.1", video_port)).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refused);
    }

    mod sequences {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        #[derive(Debug, Clone, Copy)]
        enum Step {
            Start,
            Stop,
            DeviceConnect,
            DeviceDrop,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                Just(Step::Start),
                Just(Step::Stop),
                Just(Step::DeviceConnect),
                Just(Step::DeviceDrop),
            ]
        }

        fn slow_policy() -> ReconnectPolicy {
            ReconnectPolicy {
                max_attempts: 3,
                retry_strategy: crate::session::RetryStrategy::Immediate,
                accept_timeout: Duration::from_secs(30),
                ..Default::default()
            }
        }

        /// 推流 <=> 持有视频连接；空闲时没有活动设备
        async fn check_consistent(session: &CaptureSession) -> Result<(), TestCaseError> {
            let state = session.state.lock().await;
            prop_assert_eq!(
                state.status == SessionStatus::Streaming,
                state.video.is_some(),
                "status {} with video {:?}",
                state.status,
                state.video
            );
            if state.status == SessionStatus::Idle {
                prop_assert!(state.active_id.is_none());
                prop_assert!(state.cancel.is_none());
            }
            Ok(())
        }

        async fn wait_until_not(session: &CaptureSession, status: SessionStatus) {
            for _ in 0..300 {
                if session.status().await != status {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        async fn run_steps(steps: Vec<Step>) -> Result<(), TestCaseError> {
            let session = test_session(Arc::new(FakeBridge::default()), slow_policy());
            let mut device: Option<TcpStream> = None;

            for step in steps {
                let before = session.status().await;
                match step {
                    Step::Start => {
                        let result = session.start("a1b2c3d4", "s1", None).await;
                        match before {
                            SessionStatus::Idle => {
                                prop_assert!(matches!(result, Ok(StartOutcome::Started { .. })), "expected Started")
                            }
                            SessionStatus::Connecting => {
                                prop_assert!(matches!(result, Err(SessionError::AlreadyConnecting)))
                            }
                            SessionStatus::Streaming => {
                                prop_assert_eq!(result.ok(), Some(StartOutcome::AlreadyStreaming))
                            }
                        }
                    }
                    Step::Stop => {
                        session.stop().await;
                        device = None;
                        prop_assert_eq!(session.status().await, SessionStatus::Idle);
                    }
                    Step::DeviceConnect => {
                        let port = session.snapshot().await.video_port;
                        if let (SessionStatus::Connecting, Some(port), true) =
                            (before, port, device.is_none())
                        {
                            device = Some(TcpStream::connect(("127.0.0.1", port)).await.unwrap());
                            wait_for_status(&session, SessionStatus::Streaming).await;
                        }
                    }
                    Step::DeviceDrop => {
                        if device.take().is_some() && before == SessionStatus::Streaming {
                            wait_until_not(&session, SessionStatus::Streaming).await;
                            prop_assert_eq!(session.status().await, SessionStatus::Connecting);
                        }
                    }
                }
                check_consistent(&session).await?;
            }

            session.stop().await;
            check_consistent(&session).await
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn test_status_matches_video_transport(steps in prop::collection::vec(step(), 1..12)) {
                tokio_test::block_on(run_steps(steps))?;
            }
        }
    }
}
