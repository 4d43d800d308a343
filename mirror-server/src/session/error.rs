// 屏幕镜像中继 - 会话错误与重连策略
//
// 重试与致命失败的边界集中在这里：
// 只有开始推流之后的 TransientDisconnect 会触发重连；
// 首次激活时的隧道/accept失败直接终止会话；
// 重连过程中的隧道/accept失败按 ReconnectPolicy 有界重试。

use std::io;
use std::time::Duration;
use thiserror::Error;

/// 会话错误类型
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话正在建立中
    #[error("already connecting")]
    AlreadyConnecting,

    /// 请求无效（设备不存在、设备离线等）
    #[error("{0}")]
    InvalidRequest(String),

    /// 设备桥转发命令失败
    #[error("tunnel setup failed: {reason}")]
    Tunnel { reason: String },

    /// 监听端点未能产生连接
    #[error("accept failed: {0}")]
    Accept(String),

    /// 推流中的读写失败
    #[error("transport disconnected: {0}")]
    TransientDisconnect(String),

    /// 重连次数耗尽
    #[error("reconnection gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// 本会话的控制通道握手已在运行
    #[error("control channel handshake already running")]
    ControlBusy,

    /// 会话已被停止
    #[error("session cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// 同步返回给调用方、不改变状态的错误
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            SessionError::AlreadyConnecting | SessionError::InvalidRequest(_)
        )
    }
}

/// 退避策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// 立即重试
    Immediate,
    /// 指数退避
    ExponentialBackoff,
    /// 线性退避
    LinearBackoff,
}

/// 重连策略配置
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// 单次断线后的最大重连尝试次数
    pub max_attempts: u32,
    /// 退避策略
    pub retry_strategy: RetryStrategy,
    /// 基础退避时间
    pub backoff_base: Duration,
    /// 最大退避时间
    pub backoff_max: Duration,
    /// 每次重连等待设备回连的时长
    pub accept_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_strategy: RetryStrategy::ExponentialBackoff,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
            accept_timeout: Duration::from_secs(15),
        }
    }
}

impl ReconnectPolicy {
    /// 计算第 `attempt` 次重试前的等待时间（从0开始）
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self.retry_strategy {
            RetryStrategy::Immediate => Duration::ZERO,

            RetryStrategy::LinearBackoff => {
                let delay = self.backoff_base.saturating_mul(attempt.saturating_add(1));
                delay.min(self.backoff_max)
            }

            RetryStrategy::ExponentialBackoff => {
                let multiplier = 2u32.saturating_pow(attempt);
                let delay = self.backoff_base.saturating_mul(multiplier);
                delay.min(self.backoff_max)
            }
        }
    }

    /// 重连过程中某次失败后是否继续
    ///
    /// `attempt` 为已经失败的尝试次数。
    pub fn should_retry(&self, error: &SessionError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }

        matches!(
            error,
            SessionError::Tunnel { .. }
                | SessionError::Accept(_)
                | SessionError::TransientDisconnect(_)
        )
    }
}
