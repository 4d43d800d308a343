// 屏幕镜像中继 - 主机侧服务
//
// 从设备采集代理接收编码后的屏幕码流，原样分发给浏览器和本地播放器。

pub mod bridge;
pub mod config;
pub mod device;
pub mod distribution;
pub mod http;
pub mod pairing;
pub mod session;
