// 设备模拟器 - 采集代理替身
//
// 视频：连接设备侧视频端口，循环写入分块；写失败后重新拨号。
// 控制：连接控制端口，按行读取分辨率指令。

mod control;
mod source;
mod video;

pub use control::run_control;
pub use source::ChunkSource;
pub use video::run_video;
