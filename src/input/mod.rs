/// 视频输入系统 (Video Input System)
///
/// 独立解码线程, 实现帧源接口 (`FrameSource`)
/// - Camera:       本地摄像头 (DirectShow/AVFoundation/V4L2)
/// - DecodeFilter: FFmpeg 帧回调, RGBA 拷贝
/// - FrameSlot:    最新帧槽位
pub mod camera;
pub mod decode_filter;
pub mod frame_slot;

pub use camera::{list_devices, Camera};
pub use decode_filter::DecodeFilter;
pub use frame_slot::FrameSlot;
