#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 采集/录制配置参数
pub mod detection; // 解码 + NMS + 目标选择
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod models; // 推理引擎接口与 ONNX Runtime 实现
pub mod pipeline; // 单帧流水线
pub mod recorder; // 录制系统
pub mod renderer; // 画布渲染
pub mod scheduler; // 采集调度器

pub use crate::config::{Args, LiveConfig};
pub use crate::detection::{BBox, Detection, SelectionResult};
pub use crate::error::{Error, Result};
pub use crate::models::{InferenceEngine, OrtConfig, OrtEP, OrtEngine};
pub use crate::pipeline::frame::{Frame, FrameSource};
pub use crate::pipeline::Pipeline;
pub use crate::recorder::Recorder;
pub use crate::renderer::{RenderMode, Renderer};
pub use crate::scheduler::{CaptureScheduler, SchedulerHandle, SchedulerState};

/// 时间字符串, 北京时间, 如 `gen_time_string("")` → `20240101123000123456789`
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    match chrono::FixedOffset::east_opt(8 * 60 * 60) {
        Some(offset) => chrono::Utc::now().with_timezone(&offset).format(&fmt).to_string(),
        None => chrono::Utc::now().format(&fmt).to_string(),
    }
}
