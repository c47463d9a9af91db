//! 运行配置 - 命令行参数 + JSON配置文件
//!
//! 采集分辨率/帧率、录制参数可通过JSON文件调整;
//! 检测相关的 NMS 参数与目标类别为编译期常量 (见 `detection`)。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 采集宽度
pub const WIDTH: u32 = 640;
/// 采集高度
pub const HEIGHT: u32 = 480;
/// 采集/编码帧率
pub const FRAME_RATE: u32 = 15;

/// 调度周期: ceil(1000/15) ms
pub const TICK_INTERVAL: Duration = Duration::from_millis(1000_u64.div_ceil(15));

/// 关键帧最大间隔 (毫秒)
pub const KEYFRAME_INTERVAL_MS: f64 = 5000.0;

/// 录制码率 2 Mbps
pub const DEFAULT_BITRATE: usize = 2_000_000;

/// 导出文件默认名称
pub const DEFAULT_EXPORT_NAME: &str = "HumanFaceDetection.mp4";

/// 默认编码器 (H.264 High Profile)
pub const DEFAULT_CODEC: &str = "libx264";

/// 命令行参数
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "YOLOv8 实时检测 + 录制", long_about = None)]
pub struct Args {
    /// ONNX 模型路径
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: String,

    /// 类别名称 (JSON 数组)
    #[arg(long, default_value = "assets/labels.json")]
    pub labels: String,

    /// 摄像头设备 (Windows 为设备名, 其他平台为索引)
    #[arg(short, long, default_value = "0")]
    pub device: String,

    /// 单张图片检测 (不开摄像头, 不录制)
    #[arg(long)]
    pub image: Option<String>,

    /// JSON 配置文件
    #[arg(long, default_value = "live_config.json")]
    pub config: String,

    /// 导出目录 (默认: 系统下载目录)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// 遮罩模式: 只显示检测框内的画面
    #[arg(long)]
    pub mask: bool,

    /// 遮罩模式下的窄屏偏移 (移动端布局)
    #[arg(long)]
    pub narrow: bool,

    /// 标签字体 (TTF/OTF)
    #[arg(long, default_value = "assets/font/DejaVuSans.ttf")]
    pub font: String,

    /// 模型输入宽度 (未指定时取模型默认 640)
    #[arg(long)]
    pub width: Option<u32>,

    /// 模型输入高度
    #[arg(long)]
    pub height: Option<u32>,

    /// 类别数 (未指定时由预热推理推断)
    #[arg(long)]
    pub nc: Option<usize>,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// 使用 TensorRT
    #[arg(long)]
    pub trt: bool,

    /// GPU 设备号
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 打印每帧耗时
    #[arg(long)]
    pub profile: bool,
}

/// 采集参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: WIDTH,
            height: HEIGHT,
            frame_rate: FRAME_RATE,
        }
    }
}

/// 录制参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecorderConfig {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate: usize,
    pub keyframe_interval_ms: f64,
    pub file_name: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_CODEC.to_string(),
            width: WIDTH,
            height: HEIGHT,
            frame_rate: FRAME_RATE,
            bitrate: DEFAULT_BITRATE,
            keyframe_interval_ms: KEYFRAME_INTERVAL_MS,
            file_name: DEFAULT_EXPORT_NAME.to_string(),
        }
    }
}

/// 完整运行配置 (JSON)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LiveConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl LiveConfig {
    /// 从JSON文件加载配置; 文件不存在时写回默认配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<LiveConfig>(&json) {
                Ok(mut config) => {
                    config.sync_recorder_size();
                    log::info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    log::warn!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("序列化配置失败: {}", e)))?;
        fs::write(path.as_ref(), json)?;
        log::info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 编码分辨率/帧率始终跟随采集配置
    fn sync_recorder_size(&mut self) {
        self.recorder.width = self.capture.width;
        self.recorder.height = self.capture.height;
        self.recorder.frame_rate = self.capture.frame_rate;
    }
}

/// 加载类别名称 (JSON 字符串数组)
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let json = fs::read_to_string(path.as_ref())?;
    serde_json::from_str(&json)
        .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))
}
