//! 摄像头输入模块
//!
//! 处理本地摄像头输入,支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)
//! 解码线程把固定分辨率的 RGBA 帧写入 `FrameSlot`, 结束时关闭槽位。

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};

use super::decode_filter::DecodeFilter;
use super::frame_slot::FrameSlot;
use crate::config::CaptureConfig;

const MAX_RETRIES: usize = 3;

/// 摄像头
pub struct Camera {
    device: String,
    capture: CaptureConfig,
}

impl Camera {
    /// `device`: Windows 为设备名或索引, 其他平台为索引
    pub fn new(device: impl Into<String>, capture: CaptureConfig) -> Self {
        Self {
            device: device.into(),
            capture,
        }
    }

    /// 启动解码线程
    pub fn spawn(self, slot: Arc<FrameSlot>) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || {
                if let Err(e) = self.run(slot.clone()) {
                    log::error!("❌ 摄像头错误: {:#}", e);
                }
                slot.close();
            })
            .context("failed to spawn camera thread")
    }

    fn run(&self, slot: Arc<FrameSlot>) -> Result<()> {
        let url = camera_url(&self.device);
        let format = input_format();
        let size = format!("{}x{}", self.capture.width, self.capture.height);
        let rate = self.capture.frame_rate.to_string();
        let filter_desc = format!(
            "scale={}:{},format=rgba",
            self.capture.width, self.capture.height
        );
        log::info!("🎥 摄像头: {} ({}) {}@{}", url, format, size, rate);

        let mut retry_count = 0;
        loop {
            let filter = DecodeFilter::new(slot.clone(), self.capture.width, self.capture.height);
            let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
            let pipe = pipe.filter("decode", Box::new(filter));
            let out = create_null_output().add_frame_pipeline(pipe);

            let input = Input::new(url.as_str())
                .set_format(format)
                .set_input_opts(
                    [("framerate", rate.as_str()), ("video_size", size.as_str())].into(),
                );

            let built = FfmpegContext::builder()
                .input(input)
                .filter_desc(filter_desc.as_str())
                .output(out)
                .build();

            let ctx = match built {
                Ok(c) => c,
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        return Err(anyhow!(
                            "摄像头构建失败 (重试{}次): {}; 请检查设备名称或关闭占用摄像头的程序",
                            MAX_RETRIES,
                            e
                        ));
                    }
                    log::warn!(
                        "⚠️ 摄像头忙或无法打开, 1秒后重试... ({}/{})",
                        retry_count,
                        MAX_RETRIES
                    );
                    thread::sleep(Duration::from_secs(1));
                    continue;
                }
            };

            let sch = ctx
                .start()
                .map_err(|e| anyhow!("摄像头启动失败: {}", e))?;
            log::info!("✅ 摄像头连接成功,开始解码!");
            let _ = sch.wait();
            log::info!("📹 摄像头解码循环结束");
            return Ok(());
        }
    }
}

/// 平台输入格式
fn input_format() -> &'static str {
    if cfg!(target_os = "windows") {
        "dshow"
    } else if cfg!(target_os = "macos") {
        "avfoundation"
    } else {
        "v4l2"
    }
}

/// 摄像头URL - 根据平台选择
fn camera_url(device: &str) -> String {
    if cfg!(target_os = "windows") {
        // 索引 → 设备名
        let name = device
            .parse::<usize>()
            .ok()
            .and_then(|index| list_devices().into_iter().nth(index))
            .unwrap_or_else(|| device.to_string());
        format!("video={}", name)
    } else if cfg!(target_os = "macos") {
        device.to_string()
    } else if device.starts_with('/') {
        device.to_string()
    } else {
        format!("/dev/video{}", device)
    }
}

/// 获取可用的摄像头设备列表
pub fn list_devices() -> Vec<String> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_camera_url_linux() {
        assert_eq!(input_format(), "v4l2");
        assert_eq!(camera_url("0"), "/dev/video0");
        assert_eq!(camera_url("/dev/video2"), "/dev/video2");
    }
}
