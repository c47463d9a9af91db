/// FFmpeg解码过滤器: 摄像头 → RGBA帧 → 最新帧槽位
/// FFmpeg decode filter module
///
/// 滤镜图已经把画面缩放并转换为 `rgba`, 这里只按行拷贝去掉 stride 填充。
use std::sync::Arc;
use std::time::Instant;

use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame as AvFrame};

use super::frame_slot::FrameSlot;
use crate::pipeline::frame::Frame;

#[derive(Clone)]
pub struct DecodeFilter {
    slot: Arc<FrameSlot>,
    width: u32,
    height: u32,
    count: usize,
    dropped_frames: usize,
    total_frames: usize,
    last: Instant,
}

impl DecodeFilter {
    pub fn new(slot: Arc<FrameSlot>, width: u32, height: u32) -> Self {
        Self {
            slot,
            width,
            height,
            count: 0,
            dropped_frames: 0,
            total_frames: 0,
            last: Instant::now(),
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            log::warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        self.slot.open();
        log::info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<AvFrame>, String> {
        if self.slot.is_detached() {
            return Err("source detached".to_string());
        }
        self.total_frames += 1;

        // SAFETY: AVFrame 在本次回调期间有效
        let invalid = unsafe { frame.as_ptr().is_null() || frame.is_empty() } || frame.is_corrupt();
        if invalid {
            self.drop_frame("空帧/损坏帧");
            return Ok(None);
        }

        // SAFETY: 指针已判空
        let (w, h, data, stride) = unsafe {
            let ptr = frame.as_ptr();
            (
                (*ptr).width as u32,
                (*ptr).height as u32,
                (*ptr).data[0],
                (*ptr).linesize[0],
            )
        };

        // 固定分辨率
        if (w, h) != (self.width, self.height) {
            self.drop_frame(&format!("分辨率 {}x{} != {}x{}", w, h, self.width, self.height));
            return Ok(None);
        }
        let row_bytes = w as usize * 4;
        if data.is_null() || stride < row_bytes as i32 {
            self.drop_frame(&format!("步长异常 stride={}", stride));
            return Ok(None);
        }

        let mut rgba = Vec::with_capacity(row_bytes * h as usize);
        for row in 0..h as usize {
            // SAFETY: 每行至少 row_bytes 字节 (stride 已检查)
            let line =
                unsafe { std::slice::from_raw_parts(data.add(row * stride as usize), row_bytes) };
            rgba.extend_from_slice(line);
        }

        match Frame::new(w, h, rgba) {
            Ok(f) => self.slot.publish(f),
            Err(e) => self.drop_frame(&e.to_string()),
        }
        self.count += 1;

        if self.last.elapsed().as_secs_f64() >= 5.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            log::debug!(
                "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{}",
                self.count as f64 / elapsed,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        self.slot.close();
        log::info!("✅ 解码线程退出");
    }
}
