//! 最新帧槽位: 解码线程写入, 调度器读取
//!
//! 只保留最新一帧, 不排队; 关闭或断开后报告尺寸 (0,0) 且不在直播。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::pipeline::frame::{Frame, FrameSource};

#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
    live: AtomicBool,
    detached: AtomicBool,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 标记为直播中 (摄像头已打开)
    pub fn open(&self) {
        self.live.store(true, Ordering::Release);
    }

    /// 发布最新一帧; 断开后忽略
    pub fn publish(&self, frame: Frame) {
        if self.is_detached() {
            return;
        }
        *self.lock() = Some(frame);
    }

    /// 信号源结束
    pub fn close(&self) {
        self.live.store(false, Ordering::Release);
        *self.lock() = None;
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

impl FrameSource for FrameSlot {
    fn dimensions(&self) -> (u32, u32) {
        self.lock().as_ref().map(Frame::dimensions).unwrap_or((0, 0))
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.lock().clone()
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_slot_lifecycle() {
        let slot = FrameSlot::new();
        assert!(slot.is_closed());

        slot.open();
        assert!(!slot.is_closed());
        assert_eq!(slot.dimensions(), (0, 0));

        slot.publish(Frame::from_image(RgbaImage::new(8, 6)));
        assert_eq!(slot.dimensions(), (8, 6));
        assert!(slot.latest_frame().is_some());

        slot.close();
        assert!(slot.is_closed());
        assert!(slot.latest_frame().is_none());
    }

    #[test]
    fn test_detach_ignores_new_frames() {
        let slot = FrameSlot::new();
        slot.open();
        slot.detach();
        slot.publish(Frame::from_image(RgbaImage::new(8, 6)));
        assert!(slot.is_closed());
        assert!(slot.is_detached());
    }
}
