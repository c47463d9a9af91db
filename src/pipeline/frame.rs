//! 帧与帧源 (Frame & Frame Source)

use std::sync::Arc;

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// 原始帧 (RGBA)
///
/// 由帧源持有, 预处理器与录制器在一个tick内只读借用
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba_data: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba_data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba_data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "{}x{} RGBA 需要 {} 字节, 实际 {}",
                width,
                height,
                expected,
                rgba_data.len()
            )));
        }
        Ok(Self {
            rgba_data: Arc::new(rgba_data),
            width,
            height,
        })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            rgba_data: Arc::new(image.into_raw()),
            width,
            height,
        }
    }

    /// 零拷贝图像视图
    pub fn view(&self) -> Result<ImageBuffer<Rgba<u8>, &[u8]>> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidFrame("帧尺寸为0".to_string()));
        }
        ImageBuffer::from_raw(self.width, self.height, self.rgba_data.as_slice())
            .ok_or_else(|| Error::InvalidFrame("RGBA缓冲区长度与尺寸不符".to_string()))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// 帧源接口
///
/// 暴露当前像素尺寸与"直播中"标志; 尺寸为 (0,0) 且无直播流即表示信号源已关闭
pub trait FrameSource: Send + Sync {
    /// 当前像素尺寸
    fn dimensions(&self) -> (u32, u32);

    /// 是否仍有直播流
    fn is_live(&self) -> bool;

    /// 最新一帧
    fn latest_frame(&self) -> Option<Frame>;

    /// 断开与显示端的连接
    fn detach(&self);

    /// 信号源已关闭: 尺寸为0且无直播流
    fn is_closed(&self) -> bool {
        self.dimensions() == (0, 0) && !self.is_live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_check() {
        assert!(Frame::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            Frame::new(2, 2, vec![0; 15]),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_view_rejects_empty() {
        let frame = Frame::new(0, 0, Vec::new()).unwrap();
        assert!(frame.view().is_err());

        let frame = Frame::from_image(RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255])));
        let view = frame.view().unwrap();
        assert_eq!(view.dimensions(), (3, 2));
        assert_eq!(view.get_pixel(2, 1).0, [1, 2, 3, 255]);
    }
}
