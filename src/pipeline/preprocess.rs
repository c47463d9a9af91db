//! 预处理 (Preprocessor)
//!
//! RGBA 帧 → 右/下补黑边成正方形 → 双线性缩放到模型输入尺寸 → 归一化到 [0,1],
//! 输出 NHWC 张量 `(1, H, W, 3)` 以及本帧的缩放比例。

use fast_image_resize as fr;
use image::RgbImage;
use ndarray::Array4;

use super::arena::{TickArena, Tracked};
use super::frame::Frame;
use super::scale::{ScaleRatios, ScaleTracker};
use crate::error::{Error, Result};

/// 预处理结果
pub struct Preprocessed {
    pub tensor: Tracked<Array4<f32>>,
    pub ratios: ScaleRatios,
}

pub struct Preprocessor {
    tracker: ScaleTracker,
    resizer: fr::Resizer,
}

impl Preprocessor {
    pub fn new(tracker: ScaleTracker) -> Self {
        Self {
            tracker,
            resizer: fr::Resizer::new(),
        }
    }

    pub fn tracker(&self) -> &ScaleTracker {
        &self.tracker
    }

    /// 生成模型输入张量 (登记在本tick的 arena 上)
    pub fn run(&mut self, frame: &Frame, arena: &mut TickArena) -> Result<Preprocessed> {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(Error::Preprocess(format!("帧尺寸无效: {}x{}", w, h)));
        }
        let ratios = self.tracker.ratios(w, h);

        // 1. 补边成正方形
        let padded = pad_to_square(frame)?;
        let side = padded.width();

        // 2. 双线性缩放到模型输入尺寸
        let (mw, mh) = self.tracker.model_size();
        let src_image =
            fr::images::Image::from_vec_u8(side, side, padded.into_raw(), fr::PixelType::U8x3)
                .map_err(|e| Error::Preprocess(format!("源图像创建失败: {}", e)))?;
        let mut dst_image = fr::images::Image::new(mw, mh, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src_image,
                &mut dst_image,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| Error::Preprocess(format!("缩放失败: {}", e)))?;

        // 3. 归一化 (NHWC)
        let tensor = arena.track(normalize(dst_image.buffer(), mw, mh));

        Ok(Preprocessed { tensor, ratios })
    }
}

/// 右/下补黑边: 边长 = max(w, h), 原图贴在左上角
pub fn pad_to_square(frame: &Frame) -> Result<RgbImage> {
    let view = frame.view()?;
    let (w, h) = view.dimensions();
    let side = ScaleTracker::padded_side(w, h);
    let mut padded = RgbImage::new(side, side);
    for (x, y, px) in view.enumerate_pixels() {
        let [r, g, b, _] = px.0;
        padded.put_pixel(x, y, image::Rgb([r, g, b]));
    }
    Ok(padded)
}

/// u8 RGB → f32 [0,1], 形状 (1, H, W, 3)
fn normalize(rgb: &[u8], width: u32, height: u32) -> Array4<f32> {
    let (w, h) = (width as usize, height as usize);
    let mut tensor = Array4::<f32>::zeros((1, h, w, 3));
    for (dst, &src) in tensor.iter_mut().zip(rgb.iter()) {
        *dst = src as f32 / 255.0;
    }
    tensor
}
