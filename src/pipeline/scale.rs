//! 坐标映射 (Scale Tracker)
//!
//! 预处理只在右/下方补边成正方形, 所以模型空间的坐标原点与原图一致,
//! 还原时只需按比例缩放, 无需平移。

use crate::detection::BBox;

/// 缩放比例: 正方形边长 / 原图宽高
///
/// 每个tick计算一次, 只用于还原同一tick解码出的检测框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRatios {
    pub x_ratio: f32,
    pub y_ratio: f32,
}

impl ScaleRatios {
    pub fn identity() -> Self {
        Self {
            x_ratio: 1.0,
            y_ratio: 1.0,
        }
    }

    /// x 乘 x_ratio, y 乘 y_ratio
    pub fn rescale(&self, bbox: &BBox) -> BBox {
        BBox {
            y1: bbox.y1 * self.y_ratio,
            x1: bbox.x1 * self.x_ratio,
            y2: bbox.y2 * self.y_ratio,
            x2: bbox.x2 * self.x_ratio,
        }
    }
}

/// 模型空间 ↔ 画面空间 的映射
#[derive(Debug, Clone, Copy)]
pub struct ScaleTracker {
    model_width: u32,
    model_height: u32,
}

impl ScaleTracker {
    pub fn new(model_width: u32, model_height: u32) -> Self {
        Self {
            model_width,
            model_height,
        }
    }

    pub fn model_size(&self) -> (u32, u32) {
        (self.model_width, self.model_height)
    }

    /// 补边正方形的边长
    pub fn padded_side(frame_width: u32, frame_height: u32) -> u32 {
        frame_width.max(frame_height)
    }

    pub fn ratios(&self, frame_width: u32, frame_height: u32) -> ScaleRatios {
        let side = Self::padded_side(frame_width, frame_height) as f32;
        ScaleRatios {
            x_ratio: side / frame_width.max(1) as f32,
            y_ratio: side / frame_height.max(1) as f32,
        }
    }

    /// 模型空间 → 任意尺寸画布
    ///
    /// 原图被拉伸铺满画布; 画布与模型输入同尺寸时等价于 `ratios.rescale`
    pub fn project(
        &self,
        bbox: &BBox,
        ratios: &ScaleRatios,
        surface_width: u32,
        surface_height: u32,
    ) -> BBox {
        let sx = surface_width as f32 / self.model_width.max(1) as f32;
        let sy = surface_height as f32 / self.model_height.max(1) as f32;
        let b = ratios.rescale(bbox);
        BBox {
            y1: b.y1 * sy,
            x1: b.x1 * sx,
            y2: b.y2 * sy,
            x2: b.x2 * sx,
        }
    }
}
