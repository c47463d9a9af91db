/// 检测数据结构定义
/// Data structures for the decoder/selector

/// 检测框, 角点形式 (y1, x1, y2, x2), 模型空间像素
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub y1: f32,
    pub x1: f32,
    pub y2: f32,
    pub x2: f32,
}

impl BBox {
    /// 中心点形式 → 角点形式
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let x1 = cx - w / 2.0;
        let y1 = cy - h / 2.0;
        Self {
            y1,
            x1,
            y2: y1 + h,
            x2: x1 + w,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).abs()
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// 交并比; 任一框面积为0时返回0
    pub fn iou(&self, other: &BBox) -> f32 {
        let (a, b) = (self.area(), other.area());
        if a <= 0.0 || b <= 0.0 {
            return 0.0;
        }
        let iy1 = self.y1.min(self.y2).max(other.y1.min(other.y2));
        let ix1 = self.x1.min(self.x2).max(other.x1.min(other.x2));
        let iy2 = self.y1.max(self.y2).min(other.y1.max(other.y2));
        let ix2 = self.x1.max(self.x2).min(other.x1.max(other.x2));
        let inter = (iy2 - iy1).max(0.0) * (ix2 - ix1).max(0.0);
        inter / (a + b - inter)
    }
}

/// 单个检测结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub score: f32,
    pub bbox: BBox,
}

/// 解码 + 筛选结果
///
/// `selected`: 目标类别的最佳检测 (0 或 1 个);
/// `survivors`: NMS 后全部幸存框 (所有类别)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionResult {
    pub selected: Vec<Detection>,
    pub survivors: Vec<Detection>,
}

impl SelectionResult {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// 渲染用的平行数组
    pub fn boxes(&self) -> Vec<BBox> {
        self.selected.iter().map(|d| d.bbox).collect()
    }

    pub fn scores(&self) -> Vec<f32> {
        self.selected.iter().map(|d| d.score).collect()
    }

    pub fn classes(&self) -> Vec<usize> {
        self.selected.iter().map(|d| d.class_id).collect()
    }
}
