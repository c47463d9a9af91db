//! 解码器/筛选器 (Decoder/Selector)
//!
//! 原始输出 `(1, 4+C, N)` → 转置为 N 个候选 → 中心点转角点 → 类别取 argmax
//! → 全局 NMS → 只保留目标类别中分数最高的一个。

use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};

use super::nms::non_max_suppression;
use super::types::{BBox, Detection, SelectionResult};
use crate::error::{Error, Result};

/// 目标类别
pub const TARGET_CLASS_ID: usize = 0;
/// NMS 最大输出数
pub const NMS_MAX_OUTPUT: usize = 500;
/// NMS IoU 阈值
pub const NMS_IOU_THRESHOLD: f32 = 0.45;
/// NMS 分数阈值
pub const NMS_SCORE_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    num_classes: usize,
}

impl DetectionDecoder {
    pub fn new(num_classes: usize) -> Self {
        Self { num_classes }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// 解码一次推理输出
    ///
    /// 接受 `(1, 4+C, N)` (模型原始布局) 或已转置的 `(1, N, 4+C)`;
    /// 其他形状返回 `ShapeMismatch`
    pub fn decode(&self, raw: ArrayViewD<'_, f32>) -> Result<SelectionResult> {
        let candidates = self.candidates(&raw)?;

        let n = candidates.nrows();
        let mut boxes = Vec::with_capacity(n);
        let mut scores = Vec::with_capacity(n);
        let mut classes = Vec::with_capacity(n);
        for row in candidates.axis_iter(Axis(0)) {
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            boxes.push(BBox::from_cxcywh(cx, cy, w, h));

            // 类别分数取最大值, 同分取第一个
            let (class_id, score) = row
                .iter()
                .skip(4)
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(bi, bs), (i, &s)| {
                    if s > bs {
                        (i, s)
                    } else {
                        (bi, bs)
                    }
                });
            scores.push(score);
            classes.push(class_id);
        }

        let keep = non_max_suppression(
            &boxes,
            &scores,
            NMS_MAX_OUTPUT,
            NMS_IOU_THRESHOLD,
            NMS_SCORE_THRESHOLD,
        );
        let survivors: Vec<Detection> = keep
            .into_iter()
            .map(|i| Detection {
                class_id: classes[i],
                score: scores[i],
                bbox: boxes[i],
            })
            .collect();

        Ok(SelectionResult {
            selected: select_target(&survivors),
            survivors,
        })
    }

    /// 统一成 (N, 4+C) 视图
    fn candidates<'a>(&self, raw: &'a ArrayViewD<'_, f32>) -> Result<ArrayView2<'a, f32>> {
        let mismatch = || Error::ShapeMismatch {
            shape: raw.shape().to_vec(),
            num_classes: self.num_classes,
        };
        let width = 4 + self.num_classes;
        if raw.ndim() != 3 || raw.shape()[0] != 1 {
            return Err(mismatch());
        }
        let batch = raw
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|_| mismatch())?;
        let (d1, d2) = batch.dim();
        if d1 == width {
            Ok(batch.reversed_axes())
        } else if d2 == width {
            Ok(batch)
        } else {
            Err(mismatch())
        }
    }
}

/// 只保留目标类别, 取分数最高者 (同分先到先得)
pub fn select_target(survivors: &[Detection]) -> Vec<Detection> {
    let mut best: Option<&Detection> = None;
    for det in survivors.iter().filter(|d| d.class_id == TARGET_CLASS_ID) {
        match best {
            Some(b) if det.score <= b.score => {}
            _ => best = Some(det),
        }
    }
    best.into_iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn det(class_id: usize, score: f32) -> Detection {
        Detection {
            class_id,
            score,
            bbox: BBox::default(),
        }
    }

    /// 构造 (1, 4+C, N) 原始输出
    fn raw_output(rows: &[[f32; 6]]) -> Array3<f32> {
        let n = rows.len();
        let mut out = Array3::<f32>::zeros((1, 6, n));
        for (j, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                out[[0, c, j]] = *v;
            }
        }
        out
    }

    #[test]
    fn test_select_target_best_of_class() {
        let survivors = vec![det(0, 0.9), det(0, 0.95), det(1, 0.99)];
        assert_eq!(select_target(&survivors), vec![det(0, 0.95)]);
    }

    #[test]
    fn test_select_target_absent() {
        assert!(select_target(&[det(1, 0.99), det(3, 0.5)]).is_empty());
        assert!(select_target(&[]).is_empty());
    }

    #[test]
    fn test_select_target_tie_keeps_first() {
        let mut a = det(0, 0.8);
        a.bbox.x2 = 1.0;
        let selected = select_target(&[a, det(0, 0.8)]);
        assert_eq!(selected, vec![a]);
    }

    #[test]
    fn test_decode_pipeline() {
        let decoder = DetectionDecoder::new(2);
        let raw = raw_output(&[
            // cx, cy, w, h, class0, class1
            [50.0, 50.0, 20.0, 20.0, 0.90, 0.10],
            [51.0, 50.0, 20.0, 20.0, 0.95, 0.05],
            [200.0, 200.0, 40.0, 40.0, 0.10, 0.99],
            [400.0, 400.0, 10.0, 10.0, 0.15, 0.10],
        ]);
        let result = decoder.decode(raw.view().into_dyn()).unwrap();

        // 前两个框重叠, 只保留 0.95; 最后一个低于分数阈值
        assert_eq!(result.survivors.len(), 2);
        assert_eq!(result.survivors[0].class_id, 1);
        assert_eq!(result.selected.len(), 1);
        let best = result.selected[0];
        assert_eq!(best.class_id, 0);
        assert!((best.score - 0.95).abs() < 1e-6);
        assert_eq!(
            best.bbox,
            BBox {
                y1: 40.0,
                x1: 41.0,
                y2: 60.0,
                x2: 61.0
            }
        );
        assert_eq!(result.scores(), vec![best.score]);
        assert_eq!(result.classes(), vec![0]);
    }

    #[test]
    #[test]
    fn test_decode_result_outlives_view() {
        fn run(decoder: &DetectionDecoder) -> SelectionResult {
            let mut raw = Array3::<f32>::zeros((1, 5, 2));
            for (c, v) in [10.0, 10.0, 4.0, 4.0, 0.7].iter().enumerate() {
                raw[[0, c, 0]] = *v;
            }
            let raw = raw.into_dyn();
            decoder.decode(raw.view()).unwrap()
        }

        let selection = run(&DetectionDecoder::new(1));
        assert_eq!(selection.selected.len(), 1);
        assert!((selection.selected[0].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_decode_accepts_transposed_layout() {
        let decoder = DetectionDecoder::new(2);
        let raw = raw_output(&[[10.0, 10.0, 4.0, 4.0, 0.7, 0.1]]);
        let transposed = raw.view().permuted_axes([0, 2, 1]).to_owned();
        let a = decoder.decode(raw.view().into_dyn()).unwrap();
        let b = decoder.decode(transposed.view().into_dyn()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.selected.len(), 1);
    }

    #[test]
    fn test_decode_target_absent_is_empty() {
        let decoder = DetectionDecoder::new(2);
        let raw = raw_output(&[[10.0, 10.0, 4.0, 4.0, 0.05, 0.9]]);
        let result = decoder.decode(raw.view().into_dyn()).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.survivors.len(), 1);
    }

    #[test]
    fn test_decode_shape_mismatch() {
        let decoder = DetectionDecoder::new(80);
        let raw = Array3::<f32>::zeros((1, 6, 100));
        match decoder.decode(raw.view().into_dyn()) {
            Err(Error::ShapeMismatch { shape, num_classes }) => {
                assert_eq!(shape, vec![1, 6, 100]);
                assert_eq!(num_classes, 80);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let raw = ndarray::Array2::<f32>::zeros((84, 100));
        assert!(decoder.decode(raw.view().into_dyn()).is_err());
    }
}
