/// 全局非极大值抑制 (不区分类别)
///
/// 分数严格大于 `score_threshold` 的候选框按分数降序 (稳定排序, 同分先到先得) 依次考察,
/// 与任一已保留框 IoU >= `iou_threshold` 即被抑制; 最多保留 `max_output` 个。
/// 返回保留框在输入中的下标, 按分数降序。
use std::cmp::Ordering;

use super::types::BBox;

pub fn non_max_suppression(
    boxes: &[BBox],
    scores: &[f32],
    max_output: usize,
    iou_threshold: f32,
    score_threshold: f32,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len().min(scores.len()))
        .filter(|&i| scores[i] > score_threshold)
        .collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let mut keep: Vec<usize> = Vec::with_capacity(max_output.min(order.len()));
    for index in order {
        if keep.len() >= max_output {
            break;
        }
        let suppressed = keep
            .iter()
            .any(|&kept| boxes[kept].iou(&boxes[index]) >= iou_threshold);
        if !suppressed {
            keep.push(index);
        }
    }
    keep
}
