/// 检测系统 (Detection System)
///
/// - types:   检测框 / 检测结果 / 筛选结果
/// - nms:     全局非极大值抑制
/// - decoder: 原始输出解码 + 目标类别单一最佳筛选
pub mod decoder;
pub mod nms;
pub mod types;

pub use decoder::{
    select_target, DetectionDecoder, NMS_IOU_THRESHOLD, NMS_MAX_OUTPUT, NMS_SCORE_THRESHOLD,
    TARGET_CLASS_ID,
};
pub use nms::non_max_suppression;
pub use types::{BBox, Detection, SelectionResult};
