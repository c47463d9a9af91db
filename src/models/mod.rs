/// 推理引擎接口与实现
///
/// # 架构说明
///
/// ## InferenceEngine Trait
/// 检测模型被视为不透明的推理引擎: 张量进, 张量出。
/// - 输入: `(1, H, W, 3)`, 取值 [0,1]
/// - 输出: `(1, 4+C, N)` (或已转置的 `(1, N, 4+C)`)
/// - `H, W, C` 在启动时确定一次
///
/// ## 实现
/// - **OrtEngine**: ONNX Runtime 后端 (CPU / CUDA / TensorRT), 文件: `ort_backend.rs`
/// - 测试中使用手写的假引擎
use anyhow::Result;
use ndarray::{ArrayD, ArrayView4};

pub mod ort_backend;

pub use ort_backend::{OrtConfig, OrtEP, OrtEngine};

/// 推理引擎统一接口
pub trait InferenceEngine: Send {
    /// 模型输入尺寸 (宽, 高)
    fn input_size(&self) -> (u32, u32);

    /// 类别数 C
    fn num_classes(&self) -> usize;

    /// 执行一次推理
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>>;
}

impl<T: InferenceEngine + ?Sized> InferenceEngine for Box<T> {
    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        (**self).run(input)
    }
}
