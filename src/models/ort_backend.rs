// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 包含: 会话构建、执行器选择、预热 (推断类别数)、推理

use std::time::Instant;

use anyhow::{bail, Context, Result};
use ndarray::{Array4, ArrayD, ArrayView4};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::InferenceEngine;

/// 执行器 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

impl OrtEP {
    fn dispatch(&self) -> ExecutionProviderDispatch {
        match *self {
            OrtEP::CPU => CPUExecutionProvider::default().build(),
            OrtEP::CUDA(id) => CUDAExecutionProvider::default().with_device_id(id).build(),
            OrtEP::Trt(id) => TensorRTExecutionProvider::default()
                .with_device_id(id)
                .with_engine_cache(true)
                .with_engine_cache_path("./trt_cache")
                .build(),
        }
    }
}

/// 后端配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,
    pub ep: OrtEP,
    /// 模型输入 (宽, 高)
    pub image_size: (u32, u32),
    /// 类别数; None 时由预热推断
    pub nc: Option<usize>,
    /// 模型输入为 NCHW (ultralytics 导出格式)
    pub channels_first: bool,
}

impl Default for OrtConfig {
    fn default() -> Self {
        Self {
            f: "models/yolov8n.onnx".to_string(),
            ep: OrtEP::CPU,
            image_size: (640, 640),
            nc: None,
            channels_first: true,
        }
    }
}

pub struct OrtEngine {
    session: Session,
    width: u32,
    height: u32,
    nc: usize,
    channels_first: bool,
}

impl OrtEngine {
    /// 构建会话并预热
    pub fn build(config: OrtConfig) -> Result<Self> {
        let t = Instant::now();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([config.ep.dispatch()])?
            .commit_from_file(&config.f)
            .with_context(|| format!("Failed to load ONNX model: {}", config.f))?;
        log::info!(
            "✅ 模型已加载: {} ({:?}, {:.1}ms)",
            config.f,
            config.ep,
            t.elapsed().as_secs_f64() * 1000.0
        );

        let (width, height) = config.image_size;
        let mut engine = Self {
            session,
            width,
            height,
            nc: config.nc.unwrap_or(0),
            channels_first: config.channels_first,
        };

        let discovered = engine.warmup()?;
        engine.nc = match config.nc {
            Some(nc) => nc,
            None => discovered.with_context(|| {
                "Failed to get num_classes, make it explicit with `--nc`".to_string()
            })?,
        };
        log::info!(
            "🔥 预热完成: 输入 {}x{}, 类别数 {}",
            engine.width,
            engine.height,
            engine.nc
        );
        Ok(engine)
    }

    /// 全1输入跑一次, 丢弃结果; 返回由输出形状推断的类别数
    fn warmup(&mut self) -> Result<Option<usize>> {
        let input = Array4::<f32>::ones((1, self.height as usize, self.width as usize, 3));
        let output = self.infer(input.view())?;
        Ok(classes_from_shape(output.shape()))
    }

    fn infer(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        let input = if self.channels_first {
            input.permuted_axes([0, 3, 1, 2]).as_standard_layout().to_owned()
        } else {
            input.as_standard_layout().to_owned()
        };
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("Inference failed")?;
        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output")?;
        Ok(output.to_owned())
    }
}

impl InferenceEngine for OrtEngine {
    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn num_classes(&self) -> usize {
        self.nc
    }

    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        let (_, h, w, c) = input.dim();
        if (w as u32, h as u32) != (self.width, self.height) || c != 3 {
            bail!(
                "input shape {:?} does not match model input {}x{}x3",
                input.shape(),
                self.height,
                self.width
            );
        }
        self.infer(input)
    }
}

/// `(1, 4+C, N)` 或 `(1, N, 4+C)` → C; 较小的一维为 4+C
pub fn classes_from_shape(shape: &[usize]) -> Option<usize> {
    match shape {
        [1, d1, d2] => {
            let channels = (*d1).min(*d2);
            channels.checked_sub(4).filter(|&c| c > 0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_from_shape() {
        assert_eq!(classes_from_shape(&[1, 84, 8400]), Some(80));
        assert_eq!(classes_from_shape(&[1, 8400, 5]), Some(1));
        assert_eq!(classes_from_shape(&[1, 4, 8400]), None);
        assert_eq!(classes_from_shape(&[84, 8400]), None);
    }

    #[test]
    fn test_default_config() {
        let config = OrtConfig::default();
        assert_eq!(config.ep, OrtEP::CPU);
        assert_eq!(config.image_size, (640, 640));
        assert!(config.channels_first);
    }
}
