/// 单帧流水线 (Pipeline)
///
/// 一个tick内严格按顺序执行:
/// Preprocessor → InferenceEngine → Decoder/Selector → Renderer → Recorder
///
/// - frame:      帧与帧源接口
/// - scale:      模型空间 ↔ 画面空间 坐标映射
/// - preprocess: 补边 + 缩放 + 归一化
/// - arena:      单tick张量作用域
pub mod arena;
pub mod frame;
pub mod preprocess;
pub mod scale;

use std::time::Instant;

use ab_glyph::FontArc;
use image::RgbaImage;
use once_cell::sync::Lazy;

use crate::detection::{DetectionDecoder, SelectionResult};
use crate::error::{Error, Result};
use crate::models::InferenceEngine;
use crate::recorder::{Finalized, Recorder};
use crate::renderer::{self, RenderMode, Renderer};

use self::arena::{TensorGauge, TickArena};
use self::frame::Frame;
use self::preprocess::Preprocessor;
use self::scale::{ScaleRatios, ScaleTracker};

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// 单调时钟 (微秒, 进程内)
pub fn monotonic_us() -> i64 {
    EPOCH.elapsed().as_micros() as i64
}

/// 一个tick的检测结果
#[derive(Debug, Clone)]
pub struct TickReport {
    pub selection: SelectionResult,
    pub ratios: ScaleRatios,
    pub elapsed_ms: f64,
}

pub struct Pipeline {
    preprocessor: Preprocessor,
    engine: Box<dyn InferenceEngine>,
    decoder: DetectionDecoder,
    renderer: Renderer,
    surface: RgbaImage,
    recorder: Option<Recorder>,
    gauge: TensorGauge,
    profile: bool,
}

impl Pipeline {
    /// `surface_size`: 画布 (显示/录制) 尺寸
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        mode: RenderMode,
        labels: Vec<String>,
        surface_size: (u32, u32),
    ) -> Self {
        let (mw, mh) = engine.input_size();
        let tracker = ScaleTracker::new(mw, mh);
        Self {
            preprocessor: Preprocessor::new(tracker),
            decoder: DetectionDecoder::new(engine.num_classes()),
            engine,
            renderer: Renderer::new(mode, tracker, labels),
            surface: RgbaImage::new(surface_size.0, surface_size.1),
            recorder: None,
            gauge: TensorGauge::new(),
            profile: false,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.renderer.set_font(font);
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// 当前存活的张量数 (tick 之间应为0)
    pub fn live_tensors(&self) -> usize {
        self.gauge.live()
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// 预处理 → 推理 → 解码; 本tick的张量在返回前全部释放
    pub fn detect(&mut self, frame: &Frame) -> Result<(SelectionResult, ScaleRatios)> {
        let mut arena = TickArena::new(&self.gauge);

        let pre = self.preprocessor.run(frame, &mut arena)?;
        let raw = self
            .engine
            .run(pre.tensor.view())
            .map_err(|e| Error::Inference(format!("{:#}", e)))?;
        let raw = arena.track(raw);
        let selection = self.decoder.decode(raw.view())?;

        Ok((selection, pre.ratios))
    }

    /// 执行一个完整tick
    pub fn run_tick(&mut self, frame: &Frame, timestamp_us: i64) -> Result<TickReport> {
        let t = Instant::now();
        let (selection, ratios) = self.detect(frame)?;
        let detect_ms = t.elapsed().as_secs_f64() * 1000.0;

        self.renderer
            .render(&mut self.surface, &selection, &ratios, Some(frame))?;

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.encode_tick(&self.surface, timestamp_us);
        }

        let elapsed_ms = t.elapsed().as_secs_f64() * 1000.0;
        if self.profile {
            log::info!(
                "⏱️ 检测 {:.1}ms | 总计 {:.1}ms | 目标 {}",
                detect_ms,
                elapsed_ms,
                selection.selected.len()
            );
        } else {
            log::debug!("⏱️ tick {:.1}ms", elapsed_ms);
        }

        Ok(TickReport {
            selection,
            ratios,
            elapsed_ms,
        })
    }

    /// 单张图片检测, 画布与原图同尺寸; 不经过录制器
    pub fn detect_still(&mut self, frame: &Frame) -> Result<(SelectionResult, RgbaImage)> {
        let (selection, ratios) = self.detect(frame)?;
        let mut canvas = RgbaImage::new(frame.width, frame.height);
        self.renderer
            .render(&mut canvas, &selection, &ratios, Some(frame))?;
        Ok((selection, canvas))
    }

    pub fn clear_surface(&mut self) {
        renderer::clear(&mut self.surface);
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.as_ref().is_some_and(Recorder::is_active)
    }

    /// 开始录制; 没有录制器时什么也不做
    pub fn start_recording(&mut self, timestamp_us: i64) -> Result<()> {
        match self.recorder.as_mut() {
            Some(recorder) => recorder.start(timestamp_us),
            None => Ok(()),
        }
    }

    /// 结束录制 (flush + 封装 + 可选导出)
    pub fn finish_recording(&mut self, export: bool) -> Result<Option<Finalized>> {
        match self.recorder.as_mut() {
            Some(recorder) => recorder.stop(export),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测试用的假推理引擎
    use anyhow::{bail, Result};
    use ndarray::{Array3, ArrayD, ArrayView4};

    use crate::models::InferenceEngine;

    /// 固定输出: 每个候选为 (cx, cy, w, h, 各类分数), 布局 (1, 4+C, N)
    pub struct FakeEngine {
        pub size: (u32, u32),
        pub num_classes: usize,
        pub candidates: Vec<Vec<f32>>,
        /// 输出多一个通道, 触发 ShapeMismatch
        pub wrong_shape: bool,
        pub fail: bool,
    }

    impl FakeEngine {
        pub fn new(size: (u32, u32), num_classes: usize, candidates: Vec<Vec<f32>>) -> Self {
            Self {
                size,
                num_classes,
                candidates,
                wrong_shape: false,
                fail: false,
            }
        }
    }

    impl InferenceEngine for FakeEngine {
        fn input_size(&self) -> (u32, u32) {
            self.size
        }

        fn num_classes(&self) -> usize {
            self.num_classes
        }

        fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
            if self.fail {
                bail!("device lost");
            }
            assert_eq!(
                input.shape(),
                &[1, self.size.1 as usize, self.size.0 as usize, 3]
            );
            let channels = 4 + self.num_classes + self.wrong_shape as usize;
            let n = self.candidates.len().max(1) + 2 * self.wrong_shape as usize;
            let mut out = Array3::<f32>::zeros((1, channels, n));
            for (j, cand) in self.candidates.iter().enumerate() {
                for (c, v) in cand.iter().enumerate().take(channels) {
                    out[[0, c, j]] = *v;
                }
            }
            Ok(out.into_dyn())
        }
    }
}
