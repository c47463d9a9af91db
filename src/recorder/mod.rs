/// 录制系统 (Recorder)
///
/// 每个tick把渲染后的画布送入编码器, 编码输出的数据块直接交给封装器 (同步调用,
/// 保证顺序); 停止时 flush 编码器、封装成完整的 MP4 内存缓冲, 按需导出。
///
/// - session: 录制会话状态 (起始时间 / 上一个关键帧 / 帧计数)
/// - ffmpeg:  基于 FFmpeg 的 H.264 编码器 + MP4 封装器
/// - export:  导出到文件 (默认: 系统下载目录)
pub mod export;
pub mod ffmpeg;
pub mod session;

use std::path::PathBuf;

use image::RgbaImage;

use crate::config::RecorderConfig;
use crate::error::{Error, Result};

pub use export::FileExporter;
pub use ffmpeg::FfmpegBackend;
pub use session::RecordingSession;

/// 送入编码器的一帧 (只在一次调用内有效)
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub image: &'a RgbaImage,
    /// 单调时钟, 微秒
    pub timestamp_us: i64,
    pub keyframe: bool,
}

/// 编码后的数据块
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub timestamp_us: i64,
    pub decode_timestamp_us: i64,
    pub keyframe: bool,
}

/// 视频编码器
pub trait VideoEncoder: Send {
    /// 提交一帧, 返回已产出的数据块
    fn encode(&mut self, frame: &VideoFrame<'_>) -> Result<Vec<EncodedChunk>>;

    /// 送入结束标记, 取回所有剩余数据块
    fn flush(&mut self) -> Result<Vec<EncodedChunk>>;
}

/// 容器封装器
pub trait Muxer: Send {
    fn add_chunk(&mut self, chunk: EncodedChunk) -> Result<()>;

    /// 写入文件尾, 返回完整的容器字节
    fn finalize(&mut self) -> Result<Vec<u8>>;
}

/// 按配置创建 编码器 + 封装器
pub trait RecorderBackend: Send {
    fn open(&self, config: &RecorderConfig) -> Result<(Box<dyn VideoEncoder>, Box<dyn Muxer>)>;
}

/// 导出 (交给用户下载)
pub trait Exporter: Send {
    fn export(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// 一次录制的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub frame_count: u64,
    pub bytes: usize,
    pub exported: Option<PathBuf>,
}

pub struct Recorder {
    config: RecorderConfig,
    backend: Box<dyn RecorderBackend>,
    exporter: Box<dyn Exporter>,
    encoder: Option<Box<dyn VideoEncoder>>,
    muxer: Option<Box<dyn Muxer>>,
    session: Option<RecordingSession>,
    /// 导出失败时的落盘目录
    fallback_dir: PathBuf,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        backend: Box<dyn RecorderBackend>,
        exporter: Box<dyn Exporter>,
    ) -> Self {
        Self {
            config,
            backend,
            exporter,
            encoder: None,
            muxer: None,
            session: None,
            fallback_dir: std::env::temp_dir(),
        }
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = dir.into();
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.active)
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    /// 开始录制: 创建会话, 配置编码器与封装器
    pub fn start(&mut self, timestamp_us: i64) -> Result<()> {
        if self.is_active() {
            log::warn!("⚠️ 录制已在进行中");
            return Ok(());
        }
        let (encoder, muxer) = self.backend.open(&self.config)?;
        self.encoder = Some(encoder);
        self.muxer = Some(muxer);
        self.session = Some(RecordingSession::new(
            timestamp_us,
            self.config.keyframe_interval_ms,
        ));
        log::info!(
            "🎬 开始录制: {} {}x{}@{} {}kbps",
            self.config.codec,
            self.config.width,
            self.config.height,
            self.config.frame_rate,
            self.config.bitrate / 1000
        );
        Ok(())
    }

    /// 编码当前画布; 编码错误只记录日志, 录制继续
    pub fn encode_tick(&mut self, surface: &RgbaImage, timestamp_us: i64) {
        let (Some(session), Some(encoder), Some(muxer)) =
            (self.session.as_mut(), self.encoder.as_mut(), self.muxer.as_mut())
        else {
            return;
        };
        if !session.active {
            return;
        }

        let elapsed_ms = session.elapsed_ms(timestamp_us);
        let frame = VideoFrame {
            image: surface,
            timestamp_us,
            keyframe: session.needs_keyframe(elapsed_ms),
        };
        session.frame_count += 1;

        match encoder.encode(&frame) {
            Ok(chunks) => {
                for chunk in chunks {
                    if let Err(e) = muxer.add_chunk(chunk) {
                        log::error!("❌ 封装失败: {}", e);
                    }
                }
            }
            Err(e) => log::error!("❌ 编码失败 (第{}帧): {}", session.frame_count, e),
        }
    }

    /// 停止录制: flush → 封装 → (可选) 导出; 会话总是被重置
    ///
    /// 没有进行中的录制时返回 `Ok(None)`
    pub fn stop(&mut self, export: bool) -> Result<Option<Finalized>> {
        let session = self.session.take();
        let encoder = self.encoder.take();
        let muxer = self.muxer.take();
        let (Some(session), Some(mut encoder), Some(mut muxer)) = (session, encoder, muxer) else {
            return Ok(None);
        };

        let bytes = match finalize(encoder.as_mut(), muxer.as_mut()) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("❌ 录制封装失败, 跳过导出: {}", e);
                return Err(e);
            }
        };
        log::info!(
            "✅ 录制完成: {} 帧, {:.2} MB",
            session.frame_count,
            bytes.len() as f64 / 1024.0 / 1024.0
        );

        let exported = if export {
            Some(self.export(&bytes)?)
        } else {
            None
        };

        Ok(Some(Finalized {
            frame_count: session.frame_count,
            bytes: bytes.len(),
            exported,
        }))
    }

    /// 导出; 失败时写入备用目录, 录制内容不丢
    fn export(&self, bytes: &[u8]) -> Result<PathBuf> {
        let name = &self.config.file_name;
        match self.exporter.export(name, bytes) {
            Ok(path) => {
                log::info!("💾 已导出: {}", path.display());
                Ok(path)
            }
            Err(e) => {
                log::error!("❌ 导出失败: {}, 改存到 {}", e, self.fallback_dir.display());
                let path = FileExporter::new(&self.fallback_dir).export(name, bytes)?;
                log::warn!("💾 录制已保存到备用位置: {}", path.display());
                Ok(path)
            }
        }
    }
}

fn finalize(encoder: &mut dyn VideoEncoder, muxer: &mut dyn Muxer) -> Result<Vec<u8>> {
    let failed = |e: Error| match e {
        Error::FinalizeFailed(_) => e,
        other => Error::FinalizeFailed(other.to_string()),
    };
    for chunk in encoder.flush().map_err(failed)? {
        muxer.add_chunk(chunk).map_err(failed)?;
    }
    muxer.finalize().map_err(failed)
}


#[cfg(test)]
mod tests {
    use super::testing::recorder;
    use super::*;

    #[test]
    fn test_keyframe_cadence_over_ticks() {
        let (mut rec, calls) = recorder(None, false);
        let surface = RgbaImage::new(4, 4);
        rec.start(1_000_000).unwrap();
        for ms in [0i64, 1000, 3000, 5000, 7000, 10_000] {
            rec.encode_tick(&surface, 1_000_000 + ms * 1000);
        }
        let keyframes: Vec<bool> = calls.lock().unwrap().frames.iter().map(|f| f.1).collect();
        assert_eq!(keyframes, vec![true, false, false, true, false, true]);
    }

    #[test]
    fn test_timestamps_passed_unmodified() {
        let (mut rec, calls) = recorder(None, false);
        let surface = RgbaImage::new(4, 4);
        rec.start(500).unwrap();
        rec.encode_tick(&surface, 66_667);
        rec.encode_tick(&surface, 140_001);
        let ts: Vec<i64> = calls.lock().unwrap().frames.iter().map(|f| f.0).collect();
        assert_eq!(ts, vec![66_667, 140_001]);
    }

    #[test]
    fn test_encoder_error_is_not_fatal() {
        let (mut rec, calls) = recorder(Some(2), false);
        let surface = RgbaImage::new(4, 4);
        rec.start(0).unwrap();
        for i in 0..4 {
            rec.encode_tick(&surface, i * 66_667);
        }
        assert!(rec.is_active());
        assert_eq!(calls.lock().unwrap().frames.len(), 4);
        assert_eq!(calls.lock().unwrap().chunks.len(), 3);

        let done = rec.stop(false).unwrap().unwrap();
        assert_eq!(done.frame_count, 4);
        assert_eq!(done.exported, None);
    }

    #[test]
    fn test_stop_with_export() {
        let (mut rec, calls) = recorder(None, false);
        let surface = RgbaImage::new(4, 4);
        rec.start(0).unwrap();
        rec.encode_tick(&surface, 0);
        rec.encode_tick(&surface, 66_667);

        let done = rec.stop(true).unwrap().unwrap();
        assert_eq!(done.bytes, 8);
        assert_eq!(
            done.exported,
            Some(PathBuf::from("HumanFaceDetection.mp4"))
        );
        let calls = calls.lock().unwrap();
        assert!(calls.flushed && calls.finalized);
        assert_eq!(calls.exported, vec![("HumanFaceDetection.mp4".to_string(), 8)]);
        assert!(!rec.is_active());
    }

    #[test]
    fn test_finalize_failure_skips_export_and_resets() {
        let (mut rec, calls) = recorder(None, true);
        let surface = RgbaImage::new(4, 4);
        rec.start(0).unwrap();
        rec.encode_tick(&surface, 0);

        assert!(matches!(rec.stop(true), Err(Error::FinalizeFailed(_))));
        assert!(calls.lock().unwrap().exported.is_empty());
        assert!(!rec.is_active());
        assert!(rec.session().is_none());
        // 会话已重置, 可以重新开始
        rec.start(10).unwrap();
        assert!(rec.is_active());
    }

    #[test]
    fn test_export_failure_keeps_recording() {
        let calls = testing::Shared::default();
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new(
            RecorderConfig::default(),
            Box::new(testing::FakeBackend {
                calls: calls.clone(),
                fail_on: None,
                fail_flush: false,
            }),
            Box::new(testing::FakeExporter {
                calls: calls.clone(),
                fail: true,
            }),
        )
        .with_fallback_dir(dir.path());
        let surface = RgbaImage::new(4, 4);
        rec.start(0).unwrap();
        rec.encode_tick(&surface, 0);
        rec.encode_tick(&surface, 66_667);

        let done = rec.stop(true).unwrap().unwrap();
        let path = dir.path().join("HumanFaceDetection.mp4");
        assert_eq!(done.exported, Some(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap().len(), done.bytes);
        assert!(calls.lock().unwrap().exported.is_empty());
        assert!(!rec.is_active());
    }

    #[test]
    fn test_stop_without_session() {
        let (mut rec, _) = recorder(None, false);
        assert_eq!(rec.stop(true).unwrap(), None);
        rec.encode_tick(&RgbaImage::new(2, 2), 0);
    }
}
