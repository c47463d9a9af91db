//! FFmpeg 录制后端: RGBA 画布 → YUV420P → H.264 (High@3.1) → MP4 (faststart)
//!
//! 封装器写入临时目录下的文件, finalize 时读回内存并删除临时文件。

use std::fs;
use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::software::scaling;
use ffmpeg::util::format::pixel::Pixel;
use ffmpeg::{codec, encoder, format, frame, picture, Dictionary, Packet, Rational};
use image::RgbaImage;

use super::{EncodedChunk, Muxer, RecorderBackend, VideoEncoder, VideoFrame};
use crate::config::RecorderConfig;
use crate::error::{Error, Result};

/// 编码时间基: 微秒
const MICROS: Rational = Rational(1, 1_000_000);

fn encoder_err(e: ffmpeg::Error) -> Error {
    Error::Encoder(e.to_string())
}

pub struct FfmpegBackend {
    scratch_dir: PathBuf,
}

impl FfmpegBackend {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl RecorderBackend for FfmpegBackend {
    fn open(&self, config: &RecorderConfig) -> Result<(Box<dyn VideoEncoder>, Box<dyn Muxer>)> {
        ffmpeg::init().map_err(encoder_err)?;
        fs::create_dir_all(&self.scratch_dir)?;
        let path = self
            .scratch_dir
            .join(format!("recording_{}.mp4", crate::gen_time_string("")));

        let mut octx = format::output_as(&path, "mp4").map_err(encoder_err)?;
        let global_header = octx
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let codec = encoder::find_by_name(&config.codec)
            .or_else(|| encoder::find(codec::Id::H264))
            .ok_or_else(|| Error::Encoder(format!("找不到编码器: {}", config.codec)))?;

        let mut ost = octx.add_stream(codec).map_err(encoder_err)?;
        let stream_index = ost.index();

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(encoder_err)?;
        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(MICROS);
        video.set_frame_rate(Some(Rational(config.frame_rate as i32, 1)));
        video.set_bit_rate(config.bitrate);
        video.set_max_b_frames(0);
        // GOP 上限与关键帧间隔一致, 关键帧由 set_kind 强制
        video.set_gop((config.keyframe_interval_ms / 1000.0 * config.frame_rate as f64) as u32);
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("profile", "high");
        opts.set("level", "3.1");
        opts.set("preset", "veryfast");
        opts.set("tune", "zerolatency");
        opts.set("forced-idr", "1");
        let encoder = video.open_with(opts).map_err(encoder_err)?;
        ost.set_parameters(&encoder);
        ost.set_time_base(MICROS);

        let mut muxer_opts = Dictionary::new();
        muxer_opts.set("movflags", "faststart");
        octx.write_header_with(muxer_opts).map_err(encoder_err)?;
        let stream_time_base = octx
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(MICROS);

        let scaler = scaling::Context::get(
            Pixel::RGBA,
            config.width,
            config.height,
            Pixel::YUV420P,
            config.width,
            config.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(encoder_err)?;

        log::info!("📼 编码器: {} → {}", codec.name(), path.display());

        Ok((
            Box::new(FfmpegEncoder {
                encoder,
                scaler,
                width: config.width,
                height: config.height,
            }),
            Box::new(FfmpegMuxer {
                octx: Some(octx),
                path,
                stream_index,
                stream_time_base,
                offset_us: None,
            }),
        ))
    }
}

pub struct FfmpegEncoder {
    encoder: encoder::video::Encoder,
    scaler: scaling::Context,
    width: u32,
    height: u32,
}

// SAFETY: `scaling::Context` (裸 SwsContext 指针) 没有实现 Send;
// 它只被录制器独占, 同一时刻只在一个线程上使用
unsafe impl Send for FfmpegEncoder {}

impl FfmpegEncoder {
    fn receive(&mut self) -> Vec<EncodedChunk> {
        let mut chunks = Vec::new();
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            let Some(data) = packet.data() else {
                continue;
            };
            let pts = packet.pts().unwrap_or(0);
            chunks.push(EncodedChunk {
                data: data.to_vec(),
                timestamp_us: pts,
                decode_timestamp_us: packet.dts().unwrap_or(pts),
                keyframe: packet.is_key(),
            });
        }
        chunks
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&mut self, frame: &VideoFrame<'_>) -> Result<Vec<EncodedChunk>> {
        if frame.image.dimensions() != (self.width, self.height) {
            return Err(Error::Encoder(format!(
                "画布尺寸 {:?} 与编码尺寸 {}x{} 不一致",
                frame.image.dimensions(),
                self.width,
                self.height
            )));
        }

        let rgba = rgba_frame(frame.image);
        let mut yuv = frame::Video::empty();
        self.scaler.run(&rgba, &mut yuv).map_err(encoder_err)?;
        yuv.set_pts(Some(frame.timestamp_us));
        if frame.keyframe {
            yuv.set_kind(picture::Type::I);
        }

        self.encoder.send_frame(&yuv).map_err(encoder_err)?;
        Ok(self.receive())
    }

    fn flush(&mut self) -> Result<Vec<EncodedChunk>> {
        self.encoder.send_eof().map_err(encoder_err)?;
        Ok(self.receive())
    }
}

/// RgbaImage → AVFrame (按 stride 逐行拷贝)
fn rgba_frame(image: &RgbaImage) -> frame::Video {
    let (w, h) = image.dimensions();
    let mut out = frame::Video::new(Pixel::RGBA, w, h);
    let row_bytes = w as usize * 4;
    let stride = out.stride(0);
    let data = out.data_mut(0);
    for (row, src) in image.as_raw().chunks_exact(row_bytes).enumerate() {
        let start = row * stride;
        data[start..start + row_bytes].copy_from_slice(src);
    }
    out
}

pub struct FfmpegMuxer {
    octx: Option<format::context::Output>,
    path: PathBuf,
    stream_index: usize,
    stream_time_base: Rational,
    /// 首个数据块的时间戳, 之后的时间戳都相对它
    offset_us: Option<i64>,
}

impl Muxer for FfmpegMuxer {
    fn add_chunk(&mut self, chunk: EncodedChunk) -> Result<()> {
        let octx = self
            .octx
            .as_mut()
            .ok_or_else(|| Error::Encoder("封装器已结束".to_string()))?;
        let offset = *self.offset_us.get_or_insert(chunk.decode_timestamp_us);

        let mut packet = Packet::copy(&chunk.data);
        packet.set_stream(self.stream_index);
        packet.set_pts(Some(chunk.timestamp_us - offset));
        packet.set_dts(Some(chunk.decode_timestamp_us - offset));
        if chunk.keyframe {
            packet.set_flags(codec::packet::Flags::KEY);
        }
        packet.rescale_ts(MICROS, self.stream_time_base);
        packet.write_interleaved(octx).map_err(encoder_err)
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        let mut octx = self
            .octx
            .take()
            .ok_or_else(|| Error::FinalizeFailed("封装器已结束".to_string()))?;
        let trailer = octx
            .write_trailer()
            .map_err(|e| Error::FinalizeFailed(e.to_string()));
        drop(octx);

        take_scratch(&self.path, trailer)
    }
}

impl Drop for FfmpegMuxer {
    fn drop(&mut self) {
        if self.octx.take().is_some() {
            remove_scratch(&self.path);
        }
    }
}

/// 读回临时文件; 无论成功失败都删除它
fn take_scratch(path: &Path, trailer: Result<()>) -> Result<Vec<u8>> {
    let bytes = trailer.and_then(|_| {
        fs::read(path).map_err(|e| Error::FinalizeFailed(format!("{}: {}", path.display(), e)))
    });
    remove_scratch(path);
    bytes
}

fn remove_scratch(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("⚠️ 删除临时文件失败 {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_backend_types_are_send() {
        assert_send::<FfmpegEncoder>();
        assert_send::<FfmpegMuxer>();
        assert_send::<FfmpegBackend>();
    }

    #[test]
    fn test_scratch_removed_after_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.mp4");
        fs::write(&path, b"ftyp").unwrap();

        assert_eq!(take_scratch(&path, Ok(())).unwrap(), b"ftyp");
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_removed_when_trailer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.mp4");
        fs::write(&path, b"partial").unwrap();

        let err = take_scratch(&path, Err(Error::FinalizeFailed("trailer".into()))).unwrap_err();
        assert!(matches!(err, Error::FinalizeFailed(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_scratch_is_finalize_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.mp4");
        assert!(matches!(
            take_scratch(&path, Ok(())),
            Err(Error::FinalizeFailed(_))
        ));
    }
}
