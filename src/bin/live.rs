/// 摄像头实时检测 + 录制
///
/// 主程序入口 - 直接运行: cargo run --bin yolov8-live --release
/// Ctrl-C 停止录制并导出 MP4; 摄像头断开时停止录制但不导出。
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, select};
use mimalloc::MiMalloc;

use yolov8_live::config::load_labels;
use yolov8_live::input::{list_devices, Camera, FrameSlot};
use yolov8_live::recorder::{FfmpegBackend, FileExporter};
use yolov8_live::{
    Args, CaptureScheduler, Frame, FrameSource, LiveConfig, OrtConfig, OrtEP, OrtEngine,
    Pipeline, Recorder, RenderMode, Renderer,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = LiveConfig::load(&args.config);

    let ep = if args.trt {
        OrtEP::Trt(args.device_id)
    } else if args.cuda {
        OrtEP::CUDA(args.device_id)
    } else {
        OrtEP::CPU
    };
    let engine = OrtEngine::build(OrtConfig {
        f: args.model.clone(),
        ep,
        image_size: (args.width.unwrap_or(640), args.height.unwrap_or(640)),
        nc: args.nc,
        ..Default::default()
    })?;

    let labels = load_labels(&args.labels).unwrap_or_else(|e| {
        log::warn!("⚠️ 类别文件加载失败 ({}), 使用默认类别", e);
        vec!["face".to_string()]
    });
    let mode = if args.mask {
        RenderMode::Mask {
            narrow: args.narrow,
        }
    } else {
        RenderMode::Boxes
    };
    let font = Renderer::load_font(&args.font).or_else(Renderer::embedded_font);

    if let Some(image_path) = &args.image {
        let pipeline = Pipeline::new(Box::new(engine), mode, labels, (1, 1)).with_font(font);
        return detect_image(pipeline, image_path);
    }

    let capture = config.capture.clone();
    let exporter = match &args.output_dir {
        Some(dir) => FileExporter::new(dir),
        None => FileExporter::downloads(),
    };
    log::info!("📁 导出目录: {}", exporter.dir().display());
    let recorder = Recorder::new(
        config.recorder.clone(),
        Box::new(FfmpegBackend::default()),
        Box::new(exporter),
    );
    let pipeline = Pipeline::new(
        Box::new(engine),
        mode,
        labels,
        (capture.width, capture.height),
    )
    .with_font(font)
    .with_recorder(recorder)
    .with_profile(args.profile);

    log::info!("📷 可用摄像头: {:?}", list_devices());
    let slot = Arc::new(FrameSlot::new());
    let camera = Camera::new(args.device.clone(), capture).spawn(slot.clone())?;
    wait_for_camera(&slot, &camera)?;

    let handle = CaptureScheduler::default().start(pipeline, slot.clone())?;

    let (ctrlc_tx, ctrlc_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.try_send(());
    })
    .context("Failed to set Ctrl-C handler")?;

    select! {
        recv(ctrlc_rx) -> _ => {
            log::info!("🛑 收到停止信号, 正在导出...");
            handle.stop(true);
        }
        recv(handle.done()) -> _ => {}
    }

    let skipped = handle.skipped();
    let (_, report) = handle.wait()?;
    log::info!(
        "📊 共 {} 个tick, 失败 {}, 丢弃 {}",
        report.ticks,
        report.failed_ticks,
        skipped
    );
    match report.recording {
        Ok(Some(done)) => {
            if let Some(path) = done.exported {
                log::info!("🎞️ {} 帧 → {}", done.frame_count, path.display());
            }
        }
        Ok(None) => log::warn!("⚠️ 没有录制内容"),
        Err(e) => log::error!("❌ 录制失败: {}", e),
    }

    slot.detach();
    if camera.join().is_err() {
        log::warn!("⚠️ 摄像头线程异常退出");
    }
    Ok(())
}

/// 等待摄像头开播并送出第一帧; 摄像头线程提前退出则报错
fn wait_for_camera(slot: &FrameSlot, camera: &JoinHandle<()>) -> Result<()> {
    let t = Instant::now();
    while !(slot.is_live() && slot.latest_frame().is_some()) {
        if camera.is_finished() {
            bail!("摄像头打开失败");
        }
        thread::sleep(Duration::from_millis(20));
    }
    log::info!("✅ 摄像头就绪 ({:.0}ms)", t.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

/// 单张图片: 检测 → 渲染 → `<stem>_detected.png`
fn detect_image(mut pipeline: Pipeline, image_path: &str) -> Result<()> {
    let path = Path::new(image_path);
    let image = image::open(path)
        .with_context(|| format!("Failed to open image: {}", image_path))?
        .to_rgba8();
    let frame = Frame::from_image(image);

    let (selection, canvas) = pipeline.detect_still(&frame)?;
    for det in &selection.selected {
        log::info!(
            "🎯 class {} {:.1}% {:?}",
            det.class_id,
            det.score * 100.0,
            det.bbox
        );
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let out = path.with_file_name(format!("{}_detected.png", stem));
    canvas
        .save(&out)
        .with_context(|| format!("Failed to save {}", out.display()))?;
    log::info!("💾 结果已保存: {}", out.display());
    Ok(())
}
