/// 渲染器 (Renderer)
///
/// 在画布 (RGBA surface) 上绘制检测结果:
/// - **Boxes**: 清屏 → 画原图 (拉伸铺满) → 每个检测框: 半透明填充 + 实线边框 + 标签
/// - **Mask**:  有检测时全屏涂黑, 只在第一个检测框内显示原图
///
/// 渲染器只修改画布, 不保留检测结果的引用。
pub mod palette;

use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use fast_image_resize as fr;
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detection::{BBox, Detection, SelectionResult};
use crate::error::{Error, Result};
use crate::pipeline::frame::Frame;
use crate::pipeline::scale::{ScaleRatios, ScaleTracker};

pub use palette::{class_color, class_color_alpha, PALETTE};

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font/DejaVuSans.ttf");

/// 检测框填充透明度
pub const FILL_ALPHA: f32 = 0.2;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 渲染模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Boxes,
    /// 遮罩模式; `narrow` 为窄屏 (移动端) 取景偏移
    Mask { narrow: bool },
}

pub struct Renderer {
    mode: RenderMode,
    tracker: ScaleTracker,
    labels: Vec<String>,
    font: Option<FontArc>,
    resizer: fr::Resizer,
}

impl Renderer {
    pub fn new(mode: RenderMode, tracker: ScaleTracker, labels: Vec<String>) -> Self {
        Self {
            mode,
            tracker,
            labels,
            font: None,
            resizer: fr::Resizer::new(),
        }
    }

    pub fn set_font(&mut self, font: Option<FontArc>) {
        self.font = font;
    }

    /// 加载 TTF/OTF 字体; 失败时返回 None (标签只画底色)
    pub fn load_font(path: impl AsRef<Path>) -> Option<FontArc> {
        let path = path.as_ref();
        match fs::read(path).map(FontArc::try_from_vec) {
            Ok(Ok(font)) => Some(font),
            Ok(Err(e)) => {
                log::warn!("⚠️ 字体解析失败 {}: {}", path.display(), e);
                None
            }
            Err(e) => {
                log::warn!("⚠️ 字体加载失败 {}: {}", path.display(), e);
                None
            }
        }
    }

    /// 内置字体 (DejaVu Sans), 字体文件缺失时使用
    pub fn embedded_font() -> Option<FontArc> {
        FontArc::try_from_slice(EMBEDDED_FONT)
            .map_err(|e| log::warn!("⚠️ 内置字体解析失败: {}", e))
            .ok()
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// 类别名称; 未知类别显示为 `class <id>`
    pub fn label_name(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class_id))
    }

    /// 标签文本: `<name> - <score*100 保留1位>%`
    pub fn label_text(&self, det: &Detection) -> String {
        format!("{} - {:.1}%", self.label_name(det.class_id), det.score * 100.0)
    }

    /// 绘制一帧
    pub fn render(
        &mut self,
        surface: &mut RgbaImage,
        selection: &SelectionResult,
        ratios: &ScaleRatios,
        frame: Option<&Frame>,
    ) -> Result<()> {
        match self.mode {
            RenderMode::Boxes => self.render_boxes(surface, &selection.selected, ratios, frame),
            RenderMode::Mask { narrow } => {
                self.render_mask(surface, &selection.selected, ratios, frame, narrow)
            }
        }
    }

    fn render_boxes(
        &mut self,
        surface: &mut RgbaImage,
        detections: &[Detection],
        ratios: &ScaleRatios,
        frame: Option<&Frame>,
    ) -> Result<()> {
        clear(surface);
        if let Some(frame) = frame {
            self.draw_source(surface, frame)?;
        }

        let (sw, sh) = surface.dimensions();
        let line_width = line_width(sw, sh);
        let font_px = font_px(sw, sh);

        for det in detections {
            let b = self.tracker.project(&det.bbox, ratios, sw, sh);

            // 半透明填充
            fill_rect_blend(surface, &b, class_color_alpha(det.class_id, FILL_ALPHA));

            // 边框
            let color = class_color(det.class_id);
            stroke_rect(surface, &b, line_width, color);

            // 标签底色 + 文字
            let text = self.label_text(det);
            let (text_w, text_h) = self.measure(&text, font_px);
            let lw = line_width.round() as i32;
            let y_text = (b.y1.round() as i32 - (text_h as i32 + lw)).max(0);
            let x_text = b.x1.round() as i32 - 1;
            let swatch_w = text_w + lw as u32;
            let swatch_h = text_h + lw as u32;
            if swatch_w > 0 && swatch_h > 0 {
                draw_filled_rect_mut(
                    surface,
                    Rect::at(x_text, y_text).of_size(swatch_w, swatch_h),
                    color,
                );
            }
            if let Some(font) = &self.font {
                draw_text_mut(
                    surface,
                    WHITE,
                    x_text,
                    y_text,
                    PxScale::from(font_px),
                    font,
                    &text,
                );
            }
        }
        Ok(())
    }

    fn render_mask(
        &mut self,
        surface: &mut RgbaImage,
        detections: &[Detection],
        ratios: &ScaleRatios,
        frame: Option<&Frame>,
        narrow: bool,
    ) -> Result<()> {
        clear(surface);
        let Some(first) = detections.first() else {
            return Ok(());
        };

        let (sw, sh) = surface.dimensions();
        let b = self.tracker.project(&first.bbox, ratios, sw, sh);
        for px in surface.pixels_mut() {
            *px = BLACK;
        }

        let (x1, y1) = (b.x1.round() as i64, b.y1.round() as i64);
        let (x2, y2) = (b.x2.round() as i64, b.y2.round() as i64);
        // 取景起点 (原图像素坐标)
        let (sx0, sy0) = if narrow {
            ((b.x1 * 0.65).round() as i64, y1)
        } else {
            (x1, (b.y1 * 0.75).round() as i64)
        };

        let view = frame.map(|f| f.view()).transpose()?;
        for y in y1.max(0)..y2.min(sh as i64) {
            for x in x1.max(0)..x2.min(sw as i64) {
                let (sx, sy) = (sx0 + (x - x1), sy0 + (y - y1));
                let inside = |w: u32, h: u32| sx >= 0 && sy >= 0 && sx < w as i64 && sy < h as i64;
                let px = match &view {
                    Some(v) if inside(v.width(), v.height()) => *v.get_pixel(sx as u32, sy as u32),
                    _ => TRANSPARENT,
                };
                surface.put_pixel(x as u32, y as u32, px);
            }
        }
        Ok(())
    }

    /// 原图拉伸铺满画布
    fn draw_source(&mut self, surface: &mut RgbaImage, frame: &Frame) -> Result<()> {
        let (sw, sh) = surface.dimensions();
        let (fw, fh) = frame.dimensions();
        if fw == 0 || fh == 0 || sw == 0 || sh == 0 {
            return Ok(());
        }
        if frame.rgba_data.len() != fw as usize * fh as usize * 4 {
            return Err(Error::Render("RGBA缓冲区长度与尺寸不符".to_string()));
        }
        if (fw, fh) == (sw, sh) {
            surface.copy_from_slice(frame.rgba_data.as_slice());
            return Ok(());
        }

        let src = fr::images::ImageRef::new(fw, fh, &frame.rgba_data, fr::PixelType::U8x4)
            .map_err(|e| Error::Render(format!("源图像创建失败: {}", e)))?;
        let mut dst = fr::images::Image::new(sw, sh, fr::PixelType::U8x4);
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| Error::Render(format!("缩放失败: {}", e)))?;
        surface.copy_from_slice(dst.buffer());
        Ok(())
    }

    /// 文字宽高; 高度取字号 (与字体无关), 无字体时按 0.6 字宽估算
    fn measure(&self, text: &str, font_px: f32) -> (u32, u32) {
        let height = font_px.round() as u32;
        let width = match &self.font {
            Some(font) => text_size(PxScale::from(font_px), font, text).0,
            None => (text.chars().count() as f32 * font_px * 0.6).round() as u32,
        };
        (width, height)
    }
}

/// 清屏 (全透明)
pub fn clear(surface: &mut RgbaImage) {
    for px in surface.pixels_mut() {
        *px = TRANSPARENT;
    }
}

/// 字号: max(round(max(w,h)/40), 14)
pub fn font_px(width: u32, height: u32) -> f32 {
    (width.max(height) as f32 / 40.0).round().max(14.0)
}

/// 边框线宽: max(min(w,h)/200, 2.5)
pub fn line_width(width: u32, height: u32) -> f32 {
    (width.min(height) as f32 / 200.0).max(2.5)
}

/// 整数像素范围, 裁剪到画布内
fn clip(b: &BBox, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x1 = b.x1.min(b.x2).floor().clamp(0.0, width as f32) as u32;
    let y1 = b.y1.min(b.y2).floor().clamp(0.0, height as f32) as u32;
    let x2 = b.x1.max(b.x2).ceil().clamp(0.0, width as f32) as u32;
    let y2 = b.y1.max(b.y2).ceil().clamp(0.0, height as f32) as u32;
    (x1, y1, x2, y2)
}

fn fill_rect_blend(surface: &mut RgbaImage, b: &BBox, color: Rgba<u8>) {
    let (x1, y1, x2, y2) = clip(b, surface.width(), surface.height());
    for y in y1..y2 {
        for x in x1..x2 {
            surface.get_pixel_mut(x, y).blend(&color);
        }
    }
}

fn stroke_rect(surface: &mut RgbaImage, b: &BBox, line_width: f32, color: Rgba<u8>) {
    let x = b.x1.min(b.x2).round() as i32;
    let y = b.y1.min(b.y2).round() as i32;
    let w = b.width().round() as i32;
    let h = b.height().round() as i32;
    let thickness = line_width.round().max(1.0) as i32;
    // 线宽以边为中心
    let half = thickness / 2;
    for i in 0..thickness {
        let inset = i - half;
        let (rw, rh) = (w - 2 * inset, h - 2 * inset);
        if rw <= 0 || rh <= 0 {
            break;
        }
        draw_hollow_rect_mut(
            surface,
            Rect::at(x + inset, y + inset).of_size(rw as u32, rh as u32),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(dets: Vec<Detection>) -> SelectionResult {
        SelectionResult {
            selected: dets.clone(),
            survivors: dets,
        }
    }

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Detection {
        Detection {
            class_id: 0,
            score,
            bbox: BBox { y1, x1, y2, x2 },
        }
    }

    fn renderer(mode: RenderMode) -> Renderer {
        Renderer::new(mode, ScaleTracker::new(64, 64), vec!["face".to_string()])
    }

    #[test]
    fn test_sizes() {
        assert_eq!(font_px(640, 480), 16.0);
        assert_eq!(font_px(320, 240), 14.0);
        assert_eq!(line_width(640, 480), 2.5);
        assert_eq!(line_width(1920, 1080), 5.4);
    }

    #[test]
    fn test_label_text() {
        let r = renderer(RenderMode::Boxes);
        assert_eq!(r.label_text(&face(0.0, 0.0, 1.0, 1.0, 0.9567)), "face - 95.7%");
        let mut other = face(0.0, 0.0, 1.0, 1.0, 0.5);
        other.class_id = 7;
        assert_eq!(r.label_text(&other), "class 7 - 50.0%");
    }

    #[test]
    fn test_boxes_mode_draws_fill_and_border() {
        let mut r = renderer(RenderMode::Boxes);
        let frame = Frame::from_image(RgbaImage::from_pixel(64, 64, Rgba([0, 0, 255, 255])));
        let mut surface = RgbaImage::new(64, 64);
        let sel = selection(vec![face(20.0, 30.0, 50.0, 60.0, 0.9)]);

        r.render(&mut surface, &sel, &ScaleRatios::identity(), Some(&frame))
            .unwrap();

        let border = class_color(0);
        // 边框
        assert_eq!(*surface.get_pixel(20, 45), border);
        // 内部: 蓝底 + 20% 红色
        let inside = surface.get_pixel(35, 45);
        assert!(inside.0[0] > 0 && inside.0[2] > 150);
        // 框外保持原图
        assert_eq!(*surface.get_pixel(5, 62), Rgba([0, 0, 255, 255]));
        // 标签底色在框上方: y = 30 - (14 + 3)
        assert_eq!(*surface.get_pixel(25, 20), border);
        assert_eq!(*surface.get_pixel(25, 10), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_label_text_drawn_with_font() {
        let font = Renderer::load_font(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/assets/font/DejaVuSans.ttf"
        ));
        assert!(font.is_some());
        let mut r = renderer(RenderMode::Boxes);
        r.set_font(font);
        let mut surface = RgbaImage::new(64, 64);
        let sel = selection(vec![face(20.0, 30.0, 50.0, 60.0, 0.9)]);
        r.render(&mut surface, &sel, &ScaleRatios::identity(), None)
            .unwrap();

        // 标签底色 (y 13..30, x 19..) 上有白色文字
        let border = class_color(0);
        let mut swatch = 0;
        let mut text = 0;
        for y in 13..30 {
            for x in 19..64 {
                let px = *surface.get_pixel(x, y);
                if px == border {
                    swatch += 1;
                } else {
                    text += 1;
                }
            }
        }
        assert!(swatch > 0);
        assert!(text > 0);
    }

    #[test]
    fn test_embedded_font_matches_asset() {
        assert!(Renderer::embedded_font().is_some());
    }

    #[test]
    fn test_label_clamped_to_top() {
        let mut r = renderer(RenderMode::Boxes);
        let mut surface = RgbaImage::new(64, 64);
        let sel = selection(vec![face(10.0, 2.0, 40.0, 40.0, 0.5)]);
        r.render(&mut surface, &sel, &ScaleRatios::identity(), None)
            .unwrap();
        // 标签底色从第0行开始
        assert_eq!(*surface.get_pixel(12, 0), class_color(0));
    }

    #[test]
    fn test_empty_selection_only_draws_source() {
        let mut r = renderer(RenderMode::Boxes);
        let frame = Frame::from_image(RgbaImage::from_pixel(64, 64, Rgba([10, 20, 30, 255])));
        let mut surface = RgbaImage::from_pixel(64, 64, Rgba([1, 1, 1, 1]));
        r.render(
            &mut surface,
            &SelectionResult::default(),
            &ScaleRatios::identity(),
            Some(&frame),
        )
        .unwrap();
        assert!(surface.pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn test_source_stretched_to_surface() {
        let mut r = renderer(RenderMode::Boxes);
        let frame = Frame::from_image(RgbaImage::from_pixel(32, 24, Rgba([200, 100, 50, 255])));
        let mut surface = RgbaImage::new(64, 64);
        r.render(
            &mut surface,
            &SelectionResult::default(),
            &ScaleRatios::identity(),
            Some(&frame),
        )
        .unwrap();
        for p in surface.pixels() {
            assert!((p.0[0] as i32 - 200).abs() <= 1);
            assert!((p.0[1] as i32 - 100).abs() <= 1);
            assert!((p.0[2] as i32 - 50).abs() <= 1);
        }
    }

    #[test]
    fn test_mask_mode_reveals_first_box() {
        let mut r = renderer(RenderMode::Mask { narrow: false });
        let mut src = RgbaImage::new(64, 64);
        for (x, y, px) in src.enumerate_pixels_mut() {
            *px = Rgba([x as u8, y as u8, 0, 255]);
        }
        let frame = Frame::from_image(src);
        let mut surface = RgbaImage::new(64, 64);
        let sel = selection(vec![face(10.0, 20.0, 30.0, 40.0, 0.9)]);
        r.render(&mut surface, &sel, &ScaleRatios::identity(), Some(&frame))
            .unwrap();

        assert_eq!(*surface.get_pixel(0, 0), BLACK);
        assert_eq!(*surface.get_pixel(50, 50), BLACK);
        // 取景起点 (x1, y1*0.75) = (10, 15)
        assert_eq!(*surface.get_pixel(10, 20), Rgba([10, 15, 0, 255]));
        assert_eq!(*surface.get_pixel(29, 39), Rgba([29, 34, 0, 255]));
    }

    #[test]
    fn test_mask_mode_narrow_offset() {
        let mut r = renderer(RenderMode::Mask { narrow: true });
        let mut src = RgbaImage::new(64, 64);
        for (x, y, px) in src.enumerate_pixels_mut() {
            *px = Rgba([x as u8, y as u8, 0, 255]);
        }
        let frame = Frame::from_image(src);
        let mut surface = RgbaImage::new(64, 64);
        let sel = selection(vec![face(20.0, 20.0, 30.0, 30.0, 0.9)]);
        r.render(&mut surface, &sel, &ScaleRatios::identity(), Some(&frame))
            .unwrap();
        // 取景起点 (x1*0.65, y1) = (13, 20)
        assert_eq!(*surface.get_pixel(20, 20), Rgba([13, 20, 0, 255]));
    }

    #[test]
    fn test_mask_mode_without_detection_is_clear() {
        let mut r = renderer(RenderMode::Mask { narrow: false });
        let mut surface = RgbaImage::from_pixel(16, 16, WHITE);
        r.render(
            &mut surface,
            &SelectionResult::default(),
            &ScaleRatios::identity(),
            None,
        )
        .unwrap();
        assert!(surface.pixels().all(|p| *p == TRANSPARENT));
    }
}
