/// ultralytics 调色板 (20 色), 按 `class_id % 20` 取色
use image::Rgba;

pub const PALETTE: [&str; 20] = [
    "#FF3838", "#FF9D97", "#FF701F", "#FFB21D", "#CFD231", "#48F90A", "#92CC17", "#3DDB86",
    "#1A9334", "#00D4BB", "#2C99A8", "#00C2FF", "#344593", "#6473FF", "#0018EC", "#8438FF",
    "#520085", "#CB38FF", "#FF95C8", "#FF37C7",
];

/// "#RRGGBB" → (r, g, b)
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// 类别颜色 (不透明)
pub fn class_color(class_id: usize) -> Rgba<u8> {
    let (r, g, b) = hex_to_rgb(PALETTE[class_id % PALETTE.len()]).unwrap_or((255, 255, 255));
    Rgba([r, g, b, 255])
}

/// 类别颜色, 指定透明度 [0,1]
pub fn class_color_alpha(class_id: usize, alpha: f32) -> Rgba<u8> {
    let mut color = class_color(class_id);
    color.0[3] = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    color
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb("#FF3838"), Some((255, 56, 56)));
        assert_eq!(hex_to_rgb("00C2FF"), Some((0, 194, 255)));
        assert_eq!(hex_to_rgb("#FFF"), None);
        assert_eq!(hex_to_rgb("#GG0000"), None);
    }

    #[test]
    fn test_palette_wraps() {
        assert!(PALETTE.iter().all(|h| hex_to_rgb(h).is_some()));
        assert_eq!(class_color(0), class_color(20));
        assert_eq!(class_color(19), Rgba([0xFF, 0x37, 0xC7, 255]));
        assert_eq!(class_color_alpha(0, 0.2).0[3], 51);
    }
}
