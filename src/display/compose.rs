use ab_glyph::{FontArc, PxScale};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use super::text;
use crate::error::FrameError;
use crate::model::{Card, PhotoRecord};

const WHITE: Luma<u8> = Luma([255]);
const BLACK: Luma<u8> = Luma([0]);
const CARD_BORDER: u32 = 4;
const CAPTION_MARGIN: f32 = 10.0;
const CARD_PADDING: f32 = 16.0;
const NOTHING_TO_SHOW_DETAIL: &str = "Add photos to the album and they will appear here.";
const CAPTION_FILENAME_CHARS: usize = 30;
/// Share of the darkest and brightest pixels clipped before stretching contrast.
pub const AUTOCONTRAST_CUTOFF_PERCENT: f32 = 2.0;

/// Panel dimensions, with a caption strip along the bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelGeometry {
    pub width: u32,
    pub height: u32,
    pub caption_height: u32,
}

impl PanelGeometry {
    pub fn new(width: u32, height: u32, caption_height: u32) -> Self {
        Self {
            width,
            height,
            caption_height: caption_height.min(height),
        }
    }

    /// Area above the caption strip available to the photo.
    pub fn photo_area(&self) -> (u32, u32) {
        (self.width, self.height - self.caption_height)
    }
}

pub fn resize_to_contain(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f32;
    let ih = src_h.max(1) as f32;
    let cw = canvas_w.max(1) as f32;
    let ch = canvas_h.max(1) as f32;
    let scale = (cw / iw).min(ch / ih).max(0.0);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().clamp(1.0, cw);
    let h = (ih * scale).round().clamp(1.0, ch);
    (w as u32, h as u32)
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}

/// Stretches luminance so the `cutoff_percent` darkest and brightest pixels clip.
pub fn autocontrast(img: &mut GrayImage, cutoff_percent: f32) {
    let total = img.width() as usize * img.height() as usize;
    if total == 0 {
        return;
    }
    let mut histogram = [0usize; 256];
    for pixel in img.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let cut = ((total as f32) * cutoff_percent.clamp(0.0, 49.0) / 100.0) as usize;

    let mut lo = 0usize;
    let mut seen = 0usize;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > cut {
            lo = value;
            break;
        }
    }
    let mut hi = 255usize;
    seen = 0;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > cut {
            hi = value;
            break;
        }
    }
    if hi <= lo {
        return;
    }

    let scale = 255.0 / (hi - lo) as f32;
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let stretched = (value as f32 - lo as f32) * scale;
        *slot = stretched.round().clamp(0.0, 255.0) as u8;
    }
    for pixel in img.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
}

/// Decodes `bytes` and letterboxes the grayscale photo onto a white panel.
pub fn compose_photo(bytes: &[u8], panel: PanelGeometry) -> Result<GrayImage, FrameError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| FrameError::Decode(format!("unsupported image data: {err}")))?;
    let mut gray = decoded.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(FrameError::Decode("image has no pixels".into()));
    }
    autocontrast(&mut gray, AUTOCONTRAST_CUTOFF_PERCENT);

    let (area_w, area_h) = panel.photo_area();
    let (w, h) = resize_to_contain(area_w, area_h, gray.width(), gray.height());
    let resized = if (w, h) == gray.dimensions() {
        gray
    } else {
        imageops::resize(&gray, w, h, FilterType::Triangle)
    };

    let mut canvas = GrayImage::from_pixel(panel.width, panel.height, WHITE);
    let (ox, oy) = center_offset(w, h, area_w, area_h);
    imageops::overlay(&mut canvas, &resized, i64::from(ox), i64::from(oy));
    if panel.caption_height > 0 && area_h < panel.height {
        fill_rect(&mut canvas, 0, area_h, panel.width, 1, BLACK);
    }
    Ok(canvas)
}

/// White panel with a black border, used for error and empty-catalog cards.
pub fn blank_card(panel: PanelGeometry) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(panel.width, panel.height, WHITE);
    let t = CARD_BORDER.min(panel.width / 2).min(panel.height / 2);
    fill_rect(&mut canvas, 0, 0, panel.width, t, BLACK);
    fill_rect(&mut canvas, 0, panel.height - t, panel.width, t, BLACK);
    fill_rect(&mut canvas, 0, 0, t, panel.height, BLACK);
    fill_rect(&mut canvas, panel.width - t, 0, t, panel.height, BLACK);
    canvas
}

/// Writes `caption` left-aligned and vertically centered in the caption strip.
pub fn draw_caption(canvas: &mut GrayImage, panel: PanelGeometry, font: &FontArc, caption: &str) {
    if panel.caption_height < 2 {
        return;
    }
    let (_, strip_top) = panel.photo_area();
    let scale = PxScale::from((panel.caption_height as f32 * 0.35).clamp(8.0, 28.0));
    let max_width = panel.width as f32 - 2.0 * CAPTION_MARGIN;
    let line = text::fit_line(font, scale, caption, max_width);
    let line_height = text::text_height(font, scale);
    let slack = (panel.caption_height as f32 - 1.0 - line_height).max(0.0);
    let top = strip_top as f32 + 1.0 + slack / 2.0;
    let baseline = top + text::ascent(font, scale);
    text::draw_text(canvas, font, scale, &line, CAPTION_MARGIN, baseline, 0);
}

/// Bordered card with the headline, the error category and the message,
/// centered on the panel. Without a font only the border is drawn.
pub fn render_card(panel: PanelGeometry, card: &Card, font: Option<&FontArc>) -> GrayImage {
    let mut canvas = blank_card(panel);
    let Some(font) = font else {
        return canvas;
    };

    let headline_scale = PxScale::from((panel.height as f32 / 9.0).clamp(10.0, 48.0));
    let body_scale = PxScale::from((headline_scale.y * 0.6).max(8.0));
    let max_width = panel.width as f32 - 2.0 * (CARD_BORDER as f32 + CARD_PADDING);
    if max_width <= 0.0 {
        return canvas;
    }

    let mut lines: Vec<(String, PxScale)> =
        text::wrap_text(font, headline_scale, card.headline(), max_width)
            .into_iter()
            .map(|line| (line, headline_scale))
            .collect();
    let body = match card {
        Card::Error { kind, message } => vec![format!("[{}]", kind.label()), message.clone()],
        Card::NothingToShow => vec![NOTHING_TO_SHOW_DETAIL.to_string()],
    };
    for paragraph in body {
        lines.extend(
            text::wrap_text(font, body_scale, &paragraph, max_width)
                .into_iter()
                .map(|line| (line, body_scale)),
        );
    }

    let gap = body_scale.y * 0.4;
    let block_height: f32 = lines
        .iter()
        .map(|(_, scale)| text::text_height(font, *scale) + gap)
        .sum::<f32>()
        - gap;
    let mut top = ((panel.height as f32 - block_height) / 2.0).max(CARD_BORDER as f32);
    for (line, scale) in &lines {
        let width = text::measure_text(font, *scale, line);
        let left = ((panel.width as f32 - width) / 2.0).max(0.0);
        let baseline = top + text::ascent(font, *scale);
        text::draw_text(&mut canvas, font, *scale, line, left, baseline, 0);
        top += text::text_height(font, *scale) + gap;
    }
    canvas
}

/// `"<filename> - <Mon DD, YYYY>"`, with long filenames shortened.
pub fn caption(photo: &PhotoRecord) -> String {
    let filename = if photo.filename.trim().is_empty() {
        "Unknown".to_string()
    } else {
        truncate(&photo.filename, CAPTION_FILENAME_CHARS)
    };
    let date = photo
        .created_at
        .map(|at| at.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string());
    format!("{filename} - {date}")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

fn fill_rect(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, color: Luma<u8>) {
    let x_end = x.saturating_add(w).min(img.width());
    let y_end = y.saturating_add(h).min(img.height());
    for yy in y..y_end {
        for xx in x..x_end {
            img.put_pixel(xx, yy, color);
        }
    }
}
