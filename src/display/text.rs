//! CPU text rasterization onto grayscale frames.

use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontArc, FontVec, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use fontdb::{Database, Family, Query};
use image::GrayImage;

const ELLIPSIS: &str = "...";

/// Loads `path` when given, otherwise the first usable sans-serif system font.
pub fn load_font(path: Option<&Path>) -> Result<FontArc> {
    if let Some(path) = path {
        let data =
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?;
        return FontArc::try_from_vec(data)
            .with_context(|| format!("failed to decode font at {}", path.display()));
    }

    let mut db = Database::new();
    db.load_system_fonts();
    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Open Sans"),
        Family::Name("Noto Sans"),
        Family::Name("Liberation Sans"),
        Family::SansSerif,
    ];
    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)
        {
            return Ok(font);
        }
    }
    db.faces()
        .find_map(|face| load_face(&db, face.id))
        .ok_or_else(|| anyhow!("no usable system font found"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Option<FontArc> {
    db.with_face_data(id, |data, index| {
        FontVec::try_from_vec_and_index(data.to_vec(), index)
            .ok()
            .map(FontArc::new)
    })
    .flatten()
}

pub fn measure_text(font: &FontArc, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut previous = None;
    for ch in text.chars().filter(|ch| !ch.is_control()) {
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    width.max(0.0)
}

/// Ascent plus descent, without the inter-line gap.
pub fn text_height(font: &FontArc, scale: PxScale) -> f32 {
    let scaled = font.as_scaled(scale);
    scaled.ascent() - scaled.descent()
}

pub fn ascent(font: &FontArc, scale: PxScale) -> f32 {
    font.as_scaled(scale).ascent()
}

/// Greedy word wrap. Words wider than `max_width` get a line of their own
/// and are shortened with an ellipsis.
pub fn wrap_text(font: &FontArc, scale: PxScale, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure_text(font, scale, &candidate) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        current = word.to_string();
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
        .into_iter()
        .map(|line| fit_line(font, scale, &line, max_width))
        .collect()
}

/// Shortens `text` with a trailing ellipsis until it fits in `max_width`.
pub fn fit_line(font: &FontArc, scale: PxScale, text: &str, max_width: f32) -> String {
    if measure_text(font, scale, text) <= max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + ELLIPSIS;
        if measure_text(font, scale, &candidate) <= max_width {
            return candidate;
        }
    }
    String::new()
}

/// Draws one line with its baseline at `baseline`, blending `ink` by glyph coverage.
pub fn draw_text(
    img: &mut GrayImage,
    font: &FontArc,
    scale: PxScale,
    text: &str,
    left: f32,
    baseline: f32,
    ink: u8,
) {
    let scaled = font.as_scaled(scale);
    let (width, height) = img.dimensions();
    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars().filter(|ch| !ch.is_control()) {
        let glyph_id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        let mut glyph = scaled.scaled_glyph(ch);
        glyph.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(glyph) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                let px = bounds.min.x as i64 + i64::from(x);
                let py = bounds.min.y as i64 + i64::from(y);
                if px < 0 || py < 0 || px >= i64::from(width) || py >= i64::from(height) {
                    return;
                }
                let pixel = img.get_pixel_mut(px as u32, py as u32);
                let base = f32::from(pixel[0]);
                let alpha = coverage.clamp(0.0, 1.0);
                pixel[0] = (base + (f32::from(ink) - base) * alpha).round() as u8;
            });
        }
        cursor_x += scaled.h_advance(glyph_id);
        previous = Some(glyph_id);
    }
}
