//! PNG charts for SHAP explanations, returned as base64 strings.
//!
//! Charts are drawn directly on an RGBA buffer with a transparent
//! background: bars, dots and reference lines only, no text.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, Rgba, RgbaImage};

const WIDTH: u32 = 720;
const ROW_HEIGHT: u32 = 28;
const MARGIN: u32 = 24;

const POSITIVE: Rgba<u8> = Rgba([0, 139, 251, 255]);
const NEGATIVE: Rgba<u8> = Rgba([255, 0, 81, 255]);
const AXIS: Rgba<u8> = Rgba([120, 120, 120, 255]);
const GUIDE: Rgba<u8> = Rgba([200, 200, 200, 255]);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] ImageError),
    #[error("Nothing to plot")]
    Empty,
}

/// Horizontal mapping from data values to pixel columns.
struct Scale {
    lo: f64,
    hi: f64,
}

impl Scale {
    fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in values.into_iter().filter(|v| v.is_finite()) {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if !lo.is_finite() {
            return Self { lo: -1.0, hi: 1.0 };
        }
        let pad = ((hi - lo) * 0.05).max(1e-6);
        Self {
            lo: lo - pad,
            hi: hi + pad,
        }
    }

    fn x(&self, v: f64) -> u32 {
        let usable = f64::from(WIDTH - 2 * MARGIN);
        let t = ((v - self.lo) / (self.hi - self.lo)).clamp(0.0, 1.0);
        MARGIN + (t * usable).round() as u32
    }
}

fn canvas(rows: usize) -> RgbaImage {
    let height = 2 * MARGIN + ROW_HEIGHT * rows.max(1) as u32;
    RgbaImage::from_pixel(WIDTH, height, Rgba([0, 0, 0, 0]))
}

fn fill_rect(img: &mut RgbaImage, x0: u32, x1: u32, y0: u32, y1: u32, color: Rgba<u8>) {
    let (x0, x1) = (x0.min(x1), x0.max(x1).max(x0.min(x1) + 1));
    for y in y0..y1.min(img.height()) {
        for x in x0..x1.min(img.width()) {
            img.put_pixel(x, y, color);
        }
    }
}

fn vline(img: &mut RgbaImage, x: u32, color: Rgba<u8>) {
    let bottom = img.height() - MARGIN / 2;
    fill_rect(img, x, x + 1, MARGIN / 2, bottom, color);
}

fn dot(img: &mut RgbaImage, cx: u32, cy: u32, color: Rgba<u8>) {
    const R: i64 = 3;
    for dy in -R..=R {
        for dx in -R..=R {
            if dx * dx + dy * dy > R * R {
                continue;
            }
            let (x, y) = (i64::from(cx) + dx, i64::from(cy) + dy);
            if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn row_top(row: usize) -> u32 {
    MARGIN + ROW_HEIGHT * row as u32
}

/// Blue for low feature values through purple to red for high ones.
fn gradient(t: f64) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    Rgba([
        mix(POSITIVE[0], NEGATIVE[0]),
        mix(POSITIVE[1], NEGATIVE[1]),
        mix(POSITIVE[2], NEGATIVE[2]),
        255,
    ])
}

pub fn encode_png(img: &RgbaImage) -> Result<String, RenderError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(STANDARD.encode(bytes))
}

/// Indices of the `k` largest scores, largest first.
fn top_indices(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}

/// Waterfall of one explanation: the `max_display - 1` largest contributions
/// plus one bar for the remainder, stacked from the base value (bottom) to
/// the model output (top).
pub fn waterfall(
    base_value: f64,
    values: &[f64],
    max_display: usize,
) -> Result<String, RenderError> {
    if values.is_empty() {
        return Err(RenderError::Empty);
    }
    let magnitude: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    let keep = if values.len() > max_display.max(1) {
        max_display.max(2) - 1
    } else {
        values.len()
    };
    let shown = top_indices(&magnitude, keep);
    let mut bars: Vec<f64> = shown.iter().map(|&i| values[i]).collect();
    if shown.len() < values.len() {
        let rest: f64 = (0..values.len())
            .filter(|i| !shown.contains(i))
            .map(|i| values[i])
            .sum();
        bars.push(rest);
    }

    // bottom row holds the last bar
    let mut spans = vec![(0.0, 0.0); bars.len()];
    let mut cursor = base_value;
    for (i, v) in bars.iter().enumerate().rev() {
        spans[i] = (cursor, cursor + v);
        cursor += v;
    }
    let output = cursor;

    let scale = Scale::new(spans.iter().flat_map(|&(a, b)| [a, b]));
    let mut img = canvas(bars.len());
    vline(&mut img, scale.x(base_value), GUIDE);
    vline(&mut img, scale.x(output), AXIS);
    for (row, (&(start, end), v)) in spans.iter().zip(&bars).enumerate() {
        let top = row_top(row) + 4;
        let color = if *v >= 0.0 { POSITIVE } else { NEGATIVE };
        fill_rect(&mut img, scale.x(start), scale.x(end), top, top + ROW_HEIGHT - 8, color);
    }
    encode_png(&img)
}

/// Beeswarm of SHAP values plus a mean-|SHAP| bar chart.
///
/// `values[r][f]` is the attribution of field `f` in row `r`; `features` has
/// the same shape and drives the dot colour.
pub fn summary(
    values: &[Vec<f64>],
    features: &[Vec<f64>],
    max_display: usize,
) -> Result<(String, String), RenderError> {
    let n_fields = values.first().map(Vec::len).unwrap_or(0);
    if values.is_empty() || n_fields == 0 {
        return Err(RenderError::Empty);
    }
    let importance: Vec<f64> = (0..n_fields)
        .map(|f| values.iter().map(|row| row[f].abs()).sum::<f64>() / values.len() as f64)
        .collect();
    let shown = top_indices(&importance, max_display.max(1));

    let shown_values = values.iter().flat_map(|row| shown.iter().map(move |&f| row[f]));
    let scale = Scale::new(shown_values.chain([0.0]));
    let mut swarm = canvas(shown.len());
    vline(&mut swarm, scale.x(0.0), AXIS);
    for (row_idx, &field) in shown.iter().enumerate() {
        let (lo, hi) = features
            .iter()
            .map(|r| r[field])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let centre = row_top(row_idx) + ROW_HEIGHT / 2;
        for (r, row) in values.iter().enumerate() {
            let t = if hi > lo { (features[r][field] - lo) / (hi - lo) } else { 0.5 };
            // deterministic vertical jitter
            let jitter = ((r * 37) % 11) as u32;
            dot(&mut swarm, scale.x(row[field]), centre + jitter - 5, gradient(t));
        }
    }

    let bar_scale = Scale::new(shown.iter().map(|&f| importance[f]).chain([0.0]));
    let mut bars = canvas(shown.len());
    vline(&mut bars, bar_scale.x(0.0), AXIS);
    for (row_idx, &field) in shown.iter().enumerate() {
        let top = row_top(row_idx) + 4;
        fill_rect(
            &mut bars,
            bar_scale.x(0.0),
            bar_scale.x(importance[field]),
            top,
            top + ROW_HEIGHT - 8,
            POSITIVE,
        );
    }

    Ok((encode_png(&swarm)?, encode_png(&bars)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(b64: &str) -> RgbaImage {
        let bytes = STANDARD.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    #[test]
    fn waterfall_has_one_row_per_bar() {
        let values: Vec<f64> = (0..20).map(|i| (i as f64 - 10.0) / 100.0).collect();
        let img = decode(&waterfall(0.6, &values, 10).unwrap());
        assert_eq!(img.width(), WIDTH);
        assert_eq!(img.height(), 2 * MARGIN + 10 * ROW_HEIGHT);
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert!(img.pixels().any(|p| *p == POSITIVE));
        assert!(img.pixels().any(|p| *p == NEGATIVE));
    }

    #[test]
    fn short_explanations_have_no_remainder_bar() {
        let img = decode(&waterfall(0.5, &[0.1, -0.05], 10).unwrap());
        assert_eq!(img.height(), 2 * MARGIN + 2 * ROW_HEIGHT);
        assert!(matches!(waterfall(0.5, &[], 10), Err(RenderError::Empty)));
    }

    #[test]
    fn summary_renders_both_charts() {
        let values = vec![vec![0.1, -0.2, 0.0], vec![0.05, 0.3, -0.01]];
        let features = vec![vec![1.0, 0.0, 2.0], vec![3.0, 1.0, 2.0]];
        let (swarm, importance) = summary(&values, &features, 2).unwrap();
        assert_eq!(decode(&swarm).height(), 2 * MARGIN + 2 * ROW_HEIGHT);
        assert!(decode(&importance).pixels().any(|p| *p == POSITIVE));
        assert!(matches!(summary(&[], &[], 5), Err(RenderError::Empty)));
    }

    #[test]
    fn top_indices_prefers_larger_then_earlier() {
        assert_eq!(top_indices(&[0.1, 0.5, 0.5, 0.2], 3), vec![1, 2, 3]);
    }
}
