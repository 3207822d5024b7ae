//! Caption overlays, rasterized once per caption and blended per frame.

use metrics::counter;
use tvid_models::CaptionFrame;

use super::raster::{blend_pixel, with_coverage};
use crate::captions::TextMeasure;
use crate::fonts::FontFace;
use crate::metrics::names;

/// A straight-alpha RGBA layer positioned in frame coordinates.
#[derive(Debug, Clone)]
pub struct CaptionOverlay {
    /// Caption this layer was built from
    pub caption_index: u32,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl CaptionOverlay {
    /// Rasterize a caption: box, then outline, then fill.
    pub fn render(caption: &CaptionFrame, face: &FontFace) -> Self {
        let style = &caption.style;
        let size = style.size;
        let ascent = face.ascent(size);
        let descent = (face.line_height(size) - ascent).max(0.0);
        let outline = if style.outline_color.is_some() {
            style.outline_width.max(0.0).ceil() as i32
        } else {
            0
        };
        let box_pad = if style.box_color.is_some() {
            (size * 0.25).ceil() as i32
        } else {
            0
        };
        let pad = outline + box_pad;

        let left = caption.lines.iter().map(|l| l.x).min().unwrap_or(0) - pad;
        let right = caption
            .lines
            .iter()
            .map(|l| l.x + l.width as i32)
            .max()
            .unwrap_or(0)
            + pad;
        let top = caption
            .lines
            .iter()
            .map(|l| l.baseline_y - ascent.ceil() as i32)
            .min()
            .unwrap_or(0)
            - pad;
        let bottom = caption
            .lines
            .iter()
            .map(|l| l.baseline_y + descent.ceil() as i32)
            .max()
            .unwrap_or(0)
            + pad;

        let width = (right - left).max(0) as u32;
        let height = (bottom - top).max(0) as u32;
        let mut overlay = Self {
            caption_index: caption.index,
            x: left,
            y: top,
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        };

        let fill_mask = overlay.text_mask(caption, face);

        if let Some(box_color) = style.box_color {
            let rgba = box_color.to_array();
            for px in overlay.pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
        if let Some(outline_color) = style.outline_color {
            if outline > 0 {
                let mask = dilate(&fill_mask, width as usize, height as usize, outline);
                overlay.paint(&mask, outline_color.to_array());
            }
        }
        overlay.paint(&fill_mask, style.color.to_array());

        counter!(names::CAPTION_OVERLAYS_TOTAL).increment(1);
        overlay
    }

    fn text_mask(&self, caption: &CaptionFrame, face: &FontFace) -> Vec<u8> {
        let (w, h) = (self.width as i32, self.height as i32);
        let mut mask = vec![0u8; (w * h).max(0) as usize];
        let size = caption.style.size;

        for line in &caption.lines {
            let mut pen = line.x as f32;
            let mut prev = None;
            for ch in line.text.chars() {
                if let Some(p) = prev {
                    pen += face.kern(p, ch, size);
                }
                prev = Some(ch);

                let glyph = face.glyph(ch, size);
                let gx = (pen + glyph.xmin as f32).round() as i32 - self.x;
                let gy = line.baseline_y - glyph.ymin - glyph.height as i32 - self.y;
                pen += glyph.advance;

                for row in 0..glyph.height as i32 {
                    let py = gy + row;
                    if py < 0 || py >= h {
                        continue;
                    }
                    for col in 0..glyph.width as i32 {
                        let px = gx + col;
                        if px < 0 || px >= w {
                            continue;
                        }
                        let c = glyph.coverage[(row * glyph.width as i32 + col) as usize];
                        let idx = (py * w + px) as usize;
                        mask[idx] = mask[idx].max(c);
                    }
                }
            }
        }
        mask
    }

    /// Composite `color` through `mask` onto the layer.
    fn paint(&mut self, mask: &[u8], color: [u8; 4]) {
        for (i, &coverage) in mask.iter().enumerate() {
            if coverage == 0 {
                continue;
            }
            over(&mut self.pixels[i * 4..i * 4 + 4], with_coverage(color, coverage));
        }
    }

    /// Blend the layer onto an opaque frame.
    pub fn apply(&self, frame: &mut [u8], frame_width: u32, frame_height: u32) {
        for row in 0..self.height as i32 {
            let fy = self.y + row;
            if fy < 0 || fy >= frame_height as i32 {
                continue;
            }
            for col in 0..self.width as i32 {
                let fx = self.x + col;
                if fx < 0 || fx >= frame_width as i32 {
                    continue;
                }
                let src = ((row as u32 * self.width + col as u32) * 4) as usize;
                let px = [
                    self.pixels[src],
                    self.pixels[src + 1],
                    self.pixels[src + 2],
                    self.pixels[src + 3],
                ];
                if px[3] == 0 {
                    continue;
                }
                let dst = ((fy as u32 * frame_width + fx as u32) * 4) as usize;
                blend_pixel(frame, dst, px);
            }
        }
    }

    pub fn bounds(&self) -> (i32, i32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }
}

/// Straight-alpha "over" onto a possibly transparent pixel.
fn over(dst: &mut [u8], src: [u8; 4]) {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let value = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Max-filter a coverage mask over a disk of `radius` pixels.
fn dilate(mask: &[u8], width: usize, height: usize, radius: i32) -> Vec<u8> {
    let offsets: Vec<(i32, i32)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|(dx, dy)| dx * dx + dy * dy <= radius * radius)
        .collect();

    let mut out = vec![0u8; mask.len()];
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut best = 0u8;
            for &(dx, dy) in &offsets {
                let (sx, sy) = (x + dx, y + dy);
                if sx < 0 || sy < 0 || sx >= width as i32 || sy >= height as i32 {
                    continue;
                }
                best = best.max(mask[sy as usize * width + sx as usize]);
                if best == 255 {
                    break;
                }
            }
            out[y as usize * width + x as usize] = best;
        }
    }
    out
}
