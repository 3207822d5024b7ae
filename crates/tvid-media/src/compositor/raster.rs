//! RGBA frame buffers and alpha blending.

use tvid_models::Resolution;

/// One output frame, tightly packed RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterFrame {
    pub index: u64,
    /// Presentation time in seconds
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterFrame {
    /// A fully transparent frame.
    pub fn blank(index: u64, timestamp: f64, resolution: Resolution) -> Self {
        Self {
            index,
            timestamp,
            width: resolution.width,
            height: resolution.height,
            pixels: vec![0; resolution.rgba_len()],
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// RGBA of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }
}

/// Straight-alpha "over" of `src` onto an opaque destination pixel.
pub fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }
    let inv_alpha = 255_u16.saturating_sub(alpha);
    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}

/// Scale a color's alpha by an 8-bit coverage value.
pub fn with_coverage(color: [u8; 4], coverage: u8) -> [u8; 4] {
    let alpha = ((u16::from(coverage) * u16::from(color[3])) / 255) as u8;
    [color[0], color[1], color[2], alpha]
}

/// Fill every pixel with one color.
pub fn fill(pixels: &mut [u8], color: [u8; 4]) {
    for px in pixels.chunks_exact_mut(4) {
        px.copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_pixel() {
        let mut frame = vec![0, 0, 0, 255];
        blend_pixel(&mut frame, 0, [255, 255, 255, 255]);
        assert_eq!(frame, vec![255, 255, 255, 255]);

        let mut frame = vec![0, 0, 0, 255];
        blend_pixel(&mut frame, 0, [255, 0, 0, 128]);
        assert_eq!(frame[0], 128);
        assert_eq!(frame[1], 0);

        let mut frame = vec![10, 20, 30, 255];
        blend_pixel(&mut frame, 0, [255, 255, 255, 0]);
        assert_eq!(frame, vec![10, 20, 30, 255]);
    }

    #[test]
    fn test_fill_and_pixel() {
        let mut frame = RasterFrame::blank(0, 0.0, Resolution::new(4, 2));
        fill(&mut frame.pixels, [1, 2, 3, 255]);
        assert_eq!(frame.pixel(3, 1), [1, 2, 3, 255]);
    }
}
