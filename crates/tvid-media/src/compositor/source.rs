//! Background frame sources.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::debug;
use tvid_models::{AssetRef, BackgroundSpec, Color, Resolution};

use super::raster::fill;
use super::video::VideoSource;
use crate::error::{MediaError, MediaResult};

/// Something that can paint the background for a point in time.
///
/// `frame_at` writes a full RGBA frame of the compositor's resolution
/// into `out`. Times are already mapped into the source's own range.
pub trait FrameSource: Send {
    /// Natural length in seconds; `None` for unbounded sources.
    fn duration(&self) -> Option<f64>;

    fn frame_at(&mut self, t: f64, out: &mut [u8]) -> MediaResult<()>;

    /// Return to the start so frames can be produced again.
    fn rewind(&mut self) -> MediaResult<()>;

    fn is_seekable(&self) -> bool;
}

/// One color everywhere.
#[derive(Debug, Clone, Copy)]
pub struct SolidColor {
    color: [u8; 4],
}

impl SolidColor {
    pub fn new(color: Color) -> Self {
        // Output is opaque video; a transparent background becomes black
        let mut rgba = color.to_array();
        if rgba[3] < 255 {
            let a = u16::from(rgba[3]);
            for c in &mut rgba[..3] {
                *c = ((u16::from(*c) * a + 127) / 255) as u8;
            }
            rgba[3] = 255;
        }
        Self { color: rgba }
    }
}

impl FrameSource for SolidColor {
    fn duration(&self) -> Option<f64> {
        None
    }

    fn frame_at(&mut self, _t: f64, out: &mut [u8]) -> MediaResult<()> {
        fill(out, self.color);
        Ok(())
    }

    fn rewind(&mut self) -> MediaResult<()> {
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// Scale to cover the frame, then crop the overflow evenly.
pub fn cover_scale(img: &RgbaImage, resolution: Resolution) -> RgbaImage {
    let (w, h) = img.dimensions();
    let (tw, th) = (resolution.width, resolution.height);
    if (w, h) == (tw, th) {
        return img.clone();
    }

    let scale = f64::max(tw as f64 / w as f64, th as f64 / h as f64);
    let sw = ((w as f64 * scale).ceil() as u32).max(tw);
    let sh = ((h as f64 * scale).ceil() as u32).max(th);
    let scaled = imageops::resize(img, sw, sh, FilterType::Triangle);

    let x = (sw - tw) / 2;
    let y = (sh - th) / 2;
    let mut cropped = imageops::crop_imm(&scaled, x, y, tw, th).to_image();

    // Flatten any transparency onto black
    for px in cropped.pixels_mut() {
        if px[3] < 255 {
            let a = u16::from(px[3]);
            for c in 0..3 {
                px[c] = ((u16::from(px[c]) * a + 127) / 255) as u8;
            }
            px[3] = 255;
        }
    }
    cropped
}

fn load_image(path: &Path, resolution: Resolution) -> MediaResult<RgbaImage> {
    if !path.exists() {
        return Err(MediaError::render(format!(
            "background image not found: {}",
            path.display()
        )));
    }
    let img = image::open(path)
        .map_err(|e| MediaError::render(format!("cannot decode {}: {e}", path.display())))?
        .to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(MediaError::render(format!("empty image: {}", path.display())));
    }
    debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "Loaded background image"
    );
    Ok(cover_scale(&img, resolution))
}

/// A single image for the whole video.
#[derive(Debug, Clone)]
pub struct StillImage {
    pixels: Vec<u8>,
}

impl StillImage {
    pub fn open(path: &Path, resolution: Resolution) -> MediaResult<Self> {
        Ok(Self::from_image(&load_image(path, resolution)?, resolution))
    }

    pub fn from_image(img: &RgbaImage, resolution: Resolution) -> Self {
        Self {
            pixels: cover_scale(img, resolution).into_raw(),
        }
    }
}

impl FrameSource for StillImage {
    fn duration(&self) -> Option<f64> {
        None
    }

    fn frame_at(&mut self, _t: f64, out: &mut [u8]) -> MediaResult<()> {
        out.copy_from_slice(&self.pixels);
        Ok(())
    }

    fn rewind(&mut self) -> MediaResult<()> {
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// Images shown in order, each for a fixed time.
#[derive(Debug, Clone)]
pub struct Slideshow {
    slides: Vec<Vec<u8>>,
    seconds_per_slide: f64,
}

impl Slideshow {
    pub fn open(paths: &[PathBuf], seconds_per_slide: f64, resolution: Resolution) -> MediaResult<Self> {
        let slides = paths
            .iter()
            .map(|p| load_image(p, resolution).map(RgbaImage::into_raw))
            .collect::<MediaResult<Vec<_>>>()?;
        Self::from_frames(slides, seconds_per_slide)
    }

    pub fn from_frames(slides: Vec<Vec<u8>>, seconds_per_slide: f64) -> MediaResult<Self> {
        if slides.is_empty() {
            return Err(MediaError::config("slideshow needs at least one image"));
        }
        if !seconds_per_slide.is_finite() || seconds_per_slide <= 0.0 {
            return Err(MediaError::config(format!(
                "seconds per slide must be positive, got {seconds_per_slide}"
            )));
        }
        Ok(Self {
            slides,
            seconds_per_slide,
        })
    }
}

impl FrameSource for Slideshow {
    fn duration(&self) -> Option<f64> {
        Some(self.slides.len() as f64 * self.seconds_per_slide)
    }

    fn frame_at(&mut self, t: f64, out: &mut [u8]) -> MediaResult<()> {
        let index = ((t.max(0.0) / self.seconds_per_slide).floor() as usize).min(self.slides.len() - 1);
        out.copy_from_slice(&self.slides[index]);
        Ok(())
    }

    fn rewind(&mut self) -> MediaResult<()> {
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

fn local_path(asset: &AssetRef) -> MediaResult<PathBuf> {
    asset.as_local().map(Path::to_path_buf).ok_or_else(|| {
        MediaError::config(format!("background asset {asset} must be fetched before rendering"))
    })
}

/// Open the source described by a background spec. Remote assets must
/// already be resolved to local paths.
pub fn open_background(
    spec: &BackgroundSpec,
    resolution: Resolution,
    frame_rate: f64,
) -> MediaResult<Box<dyn FrameSource>> {
    Ok(match spec {
        BackgroundSpec::Color { color } => Box::new(SolidColor::new(*color)),
        BackgroundSpec::Image { source } => {
            Box::new(StillImage::open(&local_path(source)?, resolution)?)
        }
        BackgroundSpec::Slideshow {
            sources,
            seconds_per_slide,
        } => {
            let paths = sources.iter().map(local_path).collect::<MediaResult<Vec<_>>>()?;
            Box::new(Slideshow::open(&paths, *seconds_per_slide, resolution)?)
        }
        BackgroundSpec::Video { source } => {
            Box::new(VideoSource::open(&local_path(source)?, resolution, frame_rate)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_scale_fills_frame() {
        let img = RgbaImage::from_pixel(100, 50, image::Rgba([200, 10, 10, 255]));
        let out = cover_scale(&img, Resolution::new(40, 40));
        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(out.get_pixel(0, 0)[0], 200);
        assert_eq!(out.get_pixel(39, 39)[3], 255);
    }

    #[test]
    fn test_solid_color_is_opaque() {
        let mut source = SolidColor::new(Color::TRANSPARENT);
        let mut out = vec![9; 16];
        source.frame_at(0.0, &mut out).unwrap();
        assert_eq!(&out[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_slideshow_picks_slide_by_time() {
        let mut show = Slideshow::from_frames(vec![vec![1; 4], vec![2; 4]], 1.5).unwrap();
        assert_eq!(show.duration(), Some(3.0));

        let mut out = vec![0; 4];
        show.frame_at(1.49, &mut out).unwrap();
        assert_eq!(out[0], 1);
        show.frame_at(1.5, &mut out).unwrap();
        assert_eq!(out[0], 2);
        show.frame_at(10.0, &mut out).unwrap();
        assert_eq!(out[0], 2);
    }

    #[test]
    fn test_missing_image_is_render_error() {
        let spec = BackgroundSpec::Image {
            source: AssetRef::local("/nonexistent/bg.png"),
        };
        let result = open_background(&spec, Resolution::new(16, 16), 30.0);
        assert!(matches!(result, Err(MediaError::Render(_))));
    }

    #[test]
    fn test_remote_asset_must_be_resolved() {
        let spec = BackgroundSpec::Image {
            source: AssetRef::object("bucket", "bg.png"),
        };
        let result = open_background(&spec, Resolution::new(16, 16), 30.0);
        assert!(matches!(result, Err(MediaError::Config(_))));
    }
}
