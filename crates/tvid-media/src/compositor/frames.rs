//! Frame compositor: background plus caption overlay, one frame at a time.

use metrics::counter;
use std::sync::Arc;
use tracing::debug;
use tvid_models::{BackgroundFit, CaptionFrame, Resolution, TextCard};

use super::overlay::CaptionOverlay;
use super::raster::RasterFrame;
use super::source::FrameSource;
use crate::captions::{layout_card, CaptionCanvas, CaptionFrames, CaptionLayout};
use crate::error::{MediaError, MediaResult};
use crate::fonts::FontCache;
use crate::metrics::names;

/// Composes background and captions into raster frames.
pub struct Compositor {
    layout: CaptionLayout,
    background: Box<dyn FrameSource>,
    fonts: Arc<FontCache>,
    frame_rate: f64,
    duration: f64,
    resolution: Resolution,
    fit: BackgroundFit,
    /// Card layers, drawn on every frame
    card: Vec<CaptionOverlay>,
    started: bool,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("frame_rate", &self.frame_rate)
            .field("duration", &self.duration)
            .field("resolution", &self.resolution)
            .field("fit", &self.fit)
            .field("card_layers", &self.card.len())
            .finish()
    }
}

impl Compositor {
    pub fn new(
        layout: CaptionLayout,
        background: Box<dyn FrameSource>,
        fonts: Arc<FontCache>,
        frame_rate: f64,
        duration: f64,
        resolution: Resolution,
    ) -> MediaResult<Self> {
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(MediaError::config(format!(
                "frame rate must be positive, got {frame_rate}"
            )));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(MediaError::config(format!(
                "duration must be positive, got {duration}"
            )));
        }
        if resolution.width == 0 || resolution.height == 0 {
            return Err(MediaError::config(format!(
                "resolution must be non-empty, got {resolution}"
            )));
        }

        Ok(Self {
            layout,
            background,
            fonts,
            frame_rate,
            duration,
            resolution,
            fit: BackgroundFit::default(),
            card: Vec::new(),
            started: false,
        })
    }

    pub fn with_fit(mut self, fit: BackgroundFit) -> Self {
        self.fit = fit;
        self
    }

    /// Draw `card` over the background for the whole video, below the captions.
    pub fn with_card(mut self, card: &TextCard) -> MediaResult<Self> {
        let canvas = CaptionCanvas::new(self.resolution, self.frame_rate);
        let fonts = Arc::clone(&self.fonts);
        let layers = layout_card(card, canvas, self.duration, |family| fonts.measure(family))?;
        self.card = layers
            .iter()
            .map(|layer| CaptionOverlay::render(layer, &fonts.face(&layer.style.family)))
            .collect();
        Ok(self)
    }

    /// `ceil(duration × frame_rate)`.
    pub fn frame_count(&self) -> u64 {
        let exact = self.duration * self.frame_rate;
        let rounded = exact.round();
        if (exact - rounded).abs() < 1e-6 {
            rounded as u64
        } else {
            exact.ceil() as u64
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Lazily produce every frame. Calling again restarts from frame 0,
    /// which needs a seekable background.
    pub fn frames(&mut self) -> MediaResult<CompositorFrames<'_>> {
        if self.started {
            if !self.background.is_seekable() {
                return Err(MediaError::render(
                    "background source cannot restart from the beginning",
                ));
            }
            self.background.rewind()?;
        }
        self.started = true;

        let total = self.frame_count();
        debug!(
            frames = total,
            fps = self.frame_rate,
            resolution = %self.resolution,
            "Compositing frames"
        );

        Ok(CompositorFrames {
            captions: self.layout.frames(),
            pending: None,
            overlay: None,
            next_index: 0,
            total,
            compositor: self,
        })
    }

    /// Map narration time to the background's own timeline.
    fn background_time(&self, t: f64) -> f64 {
        let Some(length) = self.background.duration().filter(|d| *d > 0.0) else {
            return t;
        };
        match self.fit {
            BackgroundFit::Hold => {
                let last = length - 1.0 / self.frame_rate;
                t.min(last.max(0.0))
            }
            BackgroundFit::Loop => t % length,
        }
    }
}

/// Iterator over composed frames.
pub struct CompositorFrames<'a> {
    compositor: &'a mut Compositor,
    captions: CaptionFrames,
    /// Next caption not yet reached
    pending: Option<CaptionFrame>,
    /// Overlay of the caption currently on screen
    overlay: Option<(CaptionFrame, CaptionOverlay)>,
    next_index: u64,
    total: u64,
}

impl CompositorFrames<'_> {
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Overlay for the caption visible at `t`, if any.
    fn overlay_at(&mut self, t: f64) -> Option<&CaptionOverlay> {
        if self.overlay.as_ref().is_some_and(|(c, _)| c.end <= t) {
            self.overlay = None;
        }
        if self.overlay.is_none() {
            loop {
                let caption = match self.pending.take() {
                    Some(c) => c,
                    None => self.captions.next()?,
                };
                if caption.end <= t {
                    continue;
                }
                if caption.start > t {
                    self.pending = Some(caption);
                    return None;
                }
                let face = self.compositor.fonts.face(&caption.style.family);
                let overlay = CaptionOverlay::render(&caption, &face);
                self.overlay = Some((caption, overlay));
                break;
            }
        }
        self.overlay.as_ref().map(|(_, o)| o)
    }

    fn compose(&mut self, index: u64) -> MediaResult<RasterFrame> {
        let t = index as f64 / self.compositor.frame_rate;
        let resolution = self.compositor.resolution;
        let mut frame = RasterFrame::blank(index, t, resolution);

        let bg_time = self.compositor.background_time(t);
        self.compositor
            .background
            .frame_at(bg_time, &mut frame.pixels)?;

        for layer in &self.compositor.card {
            layer.apply(&mut frame.pixels, resolution.width, resolution.height);
        }
        if let Some(overlay) = self.overlay_at(t) {
            overlay.apply(&mut frame.pixels, resolution.width, resolution.height);
        }

        counter!(names::FRAMES_RENDERED_TOTAL).increment(1);
        Ok(frame)
    }
}

impl Iterator for CompositorFrames<'_> {
    type Item = MediaResult<RasterFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.total {
            return None;
        }
        let index = self.next_index;
        let result = self.compose(index);
        self.next_index = match result {
            Ok(_) => index + 1,
            // stop after the first error
            Err(_) => self.total,
        };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next_index) as usize;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::{layout, CaptionCanvas, FixedAdvance};
    use crate::compositor::source::{Slideshow, SolidColor};
    use tvid_models::{AlignedFragment, CaptionConfig, Color};

    fn fragments() -> Vec<AlignedFragment> {
        ["Welcome", "to the quiz", "let's begin"]
            .iter()
            .zip([(0.1, 1.0), (1.4, 2.6), (3.0, 4.3)])
            .enumerate()
            .map(|(i, (text, (start, end)))| AlignedFragment {
                segment_index: i as u32,
                text: text.to_string(),
                start,
                end,
                confidence: 0.9,
                low_confidence: false,
                line_break: false,
            })
            .collect()
    }

    fn caption_layout(resolution: Resolution) -> CaptionLayout {
        let mut config = CaptionConfig::default().with_budget(20, 1);
        config.font.size = 16.0;
        layout(
            &fragments(),
            config,
            CaptionCanvas::new(resolution, 30.0),
            Arc::new(FixedAdvance::default()),
        )
        .unwrap()
    }

    /// Background that cannot restart.
    struct OneShot(SolidColor);

    impl FrameSource for OneShot {
        fn duration(&self) -> Option<f64> {
            None
        }
        fn frame_at(&mut self, t: f64, out: &mut [u8]) -> MediaResult<()> {
            self.0.frame_at(t, out)
        }
        fn rewind(&mut self) -> MediaResult<()> {
            Ok(())
        }
        fn is_seekable(&self) -> bool {
            false
        }
    }

    fn has_caption_pixels(frame: &RasterFrame) -> bool {
        frame.pixels.chunks_exact(4).any(|px| px[..3] == [255, 255, 255])
    }

    #[test]
    fn test_frame_count_and_captions() {
        let res = Resolution::new(160, 90);
        let mut compositor = Compositor::new(
            caption_layout(res),
            Box::new(SolidColor::new(Color::rgba(0, 0, 255, 255))),
            Arc::new(FontCache::headless()),
            30.0,
            4.5,
            res,
        )
        .unwrap();
        assert_eq!(compositor.frame_count(), 135);

        let frames: Vec<_> = compositor.frames().unwrap().collect::<MediaResult<_>>().unwrap();
        assert_eq!(frames.len(), 135);
        assert!((frames[134].timestamp - 134.0 / 30.0).abs() < 1e-9);

        // "Welcome" is up at 0.5 s, nothing at 0.0 s
        assert!(!has_caption_pixels(&frames[0]));
        assert!(has_caption_pixels(&frames[15]));
        // same caption window renders identically
        assert_eq!(frames[15].pixels, frames[20].pixels);
    }

    #[test]
    fn test_rejects_empty_duration() {
        let res = Resolution::new(16, 16);
        for duration in [0.0, -1.0, f64::NAN] {
            let result = Compositor::new(
                caption_layout(res),
                Box::new(SolidColor::new(Color::BLACK)),
                Arc::new(FontCache::headless()),
                30.0,
                duration,
                res,
            );
            assert!(matches!(result, Err(MediaError::Config(_))), "{duration}");
        }
    }

    #[test]
    fn test_card_drawn_under_captions_on_every_frame() {
        let res = Resolution::new(160, 90);
        let green = Color::rgb(0, 128, 0);
        let layer = tvid_models::CardLayer::new(
            "Paris",
            tvid_models::FontSpec {
                size: 12.0,
                color: green,
                outline_color: None,
                ..Default::default()
            },
            0.0,
            0.3,
        );
        let mut compositor = Compositor::new(
            caption_layout(res),
            Box::new(SolidColor::new(Color::BLACK)),
            Arc::new(FontCache::headless()),
            30.0,
            4.5,
            res,
        )
        .unwrap()
        .with_card(&TextCard { layers: vec![layer] })
        .unwrap();

        let is_green = |f: &RasterFrame| f.pixels.chunks_exact(4).any(|px| px[..3] == [0, 128, 0]);
        let frames: Vec<_> = compositor.frames().unwrap().collect::<MediaResult<_>>().unwrap();
        assert!(frames.iter().all(is_green));
        // captions still show on top
        assert!(has_caption_pixels(&frames[15]));
        assert!(!has_caption_pixels(&frames[0]));
    }

    #[test]
    fn test_rejects_empty_card() {
        let res = Resolution::new(16, 16);
        let result = Compositor::new(
            caption_layout(res),
            Box::new(SolidColor::new(Color::BLACK)),
            Arc::new(FontCache::headless()),
            30.0,
            1.0,
            res,
        )
        .unwrap()
        .with_card(&TextCard { layers: vec![] });
        assert!(matches!(result, Err(MediaError::Config(_))));
    }

    #[test]
    fn test_short_background_holds_last_frame() {
        let res = Resolution::new(8, 8);
        let slides = vec![vec![10; res.rgba_len()], vec![20; res.rgba_len()]];
        let background = Slideshow::from_frames(slides, 1.0).unwrap();
        let empty = layout(
            &[],
            CaptionConfig::default(),
            CaptionCanvas::new(res, 10.0),
            Arc::new(FixedAdvance::default()),
        )
        .unwrap();

        let mut compositor = Compositor::new(
            empty,
            Box::new(background),
            Arc::new(FontCache::headless()),
            10.0,
            5.0,
            res,
        )
        .unwrap();
        let frames: Vec<_> = compositor.frames().unwrap().collect::<MediaResult<_>>().unwrap();
        assert_eq!(frames.len(), 50);
        assert_eq!(frames[5].pixels[0], 10);
        assert!(frames[19..].iter().all(|f| f.pixels[0] == 20));
    }

    #[test]
    fn test_loop_fit_wraps_background() {
        let res = Resolution::new(8, 8);
        let slides = vec![vec![10; res.rgba_len()], vec![20; res.rgba_len()]];
        let background = Slideshow::from_frames(slides, 1.0).unwrap();
        let empty = layout(
            &[],
            CaptionConfig::default(),
            CaptionCanvas::new(res, 10.0),
            Arc::new(FixedAdvance::default()),
        )
        .unwrap();

        let mut compositor = Compositor::new(
            empty,
            Box::new(background),
            Arc::new(FontCache::headless()),
            10.0,
            5.0,
            res,
        )
        .unwrap()
        .with_fit(BackgroundFit::Loop);
        let frames: Vec<_> = compositor.frames().unwrap().collect::<MediaResult<_>>().unwrap();
        assert_eq!(frames[25].pixels[0], 10);
        assert_eq!(frames[35].pixels[0], 20);
    }

    #[test]
    fn test_restart_requires_seekable_background() {
        let res = Resolution::new(16, 16);
        let mut compositor = Compositor::new(
            caption_layout(res),
            Box::new(OneShot(SolidColor::new(Color::BLACK))),
            Arc::new(FontCache::headless()),
            30.0,
            1.0,
            res,
        )
        .unwrap();

        assert_eq!(compositor.frames().unwrap().count(), 30);
        assert!(matches!(compositor.frames(), Err(MediaError::Render(_))));
    }

    #[test]
    fn test_restart_is_identical() {
        let res = Resolution::new(160, 90);
        let mut compositor = Compositor::new(
            caption_layout(res),
            Box::new(SolidColor::new(Color::BLACK)),
            Arc::new(FontCache::headless()),
            30.0,
            2.0,
            res,
        )
        .unwrap();

        let first: Vec<_> = compositor.frames().unwrap().collect::<MediaResult<_>>().unwrap();
        let second: Vec<_> = compositor.frames().unwrap().collect::<MediaResult<_>>().unwrap();
        assert_eq!(first, second);
    }
}
