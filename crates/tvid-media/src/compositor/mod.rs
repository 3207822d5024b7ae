//! Frame compositing: backgrounds, caption overlays and raster frames.

pub mod frames;
pub mod overlay;
pub mod raster;
pub mod source;
pub mod video;

pub use frames::{Compositor, CompositorFrames};
pub use overlay::CaptionOverlay;
pub use raster::RasterFrame;
pub use source::{open_background, FrameSource, Slideshow, SolidColor, StillImage};
pub use video::VideoSource;
