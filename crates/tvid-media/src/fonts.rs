//! Font discovery, metrics and glyph rasterization.
//!
//! The cache is built once per worker and shared read-only across jobs.

use fontdue::{Font, FontSettings};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::captions::TextMeasure;
use crate::error::{MediaError, MediaResult};

/// Directories scanned when none are configured.
pub const DEFAULT_FONT_DIRS: &[&str] = &["/usr/share/fonts", "/usr/local/share/fonts"];

const MAX_SCAN_DEPTH: usize = 4;

/// A rasterized glyph coverage mask.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub width: usize,
    pub height: usize,
    /// Offset from the pen position to the left edge
    pub xmin: i32,
    /// Offset from the baseline to the bottom edge (positive is up)
    pub ymin: i32,
    pub advance: f32,
    /// Row-major coverage, top row first
    pub coverage: Vec<u8>,
}

/// A usable face: a parsed outline font or the built-in block face.
pub enum FontFace {
    Outline { name: String, font: Font },
    /// Draws every visible character as a solid block. Used when no font
    /// file is available.
    Block,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontFace::Outline { name, .. } => f.debug_tuple("Outline").field(name).finish(),
            FontFace::Block => f.write_str("Block"),
        }
    }
}

impl FontFace {
    /// Parse a face from font file bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> MediaResult<Self> {
        let name = name.into();
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| MediaError::config(format!("failed to parse font {name}: {e}")))?;
        Ok(FontFace::Outline { name, font })
    }

    pub fn from_file(path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(path.display().to_string(), bytes)
    }

    pub fn is_block(&self) -> bool {
        matches!(self, FontFace::Block)
    }

    /// Kerning adjustment between two characters.
    pub fn kern(&self, left: char, right: char, size: f32) -> f32 {
        match self {
            FontFace::Outline { font, .. } => font.horizontal_kern(left, right, size).unwrap_or(0.0),
            FontFace::Block => 0.0,
        }
    }

    /// Rasterize one character.
    pub fn glyph(&self, ch: char, size: f32) -> Glyph {
        match self {
            FontFace::Outline { font, .. } => {
                let (metrics, coverage) = font.rasterize(ch, size);
                Glyph {
                    width: metrics.width,
                    height: metrics.height,
                    xmin: metrics.xmin,
                    ymin: metrics.ymin,
                    advance: metrics.advance_width,
                    coverage,
                }
            }
            FontFace::Block => {
                let advance = size * 0.6;
                if ch.is_whitespace() {
                    return Glyph {
                        width: 0,
                        height: 0,
                        xmin: 0,
                        ymin: 0,
                        advance,
                        coverage: Vec::new(),
                    };
                }
                let width = (size * 0.5).round().max(1.0) as usize;
                let height = (size * 0.7).round().max(1.0) as usize;
                Glyph {
                    width,
                    height,
                    xmin: (size * 0.05).round() as i32,
                    ymin: 0,
                    advance,
                    coverage: vec![255; width * height],
                }
            }
        }
    }
}

impl TextMeasure for FontFace {
    fn advance(&self, text: &str, size: f32) -> f32 {
        match self {
            FontFace::Outline { font, .. } => {
                let mut width = 0.0;
                let mut prev = None;
                for ch in text.chars() {
                    if let Some(p) = prev {
                        width += font.horizontal_kern(p, ch, size).unwrap_or(0.0);
                    }
                    width += font.metrics(ch, size).advance_width;
                    prev = Some(ch);
                }
                width
            }
            FontFace::Block => text.chars().count() as f32 * size * 0.6,
        }
    }

    fn line_height(&self, size: f32) -> f32 {
        match self {
            FontFace::Outline { font, .. } => font
                .horizontal_line_metrics(size)
                .map(|m| m.new_line_size)
                .unwrap_or(size * 1.2),
            FontFace::Block => size * 1.2,
        }
    }

    fn ascent(&self, size: f32) -> f32 {
        match self {
            FontFace::Outline { font, .. } => font
                .horizontal_line_metrics(size)
                .map(|m| m.ascent)
                .unwrap_or(size * 0.8),
            FontFace::Block => size * 0.8,
        }
    }
}

/// Lowercase alphanumerics only, so "DejaVu Sans Bold" matches
/// `DejaVuSans-Bold.ttf`.
pub fn normalize_family(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Builder for [`FontCache`].
#[derive(Debug, Default)]
pub struct FontCacheBuilder {
    dirs: Vec<PathBuf>,
    families: Vec<String>,
    files: Vec<PathBuf>,
}

impl FontCacheBuilder {
    /// Add a directory to scan for `.ttf`/`.otf` files.
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.push(dir.into());
        self
    }

    /// Load a family by name at build time. The first one becomes the default.
    pub fn family(mut self, family: impl Into<String>) -> Self {
        self.families.push(family.into());
        self
    }

    /// Load an explicit font file; a parse failure is an error.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn build(self) -> MediaResult<FontCache> {
        let dirs = if self.dirs.is_empty() {
            DEFAULT_FONT_DIRS.iter().map(PathBuf::from).collect()
        } else {
            self.dirs
        };

        let mut index = HashMap::new();
        for dir in &dirs {
            scan_dir(dir, 0, &mut index);
        }
        debug!(dirs = dirs.len(), files = index.len(), "Indexed font files");

        let mut faces: HashMap<String, Arc<FontFace>> = HashMap::new();
        let mut default = None;

        for path in &self.files {
            let face = Arc::new(FontFace::from_file(path)?);
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(normalize_family)
                .unwrap_or_default();
            default.get_or_insert_with(|| key.clone());
            faces.insert(key, face);
        }

        for family in &self.families {
            let key = normalize_family(family);
            if faces.contains_key(&key) {
                continue;
            }
            let Some(path) = index.get(&key) else {
                warn!(family = %family, "Font family not found, falling back");
                continue;
            };
            match FontFace::from_file(path) {
                Ok(face) => {
                    default.get_or_insert_with(|| key.clone());
                    faces.insert(key, Arc::new(face));
                }
                Err(e) => warn!(family = %family, path = %path.display(), "Skipping unreadable font: {}", e),
            }
        }

        let fallback = default
            .and_then(|key| faces.get(&key).cloned())
            .unwrap_or_else(|| Arc::new(FontFace::Block));
        if fallback.is_block() {
            warn!("No outline font loaded, captions will use block glyphs");
        }

        Ok(FontCache { faces, fallback })
    }
}

fn scan_dir(dir: &Path, depth: usize, index: &mut HashMap<String, PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_dir(&path, depth + 1, index);
            continue;
        }
        let is_font = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "otf"))
            .unwrap_or(false);
        if !is_font {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            index.entry(normalize_family(stem)).or_insert(path);
        }
    }
}

/// Loaded faces keyed by normalized family name.
#[derive(Debug, Clone)]
pub struct FontCache {
    faces: HashMap<String, Arc<FontFace>>,
    fallback: Arc<FontFace>,
}

impl FontCache {
    pub fn builder() -> FontCacheBuilder {
        FontCacheBuilder::default()
    }

    /// A cache holding only the block face.
    pub fn headless() -> Self {
        Self {
            faces: HashMap::new(),
            fallback: Arc::new(FontFace::Block),
        }
    }

    /// Face for `family`, or the default face when it was not loaded.
    pub fn face(&self, family: &str) -> Arc<FontFace> {
        self.faces
            .get(&normalize_family(family))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Measure for laying out captions in `family`.
    pub fn measure(&self, family: &str) -> Arc<dyn TextMeasure> {
        self.face(family)
    }

    pub fn loaded_families(&self) -> usize {
        self.faces.len()
    }
}

impl Default for FontCache {
    fn default() -> Self {
        Self::headless()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_family() {
        assert_eq!(normalize_family("DejaVu Sans Bold"), "dejavusansbold");
        assert_eq!(normalize_family("DejaVuSans-Bold"), "dejavusansbold");
    }

    #[test]
    fn test_missing_family_falls_back_to_block() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FontCache::builder()
            .search_dir(dir.path())
            .family("Nonexistent Sans")
            .build()
            .unwrap();

        assert_eq!(cache.loaded_families(), 0);
        assert!(cache.face("Nonexistent Sans").is_block());
    }

    #[test]
    fn test_unparseable_font_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();

        let result = FontCache::builder().search_dir(dir.path()).file(&path).build();
        assert!(matches!(result, Err(MediaError::Config(_))));
    }

    #[test]
    fn test_block_face_metrics() {
        let face = FontFace::Block;
        assert_eq!(face.advance("abcd", 10.0), 24.0);
        assert_eq!(face.glyph(' ', 10.0).width, 0);

        let glyph = face.glyph('A', 10.0);
        assert_eq!(glyph.coverage.len(), glyph.width * glyph.height);
        assert!(glyph.coverage.iter().all(|&c| c == 255));
    }
}
