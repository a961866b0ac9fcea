use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use fontdue::layout::{CoordinateSystem, GlyphRasterConfig, Layout, LayoutSettings, TextStyle};
use glam::{Vec2, Vec3};
use log::{debug, info, warn};
use thiserror::Error;

use crate::render::{DrawMode, GraphicsDevice, TextureImage, UniformLocation, UniformValue, Vertex};

/// Texture unit holding the glyph atlas.
pub const FONT_TEXTURE_UNIT: u32 = 15;

const ATLAS_SIZE: u32 = 512;
const GLYPH_PADDING: u32 = 1;

#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse font `{family}`: {message}")]
    Parse {
        family: String,
        message: &'static str,
    },
}

/// Renders overlay text.
pub trait FontService {
    fn load(&mut self, family: &str, path: &Path) -> Result<(), FontError>;

    fn set_font_type(&mut self, family: &str);

    /// Sets the glyph size and the uniform location that receives the text
    /// origin on every write.
    fn set_pixel_size(&mut self, location: Option<UniformLocation>, size: u32);

    fn write(&mut self, device: &mut dyn GraphicsDevice, text: &str, position: Vec2);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AtlasSlot {
    uv_min: Vec2,
    uv_max: Vec2,
}

/// Shelf packer over a square RGBA atlas. Glyph coverage goes to alpha.
#[derive(Debug)]
struct GlyphAtlas {
    pixels: Vec<u8>,
    cursor_x: u32,
    cursor_y: u32,
    row_height: u32,
    full: bool,
    dirty: bool,
}

impl GlyphAtlas {
    fn new() -> Self {
        let mut pixels = vec![0; (ATLAS_SIZE * ATLAS_SIZE * 4) as usize];
        for texel in pixels.chunks_exact_mut(4) {
            texel[..3].fill(u8::MAX);
        }
        Self {
            pixels,
            cursor_x: GLYPH_PADDING,
            cursor_y: GLYPH_PADDING,
            row_height: 0,
            full: false,
            dirty: true,
        }
    }

    fn place(&mut self, coverage: &[u8], width: u32, height: u32) -> Option<AtlasSlot> {
        if self.full {
            return None;
        }
        if width + 2 * GLYPH_PADDING > ATLAS_SIZE || height + 2 * GLYPH_PADDING > ATLAS_SIZE {
            warn!("{width}x{height} glyph does not fit the {ATLAS_SIZE}x{ATLAS_SIZE} atlas; skipping it");
            return None;
        }
        if self.cursor_x + width + GLYPH_PADDING > ATLAS_SIZE {
            self.cursor_y += self.row_height + GLYPH_PADDING;
            self.cursor_x = GLYPH_PADDING;
            self.row_height = 0;
        }
        if self.cursor_y + height + GLYPH_PADDING > ATLAS_SIZE {
            warn!("glyph atlas is full ({ATLAS_SIZE}x{ATLAS_SIZE}); some glyphs will not be rendered");
            self.full = true;
            return None;
        }

        let (gx, gy) = (self.cursor_x, self.cursor_y);
        for row in 0..height {
            for col in 0..width {
                let src = (row * width + col) as usize;
                let dst = (((gy + row) * ATLAS_SIZE + gx + col) * 4 + 3) as usize;
                self.pixels[dst] = coverage[src];
            }
        }
        self.cursor_x += width + GLYPH_PADDING;
        self.row_height = self.row_height.max(height);
        self.dirty = true;

        let size = ATLAS_SIZE as f32;
        Some(AtlasSlot {
            uv_min: Vec2::new(gx as f32 / size, gy as f32 / size),
            uv_max: Vec2::new((gx + width) as f32 / size, (gy + height) as f32 / size),
        })
    }

    fn image(&self) -> TextureImage {
        TextureImage {
            width: ATLAS_SIZE,
            height: ATLAS_SIZE,
            pixels: self.pixels.clone(),
        }
    }
}

/// [`FontService`] rasterizing with `fontdue` into a glyph atlas.
pub struct FontManager {
    fonts: HashMap<String, fontdue::Font>,
    current: Option<String>,
    pixel_size: f32,
    origin_location: Option<UniformLocation>,
    glyphs: HashMap<GlyphRasterConfig, AtlasSlot>,
    atlas: GlyphAtlas,
    unit: u32,
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            current: None,
            pixel_size: 48.0,
            origin_location: None,
            glyphs: HashMap::new(),
            atlas: GlyphAtlas::new(),
            unit: FONT_TEXTURE_UNIT,
        }
    }

    /// Registers a font from memory.
    pub fn load_bytes(&mut self, family: &str, bytes: &[u8]) -> Result<(), FontError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default()).map_err(
            |message| FontError::Parse {
                family: family.to_string(),
                message,
            },
        )?;
        self.fonts.insert(family.to_string(), font);
        Ok(())
    }

    pub fn has_family(&self, family: &str) -> bool {
        self.fonts.contains_key(family)
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Lays out `text` at the origin and returns one quad per visible glyph.
    fn build_quads(&mut self, text: &str) -> (Vec<Vertex>, Vec<u32>) {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let Some(font) = self.current.as_ref().and_then(|name| self.fonts.get(name)) else {
            return (vertices, indices);
        };

        let mut layout: Layout<()> = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings::default());
        layout.append(&[font], &TextStyle::new(text, self.pixel_size, 0));

        for glyph in layout.glyphs() {
            if !glyph.char_data.rasterize() || glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let slot = match self.glyphs.get(&glyph.key) {
                Some(slot) => *slot,
                None => {
                    let (metrics, coverage) = font.rasterize_config(glyph.key);
                    let Some(slot) =
                        self.atlas
                            .place(&coverage, metrics.width as u32, metrics.height as u32)
                    else {
                        continue;
                    };
                    self.glyphs.insert(glyph.key, slot);
                    slot
                }
            };

            let min = Vec2::new(glyph.x, glyph.y);
            let max = min + Vec2::new(glyph.width as f32, glyph.height as f32);
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&[
                Vertex::new(Vec3::new(min.x, min.y, 0.0), slot.uv_min),
                Vertex::new(Vec3::new(max.x, min.y, 0.0), Vec2::new(slot.uv_max.x, slot.uv_min.y)),
                Vertex::new(Vec3::new(max.x, max.y, 0.0), slot.uv_max),
                Vertex::new(Vec3::new(min.x, max.y, 0.0), Vec2::new(slot.uv_min.x, slot.uv_max.y)),
            ]);
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        (vertices, indices)
    }
}

impl FontService for FontManager {
    fn load(&mut self, family: &str, path: &Path) -> Result<(), FontError> {
        let bytes = fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_bytes(family, &bytes)?;
        info!("loaded font `{family}` from {}", path.display());
        Ok(())
    }

    fn set_font_type(&mut self, family: &str) {
        if self.current.as_deref() == Some(family) {
            return;
        }
        if !self.fonts.contains_key(family) {
            warn!("font `{family}` is not loaded");
            self.current = None;
            return;
        }
        self.current = Some(family.to_string());
    }

    fn set_pixel_size(&mut self, location: Option<UniformLocation>, size: u32) {
        self.pixel_size = size.max(1) as f32;
        self.origin_location = location;
    }

    fn write(&mut self, device: &mut dyn GraphicsDevice, text: &str, position: Vec2) {
        if self.current.is_none() {
            warn!("no font selected; dropping text {text:?}");
            return;
        }
        let (vertices, indices) = self.build_quads(text);
        if indices.is_empty() {
            return;
        }
        if self.atlas.dirty {
            match device.create_texture(self.unit, &self.atlas.image()) {
                Ok(_) => {
                    debug!("uploaded glyph atlas to unit {}", self.unit);
                    self.atlas.dirty = false;
                }
                Err(err) => {
                    warn!("failed to upload glyph atlas: {err}");
                    return;
                }
            }
        }
        device.set_uniform(self.origin_location, UniformValue::Vec2(position));
        device.bind_texture(self.unit);
        device.draw_transient(DrawMode::Triangles, &vertices, &indices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingDevice;

    #[test]
    fn writing_without_a_font_draws_nothing() {
        let mut device = RecordingDevice::new();
        let mut fonts = FontManager::new();
        fonts.set_font_type("serif");
        fonts.set_pixel_size(Some(UniformLocation(64)), 48);
        fonts.write(&mut device, "Hello, World!", Vec2::splat(10.0));
        assert!(fonts.current().is_none());
        assert!(device.commands().is_empty());
        assert!(device.texture_units().is_empty());
    }

    #[test]
    fn missing_font_files_are_io_errors() {
        let mut fonts = FontManager::new();
        let err = fonts
            .load("serif", Path::new("/nonexistent/DejaVuSerif.ttf"))
            .unwrap_err();
        assert!(matches!(err, FontError::Io { .. }));
        assert!(!fonts.has_family("serif"));
    }

    #[test]
    fn garbage_bytes_are_parse_errors() {
        let mut fonts = FontManager::new();
        let err = fonts.load_bytes("serif", b"not a font").unwrap_err();
        assert!(matches!(err, FontError::Parse { .. }));
    }

    #[test]
    fn atlas_packs_glyphs_on_shelves() {
        let mut atlas = GlyphAtlas::new();
        let first = atlas.place(&[255; 4], 2, 2).unwrap();
        let second = atlas.place(&[128; 6], 3, 2).unwrap();
        assert_eq!(first.uv_min, Vec2::splat(1.0 / 512.0));
        assert_eq!(second.uv_min.x, 4.0 / 512.0);
        let texel = ((ATLAS_SIZE + 1) * 4) as usize;
        assert_eq!(&atlas.pixels[texel..texel + 4], &[255, 255, 255, 255]);

        let wide = vec![0; 600];
        assert!(atlas.place(&wide, 300, 2).is_some());
        let next_row = atlas.place(&wide, 300, 2).unwrap();
        assert_eq!(next_row.uv_min.y, 4.0 / 512.0);
    }

    #[test]
    fn oversized_glyphs_are_rejected_without_touching_the_atlas() {
        let mut atlas = GlyphAtlas::new();
        assert!(atlas.place(&vec![200; 1200], 600, 2).is_none());
        assert!(atlas.place(&vec![200; 1022], 2, 511).is_none());
        assert!(atlas.pixels.chunks_exact(4).all(|texel| texel[3] == 0));

        let widest = (ATLAS_SIZE - 2 * GLYPH_PADDING) as usize;
        let slot = atlas.place(&vec![200; widest], widest as u32, 1).unwrap();
        assert!(slot.uv_max.x <= 1.0);
        let small = atlas.place(&[255; 4], 2, 2).unwrap();
        assert!(small.uv_max.x <= 1.0 && small.uv_max.y <= 1.0);
    }
}
