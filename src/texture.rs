use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::{GpuError, GraphicsDevice, TextureId, TextureImage};

/// Channel order the decoded pixels are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
}

impl PixelFormat {
    fn swaps_red_blue(self) -> bool {
        matches!(self, PixelFormat::Bgr | PixelFormat::Bgra)
    }

    fn keeps_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba | PixelFormat::Bgra)
    }
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to decode texture {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Device(#[from] GpuError),
}

/// Loads images onto texture units and binds them.
pub trait TextureService {
    fn load(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &Path,
        unit: u32,
        format: PixelFormat,
    ) -> Result<TextureId, TextureError>;

    fn bind(&mut self, device: &mut dyn GraphicsDevice, unit: u32);
}

/// [`TextureService`] decoding files with the `image` crate.
#[derive(Debug, Default)]
pub struct TextureManager {
    units: HashMap<u32, LoadedTexture>,
}

#[derive(Debug, Clone)]
struct LoadedTexture {
    id: TextureId,
    path: PathBuf,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, unit: u32) -> bool {
        self.units.contains_key(&unit)
    }

    /// File currently resident on `unit`.
    pub fn path(&self, unit: u32) -> Option<&Path> {
        self.units.get(&unit).map(|t| t.path.as_path())
    }

    pub fn texture(&self, unit: u32) -> Option<TextureId> {
        self.units.get(&unit).map(|t| t.id)
    }
}

impl TextureService for TextureManager {
    fn load(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &Path,
        unit: u32,
        format: PixelFormat,
    ) -> Result<TextureId, TextureError> {
        let decoded = image::open(path).map_err(|source| TextureError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let image = convert_pixels(decoded, format);
        let id = device.create_texture(unit, &image)?;
        debug!(
            "loaded {} ({}x{}) onto texture unit {unit}",
            path.display(),
            image.width,
            image.height
        );
        self.units.insert(
            unit,
            LoadedTexture {
                id,
                path: path.to_path_buf(),
            },
        );
        Ok(id)
    }

    fn bind(&mut self, device: &mut dyn GraphicsDevice, unit: u32) {
        if !self.units.contains_key(&unit) {
            debug!("texture unit {unit} is empty");
            return;
        }
        device.bind_texture(unit);
    }
}

/// Converts a decoded image to RGBA8 honouring `format`.
pub fn convert_pixels(decoded: image::DynamicImage, format: PixelFormat) -> TextureImage {
    let mut rgba = decoded.to_rgba8();
    for pixel in rgba.pixels_mut() {
        if format.swaps_red_blue() {
            pixel.0.swap(0, 2);
        }
        if !format.keeps_alpha() {
            pixel.0[3] = u8::MAX;
        }
    }
    TextureImage {
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    }
}
