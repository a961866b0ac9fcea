use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::input::SpectatorBindings;
use crate::mesh::ShapeConfig;
use crate::texture::PixelFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderPairConfig {
    pub name: String,
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPairConfig {
    fn new(name: &str, stem: &str) -> Self {
        Self {
            name: name.to_string(),
            vertex: PathBuf::from(format!("shaders/{stem}.vert.wgsl")),
            fragment: PathBuf::from(format!("shaders/{stem}.frag.wgsl")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureConfig {
    pub path: PathBuf,
    pub unit: u32,
    pub format: PixelFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    pub family: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub text: String,
    pub position: Vec2,
    pub pixel_size: u32,
}

/// An OBJ file loaded after the built-in shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub search_path: Option<PathBuf>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Subtracted from every coordinate on all three axes.
    #[serde(default)]
    pub offset: f32,
}

fn default_visible() -> bool {
    true
}

impl ModelConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            search_path: None,
            visible: true,
            offset: 0.0,
        }
    }
}

/// Everything the scene reads from disk or draws with a fixed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub asset_root: PathBuf,
    pub shaders: Vec<ShaderPairConfig>,
    pub skybox_textures: Vec<TextureConfig>,
    pub font: FontConfig,
    pub shapes: ShapeConfig,
    pub clear_color: Vec4,
    pub diffuse: Vec4,
    pub overlay: OverlayConfig,
    pub models: Vec<ModelConfig>,
    pub keys: SpectatorBindings,
}

impl Default for SceneConfig {
    fn default() -> Self {
        let skybox_textures = ["nz", "nx", "pz", "px", "py", "ny"]
            .iter()
            .zip(0..)
            .map(|(face, unit)| TextureConfig {
                path: PathBuf::from(format!("textures/{face}.jpg")),
                unit,
                format: PixelFormat::Rgb,
            })
            .collect();
        Self {
            width: 640,
            height: 480,
            asset_root: PathBuf::from("assets"),
            shaders: vec![
                ShaderPairConfig::new("perspective", "flat-depth"),
                ShaderPairConfig::new("font", "font"),
            ],
            skybox_textures,
            font: FontConfig {
                family: "serif".to_string(),
                path: PathBuf::from("/usr/share/fonts/dejavu/DejaVuSerif.ttf"),
            },
            shapes: ShapeConfig::default(),
            clear_color: Vec4::new(0.0, 0.7, 0.7, 1.0),
            diffuse: Vec4::new(1.0, 0.5, 0.0, 1.0),
            overlay: OverlayConfig {
                text: "Hello, World!".to_string(),
                position: Vec2::splat(10.0),
                pixel_size: 48,
            },
            models: Vec::new(),
            keys: SpectatorBindings::default(),
        }
    }
}

impl SceneConfig {
    /// Reads a JSON config. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Joins relative paths onto the asset root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }

    /// Width over height as a float.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}
