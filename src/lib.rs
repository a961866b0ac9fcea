//! Free-fly 3D scene demo built on a small immediate-style graphics layer.
//!
//! The scene owns a grid, a textured skybox, a cube and any number of OBJ
//! models, draws them through a [`render::GraphicsDevice`] each frame and
//! overlays a line of text. Rendering goes either through wgpu or through a
//! headless recording device so the whole frame can be inspected in tests.

pub mod app;
pub mod camera;
pub mod config;
pub mod font;
pub mod input;
pub mod mesh;
pub mod obj;
pub mod render;
pub mod scene;
pub mod shader;
pub mod texture;
pub mod timer;
pub mod transform;

pub use app::{print_report, run_headless, HeadlessReport, Platform};
pub use camera::{Camera, SpectatorInput};
pub use config::{ModelConfig, SceneConfig};
pub use font::{FontManager, FontService};
pub use input::{InputState, KeyCode, KeyStateSource, NamedKey, SpectatorBindings};
pub use mesh::{MeshNode, MeshRegistry, SubMesh};
pub use obj::{load_obj, parse_obj, ObjModel};
pub use render::{GraphicsDevice, RecordingDevice, WgpuDevice};
pub use scene::{FrameStats, Scene, SceneError, SceneState, Systems};
pub use shader::{ShaderProgram, ShaderRegistry};
pub use texture::{PixelFormat, TextureManager, TextureService};
pub use timer::{Clock, FrameTimer, ManualClock, SystemClock};
pub use transform::TransformStack;
