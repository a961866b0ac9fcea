//! Scene orchestration: owns the registries, camera, timer and transform
//! stack and issues one frame of draw commands per [`Scene::update`].

use std::fmt;

use glam::Mat4;
use log::{debug, error, info};
use serde::Serialize;
use thiserror::Error;

use crate::camera::Camera;
use crate::config::SceneConfig;
use crate::font::FontService;
use crate::input::KeyStateSource;
use crate::mesh::MeshRegistry;
use crate::render::{GraphicsDevice, ProgramId, UniformLocation, UniformValue};
use crate::shader::ShaderRegistry;
use crate::texture::TextureService;
use crate::timer::{Clock, FrameTimer};
use crate::transform::TransformStack;

/// Name of the program drawing the mesh nodes.
pub const PERSPECTIVE_PROGRAM: &str = "perspective";
/// Name of the program drawing overlay text.
pub const FONT_PROGRAM: &str = "font";

const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
const NEAR_PLANE: f32 = 0.001;
const FAR_PLANE: f32 = 750.0;

/// Services the scene draws through, borrowed for one call.
pub struct Systems<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub textures: &'a mut dyn TextureService,
    pub fonts: &'a mut dyn FontService,
    pub keys: &'a dyn KeyStateSource,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SceneState {
    Uninitialized,
    Initialized,
    Running,
    Destroyed,
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SceneState::Uninitialized => "uninitialized",
            SceneState::Initialized => "initialized",
            SceneState::Running => "running",
            SceneState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("cannot {operation} a scene that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SceneState,
    },
}

/// Counters for the most recent frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub frame: u64,
    pub delta: f32,
    pub draw_calls: usize,
    pub skipped_nodes: usize,
}

/// Uniform locations of one program, looked up once per frame.
#[derive(Debug, Clone, Copy, Default)]
struct ProgramBinding {
    program: Option<ProgramId>,
    projection: Option<UniformLocation>,
    modelview: Option<UniformLocation>,
    textured: Option<UniformLocation>,
    offset: Option<UniformLocation>,
    diffuse: Option<UniformLocation>,
}

impl ProgramBinding {
    fn lookup(shaders: &ShaderRegistry, name: &str) -> Self {
        let Some(program) = shaders.get(name) else {
            return Self::default();
        };
        Self {
            program: program.program,
            projection: program.uniform("projection"),
            modelview: program.uniform("modelview"),
            textured: program.uniform("textured"),
            offset: program.uniform("offset"),
            diffuse: program.uniform("diffuse"),
        }
    }
}

pub struct Scene {
    config: SceneConfig,
    state: SceneState,
    shaders: ShaderRegistry,
    meshes: MeshRegistry,
    camera: Camera,
    timer: FrameTimer,
    transforms: TransformStack,
    model: Mat4,
    view: Mat4,
    perspective: Mat4,
    orthographic: Mat4,
    last_frame: FrameStats,
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            state: SceneState::Uninitialized,
            shaders: ShaderRegistry::new(),
            meshes: MeshRegistry::new(),
            camera: Camera::new(),
            timer: FrameTimer::default(),
            transforms: TransformStack::new(),
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            perspective: Mat4::IDENTITY,
            orthographic: Mat4::IDENTITY,
            last_frame: FrameStats::default(),
        }
    }

    /// Loads programs, textures, the font and every mesh, and computes the
    /// projections. Individual load failures are logged and skipped.
    pub fn init(&mut self, sys: &mut Systems<'_>) -> Result<(), SceneError> {
        if self.state != SceneState::Uninitialized {
            return Err(SceneError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        self.timer = FrameTimer::start(sys.clock);

        for pair in &self.config.shaders {
            let vertex = self.config.resolve(&pair.vertex);
            let fragment = self.config.resolve(&pair.fragment);
            if self
                .shaders
                .load_pair(sys.device, &pair.name, &vertex, &fragment)
                .is_err()
            {
                debug!("continuing without program `{}`", pair.name);
            }
        }

        for texture in &self.config.skybox_textures {
            let path = self.config.resolve(&texture.path);
            if let Err(err) = sys
                .textures
                .load(sys.device, &path, texture.unit, texture.format)
            {
                error!("Texture error: {err}");
            }
        }

        let font_path = self.config.resolve(&self.config.font.path);
        if let Err(err) = sys.fonts.load(&self.config.font.family, &font_path) {
            error!("Font error: {err}");
        }

        self.meshes
            .register_builtin_shapes(sys.device, &self.config.shapes);
        for model in &self.config.models {
            let path = self.config.resolve(&model.path);
            let search_path = model.search_path.as_ref().map(|p| self.config.resolve(p));
            self.meshes.load_external_model(
                sys.device,
                &path,
                search_path.as_deref(),
                model.visible,
                model.offset,
            );
        }

        let (width, height) = (self.config.width, self.config.height);
        sys.device.set_viewport(width, height);
        self.perspective = Mat4::perspective_rh(
            FIELD_OF_VIEW_DEGREES.to_radians(),
            self.config.aspect_ratio(),
            NEAR_PLANE,
            FAR_PLANE,
        );
        self.orthographic =
            Mat4::orthographic_rh(0.0, width as f32, height as f32, 0.0, -1.0, 1.0);
        self.model = Mat4::IDENTITY;

        let perspective = ProgramBinding::lookup(&self.shaders, PERSPECTIVE_PROGRAM);
        sys.device.use_program(perspective.program);
        sys.device
            .set_uniform(perspective.diffuse, UniformValue::Vec4(self.config.diffuse));
        sys.device.use_program(None);

        self.state = SceneState::Initialized;
        info!(
            "scene initialized: {} programs, {} mesh nodes, {width}x{height}",
            self.shaders.len(),
            self.meshes.len()
        );
        Ok(())
    }

    /// Advances the camera and issues one frame of commands.
    pub fn update(&mut self, sys: &mut Systems<'_>) -> Result<FrameStats, SceneError> {
        if !matches!(self.state, SceneState::Initialized | SceneState::Running) {
            return Err(SceneError::InvalidState {
                operation: "update",
                state: self.state,
            });
        }

        let delta = self.timer.step(sys.clock);
        self.view = self.camera.view_matrix();
        self.camera.step(delta, sys.keys.spectator_input());
        self.transforms.set_current(self.view * self.model);

        sys.device.clear(self.config.clear_color, 1.0);

        let mut stats = FrameStats {
            frame: self.last_frame.frame + 1,
            delta,
            ..FrameStats::default()
        };

        let perspective = ProgramBinding::lookup(&self.shaders, PERSPECTIVE_PROGRAM);
        sys.device.use_program(perspective.program);
        sys.device
            .set_uniform(perspective.projection, UniformValue::Mat4(self.perspective));
        sys.device.set_uniform(
            perspective.modelview,
            UniformValue::Mat4(self.transforms.current()),
        );
        self.transforms.push();
        sys.device.set_uniform(
            perspective.modelview,
            UniformValue::Mat4(self.transforms.current()),
        );
        for node in self.meshes.nodes() {
            if !node.visible {
                stats.skipped_nodes += 1;
                continue;
            }
            self.transforms.push();
            sys.device.set_uniform(
                perspective.modelview,
                UniformValue::Mat4(self.transforms.current()),
            );
            for sub_mesh in &node.sub_meshes {
                if let Some(unit) = sub_mesh.texture_unit {
                    sys.textures.bind(sys.device, unit);
                    sys.device
                        .set_uniform(perspective.textured, UniformValue::Bool(true));
                }
                sys.device.draw_indexed(
                    sub_mesh.buffers().vertex_array,
                    sub_mesh.mode,
                    sub_mesh.index_count,
                );
                stats.draw_calls += 1;
                if sub_mesh.has_texture() {
                    sys.device
                        .set_uniform(perspective.textured, UniformValue::Bool(false));
                }
            }
            self.transforms.pop();
        }
        self.transforms.pop();
        sys.device.use_program(None);

        let font = ProgramBinding::lookup(&self.shaders, FONT_PROGRAM);
        sys.device.use_program(font.program);
        sys.device
            .set_uniform(font.projection, UniformValue::Mat4(self.orthographic));
        self.transforms.push();
        let overlay = &self.config.overlay;
        sys.fonts.set_font_type(&self.config.font.family);
        sys.fonts.set_pixel_size(font.offset, overlay.pixel_size);
        sys.fonts.write(sys.device, &overlay.text, overlay.position);
        self.transforms.pop();
        sys.device.use_program(None);

        self.state = SceneState::Running;
        self.last_frame = stats;
        Ok(stats)
    }

    /// Releases every mesh and program. Repeated calls do nothing.
    pub fn destroy(&mut self, sys: &mut Systems<'_>) {
        if self.state == SceneState::Destroyed {
            return;
        }
        self.meshes.destroy(sys.device);
        self.shaders.destroy(sys.device);
        self.state = SceneState::Destroyed;
        info!("scene destroyed after {} frames", self.last_frame.frame);
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn meshes(&self) -> &MeshRegistry {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut MeshRegistry {
        &mut self.meshes
    }

    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn transforms(&self) -> &TransformStack {
        &self.transforms
    }

    /// View matrix computed at the start of the last frame.
    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn perspective(&self) -> Mat4 {
        self.perspective
    }

    pub fn orthographic(&self) -> Mat4 {
        self.orthographic
    }
}
