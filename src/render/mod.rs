//! Immediate-style graphics layer the scene draws through.
//!
//! [`GraphicsDevice`] models a small GL-like API: compiled stages are linked
//! into programs, uniforms are addressed by location and keep their values
//! per program, and draws are issued one at a time against the bound
//! program. [`RecordingDevice`] runs headless and records every command;
//! [`WgpuDevice`] replays the same commands through wgpu.

pub mod common;
pub mod native;
pub mod recording;
pub mod reflect;

use std::collections::HashMap;

use glam::Vec4;
use thiserror::Error;

pub use common::{
    triangulate_fan, BufferId, DrawMode, MeshBuffers, MeshData, ProgramId, ShaderId, ShaderStage,
    TextureId, TextureImage, UniformLocation, UniformValue, Vertex, VertexArrayId, VertexLayout,
    ATTRIBUTE_BINDINGS, POSITION_ATTRIBUTE, TEXCOORD_ATTRIBUTE,
};
pub use native::WgpuDevice;
pub use recording::{Command, RecordingDevice};

/// Errors reported by a [`GraphicsDevice`].
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link: {0}")]
    Link(String),
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("invalid texture data: {0}")]
    Texture(String),
    #[error("surface error: {0}")]
    Surface(String),
}

/// Low-level graphics API consumed by the scene.
pub trait GraphicsDevice {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError>;

    /// Links two compiled stages, binding the named attributes to fixed slots.
    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        attributes: &[(u32, &str)],
    ) -> Result<ProgramId, GpuError>;

    fn active_uniforms(&self, program: ProgramId) -> HashMap<String, UniformLocation>;

    fn active_attributes(&self, program: ProgramId) -> HashMap<String, u32>;

    fn delete_shader(&mut self, shader: ShaderId);

    fn delete_program(&mut self, program: ProgramId);

    fn create_mesh(&mut self, data: &MeshData) -> MeshBuffers;

    fn delete_mesh(&mut self, buffers: MeshBuffers);

    /// Uploads `image` to `unit`, replacing whatever the unit held.
    fn create_texture(&mut self, unit: u32, image: &TextureImage) -> Result<TextureId, GpuError>;

    fn bind_texture(&mut self, unit: u32);

    fn set_viewport(&mut self, width: u32, height: u32);

    fn clear(&mut self, color: Vec4, depth: f32);

    /// Binds `program`, or unbinds with `None`.
    fn use_program(&mut self, program: Option<ProgramId>);

    /// Writes into the bound program's uniform block. `None` locations are
    /// ignored.
    fn set_uniform(&mut self, location: Option<UniformLocation>, value: UniformValue);

    fn draw_indexed(&mut self, vertex_array: VertexArrayId, mode: DrawMode, count: u32);

    /// Draws geometry that only lives for the current frame.
    fn draw_transient(&mut self, mode: DrawMode, vertices: &[Vertex], indices: &[u32]);

    /// Finishes the frame.
    fn present(&mut self) -> Result<(), GpuError>;
}
