use std::collections::HashMap;

use glam::Vec4;
use log::{debug, trace};

use super::common::{
    BufferId, DrawMode, MeshBuffers, MeshData, ProgramId, ShaderId, ShaderStage, TextureId,
    TextureImage, UniformLocation, UniformValue, Vertex, VertexArrayId, VertexLayout,
};
use super::reflect::{self, CompiledStage, LinkedProgram};
use super::{GpuError, GraphicsDevice};

/// Command issued against a [`RecordingDevice`] during a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Viewport {
        width: u32,
        height: u32,
    },
    Clear {
        color: Vec4,
        depth: f32,
    },
    UseProgram(Option<ProgramId>),
    SetUniform {
        program: ProgramId,
        location: UniformLocation,
        value: UniformValue,
    },
    BindTexture(u32),
    Draw {
        program: ProgramId,
        vertex_array: VertexArrayId,
        mode: DrawMode,
        count: u32,
        texture_unit: Option<u32>,
    },
    DrawTransient {
        program: ProgramId,
        mode: DrawMode,
        vertices: usize,
        indices: usize,
        texture_unit: Option<u32>,
    },
}

#[derive(Debug)]
struct RecordedMesh {
    buffers: MeshBuffers,
    layout: VertexLayout,
    mode: DrawMode,
    index_count: u32,
}

#[derive(Debug)]
struct RecordedProgram {
    linked: LinkedProgram,
    block: Vec<u8>,
}

/// Headless [`GraphicsDevice`] that validates shaders the same way the wgpu
/// backend does and records every command.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_id: u32,
    shaders: HashMap<ShaderId, CompiledStage>,
    programs: HashMap<ProgramId, RecordedProgram>,
    meshes: HashMap<VertexArrayId, RecordedMesh>,
    textures: HashMap<u32, (TextureId, u32, u32)>,
    bound_program: Option<ProgramId>,
    bound_texture: Option<u32>,
    viewport: (u32, u32),
    commands: Vec<Command>,
    frames: Vec<Vec<Command>>,
    dropped_draws: usize,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Commands issued since the last [`present`](GraphicsDevice::present).
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Command lists of every presented frame.
    pub fn frames(&self) -> &[Vec<Command>] {
        &self.frames
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn texture_units(&self) -> Vec<u32> {
        let mut units: Vec<u32> = self.textures.keys().copied().collect();
        units.sort_unstable();
        units
    }

    pub fn texture_size(&self, unit: u32) -> Option<(u32, u32)> {
        self.textures.get(&unit).map(|(_, w, h)| (*w, *h))
    }

    pub fn mesh_layout(&self, vertex_array: VertexArrayId) -> Option<(VertexLayout, DrawMode, u32)> {
        self.meshes
            .get(&vertex_array)
            .map(|mesh| (mesh.layout, mesh.mode, mesh.index_count))
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Draws issued with no program bound.
    pub fn dropped_draws(&self) -> usize {
        self.dropped_draws
    }

    /// Current bytes of `program`'s uniform block at `location`.
    pub fn uniform_bytes(&self, program: ProgramId, location: UniformLocation) -> Option<&[u8]> {
        let recorded = self.programs.get(&program)?;
        let member = recorded.linked.uniforms.member_at(location)?;
        let start = member.offset as usize;
        let end = (start + member.size as usize).min(recorded.block.len());
        recorded.block.get(start..end)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError> {
        let compiled = reflect::compile_stage(stage, source)?;
        let id = ShaderId(self.allocate());
        debug!("compiled {stage} shader {id} (entry `{}`)", compiled.entry_point);
        self.shaders.insert(id, compiled);
        Ok(id)
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        attributes: &[(u32, &str)],
    ) -> Result<ProgramId, GpuError> {
        let vs = self.shaders.get(&vertex).ok_or(GpuError::UnknownHandle {
            kind: "shader",
            id: vertex.0,
        })?;
        let fs = self.shaders.get(&fragment).ok_or(GpuError::UnknownHandle {
            kind: "shader",
            id: fragment.0,
        })?;
        let linked = reflect::link_stages(vs, fs, attributes)?;
        let block = vec![0; linked.uniforms.size as usize];
        let id = ProgramId(self.allocate());
        self.programs.insert(id, RecordedProgram { linked, block });
        Ok(id)
    }

    fn active_uniforms(&self, program: ProgramId) -> HashMap<String, UniformLocation> {
        self.programs
            .get(&program)
            .map(|p| p.linked.uniforms.locations())
            .unwrap_or_default()
    }

    fn active_attributes(&self, program: ProgramId) -> HashMap<String, u32> {
        self.programs
            .get(&program)
            .map(|p| p.linked.attributes.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.programs.remove(&program);
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshBuffers {
        let buffers = MeshBuffers {
            vertex_array: VertexArrayId(self.allocate()),
            vertex_buffer: BufferId(self.allocate()),
            index_buffer: BufferId(self.allocate()),
        };
        self.meshes.insert(
            buffers.vertex_array,
            RecordedMesh {
                buffers,
                layout: data.layout,
                mode: data.mode,
                index_count: data.indices.len() as u32,
            },
        );
        buffers
    }

    fn delete_mesh(&mut self, buffers: MeshBuffers) {
        match self.meshes.remove(&buffers.vertex_array) {
            Some(mesh) => debug_assert_eq!(mesh.buffers, buffers),
            None => debug!("delete of unknown vertex array {}", buffers.vertex_array),
        }
    }

    fn create_texture(&mut self, unit: u32, image: &TextureImage) -> Result<TextureId, GpuError> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.width == 0 || image.height == 0 || image.pixels.len() != expected {
            return Err(GpuError::Texture(format!(
                "{}x{} image with {} bytes",
                image.width,
                image.height,
                image.pixels.len()
            )));
        }
        let id = TextureId(self.allocate());
        self.textures.insert(unit, (id, image.width, image.height));
        Ok(id)
    }

    fn bind_texture(&mut self, unit: u32) {
        self.bound_texture = Some(unit);
        self.commands.push(Command::BindTexture(unit));
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(Command::Viewport { width, height });
    }

    fn clear(&mut self, color: Vec4, depth: f32) {
        self.commands.push(Command::Clear { color, depth });
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.bound_program = program.filter(|id| self.programs.contains_key(id));
        self.commands.push(Command::UseProgram(self.bound_program));
    }

    fn set_uniform(&mut self, location: Option<UniformLocation>, value: UniformValue) {
        let (Some(location), Some(program)) = (location, self.bound_program) else {
            return;
        };
        let Some(recorded) = self.programs.get_mut(&program) else {
            return;
        };
        if let Some(member) = recorded.linked.uniforms.member_at(location) {
            let bytes = value.to_bytes();
            let len = bytes.len().min(member.size as usize);
            let start = member.offset as usize;
            recorded.block[start..start + len].copy_from_slice(&bytes[..len]);
        }
        self.commands.push(Command::SetUniform {
            program,
            location,
            value,
        });
    }

    fn draw_indexed(&mut self, vertex_array: VertexArrayId, mode: DrawMode, count: u32) {
        let Some(program) = self.bound_program else {
            trace!("draw of {vertex_array} dropped: no program bound");
            self.dropped_draws += 1;
            return;
        };
        self.commands.push(Command::Draw {
            program,
            vertex_array,
            mode,
            count,
            texture_unit: self.bound_texture,
        });
    }

    fn draw_transient(&mut self, mode: DrawMode, vertices: &[Vertex], indices: &[u32]) {
        let Some(program) = self.bound_program else {
            self.dropped_draws += 1;
            return;
        };
        self.commands.push(Command::DrawTransient {
            program,
            mode,
            vertices: vertices.len(),
            indices: indices.len(),
            texture_unit: self.bound_texture,
        });
    }

    fn present(&mut self) -> Result<(), GpuError> {
        let frame = std::mem::take(&mut self.commands);
        self.frames.push(frame);
        self.bound_texture = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::common::Vertex;
    use glam::Vec3;

    fn triangle() -> MeshData {
        MeshData {
            vertices: vec![
                Vertex::position_only(Vec3::ZERO),
                Vertex::position_only(Vec3::X),
                Vertex::position_only(Vec3::Y),
            ],
            indices: vec![0, 1, 2],
            layout: VertexLayout::Position,
            mode: DrawMode::Triangles,
        }
    }

    #[test]
    fn draws_without_program_are_dropped() {
        let mut device = RecordingDevice::new();
        let mesh = device.create_mesh(&triangle());
        device.draw_indexed(mesh.vertex_array, DrawMode::Triangles, 3);
        assert_eq!(device.dropped_draws(), 1);
        assert!(device.commands().is_empty());
    }

    #[test]
    fn meshes_are_released_once() {
        let mut device = RecordingDevice::new();
        let mesh = device.create_mesh(&triangle());
        assert_eq!(device.live_meshes(), 1);
        assert_eq!(
            device.mesh_layout(mesh.vertex_array),
            Some((VertexLayout::Position, DrawMode::Triangles, 3))
        );
        device.delete_mesh(mesh);
        assert_eq!(device.live_meshes(), 0);
    }

    #[test]
    fn rejects_malformed_textures() {
        let mut device = RecordingDevice::new();
        let bad = TextureImage {
            width: 2,
            height: 2,
            pixels: vec![0; 3],
        };
        assert!(device.create_texture(0, &bad).is_err());
        assert!(device.create_texture(3, &TextureImage::white()).is_ok());
        assert_eq!(device.texture_units(), vec![3]);
    }

    #[test]
    fn present_rolls_commands_into_frames() {
        let mut device = RecordingDevice::new();
        device.clear(Vec4::ONE, 1.0);
        device.present().unwrap();
        assert!(device.commands().is_empty());
        assert_eq!(device.frames().len(), 1);
        assert_eq!(device.frames()[0].len(), 1);
    }
}
