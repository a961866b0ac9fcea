use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Attribute slot every program binds `position` to.
pub const POSITION_ATTRIBUTE: u32 = 0;
/// Attribute slot every program binds `texcoord` to.
pub const TEXCOORD_ATTRIBUTE: u32 = 1;

/// Fixed attribute bindings applied before linking.
pub const ATTRIBUTE_BINDINGS: &[(u32, &str)] = &[
    (POSITION_ATTRIBUTE, "position"),
    (TEXCOORD_ATTRIBUTE, "texcoord"),
];

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

gpu_handle!(
    /// Compiled shader stage.
    ShaderId
);
gpu_handle!(
    /// Linked program.
    ProgramId
);
gpu_handle!(
    /// Vertex array object tying a vertex and index buffer together.
    VertexArrayId
);
gpu_handle!(
    /// GPU buffer.
    BufferId
);
gpu_handle!(
    /// Texture resident on a texture unit.
    TextureId
);

/// Location of a uniform: the member's byte offset inside the program's
/// uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniformLocation(pub u32);

/// Pipeline stage a shader source is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Primitive assembly used by an indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrawMode {
    Lines,
    Triangles,
    TriangleFan,
}

impl DrawMode {
    /// Number of indices consumed once a fan has been expanded to a list.
    pub fn expanded_index_count(self, count: u32) -> u32 {
        match self {
            DrawMode::TriangleFan => count.saturating_sub(2) * 3,
            DrawMode::Lines | DrawMode::Triangles => count,
        }
    }
}

/// Expands a triangle fan into an equivalent triangle list.
pub fn triangulate_fan(indices: &[u32]) -> Vec<u32> {
    let mut list = Vec::with_capacity(indices.len().saturating_sub(2) * 3);
    if indices.len() < 3 {
        return list;
    }
    for i in 1..(indices.len() - 1) {
        list.extend_from_slice(&[indices[0], indices[i], indices[i + 1]]);
    }
    list
}

/// Attributes enabled on a vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexLayout {
    Position,
    PositionTexcoord,
}

/// Interleaved vertex as stored in every vertex buffer.
///
/// Position-only meshes keep a zeroed texcoord so all programs share one
/// buffer layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Default)]
pub struct Vertex {
    pub position: [f32; 3],
    pub texcoord: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    pub fn new(position: Vec3, texcoord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            texcoord: texcoord.to_array(),
        }
    }

    pub fn position_only(position: Vec3) -> Self {
        Self::new(position, Vec2::ZERO)
    }
}

/// CPU geometry handed to [`GraphicsDevice::create_mesh`](super::GraphicsDevice::create_mesh).
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub layout: VertexLayout,
    pub mode: DrawMode,
}

/// Handles created for one uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshBuffers {
    pub vertex_array: VertexArrayId,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
}

/// Value written to a uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec4(Vec4),
    Vec2(Vec2),
    Float(f32),
    Int(i32),
    Bool(bool),
}

impl UniformValue {
    /// Bytes as laid out in a WGSL uniform block. Booleans are `u32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Vec2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Float(v) => v.to_ne_bytes().to_vec(),
            UniformValue::Int(v) => v.to_ne_bytes().to_vec(),
            UniformValue::Bool(v) => u32::from(*v).to_ne_bytes().to_vec(),
        }
    }
}

/// RGBA8 pixels ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    /// A 1x1 opaque white image.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        }
    }
}
