//! Mesh nodes, built-in shapes and the registry that owns their GPU buffers.

use std::path::Path;

use glam::{Vec2, Vec3};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::obj;
use crate::render::{DrawMode, GraphicsDevice, MeshBuffers, MeshData, Vertex, VertexLayout};

/// Surface description carried by a sub-mesh. Not used when drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub diffuse: Vec3,
    pub ambient: Vec3,
    pub emission: Vec3,
    pub specular: Vec3,
    pub diffuse_texture: Option<String>,
    pub ambient_texture: Option<String>,
    pub specular_texture: Option<String>,
    pub normal_texture: Option<String>,
    pub shininess: f32,
    pub ior: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::ZERO,
            ambient: Vec3::ZERO,
            emission: Vec3::ZERO,
            specular: Vec3::ZERO,
            diffuse_texture: None,
            ambient_texture: None,
            specular_texture: None,
            normal_texture: None,
            shininess: 1.0,
            ior: 1.0,
        }
    }
}

/// Per-sub-mesh render switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub texture: bool,
    pub light: bool,
    pub blend: bool,
    pub cull: bool,
}

/// One drawable unit. Owns its buffers until [`SubMesh::release`].
#[derive(Debug, PartialEq)]
pub struct SubMesh {
    buffers: MeshBuffers,
    pub mode: DrawMode,
    pub index_count: u32,
    pub texture_unit: Option<u32>,
    pub material: Material,
    pub options: RenderOptions,
}

impl SubMesh {
    /// Uploads `data` and wraps the resulting buffers.
    pub fn upload(device: &mut dyn GraphicsDevice, data: &MeshData, texture_unit: Option<u32>) -> Self {
        let buffers = device.create_mesh(data);
        Self {
            buffers,
            mode: data.mode,
            index_count: data.indices.len() as u32,
            texture_unit,
            material: Material::default(),
            options: RenderOptions {
                texture: texture_unit.is_some(),
                ..RenderOptions::default()
            },
        }
    }

    pub fn has_texture(&self) -> bool {
        self.texture_unit.is_some()
    }

    pub fn buffers(&self) -> MeshBuffers {
        self.buffers
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.delete_mesh(self.buffers);
    }
}

/// A named, independently visible group of sub-meshes.
#[derive(Debug, PartialEq)]
pub struct MeshNode {
    pub name: String,
    pub visible: bool,
    pub priority: u32,
    pub sub_meshes: Vec<SubMesh>,
}

impl MeshNode {
    pub fn new(name: impl Into<String>, visible: bool) -> Self {
        Self {
            name: name.into(),
            visible,
            priority: 0,
            sub_meshes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub extent: f32,
    pub step: f32,
    pub height: f32,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            extent: 30.0,
            step: 1.0,
            height: -0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyboxParams {
    pub scale: f32,
    /// Unit of the first face; the remaining faces follow consecutively.
    pub first_unit: u32,
}

impl Default for SkyboxParams {
    fn default() -> Self {
        Self {
            scale: 250.0,
            first_unit: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubeParams {
    pub half_size: f32,
}

impl Default for CubeParams {
    fn default() -> Self {
        Self { half_size: 0.5 }
    }
}

/// Parameters of the three built-in shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    pub grid: GridParams,
    pub skybox: SkyboxParams,
    pub cube: CubeParams,
}

/// Ground grid: two segments per line position, one along each axis.
pub fn grid_mesh(params: GridParams) -> MeshData {
    let GridParams {
        extent,
        step,
        height,
    } = params;
    let step = if step > 0.0 { step } else { 1.0 };
    let start = (-extent).trunc();
    let lines = ((extent - start) / step).floor().max(-1.0) as i64 + 1;

    let mut vertices = Vec::with_capacity(lines.max(0) as usize * 4);
    for i in 0..lines {
        let line = (start + i as f32 * step).trunc();
        vertices.push(Vertex::position_only(Vec3::new(line, height, extent)));
        vertices.push(Vertex::position_only(Vec3::new(line, height, -extent)));
        vertices.push(Vertex::position_only(Vec3::new(extent, height, line)));
        vertices.push(Vertex::position_only(Vec3::new(-extent, height, line)));
    }
    let indices = (0..vertices.len() as u32).collect();

    MeshData {
        vertices,
        indices,
        layout: VertexLayout::Position,
        mode: DrawMode::Lines,
    }
}

/// Corner signs and texcoords of the six inward-facing skybox quads in the
/// order front, left, back, right, top, bottom.
const SKYBOX_FACES: [[([f32; 3], [f32; 2]); 4]; 6] = [
    [
        ([-1.0, -1.0, -1.0], [0.0, 0.0]),
        ([1.0, -1.0, -1.0], [1.0, 0.0]),
        ([1.0, 1.0, -1.0], [1.0, 1.0]),
        ([-1.0, 1.0, -1.0], [0.0, 1.0]),
    ],
    [
        ([1.0, -1.0, -1.0], [0.0, 0.0]),
        ([1.0, -1.0, 1.0], [1.0, 0.0]),
        ([1.0, 1.0, 1.0], [1.0, 1.0]),
        ([1.0, 1.0, -1.0], [0.0, 1.0]),
    ],
    [
        ([1.0, -1.0, 1.0], [0.0, 0.0]),
        ([-1.0, -1.0, 1.0], [1.0, 0.0]),
        ([-1.0, 1.0, 1.0], [1.0, 1.0]),
        ([1.0, 1.0, 1.0], [0.0, 1.0]),
    ],
    [
        ([-1.0, -1.0, 1.0], [0.0, 0.0]),
        ([-1.0, -1.0, -1.0], [1.0, 0.0]),
        ([-1.0, 1.0, -1.0], [1.0, 1.0]),
        ([-1.0, 1.0, 1.0], [0.0, 1.0]),
    ],
    [
        ([1.0, 1.0, -1.0], [0.0, 1.0]),
        ([1.0, 1.0, 1.0], [0.0, 0.0]),
        ([-1.0, 1.0, 1.0], [1.0, 0.0]),
        ([-1.0, 1.0, -1.0], [1.0, 1.0]),
    ],
    [
        ([1.0, -1.0, 1.0], [0.0, 1.0]),
        ([1.0, -1.0, -1.0], [0.0, 0.0]),
        ([-1.0, -1.0, -1.0], [1.0, 0.0]),
        ([-1.0, -1.0, 1.0], [1.0, 1.0]),
    ],
];

pub fn skybox_faces(scale: f32) -> [MeshData; 6] {
    SKYBOX_FACES.map(|face| MeshData {
        vertices: face
            .iter()
            .map(|(corner, uv)| Vertex::new(Vec3::from_array(*corner) * scale, Vec2::from_array(*uv)))
            .collect(),
        indices: vec![0, 1, 2, 3],
        layout: VertexLayout::PositionTexcoord,
        mode: DrawMode::TriangleFan,
    })
}

const CUBE_VERTICES: [([f32; 3], [f32; 2]); 12] = [
    ([-1.0, -1.0, -1.0], [0.0, 1.0]),
    ([1.0, -1.0, -1.0], [1.0, 1.0]),
    ([1.0, 1.0, -1.0], [1.0, 0.0]),
    ([-1.0, 1.0, -1.0], [0.0, 0.0]),
    ([1.0, -1.0, 1.0], [0.0, 1.0]),
    ([1.0, 1.0, 1.0], [0.0, 0.0]),
    ([-1.0, 1.0, 1.0], [1.0, 0.0]),
    ([-1.0, -1.0, 1.0], [1.0, 1.0]),
    ([-1.0, 1.0, 1.0], [0.0, 1.0]),
    ([-1.0, 1.0, -1.0], [1.0, 1.0]),
    ([1.0, -1.0, 1.0], [1.0, 0.0]),
    ([1.0, -1.0, -1.0], [0.0, 0.0]),
];

#[rustfmt::skip]
const CUBE_INDICES: [u32; 36] = [
    0, 2, 1,
    0, 3, 2,
    1, 5, 4,
    1, 2, 5,
    4, 6, 7,
    4, 5, 6,
    7, 3, 0,
    7, 6, 3,
    9, 5, 2,
    9, 8, 5,
    0, 11, 10,
    0, 10, 7,
];

pub fn cube_mesh(half_size: f32) -> MeshData {
    MeshData {
        vertices: CUBE_VERTICES
            .iter()
            .map(|(corner, uv)| {
                Vertex::new(Vec3::from_array(*corner) * half_size, Vec2::from_array(*uv))
            })
            .collect(),
        indices: CUBE_INDICES.to_vec(),
        layout: VertexLayout::PositionTexcoord,
        mode: DrawMode::Triangles,
    }
}

/// Ordered list of mesh nodes drawn every frame.
#[derive(Debug, Default)]
pub struct MeshRegistry {
    nodes: Vec<MeshNode>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the grid, skybox and cube nodes.
    pub fn register_builtin_shapes(&mut self, device: &mut dyn GraphicsDevice, shapes: &ShapeConfig) {
        let mut grid = MeshNode::new("grid", true);
        grid.sub_meshes
            .push(SubMesh::upload(device, &grid_mesh(shapes.grid), None));
        self.nodes.push(grid);

        let mut skybox = MeshNode::new("skybox", true);
        for (unit, face) in (shapes.skybox.first_unit..).zip(skybox_faces(shapes.skybox.scale).iter()) {
            skybox.sub_meshes.push(SubMesh::upload(device, face, Some(unit)));
        }
        self.nodes.push(skybox);

        let mut cube = MeshNode::new("cube", true);
        cube.sub_meshes
            .push(SubMesh::upload(device, &cube_mesh(shapes.cube.half_size), None));
        self.nodes.push(cube);

        debug!("registered built-in shapes; {} mesh nodes", self.nodes.len());
    }

    /// Loads an OBJ file as a new node named after the file.
    ///
    /// Load and parse failures are logged. The node is appended regardless
    /// and may hold no sub-meshes.
    pub fn load_external_model(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &Path,
        search_path: Option<&Path>,
        visible: bool,
        offset: f32,
    ) -> &MeshNode {
        let mut node = MeshNode::new(path.display().to_string(), visible);
        match obj::load_obj(path, search_path) {
            Ok(model) => {
                if !model.errors.is_empty() {
                    error!(
                        "Scene error: problems loading OBJ file {}: {}",
                        path.display(),
                        model.errors.join("; ")
                    );
                }
                for shape in &model.shapes {
                    let data = MeshData {
                        vertices: shape
                            .positions
                            .chunks_exact(3)
                            .map(|p| Vertex::position_only(Vec3::from_slice(p) - Vec3::splat(offset)))
                            .collect(),
                        indices: shape.indices.clone(),
                        layout: VertexLayout::Position,
                        mode: DrawMode::Triangles,
                    };
                    node.sub_meshes.push(SubMesh::upload(device, &data, None));
                }
            }
            Err(err) => error!("Scene error: unable to load OBJ file: {err:#}"),
        }
        info!(
            "loaded model {} with {} sub-meshes",
            node.name,
            node.sub_meshes.len()
        );
        self.nodes.push(node);
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn nodes(&self) -> &[MeshNode] {
        &self.nodes
    }

    pub fn get(&self, name: &str) -> Option<&MeshNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MeshNode> {
        self.nodes.iter_mut().find(|node| node.name == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Releases every sub-mesh and empties the registry.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for node in self.nodes.drain(..) {
            debug!("releasing mesh node {}", node.name);
            for sub_mesh in node.sub_meshes {
                sub_mesh.release(device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingDevice;
    use std::io::Write;

    #[test]
    fn grid_has_four_vertices_per_line() {
        let grid = grid_mesh(GridParams::default());
        assert_eq!(grid.vertices.len(), 244);
        assert_eq!(grid.indices.len(), 244);
        assert_eq!(grid.indices[243], 243);
        assert_eq!(grid.mode, DrawMode::Lines);
        assert_eq!(grid.vertices[0].position, [-30.0, -0.6, 30.0]);
        assert_eq!(grid.vertices[3].position, [-30.0, -0.6, -30.0]);
        assert_eq!(grid.vertices[243].position, [-30.0, -0.6, 30.0]);
    }

    #[test]
    fn skybox_faces_are_scaled_fans() {
        let faces = skybox_faces(250.0);
        assert_eq!(faces[0].vertices[0].position, [-250.0, -250.0, -250.0]);
        assert_eq!(faces[4].vertices[0].texcoord, [0.0, 1.0]);
        assert!(faces
            .iter()
            .all(|face| face.mode == DrawMode::TriangleFan && face.indices == [0, 1, 2, 3]));
    }

    #[test]
    fn cube_indices_stay_in_range() {
        let cube = cube_mesh(0.5);
        assert_eq!(cube.vertices.len(), 12);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| i < 12));
        assert_eq!(cube.vertices[1].position, [0.5, -0.5, -0.5]);
    }

    #[test]
    fn builtin_shapes_register_in_order() {
        let mut device = RecordingDevice::new();
        let mut registry = MeshRegistry::new();
        registry.register_builtin_shapes(&mut device, &ShapeConfig::default());

        let names: Vec<_> = registry.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["grid", "skybox", "cube"]);
        assert!(registry.nodes().iter().all(|n| n.visible));

        let skybox = registry.get("skybox").unwrap();
        let units: Vec<_> = skybox.sub_meshes.iter().map(|s| s.texture_unit).collect();
        assert_eq!(units, (0..6u32).map(Some).collect::<Vec<_>>());
        assert!(!registry.get("cube").unwrap().sub_meshes[0].has_texture());
        assert_eq!(device.live_meshes(), 8);
    }

    #[test]
    fn missing_model_still_adds_a_node() {
        let mut device = RecordingDevice::new();
        let mut registry = MeshRegistry::new();
        let node = registry.load_external_model(
            &mut device,
            Path::new("/nonexistent/teapot.obj"),
            None,
            true,
            0.0,
        );
        assert!(node.sub_meshes.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn models_are_recentred_by_the_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "v 1 1 1\nv 2 1 1\nv 1 2 1\nf 1 2 3").unwrap();

        let mut device = RecordingDevice::new();
        let mut registry = MeshRegistry::new();
        let node = registry.load_external_model(&mut device, &path, None, false, 1.0);
        assert!(!node.visible);
        assert_eq!(node.sub_meshes.len(), 1);
        let sub_mesh = &node.sub_meshes[0];
        assert_eq!(sub_mesh.index_count, 3);
        assert_eq!(sub_mesh.mode, DrawMode::Triangles);
        let vertex_array = sub_mesh.buffers().vertex_array;
        assert_eq!(
            device.mesh_layout(vertex_array),
            Some((VertexLayout::Position, DrawMode::Triangles, 3))
        );
    }

    #[test]
    fn parse_errors_keep_the_good_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.obj");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 oops 0\nf 1 2 3").unwrap();

        let mut device = RecordingDevice::new();
        let mut registry = MeshRegistry::new();
        registry.register_builtin_shapes(&mut device, &ShapeConfig::default());
        let before = registry.len();

        let node = registry.load_external_model(&mut device, &path, None, true, 0.0);
        assert_eq!(node.sub_meshes.len(), 1);
        assert_eq!(node.sub_meshes[0].index_count, 3);
        assert_eq!(registry.len(), before + 1);
        assert_eq!(device.live_meshes(), 9);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut device = RecordingDevice::new();
        let mut registry = MeshRegistry::new();
        registry.register_builtin_shapes(&mut device, &ShapeConfig::default());
        registry.get_mut("grid").unwrap().visible = false;
        registry.destroy(&mut device);
        assert!(registry.is_empty());
        assert_eq!(device.live_meshes(), 0);
    }
}
