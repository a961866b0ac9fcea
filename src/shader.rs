use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use thiserror::Error;

use crate::render::{
    GpuError, GraphicsDevice, ProgramId, ShaderId, ShaderStage, UniformLocation,
    ATTRIBUTE_BINDINGS,
};

/// How far building a program got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStatus {
    Unbuilt,
    CompileFailed,
    LinkFailed,
    Linked,
}

/// A named program with its reflected uniform and attribute tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderProgram {
    pub name: String,
    pub program: Option<ProgramId>,
    pub status: ProgramStatus,
    pub uniforms: HashMap<String, UniformLocation>,
    pub attributes: HashMap<String, u32>,
}

impl ShaderProgram {
    fn unbuilt(name: &str) -> Self {
        Self {
            name: name.to_string(),
            program: None,
            status: ProgramStatus::Unbuilt,
            uniforms: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Location of `name`, or `None` when the program has no such uniform.
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    pub fn is_linked(&self) -> bool {
        self.status == ProgramStatus::Linked
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("program `{name}` has no {stage} shader path")]
    EmptyPath { name: String, stage: ShaderStage },
    #[error("failed to read {stage} shader {path}: {source}")]
    Source {
        stage: ShaderStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("program `{name}`: {source}")]
    Compile {
        name: String,
        #[source]
        source: GpuError,
    },
    #[error("program `{name}`: {source}")]
    Link {
        name: String,
        #[source]
        source: GpuError,
    },
}

impl ShaderError {
    fn status(&self) -> ProgramStatus {
        match self {
            ShaderError::Link { .. } => ProgramStatus::LinkFailed,
            _ => ProgramStatus::CompileFailed,
        }
    }
}

/// Programs by name, built once at startup.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    programs: BTreeMap<String, ShaderProgram>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and links a vertex/fragment pair under `name`.
    ///
    /// The entry is kept on failure with the status reached, so lookups of
    /// its uniforms simply come back empty.
    pub fn load_pair(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<&ShaderProgram, ShaderError> {
        self.programs
            .insert(name.to_string(), ShaderProgram::unbuilt(name));

        let built = build_program(device, name, vertex_path, fragment_path);
        let entry = self
            .programs
            .entry(name.to_string())
            .or_insert_with(|| ShaderProgram::unbuilt(name));
        match built {
            Ok(program) => {
                entry.uniforms = device.active_uniforms(program);
                entry.attributes = device.active_attributes(program);
                entry.program = Some(program);
                entry.status = ProgramStatus::Linked;
                info!(
                    "linked program `{name}` ({} uniforms, {} attributes)",
                    entry.uniforms.len(),
                    entry.attributes.len()
                );
                Ok(entry)
            }
            Err(err) => {
                error!("Shader error: {err}");
                entry.status = err.status();
                Err(err)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ShaderProgram> {
        self.programs.get(name)
    }

    /// Location of uniform `uniform` in program `program`.
    pub fn uniform(&self, program: &str, uniform: &str) -> Option<UniformLocation> {
        self.programs.get(program)?.uniform(uniform)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Deletes every linked program and clears the registry.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for (name, program) in std::mem::take(&mut self.programs) {
            if let Some(id) = program.program {
                debug!("deleting program `{name}` ({id})");
                device.delete_program(id);
            }
        }
    }
}

fn read_source(name: &str, stage: ShaderStage, path: &Path) -> Result<String, ShaderError> {
    if path.as_os_str().is_empty() {
        return Err(ShaderError::EmptyPath {
            name: name.to_string(),
            stage,
        });
    }
    fs::read_to_string(path).map_err(|source| ShaderError::Source {
        stage,
        path: path.to_path_buf(),
        source,
    })
}

fn compile(
    device: &mut dyn GraphicsDevice,
    name: &str,
    stage: ShaderStage,
    source: &str,
) -> Result<ShaderId, ShaderError> {
    let shader = device
        .compile_shader(stage, source)
        .map_err(|source| ShaderError::Compile {
            name: name.to_string(),
            source,
        })?;
    debug!("compiled {stage} shader for `{name}`");
    Ok(shader)
}

fn build_program(
    device: &mut dyn GraphicsDevice,
    name: &str,
    vertex_path: &Path,
    fragment_path: &Path,
) -> Result<ProgramId, ShaderError> {
    let vertex_source = read_source(name, ShaderStage::Vertex, vertex_path)?;
    let fragment_source = read_source(name, ShaderStage::Fragment, fragment_path)?;

    let vertex = compile(device, name, ShaderStage::Vertex, &vertex_source)?;
    let fragment = match compile(device, name, ShaderStage::Fragment, &fragment_source) {
        Ok(fragment) => fragment,
        Err(err) => {
            device.delete_shader(vertex);
            return Err(err);
        }
    };

    let linked = device.link_program(vertex, fragment, ATTRIBUTE_BINDINGS);
    device.delete_shader(vertex);
    device.delete_shader(fragment);
    linked.map_err(|source| ShaderError::Link {
        name: name.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingDevice;

    const VERTEX: &str = "
struct Uniforms {
    projection: mat4x4<f32>,
    modelview: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return uniforms.projection * uniforms.modelview * vec4<f32>(position, 1.0);
}
";

    const FRAGMENT: &str = "
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.5, 0.0, 1.0);
}
";

    fn write_pair(dir: &Path, vertex: &str, fragment: &str) -> (PathBuf, PathBuf) {
        let vs = dir.join("pair.vert.wgsl");
        let fs = dir.join("pair.frag.wgsl");
        std::fs::write(&vs, vertex).unwrap();
        std::fs::write(&fs, fragment).unwrap();
        (vs, fs)
    }

    #[test]
    fn linked_programs_expose_uniform_locations() {
        let dir = tempfile::tempdir().unwrap();
        let (vs, fs) = write_pair(dir.path(), VERTEX, FRAGMENT);
        let mut device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();

        let program = registry.load_pair(&mut device, "perspective", &vs, &fs).unwrap();
        assert!(program.is_linked());
        assert_eq!(program.uniform("modelview"), Some(UniformLocation(64)));
        assert_eq!(program.attributes.get("position"), Some(&0));
        assert_eq!(registry.uniform("perspective", "missing"), None);
        assert_eq!(device.live_shaders(), 0);
        assert_eq!(device.live_programs(), 1);
    }

    #[test]
    fn compile_failures_keep_a_partial_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (vs, fs) = write_pair(dir.path(), VERTEX, "@fragment fn broken( {");
        let mut device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();

        let err = registry.load_pair(&mut device, "font", &vs, &fs).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { .. }));
        let entry = registry.get("font").unwrap();
        assert_eq!(entry.status, ProgramStatus::CompileFailed);
        assert!(entry.program.is_none());
        assert_eq!(device.live_shaders(), 0);
    }

    #[test]
    fn missing_sources_are_reported() {
        let mut device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let err = registry
            .load_pair(&mut device, "font", Path::new(""), Path::new("font.frag.wgsl"))
            .unwrap_err();
        assert!(matches!(err, ShaderError::EmptyPath { .. }));
        let err = registry
            .load_pair(
                &mut device,
                "font",
                Path::new("/nonexistent/font.vert.wgsl"),
                Path::new("/nonexistent/font.frag.wgsl"),
            )
            .unwrap_err();
        assert!(matches!(err, ShaderError::Source { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn link_failures_leave_no_program() {
        let dir = tempfile::tempdir().unwrap();
        let swapped = VERTEX.replace("@location(0) position", "@location(1) position");
        let (vs, fs) = write_pair(dir.path(), &swapped, FRAGMENT);
        let mut device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();

        let err = registry.load_pair(&mut device, "perspective", &vs, &fs).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
        assert_eq!(
            registry.get("perspective").unwrap().status,
            ProgramStatus::LinkFailed
        );
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn destroy_deletes_programs() {
        let dir = tempfile::tempdir().unwrap();
        let (vs, fs) = write_pair(dir.path(), VERTEX, FRAGMENT);
        let mut device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        registry.load_pair(&mut device, "perspective", &vs, &fs).unwrap();
        registry.load_pair(&mut device, "font", &vs, &fs).unwrap();
        registry.destroy(&mut device);
        assert!(registry.is_empty());
        assert_eq!(device.live_programs(), 0);
    }
}
