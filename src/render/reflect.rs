use std::collections::{BTreeMap, BTreeSet, HashMap};

use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::common::{ShaderStage, UniformLocation};
use super::GpuError;

/// Uniform block group/binding every program reads its uniforms from.
pub const UNIFORM_GROUP: u32 = 0;
pub const UNIFORM_BINDING: u32 = 0;

/// A parsed and validated shader stage.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub source: String,
    /// Vertex inputs by name (vertex stage only).
    pub inputs: HashMap<String, u32>,
    /// Locations written by a vertex stage or read by a fragment stage.
    pub varyings: BTreeSet<u32>,
    pub uniforms: UniformBlock,
}

/// Layout of the `@group(0) @binding(0)` uniform struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformBlock {
    pub size: u32,
    pub members: BTreeMap<String, UniformMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformMember {
    pub offset: u32,
    pub size: u32,
}

impl UniformBlock {
    pub fn locations(&self) -> HashMap<String, UniformLocation> {
        self.members
            .iter()
            .map(|(name, member)| (name.clone(), UniformLocation(member.offset)))
            .collect()
    }

    pub fn member_at(&self, location: UniformLocation) -> Option<UniformMember> {
        self.members
            .values()
            .find(|member| member.offset == location.0)
            .copied()
    }
}

/// Result of linking a vertex and fragment stage.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub uniforms: UniformBlock,
    pub attributes: HashMap<String, u32>,
}

/// Parses and validates WGSL for one stage.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledStage, GpuError> {
    if source.trim().is_empty() {
        return Err(GpuError::Compile {
            stage,
            log: "shader source is empty".to_string(),
        });
    }
    let module = naga::front::wgsl::parse_str(source).map_err(|err| GpuError::Compile {
        stage,
        log: err.emit_to_string(source),
    })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| GpuError::Compile {
            stage,
            log: err.emit_to_string(source),
        })?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == wanted)
        .ok_or_else(|| GpuError::Compile {
            stage,
            log: format!("no @{stage} entry point"),
        })?;

    let (inputs, varyings) = match stage {
        ShaderStage::Vertex => (vertex_inputs(&module, entry), output_locations(&module, entry)),
        ShaderStage::Fragment => (HashMap::new(), input_locations(&module, entry)),
    };

    Ok(CompiledStage {
        stage,
        entry_point: entry.name.clone(),
        source: source.to_string(),
        inputs,
        varyings,
        uniforms: uniform_block(&module),
    })
}

/// Checks attribute bindings and merges the uniform blocks of both stages.
pub fn link_stages(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
    bindings: &[(u32, &str)],
) -> Result<LinkedProgram, GpuError> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(GpuError::Link(
            "program needs one vertex and one fragment stage".to_string(),
        ));
    }

    for (slot, name) in bindings {
        if let Some(location) = vertex.inputs.get(*name) {
            if location != slot {
                return Err(GpuError::Link(format!(
                    "attribute `{name}` is declared at location {location}, expected {slot}"
                )));
            }
        }
    }

    if let Some(missing) = fragment.varyings.difference(&vertex.varyings).next() {
        return Err(GpuError::Link(format!(
            "fragment input at location {missing} is not written by the vertex stage"
        )));
    }

    let mut uniforms = vertex.uniforms.clone();
    for (name, member) in &fragment.uniforms.members {
        match uniforms.members.get(name) {
            Some(existing) if existing != member => {
                return Err(GpuError::Link(format!(
                    "uniform `{name}` has different layouts in the vertex and fragment stage"
                )));
            }
            Some(_) => {}
            None => {
                uniforms.members.insert(name.clone(), *member);
            }
        }
    }
    uniforms.size = uniforms.size.max(fragment.uniforms.size);

    Ok(LinkedProgram {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        uniforms,
        attributes: vertex.inputs.clone(),
    })
}

fn vertex_inputs(module: &naga::Module, entry: &naga::EntryPoint) -> HashMap<String, u32> {
    let mut inputs = HashMap::new();
    for argument in &entry.function.arguments {
        match (&argument.binding, &argument.name) {
            (Some(naga::Binding::Location { location, .. }), Some(name)) => {
                inputs.insert(name.clone(), *location);
            }
            (None, _) => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    for member in members {
                        if let (Some(naga::Binding::Location { location, .. }), Some(name)) =
                            (&member.binding, &member.name)
                        {
                            inputs.insert(name.clone(), *location);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    inputs
}

fn input_locations(module: &naga::Module, entry: &naga::EntryPoint) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    for argument in &entry.function.arguments {
        collect_locations(module, argument.binding.as_ref(), argument.ty, &mut locations);
    }
    locations
}

fn output_locations(module: &naga::Module, entry: &naga::EntryPoint) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    if let Some(result) = &entry.function.result {
        collect_locations(module, result.binding.as_ref(), result.ty, &mut locations);
    }
    locations
}

fn collect_locations(
    module: &naga::Module,
    binding: Option<&naga::Binding>,
    ty: naga::Handle<naga::Type>,
    locations: &mut BTreeSet<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            locations.insert(*location);
        }
        Some(_) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                        locations.insert(*location);
                    }
                }
            }
        }
    }
}

fn uniform_block(module: &naga::Module) -> UniformBlock {
    let global = module.global_variables.iter().find(|(_, var)| {
        matches!(var.space, naga::AddressSpace::Uniform)
            && var
                .binding
                .as_ref()
                .is_some_and(|b| b.group == UNIFORM_GROUP && b.binding == UNIFORM_BINDING)
    });
    let Some((_, var)) = global else {
        return UniformBlock::default();
    };

    match &module.types[var.ty].inner {
        naga::TypeInner::Struct { members, span } => {
            let mut block = UniformBlock {
                size: *span,
                members: BTreeMap::new(),
            };
            for (i, member) in members.iter().enumerate() {
                let Some(name) = member.name.clone() else {
                    continue;
                };
                let end = members.get(i + 1).map_or(*span, |next| next.offset);
                block.members.insert(
                    name,
                    UniformMember {
                        offset: member.offset,
                        size: end - member.offset,
                    },
                );
            }
            block
        }
        _ => {
            // A bare uniform value is addressed as one member at offset 0.
            let mut block = UniformBlock::default();
            if let Some(name) = var.name.clone() {
                block.size = 16;
                block
                    .members
                    .insert(name, UniformMember { offset: 0, size: 16 });
            }
            block
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    modelview: mat4x4<f32>,
    textured: u32,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) texcoord: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) texcoord: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.projection * uniforms.modelview * vec4<f32>(input.position, 1.0);
    out.texcoord = input.texcoord;
    return out;
}
"#;

    const FRAGMENT: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    modelview: mat4x4<f32>,
    textured: u32,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@fragment
fn fs_main(@location(0) texcoord: vec2<f32>) -> @location(0) vec4<f32> {
    if (uniforms.textured != 0u) {
        return vec4<f32>(texcoord, 0.0, 1.0);
    }
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

    #[test]
    fn reflects_inputs_and_uniforms() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        assert_eq!(vertex.entry_point, "vs_main");
        assert_eq!(vertex.inputs.get("position"), Some(&0));
        assert_eq!(vertex.inputs.get("texcoord"), Some(&1));
        let members = &vertex.uniforms.members;
        assert_eq!(members["projection"].offset, 0);
        assert_eq!(members["modelview"].offset, 64);
        assert_eq!(members["textured"].offset, 128);
    }

    #[test]
    fn links_matching_stages() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        let fragment = compile_stage(ShaderStage::Fragment, FRAGMENT).unwrap();
        let program = link_stages(&vertex, &fragment, &[(0, "position"), (1, "texcoord")]).unwrap();
        let locations = program.uniforms.locations();
        assert_eq!(locations["textured"], UniformLocation(128));
        assert_eq!(program.fragment_entry, "fs_main");
    }

    #[test]
    fn rejects_swapped_attribute_slots() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        let fragment = compile_stage(ShaderStage::Fragment, FRAGMENT).unwrap();
        let err = link_stages(&vertex, &fragment, &[(1, "position")]).unwrap_err();
        assert!(matches!(err, GpuError::Link(_)));
    }

    #[test]
    fn rejects_unwritten_fragment_inputs() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        let fragment = compile_stage(
            ShaderStage::Fragment,
            "@fragment\nfn fs_main(@location(3) shade: f32) -> @location(0) vec4<f32> {\n    return vec4<f32>(shade, shade, shade, 1.0);\n}\n",
        )
        .unwrap();
        assert!(matches!(
            link_stages(&vertex, &fragment, &[]),
            Err(GpuError::Link(_))
        ));
    }

    #[test]
    fn syntax_errors_carry_a_log() {
        let err = compile_stage(ShaderStage::Vertex, "fn broken( {").unwrap_err();
        match err {
            GpuError::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = compile_stage(ShaderStage::Vertex, FRAGMENT).unwrap_err();
        assert!(matches!(err, GpuError::Compile { .. }));
    }
}
